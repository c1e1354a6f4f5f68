// =============================================================================
// Classic Pivot Points — derived from the prior period's H/L/C
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotLevels {
    pub pivot: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

/// Classic floor-trader pivots computed from one prior bar's high/low/close.
pub fn calculate_pivot_points(prior_high: f64, prior_low: f64, prior_close: f64) -> PivotLevels {
    let pivot = (prior_high + prior_low + prior_close) / 3.0;
    let range = prior_high - prior_low;
    PivotLevels {
        pivot,
        r1: 2.0 * pivot - prior_low,
        r2: pivot + range,
        r3: prior_high + 2.0 * (pivot - prior_low),
        s1: 2.0 * pivot - prior_high,
        s2: pivot - range,
        s3: prior_low - 2.0 * (prior_high - pivot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pivot_sits_between_support_and_resistance() {
        let levels = calculate_pivot_points(110.0, 90.0, 100.0);
        assert!(levels.s1 < levels.pivot);
        assert!(levels.pivot < levels.r1);
        assert!(levels.s2 < levels.s1);
        assert!(levels.r2 > levels.r1);
    }
}
