// =============================================================================
// Hull Moving Average — WMA(2·WMA(n/2) − WMA(n), sqrt(n))
// =============================================================================

/// Weighted moving average with linearly increasing weights toward the most
/// recent value. Warm-up prefix absent.
fn wma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || values.len() < period {
        return vec![None; values.len()];
    }
    let denom = (period * (period + 1) / 2) as f64;
    let mut out = vec![None; period - 1];
    for i in period - 1..values.len() {
        let mut acc = 0.0;
        for (w, v) in (1..=period).zip(values[i + 1 - period..=i].iter()) {
            acc += w as f64 * v;
        }
        out.push(Some(acc / denom));
    }
    out
}

/// Hull Moving Average series aligned 1:1 with `closes`.
pub fn calculate_hma(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if period < 2 {
        return vec![None; closes.len()];
    }
    let half = (period / 2).max(1);
    let sqrt_period = (period as f64).sqrt().round() as usize;
    let sqrt_period = sqrt_period.max(1);

    let wma_half = wma(closes, half);
    let wma_full = wma(closes, period);

    let raw: Vec<f64> = wma_half
        .iter()
        .zip(wma_full.iter())
        .map(|(h, f)| match (h, f) {
            (Some(h), Some(f)) => 2.0 * h - f,
            _ => f64::NAN,
        })
        .collect();

    let first_valid = raw.iter().position(|v| v.is_finite());
    let Some(first_valid) = first_valid else {
        return vec![None; closes.len()];
    };

    let tail = &raw[first_valid..];
    let hma_tail = wma(tail, sqrt_period);

    let mut out = vec![None; closes.len()];
    for (j, v) in hma_tail.into_iter().enumerate() {
        out[first_valid + j] = v;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warms_up_before_producing_values() {
        let closes: Vec<f64> = (1..=40).map(|x| x as f64).collect();
        let series = calculate_hma(&closes, 16);
        assert!(series.last().unwrap().is_some());
    }

    #[test]
    fn tracks_uptrend_above_price_lag() {
        let closes: Vec<f64> = (1..=60).map(|x| x as f64).collect();
        let series = calculate_hma(&closes, 9);
        let last = series.last().unwrap().unwrap();
        // HMA should sit close to the current price in a clean linear trend.
        assert!((last - 60.0).abs() < 2.0);
    }
}
