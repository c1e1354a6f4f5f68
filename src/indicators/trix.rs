// =============================================================================
// TRIX (15) — rate of change of a triple-smoothed EMA
// =============================================================================

use super::ema::calculate_ema;

/// TRIX series aligned to the tail of `closes` after the triple EMA warm-up.
pub fn calculate_trix(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || closes.is_empty() {
        return vec![None; closes.len()];
    }
    let ema1 = calculate_ema(closes, period);
    if ema1.len() < 2 {
        return vec![None; closes.len()];
    }
    let ema2 = calculate_ema(&ema1, period);
    if ema2.len() < 2 {
        return vec![None; closes.len()];
    }
    let ema3 = calculate_ema(&ema2, period);
    if ema3.len() < 2 {
        return vec![None; closes.len()];
    }

    let off1 = closes.len() - ema1.len();
    let off2 = ema1.len() - ema2.len();
    let off3 = ema2.len() - ema3.len();
    let total_offset = off1 + off2 + off3 + 1;

    let mut out = vec![None; closes.len()];
    for i in 1..ema3.len() {
        let prev = ema3[i - 1];
        let trix = if prev != 0.0 { (ema3[i] - prev) / prev * 100.0 } else { 0.0 };
        out[total_offset + i - 1] = Some(trix);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptrend_yields_positive_trix() {
        let closes: Vec<f64> = (1..=120).map(|x| x as f64).collect();
        let series = calculate_trix(&closes, 15);
        assert!(series.last().unwrap().unwrap() > 0.0);
    }
}
