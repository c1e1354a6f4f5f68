// =============================================================================
// Triple Exponential Moving Average — 3·EMA1 − 3·EMA2 + EMA3
// =============================================================================

use super::ema::calculate_ema;

/// TEMA series aligned 1:1 with `closes`.
pub fn calculate_tema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || closes.is_empty() {
        return vec![None; closes.len()];
    }

    let ema1 = calculate_ema(closes, period);
    if ema1.is_empty() {
        return vec![None; closes.len()];
    }
    let ema2 = calculate_ema(&ema1, period);
    if ema2.is_empty() {
        return vec![None; closes.len()];
    }
    let ema3 = calculate_ema(&ema2, period);
    if ema3.is_empty() {
        return vec![None; closes.len()];
    }

    let off1 = closes.len() - ema1.len();
    let off2 = ema1.len() - ema2.len();
    let off3 = ema2.len() - ema3.len();
    let total_offset = off1 + off2 + off3;

    let mut out = vec![None; closes.len()];
    for (k, e3) in ema3.iter().enumerate() {
        let e2 = ema2[off3 + k];
        let e1 = ema1[off2 + off3 + k];
        out[total_offset + k] = Some(3.0 * e1 - 3.0 * e2 + e3);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_values_after_warmup() {
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let series = calculate_tema(&closes, 9);
        assert!(series.last().unwrap().is_some());
    }
}
