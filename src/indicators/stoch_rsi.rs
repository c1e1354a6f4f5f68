// =============================================================================
// Stochastic RSI (14 / 14 / 3 / 3) — stochastic oscillator applied to RSI
// =============================================================================

use super::rsi::calculate_rsi;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochRsiPoint {
    pub k: f64,
    pub d: f64,
}

/// StochRSI series aligned to the *tail* of `closes` (warm-up consumes
/// `rsi_period + stoch_period - 1` bars before %K, then `smooth_k - 1` more
/// before %D).
pub fn calculate_stoch_rsi(
    closes: &[f64],
    rsi_period: usize,
    stoch_period: usize,
    smooth_k: usize,
    smooth_d: usize,
) -> Vec<Option<StochRsiPoint>> {
    let rsi = calculate_rsi(closes, rsi_period);
    if rsi.len() < stoch_period {
        return vec![None; closes.len()];
    }

    let mut raw_k = Vec::with_capacity(rsi.len());
    for i in stoch_period - 1..rsi.len() {
        let window = &rsi[i + 1 - stoch_period..=i];
        let hi = window.iter().cloned().fold(f64::MIN, f64::max);
        let lo = window.iter().cloned().fold(f64::MAX, f64::min);
        let k = if hi > lo { (rsi[i] - lo) / (hi - lo) * 100.0 } else { 50.0 };
        raw_k.push(k);
    }

    let smoothed_k = sma(&raw_k, smooth_k);
    let smoothed_d = sma(&smoothed_k, smooth_d);

    // Alignment: closes.len() - rsi.len() is the RSI warm-up; then
    // stoch_period - 1 for raw %K, then smooth_k - 1 for %K, then
    // smooth_d - 1 for %D.
    let rsi_offset = closes.len() - rsi.len();
    let k_offset = rsi_offset + (stoch_period - 1) + (smooth_k - 1);
    let d_offset = k_offset + (smooth_d - 1);

    let mut out = vec![None; closes.len()];
    for (j, d) in smoothed_d.iter().enumerate() {
        let k_idx = j + (smooth_d - 1);
        if k_idx < smoothed_k.len() {
            out[d_offset + j] = Some(StochRsiPoint {
                k: smoothed_k[k_idx],
                d: *d,
            });
        }
    }
    out
}

fn sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut sum: f64 = values[..period].iter().sum();
    out.push(sum / period as f64);
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out.push(sum / period as f64);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_bounded() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let series = calculate_stoch_rsi(&closes, 14, 14, 3, 3);
        for p in series.into_iter().flatten() {
            assert!((0.0..=100.0).contains(&p.k));
            assert!((0.0..=100.0).contains(&p.d));
        }
    }

    #[test]
    fn strong_uptrend_pushes_k_high() {
        let closes: Vec<f64> = (1..=80).map(|x| x as f64).collect();
        let series = calculate_stoch_rsi(&closes, 14, 14, 3, 3);
        let last = series.last().unwrap().unwrap();
        assert!(last.k > 50.0);
    }
}
