// =============================================================================
// MACD(12, 26, 9) — trend-following momentum via EMA spread
// =============================================================================

use super::ema::calculate_ema;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Full MACD series aligned 1:1 with `closes`. Absent until both EMAs and the
/// signal line are warmed up.
pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Vec<Option<MacdPoint>> {
    if closes.is_empty() || fast == 0 || slow == 0 || signal_period == 0 || fast >= slow {
        return vec![None; closes.len()];
    }

    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);

    // calculate_ema returns a shorter Vec seeded from `period`; re-align by
    // offset so index i in `closes` maps correctly.
    let fast_offset = closes.len() - ema_fast.len();
    let slow_offset = closes.len() - ema_slow.len();

    let mut macd_line: Vec<Option<f64>> = vec![None; closes.len()];
    for i in 0..closes.len() {
        let f = i.checked_sub(fast_offset).and_then(|j| ema_fast.get(j).copied());
        let s = i.checked_sub(slow_offset).and_then(|j| ema_slow.get(j).copied());
        if let (Some(f), Some(s)) = (f, s) {
            macd_line[i] = Some(f - s);
        }
    }

    let first_valid = macd_line.iter().position(Option::is_some);
    let Some(first_valid) = first_valid else {
        return vec![None; closes.len()];
    };

    let macd_values: Vec<f64> = macd_line[first_valid..]
        .iter()
        .map(|v| v.unwrap())
        .collect();
    let signal_series = calculate_ema(&macd_values, signal_period);
    let signal_offset = macd_values.len() - signal_series.len();

    let mut out = vec![None; closes.len()];
    for (j, sig) in signal_series.iter().enumerate() {
        let idx = first_valid + signal_offset + j;
        let macd = macd_values[signal_offset + j];
        out[idx] = Some(MacdPoint {
            macd,
            signal: *sig,
            histogram: macd - sig,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warms_up_before_producing_values() {
        let closes: Vec<f64> = (1..=60).map(|x| x as f64).collect();
        let series = calculate_macd(&closes, 12, 26, 9);
        assert!(series[..34].iter().all(Option::is_none));
        assert!(series.last().unwrap().is_some());
    }

    #[test]
    fn uptrend_has_positive_histogram_eventually() {
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let series = calculate_macd(&closes, 12, 26, 9);
        let last = series.last().unwrap().unwrap();
        assert!(last.histogram > 0.0);
    }
}
