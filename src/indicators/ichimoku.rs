// =============================================================================
// Ichimoku Kinko Hyo (9/26/52) — with forward-shifted spans
// =============================================================================
//
// Tenkan-sen   = (9-high + 9-low) / 2
// Kijun-sen    = (26-high + 26-low) / 2
// Senkou A     = (Tenkan + Kijun) / 2, plotted 26 bars forward
// Senkou B     = (52-high + 52-low) / 2, plotted 26 bars forward
// Chikou       = close, plotted 26 bars back
// =============================================================================

use crate::market_data::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IchimokuPoint {
    pub tenkan: f64,
    pub kijun: f64,
    /// Senkou span A/B, forward-shifted onto index `i + displacement`.
    pub senkou_a: Option<f64>,
    pub senkou_b: Option<f64>,
}

fn midpoint_of_range(candles: &[Candle], end: usize, period: usize) -> Option<f64> {
    if end + 1 < period {
        return None;
    }
    let window = &candles[end + 1 - period..=end];
    let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    Some((high + low) / 2.0)
}

/// Ichimoku series aligned 1:1 with `candles`; `senkou_a`/`senkou_b` are
/// already shifted forward by `displacement` (default 26) bars, so index `i`
/// holds the cloud value that plots above candle `i`.
pub fn calculate_ichimoku(
    candles: &[Candle],
    tenkan_period: usize,
    kijun_period: usize,
    senkou_b_period: usize,
    displacement: usize,
) -> Vec<Option<IchimokuPoint>> {
    let n = candles.len();
    let mut tenkan = vec![None; n];
    let mut kijun = vec![None; n];
    let mut base_senkou_a = vec![None; n];
    let mut base_senkou_b = vec![None; n];

    for i in 0..n {
        tenkan[i] = midpoint_of_range(candles, i, tenkan_period);
        kijun[i] = midpoint_of_range(candles, i, kijun_period);
        base_senkou_b[i] = midpoint_of_range(candles, i, senkou_b_period);
        base_senkou_a[i] = match (tenkan[i], kijun[i]) {
            (Some(t), Some(k)) => Some((t + k) / 2.0),
            _ => None,
        };
    }

    // Each index gets its own tenkan/kijun first; senkou spans are filled in
    // afterward by writing into the already-populated target slot, so a
    // shift never overwrites another index's unshifted values.
    let mut out: Vec<Option<IchimokuPoint>> = (0..n)
        .map(|i| match (tenkan[i], kijun[i]) {
            (Some(t), Some(k)) => Some(IchimokuPoint { tenkan: t, kijun: k, senkou_a: None, senkou_b: None }),
            _ => None,
        })
        .collect();

    for i in 0..n {
        let shifted_idx = i + displacement;
        if shifted_idx >= n {
            continue;
        }
        if let Some(entry) = out[shifted_idx].as_mut() {
            entry.senkou_a = base_senkou_a[i];
            entry.senkou_b = base_senkou_b[i];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(h: f64, l: f64, c: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: c,
            high: h,
            low: l,
            close: c,
            volume: 1.0,
            quote_volume: 1.0,
            trades_count: 1,
            taker_buy_volume: 0.5,
            taker_buy_quote_volume: 0.5,
            is_closed: true,
        }
    }

    #[test]
    fn tenkan_and_kijun_present_after_warmup() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| candle(100.0 + i as f64, 90.0 + i as f64, 95.0 + i as f64))
            .collect();
        let series = calculate_ichimoku(&candles, 9, 26, 52, 26);
        let last = series.last().unwrap().unwrap();
        assert!(last.tenkan > 0.0 && last.kijun > 0.0);
    }

    /// Index 52 is the forward-shift target of index 26's senkou spans; its
    /// own tenkan/kijun must still be its own, not index 26's.
    #[test]
    fn shift_target_keeps_its_own_tenkan_and_kijun() {
        let candles: Vec<Candle> = (0..80)
            .map(|i| candle(100.0 + i as f64, 90.0 + i as f64, 95.0 + i as f64))
            .collect();
        let series = calculate_ichimoku(&candles, 9, 26, 52, 26);

        let own_tenkan = midpoint_of_range(&candles, 52, 9).unwrap();
        let own_kijun = midpoint_of_range(&candles, 52, 26).unwrap();
        let point = series[52].unwrap();
        assert_eq!(point.tenkan, own_tenkan);
        assert_eq!(point.kijun, own_kijun);
        assert!(point.senkou_a.is_some() && point.senkou_b.is_some());
    }
}
