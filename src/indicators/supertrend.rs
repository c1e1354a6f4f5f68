// =============================================================================
// Supertrend (10, 3) — ATR-banded trend-following overlay
// =============================================================================

use crate::market_data::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendPoint {
    pub value: f64,
    pub is_uptrend: bool,
}

/// Supertrend series aligned 1:1 with `candles`. Absent until the underlying
/// ATR(period) is warmed up.
pub fn calculate_supertrend(
    candles: &[Candle],
    period: usize,
    multiplier: f64,
) -> Vec<Option<SupertrendPoint>> {
    let n = candles.len();
    if period == 0 || n < period + 1 {
        return vec![None; n];
    }

    // True range series, same derivation as indicators::atr.
    let mut tr = vec![0.0; n];
    for i in 1..n {
        let hl = candles[i].high - candles[i].low;
        let hc = (candles[i].high - candles[i - 1].close).abs();
        let lc = (candles[i].low - candles[i - 1].close).abs();
        tr[i] = hl.max(hc).max(lc);
    }

    let mut atr = vec![None; n];
    let seed: f64 = tr[1..=period].iter().sum::<f64>() / period as f64;
    atr[period] = Some(seed);
    let period_f = period as f64;
    for i in period + 1..n {
        let prev = atr[i - 1].unwrap();
        atr[i] = Some((prev * (period_f - 1.0) + tr[i]) / period_f);
    }

    let mut out = vec![None; n];
    let mut is_uptrend = true;
    let mut final_upper = 0.0;
    let mut final_lower = 0.0;

    for i in period..n {
        let Some(a) = atr[i] else { continue };
        let mid = (candles[i].high + candles[i].low) / 2.0;
        let basic_upper = mid + multiplier * a;
        let basic_lower = mid - multiplier * a;

        if i == period {
            final_upper = basic_upper;
            final_lower = basic_lower;
            is_uptrend = candles[i].close >= final_lower;
        } else {
            final_upper = if basic_upper < final_upper || candles[i - 1].close > final_upper {
                basic_upper
            } else {
                final_upper
            };
            final_lower = if basic_lower > final_lower || candles[i - 1].close < final_lower {
                basic_lower
            } else {
                final_lower
            };

            is_uptrend = if is_uptrend {
                candles[i].close >= final_lower
            } else {
                candles[i].close > final_upper
            };
        }

        let value = if is_uptrend { final_lower } else { final_upper };
        out[i] = Some(SupertrendPoint { value, is_uptrend });
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
    fn warmup_prefix_absent() {
        let candles: Vec<Candle> = (0..20)
            .map(|i| candle(100.0 + i as f64 + 1.0, 100.0 + i as f64 - 1.0, 100.0 + i as f64))
            .collect();
        let series = calculate_supertrend(&candles, 10, 3.0);
        assert!(series[..10].iter().all(Option::is_none));
        assert!(series[10].is_some());
    }

    #[test]
    fn strong_uptrend_is_flagged() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| candle(100.0 + i as f64 * 2.0 + 1.0, 100.0 + i as f64 * 2.0 - 1.0, 100.0 + i as f64 * 2.0))
            .collect();
        let series = calculate_supertrend(&candles, 10, 3.0);
        assert!(series.last().unwrap().unwrap().is_uptrend);
    }
}
