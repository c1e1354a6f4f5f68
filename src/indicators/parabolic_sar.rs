// =============================================================================
// Parabolic SAR (0.02 / 0.2) — trend-following stop-and-reverse
// =============================================================================

use crate::market_data::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SarPoint {
    pub sar: f64,
    pub is_uptrend: bool,
}

/// Parabolic SAR series. The first bar has no prior trend to extend, so
/// index 0 is absent; the series seeds its initial trend direction from
/// bars 0-1.
pub fn calculate_parabolic_sar(
    candles: &[Candle],
    step: f64,
    max_step: f64,
) -> Vec<Option<SarPoint>> {
    let n = candles.len();
    if n < 2 {
        return vec![None; n];
    }

    let mut out = vec![None; n];
    let mut is_uptrend = candles[1].close >= candles[0].close;
    let mut af = step;
    let mut ep = if is_uptrend { candles[0].high } else { candles[0].low };
    let mut sar = if is_uptrend { candles[0].low } else { candles[0].high };

    for i in 1..n {
        let prev_high = candles[i - 1].high;
        let prev_low = candles[i - 1].low;

        sar = sar + af * (ep - sar);

        if is_uptrend {
            sar = sar.min(prev_low).min(if i >= 2 { candles[i - 2].low } else { prev_low });
            if candles[i].low < sar {
                is_uptrend = false;
                sar = ep;
                ep = candles[i].low;
                af = step;
            } else {
                if candles[i].high > ep {
                    ep = candles[i].high;
                    af = (af + step).min(max_step);
                }
            }
        } else {
            sar = sar.max(prev_high).max(if i >= 2 { candles[i - 2].high } else { prev_high });
            if candles[i].high > sar {
                is_uptrend = true;
                sar = ep;
                ep = candles[i].high;
                af = step;
            } else {
                if candles[i].low < ep {
                    ep = candles[i].low;
                    af = (af + step).min(max_step);
                }
            }
        }

        out[i] = Some(SarPoint { sar, is_uptrend });
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
    fn first_bar_is_absent() {
        let candles = vec![candle(101.0, 99.0, 100.0), candle(102.0, 100.0, 101.0)];
        let series = calculate_parabolic_sar(&candles, 0.02, 0.2);
        assert_eq!(series[0], None);
        assert!(series[1].is_some());
    }

    #[test]
    fn uptrend_keeps_sar_below_price() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| candle(100.0 + i as f64 + 1.0, 100.0 + i as f64 - 1.0, 100.0 + i as f64))
            .collect();
        let series = calculate_parabolic_sar(&candles, 0.02, 0.2);
        let last = series.last().unwrap().unwrap();
        assert!(last.is_uptrend);
        assert!(last.sar < candles.last().unwrap().close);
    }
}
