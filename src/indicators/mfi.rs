// =============================================================================
// Money Flow Index (14) — volume-weighted RSI
// =============================================================================

use crate::market_data::Candle;

/// MFI series aligned 1:1 with `candles`.
pub fn calculate_mfi(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    if period == 0 || n < period + 1 {
        return vec![None; n];
    }

    let typical: Vec<f64> = candles
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0)
        .collect();
    let raw_flow: Vec<f64> = typical
        .iter()
        .zip(candles.iter())
        .map(|(tp, c)| tp * c.volume)
        .collect();

    let mut out = vec![None; period];
    for i in period..n {
        let mut pos_flow = 0.0;
        let mut neg_flow = 0.0;
        for j in i + 1 - period..=i {
            if typical[j] > typical[j - 1] {
                pos_flow += raw_flow[j];
            } else if typical[j] < typical[j - 1] {
                neg_flow += raw_flow[j];
            }
        }
        let mfi = if neg_flow == 0.0 {
            100.0
        } else {
            let ratio = pos_flow / neg_flow;
            100.0 - 100.0 / (1.0 + ratio)
        };
        out.push(Some(mfi));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(c: f64, v: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: c,
            high: c + 1.0,
            low: c - 1.0,
            close: c,
            volume: v,
            quote_volume: v * c,
            trades_count: 1,
            taker_buy_volume: v / 2.0,
            taker_buy_quote_volume: v * c / 2.0,
            is_closed: true,
        }
    }

    #[test]
    fn all_gains_saturates_at_100() {
        let candles: Vec<Candle> = (1..=30).map(|i| candle(i as f64, 10.0)).collect();
        let series = calculate_mfi(&candles, 14);
        assert_eq!(series.last().unwrap(), &Some(100.0));
    }

    #[test]
    fn bounded_in_range() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| candle(100.0 + (i as f64 * 0.5).sin() * 5.0, 10.0))
            .collect();
        for v in calculate_mfi(&candles, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v));
        }
    }
}
