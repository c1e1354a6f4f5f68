// =============================================================================
// Chaikin Money Flow (20)
// =============================================================================

use crate::market_data::Candle;

/// CMF series aligned 1:1 with `candles`.
pub fn calculate_cmf(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    if period == 0 || n < period {
        return vec![None; n];
    }

    let mfv: Vec<f64> = candles
        .iter()
        .map(|c| {
            let range = c.high - c.low;
            if range <= 0.0 {
                0.0
            } else {
                let mult = ((c.close - c.low) - (c.high - c.close)) / range;
                mult * c.volume
            }
        })
        .collect();

    let mut out = vec![None; period - 1];
    for i in period - 1..n {
        let vol_sum: f64 = candles[i + 1 - period..=i].iter().map(|c| c.volume).sum();
        let mfv_sum: f64 = mfv[i + 1 - period..=i].iter().sum();
        out.push(if vol_sum > 0.0 { Some(mfv_sum / vol_sum) } else { Some(0.0) });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(h: f64, l: f64, c: f64, v: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: c,
            high: h,
            low: l,
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
    fn close_at_high_is_positive() {
        let candles: Vec<Candle> = (0..25).map(|_| candle(110.0, 90.0, 110.0, 100.0)).collect();
        let series = calculate_cmf(&candles, 20);
        assert!(series.last().unwrap().unwrap() > 0.0);
    }

    #[test]
    fn bounded_in_range() {
        let candles: Vec<Candle> = (0..25).map(|i| candle(110.0, 90.0, 90.0 + i as f64 * 0.5, 100.0)).collect();
        for v in calculate_cmf(&candles, 20).into_iter().flatten() {
            assert!((-1.0..=1.0).contains(&v));
        }
    }
}
