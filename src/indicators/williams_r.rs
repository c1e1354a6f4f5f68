// =============================================================================
// Williams %R (14) — momentum oscillator, range [-100, 0]
// =============================================================================

use crate::market_data::Candle;

/// Williams %R series aligned 1:1 with `candles`.
pub fn calculate_williams_r(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    if period == 0 || n < period {
        return vec![None; n];
    }

    let mut out = vec![None; period - 1];
    for i in period - 1..n {
        let window = &candles[i + 1 - period..=i];
        let hi = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let lo = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        if hi > lo {
            out.push(Some((hi - candles[i].close) / (hi - lo) * -100.0));
        } else {
            out.push(Some(-50.0));
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
    fn close_at_high_is_near_zero() {
        let candles: Vec<Candle> = (0..20).map(|_| candle(110.0, 90.0, 110.0)).collect();
        let series = calculate_williams_r(&candles, 14);
        let last = series.last().unwrap().unwrap();
        assert!((last - 0.0).abs() < 1e-9);
    }

    #[test]
    fn close_at_low_is_near_minus_100() {
        let candles: Vec<Candle> = (0..20).map(|_| candle(110.0, 90.0, 90.0)).collect();
        let series = calculate_williams_r(&candles, 14);
        let last = series.last().unwrap().unwrap();
        assert!((last + 100.0).abs() < 1e-9);
    }
}
