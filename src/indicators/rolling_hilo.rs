// =============================================================================
// Rolling High / Low over N bars
// =============================================================================

use crate::market_data::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HiLo {
    pub high: f64,
    pub low: f64,
}

/// Rolling high/low series aligned 1:1 with `candles`.
pub fn calculate_rolling_hilo(candles: &[Candle], period: usize) -> Vec<Option<HiLo>> {
    let n = candles.len();
    if period == 0 || n < period {
        return vec![None; n];
    }
    let mut out = vec![None; period - 1];
    for i in period - 1..n {
        let window = &candles[i + 1 - period..=i];
        let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        out.push(Some(HiLo { high, low }));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(h: f64, l: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: (h + l) / 2.0,
            high: h,
            low: l,
            close: (h + l) / 2.0,
            volume: 1.0,
            quote_volume: 1.0,
            trades_count: 1,
            taker_buy_volume: 0.5,
            taker_buy_quote_volume: 0.5,
            is_closed: true,
        }
    }

    #[test]
    fn tracks_widest_range_in_window() {
        let candles = vec![candle(101.0, 99.0), candle(110.0, 95.0), candle(102.0, 98.0)];
        let series = calculate_rolling_hilo(&candles, 3);
        let last = series.last().unwrap().unwrap();
        assert_eq!(last.high, 110.0);
        assert_eq!(last.low, 95.0);
    }
}
