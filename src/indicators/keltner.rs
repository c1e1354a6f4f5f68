// =============================================================================
// Keltner Channel (20, 1.5) — EMA midline with ATR-scaled bands
// =============================================================================

use super::atr::calculate_atr;
use super::ema::calculate_ema;
use crate::market_data::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeltnerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Keltner channel computed from the most recent `period` candles, using the
/// EMA of closes as the midline and `multiplier * ATR(period)` as the band
/// width. Returns `None` until both the EMA and ATR are warmed up.
pub fn calculate_keltner(candles: &[Candle], period: usize, multiplier: f64) -> Option<KeltnerBands> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let middle = calculate_ema(&closes, period).last().copied()?;
    let atr = calculate_atr(candles, period)?;
    Some(KeltnerBands {
        upper: middle + multiplier * atr,
        middle,
        lower: middle - multiplier * atr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(c: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: c,
            high: c + 1.0,
            low: c - 1.0,
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
    fn bands_straddle_the_midline() {
        let candles: Vec<Candle> = (0..30).map(|i| candle(100.0 + i as f64)).collect();
        let bands = calculate_keltner(&candles, 20, 1.5).unwrap();
        assert!(bands.lower < bands.middle);
        assert!(bands.middle < bands.upper);
    }

    #[test]
    fn absent_without_enough_data() {
        let candles: Vec<Candle> = (0..5).map(|i| candle(100.0 + i as f64)).collect();
        assert!(calculate_keltner(&candles, 20, 1.5).is_none());
    }
}
