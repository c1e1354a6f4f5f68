// =============================================================================
// Commodity Channel Index (20)
// =============================================================================

use crate::market_data::Candle;

const CCI_CONSTANT: f64 = 0.015;

/// CCI series aligned 1:1 with `candles`.
pub fn calculate_cci(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    if period == 0 || n < period {
        return vec![None; n];
    }

    let typical: Vec<f64> = candles
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0)
        .collect();

    let mut out = vec![None; period - 1];
    for i in period - 1..n {
        let window = &typical[i + 1 - period..=i];
        let mean: f64 = window.iter().sum::<f64>() / period as f64;
        let mean_dev: f64 = window.iter().map(|v| (v - mean).abs()).sum::<f64>() / period as f64;
        if mean_dev > 0.0 {
            out.push(Some((typical[i] - mean) / (CCI_CONSTANT * mean_dev)));
        } else {
            out.push(Some(0.0));
        }
    }
    out
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
    fn flat_market_is_zero() {
        let candles: Vec<Candle> = (0..25).map(|_| candle(100.0)).collect();
        let series = calculate_cci(&candles, 20);
        assert_eq!(series.last().unwrap(), &Some(0.0));
    }

    #[test]
    fn breakout_pushes_cci_high() {
        let mut candles: Vec<Candle> = (0..25).map(|_| candle(100.0)).collect();
        candles.push(candle(130.0));
        let series = calculate_cci(&candles, 20);
        assert!(series.last().unwrap().unwrap() > 100.0);
    }
}
