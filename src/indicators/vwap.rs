// =============================================================================
// Volume-Weighted Average Price — resets on UTC calendar-day change
// =============================================================================

use crate::market_data::Candle;
use chrono::{DateTime, Utc};

/// VWAP series aligned 1:1 with `candles`. The accumulator (Σ typical_price·
/// volume, Σ volume) resets whenever the UTC calendar day of a candle's
/// `open_time` differs from the previous candle's.
pub fn calculate_vwap(candles: &[Candle]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(candles.len());
    let mut cum_pv = 0.0_f64;
    let mut cum_vol = 0.0_f64;
    let mut current_day: Option<i64> = None;

    for c in candles {
        let day = utc_day(c.open_time);
        if current_day != Some(day) {
            cum_pv = 0.0;
            cum_vol = 0.0;
            current_day = Some(day);
        }

        let typical = (c.high + c.low + c.close) / 3.0;
        cum_pv += typical * c.volume;
        cum_vol += c.volume;

        if cum_vol > 0.0 {
            out.push(Some(cum_pv / cum_vol));
        } else {
            out.push(None);
        }
    }
    out
}

fn utc_day(open_time_ms: i64) -> i64 {
    let dt: DateTime<Utc> = DateTime::from_timestamp_millis(open_time_ms).unwrap_or_default();
    dt.date_naive().num_days_from_ce() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_time: i64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 59_999,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
            quote_volume: volume * close,
            trades_count: 10,
            taker_buy_volume: volume / 2.0,
            taker_buy_quote_volume: volume * close / 2.0,
            is_closed: true,
        }
    }

    #[test]
    fn accumulates_within_a_day() {
        let candles = vec![
            candle(0, 100.0, 10.0),
            candle(60_000, 102.0, 10.0),
        ];
        let vwap = calculate_vwap(&candles);
        assert!(vwap[0].is_some());
        assert!(vwap[1].is_some());
        assert!(vwap[1].unwrap() > vwap[0].unwrap());
    }

    #[test]
    fn resets_on_day_change() {
        let day_ms = 86_400_000;
        let candles = vec![
            candle(0, 1000.0, 5.0),
            candle(day_ms, 10.0, 5.0),
        ];
        let vwap = calculate_vwap(&candles);
        // Second day resets the accumulator -- VWAP should track the new
        // day's low price, not be dragged up by day one.
        assert!(vwap[1].unwrap() < 100.0);
    }
}
