// =============================================================================
// VIPER — LUNGE mode (15-minute momentum)
// =============================================================================
//
// Entry, all on the 15m series:
//   - EMA9 > EMA21 > EMA50
//   - close > the prior 15m bar's high
//   - volume > 2x its 20-bar SMA
//   - MACD histogram positive and rising
//   - RSI in [52, 72]
//   - price > VWAP
//   - ADX > 28 and rising
//
// Only pairs flagged `lunge_eligible` in ticker profile config are
// considered at all.
//
// Sizing: riskUSD = 1.5% of allocated; size = min(riskUSD / (price - stop)
// * price, 10% of allocated). TP1 at +2.0 ATR (35% close), TP2 at +3.5 ATR
// (35% close), trail at 1.2 ATR engaged after TP1, stop at -1.8 ATR.
// Emergency exit if EMA9 crosses below EMA21 intratrade. At most one
// concurrent position.
// =============================================================================

use crate::indicators::adx::calculate_adx;
use crate::indicators::atr::calculate_atr;
use crate::indicators::ema::calculate_ema;
use crate::indicators::macd::calculate_macd;
use crate::indicators::rsi::calculate_rsi;
use crate::indicators::sma::current_sma;
use crate::indicators::vwap::calculate_vwap;
use crate::market_data::Candle;

pub const VOLUME_SMA_MULTIPLIER: f64 = 2.0;
pub const RSI_MIN: f64 = 52.0;
pub const RSI_MAX: f64 = 72.0;
pub const ADX_MIN: f64 = 28.0;

pub const RISK_PCT_OF_ALLOCATED: f64 = 0.015;
pub const MAX_SIZE_PCT_OF_ALLOCATED: f64 = 0.10;
pub const STOP_ATR_MULTIPLIER: f64 = 1.8;
pub const TP1_ATR_MULTIPLIER: f64 = 2.0;
pub const TP2_ATR_MULTIPLIER: f64 = 3.5;
pub const TRAIL_ATR_MULTIPLIER: f64 = 1.2;
pub const TP1_CLOSE_PCT: f64 = 0.35;
pub const TP2_CLOSE_PCT: f64 = 0.35;
pub const MAX_CONCURRENT: usize = 1;

#[derive(Debug, Clone)]
pub struct LungeSignal {
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
    pub trail_distance: f64,
}

pub fn check_entry(candles_15m: &[Candle], lunge_eligible: bool) -> Option<LungeSignal> {
    if !lunge_eligible || candles_15m.len() < 52 {
        return None;
    }
    let closes: Vec<f64> = candles_15m.iter().map(|c| c.close).collect();
    let last = candles_15m.last()?;
    let prior_high = candles_15m[candles_15m.len() - 2].high;

    let ema9 = calculate_ema(&closes, 9);
    let ema21 = calculate_ema(&closes, 21);
    let ema50 = calculate_ema(&closes, 50);
    let (e9, e21, e50) = (*ema9.last()?, *ema21.last()?, *ema50.last()?);
    if !(e9 > e21 && e21 > e50) {
        return None;
    }

    if last.close <= prior_high {
        return None;
    }

    let volumes: Vec<f64> = candles_15m.iter().map(|c| c.volume).collect();
    let vol_sma = current_sma(&volumes, 20)?;
    if last.volume <= vol_sma * VOLUME_SMA_MULTIPLIER {
        return None;
    }

    let macd = calculate_macd(&closes, 12, 26, 9);
    if macd.len() < 2 {
        return None;
    }
    let (now, prev) = (macd[macd.len() - 1], macd[macd.len() - 2]);
    match (now, prev) {
        (Some(n), Some(p)) if n.histogram > 0.0 && n.histogram > p.histogram => {}
        _ => return None,
    }

    let rsi = calculate_rsi(&closes, 14);
    let rsi_now = *rsi.last()?;
    if !(RSI_MIN..=RSI_MAX).contains(&rsi_now) {
        return None;
    }

    let vwap = calculate_vwap(candles_15m);
    let vwap_now = (*vwap.last()?)?;
    if last.close <= vwap_now {
        return None;
    }

    let adx_now = calculate_adx(candles_15m, 14)?;
    let adx_prev = calculate_adx(&candles_15m[..candles_15m.len() - 1], 14)?;
    if !(adx_now > ADX_MIN && adx_now > adx_prev) {
        return None;
    }

    let atr = calculate_atr(candles_15m, 14)?;
    if atr <= 0.0 {
        return None;
    }

    let price = last.close;
    Some(LungeSignal {
        entry_price: price,
        stop_loss: price - STOP_ATR_MULTIPLIER * atr,
        take_profit_1: price + TP1_ATR_MULTIPLIER * atr,
        take_profit_2: price + TP2_ATR_MULTIPLIER * atr,
        trail_distance: TRAIL_ATR_MULTIPLIER * atr,
    })
}

pub fn position_size_usd(allocated_capital: f64, price: f64, stop_loss: f64) -> f64 {
    if price <= stop_loss {
        return 0.0;
    }
    let risk_usd = allocated_capital * RISK_PCT_OF_ALLOCATED;
    let raw = risk_usd / (price - stop_loss) * price;
    raw.min(allocated_capital * MAX_SIZE_PCT_OF_ALLOCATED)
}

/// Emergency exit: EMA9 has crossed below EMA21 intratrade.
pub fn emergency_exit(candles_15m: &[Candle]) -> bool {
    let closes: Vec<f64> = candles_15m.iter().map(|c| c.close).collect();
    let ema9 = calculate_ema(&closes, 9);
    let ema21 = calculate_ema(&closes, 21);
    match (ema9.last(), ema21.last()) {
        (Some(e9), Some(e21)) => e9 < e21,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ineligible_pair_is_never_considered() {
        let candles: Vec<Candle> = Vec::new();
        assert!(check_entry(&candles, false).is_none());
    }

    #[test]
    fn position_size_is_capped_at_10_pct_of_allocated() {
        // Very tight stop would blow the risk-based size past the 10% cap.
        let size = position_size_usd(10_000.0, 100.0, 99.9);
        assert_eq!(size, 1_000.0);
    }

    #[test]
    fn position_size_uses_risk_based_formula_when_under_cap() {
        // riskUSD = 150; stop distance = 2 -> raw = 150/2*100 = 7500 -> under cap
        let size = position_size_usd(10_000.0, 100.0, 98.0);
        assert!((size - 7_500.0).abs() < 1e-9);
    }

    #[test]
    fn zero_or_inverted_stop_yields_zero_size() {
        assert_eq!(position_size_usd(10_000.0, 100.0, 100.0), 0.0);
        assert_eq!(position_size_usd(10_000.0, 100.0, 101.0), 0.0);
    }
}
