// =============================================================================
// VIPER — STRIKE mode (1-minute scalp)
// =============================================================================
//
// Entry, all must hold on the 1m series:
//   - price within 0.75% of VWAP
//   - StochRSI %K > %D and %K < 75
//   - HMA rising
//   - buy-side trade flow share > 55%
//   - spread <= 0.15%
//
// Sizing: 2.5% of allocated capital, per-pair TP/stop/max-hold. Cooldown:
// 90s between attempts, widened to 180s after 3 consecutive wins. A loss
// forces the next signal on that pair to be skipped. At most one concurrent
// STRIKE position.
// =============================================================================

use crate::indicators::hma::calculate_hma;
use crate::indicators::stoch_rsi::calculate_stoch_rsi;
use crate::indicators::vwap::calculate_vwap;
use crate::market_data::{Candle, TradeFlow};

pub const VWAP_DISTANCE_MAX_PCT: f64 = 0.75;
pub const STOCH_RSI_K_MAX: f64 = 75.0;
pub const BUY_FLOW_MIN: f64 = 0.55;
pub const SPREAD_MAX_PCT: f64 = 0.15;

pub const SIZE_PCT_OF_ALLOCATED: f64 = 0.025;
pub const BASE_COOLDOWN_SECS: i64 = 90;
pub const WIN_STREAK_COOLDOWN_SECS: i64 = 180;
pub const MAX_HOLD_SECS_DEFAULT: i64 = 240;
pub const MAX_CONCURRENT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairTuning {
    pub take_profit_pct: f64,
    pub stop_pct: f64,
    pub max_hold_secs: i64,
}

impl Default for PairTuning {
    fn default() -> Self {
        Self { take_profit_pct: 0.35, stop_pct: 0.25, max_hold_secs: MAX_HOLD_SECS_DEFAULT }
    }
}

#[derive(Debug, Clone)]
pub struct StrikeSignal {
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub max_hold_secs: i64,
}

pub fn check_entry(candles_1m: &[Candle], flow: Option<TradeFlow>, spread_pct: Option<f64>, tuning: PairTuning) -> Option<StrikeSignal> {
    if candles_1m.len() < 20 {
        return None;
    }
    let spread_pct = spread_pct?;
    if spread_pct > SPREAD_MAX_PCT {
        return None;
    }

    let closes: Vec<f64> = candles_1m.iter().map(|c| c.close).collect();
    let price = *closes.last()?;

    let vwap = calculate_vwap(candles_1m);
    let vwap_now = (*vwap.last()?)?;
    let vwap_dist_pct = ((price - vwap_now).abs() / vwap_now) * 100.0;
    if vwap_dist_pct > VWAP_DISTANCE_MAX_PCT {
        return None;
    }

    let stoch = calculate_stoch_rsi(&closes, 14, 14, 3, 3);
    let point = (*stoch.last()?)?;
    if !(point.k > point.d && point.k < STOCH_RSI_K_MAX) {
        return None;
    }

    let hma = calculate_hma(&closes, 9);
    if hma.len() < 2 {
        return None;
    }
    let (last, prev) = (hma[hma.len() - 1], hma[hma.len() - 2]);
    match (last, prev) {
        (Some(l), Some(p)) if l > p => {}
        _ => return None,
    }

    let flow = flow?;
    let buy_flow_share = flow.buy_volume / (flow.buy_volume + flow.sell_volume).max(1e-9);
    if buy_flow_share <= BUY_FLOW_MIN {
        return None;
    }

    Some(StrikeSignal {
        entry_price: price,
        stop_loss: price * (1.0 - tuning.stop_pct / 100.0),
        take_profit: price * (1.0 + tuning.take_profit_pct / 100.0),
        max_hold_secs: tuning.max_hold_secs,
    })
}

pub fn position_size_usd(allocated_capital: f64) -> f64 {
    allocated_capital * SIZE_PCT_OF_ALLOCATED
}

/// Is the pair still inside its cooldown window? `consecutive_wins` widens
/// the window to 180s once 3 wins in a row have landed.
pub fn in_cooldown(seconds_since_last_close: i64, consecutive_wins: u32) -> bool {
    let window = if consecutive_wins >= 3 { WIN_STREAK_COOLDOWN_SECS } else { BASE_COOLDOWN_SECS };
    seconds_since_last_close < window
}

/// Per-pair STRIKE cadence bookkeeping: consecutive win streak (for the
/// widened cooldown) and a one-signal skip forced by the last loss.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrikeCadence {
    pub consecutive_wins: u32,
    pub last_close_ts: Option<i64>,
    pub skip_next_signal: bool,
}

impl StrikeCadence {
    /// Record a realized STRIKE trade outcome and the close timestamp.
    pub fn record_close(&mut self, won: bool, closed_ts: i64) {
        self.last_close_ts = Some(closed_ts);
        if won {
            self.consecutive_wins += 1;
            self.skip_next_signal = false;
        } else {
            self.consecutive_wins = 0;
            self.skip_next_signal = true;
        }
    }

    /// May a new STRIKE signal be attempted on this pair right now?
    pub fn may_attempt(&mut self, now: i64) -> bool {
        if self.skip_next_signal {
            self.skip_next_signal = false;
            return false;
        }
        match self.last_close_ts {
            Some(closed_ts) => !in_cooldown((now - closed_ts) / 1000, self.consecutive_wins),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: close,
            high: close,
            low: close,
            close,
            volume: 100.0,
            quote_volume: close * 100.0,
            trades_count: 10,
            taker_buy_volume: 60.0,
            taker_buy_quote_volume: 60.0 * close,
            is_closed: true,
        }
    }

    #[test]
    fn base_cooldown_blocks_reentry_within_90s() {
        assert!(in_cooldown(45, 0));
        assert!(!in_cooldown(91, 0));
    }

    #[test]
    fn three_win_streak_widens_cooldown_to_180s() {
        assert!(in_cooldown(150, 3));
        assert!(!in_cooldown(181, 3));
    }

    #[test]
    fn rejects_entry_when_spread_too_wide() {
        let candles: Vec<Candle> = (0..25).map(|i| candle(100.0 + i as f64 * 0.01)).collect();
        let tuning = PairTuning::default();
        let flow = TradeFlow { buy_volume: 600.0, sell_volume: 400.0, ratio: 0.6 };
        let result = check_entry(&candles, Some(flow), Some(0.2), tuning);
        assert!(result.is_none());
    }

    #[test]
    fn position_size_is_2_5_pct_of_allocated() {
        assert_eq!(position_size_usd(10_000.0), 250.0);
    }

    /// S4 — 3 wins at t=0, 120s, 240s. A 4th attempt at t=360s is denied
    /// (within 180s of the 3rd win's close); at t=421s it is allowed.
    #[test]
    fn strike_cadence_widens_cooldown_after_three_wins() {
        let mut cadence = StrikeCadence::default();
        cadence.record_close(true, 0);
        cadence.record_close(true, 120_000);
        cadence.record_close(true, 240_000);
        assert_eq!(cadence.consecutive_wins, 3);

        assert!(!cadence.may_attempt(360_000), "4th attempt at t=360s must be denied");
        assert!(cadence.may_attempt(421_000), "attempt at t=421s must be allowed");
    }

    #[test]
    fn a_loss_forces_the_next_signal_to_be_skipped() {
        let mut cadence = StrikeCadence::default();
        cadence.record_close(false, 0);
        assert!(!cadence.may_attempt(1_000_000), "the signal right after a loss must be skipped");
        assert!(cadence.may_attempt(1_000_001), "the skip consumes itself; the next check proceeds to cooldown logic");
    }
}
