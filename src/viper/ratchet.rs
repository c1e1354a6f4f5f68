// =============================================================================
// VIPER Ratchet System — capital-preservation escalation
// =============================================================================
//
// Thresholds, in percent of allocated capital, compared against the
// session's high-water mark (`max(currentPnLPct, dailyHighPnLPct)`):
//
//   PROTECTED    >= +0.5%
//   PRESERVATION >= +1.0%
//   LOCKED       >= +2.0%
//   RECOVERY     while the session is still at NORMAL and currentPnLPct < 0
//
// The level only ever moves toward tighter within a session; it resets to
// NORMAL only when the configured overnight cutoff hour (UTC) is crossed.
// =============================================================================

use crate::types::{now_ms, RatchetLevel, RatchetState};

pub const PROTECTED_THRESHOLD_PCT: f64 = 0.5;
pub const PRESERVATION_THRESHOLD_PCT: f64 = 1.0;
pub const LOCKED_THRESHOLD_PCT: f64 = 2.0;

/// Re-evaluate the ratchet level after a realized trade. `current_pnl_pct`
/// is the day's running P&L as a percent of allocated capital.
pub fn evaluate(state: &mut RatchetState, current_pnl_pct: f64, daily_pnl: f64, now: i64, overnight_cutoff_hour_utc: u32) {
    maybe_reset(state, now, overnight_cutoff_hour_utc);

    state.daily_pnl = daily_pnl;
    state.daily_pnl_pct = current_pnl_pct;
    state.daily_high_pnl_pct = state.daily_high_pnl_pct.max(current_pnl_pct);

    let target = target_level(state.daily_high_pnl_pct, current_pnl_pct);
    state.level = tighten_toward(state.level, target);
}

fn target_level(high_water_pct: f64, current_pct: f64) -> RatchetLevel {
    if current_pct < 0.0 {
        return RatchetLevel::Recovery;
    }
    if high_water_pct >= LOCKED_THRESHOLD_PCT {
        RatchetLevel::Locked
    } else if high_water_pct >= PRESERVATION_THRESHOLD_PCT {
        RatchetLevel::Preservation
    } else if high_water_pct >= PROTECTED_THRESHOLD_PCT {
        RatchetLevel::Protected
    } else {
        RatchetLevel::Normal
    }
}

/// RECOVERY only ever applies from an untightened session (NORMAL); once the
/// session has tightened past NORMAL, a later intraday dip below zero must
/// not loosen it back to RECOVERY's sizing multiplier.
fn tighten_toward(current: RatchetLevel, target: RatchetLevel) -> RatchetLevel {
    if target == RatchetLevel::Recovery {
        return if current == RatchetLevel::Normal { RatchetLevel::Recovery } else { current };
    }
    if target.tightness_rank() > current.tightness_rank() {
        target
    } else {
        current
    }
}

fn trading_day_id(ts_ms: i64, cutoff_hour_utc: u32) -> i64 {
    let shifted = ts_ms - (cutoff_hour_utc as i64) * 3_600_000;
    shifted.div_euclid(86_400_000)
}

fn maybe_reset(state: &mut RatchetState, now: i64, overnight_cutoff_hour_utc: u32) {
    if trading_day_id(now, overnight_cutoff_hour_utc) != trading_day_id(state.session_started_ts, overnight_cutoff_hour_utc) {
        *state = RatchetState {
            level: RatchetLevel::Normal,
            daily_pnl: 0.0,
            daily_pnl_pct: 0.0,
            daily_high_pnl_pct: 0.0,
            session_started_ts: now,
        };
    }
}

pub fn new_session(now: i64) -> RatchetState {
    RatchetState { level: RatchetLevel::Normal, daily_pnl: 0.0, daily_pnl_pct: 0.0, daily_high_pnl_pct: 0.0, session_started_ts: now }
}

pub fn new_session_now() -> RatchetState {
    new_session(now_ms())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S3 — VIPER daily P&L path +0.2% -> +0.6% -> +1.1% -> +0.9%.
    /// Level path: NORMAL -> PROTECTED -> PRESERVATION -> PRESERVATION.
    #[test]
    fn ratchet_tightens_and_never_loosens_on_intraday_dip() {
        let mut state = new_session(0);
        let cutoff = 0;

        evaluate(&mut state, 0.2, 20.0, 1_000, cutoff);
        assert_eq!(state.level, RatchetLevel::Normal);

        evaluate(&mut state, 0.6, 60.0, 2_000, cutoff);
        assert_eq!(state.level, RatchetLevel::Protected);

        evaluate(&mut state, 1.1, 110.0, 3_000, cutoff);
        assert_eq!(state.level, RatchetLevel::Preservation);

        evaluate(&mut state, 0.9, 90.0, 4_000, cutoff);
        assert_eq!(state.level, RatchetLevel::Preservation);
    }

    #[test]
    fn locked_at_two_percent_high_water() {
        let mut state = new_session(0);
        evaluate(&mut state, 2.1, 210.0, 1_000, 0);
        assert_eq!(state.level, RatchetLevel::Locked);
        assert_eq!(state.level.size_multiplier(), 0.0);
        assert!(state.level.allowed_modes().is_empty());
    }

    #[test]
    fn recovery_only_applies_from_untightened_session() {
        let mut state = new_session(0);
        evaluate(&mut state, 0.6, 60.0, 1_000, 0);
        assert_eq!(state.level, RatchetLevel::Protected);

        evaluate(&mut state, -0.3, -30.0, 2_000, 0);
        assert_eq!(state.level, RatchetLevel::Protected, "a tightened session must not loosen to RECOVERY");
    }

    #[test]
    fn fresh_session_goes_to_recovery_on_negative_pnl() {
        let mut state = new_session(0);
        evaluate(&mut state, -0.5, -50.0, 1_000, 0);
        assert_eq!(state.level, RatchetLevel::Recovery);
    }

    #[test]
    fn crossing_overnight_cutoff_resets_to_normal() {
        let mut state = new_session(0);
        evaluate(&mut state, 1.5, 150.0, 1_000, 0);
        assert_eq!(state.level, RatchetLevel::Preservation);

        let next_day = 86_400_000 + 1_000;
        evaluate(&mut state, 0.1, 10.0, next_day, 0);
        assert_eq!(state.level, RatchetLevel::Normal);
        assert_eq!(state.daily_high_pnl_pct, 0.1);
    }
}
