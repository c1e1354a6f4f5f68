// =============================================================================
// Risk & Portfolio Gate — 11 ordered hard-veto admission checks
// =============================================================================
//
// Run in strict order before any entry is admitted; the first failing check
// denies the trade. Checked in order:
//
//   1.  regime override      — HYDRA entries denied while the regime reads bearish
//   2.  mode/ratchet admission — a VIPER mode must be in the ratchet's allowed set
//   3.  global caps           — max concurrent positions, per-pair exclusivity
//   4.  daily limits          — max daily loss (USD/%), max trades/day, HYDRA daily-loss cap
//   5.  cooldown               — minutes since the pair's last close
//   6.  spread guard           — 0.08% for scalps, 0.25% otherwise
//   7.  slippage guard         — projected slippage > 0.15% denies
//   8.  fee check              — fees > 50% of projected gross denies scalps, warns otherwise
//   9.  correlation guard      — correlated open pair halves size, denies at the size floor
//   10. signal expiry          — stale signals (older than signalExpirySec) denied
//   11. scalp circuit breaker  — consecutive scalp losses / session loss cap
//   12. HYDRA loss pause       — consecutive HYDRA losses suspend HYDRA entries
//
// The correlation table below is data, not code: ticker-profile correlation
// is not derived from a live estimator, it is a maintained static table of
// known-correlated pairs.
// =============================================================================

use crate::types::{Regime, ScalpSession, ViperMode};

pub const MAX_SPREAD_SCALP_PCT: f64 = 0.08;
pub const MAX_SPREAD_SWING_PCT: f64 = 0.25;
pub const MAX_SLIPPAGE_PCT: f64 = 0.15;
pub const MAX_FEE_SHARE_OF_GROSS: f64 = 0.50;
pub const CORRELATION_GUARD_THRESHOLD: f64 = 0.85;
pub const SCALP_CONSECUTIVE_LOSS_SHORT_PAUSE: u32 = 3;
pub const SCALP_CONSECUTIVE_LOSS_LONG_PAUSE: u32 = 5;
pub const SCALP_SHORT_PAUSE_MIN: i64 = 15;
pub const SCALP_LONG_PAUSE_MIN: i64 = 60;
pub const SCALP_SESSION_LOSS_CAP_PCT: f64 = 1.0;

/// Known correlated pairs and their approximate correlation coefficient.
/// Maintained as a static table rather than a rolling estimate; extend this
/// list as new correlated listings are added to the scanner universe.
pub const CORRELATED_PAIRS: &[(&str, &str, f64)] = &[
    ("BTCUSDT", "ETHUSDT", 0.85),
    ("BTCUSDT", "SOLUSDT", 0.80),
    ("ETHUSDT", "SOLUSDT", 0.78),
];

pub fn correlation_between(a: &str, b: &str) -> f64 {
    CORRELATED_PAIRS
        .iter()
        .find(|(x, y, _)| (x == &a && y == &b) || (x == &b && y == &a))
        .map(|(_, _, corr)| *corr)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    /// Multiplicative adjustment to the proposed position size (1.0 = unchanged).
    pub size_multiplier: f64,
}

impl GateDecision {
    fn allow() -> Self {
        Self { allowed: true, reason: None, size_multiplier: 1.0 }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()), size_multiplier: 1.0 }
    }
}

pub struct GateContext<'a> {
    pub regime: Regime,
    pub mode: Option<ViperMode>,
    pub ratchet_allowed_modes: &'a [ViperMode],
    pub open_positions: usize,
    pub max_concurrent_positions: usize,
    pub pair: &'a str,
    pub pair_has_open_position: bool,
    pub daily_pnl_usd: f64,
    pub daily_trades_count: u32,
    pub max_daily_loss_usd: f64,
    pub max_daily_loss_pct: f64,
    pub allocated_capital: f64,
    pub max_trades_per_day: u32,
    pub hydra_daily_loss_limit_pct: f64,
    pub minutes_since_last_close: Option<f64>,
    pub cooldown_minutes: f64,
    pub spread_pct: Option<f64>,
    pub is_scalp: bool,
    pub projected_slippage_pct: Option<f64>,
    pub projected_fees_usd: f64,
    pub projected_gross_usd: f64,
    pub correlated_open_pair: Option<&'a str>,
    pub proposed_size_usd: f64,
    pub min_unit_size_usd: f64,
    pub signal_ts_ms: i64,
    pub now_ms: i64,
    pub signal_expiry_sec: i64,
    pub scalp_session: &'a ScalpSession,
    /// HYDRA's consecutive-loss pause expiry, if active. Ignored for VIPER
    /// candidates (`mode.is_some()`), which have their own circuit breaker.
    pub hydra_paused_until_ms: Option<i64>,
}

pub fn evaluate(ctx: &GateContext) -> GateDecision {
    // 1. Regime override
    if ctx.mode.is_none() && ctx.regime == Regime::Bearish {
        return GateDecision::deny("HYDRA entries denied while regime is bearish");
    }

    // 2. Mode/ratchet admission
    if let Some(mode) = ctx.mode {
        if !ctx.ratchet_allowed_modes.contains(&mode) {
            return GateDecision::deny(format!("{mode:?} not admitted at current ratchet level"));
        }
    }

    // 3. Global caps
    if ctx.open_positions >= ctx.max_concurrent_positions {
        return GateDecision::deny(format!("max concurrent positions reached ({}/{})", ctx.open_positions, ctx.max_concurrent_positions));
    }
    if ctx.pair_has_open_position {
        return GateDecision::deny(format!("{} already has an open position", ctx.pair));
    }

    // 4. Daily limits
    let daily_loss_usd = (-ctx.daily_pnl_usd).max(0.0);
    if daily_loss_usd >= ctx.max_daily_loss_usd {
        return GateDecision::deny(format!("daily loss limit reached (${daily_loss_usd:.2} / ${:.2})", ctx.max_daily_loss_usd));
    }
    let daily_loss_pct = if ctx.allocated_capital > 0.0 { daily_loss_usd / ctx.allocated_capital * 100.0 } else { 0.0 };
    if daily_loss_pct >= ctx.max_daily_loss_pct {
        return GateDecision::deny(format!("daily loss {daily_loss_pct:.2}% exceeds {:.2}% cap", ctx.max_daily_loss_pct));
    }
    if ctx.daily_trades_count >= ctx.max_trades_per_day {
        return GateDecision::deny(format!("max trades per day reached ({})", ctx.max_trades_per_day));
    }
    if ctx.mode.is_none() && daily_loss_pct >= ctx.hydra_daily_loss_limit_pct {
        return GateDecision::deny(format!("HYDRA daily loss cap reached ({:.2}%)", ctx.hydra_daily_loss_limit_pct));
    }

    // 5. Cooldown
    if let Some(minutes) = ctx.minutes_since_last_close {
        if minutes < ctx.cooldown_minutes {
            return GateDecision::deny(format!("{} in cooldown ({:.1}m / {:.1}m)", ctx.pair, minutes, ctx.cooldown_minutes));
        }
    }

    // 6. Spread guard
    //
    // A degraded/untracked book denies any depth-dependent candidate (VIPER,
    // which trades off the book directly) but not HYDRA: HYDRA's D4
    // microstructure dimension already folds spread into the score with
    // D4 = 0 when unmeasured, so an unknown spread here just means "not
    // blocked unless measurable", not an automatic denial.
    let max_spread = if ctx.is_scalp { MAX_SPREAD_SCALP_PCT } else { MAX_SPREAD_SWING_PCT };
    match ctx.spread_pct {
        Some(spread) if spread > max_spread => {
            return GateDecision::deny(format!("spread {spread:.3}% exceeds {max_spread:.2}% limit"));
        }
        None if ctx.mode.is_some() => return GateDecision::deny("spread unknown, depth degraded"),
        _ => {}
    }

    // 7. Slippage guard
    if let Some(slippage) = ctx.projected_slippage_pct {
        if slippage > MAX_SLIPPAGE_PCT {
            return GateDecision::deny(format!("projected slippage {slippage:.3}% exceeds {MAX_SLIPPAGE_PCT:.2}% limit"));
        }
    }

    // 8. Fee check
    if ctx.projected_gross_usd > 0.0 {
        let fee_share = ctx.projected_fees_usd / ctx.projected_gross_usd;
        if fee_share > MAX_FEE_SHARE_OF_GROSS {
            if ctx.is_scalp {
                return GateDecision::deny(format!("fees are {:.0}% of projected gross, scalp denied", fee_share * 100.0));
            }
            tracing::warn!(pair = ctx.pair, fee_share, "fees exceed half of projected gross on a swing entry, allowing with warning");
        }
    }

    // 9. Correlation guard
    let mut size_multiplier = 1.0;
    if let Some(other_pair) = ctx.correlated_open_pair {
        if correlation_between(ctx.pair, other_pair) >= CORRELATION_GUARD_THRESHOLD {
            if ctx.proposed_size_usd <= ctx.min_unit_size_usd {
                return GateDecision::deny(format!("{} correlated with open {other_pair} position at minimum size already", ctx.pair));
            }
            size_multiplier = 0.5;
        }
    }

    // 10. Signal expiry
    let age_sec = (ctx.now_ms - ctx.signal_ts_ms) / 1000;
    if age_sec > ctx.signal_expiry_sec {
        return GateDecision::deny(format!("signal expired ({age_sec}s old, limit {}s)", ctx.signal_expiry_sec));
    }

    // 11. Scalp circuit breaker
    if ctx.is_scalp {
        if let Some(deny_reason) = scalp_circuit_breaker_denial(ctx.scalp_session, ctx.now_ms) {
            return GateDecision::deny(deny_reason);
        }
    }

    // 12. HYDRA consecutive-loss pause
    if ctx.mode.is_none() {
        if let Some(paused_until) = ctx.hydra_paused_until_ms {
            if ctx.now_ms < paused_until {
                let remaining_min = (paused_until - ctx.now_ms) / 60_000;
                return GateDecision::deny(format!("HYDRA paused after consecutive losses, {remaining_min}m remaining"));
            }
        }
    }

    GateDecision { allowed: true, reason: None, size_multiplier }
}

fn scalp_circuit_breaker_denial(session: &ScalpSession, now_ms: i64) -> Option<String> {
    if session.disabled {
        return Some("scalps disabled for session, net session loss cap breached".to_string());
    }
    if let Some(paused_until) = session.paused_until_ts {
        if now_ms < paused_until {
            let remaining_sec = (paused_until - now_ms) / 1000;
            return Some(format!("scalp circuit breaker active, {remaining_sec}s remaining"));
        }
    }
    None
}

/// Compute the pause duration a losing streak should trigger, or `None` if
/// the streak hasn't crossed a breaker threshold.
pub fn consecutive_loss_pause_minutes(consecutive_losses: u32) -> Option<i64> {
    if consecutive_losses >= SCALP_CONSECUTIVE_LOSS_LONG_PAUSE {
        Some(SCALP_LONG_PAUSE_MIN)
    } else if consecutive_losses >= SCALP_CONSECUTIVE_LOSS_SHORT_PAUSE {
        Some(SCALP_SHORT_PAUSE_MIN)
    } else {
        None
    }
}

/// Should scalps be disabled outright for the rest of the session?
pub fn session_loss_cap_breached(net_pnl: f64, allocated_capital: f64) -> bool {
    if allocated_capital <= 0.0 {
        return false;
    }
    (-net_pnl / allocated_capital) * 100.0 >= SCALP_SESSION_LOSS_CAP_PCT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ctx<'a>(session: &'a ScalpSession) -> GateContext<'a> {
        GateContext {
            regime: Regime::Choppy,
            mode: None,
            ratchet_allowed_modes: &[],
            open_positions: 0,
            max_concurrent_positions: 3,
            pair: "BTCUSDT",
            pair_has_open_position: false,
            daily_pnl_usd: 0.0,
            daily_trades_count: 0,
            max_daily_loss_usd: 500.0,
            max_daily_loss_pct: 5.0,
            allocated_capital: 10_000.0,
            max_trades_per_day: 50,
            hydra_daily_loss_limit_pct: 5.0,
            minutes_since_last_close: None,
            cooldown_minutes: 0.0,
            spread_pct: Some(0.05),
            is_scalp: false,
            projected_slippage_pct: Some(0.05),
            projected_fees_usd: 1.0,
            projected_gross_usd: 100.0,
            correlated_open_pair: None,
            proposed_size_usd: 500.0,
            min_unit_size_usd: 50.0,
            signal_ts_ms: 0,
            now_ms: 1_000,
            signal_expiry_sec: 30,
            scalp_session: session,
            hydra_paused_until_ms: None,
        }
    }

    #[test]
    fn regime_override_denies_hydra_in_bearish_regime() {
        let session = ScalpSession::default();
        let mut ctx = base_ctx(&session);
        ctx.regime = Regime::Bearish;
        let decision = evaluate(&ctx);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("bearish"));
    }

    /// S1 — spread of 0.401% blocks entry with the literal reason text.
    #[test]
    fn wide_spread_denies_with_formatted_reason() {
        let session = ScalpSession::default();
        let mut ctx = base_ctx(&session);
        ctx.spread_pct = Some(0.401);
        let decision = evaluate(&ctx);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("0.401%"));
    }

    #[test]
    fn scalp_spread_limit_is_tighter_than_swing() {
        let session = ScalpSession::default();
        let mut ctx = base_ctx(&session);
        ctx.is_scalp = true;
        ctx.spread_pct = Some(0.10);
        let decision = evaluate(&ctx);
        assert!(!decision.allowed, "0.10% exceeds the 0.08% scalp limit even though it passes the swing limit");
    }

    #[test]
    fn unknown_spread_denies_depth_degraded_viper() {
        let session = ScalpSession::default();
        let mut ctx = base_ctx(&session);
        ctx.mode = Some(ViperMode::Strike);
        ctx.ratchet_allowed_modes = &[ViperMode::Strike];
        ctx.spread_pct = None;
        let decision = evaluate(&ctx);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("depth degraded"));
    }

    /// HYDRA (mode: None) already folds an unmeasurable spread into its own
    /// D4 = 0 scoring, so a degraded book must not deny it here.
    #[test]
    fn unknown_spread_does_not_deny_hydra() {
        let session = ScalpSession::default();
        let mut ctx = base_ctx(&session);
        ctx.mode = None;
        ctx.spread_pct = None;
        let decision = evaluate(&ctx);
        assert!(decision.allowed);
    }

    #[test]
    fn correlation_guard_halves_size_above_threshold() {
        let session = ScalpSession::default();
        let mut ctx = base_ctx(&session);
        ctx.correlated_open_pair = Some("ETHUSDT");
        let decision = evaluate(&ctx);
        assert!(decision.allowed);
        assert_eq!(decision.size_multiplier, 0.5);
    }

    #[test]
    fn correlation_guard_denies_when_already_at_minimum_size() {
        let session = ScalpSession::default();
        let mut ctx = base_ctx(&session);
        ctx.correlated_open_pair = Some("ETHUSDT");
        ctx.proposed_size_usd = 50.0;
        ctx.min_unit_size_usd = 50.0;
        let decision = evaluate(&ctx);
        assert!(!decision.allowed);
    }

    #[test]
    fn hydra_loss_pause_denies_until_expiry() {
        let session = ScalpSession::default();
        let mut ctx = base_ctx(&session);
        ctx.mode = None;
        ctx.hydra_paused_until_ms = Some(5_000);
        ctx.now_ms = 1_000;
        let decision = evaluate(&ctx);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("consecutive losses"));

        ctx.now_ms = 5_001;
        assert!(evaluate(&ctx).allowed);
    }

    #[test]
    fn hydra_loss_pause_does_not_apply_to_viper() {
        let session = ScalpSession::default();
        let mut ctx = base_ctx(&session);
        ctx.mode = Some(ViperMode::Strike);
        ctx.ratchet_allowed_modes = &[ViperMode::Strike];
        ctx.hydra_paused_until_ms = Some(5_000);
        ctx.now_ms = 1_000;
        assert!(evaluate(&ctx).allowed);
    }

    #[test]
    fn stale_signal_is_denied() {
        let session = ScalpSession::default();
        let mut ctx = base_ctx(&session);
        ctx.now_ms = 40_000;
        ctx.signal_ts_ms = 0;
        ctx.signal_expiry_sec = 30;
        let decision = evaluate(&ctx);
        assert!(!decision.allowed);
    }

    #[test]
    fn three_consecutive_scalp_losses_pause_15_minutes() {
        assert_eq!(consecutive_loss_pause_minutes(3), Some(SCALP_SHORT_PAUSE_MIN));
        assert_eq!(consecutive_loss_pause_minutes(2), None);
    }

    #[test]
    fn five_consecutive_scalp_losses_pause_60_minutes() {
        assert_eq!(consecutive_loss_pause_minutes(5), Some(SCALP_LONG_PAUSE_MIN));
    }

    #[test]
    fn session_loss_cap_of_one_pct_disables_scalps() {
        assert!(session_loss_cap_breached(-100.0, 10_000.0));
        assert!(!session_loss_cap_breached(-50.0, 10_000.0));
    }

    #[test]
    fn paused_scalp_session_denies_entries_until_window_elapses() {
        let mut session = ScalpSession::default();
        session.paused_until_ts = Some(10_000);
        let mut ctx = base_ctx(&session);
        ctx.is_scalp = true;
        ctx.spread_pct = Some(0.05);
        ctx.now_ms = 5_000;
        let decision = evaluate(&ctx);
        assert!(!decision.allowed);
    }
}
