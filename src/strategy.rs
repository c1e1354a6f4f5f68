// =============================================================================
// Strategy orchestration — HYDRA confluence entries + VIPER meta-strategy
// =============================================================================
//
// Two independent pipelines share the candle store, order books, and risk
// gate but never the same capital: HYDRA evaluates every tracked symbol on
// every tick; VIPER periodically re-elects a single active mode (STRIKE,
// COIL, or LUNGE) across its scanner pairs and only that mode's own entry
// check runs until the next election.
//
// Neither pipeline opens a position directly -- both return a `TradeProposal`
// that still has to clear the risk gate and an execution fill before
// `position_manager.open` sees it. That wiring lives in main.rs, which owns
// the event loop and the execution engine.
// =============================================================================

use chrono::{Timelike, Utc};

use crate::app_state::AppState;
use crate::decision_envelope::DecisionEnvelope;
use crate::hydra;
use crate::indicators::atr::calculate_atr;
use crate::market_data::candle_buffer::CandleKey;
use crate::risk_gate::{self, GateContext};
use crate::types::{now_ms, Regime, StrategyTag, Timeframe, ViperMode};
use crate::viper::{self, coil, lunge, strike};

/// Minimum closed 1m bars before HYDRA will evaluate a symbol at all.
const HYDRA_WARMUP_BARS: usize = 60;
/// How many closed bars of each series are pulled per evaluation.
const LOOKBACK_BARS: usize = 120;

/// A strategy-agnostic, not-yet-opened entry. Carries everything
/// `position_manager.open` needs once the caller has a confirmed fill price.
#[derive(Debug, Clone)]
pub struct TradeProposal {
    pub symbol: String,
    pub side: &'static str,
    pub strategy: StrategyTag,
    pub mode: Option<ViperMode>,
    pub entry_price: f64,
    pub size_usd: f64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp1_close_pct: f64,
    pub tp2_close_pct: f64,
    pub trail_distance: f64,
    pub range_support: Option<f64>,
    pub range_resistance: Option<f64>,
    pub max_hold_ms: i64,
    pub dimension_scores: Option<[f64; 5]>,
    pub confidence: Option<String>,
}

pub struct StrategyEngine;

impl Default for StrategyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyEngine {
    pub fn new() -> Self {
        Self
    }

    // -------------------------------------------------------------------
    // HYDRA
    // -------------------------------------------------------------------

    /// Score `symbol`'s confluence and, if admitted, size an entry.
    pub fn evaluate_hydra(&self, state: &AppState, symbol: &str) -> (DecisionEnvelope, Option<TradeProposal>) {
        let candles_1m = state.candle_buffer.get_closed_candles(&CandleKey::new(symbol, Timeframe::M1), LOOKBACK_BARS);
        let candles_5m = state.candle_buffer.get_closed_candles(&CandleKey::new(symbol, Timeframe::M5), LOOKBACK_BARS);
        let candles_15m = state.candle_buffer.get_closed_candles(&CandleKey::new(symbol, Timeframe::M15), LOOKBACK_BARS);

        if candles_1m.len() < HYDRA_WARMUP_BARS || candles_5m.is_empty() || candles_15m.is_empty() {
            return (
                DecisionEnvelope::blocked(symbol, "BUY", "hydra", "data_quality", "series warming up"),
                None,
            );
        }

        let price = candles_1m.last().map(|c| c.close).unwrap_or(0.0);
        let entry_hour_utc = Utc::now().hour();

        let flow = {
            let trade_procs = state.trade_processors.read();
            trade_procs.get(symbol).map(|tp| tp.current_flow(now_ms()))
        };

        let default_profile = crate::types::SessionProfile::hardcoded_default();
        let session_profile = {
            let session_profiles = state.session_profiles.read();
            session_profiles.get(symbol).cloned().unwrap_or(default_profile)
        };

        let config = state.runtime_config.read().clone();

        let ctx = hydra::HydraContext {
            candles_1m: &candles_1m,
            candles_5m: &candles_5m,
            candles_15m: &candles_15m,
            flow,
            books: &state.orderbook_manager,
            symbol,
            session_profile: &session_profile,
            session_weight: config.hydra.session_weight,
            entry_hour_utc,
        };

        let score = hydra::score(&ctx);

        let regime = state
            .regime_detector
            .current_regime()
            .map(|rs| rs.regime)
            .unwrap_or(Regime::Choppy);

        let entry_threshold = state.hydra_entry_threshold(symbol);
        let entry = hydra::evaluate_entry(&score, entry_threshold, regime);

        if !entry.allowed {
            let reason = entry.reason.unwrap_or_else(|| "not admitted".to_string());
            return (
                DecisionEnvelope::blocked(symbol, "BUY", "hydra", "hydra_scorer", reason),
                None,
            );
        }

        let atr14 = match calculate_atr(&candles_5m, 14) {
            Some(v) if v > 0.0 => v,
            _ => {
                return (
                    DecisionEnvelope::blocked(symbol, "BUY", "hydra", "data_quality", "ATR14 unavailable"),
                    None,
                )
            }
        };

        let allocated_capital = state.hydra_allocated_capital();
        let sizing = match hydra::sizing::compute_sizing(
            allocated_capital,
            config.hydra.risk_per_trade,
            atr14,
            price,
            score.total,
            config.hydra.max_position_pct,
        ) {
            Some(s) => s,
            None => {
                return (
                    DecisionEnvelope::blocked(symbol, "BUY", "hydra", "sizing", "sizing produced no valid result"),
                    None,
                )
            }
        };

        let gate_decision = self.run_hydra_gate(state, &config, symbol, regime, sizing.position_usd, now_ms());
        if !gate_decision.allowed {
            let reason = gate_decision.reason.unwrap_or_else(|| "denied".to_string());
            return (
                DecisionEnvelope::blocked(symbol, "BUY", "hydra", "risk_gate", reason),
                None,
            );
        }

        let proposal = TradeProposal {
            symbol: symbol.to_string(),
            side: "BUY",
            strategy: StrategyTag::Hydra,
            mode: None,
            entry_price: price,
            size_usd: sizing.position_usd * gate_decision.size_multiplier,
            stop_loss: sizing.stop_loss,
            tp1: sizing.take_profit_1,
            tp2: sizing.take_profit_2,
            tp1_close_pct: 0.40,
            tp2_close_pct: 0.40,
            trail_distance: sizing.trail_distance,
            range_support: None,
            range_resistance: None,
            max_hold_ms: 0,
            dimension_scores: Some(score.dimensions()),
            confidence: entry.confidence.map(|c| format!("{c:?}")),
        };

        (DecisionEnvelope::allow(symbol, "BUY", "hydra"), Some(proposal))
    }

    fn run_hydra_gate(
        &self,
        state: &AppState,
        config: &crate::runtime_config::RuntimeConfig,
        symbol: &str,
        regime: Regime,
        proposed_size_usd: f64,
        now: i64,
    ) -> risk_gate::GateDecision {
        let risk_state = state.risk_engine.get_state();
        let allocated_capital = state.hydra_allocated_capital();
        let open_positions = state.position_manager.get_open_positions();
        let open_count = open_positions.len();
        let pair_has_open_position = state.position_manager.has_open_position_for_pair(symbol);
        let minutes_since_last_close = state.position_manager.minutes_since_last_close(symbol, now);
        let spread_pct = state.orderbook_manager.spread_bps(symbol).map(|bps| bps / 100.0);

        let correlated_open_pair = open_positions
            .iter()
            .find(|p| p.pair != symbol && risk_gate::correlation_between(symbol, &p.pair) >= risk_gate::CORRELATION_GUARD_THRESHOLD)
            .map(|p| p.pair.clone());

        let scalp_session = state.scalp_session.read();
        let hydra_paused_until_ms = state.hydra_loss_state.read().paused_until_ts;

        let ctx = GateContext {
            regime,
            mode: None,
            ratchet_allowed_modes: &[],
            open_positions: open_count,
            max_concurrent_positions: config.max_concurrent_positions as usize,
            pair: symbol,
            pair_has_open_position,
            daily_pnl_usd: risk_state.daily_pnl,
            daily_trades_count: risk_state.daily_trades_count,
            max_daily_loss_usd: allocated_capital * (config.max_daily_loss_pct / 100.0),
            max_daily_loss_pct: config.max_daily_loss_pct,
            allocated_capital,
            max_trades_per_day: config.max_trades_per_day,
            hydra_daily_loss_limit_pct: config.hydra.daily_loss_limit_pct,
            minutes_since_last_close,
            cooldown_minutes: 0.0,
            spread_pct,
            is_scalp: false,
            projected_slippage_pct: Some(0.02),
            projected_fees_usd: proposed_size_usd * 0.001,
            projected_gross_usd: proposed_size_usd,
            correlated_open_pair: correlated_open_pair.as_deref(),
            proposed_size_usd,
            min_unit_size_usd: allocated_capital * 0.01,
            signal_ts_ms: now,
            now_ms: now,
            signal_expiry_sec: config.hydra.signal_expiry_sec,
            scalp_session: &scalp_session,
            hydra_paused_until_ms,
        };

        risk_gate::evaluate(&ctx)
    }

    // -------------------------------------------------------------------
    // VIPER
    // -------------------------------------------------------------------

    /// Re-elect the active VIPER mode if the election interval has elapsed,
    /// returning the (possibly unchanged) current mode. Scores are summed
    /// across the configured scanner pairs so one illiquid pair can't swing
    /// the whole engine's mode by itself.
    pub fn maybe_elect_viper_mode(&self, state: &AppState, regime: Regime) -> Option<ViperMode> {
        let config = state.runtime_config.read().clone();
        if !config.viper.enabled {
            return None;
        }
        let interval_ms = config.viper.edge_detector_interval_min * 60_000;
        let now = now_ms();
        let elected_at = *state.viper_mode_elected_at_ms.read();
        let due = now - elected_at >= interval_ms;

        if !due {
            return *state.viper_mode.read();
        }

        let lunge_eligible = regime == Regime::Bullish;

        let mut aggregate = viper::ModeScores { strike: 0.0, coil: 0.0, lunge: 0.0 };
        let mut counted = 0usize;
        for pair in &config.scanner_pairs {
            let candles_1m = state.candle_buffer.get_closed_candles(&CandleKey::new(pair, Timeframe::M1), LOOKBACK_BARS);
            let candles_5m = state.candle_buffer.get_closed_candles(&CandleKey::new(pair, Timeframe::M5), LOOKBACK_BARS);
            let candles_15m = state.candle_buffer.get_closed_candles(&CandleKey::new(pair, Timeframe::M15), LOOKBACK_BARS);
            if candles_1m.len() < 20 {
                continue;
            }
            let spread_pct = state.orderbook_manager.spread_bps(pair).map(|bps| bps / 100.0);
            let flow = {
                let trade_procs = state.trade_processors.read();
                trade_procs.get(pair).map(|tp| tp.current_flow(now_ms()))
            };
            let scores = viper::score_all(&candles_1m, &candles_5m, &candles_15m, spread_pct, flow, lunge_eligible);
            aggregate.strike += scores.strike;
            aggregate.coil += scores.coil;
            aggregate.lunge += scores.lunge;
            counted += 1;
        }

        if counted == 0 {
            return *state.viper_mode.read();
        }

        let ratchet = state.ratchet_state.read().clone();
        let previous = *state.viper_mode.read();
        let elected = viper::elect_admitted_mode(aggregate, &ratchet, previous);

        *state.viper_mode.write() = elected;
        *state.viper_mode_elected_at_ms.write() = now;
        elected
    }

    /// Check the elected mode's own entry condition for `symbol` and, if
    /// admitted, size the entry.
    pub fn evaluate_viper(&self, state: &AppState, symbol: &str, mode: ViperMode) -> (Option<DecisionEnvelope>, Option<TradeProposal>) {
        let config = state.runtime_config.read().clone();
        let ratchet = state.ratchet_state.read().clone();
        if !viper::mode_admitted(&ratchet, mode) {
            return (None, None);
        }

        let hour = Utc::now().hour();
        if hour >= config.viper.overnight_cutoff_hour_utc {
            return (None, None);
        }

        let open_for_mode = state.position_manager.open_count_for_mode(Some(mode));
        let max_concurrent = match mode {
            ViperMode::Strike => strike::MAX_CONCURRENT,
            ViperMode::Coil => coil::MAX_CONCURRENT.min(config.viper.coil_max_positions as usize),
            ViperMode::Lunge => lunge::MAX_CONCURRENT.min(config.viper.lunge_max_positions as usize),
        };
        if open_for_mode >= max_concurrent {
            return (None, None);
        }

        if state.position_manager.has_open_position_for_pair(symbol) {
            return (None, None);
        }

        let proposal = match mode {
            ViperMode::Strike => self.evaluate_strike(state, symbol),
            ViperMode::Coil => self.evaluate_coil(state, symbol),
            ViperMode::Lunge => self.evaluate_lunge(state, symbol),
        };

        let Some(proposal) = proposal else {
            return (None, None);
        };

        let gate_decision = self.run_viper_gate(state, &config, symbol, mode, &ratchet, proposal.size_usd, now_ms());
        if !gate_decision.allowed {
            let reason = gate_decision.reason.unwrap_or_else(|| "denied".to_string());
            return (
                Some(DecisionEnvelope::blocked(symbol, proposal.side, "viper", "risk_gate", reason)),
                None,
            );
        }

        let mut proposal = proposal;
        proposal.size_usd *= gate_decision.size_multiplier;

        (Some(DecisionEnvelope::allow(symbol, proposal.side, "viper")), Some(proposal))
    }

    fn evaluate_strike(&self, state: &AppState, symbol: &str) -> Option<TradeProposal> {
        let now = now_ms();
        {
            let mut cadence = state.strike_cadence.write();
            let entry = cadence.entry(symbol.to_string()).or_default();
            if !entry.may_attempt(now) {
                return None;
            }
        }

        let candles_1m = state.candle_buffer.get_closed_candles(&CandleKey::new(symbol, Timeframe::M1), LOOKBACK_BARS);
        let flow = {
            let trade_procs = state.trade_processors.read();
            trade_procs.get(symbol).map(|tp| tp.current_flow(now))
        };
        let spread_pct = state.orderbook_manager.spread_bps(symbol).map(|bps| bps / 100.0);
        let signal = strike::check_entry(&candles_1m, flow, spread_pct, strike::PairTuning::default())?;

        let allocated_capital = state.viper_allocated_capital();
        let size_usd = strike::position_size_usd(allocated_capital);

        Some(TradeProposal {
            symbol: symbol.to_string(),
            side: "BUY",
            strategy: StrategyTag::Viper,
            mode: Some(ViperMode::Strike),
            entry_price: signal.entry_price,
            size_usd,
            stop_loss: signal.stop_loss,
            tp1: signal.take_profit,
            tp2: signal.take_profit,
            tp1_close_pct: 1.0,
            tp2_close_pct: 0.0,
            trail_distance: 0.0,
            range_support: None,
            range_resistance: None,
            max_hold_ms: signal.max_hold_secs * 1000,
            dimension_scores: None,
            confidence: None,
        })
    }

    fn evaluate_coil(&self, state: &AppState, symbol: &str) -> Option<TradeProposal> {
        let candles_5m = state.candle_buffer.get_closed_candles(&CandleKey::new(symbol, Timeframe::M5), LOOKBACK_BARS);
        let range = coil::detect_range(&candles_5m)?;
        let signal = coil::check_entry(&candles_5m, range)?;

        let allocated_capital = state.viper_allocated_capital();
        let size_usd = coil::position_size_usd(allocated_capital, 1.0);

        Some(TradeProposal {
            symbol: symbol.to_string(),
            side: "BUY",
            strategy: StrategyTag::Viper,
            mode: Some(ViperMode::Coil),
            entry_price: signal.entry_price,
            size_usd,
            stop_loss: signal.stop_loss,
            tp1: signal.take_profit_1,
            tp2: signal.take_profit_2,
            tp1_close_pct: coil::TP1_CLOSE_PCT,
            tp2_close_pct: 1.0 - coil::TP1_CLOSE_PCT,
            trail_distance: 0.0,
            range_support: Some(range.support),
            range_resistance: Some(range.resistance),
            max_hold_ms: 0,
            dimension_scores: None,
            confidence: None,
        })
    }

    fn evaluate_lunge(&self, state: &AppState, symbol: &str) -> Option<TradeProposal> {
        let regime = state
            .regime_detector
            .current_regime()
            .map(|rs| rs.regime)
            .unwrap_or(Regime::Choppy);
        let lunge_eligible = regime == Regime::Bullish;

        let candles_15m = state.candle_buffer.get_closed_candles(&CandleKey::new(symbol, Timeframe::M15), LOOKBACK_BARS);
        let signal = lunge::check_entry(&candles_15m, lunge_eligible)?;

        let allocated_capital = state.viper_allocated_capital();
        let size_usd = lunge::position_size_usd(allocated_capital, signal.entry_price, signal.stop_loss);
        if size_usd <= 0.0 {
            return None;
        }

        Some(TradeProposal {
            symbol: symbol.to_string(),
            side: "BUY",
            strategy: StrategyTag::Viper,
            mode: Some(ViperMode::Lunge),
            entry_price: signal.entry_price,
            size_usd,
            stop_loss: signal.stop_loss,
            tp1: signal.take_profit_1,
            tp2: signal.take_profit_2,
            tp1_close_pct: lunge::TP1_CLOSE_PCT,
            tp2_close_pct: lunge::TP2_CLOSE_PCT,
            trail_distance: signal.trail_distance,
            range_support: None,
            range_resistance: None,
            max_hold_ms: 0,
            dimension_scores: None,
            confidence: None,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn run_viper_gate(
        &self,
        state: &AppState,
        config: &crate::runtime_config::RuntimeConfig,
        symbol: &str,
        mode: ViperMode,
        ratchet: &crate::types::RatchetState,
        proposed_size_usd: f64,
        now: i64,
    ) -> risk_gate::GateDecision {
        let risk_state = state.risk_engine.get_state();
        let allocated_capital = state.viper_allocated_capital();
        let open_positions = state.position_manager.get_open_positions();
        let pair_has_open_position = state.position_manager.has_open_position_for_pair(symbol);
        let minutes_since_last_close = state.position_manager.minutes_since_last_close(symbol, now);
        let spread_pct = state.orderbook_manager.spread_bps(symbol).map(|bps| bps / 100.0);
        let is_scalp = mode == ViperMode::Strike;

        let correlated_open_pair = open_positions
            .iter()
            .find(|p| p.pair != symbol && risk_gate::correlation_between(symbol, &p.pair) >= risk_gate::CORRELATION_GUARD_THRESHOLD)
            .map(|p| p.pair.clone());

        let scalp_session = state.scalp_session.read();
        let regime = state
            .regime_detector
            .current_regime()
            .map(|rs| rs.regime)
            .unwrap_or(Regime::Choppy);

        let cooldown_minutes = if is_scalp { strike::BASE_COOLDOWN_SECS as f64 / 60.0 } else { 0.0 };

        let ctx = GateContext {
            regime,
            mode: Some(mode),
            ratchet_allowed_modes: ratchet.level.allowed_modes(),
            open_positions: open_positions.len(),
            max_concurrent_positions: config.max_concurrent_positions as usize,
            pair: symbol,
            pair_has_open_position,
            daily_pnl_usd: risk_state.daily_pnl,
            daily_trades_count: risk_state.daily_trades_count,
            max_daily_loss_usd: allocated_capital * (config.viper.max_daily_loss_pct / 100.0),
            max_daily_loss_pct: config.viper.max_daily_loss_pct,
            allocated_capital,
            max_trades_per_day: config.max_trades_per_day,
            hydra_daily_loss_limit_pct: config.hydra.daily_loss_limit_pct,
            minutes_since_last_close,
            cooldown_minutes,
            spread_pct,
            is_scalp,
            projected_slippage_pct: Some(0.02),
            projected_fees_usd: proposed_size_usd * 0.001,
            projected_gross_usd: proposed_size_usd,
            correlated_open_pair: correlated_open_pair.as_deref(),
            proposed_size_usd,
            min_unit_size_usd: allocated_capital * 0.01,
            signal_ts_ms: now,
            now_ms: now,
            signal_expiry_sec: 30,
            scalp_session: &scalp_session,
            hydra_paused_until_ms: None,
        };

        risk_gate::evaluate(&ctx)
    }

    // -------------------------------------------------------------------
    // Shared
    // -------------------------------------------------------------------

    /// Recompute HYDRA's exit-score (D1+D2+D3, capped at 60) for an open
    /// position's symbol. Used by the position tick loop's early-exit
    /// check; `None` means the series hasn't warmed up and no early exit
    /// should fire this tick.
    pub fn hydra_exit_score(&self, state: &AppState, symbol: &str) -> Option<f64> {
        let candles_1m = state.candle_buffer.get_closed_candles(&CandleKey::new(symbol, Timeframe::M1), LOOKBACK_BARS);
        let candles_5m = state.candle_buffer.get_closed_candles(&CandleKey::new(symbol, Timeframe::M5), LOOKBACK_BARS);
        let candles_15m = state.candle_buffer.get_closed_candles(&CandleKey::new(symbol, Timeframe::M15), LOOKBACK_BARS);
        if candles_1m.len() < HYDRA_WARMUP_BARS || candles_5m.is_empty() || candles_15m.is_empty() {
            return None;
        }

        let flow = {
            let trade_procs = state.trade_processors.read();
            trade_procs.get(symbol).map(|tp| tp.current_flow(now_ms()))
        };
        let default_profile = crate::types::SessionProfile::hardcoded_default();
        let session_profile = {
            let session_profiles = state.session_profiles.read();
            session_profiles.get(symbol).cloned().unwrap_or(default_profile)
        };
        let config = state.runtime_config.read().clone();

        let ctx = hydra::HydraContext {
            candles_1m: &candles_1m,
            candles_5m: &candles_5m,
            candles_15m: &candles_15m,
            flow,
            books: &state.orderbook_manager,
            symbol,
            session_profile: &session_profile,
            session_weight: config.hydra.session_weight,
            entry_hour_utc: Utc::now().hour(),
        };

        Some(hydra::score(&ctx).exit_score())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_engine_constructs() {
        let _engine = StrategyEngine::new();
    }
}
