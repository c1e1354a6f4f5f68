// =============================================================================
// Position Lifecycle Manager — owns every open position end to end
// =============================================================================
//
// Life-cycle: Open -> PartialTp1 -> PartialTp2 -> Closed. Any state can jump
// straight to Closed via stop, trailing stop, timeout, early exit,
// invalidation, emergency exit, or a manual close.
//
// `tick` runs the shared barrier check (`hydra::exit_monitor`, which applies
// identically to HYDRA and VIPER positions since both share the `Position`
// shape) plus the mode-specific checks an ATR barrier can't express: max
// hold time, COIL range invalidation, and LUNGE's EMA-cross emergency exit.
// On a full close it emits a `Trade`, applies realized P&L, and starts the
// pair's cooldown/exclusivity lock.
//
// Thread-safety: positions live behind a single `parking_lot::RwLock`, in
// keeping with the single-owned-store design used throughout this engine.
// =============================================================================

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::hydra;
use crate::types::{now_ms, ExitType, Position, PositionStatus, Trade, ViperMode};
use crate::viper::coil;

/// Result of a single `tick` call.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing fired this tick.
    NoAction,
    /// A partial close fired; the position remains open.
    Partial { exit_type: ExitType, quantity: f64, price: f64 },
    /// A full close fired; the position is gone and its trade recorded.
    Closed(Trade),
}

struct PairLock {
    closed_ts: i64,
}

/// Best-effort mapping from a free-form close reason string (as produced by
/// older call sites) back to a structured `ExitType`.
fn exit_type_from_reason(reason: &str) -> ExitType {
    let lower = reason.to_lowercase();
    if lower.contains("stop") {
        ExitType::Stop
    } else if lower.contains("tp2") || lower.contains("take_profit_2") {
        ExitType::Tp2
    } else if lower.contains("tp1") || lower.contains("take_profit_1") {
        ExitType::Tp1
    } else if lower.contains("trail") {
        ExitType::Trail
    } else if lower.contains("timeout") {
        ExitType::Timeout
    } else if lower.contains("invalid") {
        ExitType::Invalidation
    } else if lower.contains("emergency") {
        ExitType::Emergency
    } else if lower.contains("reversal") {
        ExitType::Reversal
    } else if lower.contains("early") {
        ExitType::Early
    } else {
        ExitType::Manual
    }
}

/// Default taker fee applied when callers don't size their own fee rate.
pub const DEFAULT_FEE_RATE: f64 = 0.001;

/// Thread-safe manager that owns every live position plus the per-pair
/// cooldown lock started when a position closes.
pub struct PositionManager {
    positions: RwLock<HashMap<String, Position>>,
    closed: RwLock<Vec<Trade>>,
    pair_locks: RwLock<HashMap<String, PairLock>>,
    fee_rate: f64,
}

impl PositionManager {
    pub fn new(fee_rate: f64) -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            closed: RwLock::new(Vec::new()),
            pair_locks: RwLock::new(HashMap::new()),
            fee_rate,
        }
    }

    /// Open a position for a pair at the given price with pre-computed
    /// barriers. Returns the new position's id. Long-only: there is no side
    /// parameter because every position is a long.
    pub fn open_position(&self, pair: &str, price: f64, quantity: f64, stop_loss: f64, tp1: f64, tp2: f64) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let position = Position {
            id: id.clone(),
            pair: pair.to_string(),
            strategy: crate::types::StrategyTag::Hydra,
            mode: None,
            entry_price: price,
            quantity,
            cost: price * quantity,
            entry_ts: now_ms(),
            stop_loss,
            tp1,
            tp2,
            tp1_close_pct: 0.40,
            tp2_close_pct: 0.40,
            tp1_hit: false,
            tp2_hit: false,
            trail_distance: 0.0,
            high_since_tp1: 0.0,
            range_support: None,
            range_resistance: None,
            max_hold_ms: 0,
            exit_reason: None,
            dimension_scores: None,
            status: PositionStatus::Open,
            realized_pnl: 0.0,
            current_price: price,
        };
        self.open(position);
        id
    }

    /// Close a position for a stated reason, recording the trade. Returns
    /// the realized net P&L, or `None` if the position wasn't found.
    pub fn close_position(&self, id: &str, reason: &str, exit_price: f64) -> Option<f64> {
        let exit_type = exit_type_from_reason(reason);
        let mut positions = self.positions.write();
        match self.close(&mut positions, id, exit_price, exit_type) {
            TickOutcome::Closed(trade) => Some(trade.net_pnl),
            _ => None,
        }
    }

    /// Most recently closed trades, most recent first, capped at `limit`.
    pub fn get_closed_positions(&self, limit: usize) -> Vec<Trade> {
        let closed = self.closed.read();
        closed.iter().rev().take(limit).cloned().collect()
    }

    /// Refresh the live mark price for every open position on a pair.
    /// Barrier/exit evaluation itself happens in `tick`, not here.
    pub fn update_price(&self, pair: &str, price: f64) {
        let mut positions = self.positions.write();
        for position in positions.values_mut().filter(|p| p.pair == pair) {
            position.current_price = price;
        }
    }

    pub fn open(&self, position: Position) {
        info!(pair = %position.pair, id = %position.id, strategy = %position.strategy, "position opened");
        self.positions.write().insert(position.id.clone(), position);
    }

    pub fn get(&self, id: &str) -> Option<Position> {
        self.positions.read().get(id).cloned()
    }

    pub fn get_open_positions(&self) -> Vec<Position> {
        self.positions.read().values().cloned().collect()
    }

    pub fn open_count(&self) -> usize {
        self.positions.read().len()
    }

    pub fn open_count_for_mode(&self, mode: Option<ViperMode>) -> usize {
        self.positions.read().values().filter(|p| p.mode == mode).count()
    }

    pub fn has_open_position_for_pair(&self, pair: &str) -> bool {
        self.positions.read().values().any(|p| p.pair == pair)
    }

    /// Minutes since this pair's last close, or `None` if it has never closed.
    pub fn minutes_since_last_close(&self, pair: &str, now: i64) -> Option<f64> {
        self.pair_locks.read().get(pair).map(|lock| (now - lock.closed_ts) as f64 / 60_000.0)
    }

    /// Evaluate the shared and mode-specific exit conditions for one position.
    ///
    /// `lunge_emergency` should be `true` when the caller has already
    /// determined EMA9 has crossed below EMA21 on the 15m series for a
    /// LUNGE position; it is ignored for other modes.
    pub fn tick(&self, id: &str, current_price: f64, exit_score: Option<f64>, exit_score_threshold: f64, lunge_emergency: bool) -> TickOutcome {
        let mut positions = self.positions.write();
        let Some(position) = positions.get_mut(id) else {
            return TickOutcome::NoAction;
        };
        position.current_price = current_price;

        if let Some(exit_type) = Self::mode_specific_exit(position, current_price, lunge_emergency) {
            return self.close(&mut positions, id, current_price, exit_type);
        }

        match hydra::evaluate(position, current_price, exit_score, exit_score_threshold) {
            Some(hydra::ExitAction::CloseAll(exit_type)) => self.close(&mut positions, id, current_price, exit_type),
            Some(hydra::ExitAction::ClosePartial(exit_type, close_pct)) => {
                let qty = position.quantity * close_pct;
                info!(pair = %position.pair, id, ?exit_type, qty, price = current_price, "partial close");
                TickOutcome::Partial { exit_type, quantity: qty, price: current_price }
            }
            None => TickOutcome::NoAction,
        }
    }

    fn mode_specific_exit(position: &Position, current_price: f64, lunge_emergency: bool) -> Option<ExitType> {
        let age_ms = now_ms() - position.entry_ts;
        if position.max_hold_ms > 0 && age_ms >= position.max_hold_ms {
            return Some(ExitType::Timeout);
        }

        if let (Some(support), Some(resistance)) = (position.range_support, position.range_resistance) {
            let range = coil::Range { support, resistance, atr: 0.0 };
            if coil::is_range_invalidated(range, current_price) {
                return Some(ExitType::Invalidation);
            }
        }

        if position.mode == Some(ViperMode::Lunge) && lunge_emergency {
            return Some(ExitType::Emergency);
        }

        None
    }

    fn close(&self, positions: &mut HashMap<String, Position>, id: &str, exit_price: f64, exit_type: ExitType) -> TickOutcome {
        let Some(position) = positions.remove(id) else {
            return TickOutcome::NoAction;
        };

        let gross_pnl = (exit_price - position.entry_price) * position.quantity;
        let fees = (position.entry_price * position.quantity + exit_price * position.quantity) * self.fee_rate;
        let net_pnl = gross_pnl - fees;
        let closed_ts = now_ms();

        let trade = Trade {
            id: position.id.clone(),
            pair: position.pair.clone(),
            strategy: position.strategy,
            mode: position.mode,
            entry_price: position.entry_price,
            exit_price,
            quantity: position.quantity,
            entry_ts: position.entry_ts,
            closed_ts,
            pnl: gross_pnl,
            fees,
            net_pnl,
            exit_type,
            dimension_scores: position.dimension_scores,
        };

        self.pair_locks.write().insert(position.pair.clone(), PairLock { closed_ts });
        warn!(pair = %trade.pair, id = %trade.id, ?exit_type, net_pnl, closed_at = %Utc::now().to_rfc3339(), "position closed");
        self.closed.write().push(trade.clone());
        TickOutcome::Closed(trade)
    }

    /// Apply a partial close in place: reduce quantity and accumulate the
    /// realized P&L of the closed slice. Leaves the position open.
    pub fn apply_partial(&self, id: &str, quantity_closed: f64, price: f64) -> f64 {
        let mut positions = self.positions.write();
        let Some(position) = positions.get_mut(id) else {
            return 0.0;
        };
        let gross = (price - position.entry_price) * quantity_closed;
        let fees = (position.entry_price * quantity_closed + price * quantity_closed) * self.fee_rate;
        let net = gross - fees;
        position.quantity -= quantity_closed;
        position.realized_pnl += net;
        net
    }

    pub fn manual_close(&self, id: &str, price: f64) -> TickOutcome {
        let mut positions = self.positions.write();
        self.close(&mut positions, id, price, ExitType::Manual)
    }
}

impl std::fmt::Debug for PositionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionManager").field("open_positions", &self.positions.read().len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StrategyTag;

    fn hydra_position() -> Position {
        Position {
            id: "p1".to_string(),
            pair: "BTCUSDT".to_string(),
            strategy: StrategyTag::Hydra,
            mode: None,
            entry_price: 100.0,
            quantity: 10.0,
            cost: 1000.0,
            entry_ts: now_ms(),
            stop_loss: 97.0,
            tp1: 101.2,
            tp2: 102.5,
            tp1_close_pct: 0.40,
            tp2_close_pct: 0.40,
            tp1_hit: false,
            tp2_hit: false,
            trail_distance: 0.8,
            high_since_tp1: 0.0,
            range_support: None,
            range_resistance: None,
            max_hold_ms: 3_600_000,
            exit_reason: None,
            dimension_scores: None,
            status: PositionStatus::Open,
            realized_pnl: 0.0,
            current_price: 100.0,
        }
    }

    #[test]
    fn open_then_stop_out_closes_and_starts_cooldown() {
        let manager = PositionManager::new(0.001);
        manager.open(hydra_position());
        assert_eq!(manager.open_count(), 1);

        let outcome = manager.tick("p1", 96.0, Some(50.0), 40.0, false);
        match outcome {
            TickOutcome::Closed(trade) => assert_eq!(trade.exit_type, ExitType::Stop),
            other => panic!("expected a close, got {other:?}"),
        }
        assert_eq!(manager.open_count(), 0);
        assert!(manager.minutes_since_last_close("BTCUSDT", now_ms()).is_some());
    }

    #[test]
    fn tp1_partial_leaves_position_open() {
        let manager = PositionManager::new(0.001);
        manager.open(hydra_position());
        let outcome = manager.tick("p1", 101.5, None, 40.0, false);
        assert!(matches!(outcome, TickOutcome::Partial { exit_type: ExitType::Tp1, .. }));
        assert_eq!(manager.open_count(), 1);
    }

    #[test]
    fn timeout_fires_once_max_hold_elapsed() {
        let manager = PositionManager::new(0.001);
        let mut position = hydra_position();
        position.entry_ts = now_ms() - 4_000_000;
        position.max_hold_ms = 3_600_000;
        manager.open(position);

        let outcome = manager.tick("p1", 100.0, Some(50.0), 40.0, false);
        match outcome {
            TickOutcome::Closed(trade) => assert_eq!(trade.exit_type, ExitType::Timeout),
            other => panic!("expected a timeout close, got {other:?}"),
        }
    }

    #[test]
    fn coil_range_invalidation_closes_on_breakout() {
        let manager = PositionManager::new(0.001);
        let mut position = hydra_position();
        position.mode = Some(ViperMode::Coil);
        position.range_support = Some(100.0);
        position.range_resistance = Some(104.0);
        manager.open(position);

        let outcome = manager.tick("p1", 105.0, None, 40.0, false);
        match outcome {
            TickOutcome::Closed(trade) => assert_eq!(trade.exit_type, ExitType::Invalidation),
            other => panic!("expected an invalidation close, got {other:?}"),
        }
    }

    #[test]
    fn lunge_emergency_flag_closes_immediately() {
        let manager = PositionManager::new(0.001);
        let mut position = hydra_position();
        position.mode = Some(ViperMode::Lunge);
        position.range_support = None;
        position.range_resistance = None;
        manager.open(position);

        let outcome = manager.tick("p1", 100.5, None, 40.0, true);
        match outcome {
            TickOutcome::Closed(trade) => assert_eq!(trade.exit_type, ExitType::Emergency),
            other => panic!("expected an emergency close, got {other:?}"),
        }
    }

    #[test]
    fn manual_close_emits_trade_with_manual_exit_type() {
        let manager = PositionManager::new(0.001);
        manager.open(hydra_position());
        let outcome = manager.manual_close("p1", 100.0);
        assert!(matches!(outcome, TickOutcome::Closed(ref t) if t.exit_type == ExitType::Manual));
    }
}
