// =============================================================================
// HYDRA exit monitor — ordered barrier evaluation
// =============================================================================
//
// Checked in strict priority order on every price tick, first match wins:
//
//   1. stop       — price <= stop_loss                       -> full close
//   2. tp1        — price >= tp1 (not yet hit)                -> close 40%
//   3. tp2        — price >= tp2 (not yet hit)                -> close 40%
//   4. trail      — after tp1 has hit, price retraces more
//                   than `trail_distance` off the post-tp1 high -> full close
//   5. early exit — D1+D2+D3 (max 60) drops below the
//                   configured threshold                       -> full close
//
// This is the opposite order from a naive "biggest profit first" check:
// checking TP2 before TP1 would let a position skip straight past the first
// partial take and silently overshoot the 40%/40% scale-out plan.
// =============================================================================

use crate::types::{ExitType, Position, PositionStatus};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitAction {
    /// Full close of whatever quantity remains.
    CloseAll(ExitType),
    /// Partial close of `close_pct` of the original quantity.
    ClosePartial(ExitType, f64),
}

/// Evaluate one position against the current price and, optionally, the
/// latest HYDRA exit-score (D1+D2+D3, capped at 60) and its configured
/// early-exit threshold. Mutates `position`'s bookkeeping fields
/// (`tp1_hit`/`tp2_hit`/`high_since_tp1`) as a side effect of a tp1 fire so
/// the trailing check has a reference point on the very next tick.
pub fn evaluate(position: &mut Position, current_price: f64, exit_score: Option<f64>, exit_score_threshold: f64) -> Option<ExitAction> {
    if current_price <= position.stop_loss {
        return Some(ExitAction::CloseAll(ExitType::Stop));
    }

    if !position.tp1_hit && current_price >= position.tp1 {
        position.tp1_hit = true;
        position.status = PositionStatus::PartialTp1;
        position.high_since_tp1 = current_price;
        return Some(ExitAction::ClosePartial(ExitType::Tp1, position.tp1_close_pct));
    }

    if position.tp1_hit && !position.tp2_hit && current_price >= position.tp2 {
        position.tp2_hit = true;
        position.status = PositionStatus::PartialTp2;
        position.high_since_tp1 = position.high_since_tp1.max(current_price);
        return Some(ExitAction::ClosePartial(ExitType::Tp2, position.tp2_close_pct));
    }

    if position.tp1_hit {
        position.high_since_tp1 = position.high_since_tp1.max(current_price);
        let retraced = position.high_since_tp1 - current_price;
        if retraced >= position.trail_distance {
            return Some(ExitAction::CloseAll(ExitType::Trail));
        }
    }

    if let Some(score) = exit_score {
        if score < exit_score_threshold {
            return Some(ExitAction::CloseAll(ExitType::Early));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{now_ms, StrategyTag};

    fn open_position() -> Position {
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
    fn stop_fires_before_anything_else() {
        let mut p = open_position();
        let action = evaluate(&mut p, 96.0, Some(10.0), 40.0);
        assert_eq!(action, Some(ExitAction::CloseAll(ExitType::Stop)));
    }

    #[test]
    fn tp1_fires_as_partial_close_and_marks_hit() {
        let mut p = open_position();
        let action = evaluate(&mut p, 101.5, None, 40.0);
        assert_eq!(action, Some(ExitAction::ClosePartial(ExitType::Tp1, 0.40)));
        assert!(p.tp1_hit);
        assert_eq!(p.status, PositionStatus::PartialTp1);
    }

    #[test]
    fn tp2_does_not_fire_before_tp1_even_if_price_jumps_past_both() {
        let mut p = open_position();
        let action = evaluate(&mut p, 103.0, None, 40.0);
        assert_eq!(action, Some(ExitAction::ClosePartial(ExitType::Tp1, 0.40)));
        assert!(!p.tp2_hit);
    }

    #[test]
    fn tp2_fires_after_tp1_already_hit() {
        let mut p = open_position();
        p.tp1_hit = true;
        p.status = PositionStatus::PartialTp1;
        p.high_since_tp1 = 101.2;
        let action = evaluate(&mut p, 102.6, None, 40.0);
        assert_eq!(action, Some(ExitAction::ClosePartial(ExitType::Tp2, 0.40)));
        assert!(p.tp2_hit);
    }

    #[test]
    fn trail_fires_after_tp1_when_price_retraces_past_trail_distance() {
        let mut p = open_position();
        p.tp1_hit = true;
        p.high_since_tp1 = 102.0;
        let action = evaluate(&mut p, 101.1, None, 40.0);
        assert_eq!(action, Some(ExitAction::CloseAll(ExitType::Trail)));
    }

    #[test]
    fn early_exit_fires_only_when_no_barrier_triggered_and_score_below_threshold() {
        let mut p = open_position();
        let action = evaluate(&mut p, 100.5, Some(35.0), 40.0);
        assert_eq!(action, Some(ExitAction::CloseAll(ExitType::Early)));
    }

    #[test]
    fn no_exit_when_nothing_triggers() {
        let mut p = open_position();
        let action = evaluate(&mut p, 100.5, Some(50.0), 40.0);
        assert_eq!(action, None);
    }

    /// Full position walk: entry 100, tp1=101.2, tp2=102.5, trail=0.8, price
    /// path 100 -> 101.3 -> 101.7 -> 102.6 -> 101.7.
    #[test]
    fn full_trade_walk_scales_out_tp1_then_tp2_then_trails_remainder() {
        let mut p = open_position();

        let a1 = evaluate(&mut p, 101.3, None, 40.0);
        assert_eq!(a1, Some(ExitAction::ClosePartial(ExitType::Tp1, 0.40)));

        let a2 = evaluate(&mut p, 101.7, None, 40.0);
        assert_eq!(a2, None);

        let a3 = evaluate(&mut p, 102.6, None, 40.0);
        assert_eq!(a3, Some(ExitAction::ClosePartial(ExitType::Tp2, 0.40)));

        let a4 = evaluate(&mut p, 101.7, None, 40.0);
        assert_eq!(a4, Some(ExitAction::CloseAll(ExitType::Trail)));
    }
}
