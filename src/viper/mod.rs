// =============================================================================
// VIPER — meta-strategy: periodic mode election over three momentum/reversion
// playbooks, gated by the ratchet system and scored against a performance
// ledger for capital-allocation feedback.
// =============================================================================

pub mod coil;
pub mod edge_detector;
pub mod ledger;
pub mod lunge;
pub mod ratchet;
pub mod strike;

pub use edge_detector::{score_all, ModeScores};
pub use ledger::PerformanceLedger;

use crate::types::{RatchetState, ViperMode};

/// Is `mode` currently admissible under the ratchet's allowed-modes list?
pub fn mode_admitted(state: &RatchetState, mode: ViperMode) -> bool {
    state.level.allowed_modes().contains(&mode)
}

/// Elect a mode from the latest scores, filtered to what the ratchet still
/// allows. A mode barred by the ratchet is treated as if it scored zero.
pub fn elect_admitted_mode(scores: ModeScores, state: &RatchetState, previous: Option<ViperMode>) -> Option<ViperMode> {
    let filtered = ModeScores {
        strike: if mode_admitted(state, ViperMode::Strike) { scores.strike } else { 0.0 },
        coil: if mode_admitted(state, ViperMode::Coil) { scores.coil } else { 0.0 },
        lunge: if mode_admitted(state, ViperMode::Lunge) { scores.lunge } else { 0.0 },
    };
    filtered.elect(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RatchetLevel;

    #[test]
    fn locked_ratchet_admits_no_mode() {
        let state = RatchetState { level: RatchetLevel::Locked, daily_pnl: 0.0, daily_pnl_pct: 0.0, daily_high_pnl_pct: 0.0, session_started_ts: 0 };
        let scores = ModeScores { strike: 90.0, coil: 90.0, lunge: 90.0 };
        assert_eq!(elect_admitted_mode(scores, &state, None), None);
    }

    #[test]
    fn preservation_only_admits_strike() {
        let state = RatchetState { level: RatchetLevel::Preservation, daily_pnl: 0.0, daily_pnl_pct: 0.0, daily_high_pnl_pct: 0.0, session_started_ts: 0 };
        let scores = ModeScores { strike: 10.0, coil: 90.0, lunge: 90.0 };
        assert_eq!(elect_admitted_mode(scores, &state, None), Some(ViperMode::Strike));
    }
}
