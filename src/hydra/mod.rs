// =============================================================================
// HYDRA — confluence-scored entry strategy
// =============================================================================
//
// Scores five capped dimensions (`scorer`), sizes admitted trades off ATR and
// the confluence score (`sizing`), and manages live positions through an
// ordered barrier check (`exit_monitor`).

pub mod exit_monitor;
pub mod scorer;
pub mod sizing;

pub use exit_monitor::{evaluate, ExitAction};
pub use scorer::{evaluate_entry, score, Confidence, EntryDecision, HydraContext, HydraScore, DIMENSION_CAP, SPREAD_BLOCK_PCT};
pub use sizing::{compute_sizing, size_multiplier, SizingResult};
