// =============================================================================
// Shared types used across the strategy decision engine
// =============================================================================

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Balance snapshot for a single asset from the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub asset: String,
    #[serde(default)]
    pub free: f64,
    #[serde(default)]
    pub locked: f64,
}

/// Whether the engine is actively trading, paused, or killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    Live,
    Paused,
    Killed,
}

impl Default for TradingMode {
    fn default() -> Self {
        Self::Paused
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "Live"),
            Self::Paused => write!(f, "Paused"),
            Self::Killed => write!(f, "Killed"),
        }
    }
}

/// Whether we are running against real funds or simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountMode {
    Demo,
    Live,
}

impl Default for AccountMode {
    fn default() -> Self {
        Self::Demo
    }
}

impl std::fmt::Display for AccountMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Demo => write!(f, "Demo"),
            Self::Live => write!(f, "Live"),
        }
    }
}

/// Candle/indicator timeframes the engine tracks per pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
}

impl Timeframe {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
        }
    }

    /// Bucket width in milliseconds, used for floor-aligned aggregation.
    pub fn interval_ms(self) -> i64 {
        match self {
            Self::M1 => 60_000,
            Self::M5 => 300_000,
            Self::M15 => 900_000,
            Self::H1 => 3_600_000,
            Self::H4 => 14_400_000,
        }
    }

    /// Non-1m frames this engine derives from 1m by aggregation.
    pub fn derived() -> [Timeframe; 4] {
        [Self::M5, Self::M15, Self::H1, Self::H4]
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse market regime assigned by the Regime Classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Bullish,
    Choppy,
    Bearish,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Choppy => write!(f, "choppy"),
            Self::Bearish => write!(f, "bearish"),
        }
    }
}

/// Which strategy produced a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyTag {
    Hydra,
    Viper,
}

impl std::fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hydra => write!(f, "hydra"),
            Self::Viper => write!(f, "viper"),
        }
    }
}

/// VIPER's three competing modes. HYDRA positions carry `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViperMode {
    Strike,
    Coil,
    Lunge,
}

impl std::fmt::Display for ViperMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strike => write!(f, "STRIKE"),
            Self::Coil => write!(f, "COIL"),
            Self::Lunge => write!(f, "LUNGE"),
        }
    }
}

/// Reason a position was closed — carried onto the resulting `Trade`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitType {
    Tp1,
    Tp2,
    Stop,
    Trail,
    Timeout,
    Early,
    Manual,
    Invalidation,
    Reversal,
    Emergency,
}

impl std::fmt::Display for ExitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Tp1 => "tp1",
            Self::Tp2 => "tp2",
            Self::Stop => "stop",
            Self::Trail => "trail",
            Self::Timeout => "timeout",
            Self::Early => "early",
            Self::Manual => "manual",
            Self::Invalidation => "invalidation",
            Self::Reversal => "reversal",
            Self::Emergency => "emergency",
        };
        write!(f, "{s}")
    }
}

/// VIPER's capital-preservation ratchet level. Only moves toward tighter
/// within a session; resets at the configured overnight cutoff hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RatchetLevel {
    Recovery,
    Normal,
    Protected,
    Preservation,
    Locked,
}

impl RatchetLevel {
    /// Sizing multiplier applied to VIPER position sizes at this level.
    pub fn size_multiplier(self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Protected => 0.8,
            Self::Preservation => 0.6,
            Self::Locked => 0.0,
            Self::Recovery => 0.75,
        }
    }

    /// Modes permitted to open new positions at this level.
    pub fn allowed_modes(self) -> &'static [ViperMode] {
        match self {
            Self::Normal => &[ViperMode::Strike, ViperMode::Coil, ViperMode::Lunge],
            Self::Protected => &[ViperMode::Strike, ViperMode::Coil],
            Self::Preservation => &[ViperMode::Strike],
            Self::Locked => &[],
            Self::Recovery => &[ViperMode::Strike, ViperMode::Coil],
        }
    }

    /// Tightness ordering: the ratchet may only ever move to a level that is
    /// not looser than its current one (Recovery is a distinct branch, not
    /// part of the tightening chain, so it is excluded from this check).
    pub fn tightness_rank(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Protected => 1,
            Self::Preservation => 2,
            Self::Locked => 3,
            Self::Recovery => 0,
        }
    }
}

impl std::fmt::Display for RatchetLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Normal => "NORMAL",
            Self::Protected => "PROTECTED",
            Self::Preservation => "PRESERVATION",
            Self::Locked => "LOCKED",
            Self::Recovery => "RECOVERY",
        };
        write!(f, "{s}")
    }
}

/// A live, long-only position. Owned exclusively by the Position Lifecycle
/// Manager; strategies and the self-calibrator only ever read it through the
/// Market State Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub pair: String,
    pub strategy: StrategyTag,
    pub mode: Option<ViperMode>,
    pub entry_price: f64,
    pub quantity: f64,
    pub cost: f64,
    pub entry_ts: i64,
    pub stop_loss: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp1_close_pct: f64,
    pub tp2_close_pct: f64,
    #[serde(default)]
    pub tp1_hit: bool,
    #[serde(default)]
    pub tp2_hit: bool,
    pub trail_distance: f64,
    #[serde(default)]
    pub high_since_tp1: f64,
    #[serde(default)]
    pub range_support: Option<f64>,
    #[serde(default)]
    pub range_resistance: Option<f64>,
    pub max_hold_ms: i64,
    #[serde(default)]
    pub exit_reason: Option<ExitType>,
    #[serde(default)]
    pub dimension_scores: Option<[f64; 5]>,
    #[serde(default)]
    pub status: PositionStatus,
    #[serde(default)]
    pub realized_pnl: f64,
    #[serde(default)]
    pub current_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    PartialTp1,
    PartialTp2,
    Closed,
}

impl Default for PositionStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::PartialTp1 => write!(f, "PARTIAL_TP1"),
            Self::PartialTp2 => write!(f, "PARTIAL_TP2"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

impl Position {
    /// `quantity >= 0`, `tp1 < tp2` (long), `stop_loss < entry_price` (long).
    pub fn invariants_hold(&self) -> bool {
        self.quantity >= 0.0 && self.tp1 < self.tp2 && self.stop_loss < self.entry_price
    }
}

/// A closed position, appended to a pair-independent ring buffer consumed by
/// the Self-Calibrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub pair: String,
    pub strategy: StrategyTag,
    pub mode: Option<ViperMode>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub entry_ts: i64,
    pub closed_ts: i64,
    pub pnl: f64,
    pub fees: f64,
    pub net_pnl: f64,
    pub exit_type: ExitType,
    pub dimension_scores: Option<[f64; 5]>,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.net_pnl > 0.0
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Per-pair 24h scalp session circuit-breaker bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScalpSession {
    pub wins: u32,
    pub losses: u32,
    pub net_pnl: f64,
    pub fees: f64,
    pub trades: u32,
    /// Positive streak = consecutive wins, negative = consecutive losses.
    pub streak: i32,
    pub paused_until_ts: Option<i64>,
    pub disabled: bool,
    #[serde(default)]
    pub history: Vec<ExitType>,
}

/// HYDRA's consecutive-loss pause: once `consecutive_losses` reaches the
/// configured threshold, new HYDRA entries are suspended until
/// `paused_until_ts`. Independent of the account-wide risk breaker in
/// `risk.rs`, which never resumes within the day once tripped.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HydraLossState {
    pub consecutive_losses: u32,
    pub paused_until_ts: Option<i64>,
}

/// VIPER's daily capital-preservation state. Level never loosens within a
/// session; resets only at the configured overnight cutoff hour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatchetState {
    pub level: RatchetLevel,
    pub daily_pnl: f64,
    pub daily_pnl_pct: f64,
    pub daily_high_pnl_pct: f64,
    pub session_started_ts: i64,
}

impl Default for RatchetState {
    fn default() -> Self {
        Self {
            level: RatchetLevel::Normal,
            daily_pnl: 0.0,
            daily_pnl_pct: 0.0,
            daily_high_pnl_pct: 0.0,
            session_started_ts: now_ms(),
        }
    }
}

/// Per-pair hourly scoring table consulted by HYDRA's D5 dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProfile {
    /// 24 baseline scores (0..=12), index = UTC hour.
    pub baseline: [u8; 24],
    /// Learned overlay; `None` until ≥5 samples accumulate for that hour.
    #[serde(default)]
    pub learned: [Option<u8>; 24],
    pub default_score: u8,
}

impl SessionProfile {
    /// Standard baseline: modest during the Asia lull, strongest across the
    /// US/EU overlap.
    pub fn hardcoded_default() -> Self {
        let mut baseline = [6u8; 24];
        for h in 12..=20 {
            baseline[h] = 9;
        }
        for h in 13..=16 {
            baseline[h] = 12;
        }
        for h in 0..=6 {
            baseline[h] = 4;
        }
        Self {
            baseline,
            learned: [None; 24],
            default_score: 6,
        }
    }

    pub fn score_for_hour(&self, utc_hour: u32) -> u8 {
        let idx = (utc_hour % 24) as usize;
        self.learned[idx].unwrap_or(self.baseline[idx])
    }
}

/// VIPER's daily performance ledger entry (one per trading day).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceLedgerEntry {
    pub date: String,
    pub pnl_pct: f64,
    pub dominant_mode: Option<ViperMode>,
    pub met_benchmark: bool,
}

/// Aggregated verdict over the last 5 days of the performance ledger, feeding
/// the HYDRA/VIPER capital allocation split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplacementThreat {
    Dominant,
    Active,
    Warning,
    Critical,
}

impl std::fmt::Display for ReplacementThreat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Dominant => "DOMINANT",
            Self::Active => "ACTIVE",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratchet_level_ordering_is_monotonic_in_tightness() {
        assert!(RatchetLevel::Normal.tightness_rank() < RatchetLevel::Protected.tightness_rank());
        assert!(
            RatchetLevel::Protected.tightness_rank() < RatchetLevel::Preservation.tightness_rank()
        );
        assert!(
            RatchetLevel::Preservation.tightness_rank() < RatchetLevel::Locked.tightness_rank()
        );
    }

    #[test]
    fn position_invariants_reject_negative_quantity() {
        let mut pos = sample_position();
        pos.quantity = -1.0;
        assert!(!pos.invariants_hold());
    }

    #[test]
    fn position_invariants_reject_inverted_tp() {
        let mut pos = sample_position();
        pos.tp1 = 110.0;
        pos.tp2 = 105.0;
        assert!(!pos.invariants_hold());
    }

    fn sample_position() -> Position {
        Position {
            id: new_id(),
            pair: "BTCUSDT".into(),
            strategy: StrategyTag::Hydra,
            mode: None,
            entry_price: 100.0,
            quantity: 8.0,
            cost: 800.0,
            entry_ts: 0,
            stop_loss: 98.5,
            tp1: 101.2,
            tp2: 102.5,
            tp1_close_pct: 0.4,
            tp2_close_pct: 0.4,
            tp1_hit: false,
            tp2_hit: false,
            trail_distance: 0.8,
            high_since_tp1: 0.0,
            range_support: None,
            range_resistance: None,
            max_hold_ms: 0,
            exit_reason: None,
            dimension_scores: None,
            status: PositionStatus::Open,
            realized_pnl: 0.0,
            current_price: 100.0,
        }
    }

    #[test]
    fn session_profile_baseline_in_range() {
        let p = SessionProfile::hardcoded_default();
        for h in 0..24 {
            assert!(p.score_for_hour(h) <= 12);
        }
    }
}
