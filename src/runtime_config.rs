// =============================================================================
// Runtime Configuration — Hot-reloadable engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the Aurora trading engine.  Every tunable
// parameter lives here so that the engine can be reconfigured at runtime
// without a restart.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{AccountMode, TradingMode};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "XRPUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

fn default_max_concurrent_positions() -> u32 {
    3
}

fn default_max_daily_loss_pct() -> f64 {
    3.0
}

fn default_max_consecutive_losses() -> u32 {
    5
}

fn default_max_trades_per_day() -> u32 {
    50
}

// --- HYDRA defaults ----------------------------------------------------------

fn default_entry_threshold() -> f64 {
    80.0
}

fn default_risk_per_trade() -> f64 {
    0.01
}

fn default_max_position_pct() -> f64 {
    0.08
}

fn default_exit_score_threshold() -> f64 {
    35.0
}

fn default_signal_expiry_sec() -> i64 {
    45
}

fn default_consecutive_loss_pause() -> u32 {
    3
}

fn default_consecutive_loss_pause_min() -> i64 {
    60
}

fn default_session_weight() -> f64 {
    0.5
}

fn default_hydra_daily_loss_limit_pct() -> f64 {
    3.0
}

// --- VIPER defaults ------------------------------------------------------------

fn default_edge_detector_interval_min() -> i64 {
    15
}

fn default_strike_cooldown_sec() -> i64 {
    90
}

fn default_strike_max_consecutive_wins() -> u32 {
    3
}

fn default_coil_max_positions() -> u32 {
    2
}

fn default_lunge_max_positions() -> u32 {
    1
}

fn default_overnight_cutoff_hour_utc() -> u32 {
    22
}

fn default_daily_pnl_target_pct() -> f64 {
    2.0
}

fn default_viper_max_daily_loss_pct() -> f64 {
    2.0
}

fn default_capital_split_pct() -> f64 {
    0.6
}

fn default_scanner_pairs() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

// =============================================================================
// HydraSettings
// =============================================================================

/// Tunable parameters for the HYDRA confluence scorer and its sizing/exit
/// machinery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydraSettings {
    /// Minimum HYDRA score (0-100) required to admit an entry. Bounded to
    /// [65, 95] by the self-calibrator.
    #[serde(default = "default_entry_threshold")]
    pub entry_threshold: f64,

    /// Fraction of capital risked per trade (used by the ATR-based sizing
    /// formula), e.g. 0.01 = 1%.
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade: f64,

    /// Maximum position size as a fraction of capital, regardless of the
    /// risk-based sizing result.
    #[serde(default = "default_max_position_pct")]
    pub max_position_pct: f64,

    /// Minimum combined D1+D2+D3 exit score below which an early exit is
    /// considered.
    #[serde(default = "default_exit_score_threshold")]
    pub exit_score_threshold: f64,

    /// Seconds after which an unfilled HYDRA signal expires.
    #[serde(default = "default_signal_expiry_sec")]
    pub signal_expiry_sec: i64,

    /// Whether the self-calibrator is allowed to adjust `entry_threshold`
    /// automatically based on trade outcomes.
    #[serde(default = "default_true")]
    pub auto_calibrate: bool,

    /// Number of consecutive losing HYDRA trades that triggers a cooldown.
    #[serde(default = "default_consecutive_loss_pause")]
    pub consecutive_loss_pause: u32,

    /// Length of that cooldown, in minutes.
    #[serde(default = "default_consecutive_loss_pause_min")]
    pub consecutive_loss_pause_min: i64,

    /// Weight given to the session-intelligence dimension (D5) relative to
    /// the other four dimensions when blending session profile scores.
    #[serde(default = "default_session_weight")]
    pub session_weight: f64,

    /// Daily loss limit dedicated to HYDRA capital, as a percentage.
    #[serde(default = "default_hydra_daily_loss_limit_pct")]
    pub daily_loss_limit_pct: f64,
}

impl Default for HydraSettings {
    fn default() -> Self {
        Self {
            entry_threshold: default_entry_threshold(),
            risk_per_trade: default_risk_per_trade(),
            max_position_pct: default_max_position_pct(),
            exit_score_threshold: default_exit_score_threshold(),
            signal_expiry_sec: default_signal_expiry_sec(),
            auto_calibrate: true,
            consecutive_loss_pause: default_consecutive_loss_pause(),
            consecutive_loss_pause_min: default_consecutive_loss_pause_min(),
            session_weight: default_session_weight(),
            daily_loss_limit_pct: default_hydra_daily_loss_limit_pct(),
        }
    }
}

// =============================================================================
// ViperSettings
// =============================================================================

/// Tunable parameters for the VIPER meta-strategy (mode election, ratchet,
/// performance ledger, capital split).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViperSettings {
    /// Master on/off switch for the VIPER meta-strategy.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often (minutes) the Edge Detector re-elects the active mode.
    #[serde(default = "default_edge_detector_interval_min")]
    pub edge_detector_interval_min: i64,

    /// Base cooldown (seconds) between STRIKE entry attempts on a pair.
    #[serde(default = "default_strike_cooldown_sec")]
    pub strike_cooldown_sec: i64,

    /// Consecutive STRIKE wins after which the cooldown widens.
    #[serde(default = "default_strike_max_consecutive_wins")]
    pub strike_max_consecutive_wins: u32,

    /// Maximum concurrent COIL positions.
    #[serde(default = "default_coil_max_positions")]
    pub coil_max_positions: u32,

    /// Maximum concurrent LUNGE positions.
    #[serde(default = "default_lunge_max_positions")]
    pub lunge_max_positions: u32,

    /// Whether the ratchet system is allowed to tighten sizing intraday.
    #[serde(default = "default_true")]
    pub ratchet_enabled: bool,

    /// UTC hour after which new VIPER entries are suppressed for the
    /// remainder of the session (overnight cutoff).
    #[serde(default = "default_overnight_cutoff_hour_utc")]
    pub overnight_cutoff_hour_utc: u32,

    /// Daily PnL target, as a percentage of session-start capital, after
    /// which the ratchet moves to PRESERVATION.
    #[serde(default = "default_daily_pnl_target_pct")]
    pub daily_pnl_target_pct: f64,

    /// Daily loss limit dedicated to VIPER capital, as a percentage.
    #[serde(default = "default_viper_max_daily_loss_pct")]
    pub max_daily_loss_pct: f64,

    /// Whether the performance ledger tracks rolling HYDRA vs VIPER edge
    /// and feeds the replacement-threat capital reallocation.
    #[serde(default = "default_true")]
    pub performance_ledger_enabled: bool,

    /// Fraction of total trading capital allocated to HYDRA; the remainder
    /// goes to VIPER. Shifted toward whichever strategy is dominant once a
    /// replacement threat is detected.
    #[serde(default = "default_capital_split_pct")]
    pub capital_split_pct: f64,
}

impl Default for ViperSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            edge_detector_interval_min: default_edge_detector_interval_min(),
            strike_cooldown_sec: default_strike_cooldown_sec(),
            strike_max_consecutive_wins: default_strike_max_consecutive_wins(),
            coil_max_positions: default_coil_max_positions(),
            lunge_max_positions: default_lunge_max_positions(),
            ratchet_enabled: true,
            overnight_cutoff_hour_utc: default_overnight_cutoff_hour_utc(),
            daily_pnl_target_pct: default_daily_pnl_target_pct(),
            max_daily_loss_pct: default_viper_max_daily_loss_pct(),
            performance_ledger_enabled: true,
            capital_split_pct: default_capital_split_pct(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the Aurora engine.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Operational modes ---------------------------------------------------

    /// Current trading mode: Live, Paused, or Killed.
    #[serde(default)]
    pub trading_mode: TradingMode,

    /// Whether running against real funds or simulated: Demo or Live.
    #[serde(default)]
    pub account_mode: AccountMode,

    // --- Symbols & limits ---------------------------------------------------

    /// Symbols the engine is watching and trading.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Subset of `symbols` the Edge Detector and VIPER modes scan, capped
    /// at 5 pairs.
    #[serde(default = "default_scanner_pairs")]
    pub scanner_pairs: Vec<String>,

    /// Maximum number of concurrent open positions across both strategies.
    #[serde(default = "default_max_concurrent_positions")]
    pub max_concurrent_positions: u32,

    /// Maximum cumulative daily loss allowed as a percentage of starting
    /// capital (e.g. 3.0 means 3 %), applied engine-wide on top of the
    /// per-strategy limits in `hydra` / `viper`.
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: f64,

    /// Maximum consecutive losing trades before the circuit breaker trips.
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,

    /// Maximum total trades per day.
    #[serde(default = "default_max_trades_per_day")]
    pub max_trades_per_day: u32,

    // --- Strategy settings ---------------------------------------------------

    /// HYDRA confluence scorer settings.
    #[serde(default)]
    pub hydra: HydraSettings,

    /// VIPER meta-strategy settings.
    #[serde(default)]
    pub viper: ViperSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paused,
            account_mode: AccountMode::Demo,
            symbols: default_symbols(),
            scanner_pairs: default_scanner_pairs(),
            max_concurrent_positions: default_max_concurrent_positions(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            max_consecutive_losses: default_max_consecutive_losses(),
            max_trades_per_day: default_max_trades_per_day(),
            hydra: HydraSettings::default(),
            viper: ViperSettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            trading_mode = %config.trading_mode,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    ///
    /// This prevents corruption if the process crashes mid-write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        // Atomic write: write to a temporary sibling file, then rename.
        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.account_mode, AccountMode::Demo);
        assert_eq!(cfg.symbols.len(), 5);
        assert_eq!(cfg.symbols[0], "BTCUSDT");
        assert_eq!(cfg.symbols[4], "SOLUSDT");
        assert_eq!(cfg.max_concurrent_positions, 3);
        assert!(cfg.scanner_pairs.len() <= 5);
        assert!((cfg.hydra.entry_threshold - 80.0).abs() < f64::EPSILON);
        assert!(cfg.hydra.entry_threshold >= 65.0 && cfg.hydra.entry_threshold <= 95.0);
        assert!(cfg.hydra.exit_score_threshold >= 20.0 && cfg.hydra.exit_score_threshold <= 60.0);
        assert!(cfg.hydra.auto_calibrate);
        assert!(cfg.viper.enabled);
        assert!(cfg.viper.ratchet_enabled);
        assert_eq!(cfg.viper.edge_detector_interval_min, 15);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.account_mode, AccountMode::Demo);
        assert!(cfg.hydra.auto_calibrate);
        assert_eq!(cfg.max_consecutive_losses, 5);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "trading_mode": "Live", "symbols": ["ETHUSDT"] }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Live);
        assert_eq!(cfg.symbols, vec!["ETHUSDT"]);
        assert!(cfg.viper.enabled);
        assert_eq!(cfg.max_concurrent_positions, 3);
    }

    #[test]
    fn deserialise_partial_hydra_settings_fills_remaining_defaults() {
        let json = r#"{ "hydra": { "entry_threshold": 88.0 } }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert!((cfg.hydra.entry_threshold - 88.0).abs() < f64::EPSILON);
        assert!((cfg.hydra.risk_per_trade - 0.01).abs() < f64::EPSILON);
        assert_eq!(cfg.hydra.consecutive_loss_pause, 3);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbols, cfg2.symbols);
        assert_eq!(cfg.max_concurrent_positions, cfg2.max_concurrent_positions);
        assert_eq!(cfg.trading_mode, cfg2.trading_mode);
        assert_eq!(cfg.hydra.entry_threshold, cfg2.hydra.entry_threshold);
        assert_eq!(cfg.viper.capital_split_pct, cfg2.viper.capital_split_pct);
    }

    #[test]
    fn enum_mode_assignment_compatible() {
        // Verify that trading_mode and account_mode can be assigned from
        // enum variants, matching the pattern in main.rs.
        let mut cfg = RuntimeConfig::default();
        cfg.trading_mode = TradingMode::Paused;
        cfg.account_mode = AccountMode::Demo;
        assert_eq!(cfg.trading_mode, TradingMode::Paused);
        assert_eq!(cfg.account_mode, AccountMode::Demo);
    }
}
