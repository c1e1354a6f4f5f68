// =============================================================================
// VIPER Performance Ledger — daily tracking and replacement threat
// =============================================================================
//
// One record per trading day: {date, pnlPct, dominantMode, metBenchmark}.
// The last 5 days feed a replacement-threat verdict (DOMINANT / ACTIVE /
// WARNING / CRITICAL) that in turn adjusts the HYDRA/VIPER capital
// allocation split. CRITICAL forces VIPER's allocation down to 13% of the
// configured split, protecting capital from a strategy branch on a losing
// streak.
// =============================================================================

use crate::types::{PerformanceLedgerEntry, ReplacementThreat};

pub const LOOKBACK_DAYS: usize = 5;
pub const CRITICAL_VIPER_ALLOCATION_PCT: f64 = 0.13;

#[derive(Debug, Clone, Default)]
pub struct PerformanceLedger {
    pub entries: Vec<PerformanceLedgerEntry>,
}

impl PerformanceLedger {
    pub fn record(&mut self, entry: PerformanceLedgerEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.date == entry.date) {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    fn recent(&self) -> &[PerformanceLedgerEntry] {
        let start = self.entries.len().saturating_sub(LOOKBACK_DAYS);
        &self.entries[start..]
    }

    /// Replacement threat over the last 5 recorded days:
    ///   - DOMINANT: all days met benchmark
    ///   - ACTIVE: a majority met benchmark
    ///   - WARNING: a minority met benchmark
    ///   - CRITICAL: none of the last 5 days met benchmark (with a full window)
    pub fn replacement_threat(&self) -> ReplacementThreat {
        let recent = self.recent();
        if recent.is_empty() {
            return ReplacementThreat::Active;
        }
        let met = recent.iter().filter(|e| e.met_benchmark).count();
        let total = recent.len();

        if recent.len() == LOOKBACK_DAYS && met == 0 {
            return ReplacementThreat::Critical;
        }
        if met == total {
            ReplacementThreat::Dominant
        } else if met * 2 >= total {
            ReplacementThreat::Active
        } else {
            ReplacementThreat::Warning
        }
    }

    /// VIPER's share of the configured capital split, adjusted by
    /// replacement threat. CRITICAL clamps it to 13%; all other verdicts
    /// pass the configured split through unchanged.
    pub fn viper_allocation_pct(&self, configured_split_pct: f64) -> f64 {
        match self.replacement_threat() {
            ReplacementThreat::Critical => CRITICAL_VIPER_ALLOCATION_PCT,
            _ => configured_split_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(date: &str, met: bool) -> PerformanceLedgerEntry {
        PerformanceLedgerEntry { date: date.to_string(), pnl_pct: if met { 1.0 } else { -0.5 }, dominant_mode: None, met_benchmark: met }
    }

    #[test]
    fn empty_ledger_defaults_to_active() {
        let ledger = PerformanceLedger::default();
        assert_eq!(ledger.replacement_threat(), ReplacementThreat::Active);
    }

    #[test]
    fn five_straight_misses_is_critical_and_clamps_allocation() {
        let mut ledger = PerformanceLedger::default();
        for d in 1..=5 {
            ledger.record(entry(&format!("2026-01-0{d}"), false));
        }
        assert_eq!(ledger.replacement_threat(), ReplacementThreat::Critical);
        assert_eq!(ledger.viper_allocation_pct(0.40), CRITICAL_VIPER_ALLOCATION_PCT);
    }

    #[test]
    fn all_days_met_is_dominant() {
        let mut ledger = PerformanceLedger::default();
        for d in 1..=5 {
            ledger.record(entry(&format!("2026-01-0{d}"), true));
        }
        assert_eq!(ledger.replacement_threat(), ReplacementThreat::Dominant);
        assert_eq!(ledger.viper_allocation_pct(0.40), 0.40);
    }

    #[test]
    fn majority_met_is_active() {
        let mut ledger = PerformanceLedger::default();
        ledger.record(entry("2026-01-01", true));
        ledger.record(entry("2026-01-02", true));
        ledger.record(entry("2026-01-03", true));
        ledger.record(entry("2026-01-04", false));
        ledger.record(entry("2026-01-05", false));
        assert_eq!(ledger.replacement_threat(), ReplacementThreat::Active);
    }

    #[test]
    fn minority_met_is_warning() {
        let mut ledger = PerformanceLedger::default();
        ledger.record(entry("2026-01-01", true));
        ledger.record(entry("2026-01-02", false));
        ledger.record(entry("2026-01-03", false));
        ledger.record(entry("2026-01-04", false));
        assert_eq!(ledger.replacement_threat(), ReplacementThreat::Warning);
    }

    #[test]
    fn only_last_five_days_count() {
        let mut ledger = PerformanceLedger::default();
        for d in 1..=10 {
            ledger.record(entry(&format!("2026-01-{d:02}"), d > 5));
        }
        assert_eq!(ledger.replacement_threat(), ReplacementThreat::Dominant);
    }

    #[test]
    fn re_recording_the_same_date_replaces_the_entry() {
        let mut ledger = PerformanceLedger::default();
        ledger.record(entry("2026-01-01", false));
        ledger.record(entry("2026-01-01", true));
        assert_eq!(ledger.entries.len(), 1);
        assert!(ledger.entries[0].met_benchmark);
    }
}
