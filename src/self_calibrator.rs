// =============================================================================
// Self-Calibrator — HYDRA entry threshold adaptation + session profile learning
// =============================================================================
//
// Threshold adaptation: every 10 completed HYDRA trades, compute the
// trailing 10-trade win rate. Below 40%, raise the entry threshold by 3
// (capped at 95). Once 20 trades are available, also compute the trailing
// 20-trade win rate; above 70%, lower the threshold by 2 (floored at
// `max(65, initial_threshold - 10)`). A raise takes priority over a lower
// in the same checkpoint.
//
// Session profile learning: bucket realized HYDRA trades by UTC entry hour.
// Once a bucket reaches 5 samples, blend a new learned score for that hour
// as `round(0.4*baseline + 0.6*live)` where `live = min(12, round(winRate *
// 15))`, then reset the bucket. The baseline itself is never touched.
// =============================================================================

use crate::types::SessionProfile;

pub const CHECKPOINT_TRADES: usize = 10;
pub const EXTENDED_WINDOW_TRADES: usize = 20;
pub const LOW_WIN_RATE_THRESHOLD: f64 = 0.40;
pub const HIGH_WIN_RATE_THRESHOLD: f64 = 0.70;
pub const RAISE_STEP: f64 = 3.0;
pub const LOWER_STEP: f64 = 2.0;
pub const MAX_THRESHOLD: f64 = 95.0;
pub const MIN_FLOOR_BELOW_INITIAL: f64 = 10.0;
pub const ABSOLUTE_FLOOR: f64 = 65.0;
pub const SESSION_BUCKET_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationEvent {
    pub old_threshold: f64,
    pub new_threshold: f64,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ThresholdCalibrator {
    initial_threshold: f64,
    pub current_threshold: f64,
    outcomes: Vec<bool>,
}

impl ThresholdCalibrator {
    pub fn new(initial_threshold: f64) -> Self {
        Self { initial_threshold, current_threshold: initial_threshold, outcomes: Vec::new() }
    }

    fn floor(&self) -> f64 {
        (self.initial_threshold - MIN_FLOOR_BELOW_INITIAL).max(ABSOLUTE_FLOOR)
    }

    /// Record a completed HYDRA trade's win/loss outcome. Returns a
    /// calibration event if this trade completed a checkpoint that moved
    /// the threshold.
    pub fn record_trade(&mut self, won: bool) -> Option<CalibrationEvent> {
        self.outcomes.push(won);
        let n = self.outcomes.len();
        if n % CHECKPOINT_TRADES != 0 {
            return None;
        }

        let last10 = &self.outcomes[n - CHECKPOINT_TRADES..];
        let win_rate_10 = last10.iter().filter(|w| **w).count() as f64 / CHECKPOINT_TRADES as f64;

        if win_rate_10 < LOW_WIN_RATE_THRESHOLD {
            let old = self.current_threshold;
            self.current_threshold = (self.current_threshold + RAISE_STEP).min(MAX_THRESHOLD);
            if self.current_threshold == old {
                return None;
            }
            return Some(CalibrationEvent {
                old_threshold: old,
                new_threshold: self.current_threshold,
                reason: format!("10-trade win rate {:.1}% below {:.0}%, threshold raised", win_rate_10 * 100.0, LOW_WIN_RATE_THRESHOLD * 100.0),
            });
        }

        if n >= EXTENDED_WINDOW_TRADES {
            let last20 = &self.outcomes[n - EXTENDED_WINDOW_TRADES..];
            let win_rate_20 = last20.iter().filter(|w| **w).count() as f64 / EXTENDED_WINDOW_TRADES as f64;
            if win_rate_20 > HIGH_WIN_RATE_THRESHOLD {
                let old = self.current_threshold;
                let floor = self.floor();
                self.current_threshold = (self.current_threshold - LOWER_STEP).max(floor);
                if self.current_threshold == old {
                    return None;
                }
                return Some(CalibrationEvent {
                    old_threshold: old,
                    new_threshold: self.current_threshold,
                    reason: format!("20-trade win rate {:.1}% above {:.0}%, threshold lowered", win_rate_20 * 100.0, HIGH_WIN_RATE_THRESHOLD * 100.0),
                });
            }
        }

        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionProfileLearner {
    buckets: [Vec<bool>; 24],
}

impl SessionProfileLearner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a realized trade's outcome against its UTC entry hour. When
    /// the bucket for that hour reaches 5 samples, blends a learned score
    /// into `profile` and clears the bucket.
    pub fn record_trade(&mut self, entry_hour_utc: u32, won: bool, profile: &mut SessionProfile) {
        let idx = (entry_hour_utc % 24) as usize;
        self.buckets[idx].push(won);
        if self.buckets[idx].len() < SESSION_BUCKET_SIZE {
            return;
        }

        let wins = self.buckets[idx].iter().filter(|w| **w).count();
        let win_rate = wins as f64 / SESSION_BUCKET_SIZE as f64;
        let live = (win_rate * 15.0).round().min(12.0);
        let baseline = profile.baseline[idx] as f64;
        let blended = (0.4 * baseline + 0.6 * live).round().clamp(0.0, 12.0) as u8;

        profile.learned[idx] = Some(blended);
        self.buckets[idx].clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S5 — last-10 HYDRA win count of 3 (30%, below 40%) raises an initial
    /// threshold of 80 to 83; a repeat of the same result raises it to 86.
    /// It never exceeds 95.
    #[test]
    fn low_win_rate_raises_threshold_and_caps_at_95() {
        let mut calibrator = ThresholdCalibrator::new(80.0);
        let mut feed_block = |c: &mut ThresholdCalibrator| {
            let mut last_event = None;
            for i in 0..10 {
                last_event = c.record_trade(i < 3);
            }
            last_event
        };

        let event = feed_block(&mut calibrator).expect("first block should raise");
        assert_eq!(event.new_threshold, 83.0);
        assert_eq!(calibrator.current_threshold, 83.0);

        let event = feed_block(&mut calibrator).expect("second block should raise again");
        assert_eq!(event.new_threshold, 86.0);

        for _ in 0..5 {
            feed_block(&mut calibrator);
        }
        assert!(calibrator.current_threshold <= MAX_THRESHOLD);
        assert_eq!(calibrator.current_threshold, 95.0);
    }

    #[test]
    fn no_event_before_a_checkpoint_is_reached() {
        let mut calibrator = ThresholdCalibrator::new(80.0);
        for _ in 0..9 {
            assert!(calibrator.record_trade(false).is_none());
        }
    }

    #[test]
    fn high_win_rate_over_20_trades_lowers_threshold_with_floor() {
        let mut calibrator = ThresholdCalibrator::new(80.0);
        // First 10: 8 wins (80%) -- not a raise condition, n < 20 so no lower check yet.
        for i in 0..10 {
            calibrator.record_trade(i < 8);
        }
        assert_eq!(calibrator.current_threshold, 80.0);

        // Second 10: also 8 wins -- 20-trade win rate = 16/20 = 80% > 70%.
        let mut event = None;
        for i in 0..10 {
            event = calibrator.record_trade(i < 8);
        }
        let event = event.expect("20-trade high win rate should lower the threshold");
        assert_eq!(event.new_threshold, 78.0);
    }

    #[test]
    fn lower_floor_never_drops_below_initial_minus_10_or_65() {
        let mut calibrator = ThresholdCalibrator::new(70.0);
        // floor = max(65, 70-10) = 65
        for _ in 0..30 {
            for i in 0..10 {
                calibrator.record_trade(i < 9);
            }
        }
        assert!(calibrator.current_threshold >= 65.0);
    }

    #[test]
    fn session_bucket_blends_after_five_samples_and_resets() {
        let mut learner = SessionProfileLearner::new();
        let mut profile = SessionProfile::hardcoded_default();
        let baseline_9 = profile.baseline[9];

        for i in 0..5 {
            learner.record_trade(9, i < 4, &mut profile);
        }

        assert!(profile.learned[9].is_some());
        let live = (0.8_f64 * 15.0).round().min(12.0);
        let expected = (0.4 * baseline_9 as f64 + 0.6 * live).round() as u8;
        assert_eq!(profile.learned[9], Some(expected));
        assert!(learner.buckets[9].is_empty());
    }

    #[test]
    fn baseline_is_never_mutated_by_learning() {
        let mut learner = SessionProfileLearner::new();
        let mut profile = SessionProfile::hardcoded_default();
        let baseline_before = profile.baseline;

        for i in 0..5 {
            learner.record_trade(3, i < 2, &mut profile);
        }
        assert_eq!(profile.baseline, baseline_before);
    }
}
