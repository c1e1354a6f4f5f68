// =============================================================================
// Market Regime Detector — 3-state classifier (bullish / choppy / bearish)
// =============================================================================
//
// Decision tree, evaluated top-to-bottom (first match wins):
//
//   1. CHOPPY   — ADX < 20, OR (price within 1.5% of SMA200 AND BB width
//                 below its own recent average)
//   2. BULLISH  — price > SMA200 AND EMA9 > EMA21 > EMA50 AND ADX > 25
//                 AND 45 <= RSI14 <= 75
//   3. BEARISH  — price < SMA200 AND EMA9 < EMA21 AND ADX > 25
//   4. else CHOPPY (no rule fired)
//
// Each classification records the `reasons` that fired it for observability.
// =============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::adx::calculate_adx;
use crate::indicators::bollinger::calculate_bollinger;
use crate::indicators::ema::calculate_ema;
use crate::indicators::rsi::calculate_rsi;
use crate::indicators::sma::current_sma;
use crate::market_data::Candle;
use crate::types::Regime;

/// Caps the number of trailing bollinger-width samples averaged to decide
/// whether the band is currently "tight" (per the CHOPPY rule).
const BB_WIDTH_LOOKBACK: usize = 20;

/// Maximum number of historical regime states retained.
const REGIME_HISTORY_CAP: usize = 100;

/// Complete snapshot of the detected regime plus contributing metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime: Regime,
    pub reasons: Vec<String>,
    pub adx: f64,
    pub bb_width: Option<f64>,
    pub bb_width_avg: Option<f64>,
    pub rsi14: Option<f64>,
    pub sma200: Option<f64>,
    pub ema9: Option<f64>,
    pub ema21: Option<f64>,
    pub ema50: Option<f64>,
    pub price: f64,
    pub regime_age_secs: f64,
}

// =============================================================================
// RegimeDetector
// =============================================================================

/// Thread-safe regime detector holding the latest state and a bounded
/// history ring buffer.
pub struct RegimeDetector {
    state: RwLock<Option<RegimeState>>,
    history: RwLock<VecDeque<RegimeState>>,
    last_change_time: RwLock<Instant>,
}

impl RegimeDetector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(None),
            history: RwLock::new(VecDeque::with_capacity(REGIME_HISTORY_CAP)),
            last_change_time: RwLock::new(Instant::now()),
        })
    }

    /// Run full regime detection on the provided candles (oldest first,
    /// latest last). Returns `None` only when `candles` is empty.
    pub fn detect(&self, candles: &[Candle]) -> Option<RegimeState> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let price = *closes.last()?;

        let adx = calculate_adx(candles, 14).unwrap_or(0.0);
        let sma200 = current_sma(&closes, 200);
        let rsi14 = calculate_rsi(&closes, 14).last().copied();
        let ema9 = calculate_ema(&closes, 9).last().copied();
        let ema21 = calculate_ema(&closes, 21).last().copied();
        let ema50 = calculate_ema(&closes, 50).last().copied();

        let bb_width = calculate_bollinger(&closes, 20, 2.0).map(|b| b.width);
        let bb_width_avg = bb_width_trailing_average(&closes);

        let (regime, reasons) = classify(ClassifyInputs {
            price,
            adx,
            sma200,
            rsi14,
            ema9,
            ema21,
            ema50,
            bb_width,
            bb_width_avg,
        });

        let now = Instant::now();
        let prev_regime = self.state.read().as_ref().map(|s| s.regime);
        if prev_regime != Some(regime) {
            *self.last_change_time.write() = now;
        }
        let regime_age_secs = now.duration_since(*self.last_change_time.read()).as_secs_f64();

        let new_state = RegimeState {
            regime,
            reasons,
            adx,
            bb_width,
            bb_width_avg,
            rsi14,
            sma200,
            ema9,
            ema21,
            ema50,
            price,
            regime_age_secs,
        };

        debug!(
            regime = %regime,
            adx = format!("{:.2}", adx),
            reasons = ?new_state.reasons,
            age_secs = format!("{:.1}", regime_age_secs),
            "regime detected"
        );

        *self.state.write() = Some(new_state.clone());
        {
            let mut history = self.history.write();
            if history.len() >= REGIME_HISTORY_CAP {
                history.pop_front();
            }
            history.push_back(new_state.clone());
        }

        Some(new_state)
    }

    pub fn current_regime(&self) -> Option<RegimeState> {
        self.state.read().clone()
    }

    pub fn history(&self) -> Vec<RegimeState> {
        self.history.read().iter().cloned().collect()
    }
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self {
            state: RwLock::new(None),
            history: RwLock::new(VecDeque::with_capacity(REGIME_HISTORY_CAP)),
            last_change_time: RwLock::new(Instant::now()),
        }
    }
}

// =============================================================================
// Classification logic
// =============================================================================

struct ClassifyInputs {
    price: f64,
    adx: f64,
    sma200: Option<f64>,
    rsi14: Option<f64>,
    ema9: Option<f64>,
    ema21: Option<f64>,
    ema50: Option<f64>,
    bb_width: Option<f64>,
    bb_width_avg: Option<f64>,
}

fn classify(i: ClassifyInputs) -> (Regime, Vec<String>) {
    let near_sma200 = match i.sma200 {
        Some(sma) if sma > 0.0 => (i.price - sma).abs() / sma <= 0.015,
        _ => false,
    };
    let bb_tight = match (i.bb_width, i.bb_width_avg) {
        (Some(w), Some(avg)) => w < avg,
        _ => false,
    };

    if i.adx < 20.0 {
        return (Regime::Choppy, vec![format!("ADX {:.1} < 20", i.adx)]);
    }
    if near_sma200 && bb_tight {
        return (
            Regime::Choppy,
            vec![
                "price within 1.5% of SMA200".to_string(),
                "BB width below its trailing average".to_string(),
            ],
        );
    }

    if let (Some(sma200), Some(e9), Some(e21), Some(e50), Some(rsi)) =
        (i.sma200, i.ema9, i.ema21, i.ema50, i.rsi14)
    {
        if i.price > sma200 && e9 > e21 && e21 > e50 && i.adx > 25.0 && (45.0..=75.0).contains(&rsi) {
            return (
                Regime::Bullish,
                vec![
                    "price > SMA200".to_string(),
                    "EMA9 > EMA21 > EMA50".to_string(),
                    format!("ADX {:.1} > 25", i.adx),
                    format!("RSI14 {rsi:.1} in [45, 75]"),
                ],
            );
        }
        if i.price < sma200 && e9 < e21 && i.adx > 25.0 {
            return (
                Regime::Bearish,
                vec![
                    "price < SMA200".to_string(),
                    "EMA9 < EMA21".to_string(),
                    format!("ADX {:.1} > 25", i.adx),
                ],
            );
        }
    }

    (Regime::Choppy, vec!["no rule matched".to_string()])
}

/// Average bollinger-band width over the trailing [`BB_WIDTH_LOOKBACK`]
/// bars, excluding the current one, used to judge whether the current band
/// is contracted relative to its own recent history.
fn bb_width_trailing_average(closes: &[f64]) -> Option<f64> {
    if closes.len() < 21 {
        return None;
    }
    let end = closes.len() - 1; // exclude the current bar
    let start = end.saturating_sub(BB_WIDTH_LOOKBACK);
    let mut widths = Vec::new();
    for i in start.max(20)..end {
        if let Some(bb) = calculate_bollinger(&closes[..=i], 20, 2.0) {
            widths.push(bb.width);
        }
    }
    if widths.is_empty() {
        None
    } else {
        Some(widths.iter().sum::<f64>() / widths.len() as f64)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(
        price: f64,
        adx: f64,
        sma200: Option<f64>,
        rsi14: Option<f64>,
        ema9: Option<f64>,
        ema21: Option<f64>,
        ema50: Option<f64>,
        bb_width: Option<f64>,
        bb_width_avg: Option<f64>,
    ) -> ClassifyInputs {
        ClassifyInputs { price, adx, sma200, rsi14, ema9, ema21, ema50, bb_width, bb_width_avg }
    }

    #[test]
    fn low_adx_is_choppy_regardless_of_other_signals() {
        let (regime, _) = classify(inputs(
            110.0, 15.0, Some(100.0), Some(60.0), Some(109.0), Some(108.0), Some(107.0), Some(1.0), Some(2.0),
        ));
        assert_eq!(regime, Regime::Choppy);
    }

    #[test]
    fn near_sma_with_tight_bands_is_choppy() {
        let (regime, _) = classify(inputs(
            100.5, 30.0, Some(100.0), Some(50.0), Some(100.0), Some(99.5), Some(99.0), Some(0.5), Some(1.0),
        ));
        assert_eq!(regime, Regime::Choppy);
    }

    #[test]
    fn full_bullish_alignment() {
        let (regime, reasons) = classify(inputs(
            120.0, 30.0, Some(100.0), Some(60.0), Some(119.0), Some(115.0), Some(110.0), Some(3.0), Some(1.0),
        ));
        assert_eq!(regime, Regime::Bullish);
        assert!(!reasons.is_empty());
    }

    #[test]
    fn rsi_out_of_band_blocks_bullish_falls_to_choppy() {
        let (regime, _) = classify(inputs(
            120.0, 30.0, Some(100.0), Some(90.0), Some(119.0), Some(115.0), Some(110.0), Some(3.0), Some(1.0),
        ));
        assert_eq!(regime, Regime::Choppy);
    }

    #[test]
    fn bearish_alignment() {
        let (regime, _) = classify(inputs(
            80.0, 30.0, Some(100.0), Some(40.0), Some(81.0), Some(85.0), Some(90.0), Some(3.0), Some(1.0),
        ));
        assert_eq!(regime, Regime::Bearish);
    }

    #[test]
    fn missing_sma200_falls_back_to_choppy() {
        let (regime, _) = classify(inputs(100.0, 30.0, None, Some(50.0), Some(99.0), Some(98.0), Some(97.0), Some(3.0), Some(1.0)));
        assert_eq!(regime, Regime::Choppy);
    }

    #[test]
    fn detector_tracks_bounded_history() {
        let detector = RegimeDetector::default();
        for i in 0..250 {
            let candles = sample_trend(200 + i);
            detector.detect(&candles);
        }
        assert!(detector.history().len() <= REGIME_HISTORY_CAP);
    }

    fn sample_trend(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.1;
                Candle {
                    open_time: i as i64 * 60_000,
                    close_time: i as i64 * 60_000 + 59_999,
                    open: close,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: 10.0,
                    quote_volume: 1000.0,
                    trades_count: 5,
                    taker_buy_volume: 5.0,
                    taker_buy_quote_volume: 500.0,
                    is_closed: true,
                }
            })
            .collect()
    }
}
