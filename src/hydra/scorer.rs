// =============================================================================
// HYDRA confluence scorer — five capped dimensions, 0-100 total
// =============================================================================
//
//   D1 Trend Alignment    — EMA9/21/50 stack + SMA200 across 1m/5m/15m
//   D2 Momentum Quality   — RSI placement, MACD histogram, StochRSI cross,
//                            hidden bullish divergence
//   D3 Volume Conviction  — volume vs its 20-bar average, OBV trend,
//                            buy-flow share
//   D4 Microstructure     — order-book imbalance, spread (hard block over
//                            0.25%), VWAP location
//   D5 Session Intelligence — per-pair hourly score x weight, ATR14 vs its
//                            50-bar trailing average
//
// Each dimension is capped at 20; the total is therefore naturally capped at
// 100. A trade is admissible once `total >= entryThreshold`, the book isn't
// spread-blocked, and the regime isn't bearish.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::indicators::atr::calculate_atr;
use crate::indicators::ema::calculate_ema;
use crate::indicators::macd::calculate_macd;
use crate::indicators::obv::{calculate_obv, obv_rising};
use crate::indicators::rsi::calculate_rsi;
use crate::indicators::sma::current_sma;
use crate::indicators::stoch_rsi::calculate_stoch_rsi;
use crate::indicators::vwap::calculate_vwap;
use crate::market_data::{Candle, OrderBookManager, TradeFlow};
use crate::types::{Regime, SessionProfile};

/// Cap applied to every individual dimension.
pub const DIMENSION_CAP: f64 = 20.0;

/// Spread, as a percent of mid, above which D4 hard-blocks entry regardless
/// of confluence elsewhere.
pub const SPREAD_BLOCK_PCT: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Full HYDRA scoring breakdown for one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydraScore {
    pub d1_trend: f64,
    pub d2_momentum: f64,
    pub d3_volume: f64,
    pub d4_liquidity: f64,
    pub d5_session: f64,
    pub total: f64,
    pub book_degraded: bool,
    pub spread_pct: Option<f64>,
    pub spread_blocked: bool,
}

impl HydraScore {
    pub fn dimensions(&self) -> [f64; 5] {
        [self.d1_trend, self.d2_momentum, self.d3_volume, self.d4_liquidity, self.d5_session]
    }

    /// D1 + D2 + D3, max 60 — the "exit score" re-evaluated on open
    /// positions by the exit monitor's early-exit check.
    pub fn exit_score(&self) -> f64 {
        self.d1_trend + self.d2_momentum + self.d3_volume
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryDecision {
    pub allowed: bool,
    pub confidence: Option<Confidence>,
    pub reason: Option<String>,
}

/// Inputs the scorer needs beyond the evaluated pair's own 1m series: its
/// derived 5m/15m candles, rolling trade flow, order book, and session
/// profile.
pub struct HydraContext<'a> {
    pub candles_1m: &'a [Candle],
    pub candles_5m: &'a [Candle],
    pub candles_15m: &'a [Candle],
    pub flow: Option<TradeFlow>,
    pub books: &'a OrderBookManager,
    pub symbol: &'a str,
    pub session_profile: &'a SessionProfile,
    pub session_weight: f64,
    pub entry_hour_utc: u32,
}

pub fn score(ctx: &HydraContext) -> HydraScore {
    let d1 = score_d1(ctx.candles_1m, ctx.candles_5m, ctx.candles_15m);
    let d2 = score_d2(ctx.candles_1m);
    let d3 = score_d3(ctx.candles_1m, ctx.flow);
    let book_degraded = ctx.books.is_degraded(ctx.symbol);
    let (d4, spread_pct, spread_blocked) = score_d4(ctx.books, ctx.symbol, ctx.candles_1m, book_degraded);
    let d5 = score_d5(ctx.candles_5m, ctx.session_profile, ctx.session_weight, ctx.entry_hour_utc);

    let total = (d1 + d2 + d3 + d4 + d5).clamp(0.0, 100.0);

    HydraScore {
        d1_trend: d1,
        d2_momentum: d2,
        d3_volume: d3,
        d4_liquidity: d4,
        d5_session: d5,
        total,
        book_degraded,
        spread_pct,
        spread_blocked,
    }
}

/// Gate a computed score against the entry threshold, the spread block and
/// the current regime, and derive the confidence tier of an admitted entry.
pub fn evaluate_entry(hydra: &HydraScore, entry_threshold: f64, regime: Regime) -> EntryDecision {
    if hydra.spread_blocked {
        let pct = hydra.spread_pct.unwrap_or(0.0);
        return EntryDecision {
            allowed: false,
            confidence: None,
            reason: Some(format!("Spread {pct:.3}% — BLOCKED")),
        };
    }
    if regime == Regime::Bearish {
        return EntryDecision { allowed: false, confidence: None, reason: Some("regime bearish".to_string()) };
    }
    if hydra.total < entry_threshold {
        return EntryDecision {
            allowed: false,
            confidence: None,
            reason: Some(format!("score {:.1} below threshold {:.1}", hydra.total, entry_threshold)),
        };
    }
    let confidence = if hydra.total >= 90.0 {
        Confidence::High
    } else if hydra.total >= 85.0 {
        Confidence::Medium
    } else {
        Confidence::Low
    };
    EntryDecision { allowed: true, confidence: Some(confidence), reason: None }
}

// =============================================================================
// D1 — Trend Alignment
// =============================================================================

/// `1` bullish, `-1` bearish, `0` neutral, per a single timeframe's own
/// EMA9/21/50 stack and SMA200.
fn classify_tf(candles: &[Candle]) -> i8 {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let price = match closes.last() {
        Some(p) => *p,
        None => return 0,
    };
    let ema9 = calculate_ema(&closes, 9).last().copied();
    let ema21 = calculate_ema(&closes, 21).last().copied();
    let (e9, e21) = match (ema9, ema21) {
        (Some(a), Some(b)) => (a, b),
        _ => return 0,
    };
    if e9 < e21 {
        return -1;
    }
    let ema50 = calculate_ema(&closes, 50).last().copied();
    let stack_ok = match ema50 {
        Some(e50) => e9 > e21 && e21 > e50,
        None => e9 > e21,
    };
    let sma200 = current_sma(&closes, 200);
    let price_ok = match sma200 {
        Some(s) => price > s,
        None => true,
    };
    if stack_ok && price_ok {
        1
    } else {
        0
    }
}

fn score_d1(c1m: &[Candle], c5m: &[Candle], c15m: &[Candle]) -> f64 {
    let t1 = classify_tf(c1m);
    let t5 = classify_tf(c5m);
    let t15 = classify_tf(c15m);

    let raw = (if t1 == 1 { 4.0 } else { 0.0 }) + (if t5 == 1 { 7.0 } else { 0.0 }) + (if t15 == 1 { 9.0 } else { 0.0 });

    if t1 == -1 || t5 == -1 || t15 == -1 {
        raw.min(5.0)
    } else if raw == 0.0 {
        3.0
    } else {
        raw
    }
}

// =============================================================================
// D2 — Momentum Quality
// =============================================================================

fn score_d2(candles: &[Candle]) -> f64 {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let mut s = 0.0;

    let rsi_series = calculate_rsi(&closes, 14);
    if let Some(&r) = rsi_series.last() {
        if (50.0..=65.0).contains(&r) {
            s += 6.0;
        } else if (45.0..50.0).contains(&r) {
            let recent_min = rsi_series[rsi_series.len().saturating_sub(6)..rsi_series.len() - 1]
                .iter()
                .cloned()
                .fold(f64::MAX, f64::min);
            s += if recent_min < 40.0 { 5.0 } else { 3.0 };
        } else if r > 65.0 && r <= 72.0 {
            s += 3.0;
        }
    }

    let macd = calculate_macd(&closes, 12, 26, 9);
    if macd.len() >= 2 {
        if let (Some(cur), Some(prev)) = (macd[macd.len() - 1], macd[macd.len() - 2]) {
            if cur.histogram > 0.0 && cur.histogram > prev.histogram {
                s += 7.0;
            } else if prev.histogram <= 0.0 && cur.histogram > 0.0 {
                s += 6.0;
            } else if cur.histogram > 0.0 && cur.histogram < prev.histogram {
                s += 3.0;
            }
        }
    }

    let stoch = calculate_stoch_rsi(&closes, 14, 14, 3, 3);
    if stoch.len() >= 2 {
        if let (Some(cur), Some(prev)) = (stoch[stoch.len() - 1], stoch[stoch.len() - 2]) {
            if prev.k <= prev.d && cur.k > cur.d && cur.k < 80.0 {
                s += 7.0;
            } else if cur.k > cur.d && cur.k > 50.0 && cur.d > 50.0 {
                s += 5.0;
            } else if cur.k > cur.d {
                s += 2.0;
            }
        }
    }

    if hidden_bullish_divergence(candles, &rsi_series) {
        s += 3.0;
    }

    s.min(DIMENSION_CAP)
}

/// Price makes a higher low while RSI makes a lower low across the two most
/// recent pivot lows within the trailing 20 bars.
fn hidden_bullish_divergence(candles: &[Candle], rsi_series: &[f64]) -> bool {
    let n = candles.len();
    if n < 22 {
        return false;
    }
    let offset = n - rsi_series.len();
    let start = n.saturating_sub(20).max(1);

    let mut pivots: Vec<(f64, f64)> = Vec::new(); // (price_low, rsi)
    for i in start..n - 1 {
        if candles[i].low < candles[i - 1].low && candles[i].low < candles[i + 1].low {
            if let Some(rsi_idx) = i.checked_sub(offset) {
                if let Some(&r) = rsi_series.get(rsi_idx) {
                    pivots.push((candles[i].low, r));
                }
            }
        }
    }
    if pivots.len() < 2 {
        return false;
    }
    let (prev_price, prev_rsi) = pivots[pivots.len() - 2];
    let (last_price, last_rsi) = pivots[pivots.len() - 1];
    last_price > prev_price && last_rsi < prev_rsi
}

// =============================================================================
// D3 — Volume Conviction
// =============================================================================

fn score_d3(candles: &[Candle], flow: Option<TradeFlow>) -> f64 {
    let mut s = 0.0;

    if !candles.is_empty() {
        let current_vol = candles.last().unwrap().volume;
        let window_start = candles.len().saturating_sub(20);
        let window = &candles[window_start..];
        let avg_vol = window.iter().map(|c| c.volume).sum::<f64>() / window.len() as f64;
        if avg_vol > 0.0 {
            let ratio = current_vol / avg_vol;
            if ratio >= 2.0 {
                s += 6.0;
            } else if ratio >= 1.5 {
                s += 4.0;
            } else if ratio >= 1.2 {
                s += 2.0;
            }
        }
    }

    let obv = calculate_obv(candles);
    if obv_rising(&obv, 5, 3) {
        s += 7.0;
    } else if obv_rising(&obv, 5, 2) {
        s += 3.0;
    }

    match flow {
        Some(f) => {
            let total = f.buy_volume + f.sell_volume;
            if total > 0.0 {
                let share = f.buy_volume / total;
                if share > 0.65 {
                    s += 7.0;
                } else if share >= 0.55 {
                    s += 5.0;
                } else if share >= 0.50 {
                    s += 3.0;
                }
            }
        }
        None => s += 5.0,
    }

    s.min(DIMENSION_CAP)
}

// =============================================================================
// D4 — Microstructure
// =============================================================================

fn score_d4(books: &OrderBookManager, symbol: &str, candles_1m: &[Candle], book_degraded: bool) -> (f64, Option<f64>, bool) {
    if book_degraded {
        // DegradedBook: deny depth-dependent contribution but don't block
        // entry outright (spread is simply unmeasurable here).
        return (0.0, None, false);
    }

    let mut s = 0.0;

    let bids = books.bids(symbol);
    let asks = books.asks(symbol);
    let bid_sum: f64 = bids.iter().take(10).map(|(_, q)| q).sum();
    let ask_sum: f64 = asks.iter().take(10).map(|(_, q)| q).sum();
    if ask_sum > 0.0 {
        let imbalance = bid_sum / ask_sum;
        if imbalance > 2.0 {
            s += 8.0;
        } else if imbalance >= 1.5 {
            s += 6.0;
        } else if imbalance >= 1.2 {
            s += 4.0;
        }
    }

    let mut spread_pct = None;
    let mut blocked = false;
    if let Some(spread_bps) = books.spread_bps(symbol) {
        let pct = spread_bps / 100.0;
        spread_pct = Some(pct);
        if pct > SPREAD_BLOCK_PCT {
            blocked = true;
        } else if pct <= 0.03 {
            s += 6.0;
        } else if pct <= 0.08 {
            s += 4.0;
        } else if pct <= 0.15 {
            s += 3.0;
        } else {
            s += 1.0;
        }
    }

    if !blocked {
        if let Some(points) = score_vwap_location(candles_1m) {
            s += points;
        }
    }

    (s.min(DIMENSION_CAP), spread_pct, blocked)
}

fn score_vwap_location(candles: &[Candle]) -> Option<f64> {
    let vwap = calculate_vwap(candles);
    let n = candles.len();
    if n == 0 {
        return None;
    }
    let price = candles[n - 1].close;
    let cur_vwap = vwap[n - 1]?;
    if price < cur_vwap {
        return Some(0.0);
    }

    let recently_below = (1..=2).any(|back| {
        if back >= n {
            return false;
        }
        let idx = n - 1 - back;
        matches!(vwap[idx], Some(v) if candles[idx].close < v)
    });
    if recently_below {
        return Some(6.0);
    }

    let dist_pct = (price - cur_vwap) / cur_vwap * 100.0;
    if dist_pct <= 0.2 {
        Some(5.0)
    } else if dist_pct <= 0.5 {
        Some(3.0)
    } else {
        Some(1.0)
    }
}

// =============================================================================
// D5 — Session Intelligence
// =============================================================================

fn score_d5(candles: &[Candle], session_profile: &SessionProfile, session_weight: f64, entry_hour_utc: u32) -> f64 {
    let hourly = session_profile.score_for_hour(entry_hour_utc) as f64;
    let mut s = hourly * session_weight;

    if let (Some(atr14), Some(avg)) = (calculate_atr(candles, 14), atr_trailing_average(candles, 14, 50)) {
        if avg > 0.0 {
            let ratio = atr14 / avg;
            if (0.8..=1.5).contains(&ratio) {
                s += 8.0;
            } else if ratio > 1.5 && ratio <= 2.5 {
                s += 5.0;
            } else if ratio > 2.5 {
                s += 1.0;
            } else {
                s += 3.0;
            }
        }
    }

    s.min(DIMENSION_CAP)
}

/// Average of ATR(`period`) recomputed at every bar over the trailing
/// `lookback` window, used to judge whether current volatility is in its
/// normal band.
fn atr_trailing_average(candles: &[Candle], period: usize, lookback: usize) -> Option<f64> {
    let n = candles.len();
    if n < period + 2 {
        return None;
    }
    let start = n.saturating_sub(lookback).max(period + 1);
    let mut values = Vec::new();
    for i in start..=n {
        if let Some(atr) = calculate_atr(&candles[..i], period) {
            values.push(atr);
        }
    }
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle_at(i: i64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: i * 60_000,
            close_time: i * 60_000 + 59_999,
            open: close - 0.1,
            high: close + 0.3,
            low: close - 0.3,
            close,
            volume,
            quote_volume: volume * close,
            trades_count: 10,
            taker_buy_volume: volume * 0.6,
            taker_buy_quote_volume: volume * close * 0.6,
            is_closed: true,
        }
    }

    fn uptrend(n: usize) -> Vec<Candle> {
        (0..n as i64).map(|i| candle_at(i, 100.0 + i as f64 * 0.3, 100.0 + i as f64)).collect()
    }

    fn downtrend(n: usize) -> Vec<Candle> {
        (0..n as i64).map(|i| candle_at(i, 200.0 - i as f64 * 0.3, 100.0)).collect()
    }

    fn ctx<'a>(
        c1m: &'a [Candle],
        c5m: &'a [Candle],
        c15m: &'a [Candle],
        books: &'a OrderBookManager,
        profile: &'a SessionProfile,
    ) -> HydraContext<'a> {
        HydraContext {
            candles_1m: c1m,
            candles_5m: c5m,
            candles_15m: c15m,
            flow: Some(TradeFlow { buy_volume: 100.0, sell_volume: 40.0, ratio: 2.5 }),
            books,
            symbol: "BTCUSDT",
            session_profile: profile,
            session_weight: 1.0,
            entry_hour_utc: 14,
        }
    }

    #[test]
    fn total_and_each_dimension_are_capped() {
        let c1m = uptrend(220);
        let c5m = uptrend(220);
        let c15m = uptrend(220);
        let books = OrderBookManager::new();
        books.apply_snapshot("BTCUSDT", vec![(99.9, 30.0)], vec![(100.0, 10.0)], 1);
        let profile = SessionProfile::hardcoded_default();
        let result = score(&ctx(&c1m, &c5m, &c15m, &books, &profile));
        assert!(result.total <= 100.0);
        for d in result.dimensions() {
            assert!(d <= DIMENSION_CAP + 1e-9);
        }
    }

    #[test]
    fn bearish_timeframe_caps_d1_at_five() {
        let c1m = uptrend(220);
        let c5m = downtrend(220); // EMA9 < EMA21 on this frame
        let c15m = uptrend(220);
        let d1 = score_d1(&c1m, &c5m, &c15m);
        assert!(d1 <= 5.0);
    }

    #[test]
    fn wide_spread_blocks_entry_with_formatted_reason() {
        let books = OrderBookManager::new();
        books.apply_snapshot("BTCUSDT", vec![(99.50, 10.0)], vec![(99.90, 10.0)], 1);
        let c1m = uptrend(220);
        let hydra = score(&ctx(&c1m, &c1m, &c1m, &books, &SessionProfile::hardcoded_default()));
        assert!(hydra.spread_blocked);
        let decision = evaluate_entry(&hydra, 80.0, Regime::Bullish);
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("BLOCKED"));
    }

    #[test]
    fn degraded_book_zeroes_d4_without_blocking() {
        let books = OrderBookManager::new();
        books.apply_snapshot("BTCUSDT", vec![(101.0, 10.0)], vec![(100.0, 10.0)], 1);
        let c1m = uptrend(220);
        let hydra = score(&ctx(&c1m, &c1m, &c1m, &books, &SessionProfile::hardcoded_default()));
        assert!(hydra.book_degraded);
        assert_eq!(hydra.d4_liquidity, 0.0);
        assert!(!hydra.spread_blocked);
    }

    #[test]
    fn bearish_regime_denies_even_with_high_score() {
        let hydra = HydraScore {
            d1_trend: 20.0,
            d2_momentum: 20.0,
            d3_volume: 20.0,
            d4_liquidity: 20.0,
            d5_session: 20.0,
            total: 100.0,
            book_degraded: false,
            spread_pct: Some(0.01),
            spread_blocked: false,
        };
        let decision = evaluate_entry(&hydra, 80.0, Regime::Bearish);
        assert!(!decision.allowed);
    }

    #[test]
    fn confidence_tiers_follow_total_score() {
        let mk = |total: f64| HydraScore {
            d1_trend: 0.0,
            d2_momentum: 0.0,
            d3_volume: 0.0,
            d4_liquidity: 0.0,
            d5_session: 0.0,
            total,
            book_degraded: false,
            spread_pct: Some(0.01),
            spread_blocked: false,
        };
        assert_eq!(evaluate_entry(&mk(92.0), 80.0, Regime::Bullish).confidence, Some(Confidence::High));
        assert_eq!(evaluate_entry(&mk(87.0), 80.0, Regime::Bullish).confidence, Some(Confidence::Medium));
        assert_eq!(evaluate_entry(&mk(81.0), 80.0, Regime::Bullish).confidence, Some(Confidence::Low));
        assert!(!evaluate_entry(&mk(79.0), 80.0, Regime::Bullish).allowed);
    }

    #[test]
    fn exit_score_is_sum_of_first_three_dimensions() {
        let c1m = uptrend(220);
        let books = OrderBookManager::new();
        let hydra = score(&ctx(&c1m, &c1m, &c1m, &books, &SessionProfile::hardcoded_default()));
        assert!((hydra.exit_score() - (hydra.d1_trend + hydra.d2_momentum + hydra.d3_volume)).abs() < 1e-9);
        assert!(hydra.exit_score() <= 60.0);
    }
}
