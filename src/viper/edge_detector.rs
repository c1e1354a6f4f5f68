// =============================================================================
// VIPER Edge Detector — periodic mode election
// =============================================================================
//
// Every `edge_detector_interval_min`, score STRIKE/COIL/LUNGE 0-100 and elect
// whichever mode scores highest (ties favor the prior elected mode, else
// STRIKE > COIL > LUNGE). A mode whose hard preconditions fail scores 0 and
// cannot win even if its secondary signals look good.
//
// Each mode's score is built the same way: hard preconditions gate the score
// to zero; once they pass, the score continues from a floor of 50 and adds
// a normalized margin for each secondary condition by how far it clears its
// threshold, capped at 100. This is the same precondition set used by each
// mode's entry gate, just made continuous instead of boolean.
// =============================================================================

use crate::indicators::adx::calculate_adx;
use crate::indicators::atr::calculate_atr;
use crate::indicators::ema::calculate_ema;
use crate::indicators::sma::current_sma;
use crate::market_data::{Candle, TradeFlow};
use crate::types::ViperMode;

use super::coil;
use super::lunge;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeScores {
    pub strike: f64,
    pub coil: f64,
    pub lunge: f64,
}

impl ModeScores {
    pub fn elect(&self, previous: Option<ViperMode>) -> Option<ViperMode> {
        let candidates = [(ViperMode::Strike, self.strike), (ViperMode::Coil, self.coil), (ViperMode::Lunge, self.lunge)];
        let best = candidates.iter().cloned().fold(None::<(ViperMode, f64)>, |acc, (mode, score)| match acc {
            None => Some((mode, score)),
            Some((best_mode, best_score)) => {
                if score > best_score {
                    Some((mode, score))
                } else if (score - best_score).abs() < f64::EPSILON {
                    if previous == Some(mode) {
                        Some((mode, score))
                    } else {
                        Some((best_mode, best_score))
                    }
                } else {
                    Some((best_mode, best_score))
                }
            }
        });
        match best {
            Some((mode, score)) if score > 0.0 => Some(mode),
            _ => None,
        }
    }
}

fn clamp_margin(value: f64, threshold: f64, span: f64) -> f64 {
    if span <= 0.0 {
        return 0.0;
    }
    ((value - threshold) / span).clamp(0.0, 1.0)
}

pub fn score_strike(candles_1m: &[Candle], spread_pct: Option<f64>, flow: Option<TradeFlow>) -> f64 {
    let Some(spread) = spread_pct else { return 0.0 };
    if spread > super::strike::SPREAD_MAX_PCT {
        return 0.0;
    }
    let Some(flow) = flow else { return 0.0 };
    let buy_flow_share = flow.buy_volume / (flow.buy_volume + flow.sell_volume).max(1e-9);
    if buy_flow_share <= super::strike::BUY_FLOW_MIN {
        return 0.0;
    }
    if candles_1m.len() < 10 {
        return 0.0;
    }

    let margins = [
        clamp_margin(super::strike::SPREAD_MAX_PCT - spread, 0.0, super::strike::SPREAD_MAX_PCT),
        clamp_margin(buy_flow_share, super::strike::BUY_FLOW_MIN, 1.0 - super::strike::BUY_FLOW_MIN),
    ];
    50.0 + margins.iter().sum::<f64>() / margins.len() as f64 * 50.0
}

pub fn score_coil(candles_5m: &[Candle]) -> f64 {
    let Some(range) = coil::detect_range(candles_5m) else { return 0.0 };
    let Some(last) = candles_5m.last() else { return 0.0 };
    let above_support_pct = ((last.close - range.support) / range.support) * 100.0;
    if above_support_pct > coil::ENTRY_ABOVE_SUPPORT_MAX_PCT || above_support_pct < -coil::ENTRY_BELOW_SUPPORT_MAX_PCT {
        return 0.0;
    }

    let volumes: Vec<f64> = candles_5m.iter().map(|c| c.volume).collect();
    let vol_margin = match current_sma(&volumes, 20) {
        Some(sma) if sma > 0.0 => clamp_margin(last.volume / sma, 1.0, coil::VOLUME_SMA_MULTIPLIER - 1.0),
        _ => 0.0,
    };
    let adx_margin = match calculate_adx(candles_5m, 14) {
        Some(adx) => clamp_margin(coil::ADX_MAX - adx, 0.0, coil::ADX_MAX),
        None => 0.0,
    };
    let centering_margin = clamp_margin(1.5 - above_support_pct.abs(), 0.0, 1.5);

    let margins = [vol_margin, adx_margin, centering_margin];
    50.0 + margins.iter().sum::<f64>() / margins.len() as f64 * 50.0
}

pub fn score_lunge(candles_15m: &[Candle], lunge_eligible: bool) -> f64 {
    if !lunge_eligible || candles_15m.len() < 52 {
        return 0.0;
    }
    let closes: Vec<f64> = candles_15m.iter().map(|c| c.close).collect();
    let ema9 = calculate_ema(&closes, 9);
    let ema21 = calculate_ema(&closes, 21);
    let ema50 = calculate_ema(&closes, 50);
    let (Some(&e9), Some(&e21), Some(&e50)) = (ema9.last(), ema21.last(), ema50.last()) else {
        return 0.0;
    };
    if !(e9 > e21 && e21 > e50) {
        return 0.0;
    }

    let adx = calculate_adx(candles_15m, 14);
    let Some(adx_now) = adx else { return 0.0 };
    if adx_now <= lunge::ADX_MIN {
        return 0.0;
    }

    let volumes: Vec<f64> = candles_15m.iter().map(|c| c.volume).collect();
    let vol_margin = match current_sma(&volumes, 20) {
        Some(sma) if sma > 0.0 => clamp_margin(candles_15m.last().unwrap().volume / sma, lunge::VOLUME_SMA_MULTIPLIER, 1.0),
        _ => 0.0,
    };
    let adx_margin = clamp_margin(adx_now, lunge::ADX_MIN, 20.0);
    let stack_margin = clamp_margin((e9 - e21) / e21 * 100.0, 0.0, 1.0);

    let margins = [vol_margin, adx_margin, stack_margin];
    50.0 + margins.iter().sum::<f64>() / margins.len() as f64 * 50.0
}

pub fn score_all(
    candles_1m: &[Candle],
    candles_5m: &[Candle],
    candles_15m: &[Candle],
    spread_pct: Option<f64>,
    flow: Option<TradeFlow>,
    lunge_eligible: bool,
) -> ModeScores {
    ModeScores {
        strike: score_strike(candles_1m, spread_pct, flow),
        coil: score_coil(candles_5m),
        lunge: score_lunge(candles_15m, lunge_eligible),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_mode_with_failed_precondition_scores_zero() {
        assert_eq!(score_strike(&[], None, None), 0.0);
        assert_eq!(score_coil(&[]), 0.0);
        assert_eq!(score_lunge(&[], false), 0.0);
    }

    #[test]
    fn wide_spread_zeroes_strike_score_regardless_of_flow() {
        let candles: Vec<Candle> = (0..15)
            .map(|_| Candle {
                open_time: 0, close_time: 0, open: 100.0, high: 100.5, low: 99.5, close: 100.0,
                volume: 100.0, quote_volume: 10_000.0, trades_count: 5, taker_buy_volume: 70.0, taker_buy_quote_volume: 7_000.0, is_closed: true,
            })
            .collect();
        let flow = TradeFlow { buy_volume: 900.0, sell_volume: 100.0, ratio: 9.0 };
        assert_eq!(score_strike(&candles, Some(0.5), Some(flow)), 0.0);
    }

    #[test]
    fn election_prefers_highest_score() {
        let scores = ModeScores { strike: 40.0, coil: 80.0, lunge: 10.0 };
        assert_eq!(scores.elect(None), Some(ViperMode::Coil));
    }

    #[test]
    fn election_returns_none_when_every_mode_scores_zero() {
        let scores = ModeScores { strike: 0.0, coil: 0.0, lunge: 0.0 };
        assert_eq!(scores.elect(None), None);
    }

    #[test]
    fn tie_favors_the_previously_elected_mode() {
        let scores = ModeScores { strike: 70.0, coil: 70.0, lunge: 0.0 };
        assert_eq!(scores.elect(Some(ViperMode::Coil)), Some(ViperMode::Coil));
        assert_eq!(scores.elect(Some(ViperMode::Lunge)), Some(ViperMode::Strike));
    }
}
