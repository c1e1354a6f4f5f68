// =============================================================================
// HYDRA position sizing — ATR-scaled, confluence-weighted
// =============================================================================
//
//   riskUSD        = V * riskPerTrade
//   stopDistance   = 1.5 * ATR14
//   rawPositionUSD = riskUSD / (stopDistance / P)
//   multiplier m   = 1.5  when S >= 95
//                    1.25 when S >= 90
//                    1.0  when S >= 85
//                    0.75 otherwise
//   positionUSD    = min(rawPositionUSD * m, V * maxPositionPct)
//   tp1            = P + 1.2 * ATR14
//   tp2            = P + 2.5 * ATR14
//   trailDistance  = 0.8 * ATR14
//   tp1ClosePct = tp2ClosePct = 0.40
//
// Positions are long-only (per the Position Lifecycle Manager), so every
// target sits above entry and the stop below it.
// =============================================================================

pub const STOP_ATR_MULTIPLIER: f64 = 1.5;
pub const TP1_ATR_MULTIPLIER: f64 = 1.2;
pub const TP2_ATR_MULTIPLIER: f64 = 2.5;
pub const TRAIL_ATR_MULTIPLIER: f64 = 0.8;
pub const TP1_CLOSE_PCT: f64 = 0.40;
pub const TP2_CLOSE_PCT: f64 = 0.40;
pub const DEFAULT_MAX_POSITION_PCT: f64 = 0.08;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizingResult {
    pub position_usd: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
    pub trail_distance: f64,
    pub size_multiplier: f64,
}

/// Multiplier tier applied to the raw risk-sized position based on the
/// confluence `score` (0-100).
pub fn size_multiplier(score: f64) -> f64 {
    if score >= 95.0 {
        1.5
    } else if score >= 90.0 {
        1.25
    } else if score >= 85.0 {
        1.0
    } else {
        0.75
    }
}

/// Compute the full ATR-based sizing for a new position.
///
/// `capital` is current account equity (`V`), `risk_per_trade` is the
/// fraction of capital risked on a full stop-out, `atr14` is the latest 5m
/// ATR(14), `price` is the proposed entry price, `score` is the HYDRA total
/// (0-100), and `max_position_pct` caps notional exposure as a fraction of
/// capital (defaults to 8%).
pub fn compute_sizing(
    capital: f64,
    risk_per_trade: f64,
    atr14: f64,
    price: f64,
    score: f64,
    max_position_pct: f64,
) -> Option<SizingResult> {
    if capital <= 0.0 || atr14 <= 0.0 || price <= 0.0 {
        return None;
    }

    let stop_distance = STOP_ATR_MULTIPLIER * atr14;
    let risk_usd = capital * risk_per_trade;
    let raw_position_usd = risk_usd / (stop_distance / price);

    let multiplier = size_multiplier(score);
    let cap_usd = capital * max_position_pct.max(0.0);
    let position_usd = (raw_position_usd * multiplier).min(cap_usd).max(0.0);
    let quantity = position_usd / price;

    let stop_loss = price - stop_distance;
    let take_profit_1 = price + TP1_ATR_MULTIPLIER * atr14;
    let take_profit_2 = price + TP2_ATR_MULTIPLIER * atr14;

    Some(SizingResult {
        position_usd,
        quantity,
        stop_loss,
        take_profit_1,
        take_profit_2,
        trail_distance: TRAIL_ATR_MULTIPLIER * atr14,
        size_multiplier: multiplier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplier_tiers_match_score_thresholds() {
        assert_eq!(size_multiplier(96.0), 1.5);
        assert_eq!(size_multiplier(90.0), 1.25);
        assert_eq!(size_multiplier(85.0), 1.0);
        assert_eq!(size_multiplier(84.9), 0.75);
    }

    #[test]
    fn raw_position_is_capped_by_max_position_pct() {
        let result = compute_sizing(1000.0, 0.02, 1.0, 100.0, 99.0, 0.08).unwrap();
        assert!(result.position_usd <= 80.0 + 1e-9);
    }

    #[test]
    fn targets_sit_above_entry_and_stop_below() {
        let sized = compute_sizing(1000.0, 0.01, 1.0, 100.0, 80.0, 0.08).unwrap();
        assert!(sized.take_profit_1 > 100.0);
        assert!(sized.take_profit_2 > sized.take_profit_1);
        assert!(sized.stop_loss < 100.0);
    }

    #[test]
    fn zero_atr_or_capital_yields_none() {
        assert!(compute_sizing(0.0, 0.01, 1.0, 100.0, 90.0, 0.08).is_none());
        assert!(compute_sizing(1000.0, 0.01, 0.0, 100.0, 90.0, 0.08).is_none());
    }
}
