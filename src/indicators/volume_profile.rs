// =============================================================================
// Volume Profile — point of control + 70% value area
// =============================================================================
//
// Volume is bucketed by price (using each candle's typical price), the
// bucket with the most volume is the point of control (POC), and the value
// area is grown outward from the POC — at each step taking whichever
// neighbouring bucket (above or below) holds more volume — until at least
// 70% of total volume is enclosed.
// =============================================================================

use crate::market_data::Candle;

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeProfile {
    pub poc_price: f64,
    pub value_area_high: f64,
    pub value_area_low: f64,
}

/// Compute a volume profile over `candles` using `bucket_count` equal-width
/// price buckets. Returns `None` for an empty slice or a degenerate
/// (zero-range) price window.
pub fn calculate_volume_profile(candles: &[Candle], bucket_count: usize) -> Option<VolumeProfile> {
    if candles.is_empty() || bucket_count == 0 {
        return None;
    }

    let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    if !(high > low) {
        return None;
    }

    let width = (high - low) / bucket_count as f64;
    let mut volumes = vec![0.0_f64; bucket_count];

    for c in candles {
        let typical = (c.high + c.low + c.close) / 3.0;
        let mut idx = ((typical - low) / width) as usize;
        if idx >= bucket_count {
            idx = bucket_count - 1;
        }
        volumes[idx] += c.volume;
    }

    let total_volume: f64 = volumes.iter().sum();
    if total_volume <= 0.0 {
        return None;
    }

    let poc_idx = volumes
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap();

    let mut lo = poc_idx;
    let mut hi = poc_idx;
    let mut covered = volumes[poc_idx];
    let target = total_volume * 0.70;

    while covered < target && (lo > 0 || hi < bucket_count - 1) {
        let below = if lo > 0 { volumes[lo - 1] } else { -1.0 };
        let above = if hi < bucket_count - 1 { volumes[hi + 1] } else { -1.0 };

        if above >= below {
            hi += 1;
            covered += volumes[hi];
        } else {
            lo -= 1;
            covered += volumes[lo];
        }
    }

    Some(VolumeProfile {
        poc_price: low + (poc_idx as f64 + 0.5) * width,
        value_area_high: low + (hi as f64 + 1.0) * width,
        value_area_low: low + lo as f64 * width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(h: f64, l: f64, c: f64, v: f64) -> Candle {
        Candle {
            open_time: 0,
            close_time: 0,
            open: c,
            high: h,
            low: l,
            close: c,
            volume: v,
            quote_volume: v * c,
            trades_count: 1,
            taker_buy_volume: v / 2.0,
            taker_buy_quote_volume: v * c / 2.0,
            is_closed: true,
        }
    }

    #[test]
    fn value_area_contains_poc() {
        let mut candles = vec![candle(101.0, 99.0, 100.0, 1000.0); 20];
        candles.push(candle(111.0, 109.0, 110.0, 5.0));
        let profile = calculate_volume_profile(&candles, 20).unwrap();
        assert!(profile.value_area_low <= profile.poc_price);
        assert!(profile.poc_price <= profile.value_area_high);
        // POC should sit near the heavily-traded 100 cluster, not the thin 110 tail.
        assert!((profile.poc_price - 100.0).abs() < 2.0);
    }

    #[test]
    fn degenerate_range_returns_none() {
        let candles = vec![candle(100.0, 100.0, 100.0, 10.0); 5];
        assert!(calculate_volume_profile(&candles, 10).is_none());
    }
}
