// =============================================================================
// Order Book Manager — ordered bid/ask ladder, snapshot + delta mutation
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use parking_lot::RwLock;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

/// One price level: `(price, quantity)`.
pub type Level = (f64, f64);

/// A single pair's order book, kept as sorted price ladders: bids
/// highest-first, asks lowest-first.
///
/// `degraded` is set whenever an update would leave `best_bid >= best_ask`
/// (a crossed book). A degraded book's depth-dependent reads (spread,
/// imbalance) return `None` until a fresh snapshot clears it.
pub struct OrderBookState {
    symbol: String,
    bids: Vec<Level>, // descending by price
    asks: Vec<Level>, // ascending by price
    last_update_id: u64,
    degraded: bool,
}

fn upsert_level(levels: &mut Vec<Level>, price: f64, qty: f64, descending: bool) {
    let pos = levels.iter().position(|(p, _)| *p == price);
    if qty <= 0.0 {
        if let Some(i) = pos {
            levels.remove(i);
        }
        return;
    }
    if let Some(i) = pos {
        levels[i].1 = qty;
        return;
    }
    let insert_at = if descending {
        levels.iter().position(|(p, _)| *p < price).unwrap_or(levels.len())
    } else {
        levels.iter().position(|(p, _)| *p > price).unwrap_or(levels.len())
    };
    levels.insert(insert_at, (price, qty));
}

impl OrderBookState {
    fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: Vec::new(),
            asks: Vec::new(),
            last_update_id: 0,
            degraded: false,
        }
    }

    fn apply_snapshot(&mut self, bids: Vec<Level>, asks: Vec<Level>, update_id: u64) {
        self.bids.clear();
        self.asks.clear();
        for (p, q) in bids {
            if q > 0.0 {
                upsert_level(&mut self.bids, p, q, true);
            }
        }
        for (p, q) in asks {
            if q > 0.0 {
                upsert_level(&mut self.asks, p, q, false);
            }
        }
        self.last_update_id = update_id;
        self.degraded = false;
        self.recheck_crossed();
    }

    /// Apply a delta: each `(price, qty)` sets that level's quantity, and
    /// `qty <= 0` removes it. Updates with `update_id <= last_update_id` are
    /// ignored as stale.
    fn apply_delta(&mut self, bids: Vec<Level>, asks: Vec<Level>, update_id: u64) {
        if self.last_update_id != 0 && update_id <= self.last_update_id {
            return;
        }
        for (p, q) in bids {
            upsert_level(&mut self.bids, p, q, true);
        }
        for (p, q) in asks {
            upsert_level(&mut self.asks, p, q, false);
        }
        self.last_update_id = update_id;
        self.recheck_crossed();
    }

    fn recheck_crossed(&mut self) {
        if let (Some(bb), Some(ba)) = (self.best_bid(), self.best_ask()) {
            if bb >= ba {
                self.degraded = true;
            }
        }
    }

    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|(p, _)| *p)
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|(p, _)| *p)
    }

    pub fn bids(&self) -> &[Level] {
        &self.bids
    }

    pub fn asks(&self) -> &[Level] {
        &self.asks
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        }
    }

    /// Spread in basis points of mid price. `None` when degraded or empty.
    pub fn spread_bps(&self) -> Option<f64> {
        if self.degraded {
            return None;
        }
        match (self.best_bid(), self.best_ask(), self.mid_price()) {
            (Some(b), Some(a), Some(mid)) if mid > 0.0 => Some((a - b) / mid * 10_000.0),
            _ => None,
        }
    }

    /// `(bidVolume - askVolume) / (bidVolume + askVolume)` over the top
    /// `depth` levels on each side, in `[-1, 1]`.
    pub fn imbalance(&self, depth: usize) -> Option<f64> {
        if self.degraded {
            return None;
        }
        let bid_vol: f64 = self.bids.iter().take(depth).map(|(_, q)| q).sum();
        let ask_vol: f64 = self.asks.iter().take(depth).map(|(_, q)| q).sum();
        let total = bid_vol + ask_vol;
        if total <= 0.0 {
            None
        } else {
            Some((bid_vol - ask_vol) / total)
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

// ---------------------------------------------------------------------------
// OrderBookManager
// ---------------------------------------------------------------------------

/// Manages ordered order book state for multiple symbols.
pub struct OrderBookManager {
    books: RwLock<HashMap<String, OrderBookState>>,
}

impl OrderBookManager {
    pub fn new() -> Self {
        Self { books: RwLock::new(HashMap::new()) }
    }

    pub fn apply_snapshot(&self, symbol: &str, bids: Vec<Level>, asks: Vec<Level>, update_id: u64) {
        let mut books = self.books.write();
        books
            .entry(symbol.to_string())
            .or_insert_with(|| OrderBookState::new(symbol))
            .apply_snapshot(bids, asks, update_id);
    }

    pub fn apply_delta(&self, symbol: &str, bids: Vec<Level>, asks: Vec<Level>, update_id: u64) {
        let mut books = self.books.write();
        books
            .entry(symbol.to_string())
            .or_insert_with(|| OrderBookState::new(symbol))
            .apply_delta(bids, asks, update_id);
    }

    pub fn best_bid(&self, symbol: &str) -> Option<f64> {
        self.books.read().get(symbol).and_then(OrderBookState::best_bid)
    }

    pub fn best_ask(&self, symbol: &str) -> Option<f64> {
        self.books.read().get(symbol).and_then(OrderBookState::best_ask)
    }

    pub fn mid_price(&self, symbol: &str) -> Option<f64> {
        self.books.read().get(symbol).and_then(OrderBookState::mid_price)
    }

    pub fn spread_bps(&self, symbol: &str) -> Option<f64> {
        self.books.read().get(symbol).and_then(OrderBookState::spread_bps)
    }

    pub fn imbalance(&self, symbol: &str, depth: usize) -> Option<f64> {
        self.books.read().get(symbol).and_then(|b| b.imbalance(depth))
    }

    /// `true` when the book for `symbol` is crossed, or untracked entirely.
    /// Depth-dependent admission (spread guard, D4 liquidity scoring) must
    /// deny while a book is degraded.
    pub fn is_degraded(&self, symbol: &str) -> bool {
        self.books.read().get(symbol).map_or(true, OrderBookState::is_degraded)
    }

    pub fn bids(&self, symbol: &str) -> Vec<Level> {
        self.books.read().get(symbol).map(|b| b.bids().to_vec()).unwrap_or_default()
    }

    pub fn asks(&self, symbol: &str) -> Vec<Level> {
        self.books.read().get(symbol).map(|b| b.asks().to_vec()).unwrap_or_default()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.books.read().keys().cloned().collect()
    }
}

impl Default for OrderBookManager {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Depth WebSocket stream
// ---------------------------------------------------------------------------

/// Connect to the Binance partial depth WebSocket stream for a single symbol
/// and feed order book snapshots into `manager`.
///
/// Uses the `@depth20@100ms` stream, which publishes the top 20 levels of
/// the book every 100ms as a full snapshot.
///
/// Runs until the stream disconnects or an error occurs, then returns so the
/// caller can handle reconnection with backoff.
pub async fn run_depth_stream(symbol: &str, manager: &Arc<OrderBookManager>) -> Result<()> {
    let lower = symbol.to_lowercase();
    let url = format!("wss://stream.binance.com:9443/ws/{lower}@depth20@100ms");
    info!(url = %url, symbol = %symbol, "connecting to depth WebSocket");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to depth WebSocket")?;

    info!(symbol = %symbol, "depth WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_depth_message(&text) {
                        Ok((bids, asks, update_id)) => {
                            debug!(symbol = %symbol, bids = bids.len(), asks = asks.len(), "depth snapshot");
                            manager.apply_snapshot(symbol, bids, asks, update_id);
                        }
                        Err(e) => warn!(error = %e, "failed to parse depth message"),
                    }
                }
            }
            Some(Err(e)) => {
                error!(symbol = %symbol, error = %e, "depth WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "depth WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

/// Parse a Binance partial-depth message.
///
/// Expected shape:
/// ```json
/// {
///   "lastUpdateId": 12345,
///   "bids": [["37000.00", "1.5"], ...],
///   "asks": [["37001.00", "1.2"], ...]
/// }
/// ```
fn parse_depth_message(text: &str) -> Result<(Vec<Level>, Vec<Level>, u64)> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse depth JSON")?;
    let data = if root.get("data").is_some() { &root["data"] } else { &root };

    let update_id = data["lastUpdateId"].as_u64().unwrap_or(0);
    let bids = parse_levels(&data["bids"])?;
    let asks = parse_levels(&data["asks"])?;
    Ok((bids, asks, update_id))
}

fn parse_levels(val: &serde_json::Value) -> Result<Vec<Level>> {
    let arr = val.as_array().context("expected a levels array")?;
    let mut out = Vec::with_capacity(arr.len());
    for entry in arr {
        let pair = entry.as_array().context("expected a [price, qty] pair")?;
        let price: f64 = pair[0].as_str().context("price not a string")?.parse()?;
        let qty: f64 = pair[1].as_str().context("qty not a string")?.parse()?;
        out.push((price, qty));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_then_read_best_levels() {
        let mgr = OrderBookManager::new();
        mgr.apply_snapshot(
            "BTCUSDT",
            vec![(100.0, 1.0), (99.5, 2.0)],
            vec![(100.5, 1.0), (101.0, 3.0)],
            1,
        );
        assert_eq!(mgr.best_bid("BTCUSDT"), Some(100.0));
        assert_eq!(mgr.best_ask("BTCUSDT"), Some(100.5));
        assert!(!mgr.is_degraded("BTCUSDT"));
    }

    #[test]
    fn delta_removes_level_on_zero_qty() {
        let mgr = OrderBookManager::new();
        mgr.apply_snapshot("BTCUSDT", vec![(100.0, 1.0)], vec![(101.0, 1.0)], 1);
        mgr.apply_delta("BTCUSDT", vec![(100.0, 0.0)], vec![], 2);
        assert_eq!(mgr.best_bid("BTCUSDT"), None);
    }

    #[test]
    fn stale_delta_is_ignored() {
        let mgr = OrderBookManager::new();
        mgr.apply_snapshot("BTCUSDT", vec![(100.0, 1.0)], vec![(101.0, 1.0)], 10);
        mgr.apply_delta("BTCUSDT", vec![(100.0, 0.0)], vec![], 3);
        assert_eq!(mgr.best_bid("BTCUSDT"), Some(100.0));
    }

    #[test]
    fn crossed_book_sets_degraded_and_blocks_depth_reads() {
        let mgr = OrderBookManager::new();
        mgr.apply_snapshot("BTCUSDT", vec![(101.0, 1.0)], vec![(100.0, 1.0)], 1);
        assert!(mgr.is_degraded("BTCUSDT"));
        assert_eq!(mgr.spread_bps("BTCUSDT"), None);
        assert_eq!(mgr.imbalance("BTCUSDT", 5), None);
    }

    #[test]
    fn imbalance_favors_heavier_side() {
        let mgr = OrderBookManager::new();
        mgr.apply_snapshot("BTCUSDT", vec![(100.0, 9.0)], vec![(100.5, 1.0)], 1);
        let imb = mgr.imbalance("BTCUSDT", 5).unwrap();
        assert!(imb > 0.5);
    }

    #[test]
    fn unknown_symbol_is_treated_as_degraded() {
        let mgr = OrderBookManager::new();
        assert!(mgr.is_degraded("NOPE"));
    }
}
