// =============================================================================
// Trade Flow Processor — 60-second rolling buy/sell volume window
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use parking_lot::RwLock;
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};

/// Rolling window length for trade flow, per the TradeFlow entity.
pub const TRADE_FLOW_WINDOW_MS: i64 = 60_000;

struct TradeEvent {
    ts_ms: i64,
    volume: f64,
    is_buy: bool,
}

/// A snapshot of buy/sell volume and their ratio over the trailing 60s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeFlow {
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub ratio: f64,
}

/// Processes individual trades into a rolling 60-second buy/sell volume
/// window. Events older than the window are evicted on read, not on a
/// timer — `current_flow` is always consistent with `now_ms`.
pub struct TradeStreamProcessor {
    symbol: String,
    events: RwLock<VecDeque<TradeEvent>>,
    trade_count: AtomicU64,
    last_price: RwLock<f64>,
}

impl TradeStreamProcessor {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            events: RwLock::new(VecDeque::new()),
            trade_count: AtomicU64::new(0),
            last_price: RwLock::new(0.0),
        }
    }

    /// Process an incoming trade at `now_ms`. `is_buyer_maker == true` means
    /// the taker was selling (maker absorbed the sell), so that volume is
    /// counted as sell flow.
    pub fn process_trade(&self, price: f64, quantity: f64, is_buyer_maker: bool, now_ms: i64) {
        let volume = price * quantity;
        let is_buy = !is_buyer_maker;

        {
            let mut events = self.events.write();
            events.push_back(TradeEvent { ts_ms: now_ms, volume, is_buy });
            evict_stale(&mut events, now_ms);
        }

        *self.last_price.write() = price;
        self.trade_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn last_price(&self) -> f64 {
        *self.last_price.read()
    }

    pub fn trade_count(&self) -> u64 {
        self.trade_count.load(Ordering::Relaxed)
    }

    /// Current buy/sell volume and ratio over the trailing 60s, as of
    /// `now_ms`. `ratio = buyVolume / max(sellVolume, epsilon)`.
    pub fn current_flow(&self, now_ms: i64) -> TradeFlow {
        let mut events = self.events.write();
        evict_stale(&mut events, now_ms);

        let mut buy_volume = 0.0;
        let mut sell_volume = 0.0;
        for e in events.iter() {
            if e.is_buy {
                buy_volume += e.volume;
            } else {
                sell_volume += e.volume;
            }
        }
        let ratio = buy_volume / sell_volume.max(1e-9);
        TradeFlow { buy_volume, sell_volume, ratio }
    }
}

fn evict_stale(events: &mut VecDeque<TradeEvent>, now_ms: i64) {
    while let Some(front) = events.front() {
        if now_ms - front.ts_ms > TRADE_FLOW_WINDOW_MS {
            events.pop_front();
        } else {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Trade WebSocket stream
// ---------------------------------------------------------------------------

/// Connect to the Binance aggTrade WebSocket stream for a single symbol and
/// feed trades into `processor`.
///
/// Runs until the stream disconnects or an error occurs, then returns so the
/// caller can handle reconnection with backoff.
pub async fn run_trade_stream(symbol: &str, processor: &Arc<TradeStreamProcessor>) -> Result<()> {
    let lower = symbol.to_lowercase();
    let url = format!("wss://stream.binance.com:9443/ws/{lower}@aggTrade");
    info!(url = %url, symbol = %symbol, "connecting to trade WebSocket");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to trade WebSocket")?;

    info!(symbol = %symbol, "trade WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_agg_trade(&text) {
                        Ok((price, quantity, is_buyer_maker, ts_ms)) => {
                            processor.process_trade(price, quantity, is_buyer_maker, ts_ms);
                        }
                        Err(e) => warn!(error = %e, "failed to parse aggTrade message"),
                    }
                }
            }
            Some(Err(e)) => {
                error!(symbol = %symbol, error = %e, "trade WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "trade WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

/// Parse a Binance aggTrade message.
///
/// Expected shape:
/// ```json
/// { "e": "aggTrade", "s": "BTCUSDT", "p": "37000.00", "q": "0.123", "m": true, "T": 123456789 }
/// ```
fn parse_agg_trade(text: &str) -> Result<(f64, f64, bool, i64)> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse aggTrade JSON")?;
    let data = if root.get("data").is_some() { &root["data"] } else { &root };

    let price: f64 = data["p"].as_str().context("missing field p")?.parse().context("failed to parse price")?;
    let quantity: f64 = data["q"].as_str().context("missing field q")?.parse().context("failed to parse quantity")?;
    let is_buyer_maker = data["m"].as_bool().context("missing field m")?;
    let ts_ms = data["T"].as_i64().unwrap_or_else(crate::types::now_ms);

    Ok((price, quantity, is_buyer_maker, ts_ms))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_and_sell_volume_split_correctly() {
        let p = TradeStreamProcessor::new("BTCUSDT");
        p.process_trade(100.0, 1.0, false, 0); // buy
        p.process_trade(100.0, 2.0, true, 100); // sell
        let flow = p.current_flow(200);
        assert_eq!(flow.buy_volume, 100.0);
        assert_eq!(flow.sell_volume, 200.0);
        assert!((flow.ratio - 0.5).abs() < 1e-9);
    }

    #[test]
    fn events_older_than_60s_are_evicted() {
        let p = TradeStreamProcessor::new("BTCUSDT");
        p.process_trade(100.0, 1.0, false, 0);
        let flow = p.current_flow(60_001);
        assert_eq!(flow.buy_volume, 0.0);
        assert_eq!(flow.sell_volume, 0.0);
    }

    #[test]
    fn ratio_uses_epsilon_floor_when_no_sell_volume() {
        let p = TradeStreamProcessor::new("BTCUSDT");
        p.process_trade(100.0, 1.0, false, 0);
        let flow = p.current_flow(0);
        assert!(flow.ratio > 1e8);
    }

    #[test]
    fn last_price_tracks_most_recent_trade() {
        let p = TradeStreamProcessor::new("BTCUSDT");
        p.process_trade(100.0, 1.0, false, 0);
        p.process_trade(105.0, 1.0, true, 10);
        assert_eq!(p.last_price(), 105.0);
        assert_eq!(p.trade_count(), 2);
    }
}
