// =============================================================================
// Candle series store — per (pair, timeframe) ring buffer + 1m aggregation
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

use crate::types::Timeframe;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trades_count: u64,
    pub taker_buy_volume: f64,
    pub taker_buy_quote_volume: f64,
    pub is_closed: bool,
}

/// Composite key that identifies a unique candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandleKey {
    pub symbol: String,
    pub interval: String,
}

impl CandleKey {
    pub fn new(symbol: impl Into<String>, tf: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            interval: tf.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}

/// Series readiness: a strategy may only evaluate against a
/// `Ready` series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesState {
    Empty,
    Warming,
    Ready,
}

/// Bars in a series are capped at this count; truncation is from the front.
pub const MAX_BARS_PER_SERIES: usize = 300;

// ---------------------------------------------------------------------------
// CandleBuffer -- thread-safe store per (symbol, interval)
// ---------------------------------------------------------------------------

/// Thread-safe store that holds the most recent candles per
/// `(symbol, interval)` key. The live (unclosed) candle is continuously
/// updated in-place; when a candle closes it becomes permanent and the
/// series is trimmed to `max_candles`.
pub struct CandleBuffer {
    buffers: RwLock<HashMap<CandleKey, VecDeque<Candle>>>,
    max_candles: usize,
}

impl CandleBuffer {
    /// Create a new buffer that retains at most `max_candles` closed candles
    /// per key, plus one in-progress candle.
    pub fn new(max_candles: usize) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            max_candles,
        }
    }

    /// Insert or replace the latest candle for the given key.
    pub fn update(&self, key: CandleKey, candle: Candle) {
        let mut map = self.buffers.write();
        let ring = map
            .entry(key)
            .or_insert_with(|| VecDeque::with_capacity(self.max_candles + 1));

        if let Some(last) = ring.back() {
            if !last.is_closed && last.open_time == candle.open_time {
                ring.pop_back();
            }
        }
        ring.push_back(candle);

        while ring.iter().filter(|c| c.is_closed).count() > self.max_candles {
            if let Some(front) = ring.front() {
                if front.is_closed {
                    ring.pop_front();
                    continue;
                }
            }
            break;
        }
    }

    /// Return the most recent `count` **closed** candles (oldest-first).
    pub fn get_closed(&self, key: &CandleKey, count: usize) -> Vec<Candle> {
        let map = self.buffers.read();
        match map.get(key) {
            Some(ring) => {
                let closed: Vec<&Candle> = ring.iter().filter(|c| c.is_closed).collect();
                let start = closed.len().saturating_sub(count);
                closed[start..].iter().map(|c| (*c).clone()).collect()
            }
            None => Vec::new(),
        }
    }

    pub fn get_closes(&self, key: &CandleKey, count: usize) -> Vec<f64> {
        self.get_closed(key, count).iter().map(|c| c.close).collect()
    }

    /// Alias for [`get_closed`] — used by the strategy pipeline.
    pub fn get_closed_candles(&self, key: &CandleKey, count: usize) -> Vec<Candle> {
        self.get_closed(key, count)
    }

    pub fn last_close(&self, key: &CandleKey) -> Option<f64> {
        let map = self.buffers.read();
        map.get(key)
            .and_then(|ring| ring.iter().rev().find(|c| c.is_closed).map(|c| c.close))
    }

    pub fn count(&self, key: &CandleKey) -> usize {
        let map = self.buffers.read();
        map.get(key).map_or(0, VecDeque::len)
    }

    /// `Empty` with no bars, `Warming` below `warmup_bars`, else `Ready`.
    pub fn series_state(&self, key: &CandleKey, warmup_bars: usize) -> SeriesState {
        let closed = self.get_closed(key, usize::MAX).len();
        if closed == 0 {
            SeriesState::Empty
        } else if closed < warmup_bars {
            SeriesState::Warming
        } else {
            SeriesState::Ready
        }
    }

    /// Fold a newly-sealed 1m candle into every derived timeframe bucket
    /// (5m/15m/1h/4h) for `symbol`: floor-align the bucket
    /// start, then `open = first bucket open`, `high = max`, `low = min`,
    /// `close = last close`, `volume = sum`.
    pub fn aggregate_sealed_1m(&self, symbol: &str, sealed: &Candle) {
        for tf in Timeframe::derived() {
            let bucket_ms = tf.interval_ms();
            let bucket_open = (sealed.open_time / bucket_ms) * bucket_ms;
            let key = CandleKey::new(symbol, tf);

            let mut map = self.buffers.write();
            let ring = map
                .entry(key)
                .or_insert_with(|| VecDeque::with_capacity(self.max_candles + 1));

            let is_new_bucket = match ring.back() {
                Some(last) => last.open_time != bucket_open,
                None => true,
            };

            if is_new_bucket {
                if let Some(last) = ring.back_mut() {
                    last.is_closed = true;
                }
                ring.push_back(Candle {
                    open_time: bucket_open,
                    close_time: bucket_open + bucket_ms - 1,
                    open: sealed.open,
                    high: sealed.high,
                    low: sealed.low,
                    close: sealed.close,
                    volume: sealed.volume,
                    quote_volume: sealed.quote_volume,
                    trades_count: sealed.trades_count,
                    taker_buy_volume: sealed.taker_buy_volume,
                    taker_buy_quote_volume: sealed.taker_buy_quote_volume,
                    is_closed: false,
                });
            } else if let Some(bucket) = ring.back_mut() {
                bucket.high = bucket.high.max(sealed.high);
                bucket.low = bucket.low.min(sealed.low);
                bucket.close = sealed.close;
                bucket.volume += sealed.volume;
                bucket.quote_volume += sealed.quote_volume;
                bucket.trades_count += sealed.trades_count;
                bucket.taker_buy_volume += sealed.taker_buy_volume;
                bucket.taker_buy_quote_volume += sealed.taker_buy_quote_volume;
            }

            while ring.iter().filter(|c| c.is_closed).count() > self.max_candles {
                if let Some(front) = ring.front() {
                    if front.is_closed {
                        ring.pop_front();
                        continue;
                    }
                }
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Kline WebSocket stream (DIA collaborator)
// ---------------------------------------------------------------------------

const SUPPORTED_INTERVALS: &[&str] = &["1m"];

/// Connect to the exchange kline WebSocket stream for `symbol`'s 1m bars and
/// feed candles into `buffer`, aggregating every sealed bar into the derived
/// timeframes. Runs until the stream disconnects; the caller handles
/// reconnection with backoff.
pub async fn run_kline_stream(
    symbol: &str,
    interval: &str,
    buffer: &Arc<CandleBuffer>,
) -> Result<()> {
    if !SUPPORTED_INTERVALS.contains(&interval) {
        warn!(interval = %interval, "non-1m kline stream requested -- only 1m should be subscribed, derived frames are aggregated");
    }

    let lower = symbol.to_lowercase();
    let url = format!("wss://stream.binance.com:9443/ws/{lower}@kline_{interval}");
    info!(url = %url, symbol = %symbol, interval = %interval, "connecting to kline WebSocket");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to kline WebSocket")?;

    info!(symbol = %symbol, interval = %interval, "kline WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_kline_message_single(&text) {
                        Ok((key, candle)) => {
                            debug!(key = %key, close = candle.close, closed = candle.is_closed, "candle update");
                            let sealed_copy = if candle.is_closed { Some(candle.clone()) } else { None };
                            buffer.update(key, candle);
                            if let Some(sealed) = sealed_copy {
                                buffer.aggregate_sealed_1m(symbol, &sealed);
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to parse kline message"),
                    }
                }
            }
            Some(Err(e)) => {
                error!(error = %e, "kline WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, interval = %interval, "kline WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

fn parse_kline_message_single(text: &str) -> Result<(CandleKey, Candle)> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse kline JSON")?;

    let data = if root.get("data").is_some() { &root["data"] } else { &root };

    let symbol = data["s"].as_str().context("missing field s")?.to_uppercase();
    let k = &data["k"];

    let interval = k["i"].as_str().context("missing field k.i")?.to_string();
    let open_time = k["t"].as_i64().context("missing field k.t")?;
    let close_time = k["T"].as_i64().context("missing field k.T")?;

    let open = parse_string_f64(&k["o"], "k.o")?;
    let high = parse_string_f64(&k["h"], "k.h")?;
    let low = parse_string_f64(&k["l"], "k.l")?;
    let close = parse_string_f64(&k["c"], "k.c")?;
    let volume = parse_string_f64(&k["v"], "k.v")?;
    let quote_volume = parse_string_f64(&k["q"], "k.q")?;
    let taker_buy_volume = parse_string_f64(&k["V"], "k.V")?;
    let taker_buy_quote_volume = parse_string_f64(&k["Q"], "k.Q")?;

    let trades_count = k["n"].as_u64().context("missing field k.n")?;
    let is_closed = k["x"].as_bool().context("missing field k.x")?;

    let key = CandleKey { symbol, interval };
    let candle = Candle {
        open_time,
        close_time,
        open,
        high,
        low,
        close,
        volume,
        quote_volume,
        trades_count,
        taker_buy_volume,
        taker_buy_quote_volume,
        is_closed,
    };
    Ok((key, candle))
}

fn parse_string_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}")),
        serde_json::Value::Number(n) => n.as_f64().with_context(|| format!("field {name} is not a valid f64")),
        _ => anyhow::bail!("field {name} has unexpected JSON type"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle(open_time: i64, close: f64, is_closed: bool) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 59_999,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
            quote_volume: 200.0,
            trades_count: 50,
            taker_buy_volume: 60.0,
            taker_buy_quote_volume: 120.0,
            is_closed,
        }
    }

    fn make_key(sym: &str, iv: &str) -> CandleKey {
        CandleKey { symbol: sym.into(), interval: iv.into() }
    }

    #[test]
    fn ring_buffer_trimming() {
        let buf = CandleBuffer::new(3);
        let key = make_key("BTCUSDT", "1m");
        for i in 0..5 {
            buf.update(key.clone(), sample_candle(i * 60_000, 100.0 + i as f64, true));
        }
        assert_eq!(buf.get_closed(&key, 10).len(), 3);
        let closes = buf.get_closes(&key, 10);
        assert_eq!(closes, vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn in_progress_replacement() {
        let buf = CandleBuffer::new(10);
        let key = make_key("ETHUSDT", "5m");
        buf.update(key.clone(), sample_candle(0, 50.0, false));
        buf.update(key.clone(), sample_candle(0, 51.0, false));
        buf.update(key.clone(), sample_candle(0, 52.0, true));
        assert_eq!(buf.last_close(&key), Some(52.0));
    }

    #[test]
    fn series_state_transitions() {
        let buf = CandleBuffer::new(300);
        let key = make_key("BTCUSDT", "1m");
        assert_eq!(buf.series_state(&key, 30), SeriesState::Empty);
        for i in 0..10 {
            buf.update(key.clone(), sample_candle(i * 60_000, 100.0, true));
        }
        assert_eq!(buf.series_state(&key, 30), SeriesState::Warming);
        for i in 10..40 {
            buf.update(key.clone(), sample_candle(i * 60_000, 100.0, true));
        }
        assert_eq!(buf.series_state(&key, 30), SeriesState::Ready);
    }

    #[test]
    fn five_identical_1m_bars_aggregate_to_one_5m_bucket() {
        let buf = CandleBuffer::new(300);
        for i in 0..5 {
            let sealed = sample_candle(i * 60_000, 100.0 + i as f64, true);
            buf.aggregate_sealed_1m("BTCUSDT", &sealed);
        }
        let key_5m = CandleKey::new("BTCUSDT", Timeframe::M5);
        let bucket = buf.get_closed(&key_5m, 10);
        // Bucket is still in-progress (no newer bucket sealed it), so check
        // via raw count instead.
        assert_eq!(buf.count(&key_5m), 1);
    }

    #[test]
    fn max_bars_per_series_constant_is_300() {
        assert_eq!(MAX_BARS_PER_SERIES, 300);
    }
}
