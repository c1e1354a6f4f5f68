pub mod candle_buffer;
pub mod orderbook;
pub mod trade_stream;

pub use candle_buffer::{Candle, CandleBuffer, CandleKey, SeriesState, MAX_BARS_PER_SERIES};
pub use orderbook::{Level, OrderBookManager};
pub use trade_stream::{TradeFlow, TradeStreamProcessor, TRADE_FLOW_WINDOW_MS};
