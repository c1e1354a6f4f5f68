// =============================================================================
// Indicator Bank — pure numerical functions over candle series
// =============================================================================
//
// Every indicator here takes a candle/close slice and returns a 1:1-aligned
// series (or a single "latest" value). Warm-up prefixes are represented as
// `None`, never `0.0`. No indicator panics or returns an error -- the only
// failure mode is insufficient data, which shows up as absent output.
// =============================================================================

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod cci;
pub mod cmf;
pub mod ema;
pub mod hma;
pub mod ichimoku;
pub mod keltner;
pub mod macd;
pub mod mfi;
pub mod obv;
pub mod parabolic_sar;
pub mod pivot_points;
pub mod roc;
pub mod rolling_hilo;
pub mod rsi;
pub mod sma;
pub mod stoch_rsi;
pub mod supertrend;
pub mod tema;
pub mod trix;
pub mod volume_profile;
pub mod vwap;
