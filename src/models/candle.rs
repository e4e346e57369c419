//! OHLC candlestick models.

use serde::Deserialize;

use super::{SubscriptionInfo, f64_lenient};

/// A `candles` message: the history batch answering a subscribe request.
#[derive(Debug, Clone, Deserialize)]
pub struct CandlesResponse {
    pub candles: Vec<CandleBar>,
    #[serde(default)]
    pub subscription: Option<SubscriptionInfo>,
}

/// An `ohlc` message: one live update to the most recent candle.
#[derive(Debug, Clone, Deserialize)]
pub struct OhlcResponse {
    pub ohlc: OhlcData,
    #[serde(default)]
    pub subscription: Option<SubscriptionInfo>,
}

/// Streaming candle payload. Prices arrive as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct OhlcData {
    #[serde(default)]
    pub id: Option<String>,
    /// Start of the candle's time window.
    pub open_time: i64,
    #[serde(deserialize_with = "f64_lenient")]
    pub open: f64,
    #[serde(deserialize_with = "f64_lenient")]
    pub high: f64,
    #[serde(deserialize_with = "f64_lenient")]
    pub low: f64,
    #[serde(deserialize_with = "f64_lenient")]
    pub close: f64,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub granularity: Option<u32>,
}

/// A single OHLC bar keyed by the epoch second its window opens at.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CandleBar {
    pub epoch: i64,
    #[serde(deserialize_with = "f64_lenient")]
    pub open: f64,
    #[serde(deserialize_with = "f64_lenient")]
    pub high: f64,
    #[serde(deserialize_with = "f64_lenient")]
    pub low: f64,
    #[serde(deserialize_with = "f64_lenient")]
    pub close: f64,
}

/// One or more candles delivered for a candle subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleBatch {
    pub subscription_id: Option<String>,
    pub symbol: Option<String>,
    pub candles: Vec<CandleBar>,
    /// `true` for a live update of the latest bar, `false` for history.
    pub is_update: bool,
}

impl From<CandlesResponse> for CandleBatch {
    fn from(response: CandlesResponse) -> Self {
        Self {
            subscription_id: response.subscription.map(|s| s.id),
            symbol: None,
            candles: response.candles,
            is_update: false,
        }
    }
}

impl From<OhlcResponse> for CandleBatch {
    fn from(response: OhlcResponse) -> Self {
        let ohlc = response.ohlc;
        Self {
            subscription_id: ohlc.id.or(response.subscription.map(|s| s.id)),
            symbol: ohlc.symbol,
            candles: vec![CandleBar {
                epoch: ohlc.open_time,
                open: ohlc.open,
                high: ohlc.high,
                low: ohlc.low,
                close: ohlc.close,
            }],
            is_update: true,
        }
    }
}
