//! Shared models for Deriv WebSocket API messages.
//!
//! Contains outbound request frames, the [`InboundMessage`] tagged union
//! produced by frame parsing, and the subscription bookkeeping types shared
//! by the session and the transport.

pub mod account;
pub mod balance;
pub mod buy;
pub mod candle;
pub mod tick;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use self::account::Account;
use self::balance::Balance;
use self::buy::BuyRequest;
use self::candle::CandleBatch;
use self::tick::Tick;

/// Kinds of market data subscription a session can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Tick,
    /// OHLC candles at a fixed granularity.
    Candle,
}

impl SubscriptionKind {
    /// Returns the wire-format request name for this subscription.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionKind::Tick => "ticks",
            SubscriptionKind::Candle => "candles",
        }
    }
}

/// An `authorize` request carrying the OAuth token.
#[derive(Clone, PartialEq, Serialize)]
pub struct AuthorizeRequest {
    pub authorize: String,
}

impl AuthorizeRequest {
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self {
            authorize: token.to_string(),
        }
    }
}

impl fmt::Debug for AuthorizeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizeRequest")
            .field("authorize", &"<redacted>")
            .finish()
    }
}

/// A `ticks` subscribe request for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicksRequest {
    pub ticks: String,
    pub subscribe: u8,
    pub req_id: u64,
}

impl TicksRequest {
    #[must_use]
    pub fn new(symbol: &str, req_id: u64) -> Self {
        Self {
            ticks: symbol.to_string(),
            subscribe: 1,
            req_id,
        }
    }
}

/// A `candles` subscribe request: a history batch followed by live updates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandlesRequest {
    pub candles: String,
    pub count: u32,
    /// Candle duration in seconds.
    pub granularity: u32,
    pub subscribe: u8,
    pub req_id: u64,
}

impl CandlesRequest {
    #[must_use]
    pub fn new(symbol: &str, count: u32, granularity: u32, req_id: u64) -> Self {
        Self {
            candles: symbol.to_string(),
            count,
            granularity,
            subscribe: 1,
            req_id,
        }
    }
}

/// A `forget` request cancelling a server-side subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForgetRequest {
    pub forget: String,
}

impl ForgetRequest {
    #[must_use]
    pub fn new(subscription_id: &str) -> Self {
        Self {
            forget: subscription_id.to_string(),
        }
    }
}

/// A `balance` subscribe request (authenticated).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceRequest {
    pub balance: u8,
    pub subscribe: u8,
    pub req_id: u64,
}

impl BalanceRequest {
    #[must_use]
    pub fn new(req_id: u64) -> Self {
        Self {
            balance: 1,
            subscribe: 1,
            req_id,
        }
    }
}

/// Any frame the session sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Request {
    Authorize(AuthorizeRequest),
    Ticks(TicksRequest),
    Candles(CandlesRequest),
    Forget(ForgetRequest),
    Balance(BalanceRequest),
    Buy(BuyRequest),
}

impl Request {
    /// Returns the wire request name, used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Authorize(_) => "authorize",
            Request::Ticks(_) => "ticks",
            Request::Candles(_) => "candles",
            Request::Forget(_) => "forget",
            Request::Balance(_) => "balance",
            Request::Buy(_) => "buy",
        }
    }
}

/// Server-assigned subscription handle echoed on streamed messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionInfo {
    pub id: String,
}

/// Error object carried by a rejected request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

/// A frame whose payload contains a top-level `error` object.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ApiError,
    #[serde(default)]
    pub msg_type: Option<String>,
}

/// Server acknowledgement of a `forget` request.
#[derive(Debug, Clone, Deserialize)]
pub struct ForgetResponse {
    pub forget: u8,
}

/// A parsed inbound message; exactly one per recognised frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Authorize(Account),
    Balance(Balance),
    Tick(Tick),
    CandleBatch(CandleBatch),
    /// The server rejected a request.
    Error(ApiError),
    /// A `forget` was processed; `succeeded` is false if nothing matched.
    Forget { succeeded: bool },
}

impl InboundMessage {
    /// Returns the wire `msg_type` this variant was parsed from.
    pub fn tag(&self) -> &'static str {
        match self {
            InboundMessage::Authorize(_) => "authorize",
            InboundMessage::Balance(_) => "balance",
            InboundMessage::Tick(_) => "tick",
            InboundMessage::CandleBatch(_) => "candles",
            InboundMessage::Error(_) => "error",
            InboundMessage::Forget { .. } => "forget",
        }
    }
}

/// An inbound message plus the `req_id` the server echoed, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub req_id: Option<u64>,
    pub message: InboundMessage,
}

/// Accepts a JSON number or a numeric string.
///
/// Streaming OHLC payloads quote prices as strings while history batches
/// use numbers.
pub(crate) fn f64_lenient<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
