//! Crate-level error types.
//!
//! [`DeckError`] unifies every error source (configuration, WebSocket,
//! JSON, rejected user input) behind a single enum so callers can match on
//! the variant they care about while still using the `?` operator for easy
//! propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DeckError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    /// A configuration value was missing, malformed, or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An inbound frame was not valid JSON or lacked a required field.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The TLS client configuration could not be built.
    #[error("tls error: {0}")]
    Tls(String),

    /// A URL could not be parsed.
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),

    /// A request was rejected before reaching the network.
    #[error("invalid request: {0}")]
    UserInput(String),

    /// A command needed an open transport but none was available.
    #[error("not connected")]
    NotConnected,

    /// The keychain could not be read or written.
    #[error("credential store error: {0}")]
    Credentials(String),
}
