//! Incoming WebSocket frame parsing.

use serde_json::Value;
use tracing::debug;

use crate::Result;
use crate::error::DeckError;
use crate::models::account::AuthorizeResponse;
use crate::models::balance::BalanceResponse;
use crate::models::candle::{CandlesResponse, OhlcResponse};
use crate::models::tick::TickResponse;
use crate::models::{Envelope, ErrorResponse, ForgetResponse, InboundMessage};

/// Parses one text frame into an [`Envelope`].
///
/// Returns `Ok(None)` for well-formed frames whose `msg_type` is not one
/// the session consumes.
///
/// # Errors
///
/// Returns [`DeckError::MalformedMessage`] if the frame is not JSON, or
/// [`DeckError::Json`] if a recognised message does not match its schema.
pub fn parse_frame(text: &str) -> Result<Option<Envelope>> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DeckError::MalformedMessage(e.to_string()))?;

    let req_id = value.get("req_id").and_then(Value::as_u64);

    // An error object wins over whatever msg_type the server echoed.
    if value.get("error").is_some_and(Value::is_object) {
        let response: ErrorResponse = serde_json::from_value(value)?;
        debug!(
            code = ?response.error.code,
            msg_type = ?response.msg_type,
            "Received error payload"
        );
        return Ok(Some(Envelope {
            req_id,
            message: InboundMessage::Error(response.error),
        }));
    }

    let msg_type = value
        .get("msg_type")
        .and_then(Value::as_str)
        .map(String::from);

    let message = match msg_type.as_deref() {
        Some("authorize") => {
            let response: AuthorizeResponse = serde_json::from_value(value)?;
            InboundMessage::Authorize(response.into())
        }
        Some("balance") => {
            let response: BalanceResponse = serde_json::from_value(value)?;
            InboundMessage::Balance(response.into())
        }
        Some("tick") => {
            let response: TickResponse = serde_json::from_value(value)?;
            InboundMessage::Tick(response.into_tick())
        }
        Some("candles") => {
            let response: CandlesResponse = serde_json::from_value(value)?;
            InboundMessage::CandleBatch(response.into())
        }
        Some("ohlc") => {
            let response: OhlcResponse = serde_json::from_value(value)?;
            InboundMessage::CandleBatch(response.into())
        }
        Some("forget") => {
            let response: ForgetResponse = serde_json::from_value(value)?;
            InboundMessage::Forget {
                succeeded: response.forget == 1,
            }
        }
        Some(other) => {
            debug!(msg_type = other, "Ignoring unhandled message type");
            return Ok(None);
        }
        None => {
            debug!("Ignoring message without msg_type");
            return Ok(None);
        }
    };

    Ok(Some(Envelope { req_id, message }))
}
