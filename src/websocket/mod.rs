//! Async WebSocket transport for the Deriv API.
//!
//! This module is organized by concern:
//! - [`handler`] - Inbound frame parsing
//! - [`connection`] - The task that drives a [`Session`](crate::session::Session)
//!   over a real transport

mod connection;
mod handler;

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tracing::{debug, info};
use tungstenite::Message;

use crate::Result;
use crate::models::Request;

pub use connection::{ConnectionManager, SessionCommand, SessionHandle};
pub use handler::parse_frame;

/// Write half of a Deriv WebSocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a Deriv WebSocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Opens transports for the connection manager.
///
/// The production implementation is [`TlsConnector`]; tests substitute an
/// in-memory pair of channels.
pub trait Connector: Send + Sync + 'static {
    type Writer: Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static;
    type Reader: Stream<Item = std::result::Result<Message, tungstenite::Error>>
        + Unpin
        + Send
        + 'static;

    /// Connects to `url` and returns the split transport.
    fn connect(&self, url: &str)
    -> impl Future<Output = Result<(Self::Writer, Self::Reader)>> + Send;
}

/// Connects over TLS using a prepared rustls configuration.
#[derive(Clone)]
pub struct TlsConnector {
    tls_config: Arc<rustls::ClientConfig>,
}

impl TlsConnector {
    #[must_use]
    pub fn new(tls_config: Arc<rustls::ClientConfig>) -> Self {
        Self { tls_config }
    }
}

impl Connector for TlsConnector {
    type Writer = WsWriter;
    type Reader = WsReader;

    async fn connect(&self, url: &str) -> Result<(WsWriter, WsReader)> {
        connect(url, self.tls_config.clone()).await
    }
}

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`DeckError`](crate::DeckError) if the connection or TLS handshake fails.
pub async fn connect(
    url: &str,
    tls_config: Arc<rustls::ClientConfig>,
) -> Result<(WsWriter, WsReader)> {
    let connector = tokio_tungstenite::Connector::Rustls(tls_config);
    let (ws_stream, _) = connect_async_tls_with_config(url, None, false, Some(connector)).await?;
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// Serializes `request` and writes it as one text frame.
///
/// # Errors
///
/// Returns a [`DeckError`](crate::DeckError) if serialization or sending fails.
pub async fn send_request<W>(write: &mut W, request: &Request) -> Result<()>
where
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let json = serde_json::to_string(request)?;
    write.send(Message::Text(json.into())).await?;
    debug!(request = request.name(), "Sent request");

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::models::ForgetRequest;

    #[test]
    fn send_request_writes_one_text_frame() {
        let mut frames: Vec<Message> = Vec::new();
        let mut sink = (&mut frames).sink_map_err(|never: Infallible| -> tungstenite::Error {
            match never {}
        });

        let request = Request::Forget(ForgetRequest::new("abc"));
        tokio_test::block_on(send_request(&mut sink, &request)).unwrap();

        assert_eq!(frames, vec![Message::Text(r#"{"forget":"abc"}"#.into())]);
    }
}
