//! Shared test utilities: session builders, Deriv frame fixtures, and an
//! in-memory transport for driving the connection manager.

#![allow(dead_code)]

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use derivdeck::models::Request;
use derivdeck::session::{Action, Session, SessionConfig};
use derivdeck::websocket::Connector;
use derivdeck::{DeckError, Result};
use futures_util::{Sink, Stream};
use serde_json::json;
use tokio::sync::mpsc;
use tungstenite::Message;

/// Endpoint used by every offline test; never dialled.
pub const TEST_ENDPOINT: &str = "wss://ws.derivws.test/websockets/v3";

/// Deriv WebSocket public endpoint, for live tests.
pub const DERIV_WS_URL: &str = "wss://ws.derivws.com/websockets/v3";

/// Public app id usable without registration.
pub const DERIV_APP_ID: &str = "1089";

/// Builds a disconnected session, optionally holding a token.
pub fn session(token: Option<&str>) -> Session {
    Session::new(SessionConfig::new(TEST_ENDPOINT, DERIV_APP_ID).with_token(token))
        .expect("test endpoint is valid")
}

/// Opens `session` for `symbol` and completes the handshake of the new
/// transport, returning the actions queued along the way.
pub fn open(session: &mut Session, symbol: &str, granularity: Option<u32>) -> Vec<Action> {
    session.open(symbol, granularity);
    session.on_transport_open(session.generation());
    session.drain_actions()
}

/// Extracts the requests from a list of actions.
pub fn requests(actions: &[Action]) -> Vec<&Request> {
    actions
        .iter()
        .filter_map(|action| match action {
            Action::Send(request) => Some(request),
            _ => None,
        })
        .collect()
}

/// A streamed `tick` frame.
pub fn tick_frame(symbol: &str, id: &str, req_id: Option<u64>, epoch: f64, quote: f64) -> String {
    let mut frame = json!({
        "msg_type": "tick",
        "echo_req": { "ticks": symbol, "subscribe": 1 },
        "tick": {
            "ask": quote + 0.1,
            "bid": quote - 0.1,
            "epoch": epoch,
            "id": id,
            "pip_size": 2,
            "quote": quote,
            "symbol": symbol
        },
        "subscription": { "id": id }
    });
    if let Some(req_id) = req_id {
        frame["req_id"] = json!(req_id);
    }
    frame.to_string()
}

/// A `candles` history frame with one bar per `(epoch, close)` pair.
pub fn candles_frame(id: &str, req_id: u64, bars: &[(i64, f64)]) -> String {
    let candles: Vec<_> = bars
        .iter()
        .map(|(epoch, close)| {
            json!({
                "epoch": epoch,
                "open": close - 1.0,
                "high": close + 2.0,
                "low": close - 2.0,
                "close": close
            })
        })
        .collect();
    json!({
        "msg_type": "candles",
        "candles": candles,
        "req_id": req_id,
        "subscription": { "id": id }
    })
    .to_string()
}

/// A streamed `ohlc` update; Deriv quotes these prices as strings.
pub fn ohlc_frame(symbol: &str, id: &str, req_id: u64, open_time: i64, close: f64) -> String {
    json!({
        "msg_type": "ohlc",
        "ohlc": {
            "close": format!("{close:.2}"),
            "epoch": open_time + 3,
            "granularity": 60,
            "high": format!("{:.2}", close + 2.0),
            "id": id,
            "low": format!("{:.2}", close - 2.0),
            "open": format!("{:.2}", close - 1.0),
            "open_time": open_time,
            "symbol": symbol
        },
        "req_id": req_id,
        "subscription": { "id": id }
    })
    .to_string()
}

pub fn authorize_frame(login_id: &str) -> String {
    json!({
        "msg_type": "authorize",
        "authorize": {
            "loginid": login_id,
            "currency": "USD",
            "balance": 10000,
            "fullname": "Test User"
        }
    })
    .to_string()
}

pub fn error_frame(msg_type: &str, code: &str, message: &str) -> String {
    json!({
        "msg_type": msg_type,
        "error": { "code": code, "message": message }
    })
    .to_string()
}

/// Server side of one in-memory transport.
pub struct ServerEnd {
    /// Frames the client wrote.
    pub sent: mpsc::UnboundedReceiver<Message>,
    /// Frames to deliver to the client; dropping it ends the client stream.
    pub inbound: mpsc::UnboundedSender<std::result::Result<Message, tungstenite::Error>>,
}

impl ServerEnd {
    pub fn push_text(&self, text: String) {
        self.inbound
            .send(Ok(Message::Text(text.into())))
            .expect("client reader dropped");
    }

    /// Waits for the next client frame and parses it as JSON.
    pub async fn next_request(&mut self) -> serde_json::Value {
        match self.sent.recv().await {
            Some(Message::Text(text)) => serde_json::from_str(text.as_str()).expect("client sent JSON"),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

/// Write half of an in-memory transport.
pub struct ChannelSink(mpsc::UnboundedSender<Message>);

impl Sink<Message> for ChannelSink {
    type Error = tungstenite::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> std::result::Result<(), Self::Error> {
        self.0
            .send(item)
            .map_err(|_| tungstenite::Error::ConnectionClosed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Read half of an in-memory transport.
pub struct ChannelStream(mpsc::UnboundedReceiver<std::result::Result<Message, tungstenite::Error>>);

impl Stream for ChannelStream {
    type Item = std::result::Result<Message, tungstenite::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().0.poll_recv(cx)
    }
}

/// Connector handing each new transport's server end to the test.
pub struct ChannelConnector {
    servers: mpsc::UnboundedSender<ServerEnd>,
    connects: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
    delay: Duration,
}

impl ChannelConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            servers,
            connects: Arc::new(AtomicUsize::new(0)),
            refuse: Arc::new(AtomicBool::new(false)),
            delay: Duration::ZERO,
        };
        (connector, rx)
    }

    /// Counter of connection attempts, shared with the connector.
    pub fn connects(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.connects)
    }

    /// Makes every handshake take `delay`.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// While set, every connection attempt fails.
    pub fn refuse(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.refuse)
    }
}

impl Connector for ChannelConnector {
    type Writer = ChannelSink;
    type Reader = ChannelStream;

    async fn connect(&self, _url: &str) -> Result<(ChannelSink, ChannelStream)> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(DeckError::WebSocket(tungstenite::Error::ConnectionClosed));
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        self.servers
            .send(ServerEnd {
                sent: sent_rx,
                inbound: inbound_tx,
            })
            .map_err(|_| DeckError::NotConnected)?;

        Ok((ChannelSink(sent_tx), ChannelStream(inbound_rx)))
    }
}
