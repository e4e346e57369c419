//! WebSocket connection lifecycle management.
//!
//! [`ConnectionManager`] runs a [`Session`] on a tokio task: it executes
//! the session's actions against a real transport, feeds inbound frames and
//! transport failures back into it, fires reconnect timers, and forwards
//! every [`SessionEvent`] to an unbounded channel for the UI.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::error::Elapsed;
use tracing::{debug, error, info, warn};
use tungstenite::Message as WsMessage;

use super::{Connector, send_request};
use crate::Result;
use crate::error::DeckError;
use crate::models::Request;
use crate::models::buy::TradeOrder;
use crate::session::{Action, ConnectionState, Session, SessionEvent};

/// Upper bound on a single connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Intent sent from the UI to the connection manager.
#[derive(Debug)]
pub enum SessionCommand {
    Open {
        symbol: String,
        granularity: Option<u32>,
    },
    SwitchInstrument {
        symbol: String,
        granularity: Option<u32>,
    },
    PlaceTrade(TradeOrder),
    Close,
}

/// Cloneable, one-way handle into a running [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    has_token: bool,
}

impl SessionHandle {
    /// Requests a (re)connection for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`DeckError::NotConnected`] if the manager has stopped.
    pub fn open(&self, symbol: &str, granularity: Option<u32>) -> Result<()> {
        self.command(SessionCommand::Open {
            symbol: symbol.to_string(),
            granularity,
        })
    }

    /// Requests an instrument switch.
    ///
    /// # Errors
    ///
    /// Returns [`DeckError::NotConnected`] if the manager has stopped.
    pub fn switch_instrument(&self, symbol: &str, granularity: Option<u32>) -> Result<()> {
        self.command(SessionCommand::SwitchInstrument {
            symbol: symbol.to_string(),
            granularity,
        })
    }

    /// Requests a contract purchase.
    ///
    /// # Errors
    ///
    /// Returns [`DeckError::UserInput`] immediately, without queueing
    /// anything, when the session has no login token.
    pub fn place_trade(&self, order: TradeOrder) -> Result<()> {
        if !self.has_token {
            return Err(DeckError::UserInput(
                "placing a trade requires a login token".into(),
            ));
        }
        self.command(SessionCommand::PlaceTrade(order))
    }

    /// Requests an explicit close; no reconnect follows.
    ///
    /// # Errors
    ///
    /// Returns [`DeckError::NotConnected`] if the manager has stopped.
    pub fn close(&self) -> Result<()> {
        self.command(SessionCommand::Close)
    }

    fn command(&self, cmd: SessionCommand) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| DeckError::NotConnected)
    }
}

/// A live transport tagged with the session generation it belongs to.
struct Transport<C: Connector> {
    generation: u64,
    writer: C::Writer,
    reader: C::Reader,
}

type ConnectOutcome<C> = std::result::Result<
    Result<(<C as Connector>::Writer, <C as Connector>::Reader)>,
    Elapsed,
>;

/// An in-flight connection attempt.
type Attempt<C> = Pin<Box<dyn Future<Output = ConnectOutcome<C>> + Send>>;

/// Drives a [`Session`] over transports opened by a [`Connector`].
pub struct ConnectionManager<C: Connector> {
    session: Session,
    connector: Arc<C>,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    transport: Option<Transport<C>>,
    /// Attempt in progress and the generation it was started for.
    connecting: Option<(u64, Attempt<C>)>,
    /// Pending reconnect ticket and its deadline.
    reconnect: Option<(u64, Instant)>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Wraps `session`, returning the manager, a command handle, and the
    /// event stream.
    pub fn new(
        mut session: Session,
        connector: C,
    ) -> (
        Self,
        SessionHandle,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        session.on_event(move |event| {
            // The receiver may be gone during shutdown.
            let _ = event_tx.send(event.clone());
        });

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            cmd_tx,
            has_token: session.has_token(),
        };

        let manager = Self {
            session,
            connector: Arc::new(connector),
            cmd_rx,
            transport: None,
            connecting: None,
            reconnect: None,
        };
        (manager, handle, event_rx)
    }

    /// Runs the manager on a new tokio task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until every [`SessionHandle`] is dropped.
    pub async fn run(mut self) {
        loop {
            self.execute_actions().await;

            tokio::select! {
                (generation, frame) = next_frame(&mut self.transport) => {
                    self.handle_frame(generation, frame);
                }

                (generation, outcome) = next_attempt::<C>(&mut self.connecting) => {
                    self.connecting = None;
                    self.connected(generation, outcome).await;
                }

                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            info!("Command channel closed, shutting down session");
                            self.session.close();
                            self.execute_actions().await;
                            return;
                        }
                    }
                }

                ticket = reconnect_timer(self.reconnect) => {
                    self.reconnect = None;
                    self.session.on_reconnect_due(ticket);
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Open {
                symbol,
                granularity,
            } => self.session.open(&symbol, granularity),
            SessionCommand::SwitchInstrument {
                symbol,
                granularity,
            } => self.session.switch_instrument(&symbol, granularity),
            SessionCommand::PlaceTrade(order) => {
                if let Err(e) = self.session.place_trade(order) {
                    warn!(error = %e, "Trade rejected");
                }
            }
            SessionCommand::Close => self.session.close(),
        }
    }

    fn handle_frame(
        &mut self,
        generation: u64,
        frame: Option<std::result::Result<WsMessage, tungstenite::Error>>,
    ) {
        match frame {
            Some(Ok(WsMessage::Text(text))) => self.session.on_frame(generation, text.as_str()),
            Some(Ok(WsMessage::Close(frame))) => {
                info!(?frame, "Server closed the connection");
                self.transport_lost(generation);
            }
            Some(Ok(_)) => {} // Binary/Ping/Pong frames
            Some(Err(e)) => {
                warn!("WebSocket error: {e}");
                self.transport_lost(generation);
            }
            None => {
                warn!("WebSocket stream ended");
                self.transport_lost(generation);
            }
        }
    }

    fn transport_lost(&mut self, generation: u64) {
        if self
            .transport
            .as_ref()
            .is_some_and(|t| t.generation == generation)
        {
            self.transport = None;
        }
        self.session.on_transport_closed(generation);
    }

    /// Executes queued session actions until none remain.
    async fn execute_actions(&mut self) {
        while let Some(action) = self.session.poll_action() {
            match action {
                Action::Connect { generation, url } => self.connect(generation, url),
                Action::Send(request) => self.send(request).await,
                Action::Disconnect { generation } => self.disconnect(generation).await,
                Action::ScheduleReconnect { ticket, after } => {
                    self.reconnect = Some((ticket, Instant::now() + after));
                }
                Action::CancelReconnect => self.reconnect = None,
            }
        }
    }

    /// Starts an attempt without awaiting it. The select loop picks up the
    /// outcome through [`next_attempt`].
    fn connect(&mut self, generation: u64, url: String) {
        info!(generation, "Connecting to WebSocket");

        let connector = Arc::clone(&self.connector);
        let attempt: Attempt<C> = Box::pin(async move {
            tokio::time::timeout(CONNECT_TIMEOUT, connector.connect(&url)).await
        });
        if let Some((stale, _)) = self.connecting.replace((generation, attempt)) {
            debug!(generation = stale, "Abandoned connection attempt");
        }
    }

    async fn connected(&mut self, generation: u64, outcome: ConnectOutcome<C>) {
        match outcome {
            Ok(Ok((mut writer, reader))) => {
                if generation != self.session.generation()
                    || self.session.state() != ConnectionState::Connecting
                {
                    debug!(generation, "Closing transport nobody is waiting for");
                    if let Err(e) = writer.close().await {
                        debug!("Error while closing transport: {e}");
                    }
                    return;
                }
                self.transport = Some(Transport {
                    generation,
                    writer,
                    reader,
                });
                self.session.on_transport_open(generation);
            }
            Ok(Err(e)) => {
                error!("Connection failed: {e}");
                self.session.on_transport_closed(generation);
            }
            Err(_) => {
                error!(
                    timeout_secs = CONNECT_TIMEOUT.as_secs(),
                    "Connection attempt timed out"
                );
                self.session.on_transport_closed(generation);
            }
        }
    }

    async fn send(&mut self, request: Request) {
        let Some(transport) = self.transport.as_mut() else {
            debug!(
                request = request.name(),
                "No transport, dropping request"
            );
            return;
        };

        if let Err(e) = send_request(&mut transport.writer, &request).await {
            warn!(request = request.name(), "Send failed: {e}");
            let generation = transport.generation;
            self.transport_lost(generation);
        }
    }

    async fn disconnect(&mut self, generation: u64) {
        if self
            .connecting
            .as_ref()
            .is_some_and(|(pending, _)| *pending == generation)
        {
            self.connecting = None;
            info!(generation, "Connection attempt cancelled");
        }

        let Some(mut transport) = self.transport.take() else {
            return;
        };
        if transport.generation != generation {
            self.transport = Some(transport);
            return;
        }

        if let Err(e) = transport.writer.close().await {
            debug!("Error while closing transport: {e}");
        }
        info!(generation, "Transport closed");
    }
}

/// Waits for the next frame of the current transport, or forever if there
/// is none.
async fn next_frame<C: Connector>(
    transport: &mut Option<Transport<C>>,
) -> (
    u64,
    Option<std::result::Result<WsMessage, tungstenite::Error>>,
) {
    match transport {
        Some(t) => (t.generation, t.reader.next().await),
        None => std::future::pending().await,
    }
}

/// Waits for the pending connection attempt, or forever if there is none.
async fn next_attempt<C: Connector>(
    connecting: &mut Option<(u64, Attempt<C>)>,
) -> (u64, ConnectOutcome<C>) {
    match connecting {
        Some((generation, attempt)) => (*generation, attempt.await),
        None => std::future::pending().await,
    }
}

/// Completes with the ticket once its deadline passes, or never.
async fn reconnect_timer(pending: Option<(u64, Instant)>) -> u64 {
    match pending {
        Some((ticket, deadline)) => {
            tokio::time::sleep_until(deadline).await;
            ticket
        }
        None => std::future::pending().await,
    }
}
