//! Market data session state machine.
//!
//! [`Session`] owns the connection lifecycle, the tick/candle subscription
//! records, the stale-frame guards, and the reconnect timer bookkeeping for
//! one logical connection. It performs no I/O: every side effect is queued
//! as an [`Action`] that a driver (see
//! [`ConnectionManager`](crate::websocket::ConnectionManager)) executes, and
//! the driver reports transport events back through the `on_transport_*`
//! methods. This keeps every transition deterministic and testable without
//! a socket or a real clock.
//!
//! Two guards keep late frames away from current state:
//! - each transport carries a *generation*; events tagged with an older
//!   generation are dropped;
//! - each subscribe request carries a `req_id` that the server echoes on
//!   every streamed frame; tick/candle frames whose `req_id` does not belong
//!   to the active subscription are dropped.

mod market;
pub mod reconnect;

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use url::Url;
use zeroize::Zeroizing;

pub use market::MarketView;
pub use reconnect::{Backoff, ReconnectPolicy};

use crate::Result;
use crate::chart::DEFAULT_CAPACITY;
use crate::error::DeckError;
use crate::models::buy::TradeOrder;
use crate::models::{
    AuthorizeRequest, BalanceRequest, CandlesRequest, Envelope, ForgetRequest, InboundMessage,
    Request, SubscriptionKind, TicksRequest,
};
use crate::websocket::parse_frame;

/// Default number of candles requested with a candle subscription.
pub const DEFAULT_CANDLE_COUNT: u32 = 100;

/// Lifecycle of the underlying transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(s)
    }
}

/// The instrument the UI selected, with an optional candle granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub symbol: String,
    /// Candle duration in seconds; `None` subscribes to ticks only.
    pub granularity: Option<u32>,
}

impl Instrument {
    #[must_use]
    pub fn new(symbol: &str, granularity: Option<u32>) -> Self {
        Self {
            symbol: symbol.to_string(),
            granularity,
        }
    }
}

/// One tick or candle subscription on the current transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub kind: SubscriptionKind,
    pub symbol: String,
    /// Server-assigned id, known once the first matching frame arrives.
    pub id: Option<String>,
    pub granularity: Option<u32>,
    /// Request id the server echoes on every frame of this stream.
    pub req_id: u64,
}

/// Side effect requested by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open a new transport tagged with `generation`.
    Connect { generation: u64, url: String },
    /// Write one frame on the current transport.
    Send(Request),
    /// Close the transport tagged with `generation`.
    Disconnect { generation: u64 },
    /// Call [`Session::on_reconnect_due`] with `ticket` after `after`.
    ScheduleReconnect { ticket: u64, after: Duration },
    /// Drop any scheduled reconnect.
    CancelReconnect,
}

/// Notification delivered to registered handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Message(InboundMessage),
    StateChanged(ConnectionState),
    /// The transport was lost; attempt `attempt` starts after `after`.
    Reconnecting { attempt: u32, after: Duration },
    /// The reconnect policy gave up.
    ReconnectExhausted { attempts: u32 },
}

type Handler = Box<dyn FnMut(&SessionEvent) + Send>;

/// Static session parameters.
#[derive(Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint without the `app_id` query parameter.
    pub endpoint: String,
    pub app_id: String,
    pub token: Option<Zeroizing<String>>,
    pub candle_count: u32,
    pub reconnect: ReconnectPolicy,
    pub chart_capacity: usize,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("endpoint", &self.endpoint)
            .field("app_id", &self.app_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("candle_count", &self.candle_count)
            .field("reconnect", &self.reconnect)
            .field("chart_capacity", &self.chart_capacity)
            .finish()
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new(endpoint: &str, app_id: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            app_id: app_id.to_string(),
            token: None,
            candle_count: DEFAULT_CANDLE_COUNT,
            reconnect: ReconnectPolicy::default(),
            chart_capacity: DEFAULT_CAPACITY,
        }
    }

    /// Sets the OAuth token; an empty string counts as no token.
    #[must_use]
    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = token
            .filter(|t| !t.is_empty())
            .map(|t| Zeroizing::new(t.to_string()));
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    #[must_use]
    pub fn with_candle_count(mut self, count: u32) -> Self {
        self.candle_count = count;
        self
    }

    /// Builds the endpoint URL with the `app_id` query parameter.
    ///
    /// # Errors
    ///
    /// Returns [`DeckError::Url`] if the endpoint does not parse, or
    /// [`DeckError::Config`] if it is not a `ws`/`wss` URL.
    pub fn connection_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(DeckError::Config(format!(
                "websocket endpoint must use ws:// or wss://, got {}",
                url.scheme()
            )));
        }
        url.query_pairs_mut().append_pair("app_id", &self.app_id);
        Ok(url)
    }
}

/// A resilient market data session. See the module docs.
pub struct Session {
    url: String,
    token: Option<Zeroizing<String>>,
    candle_count: u32,
    policy: ReconnectPolicy,

    state: ConnectionState,
    generation: u64,
    instrument: Option<Instrument>,
    ticks: Option<Subscription>,
    candles: Option<Subscription>,
    balance_subscribed: bool,
    /// Subscription ids already forgotten on the current transport.
    retired: HashSet<String>,
    /// Request ids of tick/candle subscriptions cancelled on the current
    /// transport.
    retired_req_ids: HashSet<u64>,
    next_req_id: u64,

    reconnect_attempts: u32,
    pending_reconnect: Option<u64>,
    next_ticket: u64,
    user_closed: bool,

    market: MarketView,
    actions: VecDeque<Action>,
    handlers: Vec<Handler>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.url)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("instrument", &self.instrument)
            .field("ticks", &self.ticks)
            .field("candles", &self.candles)
            .field("pending_reconnect", &self.pending_reconnect)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a disconnected session.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured endpoint is not a valid WebSocket URL.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let url = config.connection_url()?.to_string();

        Ok(Self {
            url,
            token: config.token,
            candle_count: config.candle_count,
            policy: config.reconnect,
            state: ConnectionState::Disconnected,
            generation: 0,
            instrument: None,
            ticks: None,
            candles: None,
            balance_subscribed: false,
            retired: HashSet::new(),
            retired_req_ids: HashSet::new(),
            next_req_id: 1,
            reconnect_attempts: 0,
            pending_reconnect: None,
            next_ticket: 1,
            user_closed: false,
            market: MarketView::with_chart_capacity(config.chart_capacity),
            actions: VecDeque::new(),
            handlers: Vec::new(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn instrument(&self) -> Option<&Instrument> {
        self.instrument.as_ref()
    }

    pub fn subscription(&self, kind: SubscriptionKind) -> Option<&Subscription> {
        match kind {
            SubscriptionKind::Tick => self.ticks.as_ref(),
            SubscriptionKind::Candle => self.candles.as_ref(),
        }
    }

    pub fn market(&self) -> &MarketView {
        &self.market
    }

    /// Identity of the current transport instance.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Registers a handler called once per dispatched inbound message.
    pub fn on_message<F>(&mut self, mut handler: F)
    where
        F: FnMut(&InboundMessage) + Send + 'static,
    {
        self.handlers.push(Box::new(move |event| {
            if let SessionEvent::Message(message) = event {
                handler(message);
            }
        }));
    }

    /// Registers a handler for every session event.
    pub fn on_event<F>(&mut self, handler: F)
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Takes the next queued side effect.
    pub fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    /// Takes every queued side effect.
    pub fn drain_actions(&mut self) -> Vec<Action> {
        self.actions.drain(..).collect()
    }

    /// (Re)establishes a connection for `symbol`.
    ///
    /// A no-op when already connecting or open for the same instrument. A
    /// connection for a different instrument is torn down first.
    pub fn open(&mut self, symbol: &str, granularity: Option<u32>) {
        let target = Instrument::new(symbol, granularity);
        self.user_closed = false;
        self.cancel_reconnect();
        self.reconnect_attempts = 0;

        let live = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        );
        if live && self.instrument.as_ref() == Some(&target) {
            debug!(symbol, "Already connected for instrument");
            return;
        }
        if live {
            self.teardown_transport();
        }
        if self.instrument.as_ref() != Some(&target) {
            self.market.reset_instrument();
        }

        self.instrument = Some(target);
        self.start_transport();
    }

    /// Moves the subscriptions to a new instrument.
    ///
    /// On an open transport every active subscription with a known id is
    /// forgotten before the new subscribe requests are queued. Otherwise the
    /// instrument is recorded and subscribed when the transport opens.
    pub fn switch_instrument(&mut self, symbol: &str, granularity: Option<u32>) {
        let target = Instrument::new(symbol, granularity);
        if self.instrument.as_ref() == Some(&target) {
            debug!(symbol, "Instrument unchanged, skipping switch");
            return;
        }

        info!(
            from = ?self.instrument.as_ref().map(|i| i.symbol.as_str()),
            to = symbol,
            "Switching instrument"
        );

        if self.state == ConnectionState::Open {
            self.forget_subscriptions();
            self.instrument = Some(target);
            self.market.reset_instrument();
            self.subscribe_instrument();
        } else {
            self.ticks = None;
            self.candles = None;
            self.instrument = Some(target);
            self.market.reset_instrument();
        }
    }

    /// Closes the transport and suppresses reconnects until the next
    /// [`open`](Self::open).
    pub fn close(&mut self) {
        self.user_closed = true;
        self.cancel_reconnect();

        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            self.set_state(ConnectionState::Closing);
            self.teardown_transport();
            self.set_state(ConnectionState::Disconnected);
            info!("Session closed");
        }
    }

    /// Queues a `buy` frame for `order`.
    ///
    /// # Errors
    ///
    /// Returns [`DeckError::UserInput`] without queueing anything when no
    /// token is present, and [`DeckError::NotConnected`] when the transport
    /// is not open.
    pub fn place_trade(&mut self, order: TradeOrder) -> Result<()> {
        if self.token.is_none() {
            return Err(DeckError::UserInput(
                "placing a trade requires a login token".into(),
            ));
        }
        if self.state != ConnectionState::Open {
            return Err(DeckError::NotConnected);
        }

        info!(
            symbol = order.symbol,
            contract_type = ?order.contract_type,
            amount = %order.amount,
            "Placing trade"
        );
        self.send(Request::Buy(order.into()));
        Ok(())
    }

    /// The transport tagged with `generation` finished its handshake.
    pub fn on_transport_open(&mut self, generation: u64) {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            debug!(generation, current = self.generation, "Ignoring stale open");
            return;
        }

        self.reconnect_attempts = 0;
        self.set_state(ConnectionState::Open);

        // Authorization is optimistic: subscribe requests go out right behind it.
        if let Some(token) = &self.token {
            let request = AuthorizeRequest::new(token);
            self.send(Request::Authorize(request));
        }
        self.subscribe_instrument();
    }

    /// A text frame arrived on the transport tagged with `generation`.
    pub fn on_frame(&mut self, generation: u64, text: &str) {
        if generation != self.generation || self.state != ConnectionState::Open {
            debug!(generation, current = self.generation, "Dropping stale frame");
            return;
        }

        match parse_frame(text) {
            Ok(Some(envelope)) => self.dispatch(envelope),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Discarding unparsable frame"),
        }
    }

    /// The transport tagged with `generation` closed or failed.
    pub fn on_transport_closed(&mut self, generation: u64) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "Ignoring stale close");
            return;
        }
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            return;
        }

        warn!(generation, "Transport lost");
        self.clear_subscriptions();
        self.set_state(ConnectionState::Disconnected);
        self.schedule_reconnect();
    }

    /// A previously scheduled reconnect timer fired.
    ///
    /// Returns `true` if a new connection attempt was started.
    pub fn on_reconnect_due(&mut self, ticket: u64) -> bool {
        if self.pending_reconnect != Some(ticket) {
            debug!(ticket, "Ignoring cancelled reconnect");
            return false;
        }
        self.pending_reconnect = None;

        if self.user_closed || self.instrument.is_none() {
            return false;
        }

        info!(attempt = self.reconnect_attempts, "Reconnecting");
        self.start_transport();
        true
    }

    fn dispatch(&mut self, envelope: Envelope) {
        let Envelope { req_id, message } = envelope;

        let accepted = match &message {
            InboundMessage::Tick(tick) => self.accept_stream(
                SubscriptionKind::Tick,
                req_id,
                tick.id.as_deref(),
                tick.symbol.as_deref(),
            ),
            InboundMessage::CandleBatch(batch) => self.accept_stream(
                SubscriptionKind::Candle,
                req_id,
                batch.subscription_id.as_deref(),
                batch.symbol.as_deref(),
            ),
            InboundMessage::Authorize(account) => {
                info!(login_id = account.login_id, "Authorized");
                if !self.balance_subscribed {
                    self.balance_subscribed = true;
                    let request = BalanceRequest::new(self.next_req_id());
                    self.send(Request::Balance(request));
                }
                true
            }
            InboundMessage::Error(e) => {
                if let Some(req) = req_id
                    && self.retired_req_ids.contains(&req)
                {
                    debug!(req_id = req, code = ?e.code, "Dropping error for cancelled subscription");
                    false
                } else {
                    warn!(code = ?e.code, error = e.message, ?req_id, "Server rejected request");
                    true
                }
            }
            InboundMessage::Forget { succeeded } => {
                debug!(succeeded, "Forget acknowledged");
                true
            }
            InboundMessage::Balance(_) => true,
        };

        if !accepted {
            return;
        }

        self.market.apply(&message);
        self.emit(&SessionEvent::Message(message));
    }

    /// Decides whether a streamed frame belongs to the active subscription
    /// of `kind`, recording the server-assigned id on first sight.
    fn accept_stream(
        &mut self,
        kind: SubscriptionKind,
        req_id: Option<u64>,
        id: Option<&str>,
        symbol: Option<&str>,
    ) -> bool {
        let matches = match self.subscription(kind) {
            None => {
                debug!(kind = kind.as_str(), "Data for a kind never subscribed");
                false
            }
            Some(sub) => match (req_id, id, sub.id.as_deref()) {
                (Some(req), _, _) => req == sub.req_id,
                (None, Some(id), Some(known)) => id == known,
                (None, Some(id), None) => {
                    !self.retired.contains(id) && symbol.is_none_or(|s| s == sub.symbol)
                }
                (None, None, _) => symbol.is_none_or(|s| s == sub.symbol),
            },
        };

        if !matches {
            debug!(kind = kind.as_str(), ?req_id, ?id, "Dropping frame for inactive subscription");
            // A stream the session no longer wants: cancel it server-side.
            if let Some(id) = id
                && self.retired.insert(id.to_string())
            {
                self.send(Request::Forget(ForgetRequest::new(id)));
            }
            return false;
        }

        let sub = match kind {
            SubscriptionKind::Tick => self.ticks.as_mut(),
            SubscriptionKind::Candle => self.candles.as_mut(),
        };
        if let Some(sub) = sub
            && sub.id.is_none()
            && let Some(id) = id
        {
            debug!(kind = kind.as_str(), id, "Subscription id assigned");
            sub.id = Some(id.to_string());
        }
        true
    }

    fn subscribe_instrument(&mut self) {
        let Some(instrument) = self.instrument.clone() else {
            return;
        };

        let req_id = self.next_req_id();
        self.ticks = Some(Subscription {
            kind: SubscriptionKind::Tick,
            symbol: instrument.symbol.clone(),
            id: None,
            granularity: None,
            req_id,
        });
        self.send(Request::Ticks(TicksRequest::new(&instrument.symbol, req_id)));

        if let Some(granularity) = instrument.granularity {
            let req_id = self.next_req_id();
            self.candles = Some(Subscription {
                kind: SubscriptionKind::Candle,
                symbol: instrument.symbol.clone(),
                id: None,
                granularity: Some(granularity),
                req_id,
            });
            self.send(Request::Candles(CandlesRequest::new(
                &instrument.symbol,
                self.candle_count,
                granularity,
                req_id,
            )));
        } else {
            self.candles = None;
        }

        info!(
            symbol = instrument.symbol,
            granularity = ?instrument.granularity,
            "Subscribed to instrument"
        );
    }

    fn forget_subscriptions(&mut self) {
        for sub in [self.ticks.take(), self.candles.take()].into_iter().flatten() {
            self.retired_req_ids.insert(sub.req_id);
            if let Some(id) = sub.id
                && self.retired.insert(id.clone())
            {
                self.send(Request::Forget(ForgetRequest::new(&id)));
            }
        }
    }

    fn start_transport(&mut self) {
        self.generation += 1;
        self.clear_subscriptions();
        self.set_state(ConnectionState::Connecting);
        info!(generation = self.generation, "Opening transport");
        self.actions.push_back(Action::Connect {
            generation: self.generation,
            url: self.url.clone(),
        });
    }

    fn teardown_transport(&mut self) {
        self.actions.push_back(Action::Disconnect {
            generation: self.generation,
        });
        self.clear_subscriptions();
    }

    /// Subscriptions die with their transport.
    fn clear_subscriptions(&mut self) {
        self.ticks = None;
        self.candles = None;
        self.balance_subscribed = false;
        self.retired.clear();
        self.retired_req_ids.clear();
    }

    fn schedule_reconnect(&mut self) {
        self.reconnect_attempts += 1;
        let attempt = self.reconnect_attempts;

        match self.policy.delay_for(attempt) {
            Some(after) => {
                let ticket = self.next_ticket;
                self.next_ticket += 1;
                self.pending_reconnect = Some(ticket);
                info!(attempt, ?after, "Scheduling reconnect");
                self.actions
                    .push_back(Action::ScheduleReconnect { ticket, after });
                self.emit(&SessionEvent::Reconnecting { attempt, after });
            }
            None => {
                let attempts = attempt - 1;
                error!(attempts, "Giving up after repeated connection failures");
                self.emit(&SessionEvent::ReconnectExhausted { attempts });
            }
        }
    }

    fn cancel_reconnect(&mut self) {
        if self.pending_reconnect.take().is_some() {
            self.actions.push_back(Action::CancelReconnect);
        }
    }

    fn next_req_id(&mut self) -> u64 {
        let id = self.next_req_id;
        self.next_req_id += 1;
        id
    }

    fn send(&mut self, request: Request) {
        debug!(request = request.name(), "Queueing request");
        self.actions.push_back(Action::Send(request));
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "Connection state changed");
        self.state = state;
        self.emit(&SessionEvent::StateChanged(state));
    }

    fn emit(&mut self, event: &SessionEvent) {
        for handler in &mut self.handlers {
            handler(event);
        }
    }
}
