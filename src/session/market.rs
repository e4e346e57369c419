//! Latest market values the UI renders from.

use crate::chart::{self, ChartSeries, format_price};
use crate::models::account::Account;
use crate::models::balance::Balance;
use crate::models::{ApiError, InboundMessage};

/// Read-only view of what the session has accepted so far.
#[derive(Debug, Default)]
pub struct MarketView {
    /// Quote of the most recent accepted tick, as received.
    pub price: Option<f64>,
    pub account: Option<Account>,
    pub balance: Option<Balance>,
    pub last_error: Option<ApiError>,
    pub chart: ChartSeries,
}

impl MarketView {
    #[must_use]
    pub fn with_chart_capacity(capacity: usize) -> Self {
        Self {
            chart: ChartSeries::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Current price formatted for a label.
    pub fn price_label(&self) -> Option<String> {
        self.price.map(format_price)
    }

    pub(crate) fn apply(&mut self, message: &InboundMessage) {
        match message {
            InboundMessage::Tick(tick) => self.price = Some(tick.quote),
            InboundMessage::Authorize(account) => self.account = Some(account.clone()),
            InboundMessage::Balance(balance) => self.balance = Some(balance.clone()),
            InboundMessage::Error(error) => self.last_error = Some(error.clone()),
            InboundMessage::CandleBatch(_) | InboundMessage::Forget { .. } => {}
        }
        chart::apply_message(&mut self.chart, message);
    }

    /// Forgets instrument-specific values after an instrument switch.
    pub(crate) fn reset_instrument(&mut self) {
        self.price = None;
        chart::ChartSink::clear(&mut self.chart);
    }
}
