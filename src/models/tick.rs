//! Tick stream models.

use serde::Deserialize;

use super::SubscriptionInfo;
use crate::chart::ChartPoint;

/// A `tick` message as sent on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct TickResponse {
    pub tick: Tick,
    #[serde(default)]
    pub subscription: Option<SubscriptionInfo>,
}

/// A single real-time price update.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tick {
    /// Subscription identifier the server assigned to this stream.
    #[serde(default)]
    pub id: Option<String>,
    /// Epoch seconds; may carry a fractional part.
    pub epoch: f64,
    pub quote: f64,
    #[serde(default)]
    pub symbol: Option<String>,
}

impl Tick {
    /// Returns the point this tick contributes to a line chart.
    ///
    /// The time axis uses whole seconds, truncated toward negative infinity.
    pub fn chart_point(&self) -> ChartPoint {
        ChartPoint::from_epoch(self.epoch, self.quote)
    }
}

impl TickResponse {
    /// Flattens the wire message, filling the tick id from the
    /// subscription block when the payload omits it.
    pub fn into_tick(self) -> Tick {
        let mut tick = self.tick;
        if tick.id.is_none() {
            tick.id = self.subscription.map(|s| s.id);
        }
        tick
    }
}
