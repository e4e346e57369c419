//! Chart sink abstraction.
//!
//! The charting widget is an opaque consumer of points and bars. The session
//! pushes into a [`ChartSink`]; [`ChartSeries`] is the bounded in-memory
//! implementation the UI reads from.

use std::collections::VecDeque;

use crate::models::InboundMessage;
use crate::models::candle::CandleBar;

/// Default number of points and bars kept per series.
pub const DEFAULT_CAPACITY: usize = 500;

/// A single line-chart point keyed by whole epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    pub time: i64,
    pub value: f64,
}

impl ChartPoint {
    /// Builds a point from a possibly fractional epoch.
    ///
    /// Sub-second epochs are invalid on the time axis, so the fraction is
    /// floored away. The value is kept exactly as received.
    pub fn from_epoch(epoch: f64, value: f64) -> Self {
        Self {
            time: epoch.floor() as i64,
            value,
        }
    }
}

/// Consumer of chart data.
pub trait ChartSink {
    /// Appends one live price point.
    fn push_tick(&mut self, point: ChartPoint);

    /// Replaces the candle series with a history batch.
    fn set_candles(&mut self, candles: &[CandleBar]);

    /// Updates the bar sharing `candle.epoch`, or appends it.
    fn update_candle(&mut self, candle: CandleBar);

    /// Drops all data, e.g. after switching instrument.
    fn clear(&mut self);
}

/// Bounded in-memory line and candle series.
#[derive(Debug, Clone)]
pub struct ChartSeries {
    capacity: usize,
    points: VecDeque<ChartPoint>,
    candles: VecDeque<CandleBar>,
}

impl Default for ChartSeries {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ChartSeries {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            points: VecDeque::new(),
            candles: VecDeque::new(),
        }
    }

    pub fn points(&self) -> impl Iterator<Item = &ChartPoint> {
        self.points.iter()
    }

    pub fn candles(&self) -> impl Iterator<Item = &CandleBar> {
        self.candles.iter()
    }

    pub fn last_point(&self) -> Option<&ChartPoint> {
        self.points.back()
    }

    pub fn last_candle(&self) -> Option<&CandleBar> {
        self.candles.back()
    }

    fn trim(&mut self) {
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
        while self.candles.len() > self.capacity {
            self.candles.pop_front();
        }
    }
}

impl ChartSink for ChartSeries {
    fn push_tick(&mut self, point: ChartPoint) {
        // Two ticks inside the same second share a slot; the later one wins.
        match self.points.back_mut() {
            Some(last) if last.time == point.time => *last = point,
            _ => self.points.push_back(point),
        }
        self.trim();
    }

    fn set_candles(&mut self, candles: &[CandleBar]) {
        self.candles = candles.iter().copied().collect();
        self.trim();
    }

    fn update_candle(&mut self, candle: CandleBar) {
        match self.candles.back_mut() {
            Some(last) if last.epoch == candle.epoch => *last = candle,
            Some(last) if last.epoch > candle.epoch => {}
            _ => self.candles.push_back(candle),
        }
        self.trim();
    }

    fn clear(&mut self) {
        self.points.clear();
        self.candles.clear();
    }
}

/// Feeds the chart-relevant part of an inbound message into `sink`.
pub fn apply_message(sink: &mut impl ChartSink, message: &InboundMessage) {
    match message {
        InboundMessage::Tick(tick) => sink.push_tick(tick.chart_point()),
        InboundMessage::CandleBatch(batch) if batch.is_update => {
            for candle in &batch.candles {
                sink.update_candle(*candle);
            }
        }
        InboundMessage::CandleBatch(batch) => sink.set_candles(&batch.candles),
        _ => {}
    }
}

/// Formats a price for display labels (two decimal places).
///
/// Never feed the result back into a series.
pub fn format_price(value: f64) -> String {
    format!("{value:.2}")
}
