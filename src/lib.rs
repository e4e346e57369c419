//! Deriv WebSocket market data client library.
//!
//! Provides a resilient [`Session`](session::Session) that keeps one tick
//! (and optionally one candle) subscription alive for the selected
//! instrument, typed models for the Deriv API frames it exchanges, and an
//! async driver that runs the session over a real WebSocket.

pub mod chart;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod oauth;
pub mod session;
pub mod tls;
pub mod websocket;

pub use error::{DeckError, Result};
