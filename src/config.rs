//! Application configuration loaded from environment variables.
//!
//! All variables are optional:
//! - `DERIV_APP_ID` - registered application id (default `68037`)
//! - `DERIV_WEBSOCKET_URL` - endpoint without query string
//! - `DERIV_TOKEN` - OAuth token; enables authorization and trading
//! - `DERIV_SYMBOL` - instrument to open at startup (default `R_100`)
//! - `DERIV_GRANULARITY` - candle granularity in seconds; unset means ticks only
//! - `DERIV_CANDLE_COUNT` - candles requested per history batch
//! - `DERIV_RECONNECT_DELAY_MS` - delay before reconnecting (default 2000)
//! - `DERIV_RECONNECT_MAX_DELAY_MS` - switches to capped exponential backoff
//! - `DERIV_MAX_RECONNECT_ATTEMPTS` - give up after this many failures
//! - `DERIV_REDIRECT_URI` - OAuth redirect target
//! - `DERIV_CA_FILE` - PEM file with pinned CA certificates
//!
//! Empty values are treated as unset.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::DeckError;
use crate::session::{DEFAULT_CANDLE_COUNT, ReconnectPolicy, SessionConfig};

/// Default public WebSocket endpoint.
const DEFAULT_WEBSOCKET_URL: &str = "wss://ws.derivws.com/websockets/v3";

/// Application id the dashboard is registered under.
const DEFAULT_APP_ID: &str = "68037";

const DEFAULT_SYMBOL: &str = "R_100";

const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/redirect";

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub deriv: DerivConfig,
    pub market: MarketConfig,
    pub reconnect: ReconnectPolicy,
    pub ca_file: Option<PathBuf>,
}

/// Deriv endpoint and credential values.
pub struct DerivConfig {
    pub websocket_url: String,
    pub app_id: String,
    pub token: Option<String>,
    pub redirect_uri: String,
}

impl std::fmt::Debug for DerivConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivConfig")
            .field("websocket_url", &self.websocket_url)
            .field("app_id", &self.app_id)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Instrument selection at startup.
#[derive(Debug)]
pub struct MarketConfig {
    pub symbol: String,
    pub granularity: Option<u32>,
    pub candle_count: u32,
}

impl AppConfig {
    /// Session parameters derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(&self.deriv.websocket_url, &self.deriv.app_id)
            .with_token(self.deriv.token.as_deref())
            .with_candle_count(self.market.candle_count)
            .with_reconnect(self.reconnect)
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`DeckError::Config`](crate::DeckError::Config) if a numeric
/// variable does not parse, or if a reconnect limit is set to zero.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let websocket_url = non_empty_var("DERIV_WEBSOCKET_URL")
        .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());
    let app_id = non_empty_var("DERIV_APP_ID").unwrap_or_else(|| DEFAULT_APP_ID.to_string());
    let token = non_empty_var("DERIV_TOKEN");
    let redirect_uri =
        non_empty_var("DERIV_REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());

    let symbol = non_empty_var("DERIV_SYMBOL").unwrap_or_else(|| DEFAULT_SYMBOL.to_string());
    let granularity = parsed_var::<u32>("DERIV_GRANULARITY")?;
    let candle_count = parsed_var::<u32>("DERIV_CANDLE_COUNT")?.unwrap_or(DEFAULT_CANDLE_COUNT);

    let reconnect = reconnect_policy()?;
    let ca_file = non_empty_var("DERIV_CA_FILE").map(PathBuf::from);

    Ok(AppConfig {
        deriv: DerivConfig {
            websocket_url,
            app_id,
            token,
            redirect_uri,
        },
        market: MarketConfig {
            symbol,
            granularity,
            candle_count,
        },
        reconnect,
        ca_file,
    })
}

fn reconnect_policy() -> crate::Result<ReconnectPolicy> {
    let delay = parsed_var::<u64>("DERIV_RECONNECT_DELAY_MS")?.map(Duration::from_millis);
    let max_delay = parsed_var::<u64>("DERIV_RECONNECT_MAX_DELAY_MS")?.map(Duration::from_millis);
    let max_attempts = parsed_var::<u32>("DERIV_MAX_RECONNECT_ATTEMPTS")?;

    let initial = delay.unwrap_or(crate::session::reconnect::DEFAULT_RECONNECT_DELAY);
    let policy = match max_delay {
        Some(max) if max < initial => {
            return Err(DeckError::Config(
                "DERIV_RECONNECT_MAX_DELAY_MS is below the initial delay".to_string(),
            ));
        }
        Some(max) => ReconnectPolicy::exponential(initial, max),
        None if delay.is_some() => ReconnectPolicy::fixed(initial),
        None => ReconnectPolicy::default(),
    };

    match max_attempts {
        Some(0) => Err(DeckError::Config(
            "DERIV_MAX_RECONNECT_ATTEMPTS must be at least 1".to_string(),
        )),
        Some(n) => Ok(policy.with_max_attempts(n)),
        None => Ok(policy),
    }
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Parses a non-empty environment variable.
fn parsed_var<T: FromStr>(name: &str) -> crate::Result<Option<T>> {
    non_empty_var(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| DeckError::Config(format!("{name} is not a valid number: {raw:?}")))
        })
        .transpose()
}
