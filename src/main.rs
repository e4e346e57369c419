use std::sync::Arc;

use derivdeck::DeckError;
use derivdeck::config::{AppConfig, fetch_config};
use derivdeck::credentials::{clear_token, populate_env_from_keychain, save_token};
use derivdeck::models::InboundMessage;
use derivdeck::oauth::{authorize_url, token_from_query};
use derivdeck::session::{Session, SessionEvent};
use derivdeck::tls::build_tls_config;
use derivdeck::websocket::{ConnectionManager, TlsConnector};
use tracing::{error, info, warn};

fn main() -> Result<(), DeckError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("login") => return login(args.next()),
        Some("logout") => {
            clear_token()?;
            info!("Removed stored token");
            return Ok(());
        }
        Some(other) => {
            return Err(DeckError::UserInput(format!(
                "unknown command {other:?}; expected `login <redirect-url>` or `logout`"
            )));
        }
        None => {}
    }

    // Environment writes must happen before the runtime spawns worker threads.
    populate_env_from_keychain();
    let app_config = fetch_config()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| DeckError::Config(format!("failed to start async runtime: {e}")))?;
    runtime.block_on(run(app_config))
}

/// Stores the token carried by an OAuth redirect URL.
fn login(redirect: Option<String>) -> Result<(), DeckError> {
    let Some(redirect) = redirect else {
        let app_config = fetch_config()?;
        let url = authorize_url(&app_config.deriv.app_id, &app_config.deriv.redirect_uri)?;
        info!(%url, "Open this URL, then run `login <redirect-url>` with the page you land on");
        return Ok(());
    };

    let token = token_from_query(&redirect)
        .ok_or_else(|| DeckError::UserInput("redirect carries no account token".into()))?;
    save_token(&token)
}

async fn run(app_config: AppConfig) -> Result<(), DeckError> {
    if app_config.deriv.token.is_none() {
        let url = authorize_url(&app_config.deriv.app_id, &app_config.deriv.redirect_uri)?;
        info!(%url, "No token configured, streaming public data only; log in at");
    }

    let tls_config = build_tls_config(app_config.ca_file.as_deref())?;
    let connector = TlsConnector::new(Arc::new(tls_config));
    let session = Session::new(app_config.session_config())?;

    let (manager, handle, mut events) = ConnectionManager::new(session, connector);
    let task = manager.spawn();

    handle.open(&app_config.market.symbol, app_config.market.granularity)?;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                log_event(&event);
                if matches!(event, SessionEvent::ReconnectExhausted { .. }) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing session");
                handle.close()?;
                break;
            }
        }
    }

    drop(handle);
    if let Err(e) = task.await {
        error!("Session task failed: {e}");
    }
    Ok(())
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::Message(InboundMessage::Tick(tick)) => {
            info!(symbol = ?tick.symbol, quote = tick.quote, epoch = tick.epoch, "Tick");
        }
        SessionEvent::Message(InboundMessage::CandleBatch(batch)) => {
            info!(
                symbol = ?batch.symbol,
                candles = batch.candles.len(),
                update = batch.is_update,
                "Candles"
            );
        }
        SessionEvent::Message(InboundMessage::Authorize(account)) => {
            info!(login_id = %account.login_id, currency = %account.currency, "Logged in");
        }
        SessionEvent::Message(InboundMessage::Balance(balance)) => {
            info!(amount = %balance.amount, currency = %balance.currency, "Balance");
        }
        SessionEvent::Message(InboundMessage::Error(e)) => {
            warn!(code = ?e.code, "API error: {}", e.message);
        }
        SessionEvent::Message(InboundMessage::Forget { .. }) => {}
        SessionEvent::StateChanged(state) => info!(%state, "Connection state"),
        SessionEvent::Reconnecting { attempt, after } => {
            warn!(attempt, ?after, "Reconnecting");
        }
        SessionEvent::ReconnectExhausted { attempts } => {
            error!(attempts, "Gave up reconnecting");
        }
    }
}
