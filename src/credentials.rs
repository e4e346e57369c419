//! Secure token storage via the system keychain.
//!
//! The OAuth token a user obtained through [`crate::oauth`] can be kept in
//! the platform keychain so later runs start authenticated. At startup,
//! [`populate_env_from_keychain`] copies a stored token into `DERIV_TOKEN`
//! so the normal config flow picks it up.

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::DeckError;

/// Keychain service name used for all stored credentials.
const SERVICE: &str = "derivdeck";

/// Keychain entry holding the Deriv OAuth token.
const TOKEN_ENTRY: &str = "deriv_token";

/// Environment variable the token is exposed through.
pub const TOKEN_ENV: &str = "DERIV_TOKEN";

fn token_entry() -> crate::Result<keyring::Entry> {
    keyring::Entry::new(SERVICE, TOKEN_ENTRY)
        .map_err(|e| DeckError::Credentials(format!("keyring entry error: {e}")))
}

/// Loads the stored token, returning `None` if none is saved or the
/// keychain is unavailable.
pub fn load_token() -> Option<Zeroizing<String>> {
    let entry = token_entry().ok()?;
    match entry.get_password() {
        Ok(token) if !token.is_empty() => Some(Zeroizing::new(token)),
        Ok(_) | Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(error = %e, "failed to read keychain entry");
            None
        }
    }
}

/// Saves `token` to the keychain, replacing any previous value.
///
/// # Errors
///
/// Returns [`DeckError::Credentials`] if the token is empty or the keychain
/// rejects the write.
pub fn save_token(token: &str) -> crate::Result<()> {
    if token.is_empty() {
        return Err(DeckError::Credentials("refusing to store an empty token".into()));
    }
    token_entry()?
        .set_password(token)
        .map_err(|e| DeckError::Credentials(format!("failed to save to keychain: {e}")))?;
    info!("stored Deriv token in keychain");
    Ok(())
}

/// Removes the stored token. Succeeds if there was nothing to remove.
///
/// # Errors
///
/// Returns [`DeckError::Credentials`] if the keychain rejects the delete.
pub fn clear_token() -> crate::Result<()> {
    match token_entry()?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(DeckError::Credentials(format!(
            "failed to delete keychain entry: {e}"
        ))),
    }
}

/// Sets `DERIV_TOKEN` from the keychain unless it is already set.
///
/// Call this at startup before [`crate::config::fetch_config`], while the
/// process is still single-threaded: before any async runtime is built.
pub fn populate_env_from_keychain() {
    if std::env::var(TOKEN_ENV).is_ok_and(|v| !v.is_empty()) {
        return;
    }
    if let Some(token) = load_token() {
        debug!(key = TOKEN_ENV, "loaded credential from keychain");
        // SAFETY: callers run this before spawning any thread, so nothing can
        // read the environment concurrently.
        unsafe {
            std::env::set_var(TOKEN_ENV, token.as_str());
        }
    }
}
