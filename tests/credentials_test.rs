//! Startup credential loading.
//!
//! Kept in its own test binary with a single test: it writes the process
//! environment, which is only sound while no other thread is running.

use derivdeck::config::fetch_config;
use derivdeck::credentials::{TOKEN_ENV, populate_env_from_keychain};

#[test]
fn test_env_token_survives_startup_without_runtime() {
    // SAFETY: the only test in this binary and no runtime has been built.
    unsafe {
        std::env::set_var(TOKEN_ENV, "a1-from-env");
    }

    populate_env_from_keychain();
    let config = fetch_config().unwrap();

    assert_eq!(config.deriv.token.as_deref(), Some("a1-from-env"));
    assert!(tokio::runtime::Handle::try_current().is_err());
}
