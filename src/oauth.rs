//! Deriv OAuth login helpers.
//!
//! Deriv logs a user in by redirecting the browser to
//! `oauth.deriv.com`, which then redirects back with one numbered
//! `acctN`/`tokenN`/`curN` triple per account. The first account's token is
//! the one the session authorizes with.

use std::collections::HashMap;

use url::Url;
use zeroize::Zeroizing;

use crate::Result;

const AUTHORIZE_ENDPOINT: &str = "https://oauth.deriv.com/oauth2/authorize";

/// One account returned by the OAuth redirect.
pub struct RedirectAccount {
    pub account: String,
    pub token: Zeroizing<String>,
    pub currency: Option<String>,
}

impl std::fmt::Debug for RedirectAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectAccount")
            .field("account", &self.account)
            .field("token", &"<redacted>")
            .field("currency", &self.currency)
            .finish()
    }
}

/// Builds the login URL a user opens in a browser.
///
/// # Errors
///
/// Returns [`DeckError::Url`](crate::DeckError::Url) if the authorize
/// endpoint fails to parse.
pub fn authorize_url(app_id: &str, redirect_uri: &str) -> Result<Url> {
    let mut url = Url::parse(AUTHORIZE_ENDPOINT)?;
    url.query_pairs_mut()
        .append_pair("app_id", app_id)
        .append_pair("redirect_uri", redirect_uri);
    Ok(url)
}

/// Extracts the accounts from a redirect query string.
///
/// Accepts either the bare query (with or without a leading `?`) or the
/// whole redirect URL. Accounts are read in order starting at `acct1` and
/// stop at the first index missing an account or a token.
pub fn parse_redirect(redirect: &str) -> Vec<RedirectAccount> {
    let mut params = query_params(redirect);

    let mut accounts = Vec::new();
    for i in 1.. {
        let account = params.remove(&format!("acct{i}")).filter(|s| !s.is_empty());
        let token = params.remove(&format!("token{i}")).filter(|s| !s.is_empty());
        let (Some(account), Some(token)) = (account, token) else {
            break;
        };
        let currency = params.remove(&format!("cur{i}")).filter(|s| !s.is_empty());
        accounts.push(RedirectAccount {
            account,
            token: Zeroizing::new(token),
            currency,
        });
    }
    accounts
}

/// Returns the token the session should authorize with: the first
/// redirected account's token, or a bare `token` parameter.
pub fn token_from_query(redirect: &str) -> Option<Zeroizing<String>> {
    if let Some(first) = parse_redirect(redirect).into_iter().next() {
        return Some(first.token);
    }
    query_params(redirect)
        .remove("token")
        .filter(|s| !s.is_empty())
        .map(Zeroizing::new)
}

fn query_params(redirect: &str) -> HashMap<String, String> {
    let query = match Url::parse(redirect) {
        Ok(url) => url.query().unwrap_or_default().to_string(),
        Err(_) => redirect.trim_start_matches('?').to_string(),
    };

    // First occurrence wins, like URLSearchParams.get.
    let mut params = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}
