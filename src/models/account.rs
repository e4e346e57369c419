//! Authorization result models.

use rust_decimal::Decimal;
use serde::Deserialize;

/// An `authorize` message answering an [`AuthorizeRequest`](super::AuthorizeRequest).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeResponse {
    pub authorize: AuthorizeData,
}

/// Authorized account details as sent on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeData {
    pub loginid: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub balance: Option<Decimal>,
    #[serde(default)]
    pub fullname: Option<String>,
}

/// The account a session is authorized as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub login_id: String,
    pub currency: String,
}

impl From<AuthorizeResponse> for Account {
    fn from(response: AuthorizeResponse) -> Self {
        Self {
            login_id: response.authorize.loginid,
            currency: response.authorize.currency,
        }
    }
}
