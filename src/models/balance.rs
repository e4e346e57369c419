//! Account balance models.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::SubscriptionInfo;

/// A `balance` message (initial snapshot or streamed update).
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    pub balance: BalanceData,
    #[serde(default)]
    pub subscription: Option<SubscriptionInfo>,
}

/// Balance payload as sent on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceData {
    pub balance: Decimal,
    pub currency: String,
    #[serde(default)]
    pub loginid: Option<String>,
}

/// Current account balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balance {
    pub amount: Decimal,
    pub currency: String,
}

impl From<BalanceResponse> for Balance {
    fn from(response: BalanceResponse) -> Self {
        Self {
            amount: response.balance.balance,
            currency: response.balance.currency,
        }
    }
}
