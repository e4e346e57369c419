//! Contract purchase models.
//!
//! `buy` is a fire-and-forget command: the session sends it and surfaces
//! any rejection through the regular error message path. Validation happens
//! locally so obviously bad orders never reach the network.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::DeckError;

/// Contract type offered by the trade form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContractType {
    /// Rise: exit spot strictly higher than entry spot.
    Call,
    /// Fall: exit spot strictly lower than entry spot.
    Put,
    #[serde(rename = "ONETOUCH")]
    OneTouch,
    #[serde(rename = "NOTOUCH")]
    NoTouch,
}

/// Whether `amount` is the stake paid or the payout received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Basis {
    Stake,
    Payout,
}

/// Unit of a contract duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationUnit {
    #[serde(rename = "t")]
    Ticks,
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "m")]
    Minutes,
    #[serde(rename = "h")]
    Hours,
    #[serde(rename = "d")]
    Days,
}

/// A contract duration such as `5m` or `10t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractDuration {
    pub value: u32,
    pub unit: DurationUnit,
}

impl FromStr for ContractDuration {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| DeckError::UserInput(format!("duration {s:?} has no unit")))?;
        let (digits, unit) = s.split_at(split);

        let value: u32 = digits
            .parse()
            .map_err(|_| DeckError::UserInput(format!("duration {s:?} has no amount")))?;
        let unit = match unit {
            "t" => DurationUnit::Ticks,
            "s" => DurationUnit::Seconds,
            "m" => DurationUnit::Minutes,
            "h" => DurationUnit::Hours,
            "d" => DurationUnit::Days,
            other => {
                return Err(DeckError::UserInput(format!(
                    "unknown duration unit {other:?}"
                )));
            }
        };

        Ok(Self { value, unit })
    }
}

/// A validated order, ready to be turned into a [`BuyRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOrder {
    pub symbol: String,
    pub contract_type: ContractType,
    pub amount: Decimal,
    pub basis: Basis,
    pub currency: String,
    pub duration: ContractDuration,
}

/// Builder for [`TradeOrder`] with validation.
#[derive(Debug, Clone)]
pub struct TradeOrderBuilder {
    symbol: String,
    contract_type: ContractType,
    amount: Decimal,
    basis: Basis,
    currency: String,
    duration: ContractDuration,
}

impl TradeOrderBuilder {
    /// Starts a stake-based order in USD.
    #[must_use]
    pub fn new(
        symbol: &str,
        contract_type: ContractType,
        stake: Decimal,
        duration: ContractDuration,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            contract_type,
            amount: stake,
            basis: Basis::Stake,
            currency: "USD".to_string(),
            duration,
        }
    }

    /// Sets the account currency.
    #[must_use]
    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_string();
        self
    }

    /// Treats the amount as the desired payout instead of the stake.
    #[must_use]
    pub fn with_payout_basis(mut self) -> Self {
        self.basis = Basis::Payout;
        self
    }

    /// Validates and builds the order.
    ///
    /// # Errors
    ///
    /// Returns [`DeckError::UserInput`] for an empty symbol or currency, a
    /// non-positive amount, or a zero duration.
    pub fn build(self) -> Result<TradeOrder> {
        if self.symbol.trim().is_empty() {
            return Err(DeckError::UserInput("symbol is required".into()));
        }
        if self.currency.trim().is_empty() {
            return Err(DeckError::UserInput("currency is required".into()));
        }
        if self.amount <= Decimal::ZERO {
            return Err(DeckError::UserInput(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.duration.value == 0 {
            return Err(DeckError::UserInput("duration must be positive".into()));
        }

        Ok(TradeOrder {
            symbol: self.symbol,
            contract_type: self.contract_type,
            amount: self.amount,
            basis: self.basis,
            currency: self.currency,
            duration: self.duration,
        })
    }
}

/// Contract parameters nested in a [`BuyRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractParameters {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub basis: Basis,
    pub contract_type: ContractType,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: DurationUnit,
    pub symbol: String,
}

/// The `buy` request message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyRequest {
    pub buy: u8,
    /// Maximum price the caller accepts to pay.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub parameters: ContractParameters,
}

impl From<TradeOrder> for BuyRequest {
    fn from(order: TradeOrder) -> Self {
        Self {
            buy: 1,
            price: order.amount,
            parameters: ContractParameters {
                amount: order.amount,
                basis: order.basis,
                contract_type: order.contract_type,
                currency: order.currency,
                duration: order.duration.value,
                duration_unit: order.duration.unit,
                symbol: order.symbol,
            },
        }
    }
}
