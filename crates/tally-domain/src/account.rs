use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;

/// A balance-carrying account. `balance` always equals `opening_balance` plus the
/// signed amounts of every entry the account owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub kind: AccountKind,
    pub currency: String,
    pub balance: Decimal,
    #[serde(default)]
    pub opening_balance: Decimal,
    #[serde(default = "Account::default_include_in_summary")]
    pub include_in_summary: bool,
}

impl Account {
    /// Creates a new account with a zero balance.
    pub fn new(
        user_id: Uuid,
        name: impl Into<String>,
        kind: AccountKind,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            kind,
            currency: currency.into(),
            balance: Decimal::ZERO,
            opening_balance: Decimal::ZERO,
            include_in_summary: true,
        }
    }

    /// Seeds the account with an opening balance that is not backed by entries.
    pub fn with_opening_balance(mut self, amount: Decimal) -> Self {
        self.opening_balance = amount;
        self.balance = amount;
        self
    }

    pub fn excluded_from_summary(mut self) -> Self {
        self.include_in_summary = false;
        self
    }

    pub fn default_include_in_summary() -> bool {
        true
    }
}

impl Identifiable for Account {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Owned for Account {
    fn user_id(&self) -> Uuid {
        self.user_id
    }
}

impl Displayable for Account {
    fn display_label(&self) -> String {
        format!(
            "{} ({}, {} {})",
            self.name, self.kind, self.balance, self.currency
        )
    }
}

/// Enumerates the supported account classifications.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Checking,
    Savings,
    Cash,
    CreditCard,
    Investment,
    Debt,
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccountKind::Checking => "Checking",
            AccountKind::Savings => "Savings",
            AccountKind::Cash => "Cash",
            AccountKind::CreditCard => "Credit Card",
            AccountKind::Investment => "Investment",
            AccountKind::Debt => "Debt",
        };
        f.write_str(label)
    }
}
