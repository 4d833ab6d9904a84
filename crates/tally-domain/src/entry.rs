//! Ledger entries and the sign rules that govern them.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Income,
    Expense,
    Transfer,
}

impl EntryKind {
    pub fn is_transfer(self) -> bool {
        matches!(self, EntryKind::Transfer)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntryKind::Income => "income",
            EntryKind::Expense => "expense",
            EntryKind::Transfer => "transfer",
        };
        f.write_str(label)
    }
}

/// Which side of a transfer an entry records. Ignored for income and expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferLeg {
    Outgoing,
    Incoming,
}

/// Produces the stored amount for an entry from its unsigned magnitude.
///
/// Expenses and outgoing transfer legs are negative, income and incoming legs
/// positive. The sign of `magnitude` is discarded.
pub fn signed_amount(kind: EntryKind, leg: TransferLeg, magnitude: Decimal) -> Decimal {
    let magnitude = magnitude.abs();
    match (kind, leg) {
        (EntryKind::Income, _) => magnitude,
        (EntryKind::Expense, _) => -magnitude,
        (EntryKind::Transfer, TransferLeg::Incoming) => magnitude,
        (EntryKind::Transfer, TransferLeg::Outgoing) => -magnitude,
    }
}

/// Position of an entry within an installment purchase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Installment {
    pub index: u32,
    pub total: u32,
}

impl Installment {
    pub fn new(index: u32, total: u32) -> Self {
        Self { index, total }
    }

    /// The first installment of a multi-part purchase spawns the remaining ones.
    pub fn spawns_followups(&self) -> bool {
        self.index == 1 && self.total > 1
    }

    pub fn is_valid(&self) -> bool {
        self.total >= 1 && (1..=self.total).contains(&self.index)
    }
}

impl fmt::Display for Installment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.total)
    }
}

/// One signed monetary record affecting exactly one account's balance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub account_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart_account_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_entry_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment: Option<Installment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_rule_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Returns the unsigned magnitude of the entry.
    pub fn magnitude(&self) -> Decimal {
        self.amount.abs()
    }

    /// Which leg of a transfer this entry is, derived from its sign.
    pub fn leg(&self) -> TransferLeg {
        if self.amount.is_sign_negative() {
            TransferLeg::Outgoing
        } else {
            TransferLeg::Incoming
        }
    }

    /// Checks the sign convention for the entry's kind.
    pub fn has_valid_sign(&self) -> bool {
        match self.kind {
            EntryKind::Income => self.amount > Decimal::ZERO,
            EntryKind::Expense => self.amount < Decimal::ZERO,
            EntryKind::Transfer => !self.amount.is_zero(),
        }
    }

    /// Returns `true` when `other` is the mirrored leg of this transfer.
    pub fn mirrors(&self, other: &LedgerEntry) -> bool {
        self.kind.is_transfer()
            && other.kind.is_transfer()
            && self.amount + other.amount == Decimal::ZERO
            && self.counterpart_account_id == Some(other.account_id)
            && other.counterpart_account_id == Some(self.account_id)
            && self.linked_entry_id == Some(other.id)
            && other.linked_entry_id == Some(self.id)
    }
}

impl Identifiable for LedgerEntry {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Owned for LedgerEntry {
    fn user_id(&self) -> Uuid {
        self.user_id
    }
}

impl Displayable for LedgerEntry {
    fn display_label(&self) -> String {
        format!(
            "{} {} {} {}",
            self.date, self.kind, self.amount, self.currency
        )
    }
}
