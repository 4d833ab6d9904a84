//! Declarative recurrence rules that generate ledger entries.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;
use crate::entry::{EntryKind, Installment};

/// Cadence of a recurring rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Annual,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
            Frequency::Biweekly => "Biweekly",
            Frequency::Monthly => "Monthly",
            Frequency::Annual => "Annual",
        };
        f.write_str(label)
    }
}

/// A schedule that produces income or expense entries on a cadence.
///
/// `amount` is the unsigned magnitude; the sign is fixed by `kind` when the rule
/// fires. `day_of_week` counts from Sunday (0) to Saturday (6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecurringRule {
    pub id: Uuid,
    pub user_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub kind: EntryKind,
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_of_year: Option<u32>,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub next_run_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_date: Option<NaiveDate>,
    pub is_active: bool,
    pub account_id: Uuid,
    pub category_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment: Option<Installment>,
    pub created_at: DateTime<Utc>,
}

impl RecurringRule {
    /// Returns `true` when the rule should fire during a sweep on `today`.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.is_active && self.next_run_date <= today
    }

    /// Returns `true` when `date` falls after the rule's end date.
    pub fn ends_before(&self, date: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| date > end)
    }

    /// Ordering key used for deterministic batch processing.
    pub fn due_order(&self) -> (NaiveDate, Uuid) {
        (self.next_run_date, self.id)
    }
}

impl Identifiable for RecurringRule {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Owned for RecurringRule {
    fn user_id(&self) -> Uuid {
        self.user_id
    }
}

impl Displayable for RecurringRule {
    fn display_label(&self) -> String {
        format!(
            "{} [{} {} {}, next {}]",
            self.description, self.frequency, self.kind, self.amount, self.next_run_date
        )
    }
}
