//! CRUD over recurring rules.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use tally_domain::{EntryKind, Frequency, RecurringRule};

use crate::{
    ledger_service::{ensure_category_accepts, owned_account, owned_category},
    storage::{RecurringRuleStore, Stores},
    Clock, CoreError, RecurrenceCalculator, Repository,
};

/// Frequency plus the parameters it needs. Replaced as a whole on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub frequency: Frequency,
    pub day_of_week: Option<u32>,
    pub day_of_month: Option<u32>,
    pub month_of_year: Option<u32>,
}

impl Schedule {
    pub fn daily() -> Self {
        Self {
            frequency: Frequency::Daily,
            day_of_week: None,
            day_of_month: None,
            month_of_year: None,
        }
    }

    pub fn weekly(day_of_week: u32) -> Self {
        Self {
            frequency: Frequency::Weekly,
            day_of_week: Some(day_of_week),
            ..Self::daily()
        }
    }

    pub fn biweekly(day_of_month: u32) -> Self {
        Self {
            frequency: Frequency::Biweekly,
            day_of_month: Some(day_of_month),
            ..Self::daily()
        }
    }

    pub fn monthly(day_of_month: u32) -> Self {
        Self {
            frequency: Frequency::Monthly,
            day_of_month: Some(day_of_month),
            ..Self::daily()
        }
    }

    pub fn annual(month_of_year: u32, day_of_month: u32) -> Self {
        Self {
            frequency: Frequency::Annual,
            day_of_month: Some(day_of_month),
            month_of_year: Some(month_of_year),
            ..Self::daily()
        }
    }

    fn of(rule: &RecurringRule) -> Self {
        Self {
            frequency: rule.frequency,
            day_of_week: rule.day_of_week,
            day_of_month: rule.day_of_month,
            month_of_year: rule.month_of_year,
        }
    }

    fn apply_to(self, rule: &mut RecurringRule) {
        rule.frequency = self.frequency;
        rule.day_of_week = self.day_of_week;
        rule.day_of_month = self.day_of_month;
        rule.month_of_year = self.month_of_year;
    }
}

#[derive(Debug, Clone)]
pub struct NewRule {
    pub user_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub kind: EntryKind,
    pub schedule: Schedule,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub account_id: Uuid,
    pub category_id: Uuid,
    pub is_active: bool,
    pub notes: Option<String>,
}

/// Partial update for a rule. `end_date: Some(None)` clears the end date.
#[derive(Debug, Clone, Default)]
pub struct RulePatch {
    pub description: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub kind: Option<EntryKind>,
    pub schedule: Option<Schedule>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<Option<NaiveDate>>,
    pub account_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub notes: Option<String>,
}

pub struct RuleService {
    repository: Arc<Repository>,
    clock: Arc<dyn Clock>,
}

impl RuleService {
    pub fn new(repository: Arc<Repository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Creates a rule and schedules its first run on or after `start_date`.
    pub fn create_rule(&self, input: NewRule) -> Result<RecurringRule, CoreError> {
        let today = self.clock.today();
        let now = self.clock.now();
        let rule = self.repository.transaction(|book| {
            let mut rule = RecurringRule {
                id: Uuid::new_v4(),
                user_id: input.user_id,
                description: input.description.trim().to_string(),
                amount: input.amount,
                currency: input.currency,
                kind: input.kind,
                frequency: input.schedule.frequency,
                day_of_week: None,
                day_of_month: None,
                month_of_year: None,
                start_date: input.start_date,
                end_date: input.end_date,
                next_run_date: input.start_date,
                last_run_date: None,
                is_active: input.is_active,
                account_id: input.account_id,
                category_id: input.category_id,
                notes: input.notes,
                installment: None,
                created_at: now,
            };
            input.schedule.apply_to(&mut rule);
            validate_rule(book, &rule)?;
            rule.next_run_date =
                RecurrenceCalculator::next_run_date(&rule, rule.start_date, true, today)?;
            if rule.ends_before(rule.next_run_date) {
                return Err(CoreError::validation(format!(
                    "rule would first run on {} which is after its end date",
                    rule.next_run_date
                )));
            }
            book.insert_rule(rule.clone());
            Ok(rule)
        })?;
        tracing::info!(
            rule_id = %rule.id,
            frequency = %rule.frequency,
            next_run_date = %rule.next_run_date,
            "recurring rule created"
        );
        Ok(rule)
    }

    /// Applies `patch`. A changed schedule or start date reschedules the rule
    /// from its last run (or from the start date if it never ran).
    pub fn update_rule(&self, id: Uuid, patch: RulePatch) -> Result<RecurringRule, CoreError> {
        let today = self.clock.today();
        let rule = self.repository.transaction(|book| {
            let current = book.rule(id).cloned().ok_or(CoreError::RuleNotFound(id))?;
            let mut rule = current.clone();
            if let Some(description) = patch.description {
                rule.description = description.trim().to_string();
            }
            if let Some(amount) = patch.amount {
                rule.amount = amount;
            }
            if let Some(currency) = patch.currency {
                rule.currency = currency;
            }
            if let Some(kind) = patch.kind {
                rule.kind = kind;
            }
            if let Some(schedule) = patch.schedule {
                schedule.apply_to(&mut rule);
            }
            if let Some(start_date) = patch.start_date {
                rule.start_date = start_date;
            }
            if let Some(end_date) = patch.end_date {
                rule.end_date = end_date;
            }
            if let Some(account_id) = patch.account_id {
                rule.account_id = account_id;
            }
            if let Some(category_id) = patch.category_id {
                rule.category_id = category_id;
            }
            if let Some(notes) = patch.notes {
                rule.notes = Some(notes);
            }
            validate_rule(book, &rule)?;

            let rescheduled = Schedule::of(&rule) != Schedule::of(&current)
                || rule.start_date != current.start_date;
            if rescheduled {
                rule.next_run_date = match rule.last_run_date {
                    Some(last) if last >= rule.start_date => {
                        RecurrenceCalculator::next_run_date(&rule, last, false, today)?
                    }
                    _ => RecurrenceCalculator::next_run_date(&rule, rule.start_date, true, today)?,
                };
            }
            if rule.ends_before(rule.next_run_date) {
                rule.is_active = false;
            }
            book.replace_rule(rule.clone())?;
            Ok(rule)
        })?;
        tracing::info!(
            rule_id = %rule.id,
            next_run_date = %rule.next_run_date,
            "recurring rule updated"
        );
        Ok(rule)
    }

    /// Pauses or resumes a rule. A rule past its end date cannot be resumed.
    pub fn set_active(&self, id: Uuid, active: bool) -> Result<RecurringRule, CoreError> {
        self.repository.transaction(|book| {
            let mut rule = book.rule(id).cloned().ok_or(CoreError::RuleNotFound(id))?;
            if active && rule.ends_before(rule.next_run_date) {
                return Err(CoreError::validation(format!(
                    "rule ended on {} and cannot be resumed",
                    rule.end_date.map(|end| end.to_string()).unwrap_or_default()
                )));
            }
            rule.is_active = active;
            book.replace_rule(rule.clone())?;
            Ok(rule)
        })
    }

    pub fn delete_rule(&self, id: Uuid) -> Result<RecurringRule, CoreError> {
        let removed = self.repository.transaction(|book| book.remove_rule(id))?;
        tracing::info!(rule_id = %id, "recurring rule deleted");
        Ok(removed)
    }

    pub fn rule(&self, id: Uuid) -> Result<RecurringRule, CoreError> {
        self.repository
            .read(|book| book.rule(id).cloned())?
            .ok_or(CoreError::RuleNotFound(id))
    }

    /// Rules owned by `user_id`, ordered by next run date.
    pub fn rules_for_user(&self, user_id: Uuid) -> Result<Vec<RecurringRule>, CoreError> {
        self.repository.read(|book| {
            let mut rules: Vec<RecurringRule> = book
                .rules
                .iter()
                .filter(|rule| rule.user_id == user_id)
                .cloned()
                .collect();
            rules.sort_by_key(|rule| rule.due_order());
            rules
        })
    }
}

/// Checks a rule's own fields and the account/category it points at.
pub(crate) fn validate_rule<S: Stores>(stores: &S, rule: &RecurringRule) -> Result<(), CoreError> {
    if rule.amount <= Decimal::ZERO {
        return Err(CoreError::validation("amount must be greater than zero"));
    }
    if rule.description.trim().is_empty() {
        return Err(CoreError::validation("description is required"));
    }
    if rule.kind.is_transfer() {
        return Err(CoreError::validation(
            "recurring rules must produce income or expense entries",
        ));
    }
    RecurrenceCalculator::validate_schedule(
        rule.frequency,
        rule.day_of_week,
        rule.day_of_month,
        rule.month_of_year,
    )?;
    if let Some(end) = rule.end_date {
        if end < rule.start_date {
            return Err(CoreError::validation(
                "end date must not precede start date",
            ));
        }
    }
    let account = owned_account(stores, rule.account_id, rule.user_id)?;
    if !account.currency.eq_ignore_ascii_case(&rule.currency) {
        return Err(CoreError::validation(format!(
            "currency {} does not match account `{}` ({})",
            rule.currency, account.name, account.currency
        )));
    }
    let category = owned_category(stores, rule.category_id, rule.user_id)?;
    ensure_category_accepts(category, rule.kind)
}
