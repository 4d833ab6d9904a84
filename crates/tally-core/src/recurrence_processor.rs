//! Fires recurring rules, either one at a time or as a due-rule sweep.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use tally_domain::{LedgerEntry, RecurringRule};

use crate::{
    rule_service::validate_rule,
    storage::{RecurringRuleStore, Stores},
    Clock, CoreError, LedgerService, NewEntry, RecurrenceCalculator, Repository,
};

/// What a single fire produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredRule {
    pub rule_id: Uuid,
    pub fired_on: NaiveDate,
    pub entry: LedgerEntry,
    pub next_run_date: NaiveDate,
    /// `false` once the next run would land after the rule's end date.
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleFailure {
    pub rule_id: Uuid,
    pub error: String,
}

/// Outcome of [`RecurrenceProcessor::process_due_rules`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub catch_up: bool,
    pub today: NaiveDate,
    pub fired: Vec<FiredRule>,
    /// Rules that were paused, deleted or already advanced between the due
    /// query and their own unit of work.
    pub skipped: Vec<Uuid>,
    pub failed: Vec<RuleFailure>,
}

impl BatchReport {
    fn new(catch_up: bool, today: NaiveDate) -> Self {
        Self {
            catch_up,
            today,
            fired: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct RecurrenceProcessor {
    repository: Arc<Repository>,
    clock: Arc<dyn Clock>,
}

impl RecurrenceProcessor {
    pub fn new(repository: Arc<Repository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Fires `rule_id` once, dated `as_of`, regardless of whether it is due.
    ///
    /// The generated entry, its balance delta and the rule's bookkeeping commit
    /// together; any failure leaves all three untouched.
    pub fn fire_rule(&self, rule_id: Uuid, as_of: NaiveDate) -> Result<FiredRule, CoreError> {
        let span = tracing::info_span!("fire_rule", rule_id = %rule_id, as_of = %as_of);
        let _guard = span.enter();
        let today = self.clock.today();
        let now = self.clock.now();
        let fired = self
            .repository
            .transaction(|book| fire_in(book, rule_id, as_of, today, now))?;
        log_fired(&fired);
        Ok(fired)
    }

    /// Manual fire. `as_of` defaults to today.
    pub fn run_now(&self, rule_id: Uuid, as_of: Option<NaiveDate>) -> Result<FiredRule, CoreError> {
        let as_of = as_of.unwrap_or_else(|| self.clock.today());
        self.fire_rule(rule_id, as_of)
    }

    /// Active rules due today, in firing order.
    pub fn due_rules(&self) -> Result<Vec<RecurringRule>, CoreError> {
        let today = self.clock.today();
        self.repository.read(|book| book.due_rules(today))
    }

    /// Fires every due rule at its own `next_run_date`, oldest first.
    ///
    /// Each rule commits in its own unit of work; a failing rule is recorded in
    /// the report and the sweep moves on. Only a failing due query aborts.
    pub fn process_due_rules(&self, catch_up: bool) -> Result<BatchReport, CoreError> {
        let today = self.clock.today();
        let span = tracing::info_span!("process_due_rules", catch_up, today = %today);
        let _guard = span.enter();

        let due = self.due_rules()?;
        tracing::info!(due = due.len(), "processing due recurring rules");
        let mut report = BatchReport::new(catch_up, today);

        for snapshot in due {
            let rule_span = tracing::info_span!(
                "fire_rule",
                rule_id = %snapshot.id,
                as_of = %snapshot.next_run_date
            );
            let _rule_guard = rule_span.enter();
            let now = self.clock.now();
            let result = self.repository.transaction(|book| {
                let unchanged = book.rule(snapshot.id).is_some_and(|current| {
                    current.is_active && current.next_run_date == snapshot.next_run_date
                });
                if !unchanged {
                    return Ok(None);
                }
                fire_in(book, snapshot.id, snapshot.next_run_date, today, now).map(Some)
            });
            match result {
                Ok(Some(fired)) => {
                    log_fired(&fired);
                    report.fired.push(fired);
                }
                Ok(None) => {
                    tracing::debug!("rule changed since the due query, skipping");
                    report.skipped.push(snapshot.id);
                }
                Err(err) => {
                    if matches!(err, CoreError::Validation(_)) {
                        tracing::warn!(error = %err, "recurring rule rejected");
                    } else {
                        tracing::error!(error = %err, "recurring rule failed");
                    }
                    report.failed.push(RuleFailure {
                        rule_id: snapshot.id,
                        error: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            fired = report.fired.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "due rule sweep finished"
        );
        Ok(report)
    }
}

fn fire_in<S: Stores>(
    stores: &mut S,
    rule_id: Uuid,
    as_of: NaiveDate,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<FiredRule, CoreError> {
    let mut rule = stores
        .rule(rule_id)
        .cloned()
        .ok_or(CoreError::RuleNotFound(rule_id))?;
    validate_rule(stores, &rule)?;

    let input = NewEntry {
        user_id: rule.user_id,
        kind: rule.kind,
        amount: rule.amount,
        currency: rule.currency.clone(),
        date: as_of,
        account_id: rule.account_id,
        category_id: Some(rule.category_id),
        counterpart_account_id: None,
        description: Some(rule.description.clone()),
        notes: rule.notes.clone(),
        installment: rule.installment,
    };
    let entry = LedgerService::create_in(stores, input, Some(rule.id), now)?
        .primary()
        .clone();

    rule.last_run_date = Some(as_of);
    rule.next_run_date = RecurrenceCalculator::next_run_date(&rule, as_of, false, today)?;
    if rule.ends_before(rule.next_run_date) {
        rule.is_active = false;
    }
    tracing::debug!(next_run_date = %rule.next_run_date, "next run computed");

    let fired = FiredRule {
        rule_id: rule.id,
        fired_on: as_of,
        entry,
        next_run_date: rule.next_run_date,
        is_active: rule.is_active,
    };
    stores.replace_rule(rule)?;
    Ok(fired)
}

fn log_fired(fired: &FiredRule) {
    tracing::info!(
        entry_id = %fired.entry.id,
        amount = %fired.entry.amount,
        next_run_date = %fired.next_run_date,
        active = fired.is_active,
        "recurring rule fired"
    );
}
