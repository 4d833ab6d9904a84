//! Atomic creation, editing and deletion of ledger entries.
//!
//! Every operation pairs each balance change with the entry that justifies it
//! inside one [`Repository::transaction`], so balances and history commit or
//! roll back together.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use tally_domain::{
    shift_month_to_day, signed_amount, Account, Category, EntryKind, Frequency, Installment,
    LedgerEntry, Owned, RecurringRule, TransferLeg,
};

use crate::{storage::Stores, Clock, CoreError, Repository};

/// Input for [`LedgerService::create_entry`]. `amount` is the unsigned magnitude.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub user_id: Uuid,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub account_id: Uuid,
    pub category_id: Option<Uuid>,
    pub counterpart_account_id: Option<Uuid>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub installment: Option<Installment>,
}

impl NewEntry {
    pub fn income(
        user_id: Uuid,
        account_id: Uuid,
        category_id: Uuid,
        amount: Decimal,
        currency: impl Into<String>,
        date: NaiveDate,
        description: impl Into<String>,
    ) -> Self {
        Self::categorized(
            EntryKind::Income,
            user_id,
            account_id,
            category_id,
            amount,
            currency,
            date,
            description,
        )
    }

    pub fn expense(
        user_id: Uuid,
        account_id: Uuid,
        category_id: Uuid,
        amount: Decimal,
        currency: impl Into<String>,
        date: NaiveDate,
        description: impl Into<String>,
    ) -> Self {
        Self::categorized(
            EntryKind::Expense,
            user_id,
            account_id,
            category_id,
            amount,
            currency,
            date,
            description,
        )
    }

    pub fn transfer(
        user_id: Uuid,
        from_account: Uuid,
        to_account: Uuid,
        amount: Decimal,
        currency: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            user_id,
            kind: EntryKind::Transfer,
            amount,
            currency: currency.into(),
            date,
            account_id: from_account,
            category_id: None,
            counterpart_account_id: Some(to_account),
            description: None,
            notes: None,
            installment: None,
        }
    }

    pub fn with_installment(mut self, index: u32, total: u32) -> Self {
        self.installment = Some(Installment::new(index, total));
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    #[allow(clippy::too_many_arguments)]
    fn categorized(
        kind: EntryKind,
        user_id: Uuid,
        account_id: Uuid,
        category_id: Uuid,
        amount: Decimal,
        currency: impl Into<String>,
        date: NaiveDate,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            amount,
            currency: currency.into(),
            date,
            account_id,
            category_id: Some(category_id),
            counterpart_account_id: None,
            description: Some(description.into()),
            notes: None,
            installment: None,
        }
    }
}

/// Result of creating an entry: one record, or both legs of a transfer.
#[derive(Debug, Clone, PartialEq)]
pub enum CreatedEntry {
    Single(LedgerEntry),
    Transfer {
        outgoing: LedgerEntry,
        incoming: LedgerEntry,
    },
}

impl CreatedEntry {
    /// The entry owned by the account named in the request.
    pub fn primary(&self) -> &LedgerEntry {
        match self {
            CreatedEntry::Single(entry) => entry,
            CreatedEntry::Transfer { outgoing, .. } => outgoing,
        }
    }

    pub fn entries(&self) -> Vec<&LedgerEntry> {
        match self {
            CreatedEntry::Single(entry) => vec![entry],
            CreatedEntry::Transfer { outgoing, incoming } => vec![outgoing, incoming],
        }
    }
}

/// Partial update for [`LedgerService::update_entry`]. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct EntryPatch {
    pub kind: Option<EntryKind>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub date: Option<NaiveDate>,
    pub account_id: Option<Uuid>,
    pub counterpart_account_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub description: Option<String>,
    pub notes: Option<String>,
}

/// Orchestrates ledger entries and the balance deltas that accompany them.
pub struct LedgerService {
    repository: Arc<Repository>,
    clock: Arc<dyn Clock>,
}

impl LedgerService {
    pub fn new(repository: Arc<Repository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Records an income, expense or transfer and updates the affected balances.
    ///
    /// The first installment of a multi-part purchase also schedules the
    /// remaining installments as single-fire monthly rules.
    pub fn create_entry(&self, input: NewEntry) -> Result<CreatedEntry, CoreError> {
        let now = self.clock.now();
        let created = self
            .repository
            .transaction(|book| Self::create_in(book, input, None, now))?;
        for entry in created.entries() {
            tracing::info!(
                entry_id = %entry.id,
                account_id = %entry.account_id,
                kind = %entry.kind,
                amount = %entry.amount,
                date = %entry.date,
                "ledger entry created"
            );
        }
        Ok(created)
    }

    /// Edits an entry, moving its balance effect to match the new values.
    ///
    /// Editing either leg of a transfer rewrites the linked leg as well, so the
    /// pair stays mirrored.
    pub fn update_entry(&self, id: Uuid, patch: EntryPatch) -> Result<LedgerEntry, CoreError> {
        let updated = self
            .repository
            .transaction(|book| Self::update_in(book, id, patch))?;
        tracing::info!(
            entry_id = %updated.id,
            account_id = %updated.account_id,
            amount = %updated.amount,
            "ledger entry updated"
        );
        Ok(updated)
    }

    /// Deletes an entry (and its linked transfer leg) and reverses the balances.
    /// Returns every removed entry.
    pub fn delete_entry(&self, id: Uuid) -> Result<Vec<LedgerEntry>, CoreError> {
        let removed = self
            .repository
            .transaction(|book| Self::delete_in(book, id))?;
        tracing::info!(entry_id = %id, removed = removed.len(), "ledger entry deleted");
        Ok(removed)
    }

    pub fn entry(&self, id: Uuid) -> Result<LedgerEntry, CoreError> {
        self.repository
            .read(|book| book.entries.iter().find(|entry| entry.id == id).cloned())?
            .ok_or(CoreError::EntryNotFound(id))
    }

    /// Entries owned by `account_id`, oldest first.
    pub fn entries_for_account(&self, account_id: Uuid) -> Result<Vec<LedgerEntry>, CoreError> {
        self.repository.read(|book| {
            let mut entries: Vec<LedgerEntry> = book
                .entries
                .iter()
                .filter(|entry| entry.account_id == account_id)
                .cloned()
                .collect();
            entries.sort_by_key(|entry| (entry.date, entry.created_at));
            entries
        })
    }

    /// Creates an entry inside an open unit of work. `origin` tags entries
    /// generated by a recurring rule.
    pub(crate) fn create_in<S: Stores>(
        stores: &mut S,
        input: NewEntry,
        origin: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<CreatedEntry, CoreError> {
        if input.amount <= Decimal::ZERO {
            return Err(CoreError::validation("amount must be greater than zero"));
        }
        if let Some(installment) = input.installment {
            if !installment.is_valid() {
                return Err(CoreError::validation(format!(
                    "installment {installment} is out of range"
                )));
            }
            if input.kind.is_transfer() {
                return Err(CoreError::validation(
                    "transfers cannot be recorded as installments",
                ));
            }
        }

        match input.kind {
            EntryKind::Transfer => Self::create_transfer(stores, input, origin, now),
            EntryKind::Income | EntryKind::Expense => {
                let installment = input.installment;
                let entry = Self::create_single(stores, input, origin, now)?;
                if let Some(installment) = installment.filter(Installment::spawns_followups) {
                    Self::spawn_installments(stores, &entry, installment, now)?;
                }
                Ok(CreatedEntry::Single(entry))
            }
        }
    }

    fn create_single<S: Stores>(
        stores: &mut S,
        input: NewEntry,
        origin: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, CoreError> {
        let description = required_description(input.description.as_deref())?;
        if input.counterpart_account_id.is_some() {
            return Err(CoreError::validation(format!(
                "{} entries cannot have a destination account",
                input.kind
            )));
        }
        let category_id = input.category_id.ok_or_else(|| {
            CoreError::validation(format!("{} entries require a category", input.kind))
        })?;

        let account = owned_account(stores, input.account_id, input.user_id)?;
        ensure_currency(account, &input.currency)?;
        let category = owned_category(stores, category_id, input.user_id)?;
        ensure_category_accepts(category, input.kind)?;

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            kind: input.kind,
            amount: signed_amount(input.kind, TransferLeg::Incoming, input.amount),
            currency: input.currency,
            date: input.date,
            account_id: input.account_id,
            counterpart_account_id: None,
            linked_entry_id: None,
            category_id: Some(category_id),
            description: Some(description),
            notes: input.notes,
            installment: input.installment,
            recurring_rule_id: origin,
            created_at: now,
        };
        stores.apply_delta(entry.account_id, entry.amount)?;
        stores.insert_entry(entry.clone());
        Ok(entry)
    }

    fn create_transfer<S: Stores>(
        stores: &mut S,
        input: NewEntry,
        origin: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<CreatedEntry, CoreError> {
        if input.category_id.is_some() {
            return Err(CoreError::validation("transfers cannot carry a category"));
        }
        let destination = input
            .counterpart_account_id
            .ok_or_else(|| CoreError::validation("transfers require a destination account"))?;
        if destination == input.account_id {
            return Err(CoreError::Conflict(
                "transfer source and destination must differ".into(),
            ));
        }
        let source_account = owned_account(stores, input.account_id, input.user_id)?;
        ensure_currency(source_account, &input.currency)?;
        let destination_account = owned_account(stores, destination, input.user_id)?;
        ensure_currency(destination_account, &input.currency)?;

        let outgoing_id = Uuid::new_v4();
        let incoming_id = Uuid::new_v4();
        let description = input.description.filter(|text| !text.trim().is_empty());
        let outgoing = LedgerEntry {
            id: outgoing_id,
            user_id: input.user_id,
            kind: EntryKind::Transfer,
            amount: signed_amount(EntryKind::Transfer, TransferLeg::Outgoing, input.amount),
            currency: input.currency.clone(),
            date: input.date,
            account_id: input.account_id,
            counterpart_account_id: Some(destination),
            linked_entry_id: Some(incoming_id),
            category_id: None,
            description: description.clone(),
            notes: input.notes.clone(),
            installment: None,
            recurring_rule_id: origin,
            created_at: now,
        };
        let incoming = LedgerEntry {
            id: incoming_id,
            amount: signed_amount(EntryKind::Transfer, TransferLeg::Incoming, input.amount),
            account_id: destination,
            counterpart_account_id: Some(input.account_id),
            linked_entry_id: Some(outgoing_id),
            description,
            notes: input.notes,
            ..outgoing.clone()
        };

        stores.apply_delta(outgoing.account_id, outgoing.amount)?;
        stores.apply_delta(incoming.account_id, incoming.amount)?;
        stores.insert_entry(outgoing.clone());
        stores.insert_entry(incoming.clone());
        Ok(CreatedEntry::Transfer { outgoing, incoming })
    }

    /// Schedules installments 2..=N, one per following month, on the entry's
    /// day of month clamped to each month's length.
    fn spawn_installments<S: Stores>(
        stores: &mut S,
        first: &LedgerEntry,
        installment: Installment,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let category_id = first
            .category_id
            .ok_or_else(|| CoreError::validation("installments require a category"))?;
        let day = first.date.day();
        for index in 2..=installment.total {
            let due = shift_month_to_day(first.date, (index - 1) as i32, day).ok_or_else(|| {
                CoreError::validation(format!("installment {index} falls outside the calendar"))
            })?;
            let rule = RecurringRule {
                id: Uuid::new_v4(),
                user_id: first.user_id,
                description: first.description.clone().unwrap_or_default(),
                amount: first.magnitude(),
                currency: first.currency.clone(),
                kind: first.kind,
                frequency: Frequency::Monthly,
                day_of_week: None,
                day_of_month: Some(day),
                month_of_year: None,
                start_date: due,
                end_date: Some(due),
                next_run_date: due,
                last_run_date: None,
                is_active: true,
                account_id: first.account_id,
                category_id,
                notes: first.notes.clone(),
                installment: Some(Installment::new(index, installment.total)),
                created_at: now,
            };
            tracing::debug!(rule_id = %rule.id, index, due = %due, "installment scheduled");
            stores.insert_rule(rule);
        }
        Ok(())
    }

    pub(crate) fn update_in<S: Stores>(
        stores: &mut S,
        id: Uuid,
        patch: EntryPatch,
    ) -> Result<LedgerEntry, CoreError> {
        let current = stores
            .entry(id)
            .cloned()
            .ok_or(CoreError::EntryNotFound(id))?;
        if let Some(amount) = patch.amount {
            if amount <= Decimal::ZERO {
                return Err(CoreError::validation("amount must be greater than zero"));
            }
        }
        match (current.kind.is_transfer(), patch.kind) {
            (true, Some(kind)) if !kind.is_transfer() => {
                return Err(CoreError::validation(
                    "a transfer cannot be converted into income or expense",
                ))
            }
            (false, Some(EntryKind::Transfer)) => {
                return Err(CoreError::validation(
                    "income or expense entries cannot be converted into transfers",
                ))
            }
            _ => {}
        }
        if current.kind.is_transfer() {
            Self::update_transfer(stores, current, patch)
        } else {
            Self::update_single(stores, current, patch)
        }
    }

    fn update_single<S: Stores>(
        stores: &mut S,
        current: LedgerEntry,
        patch: EntryPatch,
    ) -> Result<LedgerEntry, CoreError> {
        if patch.counterpart_account_id.is_some() {
            return Err(CoreError::validation(format!(
                "{} entries cannot have a destination account",
                current.kind
            )));
        }
        let kind = patch.kind.unwrap_or(current.kind);
        let magnitude = patch.amount.unwrap_or_else(|| current.magnitude());
        let account_id = patch.account_id.unwrap_or(current.account_id);
        let currency = patch.currency.unwrap_or_else(|| current.currency.clone());
        let category_id = patch
            .category_id
            .or(current.category_id)
            .ok_or_else(|| CoreError::validation(format!("{kind} entries require a category")))?;
        let description = required_description(
            patch
                .description
                .as_deref()
                .or(current.description.as_deref()),
        )?;

        let account = owned_account(stores, account_id, current.user_id)?;
        ensure_currency(account, &currency)?;
        let category = owned_category(stores, category_id, current.user_id)?;
        ensure_category_accepts(category, kind)?;

        let updated = LedgerEntry {
            kind,
            amount: signed_amount(kind, TransferLeg::Incoming, magnitude),
            currency,
            date: patch.date.unwrap_or(current.date),
            account_id,
            category_id: Some(category_id),
            description: Some(description),
            notes: patch.notes.or_else(|| current.notes.clone()),
            ..current.clone()
        };

        stores.apply_delta(current.account_id, -current.amount)?;
        stores.apply_delta(updated.account_id, updated.amount)?;
        stores.replace_entry(updated.clone())?;
        Ok(updated)
    }

    fn update_transfer<S: Stores>(
        stores: &mut S,
        current: LedgerEntry,
        patch: EntryPatch,
    ) -> Result<LedgerEntry, CoreError> {
        if patch.category_id.is_some() {
            return Err(CoreError::validation("transfers cannot carry a category"));
        }
        let linked = linked_leg(stores, &current)?;

        let owner = patch.account_id.unwrap_or(current.account_id);
        let counterpart = patch.counterpart_account_id.unwrap_or(linked.account_id);
        if owner == counterpart {
            return Err(CoreError::Conflict(
                "transfer source and destination must differ".into(),
            ));
        }
        let magnitude = patch.amount.unwrap_or_else(|| current.magnitude());
        let currency = patch.currency.unwrap_or_else(|| current.currency.clone());
        ensure_currency(owned_account(stores, owner, current.user_id)?, &currency)?;
        ensure_currency(
            owned_account(stores, counterpart, current.user_id)?,
            &currency,
        )?;

        let date = patch.date.unwrap_or(current.date);
        let description = patch.description.or_else(|| current.description.clone());
        let notes = patch.notes.or_else(|| current.notes.clone());

        let updated = LedgerEntry {
            amount: signed_amount(EntryKind::Transfer, current.leg(), magnitude),
            currency: currency.clone(),
            date,
            account_id: owner,
            counterpart_account_id: Some(counterpart),
            description: description.clone(),
            notes: notes.clone(),
            ..current.clone()
        };
        let mirrored = LedgerEntry {
            amount: -updated.amount,
            currency,
            date,
            account_id: counterpart,
            counterpart_account_id: Some(owner),
            description,
            notes,
            ..linked.clone()
        };

        stores.apply_delta(current.account_id, -current.amount)?;
        stores.apply_delta(linked.account_id, -linked.amount)?;
        stores.apply_delta(updated.account_id, updated.amount)?;
        stores.apply_delta(mirrored.account_id, mirrored.amount)?;
        stores.replace_entry(updated.clone())?;
        stores.replace_entry(mirrored)?;
        Ok(updated)
    }

    pub(crate) fn delete_in<S: Stores>(
        stores: &mut S,
        id: Uuid,
    ) -> Result<Vec<LedgerEntry>, CoreError> {
        let entry = stores
            .entry(id)
            .cloned()
            .ok_or(CoreError::EntryNotFound(id))?;
        let mut removed = Vec::with_capacity(2);
        if entry.kind.is_transfer() {
            let linked = linked_leg(stores, &entry)?;
            stores.apply_delta(linked.account_id, -linked.amount)?;
            removed.push(stores.remove_entry(linked.id)?);
        }
        stores.apply_delta(entry.account_id, -entry.amount)?;
        removed.insert(0, stores.remove_entry(entry.id)?);
        Ok(removed)
    }
}

fn required_description(description: Option<&str>) -> Result<String, CoreError> {
    match description.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(CoreError::validation("description is required")),
    }
}

/// Records owned by another user are treated as missing.
fn owned_by<T: Owned>(record: Option<&T>, user_id: Uuid) -> Option<&T> {
    record.filter(|record| record.user_id() == user_id)
}

/// Looks up an account, hiding accounts that belong to another user.
pub(crate) fn owned_account<S: Stores>(
    stores: &S,
    id: Uuid,
    user_id: Uuid,
) -> Result<&Account, CoreError> {
    owned_by(stores.account(id), user_id).ok_or(CoreError::AccountNotFound(id))
}

/// Looks up a category, hiding categories that belong to another user.
pub(crate) fn owned_category<S: Stores>(
    stores: &S,
    id: Uuid,
    user_id: Uuid,
) -> Result<&Category, CoreError> {
    owned_by(stores.category(id), user_id).ok_or(CoreError::CategoryNotFound(id))
}

pub(crate) fn ensure_category_accepts(
    category: &Category,
    kind: EntryKind,
) -> Result<(), CoreError> {
    if category.accepts(kind) {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "category `{}` is {} and cannot hold {kind} entries",
            category.name,
            category.kind.to_string().to_lowercase()
        )))
    }
}

fn ensure_currency(account: &Account, currency: &str) -> Result<(), CoreError> {
    if account.currency.eq_ignore_ascii_case(currency) {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "currency {currency} does not match account `{}` ({})",
            account.name, account.currency
        )))
    }
}

fn linked_leg<S: Stores>(stores: &S, entry: &LedgerEntry) -> Result<LedgerEntry, CoreError> {
    let linked_id = entry.linked_entry_id.ok_or_else(|| {
        CoreError::Persistence(format!("transfer entry {} has no linked leg", entry.id))
    })?;
    stores
        .entry(linked_id)
        .cloned()
        .ok_or(CoreError::EntryNotFound(linked_id))
}
