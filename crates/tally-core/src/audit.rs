//! Consistency checks over a committed book.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use tally_domain::{Book, LedgerEntry};

/// Reports every inconsistency found in `book`. An empty list means the book
/// reconciles: each balance equals its opening balance plus the sum of its
/// entries, every reference resolves and every transfer has a mirrored leg.
pub fn ledger_warnings(book: &Book, today: NaiveDate) -> Vec<String> {
    let account_ids: HashSet<Uuid> = book.accounts.iter().map(|a| a.id).collect();
    let category_ids: HashSet<Uuid> = book.categories.iter().map(|c| c.id).collect();
    let entries: HashMap<Uuid, &LedgerEntry> = book.entries.iter().map(|e| (e.id, e)).collect();
    let mut warnings = Vec::new();

    let mut sums: HashMap<Uuid, Option<Decimal>> = HashMap::new();
    for entry in &book.entries {
        let sum = sums.entry(entry.account_id).or_insert(Some(Decimal::ZERO));
        *sum = sum.and_then(|total| total.checked_add(entry.amount));
    }
    for account in &book.accounts {
        let entries_total = match sums.get(&account.id) {
            Some(total) => *total,
            None => Some(Decimal::ZERO),
        };
        match entries_total.and_then(|total| account.opening_balance.checked_add(total)) {
            Some(expected) if account.balance == expected => {}
            Some(expected) => warnings.push(format!(
                "account {} balance {} differs from opening balance plus entries ({})",
                account.id, account.balance, expected
            )),
            None => warnings.push(format!(
                "account {} entries overflow when summed against its opening balance",
                account.id
            )),
        }
    }

    for entry in &book.entries {
        if !account_ids.contains(&entry.account_id) {
            warnings.push(format!(
                "entry {} references unknown account {}",
                entry.id, entry.account_id
            ));
        }
        if let Some(category) = entry.category_id {
            if !category_ids.contains(&category) {
                warnings.push(format!(
                    "entry {} references missing category {}",
                    entry.id, category
                ));
            }
        }
        if !entry.has_valid_sign() {
            warnings.push(format!(
                "entry {} has amount {} with the wrong sign for a {} entry",
                entry.id, entry.amount, entry.kind
            ));
        }
        if entry.kind.is_transfer() {
            match entry.linked_entry_id.and_then(|id| entries.get(&id)) {
                Some(linked) if entry.mirrors(linked) => {}
                Some(linked) => warnings.push(format!(
                    "transfer {} is not mirrored by its linked leg {}",
                    entry.id, linked.id
                )),
                None => warnings.push(format!("transfer {} has no linked leg", entry.id)),
            }
        }
    }

    for rule in &book.rules {
        if !account_ids.contains(&rule.account_id) {
            warnings.push(format!(
                "rule {} references unknown account {}",
                rule.id, rule.account_id
            ));
        }
        if !category_ids.contains(&rule.category_id) {
            warnings.push(format!(
                "rule {} references missing category {}",
                rule.id, rule.category_id
            ));
        }
        if !rule.is_active && rule.next_run_date <= today && !rule.ends_before(rule.next_run_date) {
            warnings.push(format!(
                "rule {} is paused with an occurrence due on {}",
                rule.id, rule.next_run_date
            ));
        }
    }
    warnings
}
