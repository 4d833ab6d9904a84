//! Store traits over the book and the persistence seam behind them.

use std::sync::Mutex;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use tally_domain::{Account, Book, Category, Identifiable, LedgerEntry, RecurringRule};

use crate::CoreError;

/// Account balances and metadata.
pub trait AccountStore {
    fn account(&self, id: Uuid) -> Option<&Account>;
    fn accounts(&self) -> &[Account];
    fn insert_account(&mut self, account: Account);
    /// Adds `delta` to the account balance and returns the new balance.
    fn apply_delta(&mut self, id: Uuid, delta: Decimal) -> Result<Decimal, CoreError>;
}

/// Read access to categories, plus insertion for seeding.
pub trait CategoryStore {
    fn category(&self, id: Uuid) -> Option<&Category>;
    fn categories(&self) -> &[Category];
    fn insert_category(&mut self, category: Category);
}

pub trait LedgerEntryStore {
    fn entry(&self, id: Uuid) -> Option<&LedgerEntry>;
    fn entries(&self) -> &[LedgerEntry];
    fn insert_entry(&mut self, entry: LedgerEntry);
    fn replace_entry(&mut self, entry: LedgerEntry) -> Result<(), CoreError>;
    fn remove_entry(&mut self, id: Uuid) -> Result<LedgerEntry, CoreError>;
}

pub trait RecurringRuleStore {
    fn rule(&self, id: Uuid) -> Option<&RecurringRule>;
    fn rules(&self) -> &[RecurringRule];
    fn insert_rule(&mut self, rule: RecurringRule);
    fn replace_rule(&mut self, rule: RecurringRule) -> Result<(), CoreError>;
    fn remove_rule(&mut self, id: Uuid) -> Result<RecurringRule, CoreError>;

    /// Active rules with `next_run_date <= today`, ordered by `(next_run_date, id)`.
    fn due_rules(&self, today: NaiveDate) -> Vec<RecurringRule> {
        let mut due: Vec<RecurringRule> = self
            .rules()
            .iter()
            .filter(|rule| rule.is_due(today))
            .cloned()
            .collect();
        due.sort_by_key(|rule| rule.due_order());
        due
    }
}

/// Everything a unit of work can touch.
pub trait Stores: AccountStore + CategoryStore + LedgerEntryStore + RecurringRuleStore {}

impl<T: AccountStore + CategoryStore + LedgerEntryStore + RecurringRuleStore> Stores for T {}

fn find_by_id<T: Identifiable>(items: &[T], id: Uuid) -> Option<&T> {
    items.iter().find(|item| item.id() == id)
}

fn position_of<T: Identifiable>(items: &[T], id: Uuid) -> Option<usize> {
    items.iter().position(|item| item.id() == id)
}

impl AccountStore for Book {
    fn account(&self, id: Uuid) -> Option<&Account> {
        find_by_id(&self.accounts, id)
    }

    fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    fn insert_account(&mut self, account: Account) {
        self.accounts.push(account);
        self.touch();
    }

    fn apply_delta(&mut self, id: Uuid, delta: Decimal) -> Result<Decimal, CoreError> {
        let account = self
            .accounts
            .iter_mut()
            .find(|account| account.id == id)
            .ok_or(CoreError::AccountNotFound(id))?;
        let balance = account.balance.checked_add(delta).ok_or_else(|| {
            CoreError::validation(format!(
                "balance of account {id} would overflow applying {delta}"
            ))
        })?;
        account.balance = balance;
        self.touch();
        Ok(balance)
    }
}

impl CategoryStore for Book {
    fn category(&self, id: Uuid) -> Option<&Category> {
        find_by_id(&self.categories, id)
    }

    fn categories(&self) -> &[Category] {
        &self.categories
    }

    fn insert_category(&mut self, category: Category) {
        self.categories.push(category);
        self.touch();
    }
}

impl LedgerEntryStore for Book {
    fn entry(&self, id: Uuid) -> Option<&LedgerEntry> {
        find_by_id(&self.entries, id)
    }

    fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    fn insert_entry(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
        self.touch();
    }

    fn replace_entry(&mut self, entry: LedgerEntry) -> Result<(), CoreError> {
        let index =
            position_of(&self.entries, entry.id).ok_or(CoreError::EntryNotFound(entry.id))?;
        self.entries[index] = entry;
        self.touch();
        Ok(())
    }

    fn remove_entry(&mut self, id: Uuid) -> Result<LedgerEntry, CoreError> {
        let index = position_of(&self.entries, id).ok_or(CoreError::EntryNotFound(id))?;
        let removed = self.entries.remove(index);
        self.touch();
        Ok(removed)
    }
}

impl RecurringRuleStore for Book {
    fn rule(&self, id: Uuid) -> Option<&RecurringRule> {
        find_by_id(&self.rules, id)
    }

    fn rules(&self) -> &[RecurringRule] {
        &self.rules
    }

    fn insert_rule(&mut self, rule: RecurringRule) {
        self.rules.push(rule);
        self.touch();
    }

    fn replace_rule(&mut self, rule: RecurringRule) -> Result<(), CoreError> {
        let index = position_of(&self.rules, rule.id).ok_or(CoreError::RuleNotFound(rule.id))?;
        self.rules[index] = rule;
        self.touch();
        Ok(())
    }

    fn remove_rule(&mut self, id: Uuid) -> Result<RecurringRule, CoreError> {
        let index = position_of(&self.rules, id).ok_or(CoreError::RuleNotFound(id))?;
        let removed = self.rules.remove(index);
        self.touch();
        Ok(removed)
    }
}

/// Abstraction over persistence backends capable of storing a whole book.
pub trait BookStorage: Send + Sync {
    /// Loads the last committed book, or `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<Book>, CoreError>;
    /// Durably replaces the stored book. Must not leave a partial write behind.
    fn save(&self, book: &Book) -> Result<(), CoreError>;
}

/// Keeps the committed book in memory only.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    saved: Mutex<Option<Book>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_book(book: Book) -> Self {
        Self {
            saved: Mutex::new(Some(book)),
        }
    }
}

impl BookStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Book>, CoreError> {
        let guard = self
            .saved
            .lock()
            .map_err(|_| CoreError::Persistence("memory storage lock poisoned".into()))?;
        Ok(guard.clone())
    }

    fn save(&self, book: &Book) -> Result<(), CoreError> {
        let mut guard = self
            .saved
            .lock()
            .map_err(|_| CoreError::Persistence("memory storage lock poisoned".into()))?;
        *guard = Some(book.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tally_domain::{AccountKind, EntryKind, Frequency};

    fn rule_due_on(book: &mut Book, date: NaiveDate, active: bool) -> Uuid {
        let rule = RecurringRule {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            description: "Rent".into(),
            amount: dec!(100),
            currency: "USD".into(),
            kind: EntryKind::Expense,
            frequency: Frequency::Daily,
            day_of_week: None,
            day_of_month: None,
            month_of_year: None,
            start_date: date,
            end_date: None,
            next_run_date: date,
            last_run_date: None,
            is_active: active,
            account_id: Uuid::nil(),
            category_id: Uuid::nil(),
            notes: None,
            installment: None,
            created_at: Utc::now(),
        };
        let id = rule.id;
        book.insert_rule(rule);
        id
    }

    #[test]
    fn apply_delta_updates_balance() {
        let mut book = Book::new();
        let account = Account::new(Uuid::nil(), "Checking", AccountKind::Checking, "USD");
        let id = account.id;
        book.insert_account(account);

        assert_eq!(book.apply_delta(id, dec!(25.10)).unwrap(), dec!(25.10));
        assert_eq!(book.apply_delta(id, dec!(-5.10)).unwrap(), dec!(20.00));
        assert!(matches!(
            book.apply_delta(Uuid::new_v4(), dec!(1)),
            Err(CoreError::AccountNotFound(_))
        ));
    }

    #[test]
    fn apply_delta_refuses_to_overflow() {
        let mut book = Book::new();
        let account = Account::new(Uuid::nil(), "Vault", AccountKind::Savings, "USD")
            .with_opening_balance(Decimal::MAX);
        let id = account.id;
        book.insert_account(account);

        assert!(matches!(
            book.apply_delta(id, dec!(1)),
            Err(CoreError::Validation(_))
        ));
        assert_eq!(book.account(id).map(|a| a.balance), Some(Decimal::MAX));
    }

    #[test]
    fn due_rules_filters_and_orders() {
        let mut book = Book::new();
        let march = |day| NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        let today = march(10);
        let later = rule_due_on(&mut book, march(9), true);
        let earlier = rule_due_on(&mut book, march(1), true);
        rule_due_on(&mut book, march(11), true);
        rule_due_on(&mut book, march(2), false);

        let due: Vec<Uuid> = book.due_rules(today).iter().map(|rule| rule.id).collect();
        assert_eq!(due, vec![earlier, later]);
    }

    #[test]
    fn memory_storage_returns_last_saved_book() {
        let storage = MemoryStorage::new();
        assert!(storage.load().unwrap().is_none());
        let book = Book::new();
        storage.save(&book).unwrap();
        assert_eq!(storage.load().unwrap().map(|saved| saved.id), Some(book.id));
    }
}
