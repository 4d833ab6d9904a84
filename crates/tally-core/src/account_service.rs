//! Account and category bookkeeping plus the reconcile audit.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use tally_domain::{Account, AccountKind, Category, CategoryKind};

use crate::{
    audit::ledger_warnings,
    storage::{AccountStore, CategoryStore},
    Clock, CoreError, Repository,
};

pub struct AccountService {
    repository: Arc<Repository>,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(repository: Arc<Repository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Opens an account whose balance starts at `opening_balance`.
    pub fn open_account(
        &self,
        user_id: Uuid,
        name: &str,
        kind: AccountKind,
        currency: &str,
        opening_balance: Decimal,
        include_in_summary: bool,
    ) -> Result<Account, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::validation("account name is required"));
        }
        let currency = currency.trim().to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::validation(format!(
                "`{currency}` is not a three-letter currency code"
            )));
        }
        let mut account =
            Account::new(user_id, name, kind, currency).with_opening_balance(opening_balance);
        if !include_in_summary {
            account = account.excluded_from_summary();
        }
        let account = self.repository.transaction(|book| {
            let duplicate = book.accounts().iter().any(|existing| {
                existing.user_id == user_id && existing.name.eq_ignore_ascii_case(name)
            });
            if duplicate {
                return Err(CoreError::Conflict(format!(
                    "account `{name}` already exists"
                )));
            }
            book.insert_account(account.clone());
            Ok(account)
        })?;
        tracing::info!(account_id = %account.id, kind = %account.kind, "account opened");
        Ok(account)
    }

    pub fn add_category(
        &self,
        user_id: Uuid,
        name: &str,
        kind: CategoryKind,
    ) -> Result<Category, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::validation("category name is required"));
        }
        let category = Category::new(user_id, name, kind);
        self.repository.transaction(|book| {
            let duplicate = book.categories().iter().any(|existing| {
                existing.user_id == user_id
                    && existing.kind == kind
                    && existing.name.eq_ignore_ascii_case(name)
            });
            if duplicate {
                return Err(CoreError::Conflict(format!(
                    "category `{name}` already exists"
                )));
            }
            book.insert_category(category.clone());
            Ok(category)
        })
    }

    pub fn account(&self, id: Uuid) -> Result<Account, CoreError> {
        self.repository
            .read(|book| book.account(id).cloned())?
            .ok_or(CoreError::AccountNotFound(id))
    }

    pub fn list_accounts(&self, user_id: Uuid) -> Result<Vec<Account>, CoreError> {
        self.repository.read(|book| {
            book.accounts()
                .iter()
                .filter(|account| account.user_id == user_id)
                .cloned()
                .collect()
        })
    }

    /// Audits the committed book. An empty list means everything reconciles.
    pub fn reconcile(&self) -> Result<Vec<String>, CoreError> {
        let today = self.clock.today();
        let warnings = self.repository.read(|book| ledger_warnings(book, today))?;
        for warning in &warnings {
            tracing::warn!(%warning, "reconcile");
        }
        Ok(warnings)
    }
}
