//! Unit-of-work boundary around the committed book.

use std::sync::{Mutex, MutexGuard};

use tally_domain::Book;

use crate::{storage::BookStorage, CoreError};

/// Serialises units of work against a single committed [`Book`].
///
/// Each [`Repository::transaction`] runs against a private copy of the book.
/// The copy replaces the committed state only after the storage backend has
/// accepted it; an error anywhere discards the copy.
pub struct Repository {
    storage: Box<dyn BookStorage>,
    committed: Mutex<Book>,
}

impl Repository {
    /// Opens the repository, starting from an empty book when storage has none.
    pub fn open(storage: Box<dyn BookStorage>) -> Result<Self, CoreError> {
        let book = storage.load()?.unwrap_or_default();
        tracing::debug!(
            accounts = book.accounts.len(),
            entries = book.entries.len(),
            rules = book.rules.len(),
            "book loaded"
        );
        Ok(Self {
            storage,
            committed: Mutex::new(book),
        })
    }

    /// Runs `work` atomically: either every mutation it makes is committed and
    /// persisted, or none is.
    pub fn transaction<T, F>(&self, work: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut Book) -> Result<T, CoreError>,
    {
        let mut committed = self.lock()?;
        let mut working = committed.clone();
        let value = work(&mut working)?;
        working.touch();
        if let Err(err) = self.storage.save(&working) {
            tracing::error!(error = %err, "commit failed, rolling back");
            return Err(err.into_persistence());
        }
        *committed = working;
        Ok(value)
    }

    /// Runs a read-only closure against the committed book.
    pub fn read<T, F>(&self, query: F) -> Result<T, CoreError>
    where
        F: FnOnce(&Book) -> T,
    {
        let committed = self.lock()?;
        Ok(query(&committed))
    }

    /// Clones the committed book.
    pub fn snapshot(&self) -> Result<Book, CoreError> {
        self.read(Book::clone)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Book>, CoreError> {
        self.committed
            .lock()
            .map_err(|_| CoreError::Persistence("repository lock poisoned".into()))
    }
}
