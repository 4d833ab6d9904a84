use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),
    #[error("Category not found: {0}")]
    CategoryNotFound(Uuid),
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(Uuid),
    #[error("Recurring rule not found: {0}")]
    RuleNotFound(Uuid),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Persistence failure: {0}")]
    Persistence(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    /// Collapses storage-level failures into [`CoreError::Persistence`].
    pub fn into_persistence(self) -> Self {
        match self {
            CoreError::Persistence(_) => self,
            other => CoreError::Persistence(other.to_string()),
        }
    }
}
