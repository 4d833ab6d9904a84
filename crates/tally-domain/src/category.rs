//! Categories classify income and expense entries.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::*;
use crate::entry::EntryKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub kind: CategoryKind,
}

impl Category {
    pub fn new(user_id: Uuid, name: impl Into<String>, kind: CategoryKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            kind,
        }
    }

    /// Returns `true` when entries of `kind` may be filed under this category.
    pub fn accepts(&self, kind: EntryKind) -> bool {
        matches!(
            (self.kind, kind),
            (CategoryKind::Income, EntryKind::Income) | (CategoryKind::Expense, EntryKind::Expense)
        )
    }
}

impl Identifiable for Category {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Owned for Category {
    fn user_id(&self) -> Uuid {
        self.user_id
    }
}

impl Displayable for Category {
    fn display_label(&self) -> String {
        format!("{} ({})", self.name, self.kind)
    }
}

/// Supported category types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Income,
    Expense,
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CategoryKind::Income => "Income",
            CategoryKind::Expense => "Expense",
        };
        f.write_str(label)
    }
}
