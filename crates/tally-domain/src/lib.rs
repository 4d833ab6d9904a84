//! tally-domain
//!
//! Pure domain models (Account, Category, LedgerEntry, RecurringRule, Book).
//! No I/O, no storage. Only data types, core enums and pure helpers.

pub mod account;
pub mod book;
pub mod category;
pub mod common;
pub mod entry;
pub mod rule;

pub use account::*;
pub use book::*;
pub use category::*;
pub use common::*;
pub use entry::*;
pub use rule::*;
