//! tally-core
//!
//! Ledger and recurrence engine for Tally.
//! Depends on tally-domain. No CLI, no terminal I/O; persistence is reached only
//! through the [`storage::BookStorage`] trait.

pub mod account_service;
pub mod audit;
pub mod calculator;
pub mod error;
pub mod ledger_service;
pub mod recurrence_processor;
pub mod repository;
pub mod rule_service;
pub mod storage;
pub mod time;
pub mod trigger;


pub use account_service::*;
pub use calculator::RecurrenceCalculator;
pub use error::CoreError;
pub use ledger_service::*;
pub use recurrence_processor::*;
pub use repository::Repository;
pub use rule_service::*;
pub use storage::{BookStorage, MemoryStorage};
pub use time::{Clock, FixedClock, SystemClock};
pub use trigger::DailyTrigger;
