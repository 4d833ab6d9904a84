//! Process-level wiring: one repository, one clock and the services over them.

use std::{path::PathBuf, sync::Arc};

use tally_config::Config;
use tally_core::{
    AccountService, BookStorage, Clock, DailyTrigger, LedgerService, RecurrenceProcessor,
    Repository, RuleService, SystemClock,
};
use tally_storage_json::{JsonBookStorage, StoragePaths};

use crate::AppError;

/// The engine's services, built once per process over a shared repository.
pub struct Engine {
    config: Config,
    data_dir: PathBuf,
    clock: Arc<dyn Clock>,
    accounts: AccountService,
    ledger: LedgerService,
    rules: RuleService,
    processor: RecurrenceProcessor,
}

impl Engine {
    /// Opens the JSON book under the configured data directory with a system
    /// clock in the configured UTC offset.
    pub fn open(config: Config) -> Result<Self, AppError> {
        config.validate()?;
        let data_dir = config.resolve_data_dir();
        let storage = JsonBookStorage::with_retention(
            StoragePaths::under(&data_dir),
            config.backup_retention,
        )?;
        let clock = Arc::new(SystemClock::new(config.offset()?));
        tracing::debug!(data_dir = %data_dir.display(), "opening book");
        Self::with_parts(config, data_dir, Box::new(storage), clock)
    }

    /// Builds the engine over caller-supplied storage and clock.
    pub fn with_parts(
        config: Config,
        data_dir: PathBuf,
        storage: Box<dyn BookStorage>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let repository = Arc::new(Repository::open(storage)?);
        Ok(Self {
            accounts: AccountService::new(repository.clone(), clock.clone()),
            ledger: LedgerService::new(repository.clone(), clock.clone()),
            rules: RuleService::new(repository.clone(), clock.clone()),
            processor: RecurrenceProcessor::new(repository, clock.clone()),
            clock,
            config,
            data_dir,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    pub fn rules(&self) -> &RuleService {
        &self.rules
    }

    pub fn processor(&self) -> &RecurrenceProcessor {
        &self.processor
    }

    pub fn trigger(&self) -> Result<DailyTrigger, AppError> {
        Ok(DailyTrigger::new(
            self.config.run_at_time()?,
            self.config.offset()?,
        ))
    }
}
