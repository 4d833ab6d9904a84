#![doc(test(attr(deny(warnings))))]

//! Tally keeps account balances and their ledger entries consistent and fires
//! recurring rules on schedule. This crate wires the engine crates together
//! and hosts the `tally` command line.

pub mod app;
pub mod cli;
pub mod errors;
pub mod utils;

pub use app::Engine;
pub use errors::AppError;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing with the default filter.
pub fn init() {
    init_with_filter(None);
}

/// Initializes global tracing, using `filter` when `RUST_LOG` is unset.
/// Only the first call has any effect.
pub fn init_with_filter(filter: Option<&str>) {
    INIT_TRACING.call_once(|| {
        utils::init_tracing(filter);
        tracing::info!(
            version = utils::build_info::CLI_VERSION,
            "Tally tracing initialized."
        );
    });
}
