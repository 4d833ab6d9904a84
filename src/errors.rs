use thiserror::Error;

use tally_config::ConfigError;
use tally_core::CoreError;

/// Errors surfaced by the `tally` binary and [`crate::Engine`].
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
