//! tally-config
//!
//! Engine configuration model and its on-disk persistence.

pub mod error;
pub mod manager;
pub mod model;

pub use error::ConfigError;
pub use manager::{app_home, ConfigManager, HOME_ENV};
pub use model::Config;
