pub mod build_info;

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the config names one.
pub const DEFAULT_LOG_FILTER: &str = "tally=info,tally_core=info";

/// Installs the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init_tracing(configured: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured.unwrap_or(DEFAULT_LOG_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // A subscriber installed by an embedding application wins.
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
