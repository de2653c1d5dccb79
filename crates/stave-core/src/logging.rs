//! Tracing setup for applications embedding the engine

use crate::config::VcsConfig;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber writing to stderr
///
/// `RUST_LOG` wins over `default_filter`. Returns false if a global
/// subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

/// [`init_tracing`] with the configured filter
pub fn init_from_config(config: &VcsConfig) -> bool {
    init_tracing(&config.log_filter)
}
