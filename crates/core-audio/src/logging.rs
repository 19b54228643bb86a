//! Tracing setup for processes embedding the bridge.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Builds the filter used by [`init`].
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

/// Installs a global fmt subscriber.
///
/// Returns false if a global subscriber was already installed, in which case
/// the existing one is kept.
pub fn init(config: &LoggingConfig) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
