//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` events. Binaries and test harnesses that
//! want to see them call [`init_tracing`] once at startup.
//!
//! `RUST_LOG` wins over the configured level, so fine-grained filters such as
//! `RUST_LOG=rust_daq_format=trace` keep working.

use crate::config::FormatConfig;
use crate::error::{AppResult, DaqError};
use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber filtered at `log_level` unless `RUST_LOG` is set.
///
/// # Errors
///
/// Returns [`DaqError::Configuration`] if the level cannot be parsed or a global
/// subscriber is already installed.
pub fn init_tracing(log_level: &str) -> AppResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .map_err(|e| DaqError::Configuration(format!("Invalid log filter: {}", e)))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| DaqError::Configuration(format!("Tracing already initialized: {}", e)))
}

/// Install the subscriber using the level from a loaded configuration.
///
/// # Errors
///
/// See [`init_tracing`].
pub fn init_from_config(config: &FormatConfig) -> AppResult<()> {
    init_tracing(&config.application.log_level)
}
