//! Runner error type.

use chimaera_config::error::StoreError;
use thiserror::Error;

/// Failures that stop the host runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Host configuration file rejected.
    #[error("configuration error: {0}")]
    Config(#[from] chimaera_common::config::ConfigError),

    /// EEPROM backing file unusable.
    #[error("EEPROM error: {0}")]
    Store(#[from] StoreError),
}
