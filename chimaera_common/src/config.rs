//! Host configuration loading traits and types.
//!
//! Device parameters live in the registry of `chimaera_config`; this
//! module only covers the TOML file read by the host runner.
//!
//! # Usage
//!
//! ```rust,no_run
//! use chimaera_common::config::{ConfigLoader, HostConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = HostConfig::load(Path::new("chimaera.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::consts::MAX_PENDING_RESOLUTIONS;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about device operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared by every Chimaera host binary.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "chimaera-sim-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[device]` section of the host runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSection {
    /// File backing the emulated EEPROM.
    #[serde(default = "default_eeprom_path")]
    pub eeprom_path: PathBuf,

    /// Local address the service sockets bind to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Capacity of the pending address resolution table.
    #[serde(default = "default_max_pending")]
    pub max_pending_resolutions: usize,

    /// Event loop poll interval in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Feed synthetic ADC frames into the sensor pipeline.
    #[serde(default)]
    pub simulate_sensors: bool,
}

fn default_eeprom_path() -> PathBuf {
    PathBuf::from("chimaera.eeprom")
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_max_pending() -> usize {
    1
}

fn default_poll_interval() -> u64 {
    1
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            eeprom_path: default_eeprom_path(),
            bind_address: default_bind_address(),
            max_pending_resolutions: default_max_pending(),
            poll_interval_ms: default_poll_interval(),
            simulate_sensors: false,
        }
    }
}

/// Full host runner configuration file.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "chimaera"
///
/// [device]
/// eeprom_path = "/var/lib/chimaera/eeprom.bin"
/// max_pending_resolutions = 1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Shared fields.
    pub shared: SharedConfig,

    /// Device emulation parameters.
    #[serde(default)]
    pub device: DeviceSection,
}

impl HostConfig {
    /// Validate all sections.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    /// - `max_pending_resolutions` is 0 or above `MAX_PENDING_RESOLUTIONS`
    /// - `bind_address` is not an IPv4 address
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let pending = self.device.max_pending_resolutions;
        if pending == 0 || pending > MAX_PENDING_RESOLUTIONS {
            return Err(ConfigError::ValidationError(format!(
                "max_pending_resolutions must be in 1..={MAX_PENDING_RESOLUTIONS}, got {pending}"
            )));
        }

        if self.device.bind_address.parse::<std::net::Ipv4Addr>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "bind_address '{}' is not an IPv4 address",
                self.device.bind_address
            )));
        }
        Ok(())
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig {
                log_level: LogLevel::Info,
                service_name: "chimaera".to_string(),
            },
            device: DeviceSection::default(),
        }
    }
}

/// Trait for loading configuration from TOML files.
///
/// Implemented for every type implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
