//! Prelude module for common re-exports.
//!
//! ```rust
//! use chimaera_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, HostConfig, LogLevel, SharedConfig};

// ─── Device Constants ───────────────────────────────────────────────
pub use crate::consts::{CALIBRATION_SLOTS, REPLY_BUFFER_SIZE, ROOT_PATH, SENSOR_N};

// ─── Wire ───────────────────────────────────────────────────────────
pub use crate::framing::{FrameError, Framing, frame_message};
pub use crate::net::{AddrError, HostSpec};
pub use crate::osc::{OscArg, OscError, OscMessage};

/// Default sensor frame period at the compiled-in sample rate of 2 kHz.
pub const DEFAULT_FRAME_PERIOD: Duration = Duration::from_micros(500);
