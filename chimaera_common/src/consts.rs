//! Device-wide constants for the Chimaera workspace.
//!
//! Single source of truth for sensor counts, buffer capacities and the
//! EEPROM layout. Imported by all crates.

use static_assertions::const_assert;

// ─── Firmware Identity ──────────────────────────────────────────────

/// Magic byte leading every persisted image.
pub const CONFIG_MAGIC: u8 = 0x2b;

/// Firmware version triplet `(major, minor, patch)`.
pub const FIRMWARE_VERSION: (u8, u8, u8) = (0, 1, 0);

/// Board revision the firmware is compiled for.
pub const BOARD_REVISION: u8 = 3;

// ─── Sensor Array ───────────────────────────────────────────────────

/// Number of analog sensors (16 multiplexer channels x 10 ADC units).
pub const SENSOR_N: usize = 160;

/// ADC resolution in bits.
pub const ADC_BITDEPTH: u8 = 12;

/// Half-scale ADC reading (quiescent output of an unloaded sensor).
pub const ADC_HALF_BITDEPTH: u16 = 0x7ff;

/// Fixed-point shift of the quiescent moving-average window (16 samples).
pub const QUIESCENT_SHIFT: u8 = 4;

// ─── Registry Capacities ────────────────────────────────────────────

/// Capacity of device name buffers, including the terminator slot.
pub const NAME_LENGTH: usize = 16;

/// Number of custom expression items.
pub const CUSTOM_MAX_EXPR: usize = 8;

/// Capacity of a custom item output path.
pub const CUSTOM_PATH_LEN: usize = 32;

/// Capacity of a custom item expression source.
pub const CUSTOM_EXPR_LEN: usize = 32;

/// Maximum stack depth of a compiled custom expression.
pub const CUSTOM_STACK_DEPTH: usize = 8;

/// Maximum number of instructions in a compiled custom expression.
pub const CUSTOM_PROGRAM_LEN: usize = 16;

/// Number of calibration slots in EEPROM.
pub const CALIBRATION_SLOTS: u8 = 4;

/// Upper bound of the pending-resolution table.
pub const MAX_PENDING_RESOLUTIONS: usize = 4;

// ─── EEPROM Layout ──────────────────────────────────────────────────

/// Total EEPROM capacity in bytes (24LC512).
pub const EEPROM_SIZE: usize = 0x10000;

/// Offset of the configuration image.
pub const EEPROM_CONFIG_OFFSET: usize = 0x0000;

/// Bytes reserved for the configuration image.
pub const EEPROM_CONFIG_REGION: usize = 0x1000;

/// Offset of calibration slot 0.
pub const EEPROM_RANGE_OFFSET: usize = EEPROM_CONFIG_OFFSET + EEPROM_CONFIG_REGION;

/// Distance between consecutive calibration slots.
pub const EEPROM_RANGE_STRIDE: usize = 0x1400;

const_assert!(EEPROM_RANGE_OFFSET + CALIBRATION_SLOTS as usize * EEPROM_RANGE_STRIDE <= EEPROM_SIZE);

// ─── Protocol ───────────────────────────────────────────────────────

/// Root of the configuration namespace.
pub const ROOT_PATH: &str = "/chimaera";

/// Trailing character that turns a path into an introspection query.
pub const QUERY_SENTINEL: char = '!';

/// Path of success replies.
pub const SUCCESS_PATH: &str = "/success";

/// Path of failure replies.
pub const FAIL_PATH: &str = "/fail";

/// Capacity of one serialized reply, including framing overhead.
pub const REPLY_BUFFER_SIZE: usize = 2048;

/// Domain suffix resolved through multicast DNS.
pub const LOCAL_DOMAIN: &str = ".local";
