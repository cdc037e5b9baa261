//! Chimaera Common Library
//!
//! This crate provides the shared constants, the OSC message codec, reply
//! framing and address parsing used by all Chimaera workspace crates.
//!
//! # Module Structure
//!
//! - [`consts`] - Sensor counts, buffer capacities, EEPROM layout
//! - [`osc`] - OSC 1.0 message encoding/decoding
//! - [`framing`] - Datagram, length-prefixed and SLIP reply framing
//! - [`net`] - IPv4/CIDR/MAC/host address parsing and arithmetic
//! - [`config`] - Host configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! chim = { package = "chimaera_common", path = "../chimaera_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use chimaera_common::osc::{OscArg, OscMessage};
//! use chimaera_common::consts::SENSOR_N;
//! ```

pub mod config;
pub mod consts;
pub mod framing;
pub mod net;
pub mod osc;
pub mod prelude;
