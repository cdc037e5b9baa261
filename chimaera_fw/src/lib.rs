//! # Chimaera Host Runner
//!
//! Runs the Chimaera configuration core on a regular host: the EEPROM is
//! a file, the sockets are UDP, host names go through the system resolver
//! and the ADC frames are synthetic.
//!
//! # Module Structure
//!
//! - [`runner`] - Runner struct, event loop
//! - [`eeprom`] - File-backed EEPROM image
//! - [`udp`] - UDP network interface
//! - [`resolver`] - Threaded host name resolver
//! - [`system`] - Reset register and device uid
//! - [`sensors`] - Simulated sensor frames and contact mapper
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        chimaera_fw                           │
//! │  ┌────────────┐    ┌──────────────┐    ┌──────────────────┐  │
//! │  │  UdpNet    │◄──►│   Runner     │◄──►│  SimulatedSensors│  │
//! │  └────────────┘    │ (event loop) │    └──────────────────┘  │
//! │                    └──────┬───────┘                          │
//! │                           ▼                                  │
//! │          ┌─────────────────────────────────┐                 │
//! │          │ chimaera_config::Context        │                 │
//! │          │  FileEeprom  SystemResolver     │                 │
//! │          │  HostSystem                     │                 │
//! │          └─────────────────────────────────┘                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod eeprom;
pub mod error;
pub mod resolver;
pub mod runner;
pub mod sensors;
pub mod system;
pub mod udp;

pub use crate::error::RunnerError;
pub use crate::runner::{Exit, LoopStats, Runner};
