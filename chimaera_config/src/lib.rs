//! # Chimaera Configuration Core
//!
//! Remote-configurable core of the Chimaera sensor array: the persisted
//! configuration registry, the calibration engine, the introspectable OSC
//! query tree with its dispatcher, the pending address resolutions and the
//! custom expression engine.
//!
//! ## Layers
//!
//! 1. **Ports** - [`store::Eeprom`], [`context::NetInterface`],
//!    [`resolver::Resolver`], [`context::SystemControl`]
//! 2. **State** - [`registry::Config`], [`calibration::Calibration`],
//!    [`resolver::PendingResolutions`], owned by [`context::Context`]
//! 3. **Calls** - [`query`] tree, [`handlers`], [`dispatch::Dispatcher`]
//! 4. **Replies** - [`reply::Outbox`], framed by [`context::Context::flush`]
//!
//! ## Single-Threaded Loop
//!
//! Nothing in this crate locks or spawns. The runner feeds packets to the
//! dispatcher, polls the resolver port and flushes the outbox from one
//! loop; handlers mutate state only through the `&mut Context` they are
//! given.

pub mod calibration;
pub mod context;
pub mod custom;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod reply;
pub mod resolver;
pub mod sim;
pub mod store;
