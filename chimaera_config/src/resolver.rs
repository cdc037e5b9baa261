//! Address resolver port and pending-resolution table.
//!
//! Handlers register a [`Continuation`] under the hostname before issuing
//! the query; the runner polls [`Resolver::poll`] and hands completions to
//! the dispatcher, which applies the continuation and emits the deferred
//! reply.

use chimaera_common::consts::MAX_PENDING_RESOLUTIONS;
use std::net::Ipv4Addr;
use tracing::debug;

use crate::error::{ConfigError, ResolveError};
use crate::registry::SocketKind;

/// Asynchronous hostname resolver.
pub trait Resolver {
    /// Issue a query for `hostname`.
    fn query(&mut self, hostname: &str) -> Result<(), ResolveError>;

    /// Next completed query, if any.
    fn poll(&mut self) -> Option<Resolution>;
}

/// Outcome of one query. `address` is `None` on failure or timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub hostname: String,
    pub address: Option<Ipv4Addr>,
}

/// What a completed resolution updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Remote of one socket.
    Socket(SocketKind),
    /// Remotes of all service sockets.
    Host,
    /// Nothing, the address is only reported.
    Lookup,
}

/// Deferred reply of a call waiting on a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub id: i32,
    pub path: String,
    pub target: Target,
    pub port: Option<u16>,
}

/// Resolutions in flight, keyed by lowercase hostname.
#[derive(Debug)]
pub struct PendingResolutions {
    entries: heapless::Vec<(String, Continuation), MAX_PENDING_RESOLUTIONS>,
    capacity: usize,
}

impl Default for PendingResolutions {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PendingResolutions {
    /// Table admitting `capacity` concurrent resolutions, clamped to
    /// `1..=MAX_PENDING_RESOLUTIONS`.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: heapless::Vec::new(),
            capacity: capacity.clamp(1, MAX_PENDING_RESOLUTIONS),
        }
    }

    /// Admission capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resolutions in flight.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `hostname` is being resolved.
    pub fn is_pending(&self, hostname: &str) -> bool {
        let key = hostname.to_ascii_lowercase();
        self.entries.iter().any(|(name, _)| *name == key)
    }

    /// Register `continuation` under `hostname`.
    ///
    /// # Errors
    /// `ConfigError::ResolutionInProgress` if `hostname` is already pending
    /// or the table is full; existing entries are left untouched.
    pub fn insert(&mut self, hostname: &str, continuation: Continuation) -> Result<(), ConfigError> {
        if self.is_pending(hostname) || self.entries.len() >= self.capacity {
            return Err(ConfigError::ResolutionInProgress);
        }
        self.entries
            .push((hostname.to_ascii_lowercase(), continuation))
            .map_err(|_| ConfigError::ResolutionInProgress)?;
        debug!("Resolution of {} pending", hostname);
        Ok(())
    }

    /// Remove and return the continuation waiting on `hostname`.
    pub fn take(&mut self, hostname: &str) -> Option<Continuation> {
        let key = hostname.to_ascii_lowercase();
        let pos = self.entries.iter().position(|(name, _)| *name == key)?;
        Some(self.entries.swap_remove(pos).1)
    }
}
