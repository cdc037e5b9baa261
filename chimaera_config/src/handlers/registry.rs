//! Handler registry.
//!
//! Maps the handler ids named by the query tree to handler functions.
//! Constructed at startup and handed to the dispatcher by value.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use super::{Call, Response};
use crate::context::Context;
use crate::error::ConfigError;
use crate::reply::Outbox;

/// Name of a handler, as referenced by a tree method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct HandlerId(&'static str);

impl HandlerId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Handler function.
pub type Handler = fn(&mut Context, &Call<'_>, &mut Outbox) -> Result<Response, ConfigError>;

/// Registry of handler functions.
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry holding every built-in handler.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        super::identity::register(&mut registry);
        super::sockets::register(&mut registry);
        super::engines::register(&mut registry);
        super::system::register(&mut registry);
        super::calibration::register(&mut registry);
        super::custom::register(&mut registry);
        registry
    }

    /// Register a handler.
    ///
    /// # Panics
    /// Panics if a handler with the same name is already registered.
    pub fn register(&mut self, name: &'static str, handler: Handler) {
        if self.handlers.contains_key(name) {
            panic!("Handler '{name}' is already registered");
        }
        self.handlers.insert(name, handler);
    }

    /// Handler registered under `id`.
    pub fn get(&self, id: HandlerId) -> Option<Handler> {
        self.handlers.get(id.name()).copied()
    }

    /// All registered names.
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
