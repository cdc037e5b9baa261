//! Method handlers.
//!
//! Every invocable path of the query tree names a handler by id. Handlers
//! receive the device [`Context`], the validated [`Call`] and the reply
//! [`Outbox`], and answer with a [`Response`]:
//!
//! | response   | reply sent by the dispatcher          |
//! |------------|---------------------------------------|
//! | `Ack`      | `/success id path`                    |
//! | `Values`   | `/success id path value...`           |
//! | `Deferred` | nothing now; a continuation answers   |
//!
//! A handler error becomes `/fail id path reason`. Multi-argument sets
//! parse every argument before touching the registry.
//!
//! [`Context`]: crate::context::Context
//! [`Outbox`]: crate::reply::Outbox

pub mod calibration;
pub mod custom;
pub mod engines;
pub mod identity;
pub mod registry;
pub mod sockets;
pub mod system;
pub mod validate;

pub use registry::{Handler, HandlerId, HandlerRegistry};

use chimaera_common::osc::OscArg;

use crate::error::ConfigError;

/// Handler outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Set applied.
    Ack,
    /// Query answered.
    Values(Vec<OscArg>),
    /// Reply sent later by a continuation.
    Deferred,
}

impl Response {
    /// Single-value answer.
    pub fn value(arg: OscArg) -> Self {
        Self::Values(vec![arg])
    }
}

/// One validated call.
#[derive(Debug, Clone, Copy)]
pub struct Call<'a> {
    pub id: i32,
    /// Full request path.
    pub path: &'a str,
    /// Arguments after the call id.
    pub args: &'a [OscArg],
    /// Position inside the closest enclosing array.
    pub index: Option<usize>,
}

impl<'a> Call<'a> {
    /// Call outside any array.
    pub fn new(id: i32, path: &'a str, args: &'a [OscArg]) -> Self {
        Self {
            id,
            path,
            args,
            index: None,
        }
    }

    /// Query form: nothing but the call id.
    pub fn is_query(&self) -> bool {
        self.args.is_empty()
    }

    /// Parent path segment, e.g. `output` for `/chimaera/output/enabled`.
    pub fn parent(&self) -> Option<&'a str> {
        let mut segments = self.path.rsplit('/');
        segments.next();
        segments.next()
    }

    /// Last path segment.
    pub fn leaf(&self) -> &'a str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Argument at `index`.
    pub fn arg(&self, index: usize) -> Result<&'a OscArg, ConfigError> {
        self.args.get(index).ok_or_else(|| ConfigError::Argument {
            index,
            reason: "is missing".into(),
        })
    }

    pub fn int(&self, index: usize) -> Result<i32, ConfigError> {
        let arg = self.arg(index)?;
        arg.as_int().ok_or_else(|| type_error(index, 'i', arg.tag()))
    }

    pub fn float(&self, index: usize) -> Result<f32, ConfigError> {
        let arg = self.arg(index)?;
        arg.as_float().ok_or_else(|| type_error(index, 'f', arg.tag()))
    }

    pub fn string(&self, index: usize) -> Result<&'a str, ConfigError> {
        let arg = self.arg(index)?;
        arg.as_str().ok_or_else(|| type_error(index, 's', arg.tag()))
    }

    pub fn bool(&self, index: usize) -> Result<bool, ConfigError> {
        validate::check_bool(index, self.arg(index)?)
    }

    /// Optional integer argument.
    pub fn opt_int(&self, index: usize) -> Result<Option<i32>, ConfigError> {
        match self.args.get(index) {
            None => Ok(None),
            Some(_) => self.int(index).map(Some),
        }
    }
}

fn type_error(index: usize, expected: char, got: char) -> ConfigError {
    ConfigError::Argument {
        index,
        reason: format!("expects '{expected}' but got '{got}'"),
    }
}

/// Query or set a boolean flag.
pub(crate) fn toggle(call: &Call<'_>, flag: &mut bool) -> Result<Response, ConfigError> {
    if call.is_query() {
        return Ok(Response::value(OscArg::Int(i32::from(*flag))));
    }
    *flag = call.bool(0)?;
    Ok(Response::Ack)
}

/// First argument as an integer within `[min, max]`.
pub(crate) fn int_setting(call: &Call<'_>, min: i32, max: i32) -> Result<i32, ConfigError> {
    validate::check_int_range(call.int(0)?, min, max)
}

/// First argument as a float within `[min, max]`.
pub(crate) fn float_setting(call: &Call<'_>, min: f32, max: f32) -> Result<f32, ConfigError> {
    validate::check_float_range(call.float(0)?, min, max)
}
