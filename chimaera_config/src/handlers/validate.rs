//! Argument validators.
//!
//! Used by the dispatcher against the declared arguments of a method, and
//! by handlers for checks the declaration cannot express.

use chimaera_common::osc::OscArg;

use crate::error::ConfigError;
use crate::query::item::{ArgType, Constraint, QueryArgument, QueryValue};

/// Coerce `i` (non-zero is true), `T` or `F` to a flag.
pub fn check_bool(index: usize, arg: &OscArg) -> Result<bool, ConfigError> {
    match arg {
        OscArg::Int(v) => Ok(*v != 0),
        OscArg::True => Ok(true),
        OscArg::False => Ok(false),
        other => Err(ConfigError::Argument {
            index,
            reason: format!("expects one of 'iTF' but got '{}'", other.tag()),
        }),
    }
}

/// Inclusive integer range.
pub fn check_int_range(value: i32, min: i32, max: i32) -> Result<i32, ConfigError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::out_of_range(value, min, max))
    }
}

/// Inclusive float range. NaN is never in range.
pub fn check_float_range(value: f32, min: f32, max: f32) -> Result<f32, ConfigError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::out_of_range(value, min, max))
    }
}

/// String of at most `max` bytes.
pub fn check_string_len(value: &str, max: usize) -> Result<&str, ConfigError> {
    if value.len() <= max {
        Ok(value)
    } else {
        Err(ConfigError::TooLong {
            len: value.len(),
            max,
        })
    }
}

/// Value among the enumerated ones.
pub fn check_values(arg: &OscArg, values: &[QueryValue]) -> Result<(), ConfigError> {
    if values.iter().any(|v| v.matches(arg)) {
        return Ok(());
    }
    let value = match arg {
        OscArg::Int(v) => v.to_string(),
        OscArg::Str(s) => s.clone(),
        other => other.tag().to_string(),
    };
    let allowed = values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Err(ConfigError::NotAllowed { value, allowed })
}

/// Check one supplied argument against its declaration.
pub fn check_argument(index: usize, decl: &QueryArgument, arg: &OscArg) -> Result<(), ConfigError> {
    if !decl.ty.accepts(arg) {
        return Err(ConfigError::Argument {
            index,
            reason: format!("expects one of '{}' but got '{}'", decl.ty.tags(), arg.tag()),
        });
    }

    match (decl.constraint, arg) {
        (None, _) => Ok(()),
        (Some(Constraint::Values(values)), arg) => check_values(arg, values),
        (Some(Constraint::Range { min, max, .. }), OscArg::Int(v)) if decl.ty == ArgType::Int32 => {
            let v = f64::from(*v);
            in_range(v, min, max)
        }
        (Some(Constraint::Range { min, max, .. }), OscArg::Float(v)) => in_range(f64::from(*v), min, max),
        (Some(Constraint::Range { min, max, .. }), OscArg::Double(v)) => in_range(*v, min, max),
        (Some(Constraint::Range { max, .. }), OscArg::Str(s)) => check_string_len(s, max as usize).map(|_| ()),
        (Some(Constraint::Range { .. }), _) => Ok(()),
    }
}

fn in_range(value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(value, min, max))
    }
}
