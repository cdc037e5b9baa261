//! Error types of the configuration core.
//!
//! Every error ends up as the reason string of a `/fail` reply, so the
//! `Display` texts are part of the remote interface.

use chimaera_common::framing::FrameError;
use chimaera_common::net::AddrError;
use chimaera_common::osc::OscError;
use thiserror::Error;

use crate::custom::CompileError;

/// EEPROM access and image decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Access beyond the device capacity.
    #[error("access of {len} bytes at 0x{offset:04x} exceeds capacity 0x{capacity:04x}")]
    OutOfBounds {
        /// Start offset
        offset: usize,
        /// Access length
        len: usize,
        /// Device capacity
        capacity: usize,
    },

    /// Stored image carries a different version header.
    #[error("image version mismatch")]
    VersionMismatch,

    /// Image could not be encoded or decoded.
    #[error("image codec failure: {0}")]
    Codec(String),

    /// Encoded image does not fit its region.
    #[error("image of {size} bytes exceeds region of {region} bytes")]
    ImageTooLarge {
        /// Encoded size
        size: usize,
        /// Region size
        region: usize,
    },

    /// Backing device failed.
    #[error("device failure: {0}")]
    Device(String),
}

/// Network interface errors reported by the socket layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    /// Socket could not be opened.
    #[error("socket {kind} could not be opened: {reason}")]
    Open {
        /// Socket kind name
        kind: &'static str,
        /// Underlying failure
        reason: String,
    },

    /// Socket is not open.
    #[error("socket {0} is not open")]
    NotOpen(&'static str),

    /// Sending failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Interface configuration failed.
    #[error("interface configuration failed: {0}")]
    Interface(String),
}

/// Address resolver errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Query could not be issued.
    #[error("query for {0} could not be issued")]
    QueryFailed(String),
}

/// Failures of configuration handlers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Numeric value outside its inclusive range.
    #[error("value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Offending value
        value: String,
        /// Lower bound
        min: String,
        /// Upper bound
        max: String,
    },

    /// String exceeds its buffer.
    #[error("string of {len} characters exceeds maximum of {max}")]
    TooLong {
        /// Supplied length
        len: usize,
        /// Maximum length
        max: usize,
    },

    /// Value not among the enumerated ones.
    #[error("value {value} is not one of [{allowed}]")]
    NotAllowed {
        /// Offending value
        value: String,
        /// Allowed values, comma separated
        allowed: String,
    },

    /// Argument missing or of the wrong type.
    #[error("argument {index} {reason}")]
    Argument {
        /// Zero-based argument position after the call id
        index: usize,
        /// What is wrong with it
        reason: String,
    },

    /// Value rejected for a handler-specific reason.
    #[error("{0}")]
    Invalid(String),

    /// Address syntax error.
    #[error(transparent)]
    Address(#[from] AddrError),

    /// A resolution is already pending.
    #[error("resolution already in progress")]
    ResolutionInProgress,

    /// A resolution completed without an address.
    #[error("resolution of {0} failed or timed out")]
    ResolutionFailed(String),

    /// Resolver refused the query.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Socket hook failure.
    #[error(transparent)]
    Net(#[from] NetError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Custom expression rejected.
    #[error("parse error: {0}")]
    Compile(#[from] CompileError),

    /// No free link-local address found.
    #[error("no free link-local address found after {0} probes")]
    LinkLocalExhausted(usize),
}

impl ConfigError {
    /// Range error from displayable bounds.
    pub fn out_of_range(
        value: impl std::fmt::Display,
        min: impl std::fmt::Display,
        max: impl std::fmt::Display,
    ) -> Self {
        Self::OutOfRange {
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }
}

/// Call-shape failures detected by the dispatcher.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// Packet could not be decoded.
    #[error("format error: {0}")]
    Decode(#[from] OscError),

    /// First argument is not an `i` call id.
    #[error("format error: missing or invalid call identifier")]
    MissingId,

    /// Introspection path not in the tree.
    #[error("unknown query for path")]
    UnknownQuery,

    /// Call path is not a method.
    #[error("unknown method for path or format")]
    UnknownMethod,

    /// Arguments do not match the declaration.
    #[error("callback, format or range invalid: {0}")]
    Invalid(ConfigError),

    /// Reply does not fit the reply buffer.
    #[error("reply exceeds buffer: {0}")]
    Oversized(FrameError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_text_names_bounds() {
        let err = ConfigError::out_of_range(11, 1, 10);
        assert_eq!(err.to_string(), "value 11 is out of range [1, 10]");
    }

    #[test]
    fn dispatch_texts() {
        assert_eq!(
            DispatchError::MissingId.to_string(),
            "format error: missing or invalid call identifier"
        );
        assert_eq!(
            DispatchError::Invalid(ConfigError::out_of_range(0, 1, 10)).to_string(),
            "callback, format or range invalid: value 0 is out of range [1, 10]"
        );
    }

    #[test]
    fn address_errors_are_transparent() {
        let err: ConfigError = AddrError::UnsupportedHost("x".into()).into();
        assert_eq!(err.to_string(), "can only resolve raw IP and mDNS addresses");
    }
}
