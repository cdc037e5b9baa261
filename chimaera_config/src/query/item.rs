//! Static query tree items.
//!
//! The whole namespace is a `'static` tree of [`QueryItem`]s built from
//! `const` constructors. Methods name their handler by [`HandlerId`]; the
//! dispatcher resolves ids through a [`HandlerRegistry`] at startup.
//!
//! [`HandlerRegistry`]: crate::handlers::HandlerRegistry

use chimaera_common::osc::OscArg;
use serde::Serialize;
use std::fmt;

use crate::handlers::HandlerId;

/// Declared type of one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgType {
    /// `i` (non-zero is true), `T` or `F`.
    Bool,
    /// `i`
    Int32,
    /// `f`
    Float,
    /// `s`
    String,
    /// `t`, `f` or `d` seconds.
    Timestamp,
}

impl ArgType {
    /// Type tags accepted for this type.
    pub const fn tags(self) -> &'static str {
        match self {
            Self::Bool => "iTF",
            Self::Int32 => "i",
            Self::Float => "f",
            Self::String => "s",
            Self::Timestamp => "tfd",
        }
    }

    /// Whether `arg` can carry a value of this type.
    pub fn accepts(self, arg: &OscArg) -> bool {
        self.tags().contains(arg.tag())
    }
}

/// Access mode of one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    R,
    W,
    RW,
}

impl Mode {
    /// Whether the value is returned by the query form.
    pub const fn readable(self) -> bool {
        matches!(self, Self::R | Self::RW)
    }

    /// Whether the value is accepted by the set form.
    pub const fn writable(self) -> bool {
        matches!(self, Self::W | Self::RW)
    }
}

/// One enumerated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Str(&'static str),
    Int(i32),
}

impl QueryValue {
    /// Whether `arg` equals this value.
    pub fn matches(&self, arg: &OscArg) -> bool {
        match (self, arg) {
            (Self::Str(s), OscArg::Str(v)) => s == v,
            (Self::Int(i), OscArg::Int(v)) => i == v,
            _ => false,
        }
    }
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

/// Value constraint. On strings a range bounds the length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Constraint {
    Range { min: f64, max: f64, step: f64 },
    Values(&'static [QueryValue]),
}

/// Declaration of one method argument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueryArgument {
    #[serde(rename = "type")]
    pub ty: ArgType,
    pub description: &'static str,
    pub mode: Mode,
    pub optional: bool,
    #[serde(flatten)]
    pub constraint: Option<Constraint>,
}

impl QueryArgument {
    pub const fn new(ty: ArgType, mode: Mode, description: &'static str) -> Self {
        Self {
            ty,
            description,
            mode,
            optional: false,
            constraint: None,
        }
    }

    /// May be omitted by the set form.
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Inclusive numeric range, or length range on strings.
    pub const fn range(mut self, min: f64, max: f64, step: f64) -> Self {
        self.constraint = Some(Constraint::Range { min, max, step });
        self
    }

    /// Enumerated values.
    pub const fn values(mut self, values: &'static [QueryValue]) -> Self {
        self.constraint = Some(Constraint::Values(values));
        self
    }
}

/// Node of the query tree.
#[derive(Debug, Clone, Copy)]
pub enum QueryItem {
    /// Named group of items.
    Node {
        name: &'static str,
        description: &'static str,
        items: &'static [QueryItem],
    },
    /// `size` indexed copies of `item`, addressed as `path/{i}`. The array
    /// itself is not invocable.
    Array {
        name: &'static str,
        description: &'static str,
        size: usize,
        item: &'static QueryItem,
    },
    /// Invocable leaf.
    Method {
        name: &'static str,
        description: &'static str,
        handler: HandlerId,
        args: &'static [QueryArgument],
    },
}

impl QueryItem {
    pub const fn node(name: &'static str, description: &'static str, items: &'static [QueryItem]) -> Self {
        Self::Node {
            name,
            description,
            items,
        }
    }

    pub const fn array(
        name: &'static str,
        description: &'static str,
        size: usize,
        item: &'static QueryItem,
    ) -> Self {
        Self::Array {
            name,
            description,
            size,
            item,
        }
    }

    pub const fn method(
        name: &'static str,
        description: &'static str,
        handler: &'static str,
        args: &'static [QueryArgument],
    ) -> Self {
        Self::Method {
            name,
            description,
            handler: HandlerId::new(handler),
            args,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Node { name, .. } | Self::Array { name, .. } | Self::Method { name, .. } => *name,
        }
    }

    pub const fn description(&self) -> &'static str {
        match self {
            Self::Node { description, .. }
            | Self::Array { description, .. }
            | Self::Method { description, .. } => *description,
        }
    }
}
