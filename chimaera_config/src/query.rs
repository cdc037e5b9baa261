//! Query tree.
//!
//! - [`item`] - static item, argument and constraint declarations
//! - [`tree`] - path-indexed view with JSON self-description
//! - [`definition`] - the `/chimaera` namespace

pub mod definition;
pub mod item;
pub mod tree;

pub use definition::ROOT;
pub use item::{ArgType, Constraint, Mode, QueryArgument, QueryItem, QueryValue};
pub use tree::{Entry, QueryTree};
