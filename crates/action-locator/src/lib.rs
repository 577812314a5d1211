//! Node locator - element resolution against a tree host
//!
//! This crate turns predicates into node handles:
//! - Structural selectors (tag, class, id, attribute)
//! - Exact trimmed-text matching, optionally scoped by a selector
//! - Identity lookup by `id`
//!
//! Every lookup returns a snapshot taken at call time, so callers can iterate
//! results while the tree keeps mutating.

pub mod errors;
pub mod resolver;
pub mod types;

pub use errors::*;
pub use resolver::*;
pub use types::*;
