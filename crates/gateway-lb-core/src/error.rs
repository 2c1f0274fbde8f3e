//! Common error types for gateway-lb.
//!
//! This module provides shared error types that are used across multiple crates.

use crate::ids::ResourceId;
use crate::token::ResourceRef;
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur while assembling a resource graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A resource with the same identity was already registered in the stack.
    #[error("duplicate resource: {0}")]
    DuplicateResource(ResourceId),

    /// A token references a resource attribute that has no value yet.
    #[error("unresolved reference: {0}")]
    UnresolvedReference(ResourceRef),

    /// A namespaced name could not be parsed.
    #[error("invalid namespaced name: {0:?}")]
    InvalidName(String),
}
