//! Errors raised while building value objects

use thiserror::Error;

/// Result type for value-object construction
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while building or validating shared models
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A variable list element could not be read as a node id
    #[error("Invalid node id: {0}")]
    InvalidNodeId(String),

    /// Type code outside the built-in type table
    #[error("Unknown variant type code: {0}")]
    UnknownTypeCode(i64),

    /// Variant body does not match its declared type
    #[error("Variant body {body} does not match type {type_name}")]
    BodyTypeMismatch {
        type_name: &'static str,
        body: String,
    },
}
