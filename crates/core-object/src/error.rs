//! Error types for object identity operations

use thiserror::Error;

use crate::id::ObjectId;

/// Result type for object operations
pub type Result<T> = std::result::Result<T, ObjectError>;

/// Errors that can occur while parsing or resolving objects
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// Text is not a valid `a-b-c-d` hex id
    #[error("Invalid object id {text:?}: {reason}")]
    InvalidId { text: String, reason: String },

    /// Type tag does not name a known object type
    #[error("Unknown object type {0}")]
    UnknownType(u16),

    /// No object with this id exists
    #[error("No such object {0}")]
    NoSuchObject(ObjectId),

    /// No type handler is registered for this id's type
    #[error("No type handler for object {0}")]
    NoHandler(ObjectId),
}
