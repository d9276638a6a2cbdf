//! Error types and result types for model and query operations.
//!
//! This module provides the error taxonomy shared by every docorm crate.
//! Use [`OrmResult<T>`] as the return type for fallible operations.
//!
//! Non-fatal conditions (binding fallbacks, lossy query approximations) are
//! logged rather than returned; everything that reaches a caller is one of
//! the variants below.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when working with models,
/// connections and queries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrmError {
    /// Serialization/deserialization error when converting between models and stored records.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during connection or SDK initialization.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The requested document does not exist.
    /// The argument is the document path.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),
    /// The record violates the model schema or has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A field declared as required is missing or null.
    /// The first argument is the model path id, the second the logical field name.
    #[error("Model {0} is missing required field {1}")]
    MissingRequiredField(String, String),
    /// A path template parameter was not supplied.
    #[error("Missing parameter {param} for path template {template}")]
    MissingPathParameter {
        /// The template being resolved.
        template: String,
        /// The name of the missing parameter.
        param: String,
    },
    /// A path template or document path is malformed.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    /// Two different models were registered with the same path identifier.
    #[error("Path id {0} is already registered")]
    DuplicatePathId(String),
    /// A model referenced by a relation has not been registered.
    #[error("Model not registered: {0}")]
    ModelNotRegistered(String),
    /// No connection is registered under the given key.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),
    /// A connection is already registered under the given key.
    #[error("Connection already exists: {0}")]
    ConnectionAlreadyExists(String),
    /// The active bindings cannot perform the requested operation.
    #[error("Operation not supported: {0}")]
    Unsupported(String),
    /// A filter expands into more disjunctions than the store accepts.
    #[error("Filter expands to {0} disjunctions, the limit is {1}")]
    TooManyDisjunctions(usize, usize),
    /// The store rejected the request for lack of permission.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// The store rejected the request because a quota was exhausted.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    /// An error occurred in the underlying store SDK.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for model and query operations.
pub type OrmResult<T> = Result<T, OrmError>;

impl From<BsonError> for OrmError {
    fn from(err: BsonError) -> Self {
        OrmError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for OrmError {
    fn from(err: SerdeJsonError) -> Self {
        OrmError::Serialization(err.to_string())
    }
}
