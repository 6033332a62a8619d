//! Service Layer Error Types
//!
//! This module defines the error type of repository operations. Absence of a
//! row is never an error here: lookups return `Ok(None)` or an empty vector.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;

/// Repository operation errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database operation failed
    #[error("Database operation failed: {0}")]
    Database(DatabaseError),

    /// A computed path or a batch materialization lost its consistency.
    /// Always fatal; the enclosing write is rolled back.
    #[error("Structural integrity fault: {context}")]
    StructuralIntegrity { context: String },

    /// A stored content type id has no descriptor
    #[error("Content type not found: {id}")]
    ContentTypeNotFound { id: i64 },

    /// A required collaborator was not supplied at construction
    #[error("Missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// Media item not found where one is required (e.g. a parent)
    #[error("Media not found: {id}")]
    MediaNotFound { id: i64 },

    /// Operation not allowed in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Entity validation failed
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Stored data could not be decoded
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// An external collaborator (content type provider, serializer) failed
    #[error("Collaborator failed: {0}")]
    Collaborator(anyhow::Error),
}

impl RepositoryError {
    /// Create a structural integrity fault
    pub fn structural(context: impl Into<String>) -> Self {
        Self::StructuralIntegrity {
            context: context.into(),
        }
    }

    /// Create a media not found error
    pub fn media_not_found(id: i64) -> Self {
        Self::MediaNotFound { id }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Create an invalid data error
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Whether this is a structural integrity fault
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::StructuralIntegrity { .. })
    }
}

impl From<DatabaseError> for RepositoryError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::DecodeFailed { .. } => Self::InvalidData(err.to_string()),
            other => Self::Database(other),
        }
    }
}

impl From<libsql::Error> for RepositoryError {
    fn from(err: libsql::Error) -> Self {
        Self::Database(DatabaseError::LibsqlError(err))
    }
}
