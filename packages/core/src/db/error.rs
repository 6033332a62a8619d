//! Storage layer errors
//!
//! Failures opening the media database, preparing its connections and turning
//! stored column text back into typed values. Repository-level faults
//! (structural integrity, missing collaborators) live in
//! [`crate::services::RepositoryError`].

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to open media database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// A schema table, index or the recycle bin seed could not be created
    #[error("Failed to initialize media schema: {0}")]
    InitializationFailed(String),

    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to create database directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// A connection pragma was rejected
    #[error("Failed to apply '{pragma}': {source}")]
    PragmaFailed {
        pragma: String,
        source: libsql::Error,
    },

    /// A stored column held text that does not parse as its declared kind
    #[error("Stored {kind} '{value}' cannot be decoded: {reason}")]
    DecodeFailed {
        kind: &'static str,
        value: String,
        reason: String,
    },
}

impl DatabaseError {
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    pub fn pragma_failed(pragma: impl Into<String>, source: libsql::Error) -> Self {
        Self::PragmaFailed {
            pragma: pragma.into(),
            source,
        }
    }

    pub fn decode_failed(
        kind: &'static str,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::DecodeFailed {
            kind,
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}
