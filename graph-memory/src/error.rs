//! Error types for graph-memory

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite error
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Backend used before `initialize` or after `close`
    #[error("Storage is not initialized")]
    NotInitialized,

    /// Unknown backend type in configuration
    #[error("Unknown storage type: {0}")]
    UnknownBackend(String),

    /// Invalid path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Migration pipeline error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Post-migration verification failure
    #[error("Migration verification failed: {0}")]
    Verification(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Create a not found error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create an unknown backend error
    pub fn unknown_backend(kind: impl Into<String>) -> Self {
        Self::UnknownBackend(kind.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a migration error
    pub fn migration(msg: impl Into<String>) -> Self {
        Self::Migration(msg.into())
    }

    /// Create a verification error
    pub fn verification(msg: impl Into<String>) -> Self {
        Self::Verification(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
