//! Error types for the store module.

use thiserror::Error;
use veriown_core::CoreError;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A record the operation depends on does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Username already taken.
    #[error("username already taken: {0}")]
    DuplicateUsername(String),

    /// Contract number already issued.
    #[error("contract number already issued: {0}")]
    DuplicateContractNumber(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding the store was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// A blocking task could not complete.
    #[error("blocking task failed: {0}")]
    TaskFailed(String),

    /// A remote service behind the store did not answer.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Building a record failed before it was written.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
