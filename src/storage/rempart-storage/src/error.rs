//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No record is stored under this id.
    #[error("record not found: {0:#010x}")]
    NotFound(u32),

    /// A record is already stored under this id.
    #[error("record already exists: {0:#010x}")]
    AlreadyExists(u32),

    /// Generic I/O error.
    #[error("io error: {0}")]
    Io(String),
}
