//! Storage backend trait definition.

use zeroize::Zeroizing;

use crate::error::StorageError;

/// Storage backend for persistent key records.
///
/// Records are opaque byte strings addressed by a 32-bit key id. Calls are
/// synchronous; a backend that talks to slow media should keep its own
/// internal locking short.
pub trait StorageBackend: Send + Sync {
    /// Get the record stored under `id`.
    fn get(&self, id: u32) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError>;

    /// Store a new record. Fails with [`StorageError::AlreadyExists`] rather
    /// than overwriting.
    fn put(&self, id: u32, record: &[u8]) -> Result<(), StorageError>;

    /// Delete the record stored under `id`.
    fn delete(&self, id: u32) -> Result<(), StorageError>;

    /// List the ids of all stored records in ascending order.
    fn list(&self) -> Result<Vec<u32>, StorageError>;

    /// Check if a record exists.
    fn exists(&self, id: u32) -> Result<bool, StorageError> {
        Ok(self.get(id)?.is_some())
    }
}
