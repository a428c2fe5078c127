//! In-memory storage backend.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;
use zeroize::Zeroizing;

use crate::backend::StorageBackend;
use crate::error::StorageError;

/// Storage backend keeping records in process memory.
///
/// Records are zeroized when deleted or when the backend is dropped.
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<BTreeMap<u32, Zeroizing<Vec<u8>>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.read().map(|records| records.len()).unwrap_or(0)
    }

    /// Whether no record is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<u32, Zeroizing<Vec<u8>>>>, StorageError> {
        self.records
            .read()
            .map_err(|_| StorageError::Io("storage lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, BTreeMap<u32, Zeroizing<Vec<u8>>>>, StorageError> {
        self.records
            .write()
            .map_err(|_| StorageError::Io("storage lock poisoned".to_string()))
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("records", &self.len())
            .finish()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, id: u32) -> Result<Option<Zeroizing<Vec<u8>>>, StorageError> {
        Ok(self.read()?.get(&id).cloned())
    }

    fn put(&self, id: u32, record: &[u8]) -> Result<(), StorageError> {
        let mut records = self.write()?;
        if records.contains_key(&id) {
            return Err(StorageError::AlreadyExists(id));
        }
        records.insert(id, Zeroizing::new(record.to_vec()));
        debug!(id, len = record.len(), "Record stored");
        Ok(())
    }

    fn delete(&self, id: u32) -> Result<(), StorageError> {
        match self.write()?.remove(&id) {
            Some(_) => {
                debug!(id, "Record deleted");
                Ok(())
            }
            None => Err(StorageError::NotFound(id)),
        }
    }

    fn list(&self) -> Result<Vec<u32>, StorageError> {
        Ok(self.read()?.keys().copied().collect())
    }

    fn exists(&self, id: u32) -> Result<bool, StorageError> {
        Ok(self.read()?.contains_key(&id))
    }
}
