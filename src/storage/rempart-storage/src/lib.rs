//! # Rempart Storage
//!
//! Persistence layer for Rempart key records.
//!
//! Provides the [`StorageBackend`] trait the engine writes persistent keys
//! through, and [`MemoryBackend`], a process-local implementation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod memory;

pub use backend::StorageBackend;
pub use error::StorageError;
pub use memory::MemoryBackend;
