//! # Rempart Engine
//!
//! Key store and operation dispatcher of a PSA-style cryptography service.
//!
//! ## Features
//!
//! - Key slot table with shared reader locks; in-use keys cannot be destroyed
//! - Usage and algorithm policies, with policy intersection on copy
//! - Transactional key creation (import, generate, copy, derive)
//! - Persistent keys through a pluggable storage backend
//! - Hash, MAC, cipher, AEAD, signature, asymmetric encryption, key
//!   agreement and key derivation (HKDF, TLS 1.2 PRF, TLS 1.2 PSK-to-MS)
//! - A random generator seeded from the provider's entropy source
//!
//! Primitives are computed by a [`rempart_crypto::Provider`]; this crate
//! only owns key material, policies and operation state.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rempart_crypto::{AeadAlgorithm, AeadBase, KeyType, SoftwareProvider};
//! use rempart_engine::{Engine, EngineConfig, KeyAttributes, Usage};
//!
//! # fn main() -> Result<(), rempart_engine::EngineError> {
//! let engine = Engine::new(EngineConfig::default(), Arc::new(SoftwareProvider::new()))?;
//! engine.init()?;
//!
//! let gcm = AeadAlgorithm::new(AeadBase::Gcm);
//! let attrs = KeyAttributes::new()
//!     .with_type(KeyType::Aes)
//!     .with_bits(128)
//!     .with_usage(Usage::ENCRYPT | Usage::DECRYPT)
//!     .with_algorithm(gcm);
//! let key = engine.generate_key(&attrs)?;
//!
//! let mut sealed = [0u8; 21];
//! engine.aead_encrypt(key, gcm, &[0u8; 12], b"", b"hello", &mut sealed)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aead;
pub mod agreement;
pub mod asymmetric;
pub mod attributes;
pub mod cipher;
pub mod config;
mod creation;
pub mod derivation;
pub mod engine;
pub mod error;
pub mod hash;
pub mod keys;
pub mod mac;
mod persistence;
pub mod policy;
pub mod random;
pub mod sign;
pub mod slots;
pub mod staging;

#[cfg(test)]
mod test_support;

pub use attributes::{KeyAttributes, KeyId, KeyPolicy, Lifetime, Location, Persistence, Usage};
pub use cipher::CipherOperation;
pub use config::{EngineConfig, MAX_KEY_BITS};
pub use derivation::{DerivationStep, KeyDerivationOperation};
pub use engine::Engine;
pub use error::EngineError;
pub use hash::HashOperation;
pub use keys::validate_unstructured_key_bits;
pub use mac::MacOperation;
pub use random::RandomGenerator;
pub use slots::{KeyData, KeyLock, KeySlotStore};
