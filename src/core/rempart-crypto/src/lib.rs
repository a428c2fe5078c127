//! # Rempart Crypto
//!
//! Algorithm vocabulary and primitive providers for Rempart.
//!
//! This crate defines:
//! - The algorithm and key type identifiers shared by every Rempart crate
//! - The [`Provider`] trait the engine dispatches primitive operations to
//! - [`SoftwareProvider`], a pure-Rust provider for the common primitives
//!
//! Nothing here knows about key ids, slots or policies; that lives in
//! `rempart-engine`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod algorithm;
pub mod error;
pub mod key_type;
pub mod provider;
pub mod software;

pub use algorithm::{
    AeadAlgorithm, AeadBase, Algorithm, AsymmetricEncryptionAlgorithm, CipherAlgorithm,
    FullLengthMac, HashAlgorithm, KdfAlgorithm, KeyAgreementAlgorithm, MacAlgorithm, MacLength,
    RawKeyAgreement, SignAlgorithm, SignHash, SignScheme,
};
pub use error::CryptoError;
pub use key_type::{EccFamily, KeyType};
pub use provider::{CipherContext, Direction, HashContext, KeyRef, MacContext, Provider};
pub use software::SoftwareProvider;
