//! Cryptographic error types.

use thiserror::Error;

/// Errors reported by a primitive provider.
///
/// These are provider-native failures; the engine translates them into its
/// own status taxonomy before they reach a caller.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The algorithm, key type or size is not implemented by this provider.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Invalid key format or size.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Output does not fit in the space the caller provided.
    #[error("buffer too small: need {needed} bytes")]
    BufferTooSmall {
        /// Number of bytes required.
        needed: usize,
    },

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Padding check failed after decryption.
    #[error("invalid padding")]
    InvalidPadding,

    /// Signature creation failed.
    #[error("signature creation failed: {0}")]
    SignatureFailed(String),

    /// Signature or tag verification failed.
    #[error("signature verification failed")]
    VerificationFailed,

    /// The entropy source could not deliver enough bytes.
    #[error("entropy source failure: {0}")]
    Entropy(String),

    /// A hardware-backed provider reported a device failure.
    #[error("hardware failure: {0}")]
    Hardware(String),
}

impl CryptoError {
    /// Shorthand for an `Unsupported` error naming the missing capability.
    pub fn unsupported(what: impl std::fmt::Display) -> Self {
        Self::Unsupported(what.to_string())
    }
}
