//! Engine status codes.

use rempart_crypto::CryptoError;
use rempart_storage::StorageError;
use thiserror::Error;

/// Status returned by every fallible engine call.
///
/// This is a flat taxonomy: provider and storage failures are translated
/// into it at the boundary and never surface in their native form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum EngineError {
    /// Malformed algorithm, key type or size combination, or a bad parameter.
    #[error("invalid argument")]
    InvalidArgument,

    /// Valid request that the configured provider does not implement.
    #[error("not supported")]
    NotSupported,

    /// The key policy forbids the request, or the key is read-only.
    #[error("not permitted")]
    NotPermitted,

    /// No key exists under the given identifier.
    #[error("does not exist")]
    DoesNotExist,

    /// A key already exists under the given identifier.
    #[error("already exists")]
    AlreadyExists,

    /// The caller's output buffer is too small.
    #[error("buffer too small")]
    BufferTooSmall,

    /// No free key slot or allocation failure.
    #[error("insufficient memory")]
    InsufficientMemory,

    /// The entropy source could not seed the generator.
    #[error("insufficient entropy")]
    InsufficientEntropy,

    /// A key derivation ran out of capacity.
    #[error("insufficient data")]
    InsufficientData,

    /// Signature, MAC or AEAD tag verification failed.
    #[error("invalid signature")]
    InvalidSignature,

    /// Decrypted padding is malformed.
    #[error("invalid padding")]
    InvalidPadding,

    /// The identifier is not a valid key identifier.
    #[error("invalid handle")]
    InvalidHandle,

    /// Operation object used out of sequence.
    #[error("bad state")]
    BadState,

    /// An internal invariant was violated.
    #[error("corruption detected")]
    CorruptionDetected,

    /// The storage backend failed.
    #[error("storage failure")]
    StorageFailure,

    /// A stored record is inconsistent with what was requested.
    #[error("stored data corrupt")]
    DataCorrupt,

    /// A stored record could not be decoded.
    #[error("stored data invalid")]
    DataInvalid,

    /// A hardware-backed provider failed.
    #[error("hardware failure")]
    HardwareFailure,

    /// Unmapped lower-level failure.
    #[error("generic error")]
    GenericError,
}

impl From<CryptoError> for EngineError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Unsupported(_) => Self::NotSupported,
            CryptoError::InvalidKey(_) | CryptoError::InvalidInput(_) => Self::InvalidArgument,
            CryptoError::VerificationFailed => Self::InvalidSignature,
            CryptoError::InvalidPadding => Self::InvalidPadding,
            CryptoError::BufferTooSmall { .. } => Self::BufferTooSmall,
            CryptoError::Entropy(_) => Self::InsufficientEntropy,
            CryptoError::Hardware(_) => Self::HardwareFailure,
            CryptoError::EncryptionFailed(_)
            | CryptoError::DecryptionFailed(_)
            | CryptoError::SignatureFailed(_) => Self::GenericError,
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => Self::DoesNotExist,
            StorageError::AlreadyExists(_) => Self::AlreadyExists,
            StorageError::Io(_) => Self::StorageFailure,
        }
    }
}
