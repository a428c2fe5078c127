//! Primitive provider interface.
//!
//! A provider implements the raw algorithms. It never sees key ids, policies
//! or slots: the engine resolves all of that and hands the provider a
//! [`KeyRef`] borrowing the key material for the duration of one call.
//!
//! Multi-part operations are modelled as boxed contexts so that providers can
//! keep whatever state they need between calls.

use std::fmt;

use rand::RngCore;
use zeroize::Zeroizing;

use crate::algorithm::{
    AeadAlgorithm, AsymmetricEncryptionAlgorithm, CipherAlgorithm, FullLengthMac, HashAlgorithm,
    RawKeyAgreement, SignAlgorithm,
};
use crate::error::CryptoError;
use crate::key_type::KeyType;

/// Borrowed view of a key handed to a provider.
#[derive(Clone, Copy)]
pub struct KeyRef<'a> {
    /// Key type.
    pub key_type: KeyType,
    /// Key size in bits.
    pub bits: usize,
    /// Key material in export representation.
    pub data: &'a [u8],
}

impl<'a> KeyRef<'a> {
    /// Creates a key reference.
    pub fn new(key_type: KeyType, bits: usize, data: &'a [u8]) -> Self {
        Self {
            key_type,
            bits,
            data,
        }
    }
}

impl fmt::Debug for KeyRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRef")
            .field("key_type", &self.key_type)
            .field("bits", &self.bits)
            .field("data", &"[REDACTED]")
            .finish()
    }
}

/// Direction of a cipher operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Plaintext in, ciphertext out.
    Encrypt,
    /// Ciphertext in, plaintext out.
    Decrypt,
}

/// Running hash computation.
pub trait HashContext: Send {
    /// Absorbs more input.
    fn update(&mut self, input: &[u8]);

    /// Completes the computation and returns the digest.
    fn finish(self: Box<Self>) -> Vec<u8>;

    /// Duplicates the running state.
    fn box_clone(&self) -> Box<dyn HashContext>;
}

/// Running MAC computation.
pub trait MacContext: Send {
    /// Absorbs more input.
    fn update(&mut self, input: &[u8]);

    /// Completes the computation and returns the full-length MAC.
    fn finish(self: Box<Self>) -> Zeroizing<Vec<u8>>;
}

/// Running unauthenticated cipher computation.
pub trait CipherContext: Send {
    /// Installs the IV or nonce. Must be called before the first update for
    /// modes that need one.
    fn set_iv(&mut self, iv: &[u8]) -> Result<(), CryptoError>;

    /// Processes `input`, appending whatever output is ready to `output`.
    fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), CryptoError>;

    /// Flushes buffered state into `output`.
    fn finish(self: Box<Self>, output: &mut Vec<u8>) -> Result<(), CryptoError>;
}

/// Back end implementing the actual algorithms.
///
/// Every method has a sensible "not supported" default except hashing, MAC,
/// key import and entropy, which every provider must supply.
pub trait Provider: Send + Sync {
    /// Human-readable provider name for diagnostics.
    fn name(&self) -> &str;

    /// Starts a hash computation.
    fn hash_setup(&self, alg: HashAlgorithm) -> Result<Box<dyn HashContext>, CryptoError>;

    /// Starts a full-length MAC computation.
    fn mac_setup(
        &self,
        key: KeyRef<'_>,
        alg: FullLengthMac,
    ) -> Result<Box<dyn MacContext>, CryptoError>;

    /// Starts an unauthenticated cipher computation.
    fn cipher_setup(
        &self,
        key: KeyRef<'_>,
        alg: CipherAlgorithm,
        direction: Direction,
    ) -> Result<Box<dyn CipherContext>, CryptoError> {
        let _ = (key, direction);
        Err(CryptoError::unsupported(format_args!("cipher {alg:?}")))
    }

    /// Encrypts and authenticates; returns `ciphertext || tag`.
    fn aead_encrypt(
        &self,
        key: KeyRef<'_>,
        alg: AeadAlgorithm,
        nonce: &[u8],
        additional_data: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let _ = (key, nonce, additional_data, plaintext);
        Err(CryptoError::unsupported(format_args!("aead {:?}", alg.base)))
    }

    /// Verifies and decrypts `ciphertext || tag`.
    fn aead_decrypt(
        &self,
        key: KeyRef<'_>,
        alg: AeadAlgorithm,
        nonce: &[u8],
        additional_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let _ = (key, nonce, additional_data, ciphertext);
        Err(CryptoError::unsupported(format_args!("aead {:?}", alg.base)))
    }

    /// Signs a precomputed hash.
    fn sign_hash(
        &self,
        key: KeyRef<'_>,
        alg: SignAlgorithm,
        hash: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let _ = (key, hash);
        Err(CryptoError::unsupported(format_args!("sign-hash {alg:?}")))
    }

    /// Verifies a signature over a precomputed hash.
    fn verify_hash(
        &self,
        key: KeyRef<'_>,
        alg: SignAlgorithm,
        hash: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        let _ = (key, hash, signature);
        Err(CryptoError::unsupported(format_args!("verify-hash {alg:?}")))
    }

    /// Signs a whole message with a scheme that does its own hashing.
    fn sign_message(
        &self,
        key: KeyRef<'_>,
        alg: SignAlgorithm,
        message: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let _ = (key, message);
        Err(CryptoError::unsupported(format_args!("sign-message {alg:?}")))
    }

    /// Verifies a signature over a whole message.
    fn verify_message(
        &self,
        key: KeyRef<'_>,
        alg: SignAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        let _ = (key, message, signature);
        Err(CryptoError::unsupported(format_args!("verify-message {alg:?}")))
    }

    /// Encrypts with a public key (or the public half of a key pair).
    fn asymmetric_encrypt(
        &self,
        key: KeyRef<'_>,
        alg: AsymmetricEncryptionAlgorithm,
        input: &[u8],
        salt: &[u8],
        rng: &mut dyn RngCore,
    ) -> Result<Vec<u8>, CryptoError> {
        let _ = (key, input, salt, rng);
        Err(CryptoError::unsupported(format_args!("encrypt {alg:?}")))
    }

    /// Decrypts with a private key.
    fn asymmetric_decrypt(
        &self,
        key: KeyRef<'_>,
        alg: AsymmetricEncryptionAlgorithm,
        input: &[u8],
        salt: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let _ = (key, input, salt);
        Err(CryptoError::unsupported(format_args!("decrypt {alg:?}")))
    }

    /// Validates imported key material and returns its internal
    /// representation together with the effective key size in bits.
    ///
    /// Unstructured key types never reach the provider; the engine validates
    /// them itself.
    fn import_key(
        &self,
        key_type: KeyType,
        bits: usize,
        data: &[u8],
    ) -> Result<(Zeroizing<Vec<u8>>, usize), CryptoError>;

    /// Derives the public key of a key pair in export representation.
    fn export_public_key(&self, key: KeyRef<'_>) -> Result<Vec<u8>, CryptoError> {
        Err(CryptoError::unsupported(format_args!(
            "public export of {}",
            key.key_type
        )))
    }

    /// Generates an asymmetric key pair.
    fn generate_key(
        &self,
        key_type: KeyType,
        bits: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let _ = (bits, rng);
        Err(CryptoError::unsupported(format_args!("generation of {key_type}")))
    }

    /// Computes a raw shared secret between a private key and a peer public
    /// key given in export representation.
    fn key_agreement(
        &self,
        alg: RawKeyAgreement,
        private_key: KeyRef<'_>,
        peer_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let _ = (private_key, peer_key);
        Err(CryptoError::unsupported(format_args!("agreement {alg:?}")))
    }

    /// Fills `buf` from the entropy source and returns how many bytes were
    /// actually written.
    fn entropy(&self, buf: &mut [u8]) -> Result<usize, CryptoError>;
}
