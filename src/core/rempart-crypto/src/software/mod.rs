//! Pure-Rust provider built on the RustCrypto and dalek crates.
//!
//! Coverage:
//! - SHA-224/256/384/512 and HMAC over each
//! - AES-ECB without padding, ChaCha20 stream cipher
//! - AES-GCM and ChaCha20-Poly1305 with full-length tags
//! - X25519 key agreement, Ed25519 pure EdDSA
//! - Entropy from the operating system
//!
//! Everything else reports [`CryptoError::Unsupported`].

mod aead;
mod cipher;
mod ecc;
mod hash;
mod mac;

use rand::{rngs::OsRng, RngCore};
use tracing::trace;
use zeroize::Zeroizing;

use crate::algorithm::{
    AeadAlgorithm, CipherAlgorithm, FullLengthMac, HashAlgorithm, RawKeyAgreement, SignAlgorithm,
};
use crate::error::CryptoError;
use crate::key_type::KeyType;
use crate::provider::{CipherContext, Direction, HashContext, KeyRef, MacContext, Provider};

pub use aead::{NONCE_SIZE as AEAD_NONCE_SIZE, TAG_SIZE as AEAD_TAG_SIZE};
pub use ecc::CURVE25519_BITS;

/// Software implementation of [`Provider`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareProvider;

impl SoftwareProvider {
    /// Creates the provider.
    pub fn new() -> Self {
        Self
    }
}

impl Provider for SoftwareProvider {
    fn name(&self) -> &str {
        "software"
    }

    fn hash_setup(&self, alg: HashAlgorithm) -> Result<Box<dyn HashContext>, CryptoError> {
        Ok(hash::setup(alg))
    }

    fn mac_setup(
        &self,
        key: KeyRef<'_>,
        alg: FullLengthMac,
    ) -> Result<Box<dyn MacContext>, CryptoError> {
        mac::setup(key, alg)
    }

    fn cipher_setup(
        &self,
        key: KeyRef<'_>,
        alg: CipherAlgorithm,
        direction: Direction,
    ) -> Result<Box<dyn CipherContext>, CryptoError> {
        cipher::setup(key, alg, direction)
    }

    fn aead_encrypt(
        &self,
        key: KeyRef<'_>,
        alg: AeadAlgorithm,
        nonce: &[u8],
        additional_data: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        aead::encrypt(key, alg, nonce, additional_data, plaintext)
    }

    fn aead_decrypt(
        &self,
        key: KeyRef<'_>,
        alg: AeadAlgorithm,
        nonce: &[u8],
        additional_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        aead::decrypt(key, alg, nonce, additional_data, ciphertext)
    }

    fn sign_message(
        &self,
        key: KeyRef<'_>,
        alg: SignAlgorithm,
        message: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        match alg {
            SignAlgorithm::PureEdDsa => ecc::ed25519_sign(key, message),
            other => Err(CryptoError::unsupported(format_args!("sign-message {other:?}"))),
        }
    }

    fn verify_message(
        &self,
        key: KeyRef<'_>,
        alg: SignAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        match alg {
            SignAlgorithm::PureEdDsa => ecc::ed25519_verify(key, message, signature),
            other => Err(CryptoError::unsupported(format_args!(
                "verify-message {other:?}"
            ))),
        }
    }

    fn import_key(
        &self,
        key_type: KeyType,
        bits: usize,
        data: &[u8],
    ) -> Result<(Zeroizing<Vec<u8>>, usize), CryptoError> {
        ecc::import(key_type, bits, data)
    }

    fn export_public_key(&self, key: KeyRef<'_>) -> Result<Vec<u8>, CryptoError> {
        ecc::export_public(key)
    }

    fn generate_key(
        &self,
        key_type: KeyType,
        bits: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        ecc::generate(key_type, bits, rng)
    }

    fn key_agreement(
        &self,
        alg: RawKeyAgreement,
        private_key: KeyRef<'_>,
        peer_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        match alg {
            RawKeyAgreement::Ecdh => ecc::x25519(private_key, peer_key),
            RawKeyAgreement::Ffdh => Err(CryptoError::unsupported("FFDH")),
        }
    }

    fn entropy(&self, buf: &mut [u8]) -> Result<usize, CryptoError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| CryptoError::Entropy(e.to_string()))?;
        trace!(len = buf.len(), "Entropy gathered");
        Ok(buf.len())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::key_type::EccFamily;

    #[test]
    fn test_entropy_fills_buffer() {
        let provider = SoftwareProvider::new();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        assert_eq!(provider.entropy(&mut a).unwrap(), 32);
        assert_eq!(provider.entropy(&mut b).unwrap(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_unsupported_defaults() {
        let provider = SoftwareProvider::new();
        let key = [0u8; 32];
        let ecc = KeyRef::new(KeyType::EccKeyPair(EccFamily::SecpR1), 256, &key);
        let alg = SignAlgorithm::Ecdsa(crate::algorithm::SignHash::Hash(HashAlgorithm::Sha256));
        assert!(matches!(
            provider.sign_hash(ecc, alg, &[0u8; 32]),
            Err(CryptoError::Unsupported(_))
        ));
        assert!(matches!(
            provider.key_agreement(RawKeyAgreement::Ffdh, ecc, &[]),
            Err(CryptoError::Unsupported(_))
        ));
    }

    #[test]
    fn test_provider_is_object_safe() {
        let provider: std::sync::Arc<dyn Provider> = std::sync::Arc::new(SoftwareProvider);
        let mut ctx = provider.hash_setup(HashAlgorithm::Sha256).unwrap();
        ctx.update(b"abc");
        assert_eq!(ctx.finish().len(), 32);
        assert_eq!(provider.name(), "software");
    }
}
