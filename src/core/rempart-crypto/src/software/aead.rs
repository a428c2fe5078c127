//! AES-GCM and ChaCha20-Poly1305 authenticated encryption.
//!
//! Only full-length tags and 96-bit nonces are supported. Output layout is
//! `ciphertext || tag`.

use aes_gcm::{
    aead::{consts::U12, Aead, KeyInit, Nonce, Payload},
    Aes128Gcm, Aes256Gcm, AesGcm,
};
use chacha20poly1305::ChaCha20Poly1305;
use zeroize::Zeroizing;

use crate::algorithm::{AeadAlgorithm, AeadBase};
use crate::error::CryptoError;
use crate::key_type::KeyType;
use crate::provider::KeyRef;

type Aes192Gcm = AesGcm<aes::Aes192, U12>;

/// Size of a GCM or ChaCha20-Poly1305 nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of a full authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

fn check(key: KeyRef<'_>, alg: AeadAlgorithm, nonce: &[u8]) -> Result<(), CryptoError> {
    if alg.tag_length as usize != TAG_SIZE || alg.at_least {
        return Err(CryptoError::unsupported(format_args!(
            "{:?} with a {}-byte tag",
            alg.base, alg.tag_length
        )));
    }
    match (alg.base, key.key_type) {
        (AeadBase::Gcm, KeyType::Aes) | (AeadBase::ChaCha20Poly1305, KeyType::ChaCha20) => {}
        (base, key_type) => {
            return Err(CryptoError::unsupported(format_args!(
                "{base:?} with {key_type}"
            )));
        }
    }
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidInput(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            nonce.len()
        )));
    }
    Ok(())
}

fn seal<C>(key: &[u8], nonce: &[u8], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>, CryptoError>
where
    C: Aead + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    cipher
        .encrypt(Nonce::<C>::from_slice(nonce), Payload { msg, aad })
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

fn open<C>(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    msg: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError>
where
    C: Aead + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    cipher
        .decrypt(Nonce::<C>::from_slice(nonce), Payload { msg, aad })
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Encrypts `plaintext`, returning `ciphertext || tag`.
pub(crate) fn encrypt(
    key: KeyRef<'_>,
    alg: AeadAlgorithm,
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    check(key, alg, nonce)?;
    match (alg.base, key.data.len()) {
        (AeadBase::Gcm, 16) => seal::<Aes128Gcm>(key.data, nonce, aad, plaintext),
        (AeadBase::Gcm, 24) => seal::<Aes192Gcm>(key.data, nonce, aad, plaintext),
        (AeadBase::Gcm, 32) => seal::<Aes256Gcm>(key.data, nonce, aad, plaintext),
        (AeadBase::ChaCha20Poly1305, _) => {
            seal::<ChaCha20Poly1305>(key.data, nonce, aad, plaintext)
        }
        (_, n) => Err(CryptoError::InvalidKey(format!("bad key length {n}"))),
    }
}

/// Verifies and decrypts `ciphertext || tag`.
pub(crate) fn decrypt(
    key: KeyRef<'_>,
    alg: AeadAlgorithm,
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    check(key, alg, nonce)?;
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::InvalidInput("ciphertext too short".to_string()));
    }
    match (alg.base, key.data.len()) {
        (AeadBase::Gcm, 16) => open::<Aes128Gcm>(key.data, nonce, aad, ciphertext),
        (AeadBase::Gcm, 24) => open::<Aes192Gcm>(key.data, nonce, aad, ciphertext),
        (AeadBase::Gcm, 32) => open::<Aes256Gcm>(key.data, nonce, aad, ciphertext),
        (AeadBase::ChaCha20Poly1305, _) => {
            open::<ChaCha20Poly1305>(key.data, nonce, aad, ciphertext)
        }
        (_, n) => Err(CryptoError::InvalidKey(format!("bad key length {n}"))),
    }
}
