//! Curve25519 keys: X25519 agreement and Ed25519 signatures.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::key_type::{EccFamily, KeyType};
use crate::provider::KeyRef;

/// Curve size in bits for X25519 and Ed25519.
pub const CURVE25519_BITS: usize = 255;

/// Encoded size of a Curve25519 scalar or point.
pub const KEY_SIZE: usize = 32;

fn curve25519(key_type: KeyType) -> Result<EccFamily, CryptoError> {
    match key_type.ecc_family() {
        Some(family @ (EccFamily::Montgomery | EccFamily::TwistedEdwards)) => Ok(family),
        _ => Err(CryptoError::unsupported(key_type)),
    }
}

fn to_array(data: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>, CryptoError> {
    let array: [u8; KEY_SIZE] = data.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!("expected {KEY_SIZE} bytes, got {}", data.len()))
    })?;
    Ok(Zeroizing::new(array))
}

/// Validates imported Curve25519 key material.
pub(crate) fn import(
    key_type: KeyType,
    bits: usize,
    data: &[u8],
) -> Result<(Zeroizing<Vec<u8>>, usize), CryptoError> {
    let family = curve25519(key_type)?;
    if bits != 0 && bits != CURVE25519_BITS {
        return Err(CryptoError::unsupported(format_args!("{key_type} of {bits} bits")));
    }
    let bytes = to_array(data)?;
    if family == EccFamily::TwistedEdwards && key_type.is_public_key() {
        VerifyingKey::from_bytes(&*bytes)
            .map_err(|e| CryptoError::InvalidKey(format!("not an Edwards point: {e}")))?;
    }
    Ok((Zeroizing::new(bytes.to_vec()), CURVE25519_BITS))
}

/// Derives the public key of a key pair, or copies a public key.
pub(crate) fn export_public(key: KeyRef<'_>) -> Result<Vec<u8>, CryptoError> {
    let family = curve25519(key.key_type)?;
    if key.key_type.is_public_key() {
        return Ok(key.data.to_vec());
    }
    let secret = to_array(key.data)?;
    Ok(match family {
        EccFamily::Montgomery => PublicKey::from(&StaticSecret::from(*secret))
            .as_bytes()
            .to_vec(),
        _ => SigningKey::from_bytes(&*secret)
            .verifying_key()
            .to_bytes()
            .to_vec(),
    })
}

/// Generates a fresh Curve25519 private key.
pub(crate) fn generate(
    key_type: KeyType,
    bits: usize,
    rng: &mut dyn RngCore,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    curve25519(key_type)?;
    if !key_type.is_key_pair() {
        return Err(CryptoError::InvalidInput(
            "only key pairs can be generated".to_string(),
        ));
    }
    if bits != CURVE25519_BITS {
        return Err(CryptoError::unsupported(format_args!("{key_type} of {bits} bits")));
    }
    let mut secret = Zeroizing::new(vec![0u8; KEY_SIZE]);
    rng.try_fill_bytes(&mut secret)
        .map_err(|e| CryptoError::Entropy(e.to_string()))?;
    Ok(secret)
}

/// X25519 shared secret.
pub(crate) fn x25519(
    private_key: KeyRef<'_>,
    peer: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if private_key.key_type != KeyType::EccKeyPair(EccFamily::Montgomery) {
        return Err(CryptoError::unsupported(format_args!(
            "ECDH with {}",
            private_key.key_type
        )));
    }
    let secret = StaticSecret::from(*to_array(private_key.data)?);
    let peer: [u8; KEY_SIZE] = peer.try_into().map_err(|_| {
        CryptoError::InvalidInput(format!("peer key must be {KEY_SIZE} bytes, got {}", peer.len()))
    })?;
    let shared = secret.diffie_hellman(&PublicKey::from(peer));
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidInput("peer key has low order".to_string()));
    }
    Ok(Zeroizing::new(shared.as_bytes().to_vec()))
}

/// Ed25519 signature over a whole message.
pub(crate) fn ed25519_sign(key: KeyRef<'_>, message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.key_type != KeyType::EccKeyPair(EccFamily::TwistedEdwards) {
        return Err(CryptoError::unsupported(format_args!("EdDSA with {}", key.key_type)));
    }
    let signing = SigningKey::from_bytes(&*to_array(key.data)?);
    Ok(signing.sign(message).to_bytes().to_vec())
}

/// Ed25519 verification against a key pair or public key.
pub(crate) fn ed25519_verify(
    key: KeyRef<'_>,
    message: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let verifying = match key.key_type {
        KeyType::EccKeyPair(EccFamily::TwistedEdwards) => {
            SigningKey::from_bytes(&*to_array(key.data)?).verifying_key()
        }
        KeyType::EccPublicKey(EccFamily::TwistedEdwards) => {
            VerifyingKey::from_bytes(&*to_array(key.data)?)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
        }
        other => {
            return Err(CryptoError::unsupported(format_args!("EdDSA with {other}")));
        }
    };
    let signature =
        Signature::from_slice(signature).map_err(|_| CryptoError::VerificationFailed)?;
    verifying
        .verify(message, &signature)
        .map_err(|_| CryptoError::VerificationFailed)
}
