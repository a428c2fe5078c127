//! Public-key encryption.

use rempart_crypto::{Algorithm, AsymmetricEncryptionAlgorithm};
use tracing::debug;

use crate::attributes::{KeyId, Usage};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::slots::release_with;
use crate::staging::{LocalInput, LocalOutput};

fn encryption_algorithm(
    alg: Algorithm,
    salt: &[u8],
) -> Result<AsymmetricEncryptionAlgorithm, EngineError> {
    let alg = match alg {
        Algorithm::AsymmetricEncryption(alg) => alg,
        _ => return Err(EngineError::InvalidArgument),
    };
    if !salt.is_empty() && !matches!(alg, AsymmetricEncryptionAlgorithm::RsaOaep(_)) {
        return Err(EngineError::InvalidArgument);
    }
    Ok(alg)
}

fn require(key_kind_ok: bool) -> Result<(), EngineError> {
    if key_kind_ok {
        Ok(())
    } else {
        Err(EngineError::InvalidArgument)
    }
}

impl Engine {
    /// Encrypts `input` with a public key or the public half of a key pair.
    ///
    /// `salt` is the OAEP label and must be empty for other schemes.
    pub fn asymmetric_encrypt(
        &self,
        key: KeyId,
        alg: impl Into<Algorithm>,
        input: &[u8],
        salt: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let alg = alg.into();
        let scheme = encryption_algorithm(alg, salt)?;
        let lock = self.lock_key_with_policy(key, Usage::ENCRYPT, Some(alg))?;
        let result = require(lock.key_type().is_asymmetric()).and_then(|()| {
            let input = LocalInput::stage(input)?;
            let salt = LocalInput::stage(salt)?;
            let ciphertext = self.with_rng(|rng| {
                self.provider()
                    .asymmetric_encrypt(lock.key_ref(), scheme, &input, &salt, rng.rng()?)
                    .map_err(EngineError::from)
            })?;
            Ok(LocalOutput::from_vec(ciphertext))
        });
        let ciphertext = release_with(lock, result)?;
        debug!(key_id = %key, alg = %alg, "Asymmetric encryption");
        ciphertext.commit(out)
    }

    /// Decrypts `input` with the private key of a key pair.
    pub fn asymmetric_decrypt(
        &self,
        key: KeyId,
        alg: impl Into<Algorithm>,
        input: &[u8],
        salt: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let alg = alg.into();
        let scheme = encryption_algorithm(alg, salt)?;
        let lock = self.lock_key_with_policy(key, Usage::DECRYPT, Some(alg))?;
        let result = require(lock.key_type().is_key_pair()).and_then(|()| {
            let input = LocalInput::stage(input)?;
            let salt = LocalInput::stage(salt)?;
            let plaintext =
                self.provider()
                    .asymmetric_decrypt(lock.key_ref(), scheme, &input, &salt)?;
            Ok(LocalOutput::from_vec(plaintext.to_vec()))
        });
        let plaintext = release_with(lock, result)?;
        debug!(key_id = %key, alg = %alg, "Asymmetric decryption");
        plaintext.commit(out)
    }
}
