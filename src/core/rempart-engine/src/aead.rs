//! Authenticated encryption with associated data.

use rempart_crypto::{AeadAlgorithm, Algorithm, KeyRef};
use tracing::debug;

use crate::attributes::{KeyId, Usage};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::slots::release_with;
use crate::staging::{fill_failure, LocalInput, LocalOutput};

/// Rejects anything that is not a concrete AEAD algorithm with a tag the
/// construction can produce.
fn aead_algorithm(alg: Algorithm) -> Result<AeadAlgorithm, EngineError> {
    let aead = match alg {
        Algorithm::Aead(aead) if !aead.is_wildcard() => aead,
        _ => return Err(EngineError::NotSupported),
    };
    if aead.tag_length > aead.base.full_tag_len() {
        return Err(EngineError::InvalidArgument);
    }
    Ok(aead)
}

impl Engine {
    /// Encrypts and authenticates `plaintext`, writing `ciphertext || tag`
    /// to `out`.
    ///
    /// On failure `out` is filled with `!`.
    pub fn aead_encrypt(
        &self,
        key: KeyId,
        alg: impl Into<Algorithm>,
        nonce: &[u8],
        additional_data: &[u8],
        plaintext: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let result = self.aead_inner(key, alg.into(), nonce, additional_data, plaintext, true);
        finish_compute(result, out)
    }

    /// Verifies and decrypts `ciphertext || tag`, writing the plaintext to
    /// `out`. A bad tag is reported as [`EngineError::InvalidSignature`].
    ///
    /// On failure `out` is filled with `!`.
    pub fn aead_decrypt(
        &self,
        key: KeyId,
        alg: impl Into<Algorithm>,
        nonce: &[u8],
        additional_data: &[u8],
        ciphertext: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let result = self.aead_inner(key, alg.into(), nonce, additional_data, ciphertext, false);
        finish_compute(result, out)
    }

    fn aead_inner(
        &self,
        key: KeyId,
        alg: Algorithm,
        nonce: &[u8],
        additional_data: &[u8],
        input: &[u8],
        encrypt: bool,
    ) -> Result<LocalOutput, EngineError> {
        let aead = aead_algorithm(alg)?;
        let usage = if encrypt { Usage::ENCRYPT } else { Usage::DECRYPT };
        let lock = self.lock_key_with_policy(key, usage, Some(alg))?;

        let staged =
            self.seal_or_open(lock.key_ref(), aead, nonce, additional_data, input, encrypt);
        let output = release_with(lock, staged)?;
        debug!(key_id = %key, alg = %alg, encrypt, len = output.len(), "AEAD computed");
        Ok(output)
    }

    fn seal_or_open(
        &self,
        key: KeyRef<'_>,
        aead: AeadAlgorithm,
        nonce: &[u8],
        additional_data: &[u8],
        input: &[u8],
        encrypt: bool,
    ) -> Result<LocalOutput, EngineError> {
        let nonce = LocalInput::stage(nonce)?;
        let additional_data = LocalInput::stage(additional_data)?;
        let input = LocalInput::stage(input)?;
        let provider = self.provider();
        if encrypt {
            let sealed = provider.aead_encrypt(key, aead, &nonce, &additional_data, &input)?;
            Ok(LocalOutput::from_vec(sealed))
        } else {
            let opened = provider.aead_decrypt(key, aead, &nonce, &additional_data, &input)?;
            Ok(LocalOutput::from_vec(opened.to_vec()))
        }
    }
}

fn finish_compute(
    result: Result<LocalOutput, EngineError>,
    out: &mut [u8],
) -> Result<usize, EngineError> {
    match result.and_then(|output| output.commit(out)) {
        Ok(n) => Ok(n),
        Err(e) => {
            fill_failure(out);
            Err(e)
        }
    }
}
