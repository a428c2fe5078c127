//! Asymmetric signatures.
//!
//! Hash signing hands a caller-computed digest to the provider. Message
//! signing either hashes first and then signs the digest, or passes the
//! whole message to schemes such as pure EdDSA that do their own hashing.

use rempart_crypto::{Algorithm, KeyRef, KeyType, SignAlgorithm, SignHash};
use tracing::debug;

use crate::attributes::{KeyId, Usage};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::slots::release_with;
use crate::staging::{fill_failure, LocalInput, LocalOutput};

fn sign_algorithm(alg: Algorithm) -> Result<SignAlgorithm, EngineError> {
    match alg {
        Algorithm::Sign(sign) => Ok(sign),
        _ => Err(EngineError::InvalidArgument),
    }
}

/// Checks that the key family matches the scheme and, for signing, that the
/// private half is present.
fn check_key(key_type: KeyType, alg: SignAlgorithm, signing: bool) -> Result<(), EngineError> {
    if signing && !key_type.is_key_pair() {
        return Err(EngineError::InvalidArgument);
    }
    let family_ok = if alg.is_rsa() {
        key_type.is_rsa()
    } else {
        key_type.ecc_family().is_some()
    };
    if !family_ok {
        return Err(EngineError::InvalidArgument);
    }
    Ok(())
}

fn check_hash_length(alg: SignAlgorithm, hash: &[u8]) -> Result<(), EngineError> {
    if let Some(SignHash::Hash(h)) = alg.hash() {
        if hash.len() != h.output_len() {
            return Err(EngineError::InvalidArgument);
        }
    }
    Ok(())
}

fn commit_signature(
    result: Result<LocalOutput, EngineError>,
    out: &mut [u8],
) -> Result<usize, EngineError> {
    match result.and_then(|signature| signature.commit(out)) {
        Ok(n) => {
            fill_failure(&mut out[n..]);
            Ok(n)
        }
        Err(e) => {
            fill_failure(out);
            Err(e)
        }
    }
}

impl Engine {
    /// Signs a precomputed `hash` and writes the signature to `out`.
    ///
    /// Unused bytes of `out`, or all of it on failure, are filled with `!`.
    pub fn sign_hash(
        &self,
        key: KeyId,
        alg: impl Into<Algorithm>,
        hash: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let result = self.sign_hash_inner(key, alg.into(), hash);
        commit_signature(result, out)
    }

    fn sign_hash_inner(
        &self,
        key: KeyId,
        alg: Algorithm,
        hash: &[u8],
    ) -> Result<LocalOutput, EngineError> {
        let sign = sign_algorithm(alg)?;
        if !sign.is_sign_hash() {
            return Err(EngineError::InvalidArgument);
        }
        let lock = self.lock_key_with_policy(key, Usage::SIGN_HASH, Some(alg))?;
        let result = check_key(lock.key_type(), sign, true)
            .and_then(|()| self.provider_sign_hash(lock.key_ref(), sign, hash));
        let signature = release_with(lock, result)?;
        debug!(key_id = %key, alg = %alg, "Hash signed");
        Ok(signature)
    }

    fn provider_sign_hash(
        &self,
        key: KeyRef<'_>,
        alg: SignAlgorithm,
        hash: &[u8],
    ) -> Result<LocalOutput, EngineError> {
        let hash = LocalInput::stage(hash)?;
        check_hash_length(alg, &hash)?;
        let signature = self.provider().sign_hash(key, alg, &hash)?;
        Ok(LocalOutput::from_vec(signature))
    }

    /// Verifies `signature` over a precomputed `hash`.
    pub fn verify_hash(
        &self,
        key: KeyId,
        alg: impl Into<Algorithm>,
        hash: &[u8],
        signature: &[u8],
    ) -> Result<(), EngineError> {
        let alg = alg.into();
        let sign = sign_algorithm(alg)?;
        if !sign.is_sign_hash() {
            return Err(EngineError::InvalidArgument);
        }
        let lock = self.lock_key_with_policy(key, Usage::VERIFY_HASH, Some(alg))?;
        let result = check_key(lock.key_type(), sign, false).and_then(|()| {
            let hash = LocalInput::stage(hash)?;
            let signature = LocalInput::stage(signature)?;
            check_hash_length(sign, &hash)?;
            self.provider()
                .verify_hash(lock.key_ref(), sign, &hash, &signature)
                .map_err(EngineError::from)
        });
        release_with(lock, result)
    }

    /// Signs a whole `message` and writes the signature to `out`.
    ///
    /// Unused bytes of `out`, or all of it on failure, are filled with `!`.
    pub fn sign_message(
        &self,
        key: KeyId,
        alg: impl Into<Algorithm>,
        message: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let result = self.sign_message_inner(key, alg.into(), message);
        commit_signature(result, out)
    }

    fn sign_message_inner(
        &self,
        key: KeyId,
        alg: Algorithm,
        message: &[u8],
    ) -> Result<LocalOutput, EngineError> {
        let sign = sign_algorithm(alg)?;
        if !sign.is_sign_message() {
            return Err(EngineError::InvalidArgument);
        }
        let lock = self.lock_key_with_policy(key, Usage::SIGN_MESSAGE, Some(alg))?;
        let result = check_key(lock.key_type(), sign, true).and_then(|()| {
            let message = LocalInput::stage(message)?;
            match self.message_digest(sign, &message)? {
                Some(digest) => self.provider_sign_hash(lock.key_ref(), sign, &digest),
                None => {
                    let signature = self.provider().sign_message(lock.key_ref(), sign, &message)?;
                    Ok(LocalOutput::from_vec(signature))
                }
            }
        });
        let signature = release_with(lock, result)?;
        debug!(key_id = %key, alg = %alg, "Message signed");
        Ok(signature)
    }

    /// Verifies `signature` over a whole `message`.
    pub fn verify_message(
        &self,
        key: KeyId,
        alg: impl Into<Algorithm>,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), EngineError> {
        let alg = alg.into();
        let sign = sign_algorithm(alg)?;
        if !sign.is_sign_message() {
            return Err(EngineError::InvalidArgument);
        }
        let lock = self.lock_key_with_policy(key, Usage::VERIFY_MESSAGE, Some(alg))?;
        let result = check_key(lock.key_type(), sign, false).and_then(|()| {
            let message = LocalInput::stage(message)?;
            let signature = LocalInput::stage(signature)?;
            let provider = self.provider();
            let verified = match self.message_digest(sign, &message)? {
                Some(digest) => provider.verify_hash(lock.key_ref(), sign, &digest, &signature),
                None => provider.verify_message(lock.key_ref(), sign, &message, &signature),
            };
            verified.map_err(EngineError::from)
        });
        release_with(lock, result)
    }

    /// Digest of `message` for hash-and-sign schemes; `None` for schemes
    /// that sign the message itself.
    fn message_digest(
        &self,
        alg: SignAlgorithm,
        message: &[u8],
    ) -> Result<Option<LocalOutput>, EngineError> {
        match alg.hash() {
            Some(SignHash::Hash(hash)) => {
                let mut ctx = self.provider().hash_setup(hash)?;
                ctx.update(message);
                Ok(Some(LocalOutput::from_vec(ctx.finish())))
            }
            Some(SignHash::Any) => Err(EngineError::InvalidArgument),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::attributes::KeyAttributes;
    use crate::test_support::{engine, import};
    use rempart_crypto::{EccFamily, HashAlgorithm};

    const ED25519_PAIR: KeyType = KeyType::EccKeyPair(EccFamily::TwistedEdwards);
    const SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
    const EMPTY_SIGNATURE: &str = "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e065224901555fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b";

    fn ed25519_key(engine: &Engine, usage: Usage) -> KeyId {
        let attrs = KeyAttributes::new()
            .with_type(ED25519_PAIR)
            .with_usage(usage)
            .with_algorithm(SignAlgorithm::PureEdDsa);
        import(engine, attrs, &hex::decode(SEED).unwrap())
    }

    #[test]
    fn test_pure_eddsa_known_answer() {
        let engine = engine();
        let key = ed25519_key(&engine, Usage::SIGN_MESSAGE | Usage::VERIFY_MESSAGE);
        let mut out = [0u8; 70];
        let n = engine
            .sign_message(key, SignAlgorithm::PureEdDsa, b"", &mut out)
            .unwrap();
        assert_eq!(n, 64);
        assert_eq!(hex::encode(&out[..n]), EMPTY_SIGNATURE);
        assert_eq!(&out[64..], b"!!!!!!");

        engine
            .verify_message(key, SignAlgorithm::PureEdDsa, b"", &out[..n])
            .unwrap();
        assert_eq!(
            engine.verify_message(key, SignAlgorithm::PureEdDsa, b"x", &out[..n]),
            Err(EngineError::InvalidSignature)
        );
    }

    #[test]
    fn test_verify_with_public_key() {
        let engine = engine();
        let pair = ed25519_key(&engine, Usage::SIGN_MESSAGE | Usage::EXPORT);
        let mut public = [0u8; 32];
        engine.export_public_key(pair, &mut public).unwrap();

        let attrs = KeyAttributes::new()
            .with_type(ED25519_PAIR.public_counterpart())
            .with_usage(Usage::VERIFY_MESSAGE | Usage::SIGN_MESSAGE)
            .with_algorithm(SignAlgorithm::PureEdDsa);
        let public_key = import(&engine, attrs, &public);

        let mut signature = [0u8; 64];
        engine
            .sign_message(pair, SignAlgorithm::PureEdDsa, b"payload", &mut signature)
            .unwrap();
        engine
            .verify_message(public_key, SignAlgorithm::PureEdDsa, b"payload", &signature)
            .unwrap();

        assert_eq!(
            engine.sign_message(public_key, SignAlgorithm::PureEdDsa, b"payload", &mut signature),
            Err(EngineError::InvalidArgument)
        );
        assert_eq!(signature, [b'!'; 64]);
    }

    #[test]
    fn test_policy_and_family_checks() {
        let engine = engine();
        let key = ed25519_key(&engine, Usage::VERIFY_MESSAGE);
        let mut out = [0u8; 64];
        assert_eq!(
            engine.sign_message(key, SignAlgorithm::PureEdDsa, b"m", &mut out),
            Err(EngineError::NotPermitted)
        );
        assert_eq!(
            engine.sign_hash(key, SignAlgorithm::PureEdDsa, &[0u8; 32], &mut out),
            Err(EngineError::InvalidArgument)
        );
        assert_eq!(
            engine.sign_message(key, HashAlgorithm::Sha256, b"m", &mut out),
            Err(EngineError::InvalidArgument)
        );
    }

    #[test]
    fn test_rsa_scheme_rejects_ecc_key() {
        let engine = engine();
        let alg = SignAlgorithm::RsaPss(SignHash::Hash(HashAlgorithm::Sha256));
        let attrs = KeyAttributes::new()
            .with_type(ED25519_PAIR)
            .with_usage(Usage::SIGN_HASH)
            .with_algorithm(alg);
        let key = import(&engine, attrs, &hex::decode(SEED).unwrap());
        let mut out = [0u8; 64];
        assert_eq!(
            engine.sign_hash(key, alg, &[0u8; 32], &mut out),
            Err(EngineError::InvalidArgument)
        );
    }

    #[test]
    fn test_hash_length_and_provider_support() {
        let engine = engine();
        let alg = SignAlgorithm::Ecdsa(SignHash::Hash(HashAlgorithm::Sha256));
        let attrs = KeyAttributes::new()
            .with_type(ED25519_PAIR)
            .with_usage(Usage::SIGN_HASH)
            .with_algorithm(alg);
        let key = import(&engine, attrs, &hex::decode(SEED).unwrap());
        let mut out = [0u8; 64];
        assert_eq!(
            engine.sign_hash(key, alg, &[0u8; 20], &mut out),
            Err(EngineError::InvalidArgument)
        );
        assert_eq!(
            engine.sign_hash(key, alg, &[0u8; 32], &mut out),
            Err(EngineError::NotSupported)
        );
    }
}
