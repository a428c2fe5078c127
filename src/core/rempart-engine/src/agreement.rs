//! Raw key agreement.

use rempart_crypto::{Algorithm, KeyAgreementAlgorithm, RawKeyAgreement};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::attributes::{KeyId, Usage};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::slots::{release_with, KeyData};
use crate::staging::LocalInput;

fn agreement_algorithm(alg: Algorithm) -> Result<KeyAgreementAlgorithm, EngineError> {
    match alg {
        Algorithm::KeyAgreement(agreement) => Ok(agreement),
        _ => Err(EngineError::InvalidArgument),
    }
}

/// Computes the shared secret between a locked private key and `peer`.
///
/// Only ECC key pairs take part in an agreement.
pub(crate) fn shared_secret(
    engine: &Engine,
    alg: RawKeyAgreement,
    private_key: &KeyData,
    peer: &[u8],
) -> Result<Zeroizing<Vec<u8>>, EngineError> {
    let key_type = private_key.key_type();
    if !key_type.is_key_pair() || key_type.ecc_family().is_none() {
        return Err(EngineError::InvalidArgument);
    }
    let peer = LocalInput::stage(peer)?;
    Ok(engine
        .provider()
        .key_agreement(alg, private_key.key_ref(), &peer)?)
}

fn agree_into(
    engine: &Engine,
    agreement: KeyAgreementAlgorithm,
    private_key: &KeyData,
    peer: &[u8],
    out: &mut [u8],
) -> Result<usize, EngineError> {
    let expected = private_key
        .key_type()
        .agreement_output_len(private_key.bits());
    if out.len() < expected {
        return Err(EngineError::BufferTooSmall);
    }
    let base = match agreement {
        KeyAgreementAlgorithm::Raw(base) => base,
        KeyAgreementAlgorithm::WithKdf(..) => return Err(EngineError::NotSupported),
    };
    let secret = shared_secret(engine, base, private_key, peer)?;
    let dest = out
        .get_mut(..secret.len())
        .ok_or(EngineError::BufferTooSmall)?;
    dest.copy_from_slice(&secret);
    Ok(secret.len())
}

impl Engine {
    /// Writes the raw shared secret of `key` and `peer` to `out`.
    ///
    /// On failure `out` is overwritten with random bytes, so a caller that
    /// ignores the error never uses a predictable secret.
    pub fn raw_key_agreement(
        &self,
        alg: impl Into<Algorithm>,
        key: KeyId,
        peer: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let alg = alg.into();
        let result = self.raw_key_agreement_inner(alg, key, peer, out);
        match result {
            Ok(n) => {
                debug!(key_id = %key, alg = %alg, len = n, "Raw key agreement");
                Ok(n)
            }
            Err(e) => {
                if self.generate_random(out).is_err() {
                    warn!("Could not scramble agreement output");
                    out.fill(0);
                }
                Err(e)
            }
        }
    }

    fn raw_key_agreement_inner(
        &self,
        alg: Algorithm,
        key: KeyId,
        peer: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let agreement = agreement_algorithm(alg)?;
        let lock = self.lock_key_with_policy(key, Usage::DERIVE, Some(alg))?;
        let result = agree_into(self, agreement, &lock, peer, out);
        release_with(lock, result)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::attributes::KeyAttributes;
    use crate::test_support::{engine, import};
    use rempart_crypto::{EccFamily, HashAlgorithm, KdfAlgorithm, KeyType};

    // RFC 7748 section 6.1.
    const ALICE: &str = "77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a";
    const BOB_PUB: &str = "de9edb7d7b7dc1b4d35b61c2ece435373f8343c85b78674dadfc7e146f882b4f";
    const SHARED: &str = "4a5d9d5ba4ce2de1728e3bf480350f25e07e21c947d19e3376f09b3c1e161742";

    const ECDH: KeyAgreementAlgorithm = KeyAgreementAlgorithm::Raw(RawKeyAgreement::Ecdh);

    fn alice(engine: &Engine, alg: KeyAgreementAlgorithm) -> KeyId {
        let attrs = KeyAttributes::new()
            .with_type(KeyType::EccKeyPair(EccFamily::Montgomery))
            .with_usage(Usage::DERIVE)
            .with_algorithm(alg);
        import(engine, attrs, &hex::decode(ALICE).unwrap())
    }

    #[test]
    fn test_x25519_shared_secret() {
        let engine = engine();
        let key = alice(&engine, ECDH);
        let mut out = [0u8; 40];
        let n = engine
            .raw_key_agreement(ECDH, key, &hex::decode(BOB_PUB).unwrap(), &mut out)
            .unwrap();
        assert_eq!(n, 32);
        assert_eq!(hex::encode(&out[..n]), SHARED);
    }

    #[test]
    fn test_short_buffer_is_scrambled() {
        let engine = engine();
        let key = alice(&engine, ECDH);
        let mut out = [0u8; 31];
        assert_eq!(
            engine.raw_key_agreement(ECDH, key, &hex::decode(BOB_PUB).unwrap(), &mut out),
            Err(EngineError::BufferTooSmall)
        );
        assert_ne!(out, [0u8; 31]);
    }

    #[test]
    fn test_with_kdf_not_supported_raw() {
        let engine = engine();
        let alg = KeyAgreementAlgorithm::WithKdf(
            RawKeyAgreement::Ecdh,
            KdfAlgorithm::Hkdf(HashAlgorithm::Sha256),
        );
        let key = alice(&engine, alg);
        let mut out = [0u8; 32];
        assert_eq!(
            engine.raw_key_agreement(alg, key, &hex::decode(BOB_PUB).unwrap(), &mut out),
            Err(EngineError::NotSupported)
        );
    }

    #[test]
    fn test_requires_key_agreement_and_derive() {
        let engine = engine();
        let key = alice(&engine, ECDH);
        let mut out = [0u8; 32];
        assert_eq!(
            engine.raw_key_agreement(HashAlgorithm::Sha256, key, &[0u8; 32], &mut out),
            Err(EngineError::InvalidArgument)
        );

        let attrs = KeyAttributes::new()
            .with_type(KeyType::EccKeyPair(EccFamily::Montgomery))
            .with_usage(Usage::EXPORT)
            .with_algorithm(ECDH);
        let no_derive = import(&engine, attrs, &hex::decode(ALICE).unwrap());
        assert_eq!(
            engine.raw_key_agreement(ECDH, no_derive, &[0u8; 32], &mut out),
            Err(EngineError::NotPermitted)
        );
    }

    #[test]
    fn test_symmetric_key_rejected() {
        let engine = engine();
        let attrs = KeyAttributes::new()
            .with_type(KeyType::Derive)
            .with_usage(Usage::DERIVE)
            .with_algorithm(ECDH);
        let key = import(&engine, attrs, &[1u8; 32]);
        let mut out = [0u8; 32];
        assert_eq!(
            engine.raw_key_agreement(ECDH, key, &hex::decode(BOB_PUB).unwrap(), &mut out),
            Err(EngineError::InvalidArgument)
        );
    }
}
