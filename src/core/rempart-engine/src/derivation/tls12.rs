//! TLS 1.2 PRF (RFC 5246 section 5) and the PSK-to-master-secret variant
//! (RFC 4279 section 2).

use rempart_crypto::{HashAlgorithm, Provider};
use zeroize::Zeroizing;

use super::{hmac, DerivationStep};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    SeedSet,
    KeySet,
    LabelSet,
    Output,
}

/// PRF state. Inputs arrive strictly as seed, secret, label.
pub(super) struct Tls12Prf {
    hash: HashAlgorithm,
    phase: Phase,
    /// PSK size limit for the PSK-to-MS variant; `None` for the plain PRF.
    psk_max: Option<usize>,
    seed: Zeroizing<Vec<u8>>,
    secret: Zeroizing<Vec<u8>>,
    label: Zeroizing<Vec<u8>>,
    a_i: Zeroizing<Vec<u8>>,
    block_number: u8,
    block: Zeroizing<Vec<u8>>,
    offset: usize,
}

/// Premaster secret for a plain PSK: `u16(N) || N zeros || u16(N) || PSK`.
fn psk_premaster_secret(psk: &[u8], max: usize) -> Result<Zeroizing<Vec<u8>>, EngineError> {
    if psk.len() > max {
        return Err(EngineError::InvalidArgument);
    }
    let len = u16::try_from(psk.len()).map_err(|_| EngineError::InvalidArgument)?;
    let mut pms = Zeroizing::new(Vec::with_capacity(4 + 2 * psk.len()));
    pms.extend_from_slice(&len.to_be_bytes());
    pms.resize(2 + psk.len(), 0);
    pms.extend_from_slice(&len.to_be_bytes());
    pms.extend_from_slice(psk);
    Ok(pms)
}

impl Tls12Prf {
    pub(super) fn new(hash: HashAlgorithm, psk_max: Option<usize>) -> Self {
        Self {
            hash,
            phase: Phase::Init,
            psk_max,
            seed: Zeroizing::new(Vec::new()),
            secret: Zeroizing::new(Vec::new()),
            label: Zeroizing::new(Vec::new()),
            a_i: Zeroizing::new(Vec::new()),
            block_number: 0,
            block: Zeroizing::new(Vec::new()),
            offset: 0,
        }
    }

    pub(super) fn input(&mut self, step: DerivationStep, data: &[u8]) -> Result<(), EngineError> {
        let expected = match step {
            DerivationStep::Seed => Phase::Init,
            DerivationStep::Secret => Phase::SeedSet,
            DerivationStep::Label => Phase::KeySet,
            DerivationStep::Salt | DerivationStep::Info => {
                return Err(EngineError::InvalidArgument)
            }
        };
        if self.phase != expected {
            return Err(EngineError::BadState);
        }
        match step {
            DerivationStep::Seed => {
                self.seed = Zeroizing::new(data.to_vec());
                self.phase = Phase::SeedSet;
            }
            DerivationStep::Secret => {
                self.secret = match self.psk_max {
                    Some(max) => psk_premaster_secret(data, max)?,
                    None => Zeroizing::new(data.to_vec()),
                };
                self.phase = Phase::KeySet;
            }
            _ => {
                self.label = Zeroizing::new(data.to_vec());
                self.offset = self.hash.output_len();
                self.phase = Phase::LabelSet;
            }
        }
        Ok(())
    }

    fn next_block(&mut self, provider: &dyn Provider) -> Result<(), EngineError> {
        if self.block_number == 0xff {
            return Err(EngineError::CorruptionDetected);
        }
        self.block_number += 1;
        // A(1) = HMAC(secret, label || seed), A(i) = HMAC(secret, A(i-1)).
        self.a_i = if self.block_number == 1 {
            let seed = [self.label.as_slice(), self.seed.as_slice()];
            hmac(provider, self.hash, &self.secret, &seed)?
        } else {
            hmac(provider, self.hash, &self.secret, &[self.a_i.as_slice()])?
        };
        self.block = hmac(
            provider,
            self.hash,
            &self.secret,
            &[self.a_i.as_slice(), self.label.as_slice(), self.seed.as_slice()],
        )?;
        self.offset = 0;
        Ok(())
    }

    /// Fills `out` with the next PRF bytes.
    pub(super) fn read(
        &mut self,
        provider: &dyn Provider,
        out: &mut [u8],
    ) -> Result<(), EngineError> {
        if !matches!(self.phase, Phase::LabelSet | Phase::Output) {
            return Err(EngineError::BadState);
        }
        self.phase = Phase::Output;

        let hash_len = self.hash.output_len();
        let mut written = 0;
        while written < out.len() {
            if self.offset == hash_len {
                self.next_block(provider)?;
            }
            let take = (hash_len - self.offset).min(out.len() - written);
            let block = &self.block[self.offset..self.offset + take];
            out[written..written + take].copy_from_slice(block);
            self.offset += take;
            written += take;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use rempart_crypto::SoftwareProvider;

    // Widely used TLS 1.2 PRF SHA-256 vector.
    const SECRET: &str = "9bbe436ba940f017b17652849a71db35";
    const SEED: &str = "a0ba9f936cda311827a6f796ffd5198c";
    const OUTPUT: &str = "e3f229ba727be17b8d122620557cd453c2aab21d07c3d495329b52d4e61edb5a6b301791e90d35c9c9a46b4e14baf9af0fa022f7077def17abfd3797c0564bab4fbc91666e9def9b97fce34f796789baa48082d122ee42c5a72e5a5110fff70187347b66";

    fn prf(psk_max: Option<usize>, secret: &[u8], seed: &[u8], label: &[u8]) -> Tls12Prf {
        let mut prf = Tls12Prf::new(HashAlgorithm::Sha256, psk_max);
        prf.input(DerivationStep::Seed, seed).unwrap();
        prf.input(DerivationStep::Secret, secret).unwrap();
        prf.input(DerivationStep::Label, label).unwrap();
        prf
    }

    #[test]
    fn test_prf_sha256_vector() {
        let provider = SoftwareProvider::new();
        let mut prf = prf(
            None,
            &hex::decode(SECRET).unwrap(),
            &hex::decode(SEED).unwrap(),
            b"test label",
        );
        let mut out = [0u8; 100];
        let (head, tail) = out.split_at_mut(33);
        prf.read(&provider, head).unwrap();
        prf.read(&provider, tail).unwrap();
        assert_eq!(hex::encode(out), OUTPUT);
    }

    #[test]
    fn test_psk_to_ms() {
        let provider = SoftwareProvider::new();
        let mut prf = prf(Some(64), &[1u8; 16], &[2u8; 32], b"master secret");
        let mut master = [0u8; 48];
        prf.read(&provider, &mut master).unwrap();
        assert_eq!(
            hex::encode(master),
            "6d853570806c070984520a1ea6dc76fff4a4740310533a1ae85d8218d75794fdd83b22c96145a1d36fbd50e0f642d3e2"
        );
    }

    #[test]
    fn test_premaster_secret_layout() {
        let pms = psk_premaster_secret(&[0xAA, 0xBB], 64).unwrap();
        assert_eq!(&*pms, &[0, 2, 0, 0, 0, 2, 0xAA, 0xBB]);
        assert_eq!(
            psk_premaster_secret(&[0u8; 65], 64),
            Err(EngineError::InvalidArgument)
        );
    }

    #[test]
    fn test_strict_input_order() {
        let provider = SoftwareProvider::new();
        let mut prf = Tls12Prf::new(HashAlgorithm::Sha256, None);
        assert_eq!(
            prf.input(DerivationStep::Secret, b"k"),
            Err(EngineError::BadState)
        );
        assert_eq!(
            prf.input(DerivationStep::Salt, b"k"),
            Err(EngineError::InvalidArgument)
        );
        prf.input(DerivationStep::Seed, b"s").unwrap();
        assert_eq!(
            prf.input(DerivationStep::Label, b"l"),
            Err(EngineError::BadState)
        );
        assert_eq!(prf.read(&provider, &mut [0u8; 1]), Err(EngineError::BadState));
        prf.input(DerivationStep::Secret, b"k").unwrap();
        prf.input(DerivationStep::Label, b"l").unwrap();
        prf.read(&provider, &mut [0u8; 1]).unwrap();
        assert_eq!(
            prf.input(DerivationStep::Seed, b"s"),
            Err(EngineError::BadState)
        );
    }
}
