//! HKDF extract-and-expand (RFC 5869).

use rempart_crypto::{HashAlgorithm, MacContext, Provider};
use zeroize::Zeroizing;

use super::{hmac, hmac_setup, DerivationStep};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Init,
    Started,
    Keyed,
    Output,
}

/// HKDF state: salt, then secret, then info, then output.
pub(super) struct Hkdf {
    hash: HashAlgorithm,
    phase: Phase,
    extract: Option<Box<dyn MacContext>>,
    prk: Zeroizing<Vec<u8>>,
    info: Option<Zeroizing<Vec<u8>>>,
    block_number: u8,
    block: Zeroizing<Vec<u8>>,
    offset: usize,
}

impl Hkdf {
    pub(super) fn new(hash: HashAlgorithm) -> Self {
        Self {
            hash,
            phase: Phase::Init,
            extract: None,
            prk: Zeroizing::new(Vec::new()),
            info: None,
            block_number: 0,
            block: Zeroizing::new(Vec::new()),
            offset: 0,
        }
    }

    pub(super) fn input(
        &mut self,
        provider: &dyn Provider,
        step: DerivationStep,
        data: &[u8],
    ) -> Result<(), EngineError> {
        match step {
            DerivationStep::Salt => {
                if self.phase != Phase::Init {
                    return Err(EngineError::BadState);
                }
                self.start(provider, data)
            }
            DerivationStep::Secret => {
                if self.phase == Phase::Init {
                    self.start(provider, &[])?;
                }
                if self.phase != Phase::Started {
                    return Err(EngineError::BadState);
                }
                let mut extract = self.extract.take().ok_or(EngineError::CorruptionDetected)?;
                extract.update(data);
                self.prk = extract.finish();
                self.offset = self.hash.output_len();
                self.block_number = 0;
                self.phase = Phase::Keyed;
                Ok(())
            }
            DerivationStep::Info => {
                if self.phase == Phase::Output || self.info.is_some() {
                    return Err(EngineError::BadState);
                }
                self.info = Some(Zeroizing::new(data.to_vec()));
                Ok(())
            }
            DerivationStep::Label | DerivationStep::Seed => Err(EngineError::InvalidArgument),
        }
    }

    fn start(&mut self, provider: &dyn Provider, salt: &[u8]) -> Result<(), EngineError> {
        self.extract = Some(hmac_setup(provider, self.hash, salt)?);
        self.phase = Phase::Started;
        Ok(())
    }

    /// Fills `out` with the next bytes of the output keying material.
    pub(super) fn read(
        &mut self,
        provider: &dyn Provider,
        out: &mut [u8],
    ) -> Result<(), EngineError> {
        if self.phase < Phase::Keyed {
            return Err(EngineError::BadState);
        }
        let Some(info) = self.info.as_deref() else {
            return Err(EngineError::BadState);
        };
        self.phase = Phase::Output;

        let hash_len = self.hash.output_len();
        let mut written = 0;
        while written < out.len() {
            if self.offset == hash_len {
                if self.block_number == 0xff {
                    return Err(EngineError::BadState);
                }
                self.block_number += 1;
                // T(n) = HMAC(PRK, T(n-1) || info || n), T(0) empty.
                let counter = [self.block_number];
                self.block = hmac(
                    provider,
                    self.hash,
                    &self.prk,
                    &[self.block.as_slice(), info.as_slice(), &counter],
                )?;
                self.offset = 0;
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
