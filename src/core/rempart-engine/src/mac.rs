//! MAC operations.

use rempart_crypto::algorithm::{BLOCK_CIPHER_MAX_BLOCK_SIZE, MAC_MAX_SIZE};
use rempart_crypto::{Algorithm, FullLengthMac, KeyType, MacAlgorithm, MacContext};
use tracing::debug;

use crate::attributes::{KeyId, Usage};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::hash::verify_equal;
use crate::policy::{mac_key_can_do, mac_length};
use crate::slots::release_with;
use crate::staging::{fill_failure, LocalInput, LocalOutput, FAILURE_FILLER};

/// Shortest MAC the engine will produce.
const MAC_MIN_SIZE: usize = 4;

/// Rejects MAC lengths no key type could ever support.
fn check_requested_length(alg: Algorithm) -> Result<(), EngineError> {
    if let Algorithm::Mac(mac) = alg {
        let longest = match mac.base {
            FullLengthMac::Hmac(hash) => hash.output_len(),
            FullLengthMac::Cmac | FullLengthMac::CbcMac => BLOCK_CIPHER_MAX_BLOCK_SIZE,
        };
        if mac.truncated_length() > longest {
            return Err(EngineError::InvalidArgument);
        }
    }
    Ok(())
}

/// Resolves the MAC algorithm and its output size for a key type.
fn finalize_algorithm(
    alg: Algorithm,
    key_type: KeyType,
) -> Result<(MacAlgorithm, usize), EngineError> {
    let Algorithm::Mac(mac) = alg else {
        return Err(EngineError::InvalidArgument);
    };
    mac_key_can_do(mac, key_type)?;
    let mac_size = mac_length(key_type, mac);
    if mac_size < MAC_MIN_SIZE {
        return Err(EngineError::NotSupported);
    }
    if mac_size > mac_length(key_type, mac.full_length()) {
        return Err(EngineError::InvalidArgument);
    }
    if mac_size > MAC_MAX_SIZE {
        return Err(EngineError::NotSupported);
    }
    Ok((mac, mac_size))
}

fn usage_for(is_sign: bool) -> Usage {
    if is_sign {
        Usage::SIGN_MESSAGE
    } else {
        Usage::VERIFY_MESSAGE
    }
}

struct ActiveMac {
    alg: MacAlgorithm,
    mac_size: usize,
    is_sign: bool,
    ctx: Box<dyn MacContext>,
}

/// Multi-part MAC computation or verification.
#[derive(Default)]
pub struct MacOperation {
    active: Option<ActiveMac>,
}

impl MacOperation {
    /// An inactive operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the operation has been set up and not yet finished.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Length of the MAC this operation produces, zero when inactive.
    pub fn mac_size(&self) -> usize {
        self.active.as_ref().map_or(0, |active| active.mac_size)
    }

    /// Starts computing a MAC with `key`.
    pub fn sign_setup(
        &mut self,
        engine: &Engine,
        key: KeyId,
        alg: impl Into<Algorithm>,
    ) -> Result<(), EngineError> {
        self.setup(engine, key, alg.into(), true)
    }

    /// Starts verifying a MAC with `key`.
    pub fn verify_setup(
        &mut self,
        engine: &Engine,
        key: KeyId,
        alg: impl Into<Algorithm>,
    ) -> Result<(), EngineError> {
        self.setup(engine, key, alg.into(), false)
    }

    fn setup(
        &mut self,
        engine: &Engine,
        key: KeyId,
        alg: Algorithm,
        is_sign: bool,
    ) -> Result<(), EngineError> {
        let result = self.try_setup(engine, key, alg, is_sign);
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn try_setup(
        &mut self,
        engine: &Engine,
        key: KeyId,
        alg: Algorithm,
        is_sign: bool,
    ) -> Result<(), EngineError> {
        if self.is_active() {
            return Err(EngineError::BadState);
        }
        check_requested_length(alg)?;
        let lock = engine.lock_key_with_policy(key, usage_for(is_sign), Some(alg))?;
        let result = finalize_algorithm(alg, lock.key_type()).and_then(|(mac, mac_size)| {
            let ctx = engine.provider().mac_setup(lock.key_ref(), mac.base)?;
            Ok(ActiveMac {
                alg: mac,
                mac_size,
                is_sign,
                ctx,
            })
        });
        let active = release_with(lock, result)?;
        debug!(key_id = %key, alg = %alg, is_sign, "MAC operation started");
        self.active = Some(active);
        Ok(())
    }

    /// Absorbs `input`.
    pub fn update(&mut self, input: &[u8]) -> Result<(), EngineError> {
        let active = self.active.as_mut().ok_or(EngineError::BadState)?;
        if input.is_empty() {
            return Ok(());
        }
        let input = LocalInput::stage(input)?;
        active.ctx.update(&input);
        Ok(())
    }

    /// Writes the MAC to `out` and returns its length.
    ///
    /// Unused trailing bytes of `out` are set to `!`, as is the whole buffer
    /// on failure. The operation is inactive afterwards.
    pub fn sign_finish(&mut self, out: &mut [u8]) -> Result<usize, EngineError> {
        let result = self.try_sign_finish(out);
        match result {
            Ok(written) => out[written..].fill(FAILURE_FILLER),
            Err(_) => fill_failure(out),
        }
        self.abort();
        result
    }

    fn try_sign_finish(&mut self, out: &mut [u8]) -> Result<usize, EngineError> {
        let active = self.active.take().ok_or(EngineError::BadState)?;
        if !active.is_sign || active.mac_size == 0 {
            return Err(EngineError::BadState);
        }
        if out.len() < active.mac_size {
            return Err(EngineError::BufferTooSmall);
        }
        let full = active.ctx.finish();
        let mac = full
            .get(..active.mac_size)
            .ok_or(EngineError::CorruptionDetected)?;
        LocalOutput::from_vec(mac.to_vec()).commit(out)
    }

    /// Checks the computed MAC against `expected` in constant time. The
    /// operation is inactive afterwards.
    pub fn verify_finish(&mut self, expected: &[u8]) -> Result<(), EngineError> {
        let result = self.try_verify_finish(expected);
        self.abort();
        result
    }

    fn try_verify_finish(&mut self, expected: &[u8]) -> Result<(), EngineError> {
        let active = self.active.take().ok_or(EngineError::BadState)?;
        if active.is_sign {
            return Err(EngineError::BadState);
        }
        if active.mac_size != expected.len() {
            return Err(EngineError::InvalidSignature);
        }
        let expected = LocalInput::stage(expected)?;
        let full = active.ctx.finish();
        let mac = full
            .get(..active.mac_size)
            .ok_or(EngineError::CorruptionDetected)?;
        verify_equal(mac, &expected)
    }

    /// Discards the operation. Aborting an inactive operation succeeds.
    pub fn abort(&mut self) {
        self.active = None;
    }
}

impl std::fmt::Debug for MacOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("MacOperation");
        if let Some(active) = &self.active {
            s.field("alg", &Algorithm::Mac(active.alg).to_string())
                .field("mac_size", &active.mac_size)
                .field("is_sign", &active.is_sign);
        }
        s.finish()
    }
}

impl Engine {
    fn mac_compute_inner(
        &self,
        key: KeyId,
        alg: Algorithm,
        input: &[u8],
        out_len: usize,
        is_sign: bool,
    ) -> Result<LocalOutput, EngineError> {
        check_requested_length(alg)?;
        let lock = self.lock_key_with_policy(key, usage_for(is_sign), Some(alg))?;
        let result = finalize_algorithm(alg, lock.key_type()).and_then(|(mac, mac_size)| {
            if out_len < mac_size {
                return Err(EngineError::BufferTooSmall);
            }
            let input = LocalInput::stage(input)?;
            let mut ctx = self.provider().mac_setup(lock.key_ref(), mac.base)?;
            ctx.update(&input);
            let mut full = ctx.finish();
            full.truncate(mac_size);
            Ok(LocalOutput::from_vec(std::mem::take(&mut *full)))
        });
        release_with(lock, result)
    }

    /// Computes a MAC over `input` in one call and returns its length.
    ///
    /// Unused trailing bytes of `out` are set to `!`, as is the whole buffer
    /// on failure.
    pub fn mac_compute(
        &self,
        key: KeyId,
        alg: impl Into<Algorithm>,
        input: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let result = self
            .mac_compute_inner(key, alg.into(), input, out.len(), true)
            .and_then(|mac| mac.commit(out));
        match result {
            Ok(written) => out[written..].fill(FAILURE_FILLER),
            Err(_) => fill_failure(out),
        }
        result
    }

    /// Verifies a MAC over `input` in one call.
    pub fn mac_verify(
        &self,
        key: KeyId,
        alg: impl Into<Algorithm>,
        input: &[u8],
        mac: &[u8],
    ) -> Result<(), EngineError> {
        let computed = self.mac_compute_inner(key, alg.into(), input, MAC_MAX_SIZE, false)?;
        let mac = LocalInput::stage(mac)?;
        verify_equal(&computed, &mac)
    }
}
