//! Hash operations.

use rempart_crypto::{Algorithm, HashAlgorithm, HashContext};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::staging::{fill_failure, LocalInput, LocalOutput};

/// Extracts the hash from `alg`, rejecting every other family.
pub(crate) fn hash_algorithm(alg: Algorithm) -> Result<HashAlgorithm, EngineError> {
    match alg {
        Algorithm::Hash(hash) => Ok(hash),
        _ => Err(EngineError::InvalidArgument),
    }
}

/// Constant-time equality of a computed value and a caller-supplied one.
pub(crate) fn verify_equal(computed: &[u8], expected: &[u8]) -> Result<(), EngineError> {
    if computed.len() != expected.len() || !bool::from(computed.ct_eq(expected)) {
        return Err(EngineError::InvalidSignature);
    }
    Ok(())
}

struct ActiveHash {
    alg: HashAlgorithm,
    ctx: Box<dyn HashContext>,
}

/// Multi-part hash computation.
///
/// Any failure aborts the operation, after which it must be set up again.
#[derive(Default)]
pub struct HashOperation {
    active: Option<ActiveHash>,
}

impl HashOperation {
    /// An inactive operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the operation has been set up and not yet finished.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Algorithm of the active operation.
    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        self.active.as_ref().map(|active| active.alg)
    }

    /// Starts hashing with `alg`.
    pub fn setup(&mut self, engine: &Engine, alg: impl Into<Algorithm>) -> Result<(), EngineError> {
        let result = self.try_setup(engine, alg.into());
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn try_setup(&mut self, engine: &Engine, alg: Algorithm) -> Result<(), EngineError> {
        if self.is_active() {
            return Err(EngineError::BadState);
        }
        let alg = hash_algorithm(alg)?;
        let ctx = engine.provider().hash_setup(alg)?;
        debug!(alg = %alg, "Hash operation started");
        self.active = Some(ActiveHash { alg, ctx });
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

    fn finish_digest(&mut self) -> Result<LocalOutput, EngineError> {
        let active = self.active.take().ok_or(EngineError::BadState)?;
        Ok(LocalOutput::from_vec(active.ctx.finish()))
    }

    /// Writes the digest to `out` and returns its length. The operation is
    /// inactive afterwards whatever the outcome.
    pub fn finish(&mut self, out: &mut [u8]) -> Result<usize, EngineError> {
        let digest = self.finish_digest();
        self.abort();
        digest?.commit(out)
    }

    /// Compares the digest with `expected` in constant time.
    pub fn verify(&mut self, expected: &[u8]) -> Result<(), EngineError> {
        let digest = self.finish_digest();
        self.abort();
        let expected = LocalInput::stage(expected)?;
        verify_equal(&digest?, &expected)
    }

    /// Copies the running state into the inactive `target`.
    pub fn clone_to(&self, target: &mut HashOperation) -> Result<(), EngineError> {
        let source = self.active.as_ref().ok_or(EngineError::BadState)?;
        if target.is_active() {
            return Err(EngineError::BadState);
        }
        target.active = Some(ActiveHash {
            alg: source.alg,
            ctx: source.ctx.box_clone(),
        });
        Ok(())
    }

    /// Discards the operation. Aborting an inactive operation succeeds.
    pub fn abort(&mut self) {
        self.active = None;
    }
}

impl std::fmt::Debug for HashOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashOperation")
            .field("alg", &self.algorithm())
            .finish()
    }
}

impl Engine {
    /// Hashes `input` in one call, writing the digest to `out`.
    ///
    /// On failure `out` is filled with `!`.
    pub fn hash_compute(
        &self,
        alg: impl Into<Algorithm>,
        input: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let result = self.hash_compute_inner(alg.into(), input, out);
        if result.is_err() {
            fill_failure(out);
        }
        result
    }

    fn hash_compute_inner(
        &self,
        alg: Algorithm,
        input: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let alg = hash_algorithm(alg)?;
        if out.len() < alg.output_len() {
            return Err(EngineError::BufferTooSmall);
        }
        let input = LocalInput::stage(input)?;
        let mut ctx = self.provider().hash_setup(alg)?;
        ctx.update(&input);
        LocalOutput::from_vec(ctx.finish()).commit(out)
    }

    /// Hashes `input` and compares the digest with `expected` in constant
    /// time.
    pub fn hash_compare(
        &self,
        alg: impl Into<Algorithm>,
        input: &[u8],
        expected: &[u8],
    ) -> Result<(), EngineError> {
        let alg = hash_algorithm(alg.into())?;
        let input = LocalInput::stage(input)?;
        let mut ctx = self.provider().hash_setup(alg)?;
        ctx.update(&input);
        let digest = LocalOutput::from_vec(ctx.finish());
        verify_equal(&digest, expected)
    }
}
