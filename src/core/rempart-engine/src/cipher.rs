//! Unauthenticated cipher operations.

use rempart_crypto::algorithm::CIPHER_IV_MAX_SIZE;
use rempart_crypto::{Algorithm, CipherAlgorithm, CipherContext, Direction, KeyType};
use tracing::debug;
use zeroize::Zeroizing;

use crate::attributes::{KeyId, Usage};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::slots::release_with;
use crate::staging::{LocalInput, LocalOutput};

fn cipher_algorithm(alg: Algorithm) -> Result<CipherAlgorithm, EngineError> {
    match alg {
        Algorithm::Cipher(cipher) => Ok(cipher),
        _ => Err(EngineError::InvalidArgument),
    }
}

/// IV length generated for `alg` with a key of type `key_type`.
pub fn default_iv_length(key_type: KeyType, alg: CipherAlgorithm) -> usize {
    if !alg.requires_iv() {
        0
    } else if key_type == KeyType::ChaCha20 {
        12
    } else {
        key_type.block_len()
    }
}

fn usage_for(direction: Direction) -> Usage {
    match direction {
        Direction::Encrypt => Usage::ENCRYPT,
        Direction::Decrypt => Usage::DECRYPT,
    }
}

struct ActiveCipher {
    alg: CipherAlgorithm,
    direction: Direction,
    iv_required: bool,
    iv_set: bool,
    default_iv_length: usize,
    ctx: Box<dyn CipherContext>,
}

impl ActiveCipher {
    fn check_iv_state(&self) -> Result<(), EngineError> {
        if self.iv_set || !self.iv_required {
            return Err(EngineError::BadState);
        }
        Ok(())
    }

    fn check_ready(&self) -> Result<(), EngineError> {
        if self.iv_required && !self.iv_set {
            return Err(EngineError::BadState);
        }
        Ok(())
    }
}

/// Multi-part encryption or decryption with an unauthenticated cipher.
///
/// Modes that take an IV need [`CipherOperation::generate_iv`] or
/// [`CipherOperation::set_iv`] before any data. Any failure aborts the
/// operation.
#[derive(Default)]
pub struct CipherOperation {
    active: Option<ActiveCipher>,
}

impl CipherOperation {
    /// An inactive operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the operation has been set up and not yet finished.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Starts encrypting with `key`.
    pub fn encrypt_setup(
        &mut self,
        engine: &Engine,
        key: KeyId,
        alg: impl Into<Algorithm>,
    ) -> Result<(), EngineError> {
        self.setup(engine, key, alg.into(), Direction::Encrypt)
    }

    /// Starts decrypting with `key`.
    pub fn decrypt_setup(
        &mut self,
        engine: &Engine,
        key: KeyId,
        alg: impl Into<Algorithm>,
    ) -> Result<(), EngineError> {
        self.setup(engine, key, alg.into(), Direction::Decrypt)
    }

    fn setup(
        &mut self,
        engine: &Engine,
        key: KeyId,
        alg: Algorithm,
        direction: Direction,
    ) -> Result<(), EngineError> {
        let result = self.try_setup(engine, key, alg, direction);
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
        direction: Direction,
    ) -> Result<(), EngineError> {
        if self.is_active() {
            return Err(EngineError::BadState);
        }
        let cipher = cipher_algorithm(alg)?;
        let lock = engine.lock_key_with_policy(key, usage_for(direction), Some(alg))?;
        let key_type = lock.key_type();
        let ctx = engine
            .provider()
            .cipher_setup(lock.key_ref(), cipher, direction)
            .map_err(EngineError::from);
        let ctx = release_with(lock, ctx)?;
        debug!(key_id = %key, alg = %alg, ?direction, "Cipher operation started");
        self.active = Some(ActiveCipher {
            alg: cipher,
            direction,
            iv_required: cipher.requires_iv(),
            iv_set: false,
            default_iv_length: default_iv_length(key_type, cipher),
            ctx,
        });
        Ok(())
    }

    /// Algorithm and direction of the active operation.
    pub fn algorithm(&self) -> Option<(CipherAlgorithm, Direction)> {
        self.active.as_ref().map(|a| (a.alg, a.direction))
    }

    /// Generates a random IV, installs it and writes it to `out`.
    pub fn generate_iv(&mut self, engine: &Engine, out: &mut [u8]) -> Result<usize, EngineError> {
        let result = self.try_generate_iv(engine, out);
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn try_generate_iv(&mut self, engine: &Engine, out: &mut [u8]) -> Result<usize, EngineError> {
        let active = self.active.as_mut().ok_or(EngineError::BadState)?;
        active.check_iv_state()?;
        if out.len() < active.default_iv_length {
            return Err(EngineError::BufferTooSmall);
        }
        let mut iv = Zeroizing::new(vec![0u8; active.default_iv_length]);
        engine.generate_random(&mut iv)?;
        active.ctx.set_iv(&iv)?;
        active.iv_set = true;
        LocalOutput::from_vec(iv.to_vec()).commit(out)
    }

    /// Installs a caller-chosen IV.
    pub fn set_iv(&mut self, iv: &[u8]) -> Result<(), EngineError> {
        let result = self.try_set_iv(iv);
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn try_set_iv(&mut self, iv: &[u8]) -> Result<(), EngineError> {
        let active = self.active.as_mut().ok_or(EngineError::BadState)?;
        active.check_iv_state()?;
        if iv.len() > CIPHER_IV_MAX_SIZE {
            return Err(EngineError::InvalidArgument);
        }
        let iv = LocalInput::stage(iv)?;
        active.ctx.set_iv(&iv)?;
        active.iv_set = true;
        Ok(())
    }

    fn update_into(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), EngineError> {
        let active = self.active.as_mut().ok_or(EngineError::BadState)?;
        active.check_ready()?;
        if input.is_empty() {
            return Ok(());
        }
        active.ctx.update(input, output)?;
        Ok(())
    }

    /// Processes `input`, writes whatever output is ready to `out` and
    /// returns its length.
    pub fn update(&mut self, input: &[u8], out: &mut [u8]) -> Result<usize, EngineError> {
        let result = LocalInput::stage(input).and_then(|input| {
            let mut staged = LocalOutput::stage(input.len())?;
            self.update_into(&input, &mut staged)?;
            staged.commit(out)
        });
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn finish_into(&mut self, output: &mut Vec<u8>) -> Result<(), EngineError> {
        let active = self.active.take().ok_or(EngineError::BadState)?;
        active.check_ready()?;
        active.ctx.finish(output)?;
        Ok(())
    }

    /// Flushes the remaining output to `out`. The operation is inactive
    /// afterwards.
    pub fn finish(&mut self, out: &mut [u8]) -> Result<usize, EngineError> {
        let mut staged = LocalOutput::from_vec(Vec::new());
        let result = self.finish_into(&mut staged);
        self.abort();
        result?;
        staged.commit(out)
    }

    /// Discards the operation. Aborting an inactive operation succeeds.
    pub fn abort(&mut self) {
        self.active = None;
    }
}

impl std::fmt::Debug for CipherOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("CipherOperation");
        if let Some(active) = &self.active {
            s.field("alg", &active.alg)
                .field("direction", &active.direction)
                .field("iv_set", &active.iv_set);
        }
        s.finish()
    }
}

impl Engine {
    /// Encrypts `input` in one call. A random IV is generated and written
    /// in front of the ciphertext.
    pub fn cipher_encrypt(
        &self,
        key: KeyId,
        alg: impl Into<Algorithm>,
        input: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let alg = alg.into();
        cipher_algorithm(alg)?;
        let input = LocalInput::stage(input)?;
        let mut op = CipherOperation::new();
        op.encrypt_setup(self, key, alg)?;

        let iv_len = op.active.as_ref().map_or(0, |a| a.default_iv_length);
        let mut staged = LocalOutput::stage(iv_len + input.len())?;
        if iv_len > 0 {
            let mut iv = Zeroizing::new(vec![0u8; iv_len]);
            op.generate_iv(self, &mut iv)?;
            staged.extend_from_slice(&iv);
        }
        op.update_into(&input, &mut staged)?;
        op.finish_into(&mut staged)?;
        staged.commit(out)
    }

    /// Decrypts `input`, whose leading bytes are the IV, in one call.
    pub fn cipher_decrypt(
        &self,
        key: KeyId,
        alg: impl Into<Algorithm>,
        input: &[u8],
        out: &mut [u8],
    ) -> Result<usize, EngineError> {
        let alg = alg.into();
        cipher_algorithm(alg)?;
        let input = LocalInput::stage(input)?;
        let mut op = CipherOperation::new();
        op.decrypt_setup(self, key, alg)?;

        let iv_len = op.active.as_ref().map_or(0, |a| a.default_iv_length);
        if input.len() < iv_len {
            return Err(EngineError::InvalidArgument);
        }
        let (iv, body) = input.split_at(iv_len);
        if iv_len > 0 {
            op.set_iv(iv)?;
        }
        let mut staged = LocalOutput::stage(body.len())?;
        op.update_into(body, &mut staged)?;
        op.finish_into(&mut staged)?;
        staged.commit(out)
    }
}
