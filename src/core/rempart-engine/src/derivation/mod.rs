//! Key derivation operations.
//!
//! A [`KeyDerivationOperation`] is set up with a KDF (optionally behind a
//! key agreement), fed its inputs step by step, then read either as bytes or
//! as a new key. Reading is bounded by a capacity that only ever shrinks.
//! Asking for more than the remaining capacity exhausts the operation and
//! wipes its secret state.

mod hkdf;
mod tls12;

use std::sync::Arc;

use rempart_crypto::{
    Algorithm, FullLengthMac, HashAlgorithm, KdfAlgorithm, KeyAgreementAlgorithm, KeyRef,
    KeyType, MacContext, Provider, RawKeyAgreement,
};
use tracing::debug;
use zeroize::Zeroizing;

use self::hkdf::Hkdf;
use self::tls12::Tls12Prf;
use crate::agreement::shared_secret;
use crate::attributes::{KeyAttributes, KeyId, Usage};
use crate::creation::KeyCreation;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::keys::{set_des_parity, validate_unstructured_key_bits};
use crate::slots::release_with;
use crate::staging::{fill_failure, LocalInput};

/// Size of a TLS 1.2 master secret in bytes.
const TLS12_MASTER_SECRET_LEN: usize = 48;

/// Role of an input to a key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivationStep {
    /// Secret keying material.
    Secret,
    /// TLS PRF label.
    Label,
    /// HKDF salt.
    Salt,
    /// HKDF info.
    Info,
    /// TLS PRF seed.
    Seed,
}

fn hmac_setup(
    provider: &dyn Provider,
    hash: HashAlgorithm,
    key: &[u8],
) -> Result<Box<dyn MacContext>, EngineError> {
    let key = KeyRef::new(KeyType::Hmac, key.len() * 8, key);
    Ok(provider.mac_setup(key, FullLengthMac::Hmac(hash))?)
}

fn hmac(
    provider: &dyn Provider,
    hash: HashAlgorithm,
    key: &[u8],
    parts: &[&[u8]],
) -> Result<Zeroizing<Vec<u8>>, EngineError> {
    let mut ctx = hmac_setup(provider, hash, key)?;
    for part in parts {
        ctx.update(part);
    }
    Ok(ctx.finish())
}

/// Secrets go in as DERIVE keys, everything else as RAW_DATA keys; both
/// also accept plain bytes.
fn check_input_type(step: DerivationStep, key_type: Option<KeyType>) -> Result<(), EngineError> {
    match (step, key_type) {
        (_, None)
        | (DerivationStep::Secret, Some(KeyType::Derive))
        | (
            DerivationStep::Label
            | DerivationStep::Salt
            | DerivationStep::Info
            | DerivationStep::Seed,
            Some(KeyType::RawData),
        ) => Ok(()),
        _ => Err(EngineError::InvalidArgument),
    }
}

fn kdf_algorithm(alg: Algorithm) -> Result<KdfAlgorithm, EngineError> {
    match alg {
        Algorithm::KeyDerivation(kdf) => Ok(kdf),
        Algorithm::KeyAgreement(KeyAgreementAlgorithm::WithKdf(RawKeyAgreement::Ecdh, kdf)) => {
            Ok(kdf)
        }
        Algorithm::KeyAgreement(KeyAgreementAlgorithm::WithKdf(..)) => {
            Err(EngineError::NotSupported)
        }
        _ => Err(EngineError::InvalidArgument),
    }
}

fn require_tls12_hash(hash: HashAlgorithm) -> Result<(), EngineError> {
    match hash {
        HashAlgorithm::Sha256 | HashAlgorithm::Sha384 => Ok(()),
        _ => Err(EngineError::NotSupported),
    }
}

enum KdfState {
    /// Secret state wiped after exhaustion or a failed read.
    Wiped,
    Hkdf(Box<Hkdf>),
    Tls12Prf(Box<Tls12Prf>),
}

impl KdfState {
    /// Fresh state for `kdf` together with its initial capacity.
    fn new(kdf: KdfAlgorithm, psk_max: usize) -> Result<(Self, usize), EngineError> {
        match kdf {
            KdfAlgorithm::Hkdf(hash) => Ok((
                Self::Hkdf(Box::new(Hkdf::new(hash))),
                255 * hash.output_len(),
            )),
            KdfAlgorithm::Tls12Prf(hash) => {
                require_tls12_hash(hash)?;
                Ok((Self::Tls12Prf(Box::new(Tls12Prf::new(hash, None))), usize::MAX))
            }
            KdfAlgorithm::Tls12PskToMs(hash) => {
                require_tls12_hash(hash)?;
                Ok((
                    Self::Tls12Prf(Box::new(Tls12Prf::new(hash, Some(psk_max)))),
                    TLS12_MASTER_SECRET_LEN,
                ))
            }
        }
    }

    fn input(
        &mut self,
        provider: &dyn Provider,
        step: DerivationStep,
        data: &[u8],
    ) -> Result<(), EngineError> {
        match self {
            Self::Hkdf(hkdf) => hkdf.input(provider, step, data),
            Self::Tls12Prf(prf) => prf.input(step, data),
            Self::Wiped => Err(EngineError::BadState),
        }
    }

    fn read(&mut self, provider: &dyn Provider, out: &mut [u8]) -> Result<(), EngineError> {
        match self {
            Self::Hkdf(hkdf) => hkdf.read(provider, out),
            Self::Tls12Prf(prf) => prf.read(provider, out),
            Self::Wiped => Err(EngineError::BadState),
        }
    }
}

struct ActiveDerivation {
    alg: Algorithm,
    capacity: usize,
    can_output_key: bool,
    provider: Arc<dyn Provider>,
    state: KdfState,
}

impl ActiveDerivation {
    fn read(&mut self, out: &mut [u8]) -> Result<(), EngineError> {
        if out.len() > self.capacity {
            self.capacity = 0;
            return Err(EngineError::InsufficientData);
        }
        self.capacity -= out.len();
        self.state.read(self.provider.as_ref(), out)
    }

    /// Drops all secret state but keeps the algorithm, so later reads
    /// keep failing with `InsufficientData` until the caller aborts.
    fn wipe(&mut self) {
        self.capacity = 0;
        self.can_output_key = false;
        self.state = KdfState::Wiped;
    }
}

/// Multi-step key derivation.
#[derive(Default)]
pub struct KeyDerivationOperation {
    active: Option<ActiveDerivation>,
}

impl KeyDerivationOperation {
    /// A blank operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the operation has been set up.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Algorithm the operation was set up with.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.active.as_ref().map(|active| active.alg)
    }

    /// Starts a derivation with a KDF or a key agreement followed by a KDF.
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
        engine.ensure_initialized()?;
        let kdf = kdf_algorithm(alg)?;
        let (state, capacity) = KdfState::new(kdf, engine.config().tls12_psk_max_size)?;
        debug!(alg = %alg, capacity, "Key derivation started");
        self.active = Some(ActiveDerivation {
            alg,
            capacity,
            can_output_key: false,
            provider: engine.provider_handle(),
            state,
        });
        Ok(())
    }

    /// Remaining number of bytes that can be read.
    pub fn get_capacity(&self) -> Result<usize, EngineError> {
        self.active
            .as_ref()
            .map(|active| active.capacity)
            .ok_or(EngineError::BadState)
    }

    /// Lowers the capacity. It can never be raised.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), EngineError> {
        let active = self.active.as_mut().ok_or(EngineError::BadState)?;
        if capacity > active.capacity {
            return Err(EngineError::InvalidArgument);
        }
        active.capacity = capacity;
        Ok(())
    }

    fn input_internal(
        &mut self,
        step: DerivationStep,
        key_type: Option<KeyType>,
        data: &[u8],
    ) -> Result<(), EngineError> {
        let active = self.active.as_mut().ok_or(EngineError::BadState)?;
        check_input_type(step, key_type)?;
        let data = LocalInput::stage(data)?;
        active.state.input(active.provider.as_ref(), step, &data)
    }

    fn enable_key_output(&mut self, step: DerivationStep) {
        if step == DerivationStep::Secret {
            if let Some(active) = self.active.as_mut() {
                active.can_output_key = true;
            }
        }
    }

    /// Supplies a non-key input as bytes.
    ///
    /// A secret given this way cannot be turned into a key with
    /// [`KeyDerivationOperation::output_key`].
    pub fn input_bytes(&mut self, step: DerivationStep, data: &[u8]) -> Result<(), EngineError> {
        let result = self.input_internal(step, None, data);
        if result.is_err() {
            self.abort();
        }
        result
    }

    /// Supplies an input from a stored key.
    pub fn input_key(
        &mut self,
        engine: &Engine,
        step: DerivationStep,
        key: KeyId,
    ) -> Result<(), EngineError> {
        let result = self.try_input_key(engine, step, key);
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn try_input_key(
        &mut self,
        engine: &Engine,
        step: DerivationStep,
        key: KeyId,
    ) -> Result<(), EngineError> {
        let alg = self.algorithm().ok_or(EngineError::BadState)?;
        let lock = engine.lock_key_with_policy(key, Usage::DERIVE, Some(alg))?;
        let result = self.input_internal(step, Some(lock.key_type()), lock.material());
        release_with(lock, result)?;
        self.enable_key_output(step);
        Ok(())
    }

    /// Runs the operation's key agreement between `private_key` and `peer`
    /// and supplies the shared secret as input `step`.
    pub fn key_agreement(
        &mut self,
        engine: &Engine,
        step: DerivationStep,
        private_key: KeyId,
        peer: &[u8],
    ) -> Result<(), EngineError> {
        let result = self.try_key_agreement(engine, step, private_key, peer);
        if result.is_err() {
            self.abort();
        }
        result
    }

    fn try_key_agreement(
        &mut self,
        engine: &Engine,
        step: DerivationStep,
        private_key: KeyId,
        peer: &[u8],
    ) -> Result<(), EngineError> {
        let alg = self.algorithm().ok_or(EngineError::BadState)?;
        let base = match alg {
            Algorithm::KeyAgreement(agreement) if !agreement.is_raw() => agreement.base(),
            _ => return Err(EngineError::InvalidArgument),
        };
        let lock = engine.lock_key_with_policy(private_key, Usage::DERIVE, Some(alg))?;
        let secret = shared_secret(engine, base, &lock, peer);
        let secret = release_with(lock, secret)?;
        self.input_internal(step, Some(KeyType::Derive), &secret)?;
        self.enable_key_output(step);
        Ok(())
    }

    /// Fills `out` with derived bytes.
    ///
    /// On failure `out` is filled with `!` and the secret state is wiped.
    pub fn output_bytes(&mut self, out: &mut [u8]) -> Result<(), EngineError> {
        let active = self.active.as_mut().ok_or(EngineError::BadState)?;
        if out.is_empty() && active.capacity == 0 {
            return Err(EngineError::InsufficientData);
        }
        let result = active.read(out);
        if let Err(e) = result {
            debug!(alg = %active.alg, error = %e, "Key derivation output failed, wiping state");
            active.wipe();
            fill_failure(out);
        }
        result
    }

    /// Derives a symmetric key of the size and type in `attributes`.
    ///
    /// Requires the secret to have been supplied as a key or through a key
    /// agreement.
    pub fn output_key(
        &mut self,
        engine: &Engine,
        attributes: &KeyAttributes,
    ) -> Result<KeyId, EngineError> {
        let bits = attributes.bits;
        if bits == 0 {
            return Err(EngineError::InvalidArgument);
        }
        let active = self.active.as_ref().ok_or(EngineError::BadState)?;
        if !active.can_output_key {
            return Err(EngineError::NotPermitted);
        }
        let creation = KeyCreation::start(engine, attributes)?;
        let key_type = attributes.key_type.ok_or(EngineError::InvalidArgument)?;
        if !key_type.is_unstructured() || bits % 8 != 0 {
            return Err(EngineError::InvalidArgument);
        }
        let mut material = Zeroizing::new(vec![0u8; bits / 8]);
        self.output_bytes(&mut material)?;
        if key_type == KeyType::Des {
            set_des_parity(&mut material);
        }
        validate_unstructured_key_bits(key_type, bits)?;
        creation.finish(key_type, bits, attributes.policy, material)
    }

    /// Discards the operation and all its secrets. Aborting a blank
    /// operation succeeds.
    pub fn abort(&mut self) {
        self.active = None;
    }
}

impl std::fmt::Debug for KeyDerivationOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("KeyDerivationOperation");
        if let Some(active) = &self.active {
            s.field("alg", &active.alg)
                .field("capacity", &active.capacity)
                .field("can_output_key", &active.can_output_key);
        }
        s.finish()
    }
}
