//! Engine state: configuration, provider, storage, slot table and DRBG.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rempart_crypto::{Algorithm, Provider};
use rempart_storage::StorageBackend;
use tracing::{debug, info};

use crate::attributes::{KeyId, Usage};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::policy::check_policy;
use crate::random::RandomGenerator;
use crate::slots::{release_with, KeyLock, KeySlotStore};

/// One isolated key store and operation dispatcher.
///
/// Lifecycle: [`Engine::new`] builds the state, [`Engine::init`] seeds the
/// random generator, [`Engine::free`] wipes every key and unseeds. Dropping
/// the engine frees it. Key operations before `init` fail with `BadState`.
pub struct Engine {
    config: EngineConfig,
    provider: Arc<dyn Provider>,
    storage: Option<Arc<dyn StorageBackend>>,
    slots: KeySlotStore,
    rng: Mutex<RandomGenerator>,
    initialized: AtomicBool,
}

impl Engine {
    /// Creates an engine that dispatches to `provider`.
    pub fn new(config: EngineConfig, provider: Arc<dyn Provider>) -> Result<Self, EngineError> {
        config.validate()?;
        debug!(
            slots = config.key_slot_count,
            provider = provider.name(),
            "Engine created"
        );
        Ok(Self {
            slots: KeySlotStore::new(config.key_slot_count),
            rng: Mutex::new(RandomGenerator::new(config.rng_max_request)),
            config,
            provider,
            storage: None,
            initialized: AtomicBool::new(false),
        })
    }

    /// Attaches a storage backend for persistent keys.
    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Seeds the random generator. Calling it again is a no-op.
    pub fn init(&self) -> Result<(), EngineError> {
        if self.is_initialized() {
            return Ok(());
        }
        {
            let mut rng = self.rng.lock().map_err(|_| EngineError::CorruptionDetected)?;
            rng.init();
            rng.seed(self.provider.as_ref())?;
        }
        self.initialized.store(true, Ordering::Release);
        info!(
            provider = self.provider.name(),
            slots = self.config.key_slot_count,
            persistent = self.storage.is_some(),
            "Engine initialized"
        );
        Ok(())
    }

    /// Wipes every key from memory and unseeds the random generator.
    pub fn free(&self) {
        let was_initialized = self.initialized.swap(false, Ordering::AcqRel);
        let wiped = self.slots.wipe_all();
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .free();
        if was_initialized {
            info!(wiped, "Engine freed");
        }
    }

    /// Whether [`Engine::init`] has completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Configuration in effect.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The slot table.
    pub fn slots(&self) -> &KeySlotStore {
        &self.slots
    }

    pub(crate) fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Shared handle for operations that outlive a single call.
    pub(crate) fn provider_handle(&self) -> Arc<dyn Provider> {
        Arc::clone(&self.provider)
    }

    pub(crate) fn storage(&self) -> Option<&dyn StorageBackend> {
        self.storage.as_deref()
    }

    pub(crate) fn ensure_initialized(&self) -> Result<(), EngineError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(EngineError::BadState)
        }
    }

    /// Runs `f` with exclusive access to the random generator.
    pub(crate) fn with_rng<T>(
        &self,
        f: impl FnOnce(&mut RandomGenerator) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut rng = self.rng.lock().map_err(|_| EngineError::CorruptionDetected)?;
        f(&mut rng)
    }

    /// Fills `output` with random bytes.
    pub fn generate_random(&self, output: &mut [u8]) -> Result<(), EngineError> {
        self.with_rng(|rng| rng.generate(output))
    }

    /// Locks a key without any policy check.
    ///
    /// The key cannot be destroyed while the returned lock is alive.
    pub fn lock_key(&self, id: KeyId) -> Result<KeyLock<'_>, EngineError> {
        self.ensure_initialized()?;
        self.slots.lock(id, self.storage())
    }

    /// Locks a key after checking that its policy allows `usage` and, when
    /// given, `alg`.
    pub(crate) fn lock_key_with_policy(
        &self,
        id: KeyId,
        usage: Usage,
        alg: Option<Algorithm>,
    ) -> Result<KeyLock<'_>, EngineError> {
        let lock = self.lock_key(id)?;
        match check_policy(lock.policy(), lock.key_type(), usage, alg) {
            Ok(()) => Ok(lock),
            Err(e) => release_with(lock, Err(e)),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.free();
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("provider", &self.provider.name())
            .field("persistent", &self.storage.is_some())
            .field("slots", &self.slots)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::attributes::KeyAttributes;
    use crate::test_support::{engine, import, ShortEntropy};
    use rempart_crypto::{KeyType, SoftwareProvider};

    #[test]
    fn test_init_idempotent_and_free() {
        let engine = engine();
        assert!(engine.is_initialized());
        engine.init().unwrap();

        engine.free();
        assert!(!engine.is_initialized());
        let mut buf = [0u8; 4];
        assert_eq!(engine.generate_random(&mut buf), Err(EngineError::BadState));

        engine.init().unwrap();
        engine.generate_random(&mut buf).unwrap();
    }

    #[test]
    fn test_free_with_live_lock() {
        let engine = engine();
        let attrs = KeyAttributes::new()
            .with_type(KeyType::RawData)
            .with_usage(Usage::EXPORT);
        let a = import(&engine, attrs.clone(), b"first");
        let lock_a = engine.lock_key(a).unwrap();

        engine.free();
        engine.init().unwrap();
        let b = import(&engine, attrs, b"second");
        assert_eq!(b, a);
        let lock_b = engine.lock_key(b).unwrap();
        drop(lock_a);

        assert_eq!(engine.destroy_key(b), Err(EngineError::GenericError));
        let mut out = [0u8; 6];
        assert_eq!(engine.export_key(b, &mut out).unwrap(), 6);
        assert_eq!(&out, b"second");
        lock_b.release().unwrap();
        engine.destroy_key(b).unwrap();
    }

    #[test]
    fn test_random_before_init() {
        let engine =
            Engine::new(EngineConfig::default(), Arc::new(SoftwareProvider::new())).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(engine.generate_random(&mut buf), Err(EngineError::BadState));
        assert_eq!(
            engine.lock_key(KeyId::new(1)).unwrap_err(),
            EngineError::BadState
        );
    }

    #[test]
    fn test_init_without_entropy() {
        let engine = Engine::new(
            EngineConfig::default(),
            Arc::new(ShortEntropy(SoftwareProvider::new())),
        )
        .unwrap();
        assert_eq!(engine.init(), Err(EngineError::InsufficientEntropy));
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            key_slot_count: 0,
            ..EngineConfig::default()
        };
        assert_eq!(
            Engine::new(config, Arc::new(SoftwareProvider::new())).unwrap_err(),
            EngineError::InvalidArgument
        );
    }

    #[test]
    fn test_independent_instances() {
        let a = engine();
        let b = engine();
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        a.generate_random(&mut x).unwrap();
        b.generate_random(&mut y).unwrap();
        assert_ne!(x, y);
    }
}
