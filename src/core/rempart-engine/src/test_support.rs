//! Shared fixtures for unit tests.

use std::sync::Arc;

use rempart_crypto::{
    CryptoError, FullLengthMac, HashAlgorithm, HashContext, KeyRef, KeyType, MacContext, Provider,
    SoftwareProvider,
};
use rempart_storage::MemoryBackend;
use zeroize::Zeroizing;

use crate::attributes::{KeyAttributes, KeyId};
use crate::config::EngineConfig;
use crate::engine::Engine;

/// Provider whose entropy source returns only half of what is asked.
pub struct ShortEntropy(pub SoftwareProvider);

impl Provider for ShortEntropy {
    fn name(&self) -> &str {
        "short-entropy"
    }

    fn hash_setup(&self, alg: HashAlgorithm) -> Result<Box<dyn HashContext>, CryptoError> {
        self.0.hash_setup(alg)
    }

    fn mac_setup(
        &self,
        key: KeyRef<'_>,
        alg: FullLengthMac,
    ) -> Result<Box<dyn MacContext>, CryptoError> {
        self.0.mac_setup(key, alg)
    }

    fn import_key(
        &self,
        key_type: KeyType,
        bits: usize,
        data: &[u8],
    ) -> Result<(Zeroizing<Vec<u8>>, usize), CryptoError> {
        self.0.import_key(key_type, bits, data)
    }

    fn entropy(&self, buf: &mut [u8]) -> Result<usize, CryptoError> {
        let half = buf.len() / 2;
        self.0.entropy(&mut buf[..half])
    }
}

/// Initialized engine backed by the software provider.
pub fn engine() -> Engine {
    let engine = Engine::new(EngineConfig::default(), Arc::new(SoftwareProvider::new()))
        .expect("default config is valid");
    engine.init().expect("OS entropy available");
    engine
}

/// Initialized engine with an in-memory store for persistent keys.
pub fn persistent_engine(storage: Arc<MemoryBackend>) -> Engine {
    let engine = Engine::new(EngineConfig::default(), Arc::new(SoftwareProvider::new()))
        .expect("default config is valid")
        .with_storage(storage);
    engine.init().expect("OS entropy available");
    engine
}

/// Imports `data` under `attrs` and returns the new id.
pub fn import(engine: &Engine, attrs: KeyAttributes, data: &[u8]) -> KeyId {
    engine.import_key(&attrs, data).expect("import succeeds")
}
