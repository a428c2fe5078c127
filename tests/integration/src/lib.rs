//! End-to-end tests for the Rempart engine.
//!
//! Each test drives a real [`Engine`] backed by the software provider, the
//! same way an application would.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::sync::{Arc, Once};

use anyhow::{Context, Result};
use rempart_crypto::SoftwareProvider;
use rempart_engine::{Engine, EngineConfig};
use rempart_storage::StorageBackend;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Harness
// ============================================================================

static TRACING: Once = Once::new();

/// Routes engine logs to the test output. Set `RUST_LOG` to see them.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// An initialized engine, optionally persisting keys to `storage`.
pub fn start_engine(storage: Option<Arc<dyn StorageBackend>>) -> Result<Engine> {
    init_tracing();
    let mut engine = Engine::new(EngineConfig::default(), Arc::new(SoftwareProvider::new()))
        .context("engine configuration rejected")?;
    if let Some(storage) = storage {
        engine = engine.with_storage(storage);
    }
    engine.init().context("engine failed to seed")?;
    tracing::info!(engine = ?engine, "Test engine started");
    Ok(engine)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rempart_crypto::{AeadAlgorithm, HashAlgorithm, KdfAlgorithm, KeyType};
    use rempart_engine::{
        DerivationStep, EngineError, KeyAttributes, KeyDerivationOperation, KeyId, Lifetime,
        Usage,
    };
    use rempart_storage::MemoryBackend;

    #[test]
    fn test_generated_aes_gcm_round_trip() -> Result<()> {
        let engine = start_engine(None)?;
        let gcm = AeadAlgorithm::gcm();
        let attrs = KeyAttributes::new()
            .with_type(KeyType::Aes)
            .with_bits(128)
            .with_usage(Usage::ENCRYPT | Usage::DECRYPT)
            .with_algorithm(gcm);
        let key = engine.generate_key(&attrs)?;

        let nonce = [7u8; 12];
        let plaintext = b"attack at dawn";
        let mut sealed = [0u8; 14 + 16];
        let n = engine.aead_encrypt(key, gcm, &nonce, b"header", plaintext, &mut sealed)?;
        assert_eq!(n, sealed.len());

        let mut opened = [0u8; 14];
        let n = engine.aead_decrypt(key, gcm, &nonce, b"header", &sealed, &mut opened)?;
        assert_eq!(&opened[..n], plaintext);

        assert_eq!(
            engine.aead_decrypt(key, gcm, &nonce, b"other", &sealed, &mut opened),
            Err(EngineError::InvalidSignature)
        );
        Ok(())
    }

    #[test]
    fn test_hkdf_output_in_two_reads() -> Result<()> {
        let engine = start_engine(None)?;
        let alg = KdfAlgorithm::Hkdf(HashAlgorithm::Sha256);
        let mut op = KeyDerivationOperation::new();
        op.setup(&engine, alg)?;
        op.input_bytes(DerivationStep::Secret, &[0u8; 32])?;
        op.input_bytes(DerivationStep::Info, b"test")?;

        let mut okm = [0u8; 84];
        let (first, second) = okm.split_at_mut(42);
        op.output_bytes(first)?;
        op.output_bytes(second)?;
        op.abort();

        let mut expected = [0u8; 84];
        hkdf::Hkdf::<sha2::Sha256>::new(None, &[0u8; 32])
            .expand(b"test", &mut expected)
            .unwrap();
        assert_eq!(hex::encode(okm), hex::encode(expected));
        Ok(())
    }

    #[test]
    fn test_destroy_waits_for_readers() -> Result<()> {
        let engine = start_engine(None)?;
        let attrs = KeyAttributes::new()
            .with_type(KeyType::RawData)
            .with_usage(Usage::EXPORT);
        let key = engine.import_key(&attrs, b"locked bytes")?;

        let lock = engine.lock_key(key)?;
        assert_eq!(engine.destroy_key(key), Err(EngineError::GenericError));
        assert_eq!(engine.get_key_attributes(key)?.bits, 96);
        let mut exported = [0u8; 12];
        assert_eq!(engine.export_key(key, &mut exported)?, 12);
        assert_eq!(&exported, b"locked bytes");
        lock.release()?;

        engine.destroy_key(key)?;
        assert_eq!(
            engine.get_key_attributes(key).unwrap_err(),
            EngineError::DoesNotExist
        );
        Ok(())
    }

    #[test]
    fn test_free_leaves_outstanding_lock_stale() -> Result<()> {
        let engine = start_engine(None)?;
        let attrs = KeyAttributes::new()
            .with_type(KeyType::RawData)
            .with_usage(Usage::EXPORT);
        let old = engine.import_key(&attrs, b"before")?;
        let stale = engine.lock_key(old)?;

        engine.free();
        engine.init()?;
        let key = engine.import_key(&attrs, b"after!")?;
        assert_eq!(key, old);
        assert_eq!(stale.release(), Err(EngineError::BadState));

        let mut exported = [0u8; 6];
        engine.export_key(key, &mut exported)?;
        assert_eq!(&exported, b"after!");
        engine.destroy_key(key)?;
        Ok(())
    }

    #[test]
    fn test_persistent_key_survives_restart() -> Result<()> {
        let storage = Arc::new(MemoryBackend::new());
        let id = KeyId::new(0x42);
        let attrs = KeyAttributes::new()
            .with_type(KeyType::Hmac)
            .with_usage(Usage::EXPORT)
            .with_lifetime(Lifetime::PERSISTENT)
            .with_id(id);

        {
            let first = start_engine(Some(storage.clone() as Arc<dyn StorageBackend>))?;
            assert_eq!(first.import_key(&attrs, &[0x11; 32])?, id);
            assert_eq!(
                first.import_key(&attrs, &[0x22; 32]),
                Err(EngineError::AlreadyExists)
            );
        }

        let second = start_engine(Some(storage.clone() as Arc<dyn StorageBackend>))?;
        let restored = second.get_key_attributes(id)?;
        assert_eq!(restored.key_type, Some(KeyType::Hmac));
        assert_eq!(restored.bits, 256);
        assert_eq!(restored.lifetime, Lifetime::PERSISTENT);

        let mut exported = [0u8; 32];
        second.export_key(id, &mut exported)?;
        assert_eq!(exported, [0x11; 32]);

        second.destroy_key(id)?;
        assert!(!storage.exists(id.raw())?);
        assert_eq!(
            second.get_key_attributes(id).unwrap_err(),
            EngineError::DoesNotExist
        );
        Ok(())
    }
}
