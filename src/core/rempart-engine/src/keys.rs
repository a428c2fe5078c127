//! Key management: import, generation, copy, export and destruction.

use tracing::{debug, info};
use zeroize::Zeroizing;

use rempart_crypto::KeyType;

use crate::attributes::{KeyAttributes, KeyId, Usage};
use crate::creation::{validate_optional_attributes, KeyCreation};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::policy::restrict_policy;
use crate::slots::{release_with, KeyData};
use crate::staging::{LocalInput, LocalOutput};

/// Checks that `bits` is a valid size for an unstructured key type.
pub fn validate_unstructured_key_bits(key_type: KeyType, bits: usize) -> Result<(), EngineError> {
    match key_type {
        KeyType::RawData | KeyType::Hmac | KeyType::Derive => {}
        KeyType::Aes | KeyType::Aria | KeyType::Camellia => {
            if !matches!(bits, 128 | 192 | 256) {
                return Err(EngineError::InvalidArgument);
            }
        }
        KeyType::Des => {
            if !matches!(bits, 64 | 128 | 192) {
                return Err(EngineError::InvalidArgument);
            }
        }
        KeyType::ChaCha20 => {
            if bits != 256 {
                return Err(EngineError::InvalidArgument);
            }
        }
        _ => return Err(EngineError::NotSupported),
    }
    if bits % 8 != 0 {
        return Err(EngineError::InvalidArgument);
    }
    Ok(())
}

/// Forces odd parity on every byte of a DES key.
pub(crate) fn set_des_parity(key: &mut [u8]) {
    for byte in key {
        let high = *byte & 0xFE;
        *byte = high | u8::from(high.count_ones() % 2 == 0);
    }
}

/// Copies exported bytes to the front of `out` and zeroes the rest.
fn commit_export(bytes: Vec<u8>, out: &mut [u8]) -> Result<usize, EngineError> {
    let written = LocalOutput::from_vec(bytes).commit(out)?;
    out[written..].fill(0);
    Ok(written)
}

impl Engine {
    /// Imports key material.
    ///
    /// Unstructured types take their size from the data. Asymmetric types
    /// are validated by the provider.
    pub fn import_key(
        &self,
        attributes: &KeyAttributes,
        data: &[u8],
    ) -> Result<KeyId, EngineError> {
        if data.is_empty() {
            return Err(EngineError::InvalidArgument);
        }
        let key_type = attributes.key_type.ok_or(EngineError::NotSupported)?;
        let creation = KeyCreation::start(self, attributes)?;
        let data = LocalInput::stage(data)?;

        let (material, bits) = if key_type.is_unstructured() {
            let bits = data
                .len()
                .checked_mul(8)
                .filter(|bits| *bits <= self.config().max_key_bits)
                .ok_or(EngineError::NotSupported)?;
            validate_unstructured_key_bits(key_type, bits)?;
            (Zeroizing::new(data.to_vec()), bits)
        } else {
            self.provider().import_key(key_type, attributes.bits, &data)?
        };
        if attributes.bits != 0 && attributes.bits != bits {
            return Err(EngineError::InvalidArgument);
        }
        creation.finish(key_type, bits, attributes.policy, material)
    }

    /// Generates a fresh key of the declared type and size.
    pub fn generate_key(&self, attributes: &KeyAttributes) -> Result<KeyId, EngineError> {
        let key_type = attributes.key_type.ok_or(EngineError::InvalidArgument)?;
        let bits = attributes.bits;
        if bits == 0 || key_type.is_public_key() {
            return Err(EngineError::InvalidArgument);
        }
        let creation = KeyCreation::start(self, attributes)?;

        let material = if key_type.is_unstructured() {
            validate_unstructured_key_bits(key_type, bits)?;
            let mut material = Zeroizing::new(vec![0u8; bits / 8]);
            self.generate_random(&mut material)?;
            if key_type == KeyType::Des {
                set_des_parity(&mut material);
            }
            material
        } else {
            self.with_rng(|rng| {
                Ok(self.provider().generate_key(key_type, bits, rng.rng()?)?)
            })?
        };
        creation.finish(key_type, bits, attributes.policy, material)
    }

    /// Copies `source` into a new key whose policy is the intersection of
    /// the requested policy and the source policy.
    pub fn copy_key(
        &self,
        source: KeyId,
        attributes: &KeyAttributes,
    ) -> Result<KeyId, EngineError> {
        let lock = self.lock_key_with_policy(source, Usage::COPY, None)?;
        let result = self.copy_locked(&lock, attributes);
        release_with(lock, result)
    }

    fn copy_locked(
        &self,
        source: &KeyData,
        attributes: &KeyAttributes,
    ) -> Result<KeyId, EngineError> {
        validate_optional_attributes(source.key_type(), source.bits(), attributes)?;
        let mut policy = attributes.policy;
        restrict_policy(source.key_type(), &mut policy, source.policy())?;
        let creation = KeyCreation::start(self, attributes)?;
        let material = Zeroizing::new(source.material().to_vec());
        creation.finish(source.key_type(), source.bits(), policy, material)
    }

    /// Exports key material into `out` and returns its length.
    pub fn export_key(&self, id: KeyId, out: &mut [u8]) -> Result<usize, EngineError> {
        if out.is_empty() {
            return Err(EngineError::BufferTooSmall);
        }
        let lock = self.lock_key_with_policy(id, Usage::EXPORT, None)?;
        let result = commit_export(lock.material().to_vec(), out);
        release_with(lock, result)
    }

    /// Exports the public half of an asymmetric key into `out`.
    pub fn export_public_key(&self, id: KeyId, out: &mut [u8]) -> Result<usize, EngineError> {
        if out.is_empty() {
            return Err(EngineError::BufferTooSmall);
        }
        let lock = self.lock_key(id)?;
        let result = if !lock.key_type().is_asymmetric() {
            Err(EngineError::InvalidArgument)
        } else if lock.key_type().is_public_key() {
            commit_export(lock.material().to_vec(), out)
        } else {
            self.provider()
                .export_public_key(lock.key_ref())
                .map_err(EngineError::from)
                .and_then(|public| commit_export(public, out))
        };
        release_with(lock, result)
    }

    /// Returns the attributes of a key.
    pub fn get_key_attributes(&self, id: KeyId) -> Result<KeyAttributes, EngineError> {
        let lock = self.lock_key(id)?;
        let attributes = lock.attributes();
        lock.release()?;
        Ok(attributes)
    }

    /// Destroys a key, removing it from storage if it is persistent.
    ///
    /// Fails with `GenericError` while the key is in use. Destroying the
    /// null id succeeds.
    pub fn destroy_key(&self, id: KeyId) -> Result<(), EngineError> {
        if id.is_null() {
            return Ok(());
        }
        let lock = self.lock_key(id)?;
        let key_type = lock.key_type();
        let lifetime = lock.lifetime();
        debug!(key_id = %id, "Destroying key");
        self.slots().destroy(lock, self.storage())?;
        info!(key_id = %id, key_type = %key_type, lifetime = %lifetime, "Key destroyed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::attributes::{KeyPolicy, Lifetime, Location, Persistence};
    use crate::test_support::{engine, import, persistent_engine};
    use proptest::prelude::*;
    use rempart_crypto::{AeadAlgorithm, EccFamily, HashAlgorithm, MacAlgorithm};
    use rempart_storage::{MemoryBackend, StorageBackend};
    use std::sync::Arc;

    const X25519_PRIVATE: &str = "77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a";
    const X25519_PUBLIC: &str = "8520f0098930a754748b7ddcb43ef75c0dbf3a0d26381af4eba4a98eaa9b4e6a";

    fn raw_attrs(usage: Usage) -> KeyAttributes {
        KeyAttributes::new().with_type(KeyType::RawData).with_usage(usage)
    }

    #[test]
    fn test_import_export_raw() {
        let engine = engine();
        let id = import(&engine, raw_attrs(Usage::EXPORT), b"secret bytes");

        let mut out = [0xEEu8; 16];
        let n = engine.export_key(id, &mut out).unwrap();
        assert_eq!(&out[..n], b"secret bytes");
        assert_eq!(&out[n..], &[0, 0, 0, 0]);

        let attrs = engine.get_key_attributes(id).unwrap();
        assert_eq!(attrs.bits, 96);
        assert_eq!(attrs.key_type, Some(KeyType::RawData));
        assert_eq!(attrs.lifetime, Lifetime::VOLATILE);
        assert!(engine.slots().is_volatile_id(id));
    }

    #[test]
    fn test_import_empty_rejected() {
        let engine = engine();
        assert_eq!(
            engine.import_key(&raw_attrs(Usage::EXPORT), &[]),
            Err(EngineError::InvalidArgument)
        );
        assert_eq!(engine.slots().occupied(), 0);
    }

    #[test]
    fn test_import_bad_aes_size() {
        let engine = engine();
        let attrs = KeyAttributes::new().with_type(KeyType::Aes);
        assert_eq!(
            engine.import_key(&attrs, &[0u8; 15]),
            Err(EngineError::InvalidArgument)
        );
        assert_eq!(engine.slots().occupied(), 0);
    }

    #[test]
    fn test_import_declared_bits_mismatch() {
        let engine = engine();
        let attrs = KeyAttributes::new().with_type(KeyType::Aes).with_bits(256);
        assert_eq!(
            engine.import_key(&attrs, &[0u8; 16]),
            Err(EngineError::InvalidArgument)
        );
    }

    #[test]
    fn test_export_requires_usage() {
        let engine = engine();
        let id = import(&engine, raw_attrs(Usage::COPY), b"k");
        let mut out = [0u8; 4];
        assert_eq!(engine.export_key(id, &mut out), Err(EngineError::NotPermitted));
        assert_eq!(engine.export_key(id, &mut []), Err(EngineError::BufferTooSmall));
    }

    #[test]
    fn test_export_buffer_too_small() {
        let engine = engine();
        let id = import(&engine, raw_attrs(Usage::EXPORT), &[1u8; 32]);
        let mut out = [0u8; 16];
        assert_eq!(engine.export_key(id, &mut out), Err(EngineError::BufferTooSmall));
        // Lock was released on the error path.
        engine.destroy_key(id).unwrap();
    }

    #[test]
    fn test_generate_symmetric() {
        let engine = engine();
        let attrs = KeyAttributes::new()
            .with_type(KeyType::Aes)
            .with_bits(256)
            .with_usage(Usage::EXPORT | Usage::ENCRYPT)
            .with_algorithm(AeadAlgorithm::gcm());
        let id = engine.generate_key(&attrs).unwrap();
        let mut out = [0u8; 32];
        assert_eq!(engine.export_key(id, &mut out).unwrap(), 32);
        assert_ne!(out, [0u8; 32]);
    }

    #[test]
    fn test_generate_rejections() {
        let engine = engine();
        let no_bits = KeyAttributes::new().with_type(KeyType::Aes);
        assert_eq!(engine.generate_key(&no_bits), Err(EngineError::InvalidArgument));

        let public = KeyAttributes::new()
            .with_type(KeyType::EccPublicKey(EccFamily::Montgomery))
            .with_bits(255);
        assert_eq!(engine.generate_key(&public), Err(EngineError::InvalidArgument));

        let bad_size = KeyAttributes::new().with_type(KeyType::ChaCha20).with_bits(128);
        assert_eq!(engine.generate_key(&bad_size), Err(EngineError::InvalidArgument));
        assert_eq!(engine.slots().occupied(), 0);
    }

    #[test]
    fn test_generate_des_parity() {
        let engine = engine();
        let attrs = KeyAttributes::new()
            .with_type(KeyType::Des)
            .with_bits(192)
            .with_usage(Usage::EXPORT);
        let id = engine.generate_key(&attrs).unwrap();
        let mut out = [0u8; 24];
        engine.export_key(id, &mut out).unwrap();
        assert!(out.iter().all(|b| b.count_ones() % 2 == 1));
    }

    #[test]
    fn test_generate_x25519_and_export_public() {
        let engine = engine();
        let attrs = KeyAttributes::new()
            .with_type(KeyType::EccKeyPair(EccFamily::Montgomery))
            .with_bits(255);
        let id = engine.generate_key(&attrs).unwrap();
        let mut public = [0u8; 32];
        assert_eq!(engine.export_public_key(id, &mut public).unwrap(), 32);
        // No EXPORT usage on the pair.
        assert_eq!(
            engine.export_key(id, &mut [0u8; 32]),
            Err(EngineError::NotPermitted)
        );
    }

    #[test]
    fn test_export_public_reference() {
        let engine = engine();
        let attrs = KeyAttributes::new().with_type(KeyType::EccKeyPair(EccFamily::Montgomery));
        let id = import(&engine, attrs, &hex::decode(X25519_PRIVATE).unwrap());
        assert_eq!(engine.get_key_attributes(id).unwrap().bits, 255);

        let mut public = [0u8; 40];
        let n = engine.export_public_key(id, &mut public).unwrap();
        assert_eq!(hex::encode(&public[..n]), X25519_PUBLIC);

        let public_attrs =
            KeyAttributes::new().with_type(KeyType::EccPublicKey(EccFamily::Montgomery));
        let public_id = import(&engine, public_attrs, &public[..n]);
        let mut again = [0u8; 32];
        engine.export_key(public_id, &mut again).unwrap();
        assert_eq!(&again[..], &public[..n]);
    }

    #[test]
    fn test_export_public_of_symmetric_rejected() {
        let engine = engine();
        let id = import(&engine, raw_attrs(Usage::EXPORT), &[1u8; 16]);
        assert_eq!(
            engine.export_public_key(id, &mut [0u8; 32]),
            Err(EngineError::InvalidArgument)
        );
    }

    #[test]
    fn test_copy_restricts_policy() {
        let engine = engine();
        let hmac = MacAlgorithm::hmac(HashAlgorithm::Sha256);
        let source_attrs = KeyAttributes::new()
            .with_type(KeyType::Hmac)
            .with_usage(Usage::COPY | Usage::EXPORT | Usage::SIGN_MESSAGE)
            .with_algorithm(hmac.at_least(16));
        let source = import(&engine, source_attrs, &[9u8; 32]);

        let target_attrs = KeyAttributes::new()
            .with_usage(Usage::EXPORT | Usage::VERIFY_MESSAGE)
            .with_algorithm(hmac.truncated(20));
        let copy = engine.copy_key(source, &target_attrs).unwrap();

        let attrs = engine.get_key_attributes(copy).unwrap();
        assert_eq!(attrs.policy.usage, Usage::EXPORT);
        assert_eq!(attrs.policy.alg, Some(hmac.truncated(20).into()));
        let mut out = [0u8; 32];
        engine.export_key(copy, &mut out).unwrap();
        assert_eq!(out, [9u8; 32]);
    }

    #[test]
    fn test_copy_requires_copy_usage_and_matching_type() {
        let engine = engine();
        let no_copy = import(&engine, raw_attrs(Usage::EXPORT), &[1u8; 8]);
        assert_eq!(
            engine.copy_key(no_copy, &KeyAttributes::new()),
            Err(EngineError::NotPermitted)
        );

        let source = import(&engine, raw_attrs(Usage::COPY), &[1u8; 8]);
        let wrong_type = KeyAttributes::new().with_type(KeyType::Hmac);
        assert_eq!(
            engine.copy_key(source, &wrong_type),
            Err(EngineError::InvalidArgument)
        );

        let incompatible = KeyAttributes::new().with_algorithm(AeadAlgorithm::gcm());
        let source_attrs = raw_attrs(Usage::COPY).with_algorithm(AeadAlgorithm::ccm());
        let source = import(&engine, source_attrs, &[1u8; 8]);
        assert_eq!(
            engine.copy_key(source, &incompatible),
            Err(EngineError::InvalidArgument)
        );
        assert_eq!(engine.slots().occupied(), 3);
    }

    #[test]
    fn test_destroy_then_lookup() {
        let engine = engine();
        let id = import(&engine, raw_attrs(Usage::EXPORT), &[1u8; 8]);
        engine.destroy_key(id).unwrap();
        assert_eq!(engine.get_key_attributes(id), Err(EngineError::DoesNotExist));
        assert_eq!(engine.destroy_key(id), Err(EngineError::DoesNotExist));
        engine.destroy_key(KeyId::NULL).unwrap();
    }

    #[test]
    fn test_destroy_refused_while_locked() {
        let engine = engine();
        let id = import(&engine, raw_attrs(Usage::EXPORT), &[1u8; 8]);
        let held = engine.lock_key(id).unwrap();
        assert_eq!(engine.destroy_key(id), Err(EngineError::GenericError));
        assert_eq!(held.bits(), 64);
        held.release().unwrap();
        engine.destroy_key(id).unwrap();
    }

    #[test]
    fn test_persistent_key_survives_memory_wipe() {
        let storage = Arc::new(MemoryBackend::new());
        let engine = persistent_engine(storage.clone());
        let attrs = raw_attrs(Usage::EXPORT).with_id(42);
        let id = import(&engine, attrs, b"persisted");
        assert_eq!(id, KeyId::new(42));

        engine.free();
        engine.init().unwrap();
        let mut out = [0u8; 9];
        engine.export_key(id, &mut out).unwrap();
        assert_eq!(&out, b"persisted");

        engine.destroy_key(id).unwrap();
        assert!(!storage.exists(42).unwrap());
        assert_eq!(engine.get_key_attributes(id), Err(EngineError::DoesNotExist));
    }

    #[test]
    fn test_read_only_key_cannot_be_destroyed() {
        let storage = Arc::new(MemoryBackend::new());
        let engine = persistent_engine(storage.clone());
        let id = import(&engine, raw_attrs(Usage::EXPORT).with_id(5), b"ro");

        // Rewrite the record as read-only, as a provisioning tool would.
        let read_only = Lifetime {
            persistence: Persistence::ReadOnly,
            location: Location::LOCAL,
        };
        let data = KeyData::new(
            id,
            read_only,
            KeyType::RawData,
            16,
            KeyPolicy {
                usage: Usage::EXPORT,
                ..KeyPolicy::default()
            },
            Zeroizing::new(b"ro".to_vec()),
        );
        engine.free();
        storage.delete(5).unwrap();
        crate::persistence::save(storage.as_ref(), &data).unwrap();
        engine.init().unwrap();

        assert_eq!(engine.destroy_key(id), Err(EngineError::NotPermitted));
        assert!(storage.exists(5).unwrap());
        assert_eq!(engine.slots().occupied(), 0);
    }

    #[test]
    fn test_slot_exhaustion() {
        let engine = engine();
        for _ in 0..engine.config().key_slot_count {
            import(&engine, raw_attrs(Usage::EXPORT), &[1]);
        }
        assert_eq!(
            engine.import_key(&raw_attrs(Usage::EXPORT), &[1]),
            Err(EngineError::InsufficientMemory)
        );
    }

    #[test]
    fn test_des_parity() {
        let mut key = [0x00, 0x01, 0xFE, 0xFF];
        set_des_parity(&mut key);
        assert_eq!(key, [0x01, 0x01, 0xFE, 0xFE]);
    }

    fn unstructured_types() -> impl Strategy<Value = KeyType> {
        prop_oneof![
            Just(KeyType::RawData),
            Just(KeyType::Hmac),
            Just(KeyType::Derive),
            Just(KeyType::Aes),
            Just(KeyType::Aria),
            Just(KeyType::Camellia),
            Just(KeyType::Des),
            Just(KeyType::ChaCha20),
        ]
    }

    proptest! {
        #[test]
        fn prop_accepted_sizes_are_whole_bytes(
            key_type in unstructured_types(),
            bits in 0usize..1024,
        ) {
            if validate_unstructured_key_bits(key_type, bits).is_ok() {
                prop_assert_eq!(bits % 8, 0);
            }
        }

        #[test]
        fn prop_import_never_exceeds_max_bits(len in 1usize..64) {
            let engine = engine();
            let attrs = KeyAttributes::new().with_type(KeyType::RawData);
            match engine.import_key(&attrs, &vec![0u8; len]) {
                Ok(id) => {
                    let bits = engine.get_key_attributes(id).unwrap().bits;
                    prop_assert_eq!(bits, len * 8);
                    prop_assert!(bits <= engine.config().max_key_bits);
                }
                Err(e) => prop_assert!(matches!(
                    e,
                    EngineError::InvalidArgument | EngineError::NotSupported
                )),
            }
        }
    }
}
