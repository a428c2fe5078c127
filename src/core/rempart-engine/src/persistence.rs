//! Encoding of persistent key records.
//!
//! A record is a JSON document carrying the key attributes and the material
//! as standard base64.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rempart_storage::StorageBackend;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::attributes::{KeyAttributes, KeyId};
use crate::error::EngineError;
use crate::slots::KeyData;

#[derive(Serialize, Deserialize)]
struct KeyRecord {
    attributes: KeyAttributes,
    material: String,
}

impl Drop for KeyRecord {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.material);
    }
}

/// Serializes a key into its record form.
pub(crate) fn encode(data: &KeyData) -> Result<Zeroizing<Vec<u8>>, EngineError> {
    let record = KeyRecord {
        attributes: data.attributes(),
        material: BASE64.encode(data.material()),
    };
    serde_json::to_vec(&record)
        .map(Zeroizing::new)
        .map_err(|_| EngineError::DataInvalid)
}

/// Decodes a record read back for `id`.
pub(crate) fn decode(id: KeyId, bytes: &[u8]) -> Result<KeyData, EngineError> {
    let record: KeyRecord = serde_json::from_slice(bytes).map_err(|e| {
        warn!(key_id = %id, error = %e, "Undecodable key record");
        EngineError::DataInvalid
    })?;
    if record.attributes.id != id {
        warn!(key_id = %id, stored_id = %record.attributes.id, "Key record id mismatch");
        return Err(EngineError::DataCorrupt);
    }
    let key_type = record.attributes.key_type.ok_or(EngineError::DataInvalid)?;
    let material = Zeroizing::new(
        BASE64
            .decode(record.material.as_bytes())
            .map_err(|_| EngineError::DataInvalid)?,
    );
    Ok(KeyData::new(
        id,
        record.attributes.lifetime,
        key_type,
        record.attributes.bits,
        record.attributes.policy,
        material,
    ))
}

/// Writes a new key record. Never overwrites an existing one.
pub(crate) fn save(storage: &dyn StorageBackend, data: &KeyData) -> Result<(), EngineError> {
    let record = encode(data)?;
    storage.put(data.id().raw(), &record)?;
    debug!(key_id = %data.id(), "Key record saved");
    Ok(())
}

/// Reads and decodes the record stored under `id`.
pub(crate) fn load(storage: &dyn StorageBackend, id: KeyId) -> Result<KeyData, EngineError> {
    let bytes = storage.get(id.raw())?.ok_or(EngineError::DoesNotExist)?;
    decode(id, &bytes)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::attributes::{KeyPolicy, Lifetime, Usage};
    use rempart_crypto::{HashAlgorithm, KeyType, MacAlgorithm};
    use rempart_storage::MemoryBackend;

    fn sample(id: u32) -> KeyData {
        KeyData::new(
            KeyId::new(id),
            Lifetime::PERSISTENT,
            KeyType::Hmac,
            128,
            KeyPolicy {
                usage: Usage::SIGN_MESSAGE | Usage::VERIFY_MESSAGE,
                alg: Some(MacAlgorithm::hmac(HashAlgorithm::Sha256).into()),
                alg2: None,
            },
            Zeroizing::new(vec![0xAB; 16]),
        )
    }

    #[test]
    fn test_save_load() {
        let storage = MemoryBackend::new();
        save(&storage, &sample(12)).unwrap();

        let loaded = load(&storage, KeyId::new(12)).unwrap();
        assert_eq!(loaded.attributes(), sample(12).attributes());
        assert_eq!(loaded.material(), &[0xAB; 16]);
    }

    #[test]
    fn test_save_refuses_overwrite() {
        let storage = MemoryBackend::new();
        save(&storage, &sample(3)).unwrap();
        assert_eq!(save(&storage, &sample(3)), Err(EngineError::AlreadyExists));
    }

    #[test]
    fn test_missing_record() {
        let storage = MemoryBackend::new();
        assert_eq!(load(&storage, KeyId::new(1)).unwrap_err(), EngineError::DoesNotExist);
    }

    #[test]
    fn test_id_mismatch_is_corrupt() {
        let storage = MemoryBackend::new();
        let record = encode(&sample(4)).unwrap();
        storage.put(5, &record).unwrap();
        assert_eq!(load(&storage, KeyId::new(5)).unwrap_err(), EngineError::DataCorrupt);
    }

    #[test]
    fn test_garbage_is_invalid() {
        let storage = MemoryBackend::new();
        storage.put(6, b"{not json").unwrap();
        assert_eq!(load(&storage, KeyId::new(6)).unwrap_err(), EngineError::DataInvalid);
    }
}
