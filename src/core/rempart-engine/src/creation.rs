//! Key creation state machine.
//!
//! [`KeyCreation::start`] validates the requested attributes and reserves a
//! slot. The guard then either reaches [`KeyCreation::finish`], which
//! persists and publishes the key, or is dropped, which wipes the slot.
//! There is no way to leave a half-created key behind.

use tracing::{debug, info};
use zeroize::Zeroizing;

use rempart_crypto::KeyType;

use crate::attributes::{KeyAttributes, KeyId, KeyPolicy, Lifetime};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::persistence;
use crate::policy::validate_usage;
use crate::slots::{KeyData, SlotHandle};

/// Checks the parts of `attributes` that do not depend on the material.
fn validate_attributes(engine: &Engine, attributes: &KeyAttributes) -> Result<(), EngineError> {
    let lifetime = attributes.lifetime;
    if !lifetime.location.is_local() || lifetime.is_read_only() {
        return Err(EngineError::InvalidArgument);
    }
    if lifetime.is_volatile() {
        if !attributes.id.is_null() {
            return Err(EngineError::InvalidArgument);
        }
    } else {
        if engine.storage().is_none() {
            return Err(EngineError::NotSupported);
        }
        if !attributes.id.is_user() {
            return Err(EngineError::InvalidArgument);
        }
    }
    validate_usage(attributes.policy.usage)?;
    if attributes.bits > engine.config().max_key_bits {
        return Err(EngineError::NotSupported);
    }
    Ok(())
}

/// Checks that the type and size a caller declared, if any, match the
/// actual key.
pub(crate) fn validate_optional_attributes(
    key_type: KeyType,
    bits: usize,
    attributes: &KeyAttributes,
) -> Result<(), EngineError> {
    if attributes.key_type.is_some_and(|declared| declared != key_type) {
        return Err(EngineError::InvalidArgument);
    }
    if attributes.bits != 0 && attributes.bits != bits {
        return Err(EngineError::InvalidArgument);
    }
    Ok(())
}

/// A key being created. Dropping it without finishing wipes the slot.
pub(crate) struct KeyCreation<'a> {
    engine: &'a Engine,
    slot: SlotHandle,
    id: KeyId,
    lifetime: Lifetime,
    finished: bool,
}

impl<'a> KeyCreation<'a> {
    /// Validates `attributes` and reserves a slot for the new key.
    pub(crate) fn start(
        engine: &'a Engine,
        attributes: &KeyAttributes,
    ) -> Result<Self, EngineError> {
        engine.ensure_initialized()?;
        validate_attributes(engine, attributes)?;
        if let Some(storage) = engine.storage() {
            if !attributes.lifetime.is_volatile() && storage.exists(attributes.id.raw())? {
                return Err(EngineError::AlreadyExists);
            }
        }
        let (slot, id) = engine.slots().reserve(attributes.id)?;
        debug!(slot = slot.index(), key_id = %id, "Key creation started");
        Ok(Self {
            engine,
            slot,
            id,
            lifetime: attributes.lifetime,
            finished: false,
        })
    }

    /// Persists the key if needed and makes it available under its id.
    pub(crate) fn finish(
        mut self,
        key_type: KeyType,
        bits: usize,
        policy: KeyPolicy,
        material: Zeroizing<Vec<u8>>,
    ) -> Result<KeyId, EngineError> {
        if bits > self.engine.config().max_key_bits {
            return Err(EngineError::NotSupported);
        }
        let data = KeyData::new(self.id, self.lifetime, key_type, bits, policy, material);
        let storage = if self.lifetime.is_volatile() {
            None
        } else {
            let storage = self.engine.storage().ok_or(EngineError::NotSupported)?;
            persistence::save(storage, &data)?;
            Some(storage)
        };
        if let Err(e) = self.engine.slots().fill(self.slot, data) {
            // The slot was wiped under us; do not leave an orphan record.
            if let Some(storage) = storage {
                let _ = storage.delete(self.id.raw());
            }
            return Err(e);
        }
        self.finished = true;
        info!(
            key_id = %self.id,
            key_type = %key_type,
            bits,
            lifetime = %self.lifetime,
            "Key created"
        );
        Ok(self.id)
    }
}

impl Drop for KeyCreation<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                slot = self.slot.index(),
                key_id = %self.id,
                "Key creation failed, wiping slot"
            );
            let _ = self.engine.slots().abandon(self.slot);
        }
    }
}
