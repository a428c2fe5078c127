//! Bounded key slot table.
//!
//! Each slot owns the material of at most one key. Locking is reference
//! counting: any number of readers may hold a [`KeyLock`] on the same slot
//! at once, and destruction is refused while anyone besides the destroyer
//! holds one. The table mutex only serializes allocation, lookup and
//! destruction; key material is written once at creation and read without
//! holding it.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rempart_crypto::{KeyRef, KeyType};
use rempart_storage::StorageBackend;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::attributes::{KeyAttributes, KeyId, KeyPolicy, Lifetime};
use crate::error::EngineError;
use crate::persistence;

// ============================================================================
// Key data
// ============================================================================

/// A created key: resolved attributes plus material.
///
/// The material is zeroized when the last reference is dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KeyData {
    #[zeroize(skip)]
    id: KeyId,
    #[zeroize(skip)]
    lifetime: Lifetime,
    #[zeroize(skip)]
    key_type: KeyType,
    #[zeroize(skip)]
    bits: usize,
    #[zeroize(skip)]
    policy: KeyPolicy,
    material: Vec<u8>,
}

impl KeyData {
    pub(crate) fn new(
        id: KeyId,
        lifetime: Lifetime,
        key_type: KeyType,
        bits: usize,
        policy: KeyPolicy,
        mut material: Zeroizing<Vec<u8>>,
    ) -> Self {
        Self {
            id,
            lifetime,
            key_type,
            bits,
            policy,
            material: std::mem::take(&mut *material),
        }
    }

    /// Key identifier.
    pub fn id(&self) -> KeyId {
        self.id
    }

    /// Key lifetime.
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Key type.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// Key size in bits.
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// Usage policy.
    pub fn policy(&self) -> &KeyPolicy {
        &self.policy
    }

    pub(crate) fn material(&self) -> &[u8] {
        &self.material
    }

    pub(crate) fn key_ref(&self) -> KeyRef<'_> {
        KeyRef::new(self.key_type, self.bits, &self.material)
    }

    /// Public attribute view of the key.
    pub fn attributes(&self) -> KeyAttributes {
        KeyAttributes {
            id: self.id,
            lifetime: self.lifetime,
            key_type: Some(self.key_type),
            bits: self.bits,
            policy: self.policy,
        }
    }
}

impl fmt::Debug for KeyData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyData")
            .field("id", &self.id)
            .field("lifetime", &self.lifetime)
            .field("key_type", &self.key_type)
            .field("bits", &self.bits)
            .field("policy", &self.policy)
            .field("material", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Slots
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum SlotState {
    #[default]
    Empty,
    Filling,
    Full,
}

#[derive(Default)]
struct KeySlot {
    state: SlotState,
    id: KeyId,
    data: Option<Arc<KeyData>>,
    lock_count: usize,
    /// Bumped on every wipe, so guards taken before the wipe go stale.
    generation: u64,
}

impl KeySlot {
    /// Empties the slot. The material is zeroized when the last reference
    /// goes.
    fn reset(&mut self) {
        drop(self.data.take());
        *self = KeySlot {
            generation: self.generation.wrapping_add(1),
            ..KeySlot::default()
        };
    }
}

/// Position of a slot together with the generation it was taken at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotHandle {
    index: usize,
    generation: u64,
}

impl SlotHandle {
    pub(crate) fn index(self) -> usize {
        self.index
    }
}

/// Shared handle on a full slot. Dropping it releases the lock.
pub struct KeyLock<'a> {
    store: &'a KeySlotStore,
    handle: SlotHandle,
    data: Arc<KeyData>,
    released: bool,
}

impl KeyLock<'_> {
    /// Releases the lock, reporting a corrupted lock count.
    ///
    /// Fails with `BadState` if the slot was wiped while the lock was held.
    pub fn release(mut self) -> Result<(), EngineError> {
        self.released = true;
        self.store.unlock(self.handle)
    }
}

impl Deref for KeyLock<'_> {
    type Target = KeyData;

    fn deref(&self) -> &KeyData {
        &self.data
    }
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.store.unlock(self.handle);
        }
    }
}

impl fmt::Debug for KeyLock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLock")
            .field("slot", &self.handle.index)
            .field("key", &*self.data)
            .finish()
    }
}

/// Releases `lock` and merges its status with the operation's.
///
/// An operation error wins over an unlock error.
pub(crate) fn release_with<T>(
    lock: KeyLock<'_>,
    result: Result<T, EngineError>,
) -> Result<T, EngineError> {
    let unlocked = lock.release();
    let value = result?;
    unlocked?;
    Ok(value)
}

/// The key slot table.
pub struct KeySlotStore {
    slots: Mutex<Vec<KeySlot>>,
    volatile_min: u32,
}

impl KeySlotStore {
    /// Creates a table of `count` empty slots.
    pub fn new(count: usize) -> Self {
        let span = u32::try_from(count.saturating_sub(1)).unwrap_or(u32::MAX);
        let volatile_min = KeyId::VENDOR_MAX
            .saturating_sub(span)
            .max(KeyId::VENDOR_MIN);
        Self {
            slots: Mutex::new((0..count).map(|_| KeySlot::default()).collect()),
            volatile_min,
        }
    }

    fn table(&self) -> Result<MutexGuard<'_, Vec<KeySlot>>, EngineError> {
        self.slots.lock().map_err(|_| {
            warn!("Key slot table lock poisoned");
            EngineError::CorruptionDetected
        })
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of slots currently reserved or holding a key.
    pub fn occupied(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|slot| slot.state != SlotState::Empty)
            .count()
    }

    /// Whether `id` lies in the range handed out to volatile keys.
    pub fn is_volatile_id(&self, id: KeyId) -> bool {
        id.raw() >= self.volatile_min && id.raw() <= KeyId::VENDOR_MAX
    }

    fn volatile_id(&self, index: usize) -> KeyId {
        let offset = u32::try_from(index).unwrap_or(u32::MAX);
        KeyId::new(self.volatile_min.saturating_add(offset))
    }

    fn find_full(slots: &[KeySlot], id: KeyId) -> Option<usize> {
        slots
            .iter()
            .position(|slot| slot.state == SlotState::Full && slot.id == id)
    }

    fn wipe_slot(slot: &mut KeySlot) -> Result<(), EngineError> {
        let status = if slot.lock_count == 1 {
            Ok(())
        } else {
            warn!(
                key_id = %slot.id,
                lock_count = slot.lock_count,
                "Unexpected lock count while wiping key slot"
            );
            Err(EngineError::CorruptionDetected)
        };
        slot.reset();
        status
    }

    /// The slot `handle` points at, unless it was wiped since.
    fn current<'s>(
        slots: &'s mut [KeySlot],
        handle: SlotHandle,
    ) -> Result<&'s mut KeySlot, EngineError> {
        let slot = slots
            .get_mut(handle.index)
            .ok_or(EngineError::CorruptionDetected)?;
        if slot.generation != handle.generation {
            debug!(slot = handle.index, "Stale key slot handle ignored");
            return Err(EngineError::BadState);
        }
        Ok(slot)
    }

    /// Reserves an empty slot for a key being created and locks it.
    ///
    /// A null `requested` id assigns the volatile id of the slot.
    pub(crate) fn reserve(&self, requested: KeyId) -> Result<(SlotHandle, KeyId), EngineError> {
        let mut slots = self.table()?;
        if !requested.is_null()
            && slots
                .iter()
                .any(|slot| slot.state != SlotState::Empty && slot.id == requested)
        {
            return Err(EngineError::AlreadyExists);
        }
        let index = slots
            .iter()
            .position(|slot| slot.state == SlotState::Empty)
            .ok_or(EngineError::InsufficientMemory)?;
        let id = if requested.is_null() {
            self.volatile_id(index)
        } else {
            requested
        };
        let generation = slots[index].generation;
        slots[index] = KeySlot {
            state: SlotState::Filling,
            id,
            data: None,
            lock_count: 1,
            generation,
        };
        debug!(slot = index, key_id = %id, "Key slot reserved");
        Ok((SlotHandle { index, generation }, id))
    }

    /// Installs the material of a reserved slot and unlocks it.
    pub(crate) fn fill(&self, handle: SlotHandle, data: KeyData) -> Result<(), EngineError> {
        let mut slots = self.table()?;
        let slot = Self::current(&mut slots, handle)?;
        if slot.state != SlotState::Filling || slot.lock_count != 1 || slot.id != data.id {
            return Err(EngineError::CorruptionDetected);
        }
        slot.data = Some(Arc::new(data));
        slot.state = SlotState::Full;
        slot.lock_count = 0;
        Ok(())
    }

    /// Wipes a reserved slot whose creation failed. A slot wiped and
    /// reused since the reservation is left alone.
    pub(crate) fn abandon(&self, handle: SlotHandle) -> Result<(), EngineError> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = Self::current(&mut slots, handle)?;
        Self::wipe_slot(slot)
    }

    /// Locks the key named `id`, loading it from `storage` if it is
    /// persistent and not yet in memory.
    pub fn lock(
        &self,
        id: KeyId,
        storage: Option<&dyn StorageBackend>,
    ) -> Result<KeyLock<'_>, EngineError> {
        if id.is_null() {
            return Err(EngineError::InvalidHandle);
        }
        let mut slots = self.table()?;
        let index = match Self::find_full(&slots, id) {
            Some(index) => {
                slots[index].lock_count += 1;
                index
            }
            None => {
                if self.is_volatile_id(id) {
                    return Err(EngineError::DoesNotExist);
                }
                if !id.is_user() {
                    return Err(EngineError::InvalidHandle);
                }
                let storage = storage.ok_or(EngineError::DoesNotExist)?;
                let index = slots
                    .iter()
                    .position(|slot| slot.state == SlotState::Empty)
                    .ok_or(EngineError::InsufficientMemory)?;
                let data = persistence::load(storage, id)?;
                let generation = slots[index].generation;
                slots[index] = KeySlot {
                    state: SlotState::Full,
                    id,
                    data: Some(Arc::new(data)),
                    lock_count: 1,
                    generation,
                };
                debug!(slot = index, key_id = %id, "Persistent key loaded");
                index
            }
        };
        let slot = &slots[index];
        let data = slot.data.clone().ok_or(EngineError::CorruptionDetected)?;
        debug!(slot = index, key_id = %id, lock_count = slot.lock_count, "Key locked");
        let handle = SlotHandle {
            index,
            generation: slot.generation,
        };
        Ok(KeyLock {
            store: self,
            handle,
            data,
            released: false,
        })
    }

    /// Drops one reader. A lock that outlived a wipe of its slot never
    /// touches the slot's new occupant.
    fn unlock(&self, handle: SlotHandle) -> Result<(), EngineError> {
        let mut slots = self.table()?;
        let slot = Self::current(&mut slots, handle)?;
        if slot.lock_count == 0 {
            warn!(slot = handle.index, "Unlocking a key slot that is not locked");
            return Err(EngineError::CorruptionDetected);
        }
        slot.lock_count -= 1;
        Ok(())
    }

    /// Destroys the key held by `lock`.
    ///
    /// Refused with `GenericError` while any other lock is held. A read-only
    /// key has its in-memory copy wiped but reports `NotPermitted`. A wipe
    /// failure takes priority over a storage failure.
    pub(crate) fn destroy(
        &self,
        mut lock: KeyLock<'_>,
        storage: Option<&dyn StorageBackend>,
    ) -> Result<(), EngineError> {
        let handle = lock.handle;
        let id = lock.id();
        let lifetime = lock.lifetime();
        lock.released = true;
        drop(lock);

        let mut slots = self.table()?;
        let slot = Self::current(&mut slots, handle)?;
        if slot.lock_count > 1 {
            slot.lock_count -= 1;
            warn!(key_id = %id, lock_count = slot.lock_count, "Refusing to destroy key in use");
            return Err(EngineError::GenericError);
        }

        let mut overall = Ok(());
        if lifetime.is_read_only() {
            overall = Err(EngineError::NotPermitted);
        } else if !lifetime.is_volatile() {
            if let Some(storage) = storage {
                if let Err(e) = storage.delete(id.raw()) {
                    overall = Err(e.into());
                }
            }
        }

        Self::wipe_slot(slot)?;
        overall
    }

    /// Wipes every slot regardless of lock counts. Returns how many keys
    /// were dropped from memory.
    ///
    /// Locks and reservations still alive afterwards are stale: releasing
    /// them fails with `BadState` and leaves later occupants untouched.
    pub(crate) fn wipe_all(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut wiped = 0;
        for slot in slots.iter_mut().filter(|slot| slot.state != SlotState::Empty) {
            if slot.lock_count > 0 {
                debug!(key_id = %slot.id, lock_count = slot.lock_count, "Wiping key slot in use");
            }
            slot.reset();
            wiped += 1;
        }
        wiped
    }
}

impl fmt::Debug for KeySlotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySlotStore")
            .field("capacity", &self.capacity())
            .field("occupied", &self.occupied())
            .finish()
    }
}
