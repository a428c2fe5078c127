//! Key identifiers, lifetimes, usage flags and attribute sets.

use std::fmt;

use bitflags::bitflags;
use rempart_crypto::{Algorithm, KeyType};
use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a key as seen by callers.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct KeyId(u32);

impl KeyId {
    /// The null identifier; never names a key.
    pub const NULL: Self = Self(0);
    /// Smallest identifier a caller may choose for a persistent key.
    pub const USER_MIN: u32 = 0x0000_0001;
    /// Largest identifier a caller may choose for a persistent key.
    pub const USER_MAX: u32 = 0x3FFF_FFFF;
    /// Start of the implementation-reserved range.
    pub const VENDOR_MIN: u32 = 0x4000_0000;
    /// End of the implementation-reserved range.
    pub const VENDOR_MAX: u32 = 0x7FFF_FFFF;
    /// Number of identifiers in the implementation-reserved range.
    pub const VENDOR_RANGE_LEN: usize = (Self::VENDOR_MAX - Self::VENDOR_MIN) as usize + 1;

    /// Wraps a raw identifier.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw identifier value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is the null identifier.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Whether the identifier lies in the caller-selectable range.
    pub const fn is_user(self) -> bool {
        self.0 >= Self::USER_MIN && self.0 <= Self::USER_MAX
    }
}

impl From<u32> for KeyId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

// ============================================================================
// Lifetimes
// ============================================================================

/// How long a key outlives the engine instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Persistence {
    /// Destroyed when the engine is freed.
    #[default]
    Volatile,
    /// Written to storage, survives restarts.
    Default,
    /// Persistent and immutable: cannot be destroyed through the engine.
    ReadOnly,
}

/// Where key material lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(pub u32);

impl Location {
    /// Keys handled in engine memory.
    pub const LOCAL: Self = Self(0);

    /// Whether the location is engine memory.
    pub const fn is_local(self) -> bool {
        self.0 == Self::LOCAL.0
    }
}

/// Persistence and location of a key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lifetime {
    /// Persistence level.
    pub persistence: Persistence,
    /// Storage location.
    pub location: Location,
}

impl Lifetime {
    /// Local, volatile key.
    pub const VOLATILE: Self = Self {
        persistence: Persistence::Volatile,
        location: Location::LOCAL,
    };

    /// Local, persistent key.
    pub const PERSISTENT: Self = Self {
        persistence: Persistence::Default,
        location: Location::LOCAL,
    };

    /// Whether the key disappears with the engine.
    pub const fn is_volatile(self) -> bool {
        matches!(self.persistence, Persistence::Volatile)
    }

    /// Whether the key can never be modified or destroyed.
    pub const fn is_read_only(self) -> bool {
        matches!(self.persistence, Persistence::ReadOnly)
    }
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let persistence = match self.persistence {
            Persistence::Volatile => "volatile",
            Persistence::Default => "persistent",
            Persistence::ReadOnly => "read-only",
        };
        write!(f, "{persistence}@{}", self.location.0)
    }
}

// ============================================================================
// Policy
// ============================================================================

bitflags! {
    /// Operations a key may be used for.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Usage: u32 {
        /// Key material may be exported.
        const EXPORT = 0x0000_0001;
        /// Key may be copied into a new key.
        const COPY = 0x0000_0002;
        /// Encrypt with a cipher, AEAD or public key.
        const ENCRYPT = 0x0000_0100;
        /// Decrypt with a cipher, AEAD or private key.
        const DECRYPT = 0x0000_0200;
        /// Sign a message or compute a MAC.
        const SIGN_MESSAGE = 0x0000_0400;
        /// Verify a message signature or MAC.
        const VERIFY_MESSAGE = 0x0000_0800;
        /// Sign a precomputed hash.
        const SIGN_HASH = 0x0000_1000;
        /// Verify a signature over a precomputed hash.
        const VERIFY_HASH = 0x0000_2000;
        /// Use as input to key derivation or key agreement.
        const DERIVE = 0x0000_4000;
    }
}

/// Usage flags plus up to two permitted algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyPolicy {
    /// Permitted operations.
    pub usage: Usage,
    /// Primary permitted algorithm; `None` permits no algorithm.
    pub alg: Option<Algorithm>,
    /// Secondary permitted algorithm.
    pub alg2: Option<Algorithm>,
}

// ============================================================================
// Attributes
// ============================================================================

/// Everything the engine knows about a key except its material.
///
/// When passed to a creation call, `key_type` and `bits` may be left unset
/// where the material determines them; when set, they must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttributes {
    /// Identifier; null for volatile keys until created.
    pub id: KeyId,
    /// Lifetime.
    pub lifetime: Lifetime,
    /// Key type.
    pub key_type: Option<KeyType>,
    /// Key size in bits; zero means "determined by the material".
    pub bits: usize,
    /// Usage policy.
    pub policy: KeyPolicy,
}

impl KeyAttributes {
    /// Empty volatile attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key type.
    pub fn with_type(mut self, key_type: KeyType) -> Self {
        self.key_type = Some(key_type);
        self
    }

    /// Sets the key size.
    pub fn with_bits(mut self, bits: usize) -> Self {
        self.bits = bits;
        self
    }

    /// Sets the usage flags.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.policy.usage = usage;
        self
    }

    /// Sets the primary permitted algorithm.
    pub fn with_algorithm(mut self, alg: impl Into<Algorithm>) -> Self {
        self.policy.alg = Some(alg.into());
        self
    }

    /// Sets the secondary permitted algorithm.
    pub fn with_enrollment_algorithm(mut self, alg: impl Into<Algorithm>) -> Self {
        self.policy.alg2 = Some(alg.into());
        self
    }

    /// Sets the lifetime.
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Sets a persistent identifier. A volatile lifetime becomes persistent.
    pub fn with_id(mut self, id: impl Into<KeyId>) -> Self {
        self.id = id.into();
        if self.lifetime.is_volatile() {
            self.lifetime.persistence = Persistence::Default;
        }
        self
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_ranges() {
        assert!(KeyId::NULL.is_null());
        assert!(KeyId::new(1).is_user());
        assert!(KeyId::new(KeyId::USER_MAX).is_user());
        assert!(!KeyId::new(KeyId::VENDOR_MIN).is_user());
        assert_eq!(KeyId::new(0x42).to_string(), "0x00000042");
    }

    #[test]
    fn test_with_id_makes_persistent() {
        let attrs = KeyAttributes::new().with_id(7);
        assert_eq!(attrs.lifetime, Lifetime::PERSISTENT);

        let read_only = Lifetime {
            persistence: Persistence::ReadOnly,
            location: Location::LOCAL,
        };
        let attrs = KeyAttributes::new().with_lifetime(read_only).with_id(7);
        assert!(attrs.lifetime.is_read_only());
    }

    #[test]
    fn test_usage_unknown_bits() {
        assert!(Usage::from_bits(0x0000_0101).is_some());
        assert!(Usage::from_bits(0x8000_0000).is_none());
        let retained = Usage::from_bits_retain(0x8000_0001);
        assert!(retained.contains(Usage::EXPORT));
        assert_ne!(retained.bits() & !Usage::all().bits(), 0);
    }

    #[test]
    fn test_attributes_serde() {
        let attrs = KeyAttributes::new()
            .with_type(KeyType::Aes)
            .with_bits(128)
            .with_usage(Usage::ENCRYPT | Usage::DECRYPT)
            .with_id(9);
        let json = serde_json::to_string(&attrs).unwrap();
        let back: KeyAttributes = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
    }
}
