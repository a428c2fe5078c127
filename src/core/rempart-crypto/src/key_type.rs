//! Key types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Elliptic curve families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EccFamily {
    /// NIST/SEC random prime curves (P-256, P-384, ...).
    SecpR1,
    /// SEC Koblitz curves (secp256k1, ...).
    SecpK1,
    /// Brainpool random curves.
    BrainpoolPR1,
    /// Montgomery curves (Curve25519, Curve448).
    Montgomery,
    /// Twisted Edwards curves (Edwards25519, Edwards448).
    TwistedEdwards,
}

impl EccFamily {
    /// Whether `bits` names a curve of this family.
    pub const fn supports_bits(self, bits: usize) -> bool {
        match self {
            Self::SecpR1 => matches!(bits, 192 | 224 | 256 | 384 | 521),
            Self::SecpK1 => matches!(bits, 192 | 224 | 256),
            Self::BrainpoolPR1 => matches!(bits, 160 | 192 | 224 | 256 | 320 | 384 | 512),
            Self::Montgomery => matches!(bits, 255 | 448),
            Self::TwistedEdwards => matches!(bits, 255 | 448),
        }
    }
}

/// Key types understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// Arbitrary bytes usable only as KDF non-secret input or for export.
    RawData,
    /// HMAC key.
    Hmac,
    /// Secret input for key derivation.
    Derive,
    /// AES key.
    Aes,
    /// ARIA key.
    Aria,
    /// Camellia key.
    Camellia,
    /// Single, double or triple DES key.
    Des,
    /// ChaCha20 key.
    ChaCha20,
    /// RSA private key.
    RsaKeyPair,
    /// RSA public key.
    RsaPublicKey,
    /// Elliptic-curve private key.
    EccKeyPair(EccFamily),
    /// Elliptic-curve public key.
    EccPublicKey(EccFamily),
}

impl KeyType {
    /// Whether the key material is an opaque byte string.
    pub const fn is_unstructured(self) -> bool {
        matches!(
            self,
            Self::RawData
                | Self::Hmac
                | Self::Derive
                | Self::Aes
                | Self::Aria
                | Self::Camellia
                | Self::Des
                | Self::ChaCha20
        )
    }

    /// Whether the key belongs to a block or stream cipher.
    pub const fn is_symmetric_cipher(self) -> bool {
        matches!(
            self,
            Self::Aes | Self::Aria | Self::Camellia | Self::Des | Self::ChaCha20
        )
    }

    /// Whether the key is a public or private asymmetric key.
    pub const fn is_asymmetric(self) -> bool {
        !self.is_unstructured()
    }

    /// Whether the key is a public key.
    pub const fn is_public_key(self) -> bool {
        matches!(self, Self::RsaPublicKey | Self::EccPublicKey(_))
    }

    /// Whether the key is a private key (key pair).
    pub const fn is_key_pair(self) -> bool {
        matches!(self, Self::RsaKeyPair | Self::EccKeyPair(_))
    }

    /// Whether the key is an RSA key.
    pub const fn is_rsa(self) -> bool {
        matches!(self, Self::RsaKeyPair | Self::RsaPublicKey)
    }

    /// Curve family of an ECC key.
    pub const fn ecc_family(self) -> Option<EccFamily> {
        match self {
            Self::EccKeyPair(family) | Self::EccPublicKey(family) => Some(family),
            _ => None,
        }
    }

    /// Public key type corresponding to a key pair type; identity otherwise.
    pub const fn public_counterpart(self) -> Self {
        match self {
            Self::RsaKeyPair => Self::RsaPublicKey,
            Self::EccKeyPair(family) => Self::EccPublicKey(family),
            other => other,
        }
    }

    /// Block length of the key's cipher; zero for non-cipher keys.
    pub const fn block_len(self) -> usize {
        match self {
            Self::Aes | Self::Aria | Self::Camellia => 16,
            Self::Des => 8,
            Self::ChaCha20 => 1,
            _ => 0,
        }
    }

    /// Size of a raw shared secret produced with this key, in bytes.
    pub const fn agreement_output_len(self, bits: usize) -> usize {
        match self {
            Self::EccKeyPair(_) | Self::EccPublicKey(_) => bits.div_ceil(8),
            _ => 0,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EccKeyPair(family) => write!(f, "EccKeyPair({family:?})"),
            Self::EccPublicKey(family) => write!(f, "EccPublicKey({family:?})"),
            other => write!(f, "{other:?}"),
        }
    }
}
