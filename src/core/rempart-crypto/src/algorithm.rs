//! Algorithm identifiers.
//!
//! Every algorithm family is a sum type. Wildcards (an "any hash" signature
//! scheme, an "at least N bytes" MAC or AEAD tag) are ordinary values of the
//! same types so they can be stored in key policies, but they are never
//! accepted as the algorithm of an actual operation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest digest produced by any supported hash.
pub const HASH_MAX_SIZE: usize = 64;

/// Largest MAC produced by any supported MAC algorithm.
pub const MAC_MAX_SIZE: usize = HASH_MAX_SIZE;

/// Largest block size of any supported block cipher.
pub const BLOCK_CIPHER_MAX_BLOCK_SIZE: usize = 16;

/// Largest IV accepted by `set_iv`.
pub const CIPHER_IV_MAX_SIZE: usize = 16;

/// Message digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-224.
    Sha224,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Digest size in bytes.
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Internal block size in bytes.
    pub const fn block_len(self) -> usize {
        match self {
            Self::Sha224 | Self::Sha256 => 64,
            Self::Sha384 | Self::Sha512 => 128,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sha224 => "SHA-224",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        };
        f.write_str(name)
    }
}

/// Hash parameter of a hash-and-sign scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignHash {
    /// Policy wildcard: any concrete hash.
    Any,
    /// A specific hash.
    Hash(HashAlgorithm),
}

impl fmt::Display for SignHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("ANY_HASH"),
            Self::Hash(hash) => hash.fmt(f),
        }
    }
}

// ============================================================================
// MAC
// ============================================================================

/// Full-length MAC constructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FullLengthMac {
    /// HMAC over the given hash.
    Hmac(HashAlgorithm),
    /// CMAC over the key's block cipher.
    Cmac,
    /// Raw CBC-MAC over the key's block cipher.
    CbcMac,
}

impl FullLengthMac {
    /// Whether the MAC is built on a block cipher rather than a hash.
    pub const fn is_block_cipher_mac(self) -> bool {
        matches!(self, Self::Cmac | Self::CbcMac)
    }
}

/// Output length selector of a MAC algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MacLength {
    /// The construction's full output.
    Default,
    /// Exactly this many bytes.
    Truncated(u8),
    /// Policy wildcard: this many bytes or more.
    AtLeast(u8),
}

/// A MAC algorithm: a construction plus an output length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAlgorithm {
    /// Underlying construction.
    pub base: FullLengthMac,
    /// Output length selector.
    pub length: MacLength,
}

impl MacAlgorithm {
    /// Full-length HMAC over `hash`.
    pub const fn hmac(hash: HashAlgorithm) -> Self {
        Self {
            base: FullLengthMac::Hmac(hash),
            length: MacLength::Default,
        }
    }

    /// Full-length CMAC.
    pub const fn cmac() -> Self {
        Self {
            base: FullLengthMac::Cmac,
            length: MacLength::Default,
        }
    }

    /// Full-length CBC-MAC.
    pub const fn cbc_mac() -> Self {
        Self {
            base: FullLengthMac::CbcMac,
            length: MacLength::Default,
        }
    }

    /// The same construction truncated to exactly `length` bytes.
    pub const fn truncated(self, length: u8) -> Self {
        Self {
            base: self.base,
            length: MacLength::Truncated(length),
        }
    }

    /// The wildcard accepting any output of at least `length` bytes.
    pub const fn at_least(self, length: u8) -> Self {
        Self {
            base: self.base,
            length: MacLength::AtLeast(length),
        }
    }

    /// The same construction at its default length.
    pub const fn full_length(self) -> Self {
        Self {
            base: self.base,
            length: MacLength::Default,
        }
    }

    /// Encoded length: zero for the default length, otherwise the (minimum)
    /// length carried by the algorithm.
    pub const fn truncated_length(self) -> usize {
        match self.length {
            MacLength::Default => 0,
            MacLength::Truncated(n) | MacLength::AtLeast(n) => n as usize,
        }
    }

    /// Whether this is an at-least-this-length wildcard.
    pub const fn is_wildcard(self) -> bool {
        matches!(self.length, MacLength::AtLeast(_))
    }
}

// ============================================================================
// Ciphers and AEAD
// ============================================================================

/// Unauthenticated cipher modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    /// Stream cipher keyed by the key type (ChaCha20).
    StreamCipher,
    /// Counter mode.
    Ctr,
    /// Cipher feedback mode.
    Cfb,
    /// Output feedback mode.
    Ofb,
    /// XEX-based tweaked codebook mode.
    Xts,
    /// Electronic codebook without padding.
    EcbNoPadding,
    /// Cipher block chaining without padding.
    CbcNoPadding,
    /// Cipher block chaining with PKCS#7 padding.
    CbcPkcs7,
}

impl CipherAlgorithm {
    /// Whether the mode consumes an IV or nonce.
    pub const fn requires_iv(self) -> bool {
        !matches!(self, Self::EcbNoPadding)
    }

    /// Whether the mode behaves like a stream cipher.
    pub const fn is_stream(self) -> bool {
        matches!(self, Self::StreamCipher | Self::Ctr | Self::Cfb | Self::Ofb)
    }
}

/// AEAD constructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AeadBase {
    /// Counter with CBC-MAC.
    Ccm,
    /// Galois/Counter mode.
    Gcm,
    /// ChaCha20 with Poly1305.
    ChaCha20Poly1305,
}

impl AeadBase {
    /// Full tag length in bytes.
    pub const fn full_tag_len(self) -> u8 {
        16
    }

    /// Default nonce length in bytes.
    pub const fn default_nonce_len(self) -> usize {
        match self {
            Self::Ccm => 13,
            Self::Gcm | Self::ChaCha20Poly1305 => 12,
        }
    }
}

/// An AEAD algorithm with its tag length.
///
/// The default algorithm of each construction carries its full tag length,
/// so a construction "shortened" to its full length equals the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AeadAlgorithm {
    /// Underlying construction.
    pub base: AeadBase,
    /// Tag length in bytes (minimum length for a wildcard).
    pub tag_length: u8,
    /// Policy wildcard flag: any tag of at least `tag_length` bytes.
    pub at_least: bool,
}

impl AeadAlgorithm {
    /// Default-length algorithm of `base`.
    pub const fn new(base: AeadBase) -> Self {
        Self {
            base,
            tag_length: base.full_tag_len(),
            at_least: false,
        }
    }

    /// AES-GCM style AEAD with a full tag.
    pub const fn gcm() -> Self {
        Self::new(AeadBase::Gcm)
    }

    /// CCM with a full tag.
    pub const fn ccm() -> Self {
        Self::new(AeadBase::Ccm)
    }

    /// ChaCha20-Poly1305 with a full tag.
    pub const fn chacha20_poly1305() -> Self {
        Self::new(AeadBase::ChaCha20Poly1305)
    }

    /// The same construction with an exact tag length.
    pub const fn with_shortened_tag(self, tag_length: u8) -> Self {
        Self {
            base: self.base,
            tag_length,
            at_least: false,
        }
    }

    /// The wildcard accepting tags of at least `tag_length` bytes.
    pub const fn with_at_least_tag(self, tag_length: u8) -> Self {
        Self {
            base: self.base,
            tag_length,
            at_least: true,
        }
    }

    /// The same construction with its default tag.
    pub const fn default_length(self) -> Self {
        Self::new(self.base)
    }

    /// Whether this is an at-least-this-length wildcard.
    pub const fn is_wildcard(self) -> bool {
        self.at_least
    }
}

// ============================================================================
// Asymmetric
// ============================================================================

/// Signature schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignAlgorithm {
    /// RSA PKCS#1 v1.5 with DigestInfo for the hash.
    RsaPkcs1v15(SignHash),
    /// RSA PKCS#1 v1.5 over a raw, already-encoded input.
    RsaPkcs1v15Raw,
    /// RSA PSS.
    RsaPss(SignHash),
    /// Randomized ECDSA.
    Ecdsa(SignHash),
    /// ECDSA over a raw hash of unspecified origin.
    EcdsaAny,
    /// Deterministic ECDSA (RFC 6979).
    DeterministicEcdsa(SignHash),
    /// Pure EdDSA over the whole message.
    PureEdDsa,
}

/// Signature scheme without its hash parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignScheme {
    /// RSA PKCS#1 v1.5 (hashed or raw).
    RsaPkcs1v15,
    /// RSA PSS.
    RsaPss,
    /// Randomized ECDSA (hashed or raw).
    Ecdsa,
    /// Deterministic ECDSA.
    DeterministicEcdsa,
    /// Pure EdDSA.
    PureEdDsa,
}

impl SignAlgorithm {
    /// Hash parameter, if the scheme carries one.
    pub const fn hash(self) -> Option<SignHash> {
        match self {
            Self::RsaPkcs1v15(h)
            | Self::RsaPss(h)
            | Self::Ecdsa(h)
            | Self::DeterministicEcdsa(h) => Some(h),
            Self::RsaPkcs1v15Raw | Self::EcdsaAny | Self::PureEdDsa => None,
        }
    }

    /// Scheme with the hash parameter erased.
    pub const fn scheme(self) -> SignScheme {
        match self {
            Self::RsaPkcs1v15(_) | Self::RsaPkcs1v15Raw => SignScheme::RsaPkcs1v15,
            Self::RsaPss(_) => SignScheme::RsaPss,
            Self::Ecdsa(_) | Self::EcdsaAny => SignScheme::Ecdsa,
            Self::DeterministicEcdsa(_) => SignScheme::DeterministicEcdsa,
            Self::PureEdDsa => SignScheme::PureEdDsa,
        }
    }

    /// Whether the scheme signs a precomputed hash.
    pub const fn is_sign_hash(self) -> bool {
        !matches!(self, Self::PureEdDsa)
    }

    /// Whether the scheme hashes the message itself before signing.
    pub const fn is_hash_and_sign(self) -> bool {
        self.hash().is_some()
    }

    /// Whether the scheme can be used with message-level sign/verify.
    pub const fn is_sign_message(self) -> bool {
        self.is_hash_and_sign() || matches!(self, Self::PureEdDsa)
    }

    /// Whether this is an any-hash wildcard.
    pub const fn is_wildcard(self) -> bool {
        matches!(self.hash(), Some(SignHash::Any))
    }

    /// Whether the scheme needs an RSA key.
    pub const fn is_rsa(self) -> bool {
        matches!(self.scheme(), SignScheme::RsaPkcs1v15 | SignScheme::RsaPss)
    }
}

/// Asymmetric encryption schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AsymmetricEncryptionAlgorithm {
    /// RSA PKCS#1 v1.5 encryption.
    RsaPkcs1v15Crypt,
    /// RSA OAEP with the given hash.
    RsaOaep(HashAlgorithm),
}

// ============================================================================
// Key derivation and agreement
// ============================================================================

/// Key derivation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KdfAlgorithm {
    /// HKDF (RFC 5869).
    Hkdf(HashAlgorithm),
    /// TLS 1.2 PRF (RFC 5246).
    Tls12Prf(HashAlgorithm),
    /// TLS 1.2 PSK to master secret (RFC 4279).
    Tls12PskToMs(HashAlgorithm),
}

impl KdfAlgorithm {
    /// Hash the KDF is built on.
    pub const fn hash(self) -> HashAlgorithm {
        match self {
            Self::Hkdf(h) | Self::Tls12Prf(h) | Self::Tls12PskToMs(h) => h,
        }
    }
}

/// Raw key agreement primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawKeyAgreement {
    /// Elliptic-curve Diffie-Hellman.
    Ecdh,
    /// Finite-field Diffie-Hellman.
    Ffdh,
}

/// Key agreement, optionally composed with a key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAgreementAlgorithm {
    /// Bare shared secret output.
    Raw(RawKeyAgreement),
    /// Shared secret fed into a KDF.
    WithKdf(RawKeyAgreement, KdfAlgorithm),
}

impl KeyAgreementAlgorithm {
    /// The raw agreement primitive.
    pub const fn base(self) -> RawKeyAgreement {
        match self {
            Self::Raw(base) | Self::WithKdf(base, _) => base,
        }
    }

    /// The KDF the shared secret is fed into, if any.
    pub const fn kdf(self) -> Option<KdfAlgorithm> {
        match self {
            Self::Raw(_) => None,
            Self::WithKdf(_, kdf) => Some(kdf),
        }
    }

    /// Whether this is a bare agreement without KDF.
    pub const fn is_raw(self) -> bool {
        matches!(self, Self::Raw(_))
    }
}

// ============================================================================
// Algorithm
// ============================================================================

/// Any algorithm the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Message digest.
    Hash(HashAlgorithm),
    /// Message authentication code.
    Mac(MacAlgorithm),
    /// Unauthenticated cipher.
    Cipher(CipherAlgorithm),
    /// Authenticated encryption.
    Aead(AeadAlgorithm),
    /// Signature.
    Sign(SignAlgorithm),
    /// Asymmetric encryption.
    AsymmetricEncryption(AsymmetricEncryptionAlgorithm),
    /// Key derivation.
    KeyDerivation(KdfAlgorithm),
    /// Key agreement.
    KeyAgreement(KeyAgreementAlgorithm),
}

impl Algorithm {
    /// Whether the value is a policy wildcard rather than a concrete algorithm.
    pub const fn is_wildcard(&self) -> bool {
        match self {
            Self::Mac(mac) => mac.is_wildcard(),
            Self::Aead(aead) => aead.is_wildcard(),
            Self::Sign(sign) => sign.is_wildcard(),
            _ => false,
        }
    }

    /// Family name used in diagnostics.
    pub const fn family(&self) -> &'static str {
        match self {
            Self::Hash(_) => "hash",
            Self::Mac(_) => "mac",
            Self::Cipher(_) => "cipher",
            Self::Aead(_) => "aead",
            Self::Sign(_) => "sign",
            Self::AsymmetricEncryption(_) => "asymmetric-encryption",
            Self::KeyDerivation(_) => "key-derivation",
            Self::KeyAgreement(_) => "key-agreement",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash(hash) => hash.fmt(f),
            Self::Mac(mac) => {
                match mac.base {
                    FullLengthMac::Hmac(hash) => write!(f, "HMAC({hash})")?,
                    FullLengthMac::Cmac => f.write_str("CMAC")?,
                    FullLengthMac::CbcMac => f.write_str("CBC-MAC")?,
                }
                match mac.length {
                    MacLength::Default => Ok(()),
                    MacLength::Truncated(n) => write!(f, "/{n}"),
                    MacLength::AtLeast(n) => write!(f, "/>={n}"),
                }
            }
            Self::Cipher(cipher) => write!(f, "{cipher:?}"),
            Self::Aead(aead) => {
                let op = if aead.at_least { ">=" } else { "" };
                write!(f, "{:?}/{op}{}", aead.base, aead.tag_length)
            }
            Self::Sign(sign) => match sign.hash() {
                Some(hash) => write!(f, "{:?}({hash})", sign.scheme()),
                None => write!(f, "{sign:?}"),
            },
            Self::AsymmetricEncryption(alg) => write!(f, "{alg:?}"),
            Self::KeyDerivation(kdf) => write!(f, "{kdf:?}"),
            Self::KeyAgreement(ka) => write!(f, "{ka:?}"),
        }
    }
}

macro_rules! impl_from_family {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Algorithm {
                fn from(alg: $ty) -> Self {
                    Self::$variant(alg)
                }
            }
        )*
    };
}

impl_from_family! {
    HashAlgorithm => Hash,
    MacAlgorithm => Mac,
    CipherAlgorithm => Cipher,
    AeadAlgorithm => Aead,
    SignAlgorithm => Sign,
    AsymmetricEncryptionAlgorithm => AsymmetricEncryption,
    KdfAlgorithm => KeyDerivation,
    KeyAgreementAlgorithm => KeyAgreement,
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_lengths() {
        assert_eq!(HashAlgorithm::Sha224.output_len(), 28);
        assert_eq!(HashAlgorithm::Sha256.output_len(), 32);
        assert_eq!(HashAlgorithm::Sha384.output_len(), 48);
        assert_eq!(HashAlgorithm::Sha512.output_len(), HASH_MAX_SIZE);
        assert_eq!(HashAlgorithm::Sha384.block_len(), 128);
    }

    #[test]
    fn test_wildcards() {
        let any = Algorithm::Sign(SignAlgorithm::Ecdsa(SignHash::Any));
        let concrete = Algorithm::Sign(SignAlgorithm::Ecdsa(SignHash::Hash(HashAlgorithm::Sha256)));
        assert!(any.is_wildcard());
        assert!(!concrete.is_wildcard());

        let mac = MacAlgorithm::hmac(HashAlgorithm::Sha256);
        assert!(Algorithm::Mac(mac.at_least(16)).is_wildcard());
        assert!(!Algorithm::Mac(mac.truncated(16)).is_wildcard());

        let aead = AeadAlgorithm::gcm();
        assert!(Algorithm::Aead(aead.with_at_least_tag(8)).is_wildcard());
        assert!(!Algorithm::Aead(aead.with_shortened_tag(8)).is_wildcard());
    }

    #[test]
    fn test_aead_full_length_shortening_is_default() {
        let gcm = AeadAlgorithm::gcm();
        assert_eq!(gcm.with_shortened_tag(16), gcm);
        assert_eq!(gcm.with_shortened_tag(12).default_length(), gcm);
    }

    #[test]
    fn test_mac_truncated_length() {
        let mac = MacAlgorithm::hmac(HashAlgorithm::Sha256);
        assert_eq!(mac.truncated_length(), 0);
        assert_eq!(mac.truncated(20).truncated_length(), 20);
        assert_eq!(mac.at_least(10).truncated_length(), 10);
        assert_eq!(mac.truncated(20).full_length(), mac);
    }

    #[test]
    fn test_sign_predicates() {
        let sha256 = SignHash::Hash(HashAlgorithm::Sha256);
        assert!(SignAlgorithm::Ecdsa(sha256).is_sign_message());
        assert!(SignAlgorithm::Ecdsa(sha256).is_sign_hash());
        assert!(!SignAlgorithm::EcdsaAny.is_sign_message());
        assert!(SignAlgorithm::EcdsaAny.is_sign_hash());
        assert!(SignAlgorithm::PureEdDsa.is_sign_message());
        assert!(!SignAlgorithm::PureEdDsa.is_sign_hash());
        assert_eq!(
            SignAlgorithm::EcdsaAny.scheme(),
            SignAlgorithm::Ecdsa(SignHash::Any).scheme()
        );
        assert_ne!(
            SignAlgorithm::Ecdsa(sha256).scheme(),
            SignAlgorithm::DeterministicEcdsa(sha256).scheme()
        );
    }

    #[test]
    fn test_display() {
        let mac = Algorithm::Mac(MacAlgorithm::hmac(HashAlgorithm::Sha256).truncated(16));
        assert_eq!(mac.to_string(), "HMAC(SHA-256)/16");
        let sign = Algorithm::Sign(SignAlgorithm::Ecdsa(SignHash::Any));
        assert_eq!(sign.to_string(), "Ecdsa(ANY_HASH)");
    }
}
