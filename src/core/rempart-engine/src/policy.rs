//! Usage and algorithm policy evaluation.
//!
//! A stored policy algorithm may be a wildcard; a requested algorithm never
//! may. Interpretation of MAC lengths depends on the key type, since the
//! full length of a block-cipher MAC is the cipher's block size.

use rempart_crypto::{
    AeadAlgorithm, Algorithm, FullLengthMac, KeyType, MacAlgorithm, MacLength, SignAlgorithm,
    SignHash,
};

use crate::attributes::{KeyPolicy, Usage};
use crate::error::EngineError;

/// Checks that `alg` can be used with a key of type `key_type` for a MAC.
pub fn mac_key_can_do(alg: MacAlgorithm, key_type: KeyType) -> Result<(), EngineError> {
    let ok = match alg.base {
        FullLengthMac::Hmac(_) => key_type == KeyType::Hmac,
        FullLengthMac::Cmac | FullLengthMac::CbcMac => {
            key_type.is_symmetric_cipher() && key_type.block_len() > 1
        }
    };
    if ok {
        Ok(())
    } else {
        Err(EngineError::InvalidArgument)
    }
}

/// Output length of `alg` with a key of type `key_type`, in bytes.
///
/// For an at-least wildcard this is the minimum length. Returns zero when
/// the combination has no meaningful length.
pub fn mac_length(key_type: KeyType, alg: MacAlgorithm) -> usize {
    match alg.length {
        MacLength::Truncated(n) | MacLength::AtLeast(n) => n as usize,
        MacLength::Default => match alg.base {
            FullLengthMac::Hmac(hash) => hash.output_len(),
            FullLengthMac::Cmac | FullLengthMac::CbcMac => key_type.block_len(),
        },
    }
}

// ============================================================================
// Permission
// ============================================================================

fn sign_permits(policy: SignAlgorithm, requested: SignAlgorithm) -> bool {
    requested.is_sign_hash()
        && policy.hash() == Some(SignHash::Any)
        && policy.scheme() == requested.scheme()
}

fn aead_permits(policy: AeadAlgorithm, requested: AeadAlgorithm) -> bool {
    policy.at_least && policy.base == requested.base && policy.tag_length <= requested.tag_length
}

fn mac_permits(key_type: KeyType, policy: MacAlgorithm, requested: MacAlgorithm) -> bool {
    if policy.base != requested.base || mac_key_can_do(policy, key_type).is_err() {
        return false;
    }
    let requested_len = mac_length(key_type, requested);
    let default_len = mac_length(key_type, requested.full_length());

    if policy.truncated_length() == 0 {
        return requested_len == default_len;
    }
    if requested.truncated_length() == 0 && policy.truncated_length() == default_len {
        return true;
    }
    match policy.length {
        MacLength::AtLeast(min) => (min as usize) <= requested_len,
        _ => false,
    }
}

/// Whether a single policy algorithm admits the concrete `requested` one.
pub fn algorithm_permits(key_type: KeyType, policy: Algorithm, requested: Algorithm) -> bool {
    if policy == requested {
        return true;
    }
    match (policy, requested) {
        (Algorithm::Sign(p), Algorithm::Sign(r)) => sign_permits(p, r),
        (Algorithm::Aead(p), Algorithm::Aead(r)) => aead_permits(p, r),
        (Algorithm::Mac(p), Algorithm::Mac(r)) => mac_permits(key_type, p, r),
        (Algorithm::KeyAgreement(p), Algorithm::KeyAgreement(r)) => {
            p.is_raw() && p.base() == r.base()
        }
        _ => false,
    }
}

/// Checks a concrete algorithm against both policy algorithms.
///
/// Fails with `InvalidArgument` when `alg` is itself a wildcard and with
/// `NotPermitted` when neither policy algorithm admits it.
pub fn policy_permits(
    policy: &KeyPolicy,
    key_type: KeyType,
    alg: Algorithm,
) -> Result<(), EngineError> {
    if alg.is_wildcard() {
        return Err(EngineError::InvalidArgument);
    }
    let permits = |stored: Option<Algorithm>| {
        stored.is_some_and(|stored| algorithm_permits(key_type, stored, alg))
    };
    if permits(policy.alg) || permits(policy.alg2) {
        Ok(())
    } else {
        Err(EngineError::NotPermitted)
    }
}

/// Checks usage flags and, when given, the algorithm.
///
/// Public keys are always exportable, so `EXPORT` is never required of them.
pub fn check_policy(
    policy: &KeyPolicy,
    key_type: KeyType,
    mut usage: Usage,
    alg: Option<Algorithm>,
) -> Result<(), EngineError> {
    if key_type.is_public_key() {
        usage.remove(Usage::EXPORT);
    }
    if !policy.usage.contains(usage) {
        return Err(EngineError::NotPermitted);
    }
    match alg {
        Some(alg) => policy_permits(policy, key_type, alg),
        None => Ok(()),
    }
}

// ============================================================================
// Intersection
// ============================================================================

fn mac_intersection(
    key_type: KeyType,
    a: MacAlgorithm,
    b: MacAlgorithm,
) -> Option<MacAlgorithm> {
    mac_key_can_do(a, key_type).ok()?;
    let a_len = mac_length(key_type, a);
    let b_len = mac_length(key_type, b);
    let restricted = a_len.max(b_len);

    match (a.is_wildcard(), b.is_wildcard()) {
        (true, true) => Some(a.at_least(u8::try_from(restricted).ok()?)),
        (true, false) => (a_len <= b_len).then_some(b),
        (false, true) => (b_len <= a_len).then_some(a),
        (false, false) => {
            if a_len == b_len {
                Some(a.truncated(u8::try_from(a_len).ok()?))
            } else {
                None
            }
        }
    }
}

fn aead_intersection(a: AeadAlgorithm, b: AeadAlgorithm) -> Option<AeadAlgorithm> {
    let restricted = a.tag_length.max(b.tag_length);
    match (a.at_least, b.at_least) {
        (true, true) => Some(a.with_at_least_tag(restricted)),
        (true, false) if a.tag_length <= b.tag_length => Some(b),
        (false, true) if b.tag_length <= a.tag_length => Some(a),
        _ => None,
    }
}

/// Most restrictive algorithm admitted by both `a` and `b`, if any.
pub fn algorithm_intersection(key_type: KeyType, a: Algorithm, b: Algorithm) -> Option<Algorithm> {
    if a == b {
        return Some(a);
    }
    match (a, b) {
        (Algorithm::Sign(x), Algorithm::Sign(y))
            if x.is_sign_hash() && y.is_sign_hash() && x.scheme() == y.scheme() =>
        {
            if x.hash() == Some(SignHash::Any) {
                Some(b)
            } else if y.hash() == Some(SignHash::Any) {
                Some(a)
            } else {
                None
            }
        }
        (Algorithm::Aead(x), Algorithm::Aead(y)) if x.base == y.base => {
            aead_intersection(x, y).map(Algorithm::Aead)
        }
        (Algorithm::Mac(x), Algorithm::Mac(y)) if x.base == y.base => {
            mac_intersection(key_type, x, y).map(Algorithm::Mac)
        }
        _ => None,
    }
}

fn intersect_slot(
    key_type: KeyType,
    policy: Option<Algorithm>,
    constraint: Option<Algorithm>,
) -> Result<Option<Algorithm>, EngineError> {
    match (policy, constraint) {
        (Some(p), Some(c)) => algorithm_intersection(key_type, p, c)
            .map(Some)
            .ok_or(EngineError::InvalidArgument),
        _ => Ok(None),
    }
}

/// Restricts `policy` by `constraint`.
///
/// Usage flags are intersected. Each algorithm becomes the intersection of
/// the two sides; this fails only if both sides name an algorithm and the
/// two are incompatible. On failure `policy` is left untouched.
pub fn restrict_policy(
    key_type: KeyType,
    policy: &mut KeyPolicy,
    constraint: &KeyPolicy,
) -> Result<(), EngineError> {
    let alg = intersect_slot(key_type, policy.alg, constraint.alg)?;
    let alg2 = intersect_slot(key_type, policy.alg2, constraint.alg2)?;
    policy.usage &= constraint.usage;
    policy.alg = alg;
    policy.alg2 = alg2;
    Ok(())
}

/// Rejects usage flags outside the known set.
pub fn validate_usage(usage: Usage) -> Result<(), EngineError> {
    if usage.bits() & !Usage::all().bits() != 0 {
        return Err(EngineError::InvalidArgument);
    }
    Ok(())
}
