//! HMAC over SHA-2.

use hmac::{Hmac, Mac};
use sha2::{Sha224, Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use crate::algorithm::{FullLengthMac, HashAlgorithm};
use crate::error::CryptoError;
use crate::key_type::KeyType;
use crate::provider::{KeyRef, MacContext};

enum HmacState {
    Sha224(Hmac<Sha224>),
    Sha256(Hmac<Sha256>),
    Sha384(Hmac<Sha384>),
    Sha512(Hmac<Sha512>),
}

struct HmacContext(HmacState);

impl MacContext for HmacContext {
    fn update(&mut self, input: &[u8]) {
        match &mut self.0 {
            HmacState::Sha224(mac) => mac.update(input),
            HmacState::Sha256(mac) => mac.update(input),
            HmacState::Sha384(mac) => mac.update(input),
            HmacState::Sha512(mac) => mac.update(input),
        }
    }

    fn finish(self: Box<Self>) -> Zeroizing<Vec<u8>> {
        let bytes = match self.0 {
            HmacState::Sha224(mac) => mac.finalize().into_bytes().to_vec(),
            HmacState::Sha256(mac) => mac.finalize().into_bytes().to_vec(),
            HmacState::Sha384(mac) => mac.finalize().into_bytes().to_vec(),
            HmacState::Sha512(mac) => mac.finalize().into_bytes().to_vec(),
        };
        Zeroizing::new(bytes)
    }
}

fn hmac_state(hash: HashAlgorithm, key: &[u8]) -> Result<HmacState, CryptoError> {
    let invalid = |e: hmac::digest::InvalidLength| CryptoError::InvalidKey(e.to_string());
    Ok(match hash {
        HashAlgorithm::Sha224 => HmacState::Sha224(Hmac::new_from_slice(key).map_err(invalid)?),
        HashAlgorithm::Sha256 => HmacState::Sha256(Hmac::new_from_slice(key).map_err(invalid)?),
        HashAlgorithm::Sha384 => HmacState::Sha384(Hmac::new_from_slice(key).map_err(invalid)?),
        HashAlgorithm::Sha512 => HmacState::Sha512(Hmac::new_from_slice(key).map_err(invalid)?),
    })
}

/// Starts a MAC computation keyed by `key`.
pub(crate) fn setup(
    key: KeyRef<'_>,
    alg: FullLengthMac,
) -> Result<Box<dyn MacContext>, CryptoError> {
    match alg {
        FullLengthMac::Hmac(hash) => {
            if key.key_type != KeyType::Hmac {
                return Err(CryptoError::InvalidKey(format!(
                    "HMAC requires an HMAC key, got {}",
                    key.key_type
                )));
            }
            Ok(Box::new(HmacContext(hmac_state(hash, key.data)?)))
        }
        FullLengthMac::Cmac | FullLengthMac::CbcMac => {
            Err(CryptoError::unsupported(format_args!("{alg:?}")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn hmac_key(data: &[u8]) -> KeyRef<'_> {
        KeyRef::new(KeyType::Hmac, data.len() * 8, data)
    }

    #[test]
    fn test_rfc4231_case_2() {
        let key = b"Jefe";
        let mut ctx = setup(hmac_key(key), FullLengthMac::Hmac(HashAlgorithm::Sha256)).unwrap();
        ctx.update(b"what do ya want ");
        ctx.update(b"for nothing?");
        assert_eq!(
            hex::encode(&*ctx.finish()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_rfc4231_case_1_sha512() {
        let key = [0x0b; 20];
        let mut ctx = setup(hmac_key(&key), FullLengthMac::Hmac(HashAlgorithm::Sha512)).unwrap();
        ctx.update(b"Hi There");
        assert_eq!(
            hex::encode(&*ctx.finish()),
            "87aa7cdea5ef619d4ff0b4241a1d6cb02379f4e2ce4ec2787ad0b30545e17cde\
             daa833b7d6b8a702038b274eaea3f4e4be9d914eeb61f1702e696c203a126854"
        );
    }

    #[test]
    fn test_wrong_key_type_rejected() {
        let key = [0u8; 16];
        let aes = KeyRef::new(KeyType::Aes, 128, &key);
        let result = setup(aes, FullLengthMac::Hmac(HashAlgorithm::Sha256));
        assert!(matches!(result, Err(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn test_cmac_unsupported() {
        let key = [0u8; 16];
        let aes = KeyRef::new(KeyType::Aes, 128, &key);
        assert!(matches!(
            setup(aes, FullLengthMac::Cmac),
            Err(CryptoError::Unsupported(_))
        ));
    }
}
