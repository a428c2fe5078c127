//! Unauthenticated ciphers: AES in ECB mode and the ChaCha20 stream cipher.

use aes::cipher::{
    generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher,
};
use aes::{Aes128, Aes192, Aes256};
use chacha20::ChaCha20;
use zeroize::Zeroizing;

use crate::algorithm::CipherAlgorithm;
use crate::error::CryptoError;
use crate::key_type::KeyType;
use crate::provider::{CipherContext, Direction, KeyRef};

const AES_BLOCK: usize = 16;
const CHACHA20_NONCE: usize = 12;

enum AesKey {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl AesKey {
    fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let invalid = |_| CryptoError::InvalidKey(format!("bad AES key length {}", key.len()));
        Ok(match key.len() {
            16 => Self::Aes128(Aes128::new_from_slice(key).map_err(invalid)?),
            24 => Self::Aes192(Aes192::new_from_slice(key).map_err(invalid)?),
            32 => Self::Aes256(Aes256::new_from_slice(key).map_err(invalid)?),
            n => {
                return Err(CryptoError::InvalidKey(format!("bad AES key length {n}")));
            }
        })
    }

    fn process(&self, direction: Direction, block: &mut [u8]) {
        let block = GenericArray::from_mut_slice(block);
        match (self, direction) {
            (Self::Aes128(c), Direction::Encrypt) => c.encrypt_block(block),
            (Self::Aes192(c), Direction::Encrypt) => c.encrypt_block(block),
            (Self::Aes256(c), Direction::Encrypt) => c.encrypt_block(block),
            (Self::Aes128(c), Direction::Decrypt) => c.decrypt_block(block),
            (Self::Aes192(c), Direction::Decrypt) => c.decrypt_block(block),
            (Self::Aes256(c), Direction::Decrypt) => c.decrypt_block(block),
        }
    }
}

struct EcbContext {
    cipher: AesKey,
    direction: Direction,
    pending: Zeroizing<Vec<u8>>,
}

impl CipherContext for EcbContext {
    fn set_iv(&mut self, _iv: &[u8]) -> Result<(), CryptoError> {
        Err(CryptoError::InvalidInput("ECB takes no IV".to_string()))
    }

    fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), CryptoError> {
        self.pending.extend_from_slice(input);
        let whole = self.pending.len() - self.pending.len() % AES_BLOCK;
        for chunk in self.pending[..whole].chunks_exact_mut(AES_BLOCK) {
            self.cipher.process(self.direction, chunk);
        }
        output.extend_from_slice(&self.pending[..whole]);
        self.pending.drain(..whole);
        Ok(())
    }

    fn finish(self: Box<Self>, _output: &mut Vec<u8>) -> Result<(), CryptoError> {
        if !self.pending.is_empty() {
            return Err(CryptoError::InvalidInput(format!(
                "{} trailing bytes are not a whole block",
                self.pending.len()
            )));
        }
        Ok(())
    }
}

struct ChaCha20Context {
    key: Zeroizing<Vec<u8>>,
    stream: Option<ChaCha20>,
}

impl CipherContext for ChaCha20Context {
    fn set_iv(&mut self, iv: &[u8]) -> Result<(), CryptoError> {
        if iv.len() != CHACHA20_NONCE {
            return Err(CryptoError::InvalidInput(format!(
                "ChaCha20 nonce must be {CHACHA20_NONCE} bytes, got {}",
                iv.len()
            )));
        }
        let stream = ChaCha20::new_from_slices(&self.key, iv)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn update(&mut self, input: &[u8], output: &mut Vec<u8>) -> Result<(), CryptoError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CryptoError::InvalidInput("nonce not set".to_string()))?;
        let start = output.len();
        output.extend_from_slice(input);
        stream.apply_keystream(&mut output[start..]);
        Ok(())
    }

    fn finish(self: Box<Self>, _output: &mut Vec<u8>) -> Result<(), CryptoError> {
        Ok(())
    }
}

/// Starts a cipher computation.
pub(crate) fn setup(
    key: KeyRef<'_>,
    alg: CipherAlgorithm,
    direction: Direction,
) -> Result<Box<dyn CipherContext>, CryptoError> {
    match (key.key_type, alg) {
        (KeyType::Aes, CipherAlgorithm::EcbNoPadding) => Ok(Box::new(EcbContext {
            cipher: AesKey::new(key.data)?,
            direction,
            pending: Zeroizing::new(Vec::with_capacity(AES_BLOCK)),
        })),
        (KeyType::ChaCha20, CipherAlgorithm::StreamCipher) => {
            if key.data.len() != 32 {
                return Err(CryptoError::InvalidKey(format!(
                    "ChaCha20 key must be 32 bytes, got {}",
                    key.data.len()
                )));
            }
            Ok(Box::new(ChaCha20Context {
                key: Zeroizing::new(key.data.to_vec()),
                stream: None,
            }))
        }
        (key_type, alg) => Err(CryptoError::unsupported(format_args!(
            "{alg:?} with {key_type}"
        ))),
    }
}
