//! Engine configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EngineError;

/// Largest key size the engine will ever accept, in bits.
pub const MAX_KEY_BITS: usize = 0xFFF8;

/// Tunables of an [`Engine`](crate::Engine) instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of key slots; also the width of the volatile id range.
    pub key_slot_count: usize,
    /// Largest key size accepted at creation, in bits.
    pub max_key_bits: usize,
    /// Largest chunk requested from the DRBG in one call.
    pub rng_max_request: usize,
    /// Largest pre-shared key accepted by TLS 1.2 PSK-to-MS.
    pub tls12_psk_max_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key_slot_count: 32,
            max_key_bits: MAX_KEY_BITS,
            rng_max_request: 1024,
            tls12_psk_max_size: 64,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            warn!(error = %e, "Invalid engine configuration");
            EngineError::InvalidArgument
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration describes a usable engine.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.key_slot_count == 0
            || self.key_slot_count > crate::attributes::KeyId::VENDOR_RANGE_LEN
        {
            return Err(EngineError::InvalidArgument);
        }
        if self.rng_max_request == 0 || self.max_key_bits > MAX_KEY_BITS {
            return Err(EngineError::InvalidArgument);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json(r#"{"key_slot_count": 4}"#).unwrap();
        assert_eq!(config.key_slot_count, 4);
        assert_eq!(config.rng_max_request, 1024);
        assert_eq!(config.tls12_psk_max_size, 64);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert_eq!(
            EngineConfig::from_json(r#"{"key_slot_count": 0}"#),
            Err(EngineError::InvalidArgument)
        );
        assert_eq!(
            EngineConfig::from_json(r#"{"rng_max_request": 0}"#),
            Err(EngineError::InvalidArgument)
        );
        assert_eq!(
            EngineConfig::from_json(r#"{"max_key_bits": 65536}"#),
            Err(EngineError::InvalidArgument)
        );
        assert_eq!(
            EngineConfig::from_json("not json"),
            Err(EngineError::InvalidArgument)
        );
    }
}
