//! Engine-wide deterministic random bit generator.

use rand::{rngs::StdRng, RngCore, SeedableRng};
use rempart_crypto::Provider;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::error::EngineError;

const SEED_SIZE: usize = 32;

enum RngState {
    Uninitialized,
    Initialized,
    Seeded(Box<StdRng>),
}

/// DRBG with an explicit init-then-seed lifecycle.
pub struct RandomGenerator {
    state: RngState,
    max_request: usize,
}

impl RandomGenerator {
    /// Creates an initialized, unseeded generator serving requests in chunks
    /// of at most `max_request` bytes.
    pub fn new(max_request: usize) -> Self {
        Self {
            state: RngState::Initialized,
            max_request: max_request.max(1),
        }
    }

    /// Returns an uninitialized generator to the initialized state.
    pub fn init(&mut self) {
        if matches!(self.state, RngState::Uninitialized) {
            self.state = RngState::Initialized;
        }
    }

    /// Whether the generator can produce output.
    pub fn is_seeded(&self) -> bool {
        matches!(self.state, RngState::Seeded(_))
    }

    /// Seeds from the provider's entropy source. Seeding twice is a no-op.
    pub fn seed(&mut self, provider: &dyn Provider) -> Result<(), EngineError> {
        match self.state {
            RngState::Uninitialized => return Err(EngineError::BadState),
            RngState::Seeded(_) => return Ok(()),
            RngState::Initialized => {}
        }
        let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
        let gathered = provider.entropy(&mut seed[..])?;
        if gathered < SEED_SIZE {
            warn!(gathered, needed = SEED_SIZE, "Entropy source came up short");
            return Err(EngineError::InsufficientEntropy);
        }
        self.state = RngState::Seeded(Box::new(StdRng::from_seed(*seed)));
        debug!(provider = provider.name(), "Random generator seeded");
        Ok(())
    }

    /// The seeded generator, for primitives that consume randomness.
    pub fn rng(&mut self) -> Result<&mut dyn RngCore, EngineError> {
        match &mut self.state {
            RngState::Seeded(rng) => Ok(rng.as_mut()),
            _ => {
                warn!("Random generator used before seeding");
                Err(EngineError::BadState)
            }
        }
    }

    /// Fills `out` with random bytes.
    pub fn generate(&mut self, out: &mut [u8]) -> Result<(), EngineError> {
        let max_request = self.max_request;
        let rng = self.rng()?;
        for chunk in out.chunks_mut(max_request) {
            rng.fill_bytes(chunk);
        }
        Ok(())
    }

    /// Drops all generator state.
    pub fn free(&mut self) {
        self.state = RngState::Uninitialized;
    }
}

impl std::fmt::Debug for RandomGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            RngState::Uninitialized => "uninitialized",
            RngState::Initialized => "initialized",
            RngState::Seeded(_) => "seeded",
        };
        f.debug_struct("RandomGenerator")
            .field("state", &state)
            .field("max_request", &self.max_request)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::test_support::ShortEntropy;
    use rempart_crypto::SoftwareProvider;

    #[test]
    fn test_generate_before_seed_is_bad_state() {
        let mut rng = RandomGenerator::new(16);
        let mut buf = [0u8; 8];
        assert_eq!(rng.generate(&mut buf), Err(EngineError::BadState));
    }

    #[test]
    fn test_seed_and_generate_in_chunks() {
        let mut rng = RandomGenerator::new(7);
        rng.seed(&SoftwareProvider::new()).unwrap();
        let mut buf = [0u8; 100];
        rng.generate(&mut buf).unwrap();
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_short_entropy() {
        let mut rng = RandomGenerator::new(16);
        assert_eq!(
            rng.seed(&ShortEntropy(SoftwareProvider::new())),
            Err(EngineError::InsufficientEntropy)
        );
        assert!(!rng.is_seeded());
    }

    #[test]
    fn test_free_then_seed_requires_init() {
        let mut rng = RandomGenerator::new(16);
        rng.free();
        assert_eq!(rng.seed(&SoftwareProvider::new()), Err(EngineError::BadState));
        rng.init();
        rng.seed(&SoftwareProvider::new()).unwrap();
        assert!(rng.is_seeded());
    }
}
