//! SHA-2 message digests.

use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use crate::algorithm::HashAlgorithm;
use crate::provider::HashContext;

#[derive(Clone)]
struct DigestContext<D>(D);

impl<D> HashContext for DigestContext<D>
where
    D: Digest + Clone + Send + 'static,
{
    fn update(&mut self, input: &[u8]) {
        Digest::update(&mut self.0, input);
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_vec()
    }

    fn box_clone(&self) -> Box<dyn HashContext> {
        Box::new(self.clone())
    }
}

/// Starts a digest for `alg`.
pub(crate) fn setup(alg: HashAlgorithm) -> Box<dyn HashContext> {
    match alg {
        HashAlgorithm::Sha224 => Box::new(DigestContext(Sha224::new())),
        HashAlgorithm::Sha256 => Box::new(DigestContext(Sha256::new())),
        HashAlgorithm::Sha384 => Box::new(DigestContext(Sha384::new())),
        HashAlgorithm::Sha512 => Box::new(DigestContext(Sha512::new())),
    }
}
