//! Private copies of caller buffers.
//!
//! Inputs are copied in before a primitive sees them and outputs are built
//! in scratch space before being copied back, so a caller that aliases or
//! mutates its buffers mid-call cannot influence the computation. Every
//! staged buffer is zeroized on drop.

use std::ops::{Deref, DerefMut};

use zeroize::Zeroizing;

use crate::error::EngineError;

/// Private copy of a caller input.
pub struct LocalInput(Zeroizing<Vec<u8>>);

impl LocalInput {
    /// Copies `input`.
    pub fn stage(input: &[u8]) -> Result<Self, EngineError> {
        let mut copy = Vec::new();
        copy.try_reserve_exact(input.len())
            .map_err(|_| EngineError::InsufficientMemory)?;
        copy.extend_from_slice(input);
        Ok(Self(Zeroizing::new(copy)))
    }
}

impl Deref for LocalInput {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// Scratch space for an output, committed to the caller on success.
pub struct LocalOutput(Zeroizing<Vec<u8>>);

impl LocalOutput {
    /// Allocates an empty scratch buffer able to hold `capacity` bytes.
    pub fn stage(capacity: usize) -> Result<Self, EngineError> {
        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(capacity)
            .map_err(|_| EngineError::InsufficientMemory)?;
        Ok(Self(Zeroizing::new(scratch)))
    }

    /// Wraps bytes a primitive produced.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Number of bytes produced.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was produced.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies the produced bytes to the front of `dest` and returns their
    /// count.
    pub fn commit(self, dest: &mut [u8]) -> Result<usize, EngineError> {
        let produced = self.0.len();
        let dest = dest
            .get_mut(..produced)
            .ok_or(EngineError::BufferTooSmall)?;
        dest.copy_from_slice(&self.0);
        Ok(produced)
    }
}

impl Deref for LocalOutput {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.0
    }
}

impl DerefMut for LocalOutput {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.0
    }
}

/// Byte written over output buffers when a compute call fails.
pub const FAILURE_FILLER: u8 = b'!';

/// Overwrites `buf` with [`FAILURE_FILLER`].
pub fn fill_failure(buf: &mut [u8]) {
    buf.fill(FAILURE_FILLER);
}
