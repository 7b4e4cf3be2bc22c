//! Secret material that must never be logged or persisted in clear.

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A rotation's chain key as of one epoch.
///
/// Envelopes carry the chain key for the epoch they were sealed at. Later
/// epochs are reached by a one-way ratchet, earlier ones are not reachable.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ChainKey {
    pub(crate) epoch: u32,
    pub(crate) key: [u8; 32],
}

impl ChainKey {
    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}

impl fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainKey(epoch {}, ..)", self.epoch)
    }
}

/// The shared encryption key for one epoch.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EpochKey {
    pub(crate) epoch: u32,
    pub(crate) key: [u8; 32],
}

impl EpochKey {
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl fmt::Debug for EpochKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EpochKey(epoch {}, ..)", self.epoch)
    }
}
