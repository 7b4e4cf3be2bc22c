//! Key rotation for trustchain epochs.
//!
//! Each rotation mints a random secret and turns it into a chain key bound to
//! the chain's ratchet seed, the public rotation nonce, and the rotation's
//! first epoch. Every later epoch's chain key is a one-way HKDF step from the
//! previous one, and each epoch key is derived from its chain key.
//!
//! Members current at a rotation get the chain key of its first epoch. A
//! member added without a rotation gets the chain key already ratcheted to
//! its join epoch, so it can derive keys from that epoch onward but never
//! the ones before it. A removed member is cut off by the fresh secret of the
//! rotation that removes it.

pub mod engine;
pub mod error;
pub mod secret;

pub use engine::{GenesisMaterial, KeyRotationEngine, RotationMaterial};
pub use error::RotationError;
pub use secret::{ChainKey, EpochKey};
