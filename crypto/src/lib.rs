//! Cryptographic primitives for Trustchain.
//!
//! - **Ed25519** for member signatures and device attestations
//! - **Blake2b** for block hashes and chain identifiers
//! - **X25519 + ChaCha20-Poly1305** sealed envelopes carrying chain keys

pub mod envelope;
pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;

pub use envelope::{open_envelope, seal_envelope, ENVELOPE_OVERHEAD};
pub use error::CryptoError;
pub use hash::{blake2b_256, blake2b_256_multi, chain_id_for_root, hash_block};
pub use keys::{
    credentials_from_private, credentials_from_seed, ed25519_private_to_x25519,
    ed25519_public_to_x25519, generate_credentials, public_from_private,
};
pub use sign::{sign_message, verify_signature};
