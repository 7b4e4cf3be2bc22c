//! Ed25519 credential generation.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use trustchain_types::{MemberCredentials, PrivateKey, PublicKey};

/// Generate fresh member credentials from a secure random source.
pub fn generate_credentials() -> MemberCredentials {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    MemberCredentials {
        public: PublicKey(verifying_key.to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Derive the public key from a private key.
pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    let signing_key = SigningKey::from_bytes(&private.0);
    PublicKey(signing_key.verifying_key().to_bytes())
}

/// Rebuild full credentials from a persisted private key.
pub fn credentials_from_private(private: PrivateKey) -> MemberCredentials {
    let public = public_from_private(&private);
    MemberCredentials { public, private }
}

/// Deterministic credentials from a 32-byte seed (tests and fixtures).
pub fn credentials_from_seed(seed: &[u8; 32]) -> MemberCredentials {
    credentials_from_private(PrivateKey(*seed))
}

/// Convert an Ed25519 private key (seed) to X25519 scalar bytes.
///
/// The matching X25519 public key is `ed25519_public_to_x25519(&public)`.
pub fn ed25519_private_to_x25519(ed25519_private: &[u8; 32]) -> [u8; 32] {
    SigningKey::from_bytes(ed25519_private).to_scalar_bytes()
}

/// Convert an Ed25519 public key to its X25519 (Montgomery) form.
///
/// Returns `None` if the bytes are not a valid Edwards point.
pub fn ed25519_public_to_x25519(ed25519_public: &[u8; 32]) -> Option<[u8; 32]> {
    let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(ed25519_public).ok()?;
    Some(verifying_key.to_montgomery().to_bytes())
}
