//! Sealed envelopes for distributing chain keys to member devices.
//!
//! The sender generates an ephemeral X25519 key, agrees a shared secret with
//! the recipient's X25519 key (mapped from its Ed25519 member key), and seals
//! the plaintext with ChaCha20-Poly1305 under a random nonce. Only the holder
//! of the recipient's private key can open it; the sender keeps nothing.
//!
//! Wire layout: `ephemeral_public (32) || nonce (12) || ciphertext+tag`.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use trustchain_types::{PrivateKey, PublicKey};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public, SharedSecret, StaticSecret};

use crate::error::CryptoError;
use crate::hash::blake2b_256_multi;
use crate::keys::{ed25519_private_to_x25519, ed25519_public_to_x25519};

const ENVELOPE_DOMAIN: &[u8] = b"trustchain/envelope";
const EPHEMERAL_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Bytes an envelope adds on top of its plaintext.
pub const ENVELOPE_OVERHEAD: usize = EPHEMERAL_LEN + NONCE_LEN + TAG_LEN;

/// Seal `plaintext` so that only `recipient` can open it.
///
/// `aad` is authenticated but not encrypted; the opener must supply the
/// same bytes.
pub fn seal_envelope(
    plaintext: &[u8],
    recipient: &PublicKey,
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let recipient_x =
        ed25519_public_to_x25519(recipient.as_bytes()).ok_or(CryptoError::InvalidPublicKey)?;
    let recipient_pub = X25519Public::from(recipient_x);

    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_pub = X25519Public::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&recipient_pub);

    let cipher = envelope_cipher(&shared, &ephemeral_pub, &recipient_pub)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Encryption)?;

    let mut out = Vec::with_capacity(EPHEMERAL_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(ephemeral_pub.as_bytes());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open an envelope addressed to the holder of `recipient_private`.
pub fn open_envelope(
    envelope: &[u8],
    recipient_private: &PrivateKey,
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if envelope.len() < ENVELOPE_OVERHEAD {
        return Err(CryptoError::MalformedEnvelope(format!(
            "expected at least {} bytes, got {}",
            ENVELOPE_OVERHEAD,
            envelope.len()
        )));
    }
    let (ephemeral_bytes, rest) = envelope.split_at(EPHEMERAL_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

    let mut ephemeral = [0u8; EPHEMERAL_LEN];
    ephemeral.copy_from_slice(ephemeral_bytes);
    let ephemeral_pub = X25519Public::from(ephemeral);

    let secret = StaticSecret::from(ed25519_private_to_x25519(&recipient_private.0));
    let recipient_pub = X25519Public::from(&secret);
    let shared = secret.diffie_hellman(&ephemeral_pub);

    let cipher = envelope_cipher(&shared, &ephemeral_pub, &recipient_pub)?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Decryption)
}

fn envelope_cipher(
    shared: &SharedSecret,
    ephemeral_pub: &X25519Public,
    recipient_pub: &X25519Public,
) -> Result<ChaCha20Poly1305, CryptoError> {
    if !shared.was_contributory() {
        return Err(CryptoError::WeakKeyAgreement);
    }
    let sym_key = blake2b_256_multi(&[
        shared.as_bytes(),
        ephemeral_pub.as_bytes(),
        recipient_pub.as_bytes(),
        ENVELOPE_DOMAIN,
    ]);
    Ok(ChaCha20Poly1305::new(Key::from_slice(&sym_key)))
}
