use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("public key is not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("key agreement produced a non-contributory shared secret")]
    WeakKeyAgreement,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("envelope encryption failed")]
    Encryption,

    #[error("envelope authentication failed")]
    Decryption,
}
