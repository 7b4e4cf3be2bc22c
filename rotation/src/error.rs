use thiserror::Error;
use trustchain_crypto::CryptoError;
use trustchain_types::MemberId;

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("chain has no genesis block")]
    Uninitialized,

    #[error("no key envelope for member {0} in the current rotation")]
    NoEnvelope(MemberId),

    #[error("epoch {requested} is outside the member's key window {from}..={to}")]
    EpochUnavailable { requested: u32, from: u32, to: u32 },

    #[error("epoch counter exhausted")]
    EpochExhausted,

    #[error("envelope did not contain a 32-byte chain key")]
    InvalidSecret,

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}
