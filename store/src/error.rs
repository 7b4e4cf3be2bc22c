use thiserror::Error;
use trustchain_types::ChainId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("chain not found: {0}")]
    ChainNotFound(ChainId),

    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("device unavailable: {0}")]
    Unavailable(String),

    #[error("device refused to attest: {0}")]
    Rejected(String),
}
