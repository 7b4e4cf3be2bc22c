use thiserror::Error;
use trustchain_types::{BlockHash, MemberId};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid chain link: expected {expected}, found {found}")]
    InvalidChainLink { expected: BlockHash, found: BlockHash },

    #[error("permission denied: {issuer} may not manage members")]
    PermissionDenied { issuer: MemberId },

    #[error("member {0} is already present")]
    MemberAlreadyPresent(MemberId),

    #[error("member {0} is not a current member")]
    MemberNotFound(MemberId),

    #[error("member {0} was removed from this chain and cannot rejoin")]
    MemberPreviouslyRemoved(MemberId),

    #[error("removing {0} would leave the chain without members")]
    LastMemberRemoval(MemberId),

    #[error("trustchain has been destroyed")]
    ChainDestroyed,

    #[error("malformed operation: {0}")]
    MalformedOperation(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}
