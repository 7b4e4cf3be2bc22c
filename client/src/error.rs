use thiserror::Error;
use trustchain_ledger::LedgerError;
use trustchain_rotation::RotationError;
use trustchain_store::{StoreError, TransportError};
use trustchain_types::{BlockHash, ChainId, MemberId};

/// How a caller should react to a [`TrustchainError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Structural or cryptographic violation; never retry.
    Corruption,
    /// The request is invalid against the current chain state.
    Rejected,
    /// Refetch, rebuild, or wait, then try again.
    Transient,
    /// This member's relationship with the chain is over.
    Terminal,
}

#[derive(Debug, Error)]
pub enum TrustchainError {
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

    #[error("member {0} has been ejected from the trustchain")]
    TrustchainEjected(MemberId),

    #[error("remote head moved: built on {expected}, store is at {current}")]
    RemoteConflict { expected: BlockHash, current: BlockHash },

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    #[error("malformed operation: {0}")]
    MalformedOperation(String),

    #[error("encryption key unavailable: {0}")]
    KeyUnavailable(#[from] RotationError),

    #[error("chain not found: {0}")]
    ChainNotFound(ChainId),

    #[error("credential storage error: {0}")]
    Credentials(String),

    #[error("config error: {0}")]
    Config(String),
}

impl TrustchainError {
    pub fn class(&self) -> ErrorClass {
        use TrustchainError::*;
        match self {
            InvalidSignature(_) | InvalidChainLink { .. } | MalformedOperation(_) => {
                ErrorClass::Corruption
            }
            PermissionDenied { .. }
            | MemberAlreadyPresent(_)
            | MemberNotFound(_)
            | MemberPreviouslyRemoved(_)
            | LastMemberRemoval(_)
            | KeyUnavailable(_)
            | ChainNotFound(_)
            | Credentials(_)
            | Config(_) => ErrorClass::Rejected,
            RemoteConflict { .. } | TransportFailure(_) | Timeout { .. } => ErrorClass::Transient,
            ChainDestroyed | TrustchainEjected(_) => ErrorClass::Terminal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub fn is_terminal(&self) -> bool {
        self.class() == ErrorClass::Terminal
    }
}

impl From<LedgerError> for TrustchainError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidSignature(msg) => Self::InvalidSignature(msg),
            LedgerError::InvalidChainLink { expected, found } => {
                Self::InvalidChainLink { expected, found }
            }
            LedgerError::PermissionDenied { issuer } => Self::PermissionDenied { issuer },
            LedgerError::MemberAlreadyPresent(id) => Self::MemberAlreadyPresent(id),
            LedgerError::MemberNotFound(id) => Self::MemberNotFound(id),
            LedgerError::MemberPreviouslyRemoved(id) => Self::MemberPreviouslyRemoved(id),
            LedgerError::LastMemberRemoval(id) => Self::LastMemberRemoval(id),
            LedgerError::ChainDestroyed => Self::ChainDestroyed,
            LedgerError::MalformedOperation(msg) => Self::MalformedOperation(msg),
            LedgerError::Serialization(msg) => {
                Self::MalformedOperation(format!("serialization: {}", msg))
            }
        }
    }
}

impl From<StoreError> for TrustchainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ChainNotFound(id) => Self::ChainNotFound(id),
            StoreError::Unavailable(msg) | StoreError::Backend(msg) => {
                Self::TransportFailure(format!("ledger store: {}", msg))
            }
            StoreError::Serialization(msg) => {
                Self::MalformedOperation(format!("ledger store returned bad data: {}", msg))
            }
        }
    }
}

impl From<TransportError> for TrustchainError {
    fn from(e: TransportError) -> Self {
        Self::TransportFailure(e.to_string())
    }
}
