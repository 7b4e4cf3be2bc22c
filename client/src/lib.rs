//! Trustchain client.
//!
//! Lets a user's devices share a rotating secret through a hash-linked
//! membership ledger:
//! - create or adopt the chain anchored at a secure device
//! - add and remove member devices, rotating the key on removal
//! - restore the latest chain and key, detecting ejection
//! - destroy the chain
//!
//! The remote store, the attesting device, and local credential storage are
//! supplied by the caller through the traits in `trustchain-store`.

pub mod client;
pub mod config;
pub mod error;
pub mod keystore;

pub use client::{OpenedTrustchain, TrustchainClient, TrustchainView};
pub use config::ClientConfig;
pub use error::{ErrorClass, TrustchainError};
pub use keystore::{FileCredentialStore, KdfParams};

pub use trustchain_ledger::{ChainState, MemberStatus, Trustchain};
pub use trustchain_rotation::EpochKey;
pub use trustchain_types::{Member, MemberCredentials, MemberId, Permissions};
