//! Fundamental types for the Trustchain protocol.
//!
//! Shared by every other crate in the workspace: block and chain digests,
//! Ed25519 key material, and member identities with their capability masks.

pub mod hash;
pub mod keys;
pub mod member;

pub use hash::{BlockHash, ChainId};
pub use keys::{MemberCredentials, PrivateKey, PublicKey, Signature};
pub use member::{Member, MemberId, Permissions};
