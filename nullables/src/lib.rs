//! Nullable infrastructure for deterministic testing.
//!
//! Every external collaborator of the client (remote ledger, secure device,
//! credential storage) has an in-memory stand-in here that:
//! - never touches the filesystem or network
//! - can be switched into failure modes programmatically
//! - keeps the same atomicity guarantees the real service promises
//!
//! Usage: swap real implementations for nullables in tests.

pub mod credentials;
pub mod ledger_store;
pub mod transport;

pub use credentials::NullCredentialStore;
pub use ledger_store::NullLedgerStore;
pub use transport::{NullTransport, TransportMode};
