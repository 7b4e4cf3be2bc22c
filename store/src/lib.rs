//! Abstract collaborators of the Trustchain client.
//!
//! The remote ledger, the attesting device, and local credential storage are
//! all external. The client depends only on these traits; in-memory versions
//! live in `trustchain-nullables`.

pub mod credentials;
pub mod error;
pub mod remote;
pub mod transport;

pub use credentials::CredentialStore;
pub use error::{StoreError, TransportError};
pub use remote::{AppendOutcome, RemoteLedgerStore};
pub use transport::SecureTransport;
