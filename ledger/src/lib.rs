//! Hash-linked membership ledger.
//!
//! A trustchain is an append-only sequence of signed operations. Each block
//! links to its predecessor by hash, and the current membership is never
//! stored: it is recomputed by folding the blocks in ledger order.

pub mod block;
pub mod builder;
pub mod chain;
pub mod error;
pub mod operation;
pub mod state;
pub mod validation;

pub use block::Block;
pub use chain::Trustchain;
pub use error::LedgerError;
pub use operation::{Attestation, Operation, OperationBody, OperationPayload, OperationType};
pub use state::{fold, ChainState, ChainStatus, KeySchedule, MemberEnvelope, MemberStatus};
pub use validation::validate;
