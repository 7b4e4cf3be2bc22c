//! Blocks: operations sealed with their content hash.

use serde::{Deserialize, Serialize};
use trustchain_crypto::hash_block;
use trustchain_types::{BlockHash, MemberId};

use crate::error::LedgerError;
use crate::operation::{Operation, OperationType};

/// An operation together with the hash the next block links to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub operation: Operation,
    pub hash: BlockHash,
}

impl Block {
    /// Seal a signed operation, computing its hash.
    pub fn seal(operation: Operation) -> Result<Self, LedgerError> {
        let hash = Self::hash_operation(&operation)?;
        Ok(Self { operation, hash })
    }

    /// Hash over the full signed operation.
    pub fn hash_operation(operation: &Operation) -> Result<BlockHash, LedgerError> {
        Ok(hash_block(&bincode::serialize(operation)?))
    }

    /// Recompute the hash and compare with the stored one.
    pub fn verify_hash(&self) -> Result<(), LedgerError> {
        let computed = Self::hash_operation(&self.operation)?;
        if computed != self.hash {
            return Err(LedgerError::InvalidChainLink {
                expected: computed,
                found: self.hash,
            });
        }
        Ok(())
    }

    pub fn op_type(&self) -> OperationType {
        self.operation.op_type()
    }

    pub fn epoch(&self) -> u32 {
        self.operation.body.epoch
    }

    pub fn issuer(&self) -> MemberId {
        self.operation.issuer()
    }

    pub fn prev_hash(&self) -> BlockHash {
        self.operation.prev_hash()
    }
}
