//! Remote chain persistence with compare-and-swap append.

use async_trait::async_trait;
use trustchain_ledger::Block;
use trustchain_types::{BlockHash, ChainId};

use crate::error::StoreError;

/// Result of a conditional append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The block became the new head.
    Accepted(BlockHash),
    /// Another block got there first; carries the store's current head.
    Conflict(BlockHash),
}

/// The authoritative home of every chain.
///
/// Implementations must make `append` atomic: the block is stored only if
/// `expected_prev_hash` still equals the chain's head at that instant.
#[async_trait]
pub trait RemoteLedgerStore: Send + Sync {
    /// Full block sequence of a chain, or `None` if it was never created.
    async fn get_head(&self, chain_id: &ChainId) -> Result<Option<Vec<Block>>, StoreError>;

    /// Conditionally append `block`.
    ///
    /// A genesis block is submitted with `expected_prev_hash == BlockHash::ZERO`
    /// and conflicts if the chain already exists. Appending to a chain that
    /// does not exist fails with [`StoreError::ChainNotFound`].
    async fn append(
        &self,
        chain_id: &ChainId,
        block: &Block,
        expected_prev_hash: BlockHash,
    ) -> Result<AppendOutcome, StoreError>;
}
