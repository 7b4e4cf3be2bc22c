//! The trustchain: an immutable, validated block sequence.
//!
//! A `Trustchain` value can only be obtained through [`Trustchain::append`]
//! or [`Trustchain::verify`], so every instance holds a sequence that passed
//! validation block by block. Appending never mutates; it returns a new chain.

use trustchain_types::{BlockHash, ChainId};

use crate::block::Block;
use crate::error::LedgerError;
use crate::operation::Operation;
use crate::state::{fold, ChainState};
use crate::validation::validate;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trustchain {
    chain_id: ChainId,
    blocks: Vec<Block>,
}

impl Trustchain {
    /// A chain with no genesis yet; only a Create operation can extend it.
    pub fn empty(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            blocks: Vec::new(),
        }
    }

    /// Replay `blocks` through validation, e.g. after fetching them remotely.
    pub fn verify(chain_id: ChainId, blocks: Vec<Block>) -> Result<Self, LedgerError> {
        let mut state = ChainState::default();
        for block in &blocks {
            check_chain_id(chain_id, &block.operation)?;
            block.verify_hash()?;
            validate(&state, &block.operation)?;
            state.apply(block);
        }
        tracing::debug!(
            chain = %chain_id,
            blocks = blocks.len(),
            epoch = state.epoch,
            "verified block sequence"
        );
        Ok(Self { chain_id, blocks })
    }

    /// Validate `op` against the current head and return the sealed block
    /// together with the extended chain.
    pub fn append(&self, op: Operation) -> Result<(Block, Trustchain), LedgerError> {
        check_chain_id(self.chain_id, &op)?;
        let state = self.state();
        validate(&state, &op)?;

        let block = Block::seal(op)?;
        tracing::debug!(
            chain = %self.chain_id,
            op = ?block.op_type(),
            epoch = block.epoch(),
            hash = %block.hash,
            "appended block"
        );

        let mut blocks = self.blocks.clone();
        blocks.push(block.clone());
        Ok((
            block,
            Trustchain {
                chain_id: self.chain_id,
                blocks,
            },
        ))
    }

    /// Current membership, epoch, and key schedule.
    pub fn state(&self) -> ChainState {
        fold(&self.blocks)
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    /// Hash of the last block, or `BlockHash::ZERO` before genesis.
    pub fn head(&self) -> BlockHash {
        self.blocks.last().map(|b| b.hash).unwrap_or(BlockHash::ZERO)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn check_chain_id(chain_id: ChainId, op: &Operation) -> Result<(), LedgerError> {
    if op.body.chain_id != chain_id {
        return Err(LedgerError::MalformedOperation(format!(
            "operation targets chain {}, not {}",
            op.body.chain_id, chain_id
        )));
    }
    Ok(())
}
