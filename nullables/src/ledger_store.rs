//! Nullable remote ledger: thread-safe in-memory chains with CAS append.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use trustchain_ledger::Block;
use trustchain_store::{AppendOutcome, RemoteLedgerStore, StoreError};
use trustchain_types::{BlockHash, ChainId};

/// An in-memory remote ledger.
///
/// `append` checks the expected head and stores the block under one lock,
/// matching the compare-and-swap contract of a real store. Every call yields
/// to the executor once first, so concurrent callers interleave the way they
/// would over a network.
pub struct NullLedgerStore {
    chains: Mutex<HashMap<ChainId, Vec<Block>>>,
    unavailable: AtomicBool,
    stalled: AtomicBool,
    accepted: AtomicUsize,
    conflicts: AtomicUsize,
}

impl NullLedgerStore {
    pub fn new() -> Self {
        Self {
            chains: Mutex::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
            stalled: AtomicBool::new(false),
            accepted: AtomicUsize::new(0),
            conflicts: AtomicUsize::new(0),
        }
    }

    /// Fail every call with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Never answer any call.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    /// Blocks currently stored for `chain_id`.
    pub fn blocks(&self, chain_id: &ChainId) -> Vec<Block> {
        self.chains
            .lock()
            .unwrap()
            .get(chain_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn conflict_count(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("null store switched off".into()));
        }
        Ok(())
    }
}

impl Default for NullLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteLedgerStore for NullLedgerStore {
    async fn get_head(&self, chain_id: &ChainId) -> Result<Option<Vec<Block>>, StoreError> {
        self.gate().await?;
        Ok(self.chains.lock().unwrap().get(chain_id).cloned())
    }

    async fn append(
        &self,
        chain_id: &ChainId,
        block: &Block,
        expected_prev_hash: BlockHash,
    ) -> Result<AppendOutcome, StoreError> {
        self.gate().await?;
        let mut chains = self.chains.lock().unwrap();

        let outcome = match chains.get_mut(chain_id) {
            None if expected_prev_hash.is_zero() => {
                chains.insert(*chain_id, vec![block.clone()]);
                AppendOutcome::Accepted(block.hash)
            }
            None => return Err(StoreError::ChainNotFound(*chain_id)),
            Some(blocks) => {
                let head = blocks.last().map(|b| b.hash).unwrap_or(BlockHash::ZERO);
                if head != expected_prev_hash {
                    AppendOutcome::Conflict(head)
                } else {
                    blocks.push(block.clone());
                    AppendOutcome::Accepted(block.hash)
                }
            }
        };

        match outcome {
            AppendOutcome::Accepted(_) => self.accepted.fetch_add(1, Ordering::SeqCst),
            AppendOutcome::Conflict(_) => self.conflicts.fetch_add(1, Ordering::SeqCst),
        };
        Ok(outcome)
    }
}
