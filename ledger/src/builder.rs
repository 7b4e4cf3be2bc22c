//! Constructors for operation bodies built atop a folded chain state.
//!
//! Builders fill in the chain id, epoch, and predecessor hash from the state
//! so callers only supply the membership change and its key material.

use std::collections::BTreeMap;
use trustchain_types::{BlockHash, ChainId, Member, MemberId};

use crate::error::LedgerError;
use crate::operation::{OperationBody, OperationPayload, OperationType};
use crate::state::ChainState;

impl OperationBody {
    /// Genesis body: `creator` becomes the sole member at epoch 0.
    pub fn create(
        chain_id: ChainId,
        creator: Member,
        ratchet_seed: [u8; 32],
        rotation_nonce: [u8; 32],
        key_envelopes: BTreeMap<MemberId, Vec<u8>>,
    ) -> Self {
        Self {
            op_type: OperationType::Create,
            chain_id,
            epoch: 0,
            issuer: creator.id,
            payload: OperationPayload {
                member: Some(creator),
                key_envelopes,
                ratchet_seed: Some(ratchet_seed),
                rotation_nonce: Some(rotation_nonce),
            },
            prev_hash: BlockHash::ZERO,
        }
    }

    /// Add `member`. Pass `rotation_nonce` only when the key rotates on add.
    pub fn add_member(
        state: &ChainState,
        issuer: MemberId,
        member: Member,
        key_envelopes: BTreeMap<MemberId, Vec<u8>>,
        rotation_nonce: Option<[u8; 32]>,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            op_type: OperationType::AddMember,
            chain_id: active_chain(state)?,
            epoch: next_epoch(state)?,
            issuer,
            payload: OperationPayload {
                member: Some(member),
                key_envelopes,
                ratchet_seed: None,
                rotation_nonce,
            },
            prev_hash: state.head,
        })
    }

    /// Remove `target`, rotating the key for everyone who remains.
    pub fn remove_member(
        state: &ChainState,
        issuer: MemberId,
        target: Member,
        rotation_nonce: [u8; 32],
        key_envelopes: BTreeMap<MemberId, Vec<u8>>,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            op_type: OperationType::RemoveMember,
            chain_id: active_chain(state)?,
            epoch: next_epoch(state)?,
            issuer,
            payload: OperationPayload {
                member: Some(target),
                key_envelopes,
                ratchet_seed: None,
                rotation_nonce: Some(rotation_nonce),
            },
            prev_hash: state.head,
        })
    }

    /// Terminal body; keeps the current epoch.
    pub fn destroy(state: &ChainState, issuer: MemberId) -> Result<Self, LedgerError> {
        Ok(Self {
            op_type: OperationType::Destroy,
            chain_id: active_chain(state)?,
            epoch: state.epoch,
            issuer,
            payload: OperationPayload::default(),
            prev_hash: state.head,
        })
    }
}

fn active_chain(state: &ChainState) -> Result<ChainId, LedgerError> {
    if state.is_destroyed() {
        return Err(LedgerError::ChainDestroyed);
    }
    state
        .chain_id
        .ok_or_else(|| LedgerError::MalformedOperation("chain has no genesis block".into()))
}

fn next_epoch(state: &ChainState) -> Result<u32, LedgerError> {
    state
        .epoch
        .checked_add(1)
        .ok_or_else(|| LedgerError::MalformedOperation("epoch counter exhausted".into()))
}
