//! Folded chain state.
//!
//! [`fold`] is a left-reduction over blocks that already passed validation.
//! It never fails and depends only on block order, so every replica that
//! holds the same sequence derives the same state.

use std::collections::{BTreeMap, BTreeSet};
use trustchain_types::{BlockHash, ChainId, Member, MemberId, PublicKey};

use crate::block::Block;
use crate::operation::OperationType;

/// Lifecycle of a chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChainStatus {
    #[default]
    Uninitialized,
    Active,
    Destroyed,
}

/// A member's relationship to a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberStatus {
    NeverMember,
    Current,
    Ejected,
    ChainDestroyed,
}

/// A member's sealed chain key, valid from `epoch` onward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberEnvelope {
    pub epoch: u32,
    pub sealed: Vec<u8>,
}

/// Public key-rotation material for the current rotation window.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeySchedule {
    pub ratchet_seed: [u8; 32],
    pub rotation_nonce: [u8; 32],
    /// Epoch at which the current rotation was minted.
    pub rotation_epoch: u32,
    /// Sealed chain keys of the current rotation. Members sealed at the
    /// rotation hold its first epoch; later joiners hold their join epoch.
    pub envelopes: BTreeMap<MemberId, MemberEnvelope>,
}

/// Membership, epoch, and key schedule derived from a block sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainState {
    pub chain_id: Option<ChainId>,
    pub status: ChainStatus,
    pub epoch: u32,
    /// Current members in join order.
    pub members: Vec<Member>,
    pub removed: BTreeSet<MemberId>,
    /// Device that attested genesis; must attest every removal.
    pub root_device: Option<PublicKey>,
    pub key_schedule: KeySchedule,
    pub head: BlockHash,
    pub height: u64,
}

impl ChainState {
    pub fn member(&self, id: &MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == *id)
    }

    pub fn is_member(&self, id: &MemberId) -> bool {
        self.member(id).is_some()
    }

    pub fn member_ids(&self) -> BTreeSet<MemberId> {
        self.members.iter().map(|m| m.id).collect()
    }

    pub fn is_destroyed(&self) -> bool {
        self.status == ChainStatus::Destroyed
    }

    pub fn member_status(&self, id: &MemberId) -> MemberStatus {
        if self.removed.contains(id) {
            MemberStatus::Ejected
        } else if !self.is_member(id) {
            MemberStatus::NeverMember
        } else if self.is_destroyed() {
            MemberStatus::ChainDestroyed
        } else {
            MemberStatus::Current
        }
    }

    /// Apply one validated block.
    pub fn apply(&mut self, block: &Block) {
        let op = &block.operation;
        let payload = &op.body.payload;

        match op.body.op_type {
            OperationType::Create => {
                self.chain_id = Some(op.body.chain_id);
                self.status = ChainStatus::Active;
                self.members = payload.member.iter().cloned().collect();
                self.root_device = op.attestation.as_ref().map(|a| a.device.clone());
                self.key_schedule = KeySchedule {
                    ratchet_seed: payload.ratchet_seed.unwrap_or_default(),
                    rotation_nonce: payload.rotation_nonce.unwrap_or_default(),
                    rotation_epoch: op.body.epoch,
                    envelopes: sealed_at(op.body.epoch, &payload.key_envelopes),
                };
            }
            OperationType::AddMember => {
                if let Some(member) = &payload.member {
                    self.members.push(member.clone());
                }
                match payload.rotation_nonce {
                    Some(nonce) => self.rotate(nonce, op.body.epoch, &payload.key_envelopes),
                    None => self
                        .key_schedule
                        .envelopes
                        .extend(sealed_at(op.body.epoch, &payload.key_envelopes)),
                }
            }
            OperationType::RemoveMember => {
                if let Some(target) = &payload.member {
                    self.members.retain(|m| m.id != target.id);
                    self.removed.insert(target.id);
                }
                let nonce = payload.rotation_nonce.unwrap_or_default();
                self.rotate(nonce, op.body.epoch, &payload.key_envelopes);
            }
            OperationType::Destroy => {
                self.status = ChainStatus::Destroyed;
            }
        }

        self.epoch = op.body.epoch;
        self.head = block.hash;
        self.height += 1;
    }

    fn rotate(&mut self, nonce: [u8; 32], epoch: u32, envelopes: &BTreeMap<MemberId, Vec<u8>>) {
        self.key_schedule.rotation_nonce = nonce;
        self.key_schedule.rotation_epoch = epoch;
        self.key_schedule.envelopes = sealed_at(epoch, envelopes);
    }
}

fn sealed_at(
    epoch: u32,
    envelopes: &BTreeMap<MemberId, Vec<u8>>,
) -> BTreeMap<MemberId, MemberEnvelope> {
    envelopes
        .iter()
        .map(|(id, sealed)| {
            (
                *id,
                MemberEnvelope {
                    epoch,
                    sealed: sealed.clone(),
                },
            )
        })
        .collect()
}

/// Fold validated blocks, in ledger order, into their chain state.
///
/// Blocks must come from a [`Trustchain`](crate::Trustchain); reordered or
/// unvalidated input yields a meaningless state.
pub fn fold(blocks: &[Block]) -> ChainState {
    blocks.iter().fold(ChainState::default(), |mut state, block| {
        state.apply(block);
        state
    })
}
