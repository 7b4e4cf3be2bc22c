//! Admission rules for a candidate operation against the folded state of
//! every block before it.

use std::collections::BTreeSet;
use trustchain_crypto::chain_id_for_root;
use trustchain_types::{MemberId, Permissions};

use crate::error::LedgerError;
use crate::operation::{Operation, OperationPayload, OperationType};
use crate::state::{ChainState, ChainStatus};

/// Check that `op` may be appended to a chain whose prior blocks fold to `state`.
pub fn validate(state: &ChainState, op: &Operation) -> Result<(), LedgerError> {
    let body = &op.body;

    if state.status == ChainStatus::Destroyed {
        return Err(LedgerError::ChainDestroyed);
    }
    if let Some(chain_id) = state.chain_id {
        if chain_id != body.chain_id {
            return Err(LedgerError::MalformedOperation(format!(
                "operation targets chain {}, not {}",
                body.chain_id, chain_id
            )));
        }
    }
    if body.prev_hash != state.head {
        return Err(LedgerError::InvalidChainLink {
            expected: state.head,
            found: body.prev_hash,
        });
    }

    let genesis = state.status == ChainStatus::Uninitialized;
    match (body.op_type, genesis) {
        (OperationType::Create, false) => {
            return Err(LedgerError::MalformedOperation(
                "chain already has a genesis block".into(),
            ))
        }
        (op_type, true) if op_type != OperationType::Create => {
            return Err(LedgerError::MalformedOperation(
                "first block must be Create".into(),
            ))
        }
        _ => {}
    }

    let expected_epoch = match body.op_type {
        OperationType::Create => 0,
        OperationType::Destroy => state.epoch,
        OperationType::AddMember | OperationType::RemoveMember => {
            state.epoch.checked_add(1).ok_or_else(|| {
                LedgerError::MalformedOperation("epoch counter exhausted".into())
            })?
        }
    };
    if body.epoch != expected_epoch {
        return Err(LedgerError::MalformedOperation(format!(
            "expected epoch {}, found {}",
            expected_epoch, body.epoch
        )));
    }

    op.verify_signature()?;
    check_attestation(state, op)?;

    match body.op_type {
        OperationType::Create => validate_create(op),
        OperationType::AddMember => {
            require_manager(state, &body.issuer)?;
            validate_add(state, op)
        }
        OperationType::RemoveMember => {
            require_manager(state, &body.issuer)?;
            validate_remove(state, op)
        }
        OperationType::Destroy => {
            require_manager(state, &body.issuer)?;
            if body.payload != OperationPayload::default() {
                return Err(LedgerError::MalformedOperation(
                    "Destroy carries no payload".into(),
                ));
            }
            Ok(())
        }
    }
}

fn check_attestation(state: &ChainState, op: &Operation) -> Result<(), LedgerError> {
    let op_type = op.op_type();
    let Some(attestation) = &op.attestation else {
        if op_type.requires_attestation() {
            return Err(LedgerError::InvalidSignature(format!(
                "{:?} requires a device attestation",
                op_type
            )));
        }
        return Ok(());
    };

    op.verify_attestation()?;

    match op_type {
        OperationType::Create => {
            if chain_id_for_root(&attestation.device) != op.body.chain_id {
                return Err(LedgerError::InvalidSignature(
                    "attesting device does not own this chain id".into(),
                ));
            }
        }
        _ => {
            if state.root_device.as_ref() != Some(&attestation.device) {
                return Err(LedgerError::InvalidSignature(
                    "attestation is not from the genesis device".into(),
                ));
            }
        }
    }
    Ok(())
}

fn require_manager(state: &ChainState, issuer: &MemberId) -> Result<(), LedgerError> {
    match state.member(issuer) {
        Some(member) if member.can_manage_members() => Ok(()),
        _ => Err(LedgerError::PermissionDenied { issuer: *issuer }),
    }
}

fn validate_create(op: &Operation) -> Result<(), LedgerError> {
    let payload = &op.body.payload;
    let creator = payload
        .member
        .as_ref()
        .ok_or_else(|| LedgerError::MalformedOperation("Create without a creator".into()))?;
    if creator.id != op.body.issuer {
        return Err(LedgerError::MalformedOperation(
            "Create must be issued by the creator".into(),
        ));
    }
    if creator.permissions != Permissions::ALL {
        return Err(LedgerError::MalformedOperation(
            "creator must hold the full permission mask".into(),
        ));
    }
    if payload.ratchet_seed.is_none() || payload.rotation_nonce.is_none() {
        return Err(LedgerError::MalformedOperation(
            "Create must carry a ratchet seed and rotation nonce".into(),
        ));
    }
    expect_recipients(op, &BTreeSet::from([creator.id]))
}

fn validate_add(state: &ChainState, op: &Operation) -> Result<(), LedgerError> {
    let payload = &op.body.payload;
    let member = payload
        .member
        .as_ref()
        .ok_or_else(|| LedgerError::MalformedOperation("AddMember without a member".into()))?;
    if state.is_member(&member.id) {
        return Err(LedgerError::MemberAlreadyPresent(member.id));
    }
    if state.removed.contains(&member.id) {
        return Err(LedgerError::MemberPreviouslyRemoved(member.id));
    }
    if payload.ratchet_seed.is_some() {
        return Err(LedgerError::MalformedOperation(
            "ratchet seed may only be set at genesis".into(),
        ));
    }

    let recipients = if payload.rotation_nonce.is_some() {
        let mut all = state.member_ids();
        all.insert(member.id);
        all
    } else {
        BTreeSet::from([member.id])
    };
    expect_recipients(op, &recipients)
}

fn validate_remove(state: &ChainState, op: &Operation) -> Result<(), LedgerError> {
    let payload = &op.body.payload;
    let target = payload
        .member
        .as_ref()
        .ok_or_else(|| LedgerError::MalformedOperation("RemoveMember without a target".into()))?;
    if !state.is_member(&target.id) {
        return Err(LedgerError::MemberNotFound(target.id));
    }
    if state.members.len() == 1 {
        return Err(LedgerError::LastMemberRemoval(target.id));
    }
    if payload.rotation_nonce.is_none() {
        return Err(LedgerError::MalformedOperation(
            "RemoveMember must rotate the key".into(),
        ));
    }
    if payload.ratchet_seed.is_some() {
        return Err(LedgerError::MalformedOperation(
            "ratchet seed may only be set at genesis".into(),
        ));
    }

    let mut remaining = state.member_ids();
    remaining.remove(&target.id);
    expect_recipients(op, &remaining)
}

fn expect_recipients(op: &Operation, expected: &BTreeSet<MemberId>) -> Result<(), LedgerError> {
    let actual: BTreeSet<MemberId> = op.body.payload.key_envelopes.keys().copied().collect();
    if &actual != expected {
        return Err(LedgerError::MalformedOperation(format!(
            "key envelopes address {} members, expected {}",
            actual.len(),
            expected.len()
        )));
    }
    Ok(())
}
