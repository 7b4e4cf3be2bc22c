//! Signed ledger operations.
//!
//! An operation is signed in two layers. The [`OperationBody`] is what a
//! secure device attests to; the issuer then signs the body together with
//! that attestation, so the issuer signature covers every field before it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trustchain_crypto::{sign_message, verify_signature};
use trustchain_types::{
    BlockHash, ChainId, Member, MemberCredentials, MemberId, PublicKey, Signature,
};

use crate::error::LedgerError;

/// The kind of membership change an operation performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    /// Genesis: the issuer becomes the sole member at epoch 0.
    Create,
    AddMember,
    RemoveMember,
    /// Terminal: no block is accepted after it.
    Destroy,
}

impl OperationType {
    /// Create, AddMember and RemoveMember each open a new epoch.
    pub fn opens_epoch(&self) -> bool {
        !matches!(self, OperationType::Destroy)
    }

    /// Operations that must carry a device attestation.
    pub fn requires_attestation(&self) -> bool {
        matches!(self, OperationType::Create | OperationType::RemoveMember)
    }
}

/// Operation-specific data.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPayload {
    /// Create: the creator. AddMember: the new member. RemoveMember: the target.
    pub member: Option<Member>,
    /// Chain key sealed once per recipient.
    pub key_envelopes: BTreeMap<MemberId, Vec<u8>>,
    /// Per-chain ratchet seed, set once at genesis.
    pub ratchet_seed: Option<[u8; 32]>,
    /// Present whenever a new rotation is minted.
    pub rotation_nonce: Option<[u8; 32]>,
}

/// Everything an operation says, before any signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationBody {
    pub op_type: OperationType,
    pub chain_id: ChainId,
    pub epoch: u32,
    pub payload: OperationPayload,
    pub issuer: MemberId,
    pub prev_hash: BlockHash,
}

/// A secure device's signature over an operation body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub device: PublicKey,
    pub signature: Signature,
}

/// A fully signed operation, ready to be sealed into a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub body: OperationBody,
    pub attestation: Option<Attestation>,
    pub signature: Signature,
}

impl OperationBody {
    /// Bytes a secure device signs when attesting this body.
    pub fn attestation_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        Ok(bincode::serialize(self)?)
    }

    /// Sign the body (and its attestation, if any) with the issuer's key.
    ///
    /// Fails if `issuer` does not hold the key for `self.issuer`.
    pub fn sign(
        self,
        attestation: Option<Attestation>,
        issuer: &MemberCredentials,
    ) -> Result<Operation, LedgerError> {
        if issuer.id() != self.issuer {
            return Err(LedgerError::InvalidSignature(format!(
                "credentials for {} cannot sign as {}",
                issuer.id(),
                self.issuer
            )));
        }
        let message = signing_bytes(&self, attestation.as_ref())?;
        let signature = sign_message(&message, &issuer.private);
        Ok(Operation {
            body: self,
            attestation,
            signature,
        })
    }
}

impl Operation {
    pub fn op_type(&self) -> OperationType {
        self.body.op_type
    }

    pub fn issuer(&self) -> MemberId {
        self.body.issuer
    }

    pub fn prev_hash(&self) -> BlockHash {
        self.body.prev_hash
    }

    /// Check the issuer signature against the issuer's declared key.
    pub fn verify_signature(&self) -> Result<(), LedgerError> {
        let message = signing_bytes(&self.body, self.attestation.as_ref())?;
        if verify_signature(&message, &self.signature, &self.body.issuer.public_key()) {
            Ok(())
        } else {
            Err(LedgerError::InvalidSignature(format!(
                "issuer signature by {} does not verify",
                self.body.issuer
            )))
        }
    }

    /// Check the attestation, if present, against the attesting device key.
    pub fn verify_attestation(&self) -> Result<(), LedgerError> {
        let Some(attestation) = &self.attestation else {
            return Ok(());
        };
        let message = self.body.attestation_bytes()?;
        if verify_signature(&message, &attestation.signature, &attestation.device) {
            Ok(())
        } else {
            Err(LedgerError::InvalidSignature(
                "device attestation does not verify".into(),
            ))
        }
    }
}

fn signing_bytes(
    body: &OperationBody,
    attestation: Option<&Attestation>,
) -> Result<Vec<u8>, LedgerError> {
    Ok(bincode::serialize(&(body, attestation))?)
}
