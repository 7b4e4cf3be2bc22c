//! Minting, sealing, and opening chain keys; deriving epoch keys.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::collections::BTreeMap;
use trustchain_crypto::{open_envelope, seal_envelope};
use trustchain_ledger::{ChainState, KeySchedule};
use trustchain_types::{ChainId, MemberCredentials, MemberId};
use zeroize::Zeroizing;

use crate::error::RotationError;
use crate::secret::{ChainKey, EpochKey};

const CHAIN_KEY_INFO: &[u8] = b"trustchain/chain-key";
const RATCHET_INFO: &[u8] = b"trustchain/ratchet";
const EPOCH_KEY_INFO: &[u8] = b"trustchain/epoch-key";
const ENVELOPE_AAD: &[u8] = b"trustchain/envelope-aad";

/// A freshly minted rotation: the public nonce, one envelope per recipient,
/// and the chain key itself for the member that minted it.
#[derive(Debug)]
pub struct RotationMaterial {
    pub rotation_nonce: [u8; 32],
    pub envelopes: BTreeMap<MemberId, Vec<u8>>,
    pub chain_key: ChainKey,
}

/// Key material for a Create operation.
#[derive(Debug)]
pub struct GenesisMaterial {
    pub ratchet_seed: [u8; 32],
    pub rotation: RotationMaterial,
}

/// Public values every derivation in one rotation is bound to.
#[derive(Clone, Copy)]
struct Binding<'a> {
    chain_id: ChainId,
    seed: &'a [u8; 32],
    nonce: &'a [u8; 32],
}

impl<'a> Binding<'a> {
    fn of(chain_id: ChainId, schedule: &'a KeySchedule) -> Self {
        Self {
            chain_id,
            seed: &schedule.ratchet_seed,
            nonce: &schedule.rotation_nonce,
        }
    }

    /// HKDF-SHA256 salted with the ratchet seed, labelled and bound to the
    /// chain, rotation nonce, and epoch.
    fn expand(&self, label: &[u8], ikm: &[u8; 32], epoch: u32) -> [u8; 32] {
        let hk = Hkdf::<Sha256>::new(Some(self.seed), ikm);
        let mut info = Vec::with_capacity(label.len() + 68);
        info.extend_from_slice(label);
        info.extend_from_slice(self.chain_id.as_bytes());
        info.extend_from_slice(self.nonce);
        info.extend_from_slice(&epoch.to_be_bytes());

        let mut out = [0u8; 32];
        // 32 bytes is far below the HKDF-SHA256 output limit.
        hk.expand(&info, &mut out).expect("hkdf expand 32");
        out
    }

    fn ratchet(&self, from: &ChainKey, epoch: u32) -> Result<ChainKey, RotationError> {
        if epoch < from.epoch {
            return Err(RotationError::EpochUnavailable {
                requested: epoch,
                from: from.epoch,
                to: epoch,
            });
        }
        let mut key = Zeroizing::new(from.key);
        for current in from.epoch..epoch {
            let next = self.expand(RATCHET_INFO, &key, current + 1);
            *key = next;
        }
        Ok(ChainKey { epoch, key: *key })
    }

    fn epoch_key(&self, chain_key: &ChainKey) -> EpochKey {
        EpochKey {
            epoch: chain_key.epoch,
            key: self.expand(EPOCH_KEY_INFO, &chain_key.key, chain_key.epoch),
        }
    }

    fn aad(&self, recipient: &MemberId, epoch: u32) -> Vec<u8> {
        let mut aad = Vec::with_capacity(ENVELOPE_AAD.len() + 100);
        aad.extend_from_slice(ENVELOPE_AAD);
        aad.extend_from_slice(self.chain_id.as_bytes());
        aad.extend_from_slice(self.nonce);
        aad.extend_from_slice(recipient.as_bytes());
        aad.extend_from_slice(&epoch.to_be_bytes());
        aad
    }

    fn seal(&self, chain_key: &ChainKey, recipient: &MemberId) -> Result<Vec<u8>, RotationError> {
        let aad = self.aad(recipient, chain_key.epoch);
        Ok(seal_envelope(
            &chain_key.key,
            &recipient.public_key(),
            &aad,
        )?)
    }
}

impl ChainKey {
    /// Step this chain key forward to `epoch`. Stepping backwards fails.
    pub fn ratchet_to(
        &self,
        chain_id: ChainId,
        schedule: &KeySchedule,
        epoch: u32,
    ) -> Result<ChainKey, RotationError> {
        Binding::of(chain_id, schedule).ratchet(self, epoch)
    }

    /// The shared key for this chain key's epoch.
    pub fn epoch_key(&self, chain_id: ChainId, schedule: &KeySchedule) -> EpochKey {
        Binding::of(chain_id, schedule).epoch_key(self)
    }
}

/// Stateless rotation engine.
///
/// Everything public lives in the ledger's [`KeySchedule`]; the only private
/// input is the calling member's own credentials.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyRotationEngine;

impl KeyRotationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Ratchet seed plus the epoch-0 rotation, sealed to the creator.
    pub fn genesis(
        &self,
        chain_id: ChainId,
        creator: &MemberId,
    ) -> Result<GenesisMaterial, RotationError> {
        let ratchet_seed = random_bytes();
        let rotation = mint(chain_id, &ratchet_seed, 0, [creator])?;
        Ok(GenesisMaterial {
            ratchet_seed,
            rotation,
        })
    }

    /// Mint a rotation for the epoch after `state` and seal its chain key to
    /// each recipient.
    pub fn rotate<'a>(
        &self,
        state: &ChainState,
        recipients: impl IntoIterator<Item = &'a MemberId>,
    ) -> Result<RotationMaterial, RotationError> {
        let chain_id = state.chain_id.ok_or(RotationError::Uninitialized)?;
        let epoch = state
            .epoch
            .checked_add(1)
            .ok_or(RotationError::EpochExhausted)?;
        mint(chain_id, &state.key_schedule.ratchet_seed, epoch, recipients)
    }

    /// Seal the current rotation's chain key for a member joining in the
    /// epoch after `state`.
    ///
    /// The issuer opens its own envelope and ratchets forward to the join
    /// epoch before sealing, so the joiner cannot reach earlier epochs.
    pub fn wrap_for_joiner(
        &self,
        state: &ChainState,
        issuer: &MemberCredentials,
        new_member: &MemberId,
    ) -> Result<BTreeMap<MemberId, Vec<u8>>, RotationError> {
        let chain_id = state.chain_id.ok_or(RotationError::Uninitialized)?;
        let join_epoch = state
            .epoch
            .checked_add(1)
            .ok_or(RotationError::EpochExhausted)?;
        let binding = Binding::of(chain_id, &state.key_schedule);

        let own = self.open_chain_key(chain_id, &state.key_schedule, issuer)?;
        let joined = binding.ratchet(&own, join_epoch)?;
        let envelope = binding.seal(&joined, new_member)?;
        Ok(BTreeMap::from([(*new_member, envelope)]))
    }

    /// Open the caller's envelope for the current rotation.
    ///
    /// The result is the chain key at the epoch the envelope was sealed for.
    pub fn open_chain_key(
        &self,
        chain_id: ChainId,
        schedule: &KeySchedule,
        creds: &MemberCredentials,
    ) -> Result<ChainKey, RotationError> {
        let id = creds.id();
        let envelope = schedule
            .envelopes
            .get(&id)
            .ok_or(RotationError::NoEnvelope(id))?;
        let aad = Binding::of(chain_id, schedule).aad(&id, envelope.epoch);
        let plaintext = Zeroizing::new(open_envelope(&envelope.sealed, &creds.private, &aad)?);

        let mut chain_key = ChainKey {
            epoch: envelope.epoch,
            key: [0u8; 32],
        };
        if plaintext.len() != chain_key.key.len() {
            return Err(RotationError::InvalidSecret);
        }
        chain_key.key.copy_from_slice(&plaintext);
        Ok(chain_key)
    }

    /// Reproduce the shared key for `epoch` from the caller's own envelope.
    ///
    /// The window runs from the epoch the caller's envelope was sealed for up
    /// to the state's epoch. Older keys need the chain state folded up to
    /// that epoch, and only if the caller was a member then.
    pub fn derive_epoch_key(
        &self,
        state: &ChainState,
        epoch: u32,
        creds: &MemberCredentials,
    ) -> Result<EpochKey, RotationError> {
        let chain_id = state.chain_id.ok_or(RotationError::Uninitialized)?;
        let schedule = &state.key_schedule;
        let id = creds.id();
        let from = schedule
            .envelopes
            .get(&id)
            .ok_or(RotationError::NoEnvelope(id))?
            .epoch;
        if epoch < from || epoch > state.epoch {
            return Err(RotationError::EpochUnavailable {
                requested: epoch,
                from,
                to: state.epoch,
            });
        }

        let binding = Binding::of(chain_id, schedule);
        let own = self.open_chain_key(chain_id, schedule, creds)?;
        Ok(binding.epoch_key(&binding.ratchet(&own, epoch)?))
    }

    /// Key for the state's current epoch.
    pub fn current_key(
        &self,
        state: &ChainState,
        creds: &MemberCredentials,
    ) -> Result<EpochKey, RotationError> {
        self.derive_epoch_key(state, state.epoch, creds)
    }
}

fn mint<'a>(
    chain_id: ChainId,
    ratchet_seed: &[u8; 32],
    epoch: u32,
    recipients: impl IntoIterator<Item = &'a MemberId>,
) -> Result<RotationMaterial, RotationError> {
    let rotation_nonce = random_bytes();
    let binding = Binding {
        chain_id,
        seed: ratchet_seed,
        nonce: &rotation_nonce,
    };
    let secret = Zeroizing::new(random_bytes());
    let chain_key = ChainKey {
        epoch,
        key: binding.expand(CHAIN_KEY_INFO, &secret, epoch),
    };

    let mut envelopes = BTreeMap::new();
    for recipient in recipients {
        envelopes.insert(*recipient, binding.seal(&chain_key, recipient)?);
    }
    tracing::debug!(
        chain = %chain_id,
        epoch,
        recipients = envelopes.len(),
        "minted rotation"
    );

    Ok(RotationMaterial {
        rotation_nonce,
        envelopes,
        chain_key,
    })
}

fn random_bytes() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes
}
