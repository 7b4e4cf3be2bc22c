//! The trustchain client: orchestrates ledger, rotation engine, and remote store.
//!
//! Every mutation follows the same path. Fetch and verify the remote head,
//! check that it extends the caller's reference chain, build the operation
//! atop that head, validate it locally by appending to it, then publish it to
//! the remote store under compare-and-swap. A block that loses the race
//! between fetch and append is dropped; calling again rebuilds on the new
//! head.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use trustchain_crypto::{chain_id_for_root, generate_credentials};
use trustchain_ledger::{
    Attestation, Block, ChainState, MemberStatus, OperationBody, Trustchain,
};
use trustchain_rotation::{EpochKey, KeyRotationEngine};
use trustchain_store::{AppendOutcome, CredentialStore, RemoteLedgerStore, SecureTransport};
use trustchain_types::{
    BlockHash, ChainId, Member, MemberCredentials, MemberId, Permissions, PublicKey,
};

use crate::config::ClientConfig;
use crate::error::TrustchainError;

/// A verified chain together with its folded state and, when the viewing
/// member is current, the shared key for the current epoch.
#[derive(Clone, Debug)]
pub struct TrustchainView {
    pub chain: Trustchain,
    pub state: ChainState,
    pub encryption_key: Option<EpochKey>,
}

impl TrustchainView {
    pub fn chain_id(&self) -> ChainId {
        self.chain.chain_id()
    }

    pub fn epoch(&self) -> u32 {
        self.state.epoch
    }

    pub fn members(&self) -> &[Member] {
        &self.state.members
    }

    pub fn is_member(&self, id: &MemberId) -> bool {
        self.state.is_member(id)
    }

    pub fn head(&self) -> BlockHash {
        self.chain.head()
    }
}

/// Result of [`TrustchainClient::get_or_create_trustchain`].
#[derive(Clone, Debug)]
pub struct OpenedTrustchain {
    pub view: TrustchainView,
    /// `true` if this call published the genesis block.
    pub created: bool,
}

pub struct TrustchainClient {
    store: Arc<dyn RemoteLedgerStore>,
    credentials: Arc<dyn CredentialStore>,
    engine: KeyRotationEngine,
    config: ClientConfig,
    member_name: String,
}

impl TrustchainClient {
    /// `member_name` labels this device when it creates a chain.
    pub fn new(
        store: Arc<dyn RemoteLedgerStore>,
        credentials: Arc<dyn CredentialStore>,
        config: ClientConfig,
        member_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            credentials,
            engine: KeyRotationEngine::new(),
            config,
            member_name: member_name.into(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// A member entry for `id` carrying the configured default permissions.
    pub fn new_member(&self, id: MemberId, name: impl Into<String>) -> Member {
        Member::new(id, name, self.config.member_permissions())
    }

    /// Load this device's credentials, generating and saving them on first use.
    pub fn init_member_credentials(&self) -> Result<MemberCredentials, TrustchainError> {
        let stored = self
            .credentials
            .load()
            .map_err(|e| TrustchainError::Credentials(e.to_string()))?;
        if let Some(creds) = stored {
            debug!(member = %creds.id(), "loaded member credentials");
            return Ok(creds);
        }

        let creds = generate_credentials();
        self.credentials
            .save(&creds)
            .map_err(|e| TrustchainError::Credentials(e.to_string()))?;
        info!(member = %creds.id(), "generated member credentials");
        Ok(creds)
    }

    /// Fetch the chain anchored at `transport`'s device, creating it if absent.
    ///
    /// Losing a concurrent genesis race is not an error: the winning chain
    /// is fetched and returned with `created == false`.
    pub async fn get_or_create_trustchain(
        &self,
        transport: &dyn SecureTransport,
        creds: &MemberCredentials,
    ) -> Result<OpenedTrustchain, TrustchainError> {
        let root = self
            .bounded(
                self.config.request_timeout(),
                "root key request",
                transport.root_public_key(),
            )
            .await?;
        let chain_id = chain_id_for_root(&root);

        if let Some(chain) = self.fetch_verified(chain_id).await? {
            debug!(chain = %chain_id, blocks = chain.len(), "adopting existing trustchain");
            return Ok(OpenedTrustchain {
                view: self.adopted_view(chain, creds)?,
                created: false,
            });
        }

        let creator = Member::new(creds.id(), self.member_name.clone(), Permissions::ALL);
        let genesis = self.engine.genesis(chain_id, &creator.id)?;
        let body = OperationBody::create(
            chain_id,
            creator,
            genesis.ratchet_seed,
            genesis.rotation.rotation_nonce,
            genesis.rotation.envelopes,
        );
        let attestation = self.attest(transport, &body, root).await?;
        let op = body.sign(Some(attestation), creds)?;
        let (block, chain) = Trustchain::empty(chain_id).append(op)?;

        let outcome = self
            .bounded(
                self.config.request_timeout(),
                "genesis append",
                self.store.append(&chain_id, &block, BlockHash::ZERO),
            )
            .await?;

        match outcome {
            AppendOutcome::Accepted(_) => {
                info!(chain = %chain_id, creator = %creds.id(), "created trustchain");
                Ok(OpenedTrustchain {
                    view: self.view_for(chain, creds)?,
                    created: true,
                })
            }
            AppendOutcome::Conflict(current) => {
                warn!(chain = %chain_id, head = %current, "lost genesis race, adopting winner");
                let chain = self
                    .fetch_verified(chain_id)
                    .await?
                    .ok_or(TrustchainError::RemoteConflict {
                        expected: BlockHash::ZERO,
                        current,
                    })?;
                Ok(OpenedTrustchain {
                    view: self.adopted_view(chain, creds)?,
                    created: false,
                })
            }
        }
    }

    /// Add `new_member`, sealing the current chain key to it (or rotating
    /// for everyone when `rotate_on_add` is set).
    ///
    /// `chain` may be any earlier verified copy; the block is built on the
    /// latest remote head.
    pub async fn add_member(
        &self,
        chain: &Trustchain,
        issuer: &MemberCredentials,
        new_member: Member,
    ) -> Result<TrustchainView, TrustchainError> {
        let base = self.latest(chain).await?;
        let state = base.state();
        let chain_id = base.chain_id();
        require_manager(&state, issuer)?;
        if state.is_member(&new_member.id) {
            return Err(TrustchainError::MemberAlreadyPresent(new_member.id));
        }
        if state.removed.contains(&new_member.id) {
            return Err(TrustchainError::MemberPreviouslyRemoved(new_member.id));
        }

        let (envelopes, rotation_nonce) = if self.config.rotate_on_add {
            let mut recipients = state.member_ids();
            recipients.insert(new_member.id);
            let rotation = self.engine.rotate(&state, recipients.iter())?;
            (rotation.envelopes, Some(rotation.rotation_nonce))
        } else {
            (
                self.engine.wrap_for_joiner(&state, issuer, &new_member.id)?,
                None,
            )
        };

        let member_id = new_member.id;
        let body =
            OperationBody::add_member(&state, issuer.id(), new_member, envelopes, rotation_nonce)?;
        let op = body.sign(None, issuer)?;
        let (block, next) = base.append(op)?;
        self.publish(&base, &block).await?;

        info!(
            chain = %chain_id,
            member = %member_id,
            epoch = block.epoch(),
            rotated = rotation_nonce.is_some(),
            "added member"
        );
        self.view_for(next, issuer)
    }

    /// Remove `target` after the device reconfirms, rotating the key for
    /// every remaining member. Built on the latest remote head.
    pub async fn remove_member(
        &self,
        transport: &dyn SecureTransport,
        chain: &Trustchain,
        issuer: &MemberCredentials,
        target: &MemberId,
    ) -> Result<TrustchainView, TrustchainError> {
        let base = self.latest(chain).await?;
        let state = base.state();
        let chain_id = base.chain_id();
        require_manager(&state, issuer)?;
        let target_member = state
            .member(target)
            .cloned()
            .ok_or(TrustchainError::MemberNotFound(*target))?;
        if state.members.len() == 1 {
            return Err(TrustchainError::LastMemberRemoval(*target));
        }

        let mut remaining = state.member_ids();
        remaining.remove(target);
        let rotation = self.engine.rotate(&state, remaining.iter())?;
        let body = OperationBody::remove_member(
            &state,
            issuer.id(),
            target_member,
            rotation.rotation_nonce,
            rotation.envelopes,
        )?;

        let root = self
            .bounded(
                self.config.request_timeout(),
                "root key request",
                transport.root_public_key(),
            )
            .await?;
        let attestation = self.attest(transport, &body, root).await?;
        let op = body.sign(Some(attestation), issuer)?;
        let (block, next) = base.append(op)?;
        self.publish(&base, &block).await?;

        info!(
            chain = %chain_id,
            member = %target,
            epoch = block.epoch(),
            remaining = remaining.len(),
            "removed member and rotated key"
        );
        self.view_for(next, issuer)
    }

    /// Fetch the latest chain, verify it, and re-derive this member's key.
    ///
    /// Fails with [`TrustchainError::TrustchainEjected`] whenever `creds` is
    /// not a current member, even if the chain was later destroyed.
    pub async fn restore_trustchain(
        &self,
        chain: &Trustchain,
        creds: &MemberCredentials,
    ) -> Result<TrustchainView, TrustchainError> {
        let chain_id = chain.chain_id();
        let latest = self.latest(chain).await?;

        let state = latest.state();
        let id = creds.id();
        match state.member_status(&id) {
            MemberStatus::Ejected | MemberStatus::NeverMember => {
                warn!(chain = %chain_id, member = %id, "member is not on the trustchain");
                Err(TrustchainError::TrustchainEjected(id))
            }
            MemberStatus::ChainDestroyed => Err(TrustchainError::ChainDestroyed),
            MemberStatus::Current => {
                let key = self.engine.current_key(&state, creds)?;
                debug!(chain = %chain_id, member = %id, epoch = state.epoch, "restored trustchain");
                Ok(TrustchainView {
                    chain: latest,
                    state,
                    encryption_key: Some(key),
                })
            }
        }
    }

    /// Append the terminal Destroy block on top of the latest remote head.
    pub async fn destroy_trustchain(
        &self,
        chain: &Trustchain,
        issuer: &MemberCredentials,
    ) -> Result<TrustchainView, TrustchainError> {
        let base = self.latest(chain).await?;
        let state = base.state();
        require_manager(&state, issuer)?;

        let body = OperationBody::destroy(&state, issuer.id())?;
        let op = body.sign(None, issuer)?;
        let (block, next) = base.append(op)?;
        self.publish(&base, &block).await?;

        info!(chain = %base.chain_id(), epoch = block.epoch(), "destroyed trustchain");
        self.view_for(next, issuer)
    }

    /// Fetch and verify a chain without any membership check.
    pub async fn fetch_trustchain(&self, chain_id: ChainId) -> Result<Trustchain, TrustchainError> {
        self.fetch_verified(chain_id)
            .await?
            .ok_or(TrustchainError::ChainNotFound(chain_id))
    }

    async fn fetch_verified(&self, chain_id: ChainId) -> Result<Option<Trustchain>, TrustchainError> {
        let blocks = self
            .bounded(
                self.config.request_timeout(),
                "chain fetch",
                self.store.get_head(&chain_id),
            )
            .await?;
        match blocks {
            Some(blocks) => Ok(Some(Trustchain::verify(chain_id, blocks)?)),
            None => Ok(None),
        }
    }

    /// Verified remote head of `chain`, which must extend `chain` itself.
    async fn latest(&self, chain: &Trustchain) -> Result<Trustchain, TrustchainError> {
        let chain_id = chain.chain_id();
        let latest = self
            .fetch_verified(chain_id)
            .await?
            .ok_or(TrustchainError::ChainNotFound(chain_id))?;
        check_extends(chain, &latest)?;
        if latest.len() > chain.len() {
            debug!(
                chain = %chain_id,
                behind = latest.len() - chain.len(),
                "reference chain is behind the remote head"
            );
        }
        Ok(latest)
    }

    async fn publish(&self, base: &Trustchain, block: &Block) -> Result<(), TrustchainError> {
        let chain_id = base.chain_id();
        let expected = base.head();
        let outcome = self
            .bounded(
                self.config.request_timeout(),
                "block append",
                self.store.append(&chain_id, block, expected),
            )
            .await?;
        match outcome {
            AppendOutcome::Accepted(_) => Ok(()),
            AppendOutcome::Conflict(current) => {
                warn!(
                    chain = %chain_id,
                    expected = %expected,
                    current = %current,
                    "append lost the race, discarding block"
                );
                Err(TrustchainError::RemoteConflict { expected, current })
            }
        }
    }

    async fn attest(
        &self,
        transport: &dyn SecureTransport,
        body: &OperationBody,
        device: PublicKey,
    ) -> Result<Attestation, TrustchainError> {
        let payload = body.attestation_bytes()?;
        let signature = self
            .bounded(
                self.config.attestation_timeout(),
                "device attestation",
                transport.request_attestation(&payload),
            )
            .await?;
        Ok(Attestation { device, signature })
    }

    async fn bounded<T, E>(
        &self,
        limit: Duration,
        operation: &'static str,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, TrustchainError>
    where
        TrustchainError: From<E>,
    {
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!(operation, after_ms = limit.as_millis() as u64, "timed out");
                Err(TrustchainError::Timeout {
                    operation,
                    after_ms: limit.as_millis() as u64,
                })
            }
        }
    }

    /// View of a chain someone else created; ejected members are refused.
    fn adopted_view(
        &self,
        chain: Trustchain,
        creds: &MemberCredentials,
    ) -> Result<TrustchainView, TrustchainError> {
        let id = creds.id();
        if chain.state().member_status(&id) == MemberStatus::Ejected {
            warn!(chain = %chain.chain_id(), member = %id, "ejected member tried to open trustchain");
            return Err(TrustchainError::TrustchainEjected(id));
        }
        self.view_for(chain, creds)
    }

    fn view_for(
        &self,
        chain: Trustchain,
        creds: &MemberCredentials,
    ) -> Result<TrustchainView, TrustchainError> {
        let state = chain.state();
        let encryption_key = match state.member_status(&creds.id()) {
            MemberStatus::Current => Some(self.engine.current_key(&state, creds)?),
            _ => None,
        };
        Ok(TrustchainView {
            chain,
            state,
            encryption_key,
        })
    }
}

fn require_manager(state: &ChainState, issuer: &MemberCredentials) -> Result<(), TrustchainError> {
    if state.is_destroyed() {
        return Err(TrustchainError::ChainDestroyed);
    }
    match state.member(&issuer.id()) {
        Some(member) if member.can_manage_members() => Ok(()),
        _ => Err(TrustchainError::PermissionDenied {
            issuer: issuer.id(),
        }),
    }
}

/// The fetched chain must extend the caller's reference chain; anything else
/// is a fork.
fn check_extends(reference: &Trustchain, latest: &Trustchain) -> Result<(), TrustchainError> {
    if latest.blocks().starts_with(reference.blocks()) {
        return Ok(());
    }
    let found = reference
        .len()
        .checked_sub(1)
        .and_then(|i| latest.blocks().get(i))
        .map(|b| b.hash)
        .unwrap_or(BlockHash::ZERO);
    Err(TrustchainError::InvalidChainLink {
        expected: reference.head(),
        found,
    })
}
