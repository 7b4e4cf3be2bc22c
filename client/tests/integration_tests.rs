//! End-to-end client flows against the in-memory store and software device:
//! chain creation → membership changes → key rotation → restore → destroy.

use std::sync::Arc;

use trustchain_client::{
    ClientConfig, FileCredentialStore, KdfParams, Member, MemberCredentials, MemberId,
    Permissions, TrustchainClient, TrustchainError, TrustchainView,
};
use trustchain_crypto::credentials_from_seed;
use trustchain_nullables::{NullCredentialStore, NullLedgerStore, NullTransport, TransportMode};
use trustchain_rotation::{KeyRotationEngine, RotationError};
use trustchain_store::CredentialStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn creds(seed: u8) -> MemberCredentials {
    credentials_from_seed(&[seed; 32])
}

fn device() -> NullTransport {
    NullTransport::from_seed(&[0xD0; 32])
}

fn client_with(store: &Arc<NullLedgerStore>, config: ClientConfig, name: &str) -> TrustchainClient {
    TrustchainClient::new(
        store.clone(),
        Arc::new(NullCredentialStore::new()),
        config,
        name,
    )
}

fn client(store: &Arc<NullLedgerStore>, name: &str) -> TrustchainClient {
    client_with(store, ClientConfig::default(), name)
}

fn admin(c: &MemberCredentials, name: &str) -> Member {
    Member::new(c.id(), name, Permissions::ALL)
}

fn ids(view: &TrustchainView) -> Vec<MemberId> {
    view.members().iter().map(|m| m.id).collect()
}

async fn created(
    c: &TrustchainClient,
    device: &NullTransport,
    creator: &MemberCredentials,
) -> TrustchainView {
    let opened = c.get_or_create_trustchain(device, creator).await.unwrap();
    assert!(opened.created);
    opened.view
}

// ---------------------------------------------------------------------------
// 1. Ejection lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ejection_scenario() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2) = (creds(1), creds(2));
    let c1 = client(&store, "m1");
    let c2 = client(&store, "m2");

    let v0 = created(&c1, &device, &m1).await;
    assert_eq!(v0.epoch(), 0);
    assert_eq!(ids(&v0), vec![m1.id()]);
    assert!(v0.encryption_key.is_some());

    let v1 = c1.add_member(&v0.chain, &m1, admin(&m2, "m2")).await.unwrap();
    assert_eq!(v1.epoch(), 1);
    assert_eq!(ids(&v1), vec![m1.id(), m2.id()]);
    assert_eq!(v1.members()[1].permissions, Permissions(0xffff_ffff));

    // M2 joins by restoring and sees the same key as M1.
    let joined = c2.restore_trustchain(&v0.chain, &m2).await.unwrap();
    assert_eq!(joined.head(), v1.head());
    assert_eq!(joined.encryption_key, v1.encryption_key);

    let v2 = c1
        .remove_member(&device, &v1.chain, &m1, &m2.id())
        .await
        .unwrap();
    assert_eq!(v2.epoch(), 2);
    assert_eq!(ids(&v2), vec![m1.id()]);
    assert_ne!(v2.encryption_key, v1.encryption_key);

    for reference in [&v0.chain, &v1.chain, &v2.chain] {
        let err = c2.restore_trustchain(reference, &m2).await.unwrap_err();
        assert!(matches!(err, TrustchainError::TrustchainEjected(id) if id == m2.id()));
        assert!(err.is_terminal());
    }

    let v3 = c1.destroy_trustchain(&v2.chain, &m1).await.unwrap();
    assert!(v3.state.is_destroyed());
    assert_eq!(v3.epoch(), 2);
    assert!(v3.encryption_key.is_none());

    let m3 = creds(3);
    assert!(matches!(
        c1.add_member(&v3.chain, &m1, admin(&m3, "m3")).await,
        Err(TrustchainError::ChainDestroyed)
    ));
    assert!(matches!(
        c1.destroy_trustchain(&v3.chain, &m1).await,
        Err(TrustchainError::ChainDestroyed)
    ));
    assert!(matches!(
        c1.remove_member(&device, &v3.chain, &m1, &m1.id()).await,
        Err(TrustchainError::ChainDestroyed)
    ));
    assert!(matches!(
        c1.restore_trustchain(&v0.chain, &m1).await,
        Err(TrustchainError::ChainDestroyed)
    ));
    // Ejection wins over destruction for a removed member.
    assert!(matches!(
        c2.restore_trustchain(&v3.chain, &m2).await,
        Err(TrustchainError::TrustchainEjected(_))
    ));

    assert_eq!(store.blocks(&v0.chain_id()).len(), 4);
}

#[tokio::test]
async fn genesis_reference_serves_every_mutation() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2) = (creds(1), creds(2));
    let c1 = client(&store, "m1");
    let c2 = client(&store, "m2");

    // Callers keep the reference they got at creation and pass it everywhere.
    let trustchain = created(&c1, &device, &m1).await.chain;

    let added = c1
        .add_member(&trustchain, &m1, admin(&m2, "m2"))
        .await
        .unwrap();
    assert!(added.is_member(&m2.id()));

    let removed = c1
        .remove_member(&device, &trustchain, &m1, &m2.id())
        .await
        .unwrap();
    assert_eq!(removed.epoch(), 2);
    assert!(!removed.is_member(&m2.id()));

    assert!(matches!(
        c2.restore_trustchain(&trustchain, &m2).await,
        Err(TrustchainError::TrustchainEjected(id)) if id == m2.id()
    ));

    let destroyed = c1.destroy_trustchain(&trustchain, &m1).await.unwrap();
    assert!(destroyed.state.is_destroyed());
    assert_eq!(store.blocks(&trustchain.chain_id()).len(), 4);
    assert_eq!(store.conflict_count(), 0);
}

// ---------------------------------------------------------------------------
// 2. Forward secrecy after removal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn removed_member_cannot_derive_later_keys() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2) = (creds(1), creds(2));
    let c1 = client(&store, "m1");

    let v0 = created(&c1, &device, &m1).await;
    let v1 = c1.add_member(&v0.chain, &m1, admin(&m2, "m2")).await.unwrap();
    let v2 = c1
        .remove_member(&device, &v1.chain, &m1, &m2.id())
        .await
        .unwrap();
    let epoch2_key = v2.encryption_key.clone().unwrap();

    let engine = KeyRotationEngine::new();
    let chain_id = v1.chain_id();

    // Everything M2 held at epoch 1: its own envelope and the public ledger.
    let m2_chain_key = engine
        .open_chain_key(chain_id, &v1.state.key_schedule, &m2)
        .unwrap();
    let m2_epoch1 = engine.current_key(&v1.state, &m2).unwrap();
    assert_eq!(Some(m2_epoch1), v1.encryption_key);

    let guess = m2_chain_key
        .ratchet_to(chain_id, &v2.state.key_schedule, 2)
        .unwrap()
        .epoch_key(chain_id, &v2.state.key_schedule);
    assert_ne!(guess, epoch2_key);

    assert!(matches!(
        engine.current_key(&v2.state, &m2),
        Err(RotationError::NoEnvelope(id)) if id == m2.id()
    ));
    assert!(!v2.state.key_schedule.envelopes.contains_key(&m2.id()));
}

#[tokio::test]
async fn joiner_cannot_derive_keys_from_before_joining() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2) = (creds(1), creds(2));
    let c1 = client(&store, "m1");

    let v0 = created(&c1, &device, &m1).await;
    let v1 = c1.add_member(&v0.chain, &m1, admin(&m2, "m2")).await.unwrap();
    let engine = KeyRotationEngine::new();

    assert_eq!(
        Some(engine.derive_epoch_key(&v1.state, 0, &m1).unwrap()),
        v0.encryption_key
    );
    assert!(matches!(
        engine.derive_epoch_key(&v1.state, 0, &m2),
        Err(RotationError::EpochUnavailable { requested: 0, from: 1, to: 1 })
    ));

    let m2_chain_key = engine
        .open_chain_key(v1.chain_id(), &v1.state.key_schedule, &m2)
        .unwrap();
    assert_eq!(m2_chain_key.epoch(), 1);
    assert!(m2_chain_key
        .ratchet_to(v1.chain_id(), &v1.state.key_schedule, 0)
        .is_err());
    assert_eq!(
        Some(engine.current_key(&v1.state, &m2).unwrap()),
        v1.encryption_key
    );
}

#[tokio::test]
async fn add_keeps_the_rotation_unless_configured_to_rotate() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2) = (creds(1), creds(2));

    let c1 = client(&store, "m1");
    let v0 = created(&c1, &device, &m1).await;
    let v1 = c1.add_member(&v0.chain, &m1, admin(&m2, "m2")).await.unwrap();
    assert_eq!(v1.state.key_schedule.rotation_epoch, 0);
    assert_eq!(
        v1.state.key_schedule.rotation_nonce,
        v0.state.key_schedule.rotation_nonce
    );
    assert_eq!(v1.state.key_schedule.envelopes[&m1.id()].epoch, 0);
    assert_eq!(v1.state.key_schedule.envelopes[&m2.id()].epoch, 1);

    let rotating = ClientConfig {
        rotate_on_add: true,
        ..Default::default()
    };
    let other_store = Arc::new(NullLedgerStore::new());
    let c1 = client_with(&other_store, rotating, "m1");
    let v0 = created(&c1, &device, &m1).await;
    let v1 = c1.add_member(&v0.chain, &m1, admin(&m2, "m2")).await.unwrap();
    assert_eq!(v1.state.key_schedule.rotation_epoch, 1);
    assert_eq!(v1.state.key_schedule.envelopes.len(), 2);

    let c2 = client(&other_store, "m2");
    let joined = c2.restore_trustchain(&v1.chain, &m2).await.unwrap();
    assert_eq!(joined.encryption_key, v1.encryption_key);
}

// ---------------------------------------------------------------------------
// 3. Optimistic concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_appends_resolve_by_compare_and_swap() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2, m3, m4) = (creds(1), creds(2), creds(3), creds(4));
    let c1 = client(&store, "m1");
    let c2 = client(&store, "m2");

    let v0 = created(&c1, &device, &m1).await;
    let v1 = c1.add_member(&v0.chain, &m1, admin(&m2, "m2")).await.unwrap();

    let (a, b) = tokio::join!(
        c1.add_member(&v1.chain, &m1, admin(&m3, "m3")),
        c2.add_member(&v1.chain, &m2, admin(&m4, "m4")),
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);

    let (loser, loser_creds, loser_target) = match (&a, &b) {
        (Ok(_), Err(e)) => {
            assert!(e.is_retryable());
            (&c2, &m2, &m4)
        }
        (Err(e), Ok(_)) => {
            assert!(e.is_retryable());
            (&c1, &m1, &m3)
        }
        _ => unreachable!(),
    };
    let conflict = a.as_ref().err().or(b.as_ref().err()).unwrap();
    assert!(matches!(
        conflict,
        TrustchainError::RemoteConflict { expected, .. } if *expected == v1.head()
    ));
    assert_eq!(store.blocks(&v1.chain_id()).len(), 3);

    // Calling again with the same reference rebuilds on the winner's block.
    let v3 = loser
        .add_member(&v1.chain, loser_creds, admin(loser_target, "late"))
        .await
        .unwrap();
    assert_eq!(v3.epoch(), 3);
    let mut members = ids(&v3);
    members.sort();
    let mut expected = vec![m1.id(), m2.id(), m3.id(), m4.id()];
    expected.sort();
    assert_eq!(members, expected);
}

#[tokio::test]
async fn duplicate_add_after_rebuild_is_rejected() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2, m5) = (creds(1), creds(2), creds(5));
    let c1 = client(&store, "m1");
    let c2 = client(&store, "m2");

    let v0 = created(&c1, &device, &m1).await;
    let v1 = c1.add_member(&v0.chain, &m1, admin(&m2, "m2")).await.unwrap();

    let (a, b) = tokio::join!(
        c1.add_member(&v1.chain, &m1, admin(&m5, "m5")),
        c2.add_member(&v1.chain, &m2, admin(&m5, "m5")),
    );
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    assert_eq!(store.conflict_count(), 1);

    let (loser, loser_creds) = if a.is_ok() { (&c2, &m2) } else { (&c1, &m1) };
    assert!(matches!(
        loser
            .add_member(&v1.chain, loser_creds, admin(&m5, "m5"))
            .await,
        Err(TrustchainError::MemberAlreadyPresent(id)) if id == m5.id()
    ));
    let latest = loser.restore_trustchain(&v1.chain, loser_creds).await.unwrap();
    assert_eq!(
        latest.members().iter().filter(|m| m.id == m5.id()).count(),
        1
    );
}

#[tokio::test]
async fn concurrent_genesis_adopts_the_winner() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2) = (creds(1), creds(2));
    let c1 = client(&store, "m1");
    let c2 = client(&store, "m2");

    let (a, b) = tokio::join!(
        c1.get_or_create_trustchain(&device, &m1),
        c2.get_or_create_trustchain(&device, &m2),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.created ^ b.created);
    assert_eq!(a.view.head(), b.view.head());
    assert_eq!(a.view.chain_id(), b.view.chain_id());

    let (winner, loser, loser_id) = if a.created { (a, b, m2.id()) } else { (b, a, m1.id()) };
    assert!(winner.view.encryption_key.is_some());
    assert!(loser.view.encryption_key.is_none());
    assert!(!loser.view.is_member(&loser_id));
    assert_eq!(store.blocks(&winner.view.chain_id()).len(), 1);
}

#[tokio::test]
async fn stale_reference_builds_on_the_latest_head() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2, m3) = (creds(1), creds(2), creds(3));
    let c1 = client(&store, "m1");

    let v0 = created(&c1, &device, &m1).await;
    let v1 = c1.add_member(&v0.chain, &m1, admin(&m2, "m2")).await.unwrap();

    let v2 = c1
        .add_member(&v0.chain, &m1, admin(&m3, "m3"))
        .await
        .unwrap();
    assert_eq!(v2.epoch(), 2);
    assert_eq!(v2.chain.blocks()[1], v1.chain.blocks()[1]);
    assert_eq!(ids(&v2), vec![m1.id(), m2.id(), m3.id()]);
    assert_eq!(store.blocks(&v0.chain_id()).len(), 3);
    assert_eq!(store.conflict_count(), 0);
}

#[tokio::test]
async fn forked_reference_is_rejected() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2) = (creds(1), creds(2));
    let c1 = client(&store, "m1");
    let v0 = created(&c1, &device, &m1).await;

    // Same device, so same chain id, but an independently minted genesis.
    let elsewhere = Arc::new(NullLedgerStore::new());
    let fork = created(&client(&elsewhere, "m1"), &device, &m1).await;
    assert_eq!(fork.chain_id(), v0.chain_id());
    assert_ne!(fork.head(), v0.head());

    assert!(matches!(
        c1.add_member(&fork.chain, &m1, admin(&m2, "m2")).await,
        Err(TrustchainError::InvalidChainLink { expected, .. }) if expected == fork.head()
    ));
    assert_eq!(store.blocks(&v0.chain_id()).len(), 1);
}

// ---------------------------------------------------------------------------
// 4. Membership boundaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn membership_boundaries() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2, m3) = (creds(1), creds(2), creds(3));
    let c1 = client(&store, "m1");
    let c2 = client(&store, "m2");

    let v0 = created(&c1, &device, &m1).await;
    assert!(matches!(
        c1.remove_member(&device, &v0.chain, &m1, &m1.id()).await,
        Err(TrustchainError::LastMemberRemoval(id)) if id == m1.id()
    ));
    assert!(matches!(
        c1.add_member(&v0.chain, &m1, admin(&m1, "again")).await,
        Err(TrustchainError::MemberAlreadyPresent(id)) if id == m1.id()
    ));
    assert!(matches!(
        c1.remove_member(&device, &v0.chain, &m1, &m3.id()).await,
        Err(TrustchainError::MemberNotFound(id)) if id == m3.id()
    ));

    // A member without the management bit cannot change membership.
    let viewer = Member::new(m2.id(), "viewer", Permissions::NONE);
    let v1 = c1.add_member(&v0.chain, &m1, viewer).await.unwrap();
    assert!(v1.encryption_key.is_some());
    assert!(matches!(
        c2.add_member(&v1.chain, &m2, admin(&m3, "m3")).await,
        Err(TrustchainError::PermissionDenied { issuer }) if issuer == m2.id()
    ));
    assert!(matches!(
        c2.destroy_trustchain(&v1.chain, &m2).await,
        Err(TrustchainError::PermissionDenied { .. })
    ));

    // Removed members stay out.
    let v2 = c1
        .remove_member(&device, &v1.chain, &m1, &m2.id())
        .await
        .unwrap();
    assert!(matches!(
        c1.add_member(&v2.chain, &m1, admin(&m2, "back")).await,
        Err(TrustchainError::MemberPreviouslyRemoved(id)) if id == m2.id()
    ));
    assert_eq!(store.blocks(&v0.chain_id()).len(), 3);
}

#[tokio::test]
async fn self_removal_drops_the_issuers_key() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2) = (creds(1), creds(2));
    let c1 = client(&store, "m1");
    let c2 = client(&store, "m2");

    let v0 = created(&c1, &device, &m1).await;
    let v1 = c1.add_member(&v0.chain, &m1, admin(&m2, "m2")).await.unwrap();
    let v2 = c1
        .remove_member(&device, &v1.chain, &m1, &m1.id())
        .await
        .unwrap();
    assert!(v2.encryption_key.is_none());
    assert_eq!(ids(&v2), vec![m2.id()]);

    assert!(matches!(
        c1.restore_trustchain(&v2.chain, &m1).await,
        Err(TrustchainError::TrustchainEjected(_))
    ));
    let survivor = c2.restore_trustchain(&v2.chain, &m2).await.unwrap();
    assert_eq!(survivor.epoch(), 2);
    assert!(survivor.encryption_key.is_some());
}

#[tokio::test]
async fn reopening_adopts_the_existing_chain() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let m1 = creds(1);
    let c1 = client(&store, "m1");

    let v0 = created(&c1, &device, &m1).await;
    let again = c1.get_or_create_trustchain(&device, &m1).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.view.head(), v0.head());
    assert_eq!(again.view.encryption_key, v0.encryption_key);
    assert_eq!(device.attestation_count(), 1);

    let fetched = c1.fetch_trustchain(v0.chain_id()).await.unwrap();
    assert_eq!(fetched, v0.chain);
}

// ---------------------------------------------------------------------------
// 5. Credentials
// ---------------------------------------------------------------------------

#[test]
fn init_member_credentials_is_idempotent() {
    let store = Arc::new(NullLedgerStore::new());
    let credentials = Arc::new(NullCredentialStore::new());
    let c = TrustchainClient::new(
        store,
        credentials.clone(),
        ClientConfig::default(),
        "phone",
    );

    let first = c.init_member_credentials().unwrap();
    let second = c.init_member_credentials().unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(credentials.save_count(), 1);
}

#[test]
fn file_credentials_survive_a_new_client() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("member.json");
    let fast = KdfParams {
        memory: 1024,
        iterations: 1,
        parallelism: 1,
    };
    let open = || {
        TrustchainClient::new(
            Arc::new(NullLedgerStore::new()),
            Arc::new(FileCredentialStore::new(&path, "pw").with_kdf_params(fast)),
            ClientConfig::default(),
            "laptop",
        )
    };

    let first = open().init_member_credentials().unwrap();
    let second = open().init_member_credentials().unwrap();
    assert_eq!(first.id(), second.id());

    let wrong = FileCredentialStore::new(&path, "nope");
    assert!(wrong.load().is_err());
}

// ---------------------------------------------------------------------------
// 6. Failing collaborators
// ---------------------------------------------------------------------------

fn impatient() -> ClientConfig {
    ClientConfig {
        request_timeout_ms: 50,
        attestation_timeout_ms: 50,
        ..Default::default()
    }
}

#[tokio::test]
async fn stalled_attestation_times_out_without_publishing() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2) = (creds(1), creds(2));
    let c1 = client_with(&store, impatient(), "m1");

    let v0 = created(&c1, &device, &m1).await;
    let v1 = c1.add_member(&v0.chain, &m1, admin(&m2, "m2")).await.unwrap();

    device.set_mode(TransportMode::Stall);
    let err = c1
        .remove_member(&device, &v1.chain, &m1, &m2.id())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TrustchainError::Timeout { operation: "device attestation", after_ms: 50 }
    ));
    assert!(err.is_retryable());
    assert_eq!(store.blocks(&v0.chain_id()).len(), 2);
}

#[tokio::test]
async fn refused_attestation_discards_the_block() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let (m1, m2) = (creds(1), creds(2));
    let c1 = client(&store, "m1");

    let v0 = created(&c1, &device, &m1).await;
    let v1 = c1.add_member(&v0.chain, &m1, admin(&m2, "m2")).await.unwrap();

    device.set_mode(TransportMode::Refuse);
    assert!(matches!(
        c1.remove_member(&device, &v1.chain, &m1, &m2.id()).await,
        Err(TrustchainError::TransportFailure(_))
    ));
    assert_eq!(store.blocks(&v0.chain_id()).len(), 2);

    // Nothing was applied, so the same removal works once the user confirms.
    device.set_mode(TransportMode::Attest);
    let v2 = c1
        .remove_member(&device, &v1.chain, &m1, &m2.id())
        .await
        .unwrap();
    assert_eq!(v2.epoch(), 2);
}

#[tokio::test]
async fn store_failures_surface_as_transient_errors() {
    let store = Arc::new(NullLedgerStore::new());
    let device = device();
    let m1 = creds(1);
    let c1 = client_with(&store, impatient(), "m1");

    store.set_unavailable(true);
    let err = c1.get_or_create_trustchain(&device, &m1).await.unwrap_err();
    assert!(matches!(err, TrustchainError::TransportFailure(_)));
    assert!(err.is_retryable());

    store.set_unavailable(false);
    store.set_stalled(true);
    let err = c1.get_or_create_trustchain(&device, &m1).await.unwrap_err();
    assert!(matches!(
        err,
        TrustchainError::Timeout { operation: "chain fetch", .. }
    ));

    store.set_stalled(false);
    device.set_mode(TransportMode::Unavailable);
    assert!(matches!(
        c1.get_or_create_trustchain(&device, &m1).await,
        Err(TrustchainError::TransportFailure(_))
    ));
    assert_eq!(device.attestation_count(), 0);
}

#[tokio::test]
async fn unknown_chain_is_not_found() {
    let store = Arc::new(NullLedgerStore::new());
    let c = client(&store, "m1");
    let chain_id = trustchain_crypto::chain_id_for_root(&creds(9).public);
    assert!(matches!(
        c.fetch_trustchain(chain_id).await,
        Err(TrustchainError::ChainNotFound(id)) if id == chain_id
    ));
}
