//! Nullable secure device: a software key that attests on request.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use trustchain_crypto::{credentials_from_seed, generate_credentials, sign_message};
use trustchain_store::{SecureTransport, TransportError};
use trustchain_types::{MemberCredentials, PublicKey, Signature};

/// How the device answers attestation requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportMode {
    Attest,
    /// The user declined on the device.
    Refuse,
    Unavailable,
    /// The user never answers the attestation prompt.
    Stall,
}

pub struct NullTransport {
    device: MemberCredentials,
    mode: Mutex<TransportMode>,
    attestations: AtomicUsize,
}

impl NullTransport {
    /// A device with a random root key.
    pub fn new() -> Self {
        Self::with_credentials(generate_credentials())
    }

    /// A device with a deterministic root key.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::with_credentials(credentials_from_seed(seed))
    }

    fn with_credentials(device: MemberCredentials) -> Self {
        Self {
            device,
            mode: Mutex::new(TransportMode::Attest),
            attestations: AtomicUsize::new(0),
        }
    }

    pub fn set_mode(&self, mode: TransportMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn public_key(&self) -> PublicKey {
        self.device.public.clone()
    }

    /// Number of attestations actually signed.
    pub fn attestation_count(&self) -> usize {
        self.attestations.load(Ordering::SeqCst)
    }
}

impl Default for NullTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecureTransport for NullTransport {
    async fn root_public_key(&self) -> Result<PublicKey, TransportError> {
        let mode = *self.mode.lock().unwrap();
        match mode {
            TransportMode::Unavailable => {
                Err(TransportError::Unavailable("device disconnected".into()))
            }
            _ => Ok(self.device.public.clone()),
        }
    }

    async fn request_attestation(&self, payload: &[u8]) -> Result<Signature, TransportError> {
        let mode = *self.mode.lock().unwrap();
        match mode {
            TransportMode::Attest => {
                self.attestations.fetch_add(1, Ordering::SeqCst);
                Ok(sign_message(payload, &self.device.private))
            }
            TransportMode::Refuse => Err(TransportError::Rejected("user declined".into())),
            TransportMode::Unavailable => {
                Err(TransportError::Unavailable("device disconnected".into()))
            }
            TransportMode::Stall => std::future::pending().await,
        }
    }
}
