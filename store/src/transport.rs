//! The secure device that anchors a trustchain.

use async_trait::async_trait;
use trustchain_types::{PublicKey, Signature};

use crate::error::TransportError;

/// A hardware or otherwise trusted device that attests sensitive operations.
///
/// The device's key determines the chain id, and the same device must
/// approve chain creation and every member removal.
#[async_trait]
pub trait SecureTransport: Send + Sync {
    /// Public key of the attesting device.
    async fn root_public_key(&self) -> Result<PublicKey, TransportError>;

    /// Ask the device to sign `payload`. May wait on user confirmation.
    async fn request_attestation(&self, payload: &[u8]) -> Result<Signature, TransportError>;
}
