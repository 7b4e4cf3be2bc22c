//! Local persistence of a member device's own credentials.

use trustchain_types::MemberCredentials;

use crate::error::StoreError;

/// Device-local credential storage.
pub trait CredentialStore: Send + Sync {
    /// Stored credentials, if any were saved before.
    fn load(&self) -> Result<Option<MemberCredentials>, StoreError>;

    fn save(&self, credentials: &MemberCredentials) -> Result<(), StoreError>;
}
