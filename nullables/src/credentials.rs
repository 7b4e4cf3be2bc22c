//! Nullable credential store: keeps the private seed in memory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use trustchain_crypto::credentials_from_private;
use trustchain_store::{CredentialStore, StoreError};
use trustchain_types::{MemberCredentials, PrivateKey};

pub struct NullCredentialStore {
    private: Mutex<Option<[u8; 32]>>,
    saves: AtomicUsize,
}

impl NullCredentialStore {
    pub fn new() -> Self {
        Self {
            private: Mutex::new(None),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of times credentials were written.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl Default for NullCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for NullCredentialStore {
    fn load(&self) -> Result<Option<MemberCredentials>, StoreError> {
        Ok(self
            .private
            .lock()
            .unwrap()
            .map(|bytes| credentials_from_private(PrivateKey(bytes))))
    }

    fn save(&self, credentials: &MemberCredentials) -> Result<(), StoreError> {
        *self.private.lock().unwrap() = Some(credentials.private.0);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
