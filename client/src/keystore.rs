//! Argon2id encrypted credential file.
//!
//! The member's 32-byte Ed25519 seed is encrypted with a password:
//! 1. Argon2id derives a 32-byte key from the password and a random salt
//! 2. AES-256-GCM encrypts the seed with a random nonce
//! 3. Everything needed to decrypt is stored as JSON next to the member id

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use trustchain_crypto::credentials_from_private;
use trustchain_store::{CredentialStore, StoreError};
use trustchain_types::{MemberCredentials, PrivateKey};

/// Argon2id parameters: 64 MB memory, 3 iterations, 1 lane.
const ARGON2_MEMORY_KIB: u32 = 65536;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 1;

const SALT_LEN: usize = 32;
/// AES-GCM nonce length (96 bits).
const NONCE_LEN: usize = 12;
const KEYSTORE_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeystoreFile {
    pub version: u32,
    /// Hex member id, so the file can be matched to a chain member unlocked.
    pub member_id: String,
    pub crypto: KeystoreCrypto,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeystoreCrypto {
    pub cipher: String,
    pub kdf: String,
    pub kdf_params: KdfParams,
    /// Hex-encoded salt.
    pub salt: String,
    /// Hex-encoded nonce.
    pub nonce: String,
    /// Hex-encoded ciphertext.
    pub ciphertext: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory: ARGON2_MEMORY_KIB,
            iterations: ARGON2_ITERATIONS,
            parallelism: ARGON2_PARALLELISM,
        }
    }
}

/// Encrypt member credentials under `password`.
pub fn encrypt_credentials(
    credentials: &MemberCredentials,
    password: &str,
    kdf_params: KdfParams,
) -> Result<KeystoreFile, StoreError> {
    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce_bytes);

    let derived_key = derive_key(password, &salt, kdf_params)?;
    let cipher = Aes256Gcm::new_from_slice(&derived_key[..])
        .map_err(|e| StoreError::Backend(format!("AES key init failed: {}", e)))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), credentials.private.0.as_ref())
        .map_err(|e| StoreError::Backend(format!("encryption failed: {}", e)))?;

    Ok(KeystoreFile {
        version: KEYSTORE_VERSION,
        member_id: hex::encode(credentials.id().as_bytes()),
        crypto: KeystoreCrypto {
            cipher: "aes-256-gcm".to_string(),
            kdf: "argon2id".to_string(),
            kdf_params,
            salt: hex::encode(salt),
            nonce: hex::encode(nonce_bytes),
            ciphertext: hex::encode(ciphertext),
        },
    })
}

/// Decrypt a keystore and rebuild the credentials it holds.
pub fn decrypt_credentials(
    keystore: &KeystoreFile,
    password: &str,
) -> Result<MemberCredentials, StoreError> {
    if keystore.version != KEYSTORE_VERSION {
        return Err(StoreError::Serialization(format!(
            "unsupported keystore version: {}",
            keystore.version
        )));
    }

    let salt = decode_field("salt", &keystore.crypto.salt)?;
    let nonce_bytes = decode_field("nonce", &keystore.crypto.nonce)?;
    let ciphertext = decode_field("ciphertext", &keystore.crypto.ciphertext)?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(StoreError::Serialization(format!(
            "invalid nonce length: expected {}, got {}",
            NONCE_LEN,
            nonce_bytes.len()
        )));
    }

    let derived_key = derive_key(password, &salt, keystore.crypto.kdf_params)?;
    let cipher = Aes256Gcm::new_from_slice(&derived_key[..])
        .map_err(|e| StoreError::Backend(format!("AES key init failed: {}", e)))?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| {
                StoreError::Backend("decryption failed: wrong password or corrupted data".into())
            })?,
    );

    let seed: [u8; 32] = plaintext.as_slice().try_into().map_err(|_| {
        StoreError::Serialization(format!(
            "decrypted key has wrong length: expected 32, got {}",
            plaintext.len()
        ))
    })?;
    let credentials = credentials_from_private(PrivateKey(seed));

    if hex::encode(credentials.id().as_bytes()) != keystore.member_id {
        return Err(StoreError::Serialization(
            "keystore member id does not match the decrypted key".into(),
        ));
    }
    Ok(credentials)
}

/// Password-protected credentials in a single JSON file.
pub struct FileCredentialStore {
    path: PathBuf,
    password: Zeroizing<String>,
    kdf_params: KdfParams,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            password: Zeroizing::new(password.into()),
            kdf_params: KdfParams::default(),
        }
    }

    /// Override the Argon2 cost for newly written files.
    pub fn with_kdf_params(mut self, kdf_params: KdfParams) -> Self {
        self.kdf_params = kdf_params;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<MemberCredentials>, StoreError> {
        let json = match std::fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Backend(format!(
                    "failed to read keystore file: {}",
                    e
                )))
            }
        };
        let keystore: KeystoreFile = serde_json::from_str(&json)
            .map_err(|e| StoreError::Serialization(format!("invalid keystore JSON: {}", e)))?;
        decrypt_credentials(&keystore, &self.password).map(Some)
    }

    fn save(&self, credentials: &MemberCredentials) -> Result<(), StoreError> {
        let keystore = encrypt_credentials(credentials, &self.password, self.kdf_params)?;
        let json = serde_json::to_string_pretty(&keystore)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("failed to create directory: {}", e)))?;
        }
        // Write then rename so a crash never leaves a truncated keystore.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| StoreError::Backend(format!("failed to write keystore file: {}", e)))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| StoreError::Backend(format!("failed to replace keystore file: {}", e)))?;
        Ok(())
    }
}

fn derive_key(
    password: &str,
    salt: &[u8],
    kdf_params: KdfParams,
) -> Result<Zeroizing<[u8; 32]>, StoreError> {
    let params = Params::new(
        kdf_params.memory,
        kdf_params.iterations,
        kdf_params.parallelism,
        Some(32),
    )
    .map_err(|e| StoreError::Backend(format!("Argon2 params error: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut output[..])
        .map_err(|e| StoreError::Backend(format!("Argon2 hashing failed: {}", e)))?;
    Ok(output)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, StoreError> {
    hex::decode(value).map_err(|e| StoreError::Serialization(format!("invalid {} hex: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustchain_crypto::credentials_from_seed;

    /// Cheap parameters so tests stay fast.
    fn fast() -> KdfParams {
        KdfParams {
            memory: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let creds = credentials_from_seed(&[42; 32]);
        let keystore = encrypt_credentials(&creds, "pw", fast()).unwrap();
        let restored = decrypt_credentials(&keystore, "pw").unwrap();
        assert_eq!(restored.public, creds.public);
        assert_eq!(keystore.member_id, hex::encode(creds.id().as_bytes()));
    }

    #[test]
    fn wrong_password_fails() {
        let creds = credentials_from_seed(&[42; 32]);
        let keystore = encrypt_credentials(&creds, "right", fast()).unwrap();
        assert!(decrypt_credentials(&keystore, "wrong").is_err());
    }

    #[test]
    fn default_kdf_params_are_recorded() {
        let keystore =
            encrypt_credentials(&credentials_from_seed(&[1; 32]), "pw", KdfParams::default())
                .unwrap();
        assert_eq!(keystore.crypto.cipher, "aes-256-gcm");
        assert_eq!(keystore.crypto.kdf, "argon2id");
        assert_eq!(keystore.crypto.kdf_params.memory, 65536);
        assert_eq!(keystore.crypto.kdf_params.iterations, 3);
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut keystore =
            encrypt_credentials(&credentials_from_seed(&[1; 32]), "pw", fast()).unwrap();
        keystore.version = 99;
        assert!(matches!(
            decrypt_credentials(&keystore, "pw"),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn tampered_member_id_rejected() {
        let mut keystore =
            encrypt_credentials(&credentials_from_seed(&[1; 32]), "pw", fast()).unwrap();
        keystore.member_id = hex::encode([9u8; 32]);
        assert!(decrypt_credentials(&keystore, "pw").is_err());
    }

    #[test]
    fn file_store_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("keys/member.json"), "pw")
            .with_kdf_params(fast());
        assert!(store.load().unwrap().is_none());

        let creds = credentials_from_seed(&[5; 32]);
        store.save(&creds).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.id(), creds.id());
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("member.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = FileCredentialStore::new(&path, "pw");
        assert!(matches!(store.load(), Err(StoreError::Serialization(_))));
    }
}
