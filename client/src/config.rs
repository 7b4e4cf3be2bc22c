//! Client configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use trustchain_types::Permissions;
use trustchain_utils::LogFormat;

use crate::TrustchainError;

/// Configuration for a [`TrustchainClient`](crate::TrustchainClient).
///
/// Can be loaded from a TOML file via [`ClientConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Bound on each ledger store call.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Bound on each device attestation, which may wait for the user.
    #[serde(default = "default_attestation_timeout_ms")]
    pub attestation_timeout_ms: u64,

    /// Mint a new rotation when a member is added, not only on removal.
    #[serde(default)]
    pub rotate_on_add: bool,

    /// Capability mask given to members built with
    /// [`TrustchainClient::new_member`](crate::TrustchainClient::new_member).
    #[serde(default = "default_member_permissions")]
    pub default_member_permissions: u32,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_attestation_timeout_ms() -> u64 {
    60_000
}

fn default_member_permissions() -> u32 {
    Permissions::ALL.bits()
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, TrustchainError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| TrustchainError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse and check configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, TrustchainError> {
        let config: Self = toml::from_str(s).map_err(|e| TrustchainError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, TrustchainError> {
        toml::to_string_pretty(self).map_err(|e| TrustchainError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), TrustchainError> {
        if self.request_timeout_ms == 0 || self.attestation_timeout_ms == 0 {
            return Err(TrustchainError::Config("timeouts must be non-zero".into()));
        }
        self.log_format()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn attestation_timeout(&self) -> Duration {
        Duration::from_millis(self.attestation_timeout_ms)
    }

    pub fn member_permissions(&self) -> Permissions {
        Permissions(self.default_member_permissions)
    }

    pub fn log_format(&self) -> Result<LogFormat, TrustchainError> {
        self.log_format
            .parse()
            .map_err(|e: trustchain_utils::LogFormatError| TrustchainError::Config(e.to_string()))
    }

    /// Install the global tracing subscriber described by this config.
    ///
    /// Returns `false` if the host application already installed one.
    pub fn init_logging(&self) -> Result<bool, TrustchainError> {
        Ok(trustchain_utils::init_logging(
            self.log_format()?,
            &self.log_level,
        ))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            attestation_timeout_ms: default_attestation_timeout_ms(),
            rotate_on_add: false,
            default_member_permissions: default_member_permissions(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.attestation_timeout(), Duration::from_secs(60));
        assert_eq!(config.member_permissions(), Permissions::ALL);
        assert!(!config.rotate_on_add);
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let config = ClientConfig::from_toml_str(
            r#"
            request_timeout_ms = 250
            rotate_on_add = true
            default_member_permissions = 1
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.request_timeout_ms, 250);
        assert!(config.rotate_on_add);
        assert_eq!(config.member_permissions(), Permissions::MANAGE_MEMBERS);
        assert_eq!(config.log_format().unwrap(), LogFormat::Json);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ClientConfig::from_toml_str("log_format = \"xml\""),
            Err(TrustchainError::Config(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("request_timeout_ms = 0"),
            Err(TrustchainError::Config(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("request_timeout_ms = \"soon\""),
            Err(TrustchainError::Config(_))
        ));
    }

    #[test]
    fn toml_round_trip() {
        let config = ClientConfig {
            attestation_timeout_ms: 5,
            ..Default::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(ClientConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "log_level = \"debug\"\n").unwrap();
        let config = ClientConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.log_level, "debug");

        assert!(ClientConfig::from_toml_file(dir.path().join("missing.toml")).is_err());
    }
}
