// ============================================
// File: crates/securechat-client/src/config.rs
// ============================================
//! # Client Configuration
//!
//! ## Creation Reason
//! Settings for the interactive client: which relay to dial, where the
//! local identity and trust lists live, and the ratchet tuning knobs.
//!
//! ## Configuration Sections
//! - `network`: Relay address
//! - `messaging`: Re-key threshold and handshake timeout
//! - `identity`: RSA modulus size for freshly generated identity keys
//! - `storage`: Local store file (in-memory when unset)
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [network]
//! server_addr = "127.0.0.1:35360"
//!
//! [messaging]
//! rekey_min_sequence = 5
//! handshake_timeout_secs = 30
//!
//! [identity]
//! key_bits = 2048
//!
//! [storage]
//! store_path = "/home/alice/.securechat/store.json"
//!
//! [logging]
//! level = "warn"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Without `storage.store_path` the identity is lost on exit and the
//!   next run has to sign up again
//! - The log level defaults to `warn` so tracing output does not drown
//!   the chat on the same terminal
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ClientError, Result};

/// Smallest accepted identity modulus.
pub const MIN_KEY_BITS: usize = 1024;

// ============================================
// ClientConfig
// ============================================

/// Main client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Ratchet tuning.
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Identity key generation.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Local store.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ClientError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ClientError::config_load(&path_str, e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the text cannot be parsed or validated.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ClientError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.messaging.validate()?;
        self.identity.validate()?;
        self.storage.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Serializes configuration to TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Returns the handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.messaging.handshake_timeout_secs)
    }
}

// ============================================
// NetworkConfig
// ============================================

/// Network configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Relay address as `host:port`.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
}

fn default_server_addr() -> String {
    "127.0.0.1:35360".to_string()
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        let Some((host, port)) = self.server_addr.rsplit_once(':') else {
            return Err(ClientError::config_invalid(
                "network.server_addr",
                "expected host:port",
            ));
        };
        if host.is_empty() {
            return Err(ClientError::config_invalid(
                "network.server_addr",
                "host cannot be empty",
            ));
        }
        match port.parse::<u16>() {
            Ok(p) if p != 0 => Ok(()),
            _ => Err(ClientError::config_invalid(
                "network.server_addr",
                "port must be 1-65535",
            )),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
        }
    }
}

// ============================================
// MessagingConfig
// ============================================

/// Ratchet tuning section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Messages sent under one key before a re-key may be triggered.
    #[serde(default = "default_rekey_min_sequence")]
    pub rekey_min_sequence: u64,

    /// How long to wait for the peer's half of a key exchange.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
}

fn default_rekey_min_sequence() -> u64 {
    5
}

fn default_handshake_timeout_secs() -> u64 {
    30
}

impl MessagingConfig {
    fn validate(&self) -> Result<()> {
        if self.handshake_timeout_secs == 0 {
            return Err(ClientError::config_invalid(
                "messaging.handshake_timeout_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            rekey_min_sequence: default_rekey_min_sequence(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
        }
    }
}

// ============================================
// IdentityConfig
// ============================================

/// Identity key generation section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// RSA modulus size in bits.
    #[serde(default = "default_key_bits")]
    pub key_bits: usize,
}

fn default_key_bits() -> usize {
    2048
}

impl IdentityConfig {
    fn validate(&self) -> Result<()> {
        if self.key_bits < MIN_KEY_BITS {
            return Err(ClientError::config_invalid(
                "identity.key_bits",
                format!("must be at least {MIN_KEY_BITS}"),
            ));
        }
        Ok(())
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            key_bits: default_key_bits(),
        }
    }
}

// ============================================
// StorageConfig
// ============================================

/// Local store section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding identity, trust and block lists.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        if let Some(path) = &self.store_path {
            if path.as_os_str().is_empty() {
                return Err(ClientError::config_invalid(
                    "storage.store_path",
                    "cannot be empty",
                ));
            }
        }
        Ok(())
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        if self.level.trim().is_empty() {
            return Err(ClientError::config_invalid("logging.level", "cannot be empty"));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.server_addr, "127.0.0.1:35360");
        assert_eq!(config.messaging.rekey_min_sequence, 5);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(30));
        assert_eq!(config.identity.key_bits, 2048);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_full_config_format() {
        let toml = r#"
            [network]
            server_addr = "relay.example.org:4000"

            [messaging]
            rekey_min_sequence = 10
            handshake_timeout_secs = 5

            [identity]
            key_bits = 3072

            [storage]
            store_path = "/tmp/store.json"
        "#;

        let config = ClientConfig::from_str(toml).unwrap();
        assert_eq!(config.network.server_addr, "relay.example.org:4000");
        assert_eq!(config.messaging.rekey_min_sequence, 10);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(5));
        assert_eq!(config.identity.key_bits, 3072);
        assert_eq!(
            config.storage.store_path.as_deref(),
            Some(Path::new("/tmp/store.json"))
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        for text in [
            "[network]\nserver_addr = \"nohost\"\n",
            "[network]\nserver_addr = \":35360\"\n",
            "[network]\nserver_addr = \"localhost:0\"\n",
            "[messaging]\nhandshake_timeout_secs = 0\n",
            "[identity]\nkey_bits = 512\n",
            "[logging]\nlevel = \" \"\n",
        ] {
            let err = ClientConfig::from_str(text).unwrap_err();
            assert!(err.is_config_error(), "{text}");
        }
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let text = ClientConfig::default().to_toml();
        let parsed = ClientConfig::from_str(&text).unwrap();
        assert_eq!(parsed.network.server_addr, "127.0.0.1:35360");
    }
}
