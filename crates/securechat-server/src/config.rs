// ============================================
// File: crates/securechat-server/src/config.rs
// ============================================
//! # Server Configuration
//!
//! ## Creation Reason
//! Provides configuration management for the SecureChat relay,
//! loaded from a TOML file with defaults for every field.
//!
//! ## Main Functionality
//! - `ServerConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//!
//! ## Configuration Sections
//! - `network`: TCP listen address, concurrent client limit
//! - `auth`: Abandoned-signup timeout
//! - `storage`: Identity directory file (in-memory when unset)
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [network]
//! listen_addr = "0.0.0.0:35360"
//! max_clients = 100
//!
//! [auth]
//! signup_timeout_ms = 300000
//!
//! [storage]
//! directory_path = "/var/lib/securechat/identities.json"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - All config changes require server restart
//! - Without `storage.directory_path` registrations vanish on restart
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, ServerError};

/// Default TCP port of the relay.
pub const DEFAULT_PORT: u16 = 35360;

// ============================================
// ServerConfig
// ============================================

/// Main server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Identity storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
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
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ServerError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the text cannot be parsed or validated.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.auth.validate()?;
        self.storage.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Serializes configuration to TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Returns listen address (from network config).
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        self.network.listen_addr
    }

    /// Returns the abandoned-signup timeout.
    #[must_use]
    pub const fn signup_timeout(&self) -> Duration {
        Duration::from_millis(self.auth.signup_timeout_ms)
    }
}

// ============================================
// NetworkConfig
// ============================================

/// Network configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Maximum concurrently served connections.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT))
}

fn default_max_clients() -> usize {
    100
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        if self.listen_addr.port() == 0 {
            return Err(ServerError::config_invalid(
                "network.listen_addr",
                "port cannot be 0",
            ));
        }

        if self.max_clients == 0 {
            return Err(ServerError::config_invalid(
                "network.max_clients",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_clients: default_max_clients(),
        }
    }
}

// ============================================
// AuthConfig
// ============================================

/// Authentication configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Age after which a signup that never logged in may be purged.
    #[serde(default = "default_signup_timeout_ms")]
    pub signup_timeout_ms: u64,
}

fn default_signup_timeout_ms() -> u64 {
    300_000
}

impl AuthConfig {
    fn validate(&self) -> Result<()> {
        if self.signup_timeout_ms == 0 {
            return Err(ServerError::config_invalid(
                "auth.signup_timeout_ms",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signup_timeout_ms: default_signup_timeout_ms(),
        }
    }
}

// ============================================
// StorageConfig
// ============================================

/// Identity storage configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding registered identities; in-memory when absent.
    #[serde(default)]
    pub directory_path: Option<PathBuf>,
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        if let Some(path) = &self.directory_path {
            if path.as_os_str().is_empty() {
                return Err(ServerError::config_invalid(
                    "storage.directory_path",
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
    "info".to_string()
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        if self.level.trim().is_empty() {
            return Err(ServerError::config_invalid("logging.level", "cannot be empty"));
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
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr().port(), DEFAULT_PORT);
        assert_eq!(config.network.max_clients, 100);
        assert_eq!(config.signup_timeout(), Duration::from_secs(300));
        assert!(config.storage.directory_path.is_none());
    }

    #[test]
    fn test_full_config_format() {
        let toml = r#"
            [network]
            listen_addr = "127.0.0.1:4000"
            max_clients = 8

            [auth]
            signup_timeout_ms = 1000

            [storage]
            directory_path = "/tmp/identities.json"

            [logging]
            level = "debug"
        "#;

        let config = ServerConfig::from_str(toml).unwrap();
        assert_eq!(config.listen_addr().port(), 4000);
        assert_eq!(config.network.max_clients, 8);
        assert_eq!(config.signup_timeout(), Duration::from_secs(1));
        assert_eq!(
            config.storage.directory_path.as_deref(),
            Some(Path::new("/tmp/identities.json"))
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = ServerConfig::from_str("[network]\nmax_clients = 3\n").unwrap();
        assert_eq!(config.network.max_clients, 3);
        assert_eq!(config.listen_addr().port(), DEFAULT_PORT);
        assert_eq!(config.auth.signup_timeout_ms, 300_000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ServerConfig::from_str("[network]\nmax_clients = 0\n").unwrap_err();
        assert!(matches!(err, ServerError::ConfigInvalid { ref field, .. } if field == "network.max_clients"));

        let err = ServerConfig::from_str("[auth]\nsignup_timeout_ms = 0\n").unwrap_err();
        assert!(err.is_config_error());

        assert!(ServerConfig::from_str("[network\n").is_err());
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let config = ServerConfig::default();
        let text = config.to_toml();
        let parsed = ServerConfig::from_str(&text).unwrap();
        assert_eq!(parsed.listen_addr(), config.listen_addr());
        assert_eq!(parsed.logging.level, "info");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = ServerConfig::load("/nonexistent/securechat/server.toml")
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::ConfigLoad { .. }));
        assert!(err.is_fatal());
    }
}
