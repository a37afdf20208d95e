// ============================================
// File: crates/securechat-server/src/error.rs
// ============================================
//! # Server Error Types
//!
//! ## Creation Reason
//! One error enum for the relay: configuration, identity storage,
//! authentication state and relay refusals, plus wrapped lower-layer errors.
//!
//! ## Error Categories
//! 1. **Config**: Load/parse/validation failures (fatal at startup)
//! 2. **Storage**: Directory lookup/insert/update failures
//! 3. **Auth**: Out-of-order or unverifiable login/renewal steps
//! 4. **Relay**: Peer unknown, not connected or not logged in
//!
//! ## ⚠️ Important Note for Next Developer
//! - Storage, auth and relay errors end ONE command, never the connection
//! - Only `is_fatal` errors should stop the process
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use securechat_common::error::CommonError;
use securechat_common::ClientId;
use securechat_core::error::CoreError;
use securechat_transport::error::TransportError;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
    // ========================================
    // Configuration Errors
    // ========================================

    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        /// Path of the configuration file
        path: String,
        /// Why loading failed
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        /// Offending field, dotted path
        field: String,
        /// Why it is invalid
        reason: String,
    },

    // ========================================
    // Storage Errors
    // ========================================

    /// No identity registered under this id.
    #[error("Client {client_id} is not registered")]
    UnknownClient {
        /// The id that was looked up
        client_id: ClientId,
    },

    /// Identity directory failed to read or write.
    #[error("Identity storage error: {reason}")]
    Storage {
        /// What went wrong
        reason: String,
    },

    // ========================================
    // Authentication Errors
    // ========================================

    /// A command arrived in a state that does not accept it.
    #[error("Unexpected {header} in state {state}")]
    UnexpectedCommand {
        /// Header that arrived
        header: String,
        /// Connection state at the time
        state: &'static str,
    },

    /// Caller must be logged in first.
    #[error("Not logged in")]
    NotLoggedIn,

    // ========================================
    // Relay Errors
    // ========================================

    /// The named peer is not connected and logged in.
    #[error("Peer {peer} is not reachable")]
    PeerUnavailable {
        /// Peer token as the client sent it
        peer: String,
    },

    // ========================================
    // Lifecycle Errors
    // ========================================

    /// Server failed to start.
    #[error("Server failed to start: {reason}")]
    StartupFailed {
        /// Why startup failed
        reason: String,
    },

    /// Server is shutting down.
    #[error("Server is shutting down")]
    ShuttingDown,

    /// Internal invariant broken.
    #[error("Internal error: {message}")]
    Internal {
        /// Description
        message: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Error from core crate (crypto or parsing).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from transport crate.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `ConfigLoad` error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigInvalid` error.
    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Storage` error.
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    /// Creates an `UnexpectedCommand` error.
    pub fn unexpected(header: impl Into<String>, state: &'static str) -> Self {
        Self::UnexpectedCommand {
            header: header.into(),
            state,
        }
    }

    /// Creates a `PeerUnavailable` error.
    pub fn peer_unavailable(peer: impl Into<String>) -> Self {
        Self::PeerUnavailable { peer: peer.into() }
    }

    /// Creates a `StartupFailed` error.
    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            reason: reason.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` for configuration problems.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    /// Returns `true` for identity storage problems.
    #[must_use]
    pub const fn is_storage_error(&self) -> bool {
        matches!(self, Self::UnknownClient { .. } | Self::Storage { .. })
    }

    /// Returns `true` when the client broke the protocol (bad state, bad
    /// fields, failed verification).
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        match self {
            Self::UnexpectedCommand { .. } => true,
            Self::Core(e) => e.is_protocol_error() || e.is_crypto_error(),
            _ => false,
        }
    }

    /// Returns `true` for refusals caused by login or peer state.
    #[must_use]
    pub const fn is_policy_violation(&self) -> bool {
        match self {
            Self::NotLoggedIn | Self::PeerUnavailable { .. } => true,
            Self::Common(e) => e.is_client_error(),
            _ => false,
        }
    }

    /// Returns `true` if the process cannot continue.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } | Self::StartupFailed { .. } => {
                true
            }
            Self::Transport(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Returns `true` if the connection is gone and its loop should stop.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_disconnect())
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::config_load("/etc/securechat/server.toml", "file not found");
        assert!(err.to_string().contains("/etc/securechat/server.toml"));

        let err = ServerError::UnknownClient {
            client_id: ClientId::FIRST,
        };
        assert_eq!(err.to_string(), "Client 1 is not registered");
    }

    #[test]
    fn test_error_classification() {
        let config_err = ServerError::config_invalid("network.max_clients", "must be > 0");
        assert!(config_err.is_config_error());
        assert!(config_err.is_fatal());

        assert!(ServerError::unexpected("LOGIN_ACCEPT", "new").is_protocol_error());
        assert!(ServerError::Core(CoreError::SignatureVerification).is_protocol_error());
        assert!(ServerError::NotLoggedIn.is_policy_violation());
        assert!(ServerError::peer_unavailable("7").is_policy_violation());
        assert!(ServerError::storage("disk full").is_storage_error());
        assert!(!ServerError::storage("disk full").is_fatal());

        let gone = ServerError::Transport(TransportError::ConnectionClosed);
        assert!(gone.is_disconnect());
        assert!(!gone.is_fatal());
    }
}
