// ============================================
// File: crates/securechat-client/src/error.rs
// ============================================
//! # Client Error Types
//!
//! ## Creation Reason
//! One error enum for the client: configuration, local storage, user
//! input, policy refusals and peer session faults.
//!
//! ## Error Categories
//! 1. **Config**: Load/parse/validation failures (fatal at startup)
//! 2. **Storage**: Local identity/trust/block store failures
//! 3. **Policy**: Refused before any crypto work (not logged in, blocked,
//!    untrusted, self-send, bad arguments)
//! 4. **Session**: Inbound peer frames that do not fit the ratchet state
//!    (sequence mismatch, missing key, failed signature or tag)
//!
//! ## ⚠️ Important Note for Next Developer
//! - Session faults are answered with `DATA_MESSAGE_ERROR`, parse errors
//!   are not; see [`ClientError::warrants_error_reply`]
//! - Nothing here is fatal except config and connection setup
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use securechat_common::error::CommonError;
use securechat_common::ClientId;
use securechat_core::error::CoreError;
use securechat_transport::error::TransportError;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client error types.
#[derive(Error, Debug)]
pub enum ClientError {
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

    /// Local store failed to read or write.
    #[error("Local storage error: {reason}")]
    Storage {
        /// What went wrong
        reason: String,
    },

    /// The store already holds an identity.
    #[error("An identity already exists locally (Client_ID {client_id})")]
    IdentityExists {
        /// Id of the stored identity
        client_id: ClientId,
    },

    /// No local identity to log in with.
    #[error("No local identity, sign up first")]
    NoIdentity,

    // ========================================
    // Policy Errors
    // ========================================

    /// User input could not be used.
    #[error("Invalid {field}: {reason}")]
    InvalidInput {
        /// Argument name
        field: String,
        /// Why it was refused
        reason: String,
    },

    /// Caller must be logged in first.
    #[error("Client must be logged in")]
    NotLoggedIn,

    /// Messages to oneself are refused.
    #[error("Can't send message to myself. Your Client_ID: {client_id}")]
    SelfSend {
        /// Own id
        client_id: ClientId,
    },

    /// The peer is on the block list.
    #[error("Client blocked. Message cannot be sent to Client_ID: {peer}")]
    Blocked {
        /// Blocked peer
        peer: ClientId,
    },

    /// No `-send <id>` has selected a peer yet.
    #[error("Please provide Client_ID with -send before sending a message")]
    NoPeerSelected,

    /// A reply arrived that the current state did not ask for.
    #[error("Unexpected {header} while {state}")]
    UnexpectedReply {
        /// Header that arrived
        header: String,
        /// Local state at the time
        state: &'static str,
    },

    // ========================================
    // Session Errors
    // ========================================

    /// Frame came from someone other than the current peer.
    #[error("Unexpected data from Client_ID {found}, expected {expected:?}")]
    WrongPeer {
        /// Sender of the frame
        found: ClientId,
        /// Current peer, if any
        expected: Option<ClientId>,
    },

    /// The peer's claimed key is not on the trust list.
    #[error("Public key of Client_ID {peer} is not trusted")]
    Untrusted {
        /// Untrusted peer
        peer: ClientId,
    },

    /// Sequence number did not equal the expected one.
    #[error("Sequence number mismatch from Client_ID {peer}: found {found}, expected {expected}")]
    SequenceMismatch {
        /// Sender
        peer: ClientId,
        /// Sequence the frame carried
        found: u64,
        /// Sequence this side expected
        expected: u64,
    },

    /// A frame needs a shared key that does not exist (yet).
    #[error("No shared key with Client_ID {peer}: {reason}")]
    KeyState {
        /// Peer
        peer: ClientId,
        /// What was missing or unexpected
        reason: String,
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

impl ClientError {
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

    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `UnexpectedReply` error.
    pub fn unexpected(header: impl Into<String>, state: &'static str) -> Self {
        Self::UnexpectedReply {
            header: header.into(),
            state,
        }
    }

    /// Creates a `KeyState` error.
    pub fn key_state(peer: ClientId, reason: impl Into<String>) -> Self {
        Self::KeyState {
            peer,
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` for configuration errors.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    /// Returns `true` for local storage errors.
    #[must_use]
    pub const fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::IdentityExists { .. } | Self::NoIdentity
        )
    }

    /// Returns `true` for refusals made before any crypto work.
    #[must_use]
    pub const fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. }
                | Self::NotLoggedIn
                | Self::SelfSend { .. }
                | Self::Blocked { .. }
                | Self::NoPeerSelected
                | Self::Untrusted { .. }
        )
    }

    /// Returns `true` for frames that do not fit the protocol state.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        match self {
            Self::UnexpectedReply { .. }
            | Self::WrongPeer { .. }
            | Self::SequenceMismatch { .. }
            | Self::KeyState { .. } => true,
            Self::Core(e) => e.is_protocol_error() || e.is_crypto_error(),
            _ => false,
        }
    }

    /// Returns `true` if the peer should be told with `DATA_MESSAGE_ERROR`.
    ///
    /// Parse errors are excluded; a garbled frame is only logged.
    #[must_use]
    pub const fn warrants_error_reply(&self) -> bool {
        match self {
            Self::WrongPeer { .. }
            | Self::Untrusted { .. }
            | Self::Blocked { .. }
            | Self::SequenceMismatch { .. }
            | Self::KeyState { .. } => true,
            Self::Core(e) => e.is_crypto_error(),
            _ => false,
        }
    }

    /// Returns `true` if the client cannot continue.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } => true,
            Self::Transport(e) => e.is_fatal(),
            _ => false,
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: u32) -> ClientId {
        ClientId::new(value).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::SelfSend { client_id: id(3) };
        assert_eq!(err.to_string(), "Can't send message to myself. Your Client_ID: 3");

        let err = ClientError::SequenceMismatch {
            peer: id(2),
            found: 4,
            expected: 3,
        };
        assert!(err.to_string().contains("found 4, expected 3"));
    }

    #[test]
    fn test_classification() {
        assert!(ClientError::NotLoggedIn.is_policy_violation());
        assert!(ClientError::Blocked { peer: id(1) }.is_policy_violation());
        assert!(!ClientError::NotLoggedIn.warrants_error_reply());

        assert!(ClientError::config_invalid("x", "y").is_fatal());
        assert!(!ClientError::storage("disk").is_fatal());
        assert!(ClientError::storage("disk").is_storage_error());
    }

    #[test]
    fn test_error_reply_policy() {
        assert!(ClientError::key_state(id(2), "no key").warrants_error_reply());
        assert!(ClientError::Core(CoreError::TagVerification).warrants_error_reply());
        assert!(ClientError::Core(CoreError::SignatureVerification).warrants_error_reply());
        // Garbled frames are only logged
        assert!(!ClientError::Core(CoreError::malformed("DATA", "x")).warrants_error_reply());
        assert!(ClientError::Core(CoreError::malformed("DATA", "x")).is_protocol_error());
    }
}
