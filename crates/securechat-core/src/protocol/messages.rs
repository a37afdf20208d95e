// ============================================
// File: crates/securechat-core/src/protocol/messages.rs
// ============================================
//! # Protocol Command Definitions
//!
//! ## Creation Reason
//! Defines every client↔server command of the SecureChat text protocol:
//! the header vocabulary, the prefix families the server dispatches on,
//! and a typed [`Command`] for each header.
//!
//! ## Command Table
//! | Header | Direction | Fields |
//! |--------|-----------|--------|
//! | `SIGNUP` | C→S | name, publicKey |
//! | `SIGNUP_SUCCESS` / `SIGNUP_FAILURE` | S→C | [clientId] |
//! | `LOGIN` | C→S | clientId |
//! | `LOGIN_NONCE` | S→C | nonce, timestamp |
//! | `LOGIN_ACCEPT` | C→S | signature |
//! | `LOGIN_SUCCESS` / `LOGIN_FAILURE` | S→C | — |
//! | `SEND_START` | C→S | peerId |
//! | `SEND_INVITE` | S→C | peerId, peerPublicKey |
//! | `SEND` | bidi via S | peerId, innerPayload |
//! | `SEND_FAILURE` | S→C | [peerId] |
//! | `RENEW_KEY_REQUEST` | C→S | — |
//! | `RENEW_KEY_REQUEST_OK` | S→C | nonce, timestamp |
//! | `RENEW_KEY` | C→S | oldSignature, newPublicKey, newSignature |
//! | `RENEW_KEY_SUCCESS` / `RENEW_KEY_FAILURE` | S→C | — |
//!
//! ## ⚠️ Important Note for Next Developer
//! - Header spellings are wire format; never rename them
//! - Family matching is by PREFIX (`SEND_INVITE` is in the `SEND` family)
//!
//! ## Last Modified
//! v0.1.0 - Initial command definitions

use std::fmt;

use serde::{Deserialize, Serialize};

use securechat_common::types::ClientId;

use crate::crypto::{Challenge, RenewalProof};

// ============================================
// Header
// ============================================

/// Header token of a client↔server command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Header {
    /// `SIGNUP`
    Signup,
    /// `SIGNUP_SUCCESS`
    SignupSuccess,
    /// `SIGNUP_FAILURE`
    SignupFailure,
    /// `LOGIN`
    Login,
    /// `LOGIN_NONCE`
    LoginNonce,
    /// `LOGIN_ACCEPT`
    LoginAccept,
    /// `LOGIN_SUCCESS`
    LoginSuccess,
    /// `LOGIN_FAILURE`
    LoginFailure,
    /// `SEND_START`
    SendStart,
    /// `SEND_INVITE`
    SendInvite,
    /// `SEND`
    Send,
    /// `SEND_FAILURE`
    SendFailure,
    /// `RENEW_KEY_REQUEST`
    RenewKeyRequest,
    /// `RENEW_KEY_REQUEST_OK`
    RenewKeyRequestOk,
    /// `RENEW_KEY`
    RenewKey,
    /// `RENEW_KEY_SUCCESS`
    RenewKeySuccess,
    /// `RENEW_KEY_FAILURE`
    RenewKeyFailure,
}

impl Header {
    /// Every header, in table order.
    pub const ALL: [Self; 17] = [
        Self::Signup,
        Self::SignupSuccess,
        Self::SignupFailure,
        Self::Login,
        Self::LoginNonce,
        Self::LoginAccept,
        Self::LoginSuccess,
        Self::LoginFailure,
        Self::SendStart,
        Self::SendInvite,
        Self::Send,
        Self::SendFailure,
        Self::RenewKeyRequest,
        Self::RenewKeyRequestOk,
        Self::RenewKey,
        Self::RenewKeySuccess,
        Self::RenewKeyFailure,
    ];

    /// Wire spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Signup => "SIGNUP",
            Self::SignupSuccess => "SIGNUP_SUCCESS",
            Self::SignupFailure => "SIGNUP_FAILURE",
            Self::Login => "LOGIN",
            Self::LoginNonce => "LOGIN_NONCE",
            Self::LoginAccept => "LOGIN_ACCEPT",
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailure => "LOGIN_FAILURE",
            Self::SendStart => "SEND_START",
            Self::SendInvite => "SEND_INVITE",
            Self::Send => "SEND",
            Self::SendFailure => "SEND_FAILURE",
            Self::RenewKeyRequest => "RENEW_KEY_REQUEST",
            Self::RenewKeyRequestOk => "RENEW_KEY_REQUEST_OK",
            Self::RenewKey => "RENEW_KEY",
            Self::RenewKeySuccess => "RENEW_KEY_SUCCESS",
            Self::RenewKeyFailure => "RENEW_KEY_FAILURE",
        }
    }

    /// Exact (not prefix) lookup.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|header| header.as_str() == name)
    }

    /// Family this header belongs to.
    #[must_use]
    pub const fn family(&self) -> CommandFamily {
        match self {
            Self::Signup | Self::SignupSuccess | Self::SignupFailure => CommandFamily::Signup,
            Self::Login
            | Self::LoginNonce
            | Self::LoginAccept
            | Self::LoginSuccess
            | Self::LoginFailure => CommandFamily::Login,
            Self::SendStart | Self::SendInvite | Self::Send | Self::SendFailure => {
                CommandFamily::Send
            }
            Self::RenewKeyRequest
            | Self::RenewKeyRequestOk
            | Self::RenewKey
            | Self::RenewKeySuccess
            | Self::RenewKeyFailure => CommandFamily::RenewKey,
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// CommandFamily
// ============================================

/// Dispatch family, selected by header prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandFamily {
    /// `SIGNUP*`
    Signup,
    /// `LOGIN*`
    Login,
    /// `SEND*`
    Send,
    /// `RENEW_KEY*`
    RenewKey,
}

impl CommandFamily {
    /// Classifies a raw header token by prefix.
    ///
    /// Returns `None` for headers outside every family; those are ignored.
    #[must_use]
    pub fn classify(header: &str) -> Option<Self> {
        [Self::Signup, Self::Login, Self::Send, Self::RenewKey]
            .into_iter()
            .find(|family| header.starts_with(family.prefix()))
    }

    /// Header prefix of the family.
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Signup => "SIGNUP",
            Self::Login => "LOGIN",
            Self::Send => "SEND",
            Self::RenewKey => "RENEW_KEY",
        }
    }

    /// Failure reply header for the family.
    #[must_use]
    pub const fn failure_header(&self) -> Header {
        match self {
            Self::Signup => Header::SignupFailure,
            Self::Login => Header::LoginFailure,
            Self::Send => Header::SendFailure,
            Self::RenewKey => Header::RenewKeyFailure,
        }
    }
}

// ============================================
// Command
// ============================================

/// A fully parsed client↔server command.
///
/// `Display` renders the exact wire line (without newline); parsing lives
/// in [`crate::protocol::codec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register a new identity.
    Signup {
        /// Display name (single token)
        name: String,
        /// Base64 SPKI public key
        public_key: String,
    },
    /// Registration accepted.
    SignupSuccess {
        /// Assigned identifier
        client_id: ClientId,
    },
    /// Registration refused.
    SignupFailure,
    /// Begin login for an identity.
    Login {
        /// Claimed identifier
        client_id: ClientId,
    },
    /// Login challenge.
    LoginNonce(Challenge),
    /// Signed login challenge.
    LoginAccept {
        /// Base64 signature over the challenge text
        signature: String,
    },
    /// Login verified.
    LoginSuccess,
    /// Login refused.
    LoginFailure,
    /// Ask the relay to connect to a peer.
    SendStart {
        /// Target peer
        peer: ClientId,
    },
    /// Relay introduces a peer and its long-term key.
    SendInvite {
        /// Introduced peer
        peer: ClientId,
        /// The peer's base64 public key
        public_key: String,
    },
    /// Opaque relayed payload. Outbound names the recipient, inbound the sender.
    Send {
        /// Recipient (outbound) or sender (inbound)
        peer: ClientId,
        /// Inner message text, never parsed by the relay
        payload: String,
    },
    /// Relay refused a send; carries the raw peer token when one was given.
    SendFailure {
        /// Peer token exactly as the client sent it
        peer: Option<String>,
    },
    /// Begin key renewal.
    RenewKeyRequest,
    /// Renewal challenge.
    RenewKeyRequestOk(Challenge),
    /// Renewal proof.
    RenewKey(RenewalProof),
    /// Renewal stored.
    RenewKeySuccess,
    /// Renewal refused.
    RenewKeyFailure,
}

impl Command {
    /// Header of this command.
    #[must_use]
    pub const fn header(&self) -> Header {
        match self {
            Self::Signup { .. } => Header::Signup,
            Self::SignupSuccess { .. } => Header::SignupSuccess,
            Self::SignupFailure => Header::SignupFailure,
            Self::Login { .. } => Header::Login,
            Self::LoginNonce(_) => Header::LoginNonce,
            Self::LoginAccept { .. } => Header::LoginAccept,
            Self::LoginSuccess => Header::LoginSuccess,
            Self::LoginFailure => Header::LoginFailure,
            Self::SendStart { .. } => Header::SendStart,
            Self::SendInvite { .. } => Header::SendInvite,
            Self::Send { .. } => Header::Send,
            Self::SendFailure { .. } => Header::SendFailure,
            Self::RenewKeyRequest => Header::RenewKeyRequest,
            Self::RenewKeyRequestOk(_) => Header::RenewKeyRequestOk,
            Self::RenewKey(_) => Header::RenewKey,
            Self::RenewKeySuccess => Header::RenewKeySuccess,
            Self::RenewKeyFailure => Header::RenewKeyFailure,
        }
    }

    /// Generic failure reply of the family this command belongs to.
    #[must_use]
    pub fn failure_reply(family: CommandFamily, peer_token: Option<&str>) -> Self {
        match family {
            CommandFamily::Signup => Self::SignupFailure,
            CommandFamily::Login => Self::LoginFailure,
            CommandFamily::Send => Self::SendFailure {
                peer: peer_token.map(str::to_string),
            },
            CommandFamily::RenewKey => Self::RenewKeyFailure,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = self.header();
        match self {
            Self::Signup { name, public_key } => write!(f, "{header} {name} {public_key}"),
            Self::SignupSuccess { client_id } | Self::Login { client_id } => {
                write!(f, "{header} {client_id}")
            }
            Self::LoginNonce(challenge) | Self::RenewKeyRequestOk(challenge) => {
                write!(f, "{header} {challenge}")
            }
            Self::LoginAccept { signature } => write!(f, "{header} {signature}"),
            Self::SendStart { peer } => write!(f, "{header} {peer}"),
            Self::SendInvite { peer, public_key } => write!(f, "{header} {peer} {public_key}"),
            Self::Send { peer, payload } => write!(f, "{header} {peer} {payload}"),
            Self::SendFailure { peer: Some(peer) } => write!(f, "{header} {peer}"),
            Self::RenewKey(proof) => write!(
                f,
                "{header} {} {} {}",
                proof.old_signature, proof.new_public_key, proof.new_signature
            ),
            Self::SignupFailure
            | Self::LoginSuccess
            | Self::LoginFailure
            | Self::SendFailure { peer: None }
            | Self::RenewKeyRequest
            | Self::RenewKeySuccess
            | Self::RenewKeyFailure => write!(f, "{header}"),
        }
    }
}

// ============================================
// Tests
// ============================================
