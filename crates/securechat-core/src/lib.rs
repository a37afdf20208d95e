// ============================================
// File: crates/securechat-core/src/lib.rs
// ============================================
//! # SecureChat Core - Protocol & Cryptography Library
//!
//! ## Creation Reason
//! Provides the command vocabulary and cryptographic operations shared by
//! the SecureChat relay server and its clients.
//!
//! ## Main Functionality
//!
//! ### Protocol Module ([`protocol`])
//! - Client↔server commands (`SIGNUP`, `LOGIN`, `SEND`, `RENEW_KEY` families)
//! - Peer-to-peer inner messages (DH ratchet steps, sealed data)
//! - Line codec
//!
//! ### Crypto Module ([`crypto`])
//! - RSA identity keys and signatures
//! - X25519 ephemeral key exchange
//! - HMAC-SHA256 tags, AES-256-CBC sealing
//! - Login and renewal challenge proofs
//! - Legacy seeded key stream for message keys
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │     securechat-server          securechat-client    │
//! │            │                          │             │
//! │            └────────────┬─────────────┘             │
//! │                         ▼                           │
//! │   securechat-core  ◄──  securechat-transport        │
//! │   You are here                                      │
//! │                         │                           │
//! │                         ▼                           │
//! │                  securechat-common                  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Properties
//! - **Confidentiality**: AES-256-CBC on every application message
//! - **Integrity**: HMAC-SHA256 inside the ciphertext
//! - **Authenticity**: RSA signatures on logins, renewals and first key exchange
//! - **Replay Protection**: Per-direction sequence numbers
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL primitives come from RustCrypto / dalek crates
//! - Secrets are wrapped in `Zeroizing` and redacted from `Debug`
//! - The message key stream is legacy wire behaviour, not a KDF to copy
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod error;
pub mod protocol;

// Re-export commonly used items
pub use crypto::{
    Challenge, ChallengeCrypto, DefaultChallengeCrypto, EphemeralKeyPair, IdentityKeyPair,
    IdentityPublicKey, MessageKeys, RenewalProof, SharedSecret,
};
pub use error::{CoreError, Result};
pub use protocol::{Command, CommandFamily, Frame, Header, InnerMessage, KeyExchangeKind};
