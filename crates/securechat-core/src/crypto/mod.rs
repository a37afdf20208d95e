// ============================================
// File: crates/securechat-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Centralizes every cryptographic primitive the relay protocol needs,
//! built on RustCrypto and dalek implementations.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`keys`]: RSA identity keys, X25519 ephemeral keys, shared secrets
//! - [`handshake`]: Login and renewal challenge proofs
//! - [`mac`]: HMAC-SHA256 tags
//! - [`cipher`]: AES-256-CBC message sealing
//! - [`kdf`]: Legacy seeded key stream for message keys
//!
//! ## Cryptographic Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Client ↔ Server (auth)                      │
//! │   RSA identity  ── signs "{nonce} {timestamp}" ──► verify   │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Client ↔ Client (via relay)                 │
//! │   X25519 ephemeral ─ signed (RSA) or tagged (HMAC) ─►       │
//! │   shared secret ──► key stream ──► enc key, auth key        │
//! │   "{tag} {seq} {message}" ──► AES-256-CBC ──► "iv:ct"       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Every key and signature crosses the wire as standard padded base64
//! - The key stream in [`kdf`] is kept for wire compatibility only
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

pub mod cipher;
pub mod handshake;
pub mod kdf;
pub mod keys;
pub mod mac;

pub use handshake::{Challenge, ChallengeCrypto, DefaultChallengeCrypto, RenewalProof};
pub use kdf::{LegacyKeyStream, MessageKeys};
pub use keys::{EphemeralKeyPair, IdentityKeyPair, IdentityPublicKey, SharedSecret};

// ============================================
// Constants
// ============================================

/// Size of long-term RSA identity keys in bits.
pub const RSA_KEY_SIZE_BITS: usize = 2048;

/// Size of the AES key in bits.
pub const AES_KEY_SIZE_BITS: usize = 256;

/// Length of the derived message encryption key (first key stream draw).
pub const ENCRYPTION_KEY_LEN: usize = AES_KEY_SIZE_BITS / 8;

/// Length of the derived message authentication key (second draw).
pub const AUTH_KEY_LEN: usize = RSA_KEY_SIZE_BITS / 8;

/// Size of the AES-CBC initialization vector in bytes.
pub const AES_IV_SIZE: usize = 16;

/// Size of an X25519 public key in bytes.
pub const X25519_PUBLIC_KEY_SIZE: usize = 32;

/// Separator between the IV and ciphertext in a sealed message.
pub const IV_SEPARATOR: char = ':';
