// ============================================
// File: crates/securechat-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! Defines the newline-framed text protocol spoken between SecureChat
//! clients and the relay server, plus the payloads clients exchange
//! through the relay.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`messages`]: Header vocabulary, dispatch families, typed commands
//! - [`inner`]: Key-exchange and data messages carried inside `SEND`
//! - [`codec`]: Line splitting and command decoding
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Authentication Phase                       │
//! │  Client ── SIGNUP / LOGIN / LOGIN_ACCEPT ──────────► Server │
//! │  Client ◄─ SIGNUP_SUCCESS / LOGIN_NONCE / LOGIN_SUCCESS ─── │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Relay Phase                              │
//! │  Alice ── SEND_START 2 ──► Server ── SEND_INVITE ──► both   │
//! │  Alice ── SEND 2 <inner> ──► Server ── SEND 1 <inner> ──► Bob│
//! │           (inner is opaque to the server)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format Principles
//! - One UTF-8 line per frame, `HEADER[ DATA]`
//! - Fields are separated by single spaces; the last field may contain spaces
//! - Binary values travel as standard padded base64
//!
//! ## ⚠️ Important Note for Next Developer
//! - ANY header or field order change breaks deployed clients
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod codec;
pub mod inner;
pub mod messages;

// Re-export primary types
pub use codec::{Codec, Frame, ProtocolCodec};
pub use inner::{key_exchange_text, InnerMessage, KeyExchangeKind, TaggedMessage};
pub use messages::{Command, CommandFamily, Header};
