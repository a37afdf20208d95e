// ============================================
// File: crates/securechat-client/src/services/mod.rs
// ============================================
//! # Client Services
//!
//! ## Creation Reason
//! Client logic split by concern, each a synchronous state machine that
//! returns [`crate::effects::Effects`] instead of doing I/O.
//!
//! ## Submodules
//! - [`store`]: Local identity, trust and block lists
//! - [`trust`]: Trust and block decisions
//! - [`auth`]: Signup, login and key renewal
//! - [`messaging`]: Per-peer DH ratchet and message queue
//!
//! ## Last Modified
//! v0.1.0 - Initial services structure

pub mod auth;
pub mod messaging;
pub mod store;
pub mod trust;

pub use auth::{Account, ClientAuth};
pub use messaging::{MessagingEngine, PeerSession};
pub use store::{ClientStore, JsonFileStore, LocalIdentity, MemoryStore};
pub use trust::TrustService;
