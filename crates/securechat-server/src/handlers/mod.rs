// ============================================
// File: crates/securechat-server/src/handlers/mod.rs
// ============================================
//! # Connection Handlers
//!
//! ## Creation Reason
//! Line processing for accepted client connections, kept apart from the
//! accept loop so it can be driven by in-memory endpoints in tests.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`connection`]: Per-line dispatch, failure replies and relay
//!
//! ## Data Flow
//! ```text
//! socket ─► LineSource ─► ConnectionHandler::handle_line
//!                              │
//!                              ├─► AuthService (signup/login/renew)
//!                              ├─► Router.lookup(peer) ─► peer queue
//!                              └─► own OutboundQueue (replies)
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial handler structure

pub mod connection;

pub use connection::{ConnectionHandler, ConnectionState};
