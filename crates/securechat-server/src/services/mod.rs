// ============================================
// File: crates/securechat-server/src/services/mod.rs
// ============================================
//! # Server Services
//!
//! ## Creation Reason
//! Business logic of the relay, separated from sockets and line parsing.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`directory`]: Registered identities (id, name, public key)
//! - [`auth`]: Signup, login and key renewal
//! - [`routing`]: Logged-in client id to connection mapping
//!
//! ## Service Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Service Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────────┐        ┌───────────────────────────┐ │
//! │  │   AuthService    │───────►│   IdentityDirectory       │ │
//! │  │                  │        │  - insert / get           │ │
//! │  │  - Signup        │        │  - update_public_key      │ │
//! │  │  - Login         │        │  - delete                 │ │
//! │  │  - Renewal       │        └───────────────────────────┘ │
//! │  └──────────────────┘                                      │
//! │                              ┌───────────────────────────┐ │
//! │                              │        Router             │ │
//! │                              │  - ClientId → queue       │ │
//! │                              └───────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The directory and router are the only state shared across connections
//! - Per-connection auth state is owned by the connection task
//!
//! ## Last Modified
//! v0.1.0 - Initial services structure

pub mod auth;
pub mod directory;
pub mod routing;

// Re-export primary types
pub use auth::{AuthService, AuthSession};
pub use directory::{IdentityDirectory, JsonFileDirectory, MemoryDirectory, RegisteredIdentity};
pub use routing::{ConnectionHandle, Router};
