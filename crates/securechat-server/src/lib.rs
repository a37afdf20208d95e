// ============================================
// File: crates/securechat-server/src/lib.rs
// ============================================
//! # Securechat Relay Server Library
//!
//! ## Creation Reason
//! Provides the relay side of the securechat protocol: identity
//! registration, challenge-response login, key renewal and blind
//! forwarding of end-to-end encrypted payloads.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Server configuration management
//! - [`server`]: Accept loop and lifecycle
//! - [`services`]: Business logic services
//!   - [`services::directory`]: Registered identities
//!   - [`services::auth`]: Signup, login and renewal
//!   - [`services::routing`]: Logged-in client routes
//! - [`handlers`]: Per-connection line processing
//! - [`error`]: Server-specific error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Relay Server                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐  │
//! │  │   Config    │────►│   Server    │────►│ ConnectionHandler│ │
//! │  └─────────────┘     └─────────────┘     └────────┬────────┘  │
//! │                                                   │           │
//! │         ┌───────────────────┬─────────────────────┘           │
//! │         ▼                   ▼                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     │
//! │  │ AuthService │────►│  Directory  │     │   Router    │     │
//! │  └─────────────┘     └─────────────┘     └─────────────┘     │
//! │                                                               │
//! ├───────────────────────────────────────────────────────────────┤
//! │                Transport Layer (TCP lines)                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The relay never decrypts `SEND` payloads; it only rewrites the peer id
//! - Configuration changes require restart (no hot-reload)
//! - Graceful shutdown waits for connection cleanup
//!
//! ## Last Modified
//! v0.1.0 - Initial server library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod services;

// Re-export primary types
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use handlers::{ConnectionHandler, ConnectionState};
pub use server::Server;
pub use services::{AuthService, IdentityDirectory, JsonFileDirectory, MemoryDirectory, Router};
