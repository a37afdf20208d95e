// ============================================
// File: crates/securechat-client/src/lib.rs
// ============================================
//! # Securechat Client Library
//!
//! ## Creation Reason
//! Provides the client side of the securechat protocol: a locally held
//! RSA identity, challenge-response login, key renewal and end-to-end
//! encrypted conversations using a per-peer Diffie-Hellman ratchet.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Client configuration management
//! - [`client`]: Connection and event loop
//! - [`handlers`]: User command parsing and dispatch
//! - [`services`]: Client state machines
//!   - [`services::store`]: Local identity, trust and block lists
//!   - [`services::trust`]: Trust and block decisions
//!   - [`services::auth`]: Signup, login and renewal
//!   - [`services::messaging`]: Sessions and the ratchet
//! - [`effects`]: Lines and notices produced by the state machines
//! - [`error`]: Client-specific error types
//!
//! ## Architecture Overview
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                           Client                              │
//! ├───────────────────────────────────────────────────────────────┤
//! │  stdin ─► UserCommand ─┐                                      │
//! │                        ├─► ChatClient ─► Effects ─► console   │
//! │  relay ─► Command ─────┘       │                │             │
//! │                                ▼                ▼             │
//! │          ┌────────────┬──────────────┬──────────────────┐     │
//! │          │ ClientAuth │ TrustService │ MessagingEngine  │     │
//! │          └─────┬──────┴──────┬───────┴──────────────────┘     │
//! │                └─────────────┴─► ClientStore (JSON file)      │
//! ├───────────────────────────────────────────────────────────────┤
//! │                Transport Layer (TCP lines)                    │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Services never touch the network; everything they want sent comes
//!   back in `Effects::outbound`
//! - Only one conversation is active at a time
//!
//! ## Last Modified
//! v0.1.0 - Initial client library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod effects;
pub mod error;
pub mod handlers;
pub mod services;

// Re-export primary types
pub use client::{drive, Client};
pub use config::ClientConfig;
pub use effects::{Effects, Notice};
pub use error::{ClientError, Result};
pub use handlers::{ChatClient, Flow, UserCommand};
pub use services::{
    ClientAuth, ClientStore, JsonFileStore, MemoryStore, MessagingEngine, TrustService,
};
