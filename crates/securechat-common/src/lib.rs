// ============================================
// File: crates/securechat-common/src/lib.rs
// ============================================
//! # SecureChat Common - Shared Utilities Library
//!
//! ## Creation Reason
//! Provides foundational types and utilities shared across all SecureChat
//! crates, so that client ids and timestamps mean the same thing on both
//! ends of the relay.
//!
//! ## Main Functionality
//! - [`types`]: Core type definitions (`ClientId`)
//! - [`time`]: Millisecond timestamps
//! - [`error`]: Common error types and result aliases
//!
//! ## Architecture Position
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │      securechat-server        securechat-client      │
//! │              │                        │              │
//! │              └───────────┬────────────┘              │
//! │                ┌─────────┴─────────┐                 │
//! │                ▼                   ▼                 │
//! │        securechat-core    securechat-transport       │
//! │                │                   │                 │
//! │                └─────────┬─────────┘                 │
//! │                          ▼                           │
//! │                 securechat-common  ◄── You are here  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is the foundation - changes affect everything
//! - Keep dependencies minimal
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod time;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{CommonError, Result};
pub use time::Timestamp;
pub use types::ClientId;
