// ============================================
// File: crates/securechat-transport/src/lib.rs
// ============================================
//! # SecureChat Transport - Line I/O Layer
//!
//! ## Creation Reason
//! Provides the newline-framed stream transport that carries SecureChat
//! protocol frames between clients and the relay server.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: `LineSource` / `LineSink` abstractions and the outbound queue
//! - [`tcp`]: TCP listener, connector, line reader and writer task
//! - [`mock`]: In-memory connection pairs for tests
//! - [`error`]: Transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │     securechat-server          securechat-client    │
//! │            │                          │             │
//! │            └────────────┬─────────────┘             │
//! │                         ▼                           │
//! │   securechat-core      securechat-transport         │
//! │                        You are here ◄──             │
//! │                         │                           │
//! │                         ▼                           │
//! │                  securechat-common                  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Handlers take the traits, not TCP types, so tests can use [`mock`]
//! - Every connection has exactly one writer
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod mock;
pub mod tcp;
pub mod traits;

// Re-export primary types
pub use error::{Result, TransportError};
pub use mock::MockEndpoint;
pub use tcp::{TcpLineConnection, TcpLineListener, TcpLineReader, DEFAULT_QUEUE_CAPACITY};
pub use traits::{ChannelLineSource, LineSink, LineSource, OutboundQueue};
