// ============================================
// File: crates/securechat-client/src/handlers/mod.rs
// ============================================
//! # Client Handlers
//!
//! ## Creation Reason
//! Entry points for the two kinds of input the client sees: lines from
//! the relay and lines typed by the user.
//!
//! ### Submodules
//! - [`command`]: User command parsing
//! - [`dispatch`]: Routes both inputs to the client services
//!
//! ## Data Flow
//! ```text
//! relay line ─► Command::decode ─┐
//!                                ├─► ChatClient ─► ClientAuth / TrustService / MessagingEngine
//! user line ─► UserCommand::parse┘                         │
//!                                                       Effects
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial handler structure

pub mod command;
pub mod dispatch;

pub use command::{UserCommand, HELP_TEXT};
pub use dispatch::{ChatClient, Flow};
