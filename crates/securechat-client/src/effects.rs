// ============================================
// File: crates/securechat-client/src/effects.rs
// ============================================
//! # Engine Effects
//!
//! ## Creation Reason
//! The client engines are synchronous state machines. Instead of writing
//! to the socket or the terminal themselves, every transition returns
//! the lines to send and the notices to show, and the async runner
//! carries them out.
//!
//! ## Main Functionality
//! - `Notice`: Something the user should see
//! - `Effects`: Outbound wire lines plus notices from one transition
//!
//! ## Last Modified
//! v0.1.0 - Initial effects model

use std::fmt;

use securechat_common::ClientId;
use securechat_core::protocol::Command;

// ============================================
// Notice
// ============================================

/// A line of user-facing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Progress or confirmation.
    Info(String),
    /// Something the user may want to act on.
    Warning(String),
    /// An operation failed.
    Error(String),
    /// A decrypted chat message.
    Message {
        /// Sender
        from: ClientId,
        /// Plaintext
        text: String,
    },
}

impl Notice {
    /// Returns `true` for notices that belong on stderr.
    #[must_use]
    pub const fn is_problem(&self) -> bool {
        matches!(self, Self::Warning(_) | Self::Error(_))
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info(text) => f.write_str(text),
            Self::Warning(text) => write!(f, "Warning: {text}"),
            Self::Error(text) => write!(f, "Error: {text}"),
            Self::Message { from, text } => write!(f, "[Client_ID {from}] {text}"),
        }
    }
}

// ============================================
// Effects
// ============================================

/// Output of one engine transition.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Effects {
    /// Wire lines for the relay, in order.
    pub outbound: Vec<String>,
    /// User-facing notices, in order.
    pub notices: Vec<Notice>,
}

impl Effects {
    /// Creates empty effects.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a command for the relay.
    pub fn send(&mut self, command: &Command) {
        self.outbound.push(command.to_string());
    }

    /// Adds an info notice.
    pub fn info(&mut self, text: impl Into<String>) {
        self.notices.push(Notice::Info(text.into()));
    }

    /// Adds a warning notice.
    pub fn warn(&mut self, text: impl Into<String>) {
        self.notices.push(Notice::Warning(text.into()));
    }

    /// Adds an error notice.
    pub fn error(&mut self, text: impl Into<String>) {
        self.notices.push(Notice::Error(text.into()));
    }

    /// Appends everything from `other`.
    pub fn extend(&mut self, other: Self) {
        self.outbound.extend(other.outbound);
        self.notices.extend(other.notices);
    }

    /// Returns `true` if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.notices.is_empty()
    }
}
