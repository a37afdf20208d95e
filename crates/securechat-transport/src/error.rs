// ============================================
// File: crates/securechat-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines error types specific to the line-framed stream transport:
//! binding, connecting, reading lines and feeding the writer queue.
//!
//! ## Main Functionality
//! - `TransportError`: Primary error enum for transport operations
//! - Error conversion from system errors
//! - Categorization of retryable vs fatal errors
//!
//! ## Error Categories
//! 1. **Setup Errors**: Bind/connect failures, invalid addresses (fatal at startup)
//! 2. **Stream Errors**: Disconnects, oversized or non-UTF-8 lines
//! 3. **Queue Errors**: Writer task gone
//!
//! ## ⚠️ Important Note for Next Developer
//! - A stream error ends ONE connection, never the process
//! - Only setup errors should abort startup
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use securechat_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Setup Errors
    // ========================================

    /// Failed to bind to address.
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed {
        /// Address we tried to bind to
        addr: SocketAddr,
        /// Why binding failed
        reason: String,
    },

    /// Address already in use.
    #[error("Address {addr} already in use")]
    AddressInUse {
        /// The address that's in use
        addr: SocketAddr,
    },

    /// Failed to connect to a server.
    #[error("Failed to connect to {addr}: {reason}")]
    ConnectFailed {
        /// Address we tried to reach
        addr: String,
        /// Why connecting failed
        reason: String,
    },

    /// Invalid socket address.
    #[error("Invalid address: {addr}")]
    InvalidAddress {
        /// The invalid address string
        addr: String,
    },

    // ========================================
    // Stream Errors
    // ========================================

    /// Peer closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Line exceeded the configured limit.
    #[error("Line exceeds {limit} bytes")]
    LineTooLong {
        /// Maximum accepted line length
        limit: usize,
    },

    /// Line was not valid UTF-8.
    #[error("Received line is not valid UTF-8")]
    InvalidUtf8,

    /// Outbound queue is closed (writer task stopped).
    #[error("Send failed: {reason}")]
    SendFailed {
        /// Why the line could not be queued
        reason: String,
    },

    /// Operation timed out.
    #[error("Operation timed out: {operation}")]
    Timeout {
        /// What operation timed out
        operation: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `BindFailed` error.
    pub fn bind_failed(addr: SocketAddr, reason: impl Into<String>) -> Self {
        Self::BindFailed {
            addr,
            reason: reason.into(),
        }
    }

    /// Creates a `ConnectFailed` error.
    pub fn connect_failed(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `SendFailed` error.
    pub fn send_failed(reason: impl Into<String>) -> Self {
        Self::SendFailed {
            reason: reason.into(),
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error is transient and retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Returns `true` if the remote side is gone.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionClosed | Self::SendFailed { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    /// Returns `true` if this error should abort startup.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::BindFailed { .. }
                | Self::AddressInUse { .. }
                | Self::ConnectFailed { .. }
                | Self::InvalidAddress { .. }
        )
    }
}

// ============================================
// Standard Error Conversions
// ============================================

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidData => Self::InvalidUtf8,
            io::ErrorKind::UnexpectedEof => Self::ConnectionClosed,
            _ => Self::io("I/O operation", err),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let addr: SocketAddr = "127.0.0.1:35360".parse().unwrap();
        let err = TransportError::bind_failed(addr, "permission denied");
        assert!(err.to_string().contains("35360"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_error_classification() {
        assert!(TransportError::ConnectionClosed.is_disconnect());
        assert!(!TransportError::ConnectionClosed.is_fatal());
        assert!(TransportError::connect_failed("localhost:1", "refused").is_fatal());
        assert!(TransportError::Timeout {
            operation: "connect".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: TransportError = io::Error::new(io::ErrorKind::WouldBlock, "would block").into();
        assert!(err.is_retryable());

        let err: TransportError = io::Error::new(io::ErrorKind::InvalidData, "utf8").into();
        assert!(matches!(err, TransportError::InvalidUtf8));

        let err = TransportError::io(
            "reading",
            io::Error::new(io::ErrorKind::ConnectionReset, "reset"),
        );
        assert!(err.is_disconnect());
    }
}
