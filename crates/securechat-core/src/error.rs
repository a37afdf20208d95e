// ============================================
// File: crates/securechat-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines error types specific to command parsing and cryptographic
//! operations in the SecureChat core crate.
//!
//! ## Error Categories
//! 1. **Crypto Errors**: Key handling, signing, tagging, encryption failures
//! 2. **Protocol Errors**: Unknown headers, malformed fields, bad encodings
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include key material in error messages
//! - Callers decide whether a failure earns a `DATA_MESSAGE_ERROR` reply;
//!   use [`CoreError::is_protocol_error`] and [`CoreError::is_crypto_error`]
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use securechat_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for protocol and cryptographic operations.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Cryptographic Errors
    // ========================================

    /// Failed to generate cryptographic key.
    #[error("Key generation failed: {context}")]
    KeyGeneration {
        /// What key was being generated
        context: String,
    },

    /// A key could not be encoded or decoded.
    #[error("Invalid key encoding: {context}")]
    KeyEncoding {
        /// Which key and why
        context: String,
    },

    /// Signature verification failed.
    #[error("Signature verification failed")]
    SignatureVerification,

    /// Signature creation failed.
    #[error("Failed to create signature: {reason}")]
    SignatureCreation {
        /// Why signing failed
        reason: String,
    },

    /// HMAC tag did not match.
    #[error("HMAC tag verification failed")]
    TagVerification,

    /// Key exchange operation failed.
    #[error("Key exchange failed: {reason}")]
    KeyExchange {
        /// Why key exchange failed
        reason: String,
    },

    /// Encryption operation failed.
    #[error("Encryption failed: {context}")]
    Encryption {
        /// What was being encrypted
        context: String,
    },

    /// Decryption operation failed.
    #[error("Decryption failed: {reason}")]
    Decryption {
        /// Why decryption failed
        reason: String,
    },

    // ========================================
    // Protocol Errors
    // ========================================

    /// Header is not part of the command set.
    #[error("Unknown command header: {header}")]
    UnknownCommand {
        /// The header that was received
        header: String,
    },

    /// Command fields are malformed.
    #[error("Malformed {header} command: {reason}")]
    MalformedCommand {
        /// Header of the offending command
        header: String,
        /// What's wrong with it
        reason: String,
    },

    /// A base64 field could not be decoded.
    #[error("Invalid base64 in {field}")]
    InvalidBase64 {
        /// Which field
        field: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `KeyGeneration` error.
    pub fn key_generation(context: impl Into<String>) -> Self {
        Self::KeyGeneration {
            context: context.into(),
        }
    }

    /// Creates a `KeyEncoding` error.
    pub fn key_encoding(context: impl Into<String>) -> Self {
        Self::KeyEncoding {
            context: context.into(),
        }
    }

    /// Creates a `MalformedCommand` error.
    pub fn malformed(header: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedCommand {
            header: header.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidBase64` error.
    pub fn invalid_base64(field: impl Into<String>) -> Self {
        Self::InvalidBase64 {
            field: field.into(),
        }
    }

    /// Creates a `Decryption` error.
    pub fn decryption(reason: impl Into<String>) -> Self {
        Self::Decryption {
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this is a cryptographic error.
    #[must_use]
    pub const fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            Self::KeyGeneration { .. }
                | Self::KeyEncoding { .. }
                | Self::SignatureVerification
                | Self::SignatureCreation { .. }
                | Self::TagVerification
                | Self::KeyExchange { .. }
                | Self::Encryption { .. }
                | Self::Decryption { .. }
        )
    }

    /// Returns `true` if this is a protocol (parsing) error.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownCommand { .. } | Self::MalformedCommand { .. } | Self::InvalidBase64 { .. }
        )
    }

    /// Returns `true` if this error might indicate tampering.
    #[must_use]
    pub const fn is_suspicious(&self) -> bool {
        matches!(
            self,
            Self::SignatureVerification | Self::TagVerification | Self::Decryption { .. }
        )
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
        let err = CoreError::SignatureVerification;
        assert!(err.to_string().contains("Signature"));

        let err = CoreError::malformed("LOGIN", "missing client id");
        assert!(err.to_string().contains("LOGIN"));
        assert!(err.to_string().contains("missing client id"));
    }

    #[test]
    fn test_error_classification() {
        assert!(CoreError::SignatureVerification.is_crypto_error());
        assert!(CoreError::SignatureVerification.is_suspicious());
        assert!(CoreError::TagVerification.is_suspicious());

        let unknown = CoreError::UnknownCommand { header: "HELLO".into() };
        assert!(unknown.is_protocol_error());
        assert!(!unknown.is_crypto_error());
    }

    #[test]
    fn test_common_error_conversion() {
        let common = CommonError::invalid_input("client_id", "bad value");
        let core: CoreError = common.into();
        assert!(matches!(core, CoreError::Common(_)));
    }
}
