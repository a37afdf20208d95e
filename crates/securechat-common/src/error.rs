// ============================================
// File: crates/securechat-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Provides the error type for the shared value types (client ids and
//! timestamps) that every SecureChat crate parses.
//!
//! ## Main Functionality
//! - `CommonError`: Base error enum for common operations
//! - `Result<T>`: Type alias using `CommonError`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never include key material in error messages
//! - Crate-level errors wrap `CommonError` with `#[from]`
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Common result type for operations that may fail.
pub type Result<T> = std::result::Result<T, CommonError>;

// ============================================
// CommonError
// ============================================

/// Common error types shared across SecureChat crates.
///
/// Only parsing of shared value types fails at this level; storage and
/// crypto failures belong to the crates that own them.
///
/// # Example
/// ```
/// use securechat_common::error::{CommonError, Result};
///
/// fn validate_name(name: &str) -> Result<()> {
///     if name.is_empty() {
///         return Err(CommonError::invalid_input("name", "cannot be empty"));
///     }
///     Ok(())
/// }
///
/// assert!(validate_name("").is_err());
/// ```
#[derive(Error, Debug)]
pub enum CommonError {
    // ========================================
    // Validation Errors
    // ========================================

    /// Invalid input data provided.
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the field or parameter
        field: String,
        /// Description of what's wrong
        reason: String,
    },
}

impl CommonError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error was caused by bad input from the caller.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput { .. })
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
        let err = CommonError::invalid_input("client_id", "must be a positive integer");
        assert!(err.to_string().contains("client_id"));
        assert!(err.to_string().contains("positive integer"));
    }

    #[test]
    fn test_error_classification() {
        let client_err = CommonError::invalid_input("client_id", "0");
        assert!(client_err.is_client_error());
    }
}
