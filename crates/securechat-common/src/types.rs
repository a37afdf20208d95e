// ============================================
// File: crates/securechat-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the identifier type used throughout the relay so that the
//! router, the identity directory and the client-side trust and block lists
//! all agree on one representation.
//!
//! ## Main Functionality
//! - `ClientId`: Server-assigned integer identity of a registered client
//!
//! ## Main Logical Flow
//! 1. The server directory assigns the next id on signup
//! 2. Ids travel as decimal text in every command frame
//! 3. Used as keys in the router, trust list and block list
//!
//! ## ⚠️ Important Note for Next Developer
//! - Ids are strictly positive; `0` is reserved as "no peer selected"
//! - The wire form is always decimal
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

// ============================================
// ClientId
// ============================================

/// Server-assigned identity of a registered client.
///
/// # Wire Format
/// Decimal text, e.g. `LOGIN 12`.
///
/// # Example
/// ```
/// use securechat_common::types::ClientId;
///
/// let id: ClientId = "12".parse().unwrap();
/// assert_eq!(id.get(), 12);
/// assert_eq!(id.to_string(), "12");
/// assert!("0".parse::<ClientId>().is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u32);

impl ClientId {
    /// Creates a client id, returning `None` for the reserved value `0`.
    #[must_use]
    pub const fn new(value: u32) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the id that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The first id handed out by an empty directory.
    pub const FIRST: Self = Self(1);
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClientId {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s
            .trim()
            .parse()
            .map_err(|_| CommonError::invalid_input("client_id", format!("not a number: {s:?}")))?;
        Self::new(value)
            .ok_or_else(|| CommonError::invalid_input("client_id", "must be greater than zero"))
    }
}

impl From<ClientId> for u32 {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

impl TryFrom<u32> for ClientId {
    type Error = CommonError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
            .ok_or_else(|| CommonError::invalid_input("client_id", "must be greater than zero"))
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_parse() {
        let id: ClientId = "42".parse().unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_client_id_rejects_zero_and_garbage() {
        assert!("0".parse::<ClientId>().is_err());
        assert!("-3".parse::<ClientId>().is_err());
        assert!("abc".parse::<ClientId>().is_err());
        assert!("".parse::<ClientId>().is_err());
        assert!(ClientId::new(0).is_none());
    }

    #[test]
    fn test_client_id_next() {
        assert_eq!(ClientId::FIRST.next().get(), 2);
    }

    #[test]
    fn test_client_id_serde_is_plain_number() {
        let id = ClientId::new(7).unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        let restored: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, id);
    }
}
