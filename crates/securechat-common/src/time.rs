// ============================================
// File: crates/securechat-common/src/time.rs
// ============================================
//! # Time Utilities
//!
//! ## Creation Reason
//! Provides the millisecond wall-clock timestamps carried in login and
//! renewal challenges and used to age out abandoned signups.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Challenge timestamps are milliseconds, not seconds
//!
//! ## Last Modified
//! v0.1.0 - Initial time utilities

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

// ============================================
// Timestamp
// ============================================

/// Unix timestamp in milliseconds.
///
/// # Purpose
/// The second half of every `(nonce, timestamp)` challenge, and the
/// signup time used to decide whether an un-logged-in registration has
/// been abandoned.
///
/// # Example
/// ```
/// use securechat_common::time::Timestamp;
/// use std::time::Duration;
///
/// let earlier = Timestamp::from_millis(1_000);
/// let later = Timestamp::from_millis(4_500);
/// assert_eq!(later.since(earlier), Duration::from_millis(3_500));
/// assert_eq!(later.to_string(), "4500");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from Unix milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Creates a timestamp for the current time.
    ///
    /// A clock set before the epoch reads as `0`.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX));
        Self(millis)
    }

    /// Returns the Unix timestamp in milliseconds.
    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`; zero if `earlier` is later.
    #[must_use]
    pub fn since(&self, earlier: Timestamp) -> Duration {
        u64::try_from(self.0.saturating_sub(earlier.0))
            .map_or(Duration::ZERO, Duration::from_millis)
    }

    /// Time elapsed between this timestamp and now.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Self::now().since(*self)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Timestamp {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Self)
            .map_err(|_| CommonError::invalid_input("timestamp", format!("not a number: {s:?}")))
    }
}

impl From<i64> for Timestamp {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

impl From<Timestamp> for i64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_now_is_millis() {
        let ts = Timestamp::now();
        // Anything after 2020-01-01 in milliseconds
        assert!(ts.as_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_timestamp_since_saturates() {
        let a = Timestamp::from_millis(10_000);
        let b = Timestamp::from_millis(2_000);
        assert_eq!(a.since(b), Duration::from_millis(8_000));
        assert_eq!(b.since(a), Duration::ZERO);
    }

    #[test]
    fn test_timestamp_text_roundtrip() {
        let ts: Timestamp = "1700000000123".parse().unwrap();
        assert_eq!(ts.as_millis(), 1_700_000_000_123);
        assert_eq!(ts.to_string(), "1700000000123");
        assert!("soon".parse::<Timestamp>().is_err());
    }
}
