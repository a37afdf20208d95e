// ============================================
// File: crates/securechat-core/src/crypto/kdf.rs
// ============================================
//! # Message Key Derivation (Legacy Key Stream)
//!
//! ## Creation Reason
//! Both peers must turn the textual DH shared secret into the same pair of
//! message keys. Deployed clients do this with a seeded 48-bit linear
//! congruential generator, so this module reproduces that stream bit for bit.
//!
//! ## Main Logical Flow
//! ```text
//! shared secret (base64 text)
//!        │  seed = 1 + Σ (signed byte[i]) * (i + 1)
//!        ▼
//! LegacyKeyStream ──draw(32)──► encryption key
//!        │
//!        └────────draw(256)───► authentication key
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Preserved legacy behaviour for wire compatibility. It is NOT a
//!   cryptographic KDF and must not be reused for anything new
//! - Draw order matters: encryption key first, then authentication key,
//!   from one continuous stream
//! - Bytes are signed (`i8`) when computing the seed
//!
//! ## Last Modified
//! v0.1.0 - Initial key stream

use std::fmt;

use zeroize::Zeroizing;

use super::keys::SharedSecret;
use super::{AUTH_KEY_LEN, ENCRYPTION_KEY_LEN};

// ============================================
// Constants
// ============================================

const MULTIPLIER: u64 = 0x5_DEEC_E66D;
const ADDEND: u64 = 0xB;
const MASK: u64 = (1 << 48) - 1;

// ============================================
// LegacyKeyStream
// ============================================

/// Deterministic byte stream seeded from a shared-secret string.
///
/// # Example
/// ```
/// use securechat_core::crypto::LegacyKeyStream;
///
/// let mut a = LegacyKeyStream::from_seed_text("c2hhcmVk");
/// let mut b = LegacyKeyStream::from_seed_text("c2hhcmVk");
/// assert_eq!(a.draw(32), b.draw(32));
/// ```
pub struct LegacyKeyStream {
    state: u64,
}

impl LegacyKeyStream {
    /// Creates a stream from a numeric seed.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn new(seed: i64) -> Self {
        Self {
            state: (seed as u64 ^ MULTIPLIER) & MASK,
        }
    }

    /// Creates a stream seeded from text.
    #[must_use]
    pub fn from_seed_text(text: &str) -> Self {
        Self::new(Self::seed_of(text))
    }

    /// Folds UTF-8 bytes (as signed values) into the numeric seed.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn seed_of(text: &str) -> i64 {
        text.as_bytes()
            .iter()
            .zip(1i64..)
            .fold(1i64, |seed, (&byte, weight)| {
                seed.wrapping_add(i64::from(byte as i8).wrapping_mul(weight))
            })
    }

    /// Next 32 bits of output as a signed integer.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn next_int(&mut self) -> i32 {
        self.state = self.state.wrapping_mul(MULTIPLIER).wrapping_add(ADDEND) & MASK;
        // Top 32 of the 48 state bits
        (self.state >> 16) as u32 as i32
    }

    /// Fills `out`, four bytes per draw, least significant byte first.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn fill(&mut self, out: &mut [u8]) {
        for chunk in out.chunks_mut(4) {
            let mut value = self.next_int();
            for byte in chunk {
                *byte = value as u8;
                value >>= 8;
            }
        }
    }

    /// Draws `len` bytes.
    pub fn draw(&mut self, len: usize) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(vec![0u8; len]);
        self.fill(&mut out);
        out
    }
}

impl fmt::Debug for LegacyKeyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyKeyStream").finish_non_exhaustive()
    }
}

// ============================================
// MessageKeys
// ============================================

/// Encryption and authentication keys derived from one shared secret.
#[derive(Clone)]
pub struct MessageKeys {
    encryption: Zeroizing<Vec<u8>>,
    authentication: Zeroizing<Vec<u8>>,
}

impl MessageKeys {
    /// Derives both keys from a shared secret.
    #[must_use]
    pub fn derive(secret: &SharedSecret) -> Self {
        let mut stream = LegacyKeyStream::from_seed_text(secret.as_text());
        let encryption = stream.draw(ENCRYPTION_KEY_LEN);
        let authentication = stream.draw(AUTH_KEY_LEN);
        Self {
            encryption,
            authentication,
        }
    }

    /// 32-byte AES key.
    #[must_use]
    pub fn encryption_key(&self) -> &[u8] {
        &self.encryption
    }

    /// 256-byte HMAC key.
    #[must_use]
    pub fn authentication_key(&self) -> &[u8] {
        &self.authentication
    }
}

impl fmt::Debug for MessageKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageKeys([REDACTED])")
    }
}

impl PartialEq for MessageKeys {
    fn eq(&self, other: &Self) -> bool {
        self.encryption == other.encryption && self.authentication == other.authentication
    }
}

impl Eq for MessageKeys {}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_matches_reference_generator() {
        // Reference values of the classic 48-bit LCG seeded with 42
        let mut stream = LegacyKeyStream::new(42);
        assert_eq!(stream.next_int(), -1_170_105_035);
        assert_eq!(stream.next_int(), 234_785_527);
        assert_eq!(stream.next_int(), -1_360_544_799);
        assert_eq!(stream.next_int(), 205_897_768);
    }

    #[test]
    fn test_fill_uses_little_endian_chunks() {
        let mut stream = LegacyKeyStream::new(42);
        let bytes = stream.draw(6);
        assert_eq!(bytes.as_slice(), &[53, 157, 65, 186, 247, 138]);
    }

    #[test]
    fn test_partial_chunk_consumes_whole_int() {
        let mut a = LegacyKeyStream::new(7);
        let mut b = LegacyKeyStream::new(7);
        a.draw(3);
        b.draw(4);
        assert_eq!(a.next_int(), b.next_int());
    }

    #[test]
    fn test_seed_of_text() {
        assert_eq!(LegacyKeyStream::seed_of(""), 1);
        assert_eq!(LegacyKeyStream::seed_of("AB"), 1 + 65 + 66 * 2);
        // Non-ASCII bytes count as negative
        assert_eq!(LegacyKeyStream::seed_of("é"), 1 + (0xC3u8 as i8 as i64) + (0xA9u8 as i8 as i64) * 2);
    }

    #[test]
    fn test_message_keys_are_deterministic() {
        let secret = SharedSecret::from_text("q83vASNFZ4mrze8BI0VniavN7wEjRWeJq83vASNFZ4k=");
        let a = MessageKeys::derive(&secret);
        let b = MessageKeys::derive(&secret);
        assert_eq!(a, b);
        assert_eq!(a.encryption_key().len(), 32);
        assert_eq!(a.authentication_key().len(), 256);
    }

    #[test]
    fn test_message_keys_draw_order() {
        let secret = SharedSecret::from_text("c2VjcmV0LXRleHQ=");
        let keys = MessageKeys::derive(&secret);

        let mut stream = LegacyKeyStream::from_seed_text(secret.as_text());
        let first = stream.draw(32);
        let second = stream.draw(256);
        assert_eq!(keys.encryption_key(), first.as_slice());
        assert_eq!(keys.authentication_key(), second.as_slice());
    }

    #[test]
    fn test_different_secrets_give_different_keys() {
        let a = MessageKeys::derive(&SharedSecret::from_text("YWFhYQ=="));
        let b = MessageKeys::derive(&SharedSecret::from_text("YmJiYg=="));
        assert_ne!(a, b);
    }
}
