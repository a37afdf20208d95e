// ============================================
// File: crates/securechat-core/src/crypto/mac.rs
// ============================================
//! # HMAC-SHA256 Tags
//!
//! ## Creation Reason
//! Authenticates rekey messages (once a shared secret exists) and every
//! application message with the derived authentication key.
//!
//! ## Main Functionality
//! - `generate_tag`: base64 HMAC-SHA256 over UTF-8 text
//! - `verify_tag`: constant-time check of a base64 tag
//!
//! ## Last Modified
//! v0.1.0 - Initial HMAC helpers

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{CoreError, Result};

type HmacSha256 = Hmac<Sha256>;

fn keyed(key: &[u8]) -> Result<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CoreError::key_encoding("hmac key"))
}

/// Computes the base64 HMAC-SHA256 tag of `text` under `key`.
///
/// # Errors
/// Only fails if the MAC backend rejects the key.
pub fn generate_tag(key: &[u8], text: &str) -> Result<String> {
    let mut mac = keyed(key)?;
    mac.update(text.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Verifies a base64 tag over `text`.
///
/// # Errors
/// Returns `TagVerification` on mismatch or an undecodable tag.
pub fn verify_tag(key: &[u8], text: &str, tag: &str) -> Result<()> {
    let expected = BASE64
        .decode(tag.trim())
        .map_err(|_| CoreError::TagVerification)?;
    let mut mac = keyed(key)?;
    mac.update(text.as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| CoreError::TagVerification)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc4231_case_2() {
        // RFC 4231 test case 2
        let tag = generate_tag(b"Jefe", "what do ya want for nothing?").unwrap();
        let raw = BASE64.decode(tag).unwrap();
        assert_eq!(
            hex::encode(raw),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_tag() {
        let key = [7u8; 256];
        let tag = generate_tag(&key, "0 hello").unwrap();
        assert!(verify_tag(&key, "0 hello", &tag).is_ok());
        assert!(matches!(
            verify_tag(&key, "1 hello", &tag),
            Err(CoreError::TagVerification)
        ));
        assert!(verify_tag(&[8u8; 256], "0 hello", &tag).is_err());
        assert!(verify_tag(&key, "0 hello", "%%%").is_err());
    }
}
