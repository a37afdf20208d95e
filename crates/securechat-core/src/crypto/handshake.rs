// ============================================
// File: crates/securechat-core/src/crypto/handshake.rs
// ============================================
//! # Authentication Challenge Cryptography
//!
//! ## Creation Reason
//! Login and key renewal are both challenge-response exchanges over the
//! same `(nonce, timestamp)` pair. This module owns the signed text, the
//! proof construction on the client and the verification on the server.
//!
//! ## Handshake Flow
//! ```text
//! Client                                          Server
//!   │  LOGIN <id>  ───────────────────────────────► │  lookup public key
//!   │ ◄──────────────── LOGIN_NONCE <nonce> <ts>    │
//!   │  sign("{nonce} {ts}")                         │
//!   │  LOGIN_ACCEPT <sig> ────────────────────────► │  verify
//!   │ ◄──────────────────── LOGIN_SUCCESS/FAILURE   │
//!
//!   │  RENEW_KEY_REQUEST ─────────────────────────► │
//!   │ ◄──────── RENEW_KEY_REQUEST_OK <nonce> <ts>   │
//!   │  old_sig = sign_old(new_public_key)           │
//!   │  new_sig = sign_new("{nonce} {ts}")           │
//!   │  RENEW_KEY <old_sig> <new_pk> <new_sig> ────► │  verify both
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Challenges are single-use; the server overwrites, never queues them
//! - Both renewal signatures must verify before anything is stored
//!
//! ## Last Modified
//! v0.1.0 - Initial challenge crypto

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use tracing::debug;

use securechat_common::time::Timestamp;

use crate::crypto::keys::{IdentityKeyPair, IdentityPublicKey};
use crate::error::{CoreError, Result};

// ============================================
// Challenge
// ============================================

/// A single-use `(nonce, timestamp)` login or renewal challenge.
///
/// # Example
/// ```
/// use securechat_core::crypto::Challenge;
///
/// let challenge: Challenge = "-17 1700000000000".parse().unwrap();
/// assert_eq!(challenge.signing_text(), "-17 1700000000000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge {
    /// Random 64-bit nonce
    pub nonce: i64,
    /// Issue time in Unix milliseconds
    pub timestamp: Timestamp,
}

impl Challenge {
    /// Issues a fresh challenge.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            nonce: rand::thread_rng().gen(),
            timestamp: Timestamp::now(),
        }
    }

    /// The exact text both sides sign and verify.
    #[must_use]
    pub fn signing_text(&self) -> String {
        format!("{} {}", self.nonce, self.timestamp)
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.nonce, self.timestamp)
    }
}

impl FromStr for Challenge {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (nonce, timestamp) = s
            .trim()
            .split_once(' ')
            .ok_or_else(|| CoreError::malformed("challenge", "expected <nonce> <timestamp>"))?;
        let nonce = nonce
            .parse()
            .map_err(|_| CoreError::malformed("challenge", "nonce is not a number"))?;
        let timestamp = timestamp.parse()?;
        Ok(Self { nonce, timestamp })
    }
}

// ============================================
// RenewalProof
// ============================================

/// The three fields of a `RENEW_KEY` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalProof {
    /// Signature over the new public key text, by the OLD private key
    pub old_signature: String,
    /// The new public key (base64)
    pub new_public_key: String,
    /// Signature over the challenge text, by the NEW private key
    pub new_signature: String,
}

impl RenewalProof {
    /// Builds a proof that `current` hands over to `replacement`.
    ///
    /// # Errors
    /// Propagates signing failures.
    pub fn create(
        current: &IdentityKeyPair,
        replacement: &IdentityKeyPair,
        challenge: &Challenge,
    ) -> Result<Self> {
        let new_public_key = replacement.public_key().as_base64().to_string();
        Ok(Self {
            old_signature: current.sign(&new_public_key)?,
            new_signature: replacement.sign(&challenge.signing_text())?,
            new_public_key,
        })
    }
}

// ============================================
// ChallengeCrypto Trait
// ============================================

/// Server-side verification of challenge responses.
///
/// Abstracted so the auth service can be exercised with alternative backends.
pub trait ChallengeCrypto: Send + Sync {
    /// Checks a `LOGIN_ACCEPT` signature against the registered key.
    ///
    /// # Errors
    /// `SignatureVerification` or a key parsing error.
    fn verify_login(
        &self,
        registered_key: &str,
        challenge: &Challenge,
        signature: &str,
    ) -> Result<()>;

    /// Checks both renewal signatures; returns the parsed new key on success.
    ///
    /// # Errors
    /// `SignatureVerification` if either signature fails.
    fn verify_renewal(
        &self,
        registered_key: &str,
        challenge: &Challenge,
        proof: &RenewalProof,
    ) -> Result<IdentityPublicKey>;
}

// ============================================
// DefaultChallengeCrypto
// ============================================

/// RSA/SHA-256 implementation of [`ChallengeCrypto`].
#[derive(Debug, Default, Clone)]
pub struct DefaultChallengeCrypto;

impl DefaultChallengeCrypto {
    /// Creates a new instance.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ChallengeCrypto for DefaultChallengeCrypto {
    fn verify_login(
        &self,
        registered_key: &str,
        challenge: &Challenge,
        signature: &str,
    ) -> Result<()> {
        let key = IdentityPublicKey::from_base64(registered_key)?;
        key.verify(&challenge.signing_text(), signature)?;
        debug!(key = %key.fingerprint(), "Login signature verified");
        Ok(())
    }

    fn verify_renewal(
        &self,
        registered_key: &str,
        challenge: &Challenge,
        proof: &RenewalProof,
    ) -> Result<IdentityPublicKey> {
        let current = IdentityPublicKey::from_base64(registered_key)?;
        // Chain of custody: old key vouches for the new one
        current.verify(&proof.new_public_key, &proof.old_signature)?;

        let replacement = IdentityPublicKey::from_base64(&proof.new_public_key)?;
        // Freshness: new key answers this challenge
        replacement.verify(&challenge.signing_text(), &proof.new_signature)?;

        debug!(
            old = %current.fingerprint(),
            new = %replacement.fingerprint(),
            "Renewal proof verified"
        );
        Ok(replacement)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::tests::{other_identity, test_identity};

    #[test]
    fn test_challenge_text_roundtrip() {
        let challenge = Challenge::generate();
        let parsed: Challenge = challenge.to_string().parse().unwrap();
        assert_eq!(parsed, challenge);
        assert_eq!(parsed.signing_text(), challenge.to_string());
    }

    #[test]
    fn test_challenge_parse_errors() {
        assert!("123".parse::<Challenge>().is_err());
        assert!("abc 123".parse::<Challenge>().is_err());
        assert!("123 abc".parse::<Challenge>().is_err());
    }

    #[test]
    fn test_login_verification() {
        let identity = test_identity();
        let challenge = Challenge::generate();
        let signature = identity.sign(&challenge.signing_text()).unwrap();
        let crypto = DefaultChallengeCrypto::new();

        assert!(crypto
            .verify_login(identity.public_key().as_base64(), &challenge, &signature)
            .is_ok());

        // Another key fails
        assert!(matches!(
            crypto.verify_login(other_identity().public_key().as_base64(), &challenge, &signature),
            Err(CoreError::SignatureVerification)
        ));

        // Stale challenge fails
        let fresh = Challenge {
            nonce: challenge.nonce.wrapping_add(1),
            ..challenge
        };
        assert!(crypto
            .verify_login(identity.public_key().as_base64(), &fresh, &signature)
            .is_err());
    }

    #[test]
    fn test_renewal_verification() {
        let current = test_identity();
        let replacement = other_identity();
        let challenge = Challenge::generate();
        let crypto = DefaultChallengeCrypto::new();

        let proof = RenewalProof::create(&current, &replacement, &challenge).unwrap();
        let new_key = crypto
            .verify_renewal(current.public_key().as_base64(), &challenge, &proof)
            .unwrap();
        assert_eq!(&new_key, replacement.public_key());
    }

    #[test]
    fn test_renewal_rejects_either_bad_signature() {
        let current = test_identity();
        let replacement = other_identity();
        let challenge = Challenge::generate();
        let crypto = DefaultChallengeCrypto::new();
        let proof = RenewalProof::create(&current, &replacement, &challenge).unwrap();

        // Old signature made by the wrong key
        let forged_old = RenewalProof {
            old_signature: replacement.sign(&proof.new_public_key).unwrap(),
            ..proof.clone()
        };
        assert!(crypto
            .verify_renewal(current.public_key().as_base64(), &challenge, &forged_old)
            .is_err());

        // New signature over a different challenge
        let other_challenge = Challenge {
            nonce: challenge.nonce.wrapping_add(1),
            ..challenge
        };
        let stale_new = RenewalProof {
            new_signature: replacement.sign(&other_challenge.signing_text()).unwrap(),
            ..proof
        };
        assert!(crypto
            .verify_renewal(current.public_key().as_base64(), &challenge, &stale_new)
            .is_err());
    }
}
