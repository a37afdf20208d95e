// ============================================
// File: crates/securechat-core/src/crypto/keys.rs
// ============================================
//! # Cryptographic Key Types
//!
//! ## Creation Reason
//! Defines key types used throughout the SecureChat protocol with their
//! text encodings fixed in one place.
//!
//! ## Main Functionality
//! - `IdentityKeyPair`: Long-term RSA signing keys
//! - `IdentityPublicKey`: Shareable half, as registered with the server
//! - `EphemeralKeyPair`: Per-rekey X25519 key exchange keys
//! - `SharedSecret`: Base64 text of a completed exchange
//!
//! ## Key Lifecycle
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  IdentityKeyPair (Long-term)                               │
//! │  ├─ Generated at signup, replaced on renewal               │
//! │  ├─ Signs login/renewal challenges                         │
//! │  └─ Signs the first key exchange with each peer            │
//! │                                                            │
//! │  EphemeralKeyPair (Per-rekey)                              │
//! │  ├─ Generated fresh for every DH step                      │
//! │  └─ Consumed by `exchange`                                 │
//! │                                                            │
//! │  SharedSecret (Per-rekey)                                  │
//! │  ├─ Seeds the message key stream                           │
//! │  └─ Dropped when the next secret is installed              │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Encodings
//! - RSA public key: base64(DER SubjectPublicKeyInfo)
//! - RSA private key: base64(DER PKCS#8)
//! - Signatures: base64(PKCS#1 v1.5 over SHA-256)
//! - X25519 public key: base64(32 raw bytes)
//!
//! ## ⚠️ Important Note for Next Developer
//! - Private keys should NEVER be logged
//! - `Debug` impls print fingerprints only
//!
//! ## Last Modified
//! v0.1.0 - Initial key type definitions

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};
use zeroize::Zeroizing;

use super::X25519_PUBLIC_KEY_SIZE;
use crate::error::{CoreError, Result};

// ============================================
// IdentityKeyPair (RSA)
// ============================================

/// Long-term RSA identity key pair.
///
/// # Example
/// ```no_run
/// use securechat_core::crypto::IdentityKeyPair;
///
/// let identity = IdentityKeyPair::generate(2048).unwrap();
/// let signature = identity.sign("123 1700000000000").unwrap();
/// assert!(identity
///     .public_key()
///     .verify("123 1700000000000", &signature)
///     .is_ok());
/// ```
#[derive(Clone)]
pub struct IdentityKeyPair {
    private_key: RsaPrivateKey,
    public_key: IdentityPublicKey,
}

impl IdentityKeyPair {
    /// Generates a new random identity key pair of `bits` size.
    ///
    /// # Errors
    /// Returns `KeyGeneration` if the RSA backend rejects the size.
    pub fn generate(bits: usize) -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CoreError::key_generation(format!("RSA-{bits}: {e}")))?;
        Self::from_private_key(private_key)
    }

    /// Restores a key pair from base64 PKCS#8 DER.
    ///
    /// # Errors
    /// Returns `KeyEncoding` if the text is not a valid RSA private key.
    pub fn from_pkcs8_base64(encoded: &str) -> Result<Self> {
        let der = Zeroizing::new(
            BASE64
                .decode(encoded.trim())
                .map_err(|_| CoreError::invalid_base64("private key"))?,
        );
        let private_key = RsaPrivateKey::from_pkcs8_der(&der)
            .map_err(|e| CoreError::key_encoding(format!("private key: {e}")))?;
        Self::from_private_key(private_key)
    }

    fn from_private_key(private_key: RsaPrivateKey) -> Result<Self> {
        let public_key = IdentityPublicKey::from_rsa(private_key.to_public_key())?;
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Exports the private key as base64 PKCS#8 DER for the local store.
    ///
    /// # Errors
    /// Returns `KeyEncoding` if DER encoding fails.
    pub fn to_pkcs8_base64(&self) -> Result<Zeroizing<String>> {
        let der = self
            .private_key
            .to_pkcs8_der()
            .map_err(|e| CoreError::key_encoding(format!("private key: {e}")))?;
        Ok(Zeroizing::new(BASE64.encode(der.as_bytes())))
    }

    /// Returns the public key component.
    #[must_use]
    pub fn public_key(&self) -> &IdentityPublicKey {
        &self.public_key
    }

    /// Signs UTF-8 text, returning a base64 signature.
    ///
    /// # Errors
    /// Returns `SignatureCreation` if the RSA operation fails.
    pub fn sign(&self, text: &str) -> Result<String> {
        let signature = SigningKey::<Sha256>::new(self.private_key.clone())
            .try_sign(text.as_bytes())
            .map_err(|e| CoreError::SignatureCreation {
                reason: e.to_string(),
            })?;
        Ok(BASE64.encode(signature.to_bytes()))
    }

    /// Decrypts a base64 PKCS#1 v1.5 ciphertext addressed to this identity.
    ///
    /// # Errors
    /// Returns `Decryption` if the ciphertext is invalid for this key.
    pub fn decrypt(&self, ciphertext: &str) -> Result<Zeroizing<Vec<u8>>> {
        let bytes = BASE64
            .decode(ciphertext.trim())
            .map_err(|_| CoreError::invalid_base64("ciphertext"))?;
        self.private_key
            .decrypt(Pkcs1v15Encrypt, &bytes)
            .map(Zeroizing::new)
            .map_err(|e| CoreError::decryption(e.to_string()))
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print private key material
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

// ============================================
// IdentityPublicKey
// ============================================

/// Public component of an RSA identity key.
///
/// Keeps the exact base64 text it was parsed from, since that text is what
/// gets registered, compared against the trust list and signed during renewal.
#[derive(Clone)]
pub struct IdentityPublicKey {
    key: RsaPublicKey,
    encoded: String,
}

impl IdentityPublicKey {
    fn from_rsa(key: RsaPublicKey) -> Result<Self> {
        let der = key
            .to_public_key_der()
            .map_err(|e| CoreError::key_encoding(format!("public key: {e}")))?;
        Ok(Self {
            key,
            encoded: BASE64.encode(der.as_bytes()),
        })
    }

    /// Parses a base64 SubjectPublicKeyInfo.
    ///
    /// # Errors
    /// Returns `InvalidBase64` or `KeyEncoding` on bad input.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        let der = BASE64
            .decode(encoded)
            .map_err(|_| CoreError::invalid_base64("public key"))?;
        let key = RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| CoreError::key_encoding(format!("public key: {e}")))?;
        Ok(Self {
            key,
            encoded: encoded.to_string(),
        })
    }

    /// Returns the base64 text form.
    #[must_use]
    pub fn as_base64(&self) -> &str {
        &self.encoded
    }

    /// Short hex fingerprint for logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.encoded.as_bytes());
        hex::encode(&digest[..8])
    }

    /// Verifies a base64 signature over UTF-8 text.
    ///
    /// # Errors
    /// Returns `SignatureVerification` if the signature does not match,
    /// `InvalidBase64` if it cannot be decoded.
    pub fn verify(&self, text: &str, signature: &str) -> Result<()> {
        let bytes = BASE64
            .decode(signature.trim())
            .map_err(|_| CoreError::invalid_base64("signature"))?;
        let signature =
            Signature::try_from(bytes.as_slice()).map_err(|_| CoreError::SignatureVerification)?;
        VerifyingKey::<Sha256>::new(self.key.clone())
            .verify(text.as_bytes(), &signature)
            .map_err(|_| CoreError::SignatureVerification)
    }

    /// Encrypts bytes to this identity, returning base64 PKCS#1 v1.5 ciphertext.
    ///
    /// # Errors
    /// Returns `Encryption` if the message is too long for the key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let ciphertext = self
            .key
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext)
            .map_err(|e| CoreError::Encryption {
                context: e.to_string(),
            })?;
        Ok(BASE64.encode(ciphertext))
    }
}

impl PartialEq for IdentityPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for IdentityPublicKey {}

impl fmt::Debug for IdentityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityPublicKey({}...)", self.fingerprint())
    }
}

impl fmt::Display for IdentityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

// ============================================
// EphemeralKeyPair (X25519)
// ============================================

/// Ephemeral X25519 key pair for one ratchet step.
///
/// # Example
/// ```
/// use securechat_core::crypto::EphemeralKeyPair;
///
/// let alice = EphemeralKeyPair::generate();
/// let bob = EphemeralKeyPair::generate();
///
/// let alice_public = alice.public_key_base64();
/// let bob_public = bob.public_key_base64();
///
/// let alice_shared = alice.exchange(&bob_public).unwrap();
/// let bob_shared = bob.exchange(&alice_public).unwrap();
/// assert_eq!(alice_shared, bob_shared);
/// ```
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    /// Generates a new random ephemeral key pair.
    #[must_use]
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Returns the public key as base64.
    #[must_use]
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.public.as_bytes())
    }

    /// Completes the exchange with the peer's base64 public key.
    ///
    /// Consumes the key pair so the private half cannot be reused.
    ///
    /// # Errors
    /// Returns `InvalidBase64`/`KeyExchange` if the peer key is malformed.
    pub fn exchange(self, peer_public: &str) -> Result<SharedSecret> {
        let bytes = BASE64
            .decode(peer_public.trim())
            .map_err(|_| CoreError::invalid_base64("ephemeral public key"))?;
        let bytes: [u8; X25519_PUBLIC_KEY_SIZE] =
            bytes.as_slice().try_into().map_err(|_| CoreError::KeyExchange {
                reason: format!(
                    "ephemeral public key must be {X25519_PUBLIC_KEY_SIZE} bytes, got {}",
                    bytes.len()
                ),
            })?;
        let shared = self.secret.diffie_hellman(&X25519PublicKey::from(bytes));
        if !shared.was_contributory() {
            return Err(CoreError::KeyExchange {
                reason: "non-contributory peer key".into(),
            });
        }
        Ok(SharedSecret(Zeroizing::new(BASE64.encode(shared.as_bytes()))))
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.public.as_bytes();
        f.debug_struct("EphemeralKeyPair")
            .field(
                "public",
                &format_args!("{:02x}{:02x}{:02x}{:02x}...", bytes[0], bytes[1], bytes[2], bytes[3]),
            )
            .finish_non_exhaustive()
    }
}

// ============================================
// SharedSecret
// ============================================

/// Result of a DH exchange in its textual (base64) form.
///
/// The text, not the raw bytes, seeds the message key stream.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedSecret(Zeroizing<String>);

impl SharedSecret {
    /// Wraps an existing base64 secret text.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self(Zeroizing::new(text.into()))
    }

    /// Returns the base64 text.
    #[must_use]
    pub fn as_text(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret([REDACTED])")
    }
}

// ============================================
// Tests
// ============================================
