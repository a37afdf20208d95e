// ============================================
// File: crates/securechat-core/src/crypto/cipher.rs
// ============================================
//! # Message Encryption (AES-256-CBC)
//!
//! ## Creation Reason
//! Encrypts the tagged application message before it is handed to the relay.
//!
//! ## Wire Format
//! ```text
//! base64(iv) ":" base64(AES-256-CBC/PKCS#7(plaintext))
//! ```
//! A fresh random 16-byte IV is drawn for every call.
//!
//! ## ⚠️ Important Note for Next Developer
//! - CBC provides no integrity by itself; the plaintext always carries an
//!   HMAC tag that the receiver checks after decrypting
//!
//! ## Last Modified
//! v0.1.0 - Initial AES-CBC implementation

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

use super::{AES_IV_SIZE, IV_SEPARATOR};
use crate::error::{CoreError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Encrypts UTF-8 text under a 32-byte key.
///
/// # Errors
/// Returns `Encryption` if the key has the wrong length.
pub fn encrypt(key: &[u8], plaintext: &str) -> Result<String> {
    let mut iv = [0u8; AES_IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(key, &iv).map_err(|_| CoreError::Encryption {
        context: format!("AES-256 key must be 32 bytes, got {}", key.len()),
    })?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    Ok(format!(
        "{}{IV_SEPARATOR}{}",
        BASE64.encode(iv),
        BASE64.encode(ciphertext)
    ))
}

/// Decrypts an `iv:ciphertext` string produced by [`encrypt`].
///
/// # Errors
/// Returns `Decryption` when the IV is missing, the padding is invalid or
/// the plaintext is not UTF-8.
pub fn decrypt(key: &[u8], sealed: &str) -> Result<String> {
    let (iv, ciphertext) = sealed
        .split_once(IV_SEPARATOR)
        .ok_or_else(|| CoreError::decryption("IV is not found"))?;
    let iv = BASE64
        .decode(iv)
        .map_err(|_| CoreError::invalid_base64("iv"))?;
    let ciphertext = BASE64
        .decode(ciphertext)
        .map_err(|_| CoreError::invalid_base64("ciphertext"))?;

    let cipher = Aes256CbcDec::new_from_slices(key, &iv)
        .map_err(|_| CoreError::decryption("bad key or IV length"))?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CoreError::decryption("bad padding"))?;

    String::from_utf8(plaintext).map_err(|_| CoreError::decryption("plaintext is not UTF-8"))
}
