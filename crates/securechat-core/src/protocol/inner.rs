// ============================================
// File: crates/securechat-core/src/protocol/inner.rs
// ============================================
//! # Inner (Peer-to-Peer) Messages
//!
//! ## Creation Reason
//! The payload of a `SEND` command is opaque to the relay but structured
//! between the two clients: key-exchange steps of the ratchet, sealed
//! application messages, and an error marker.
//!
//! ## Inner Forms
//! ```text
//! DATA_DH_START         <signature> <seq> <x25519 pub>   first exchange, RSA
//! DATA_DH_START_ACCEPT  <signature> <seq> <x25519 pub>
//! DATA_DH_CHANGE        <hmac tag>  <seq> <x25519 pub>   rekey, HMAC
//! DATA_DH_CHANGE_ACCEPT <hmac tag>  <seq> <x25519 pub>
//! DATA                  <iv>:<ciphertext>
//!                        └─ plaintext "<hmac tag> <seq> <message>"
//! DATA_MESSAGE_ERROR
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The authenticated text of a key exchange is `"{seq} {pub}"`, and of a
//!   data message `"{seq} {message}"`; see [`key_exchange_text`] and
//!   [`TaggedMessage::authenticated_text`]
//! - Messages may contain spaces; only the first two separators split
//!
//! ## Last Modified
//! v0.1.0 - Initial inner message definitions

use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Header of a sealed data message.
pub const DATA_HEADER: &str = "DATA";

/// Header of the error marker.
pub const DATA_MESSAGE_ERROR_HEADER: &str = "DATA_MESSAGE_ERROR";

// ============================================
// KeyExchangeKind
// ============================================

/// Which step of the ratchet a key-exchange message is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyExchangeKind {
    /// Opens the first exchange (RSA signed).
    Start,
    /// Answers a `Start` (RSA signed).
    StartAccept,
    /// Opens a rekey (HMAC tagged).
    Change,
    /// Answers a `Change` (HMAC tagged).
    ChangeAccept,
}

impl KeyExchangeKind {
    /// Selects the kind for an outgoing step.
    ///
    /// `has_secret` picks the HMAC variants; `accept` picks the reply variants.
    #[must_use]
    pub const fn select(has_secret: bool, accept: bool) -> Self {
        match (has_secret, accept) {
            (false, false) => Self::Start,
            (false, true) => Self::StartAccept,
            (true, false) => Self::Change,
            (true, true) => Self::ChangeAccept,
        }
    }

    /// Wire spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "DATA_DH_START",
            Self::StartAccept => "DATA_DH_START_ACCEPT",
            Self::Change => "DATA_DH_CHANGE",
            Self::ChangeAccept => "DATA_DH_CHANGE_ACCEPT",
        }
    }

    /// Exact lookup of a header token.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Start, Self::StartAccept, Self::Change, Self::ChangeAccept]
            .into_iter()
            .find(|kind| kind.as_str() == name)
    }

    /// `true` for the HMAC-authenticated rekey steps.
    #[must_use]
    pub const fn is_rekey(&self) -> bool {
        matches!(self, Self::Change | Self::ChangeAccept)
    }

    /// `true` for the reply steps.
    #[must_use]
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::StartAccept | Self::ChangeAccept)
    }
}

impl fmt::Display for KeyExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text covered by a key-exchange signature or tag.
#[must_use]
pub fn key_exchange_text(sequence: u64, public_key: &str) -> String {
    format!("{sequence} {public_key}")
}

// ============================================
// InnerMessage
// ============================================

/// Payload carried inside `SEND <peer> <payload>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InnerMessage {
    /// One step of the DH ratchet.
    KeyExchange {
        /// Step kind
        kind: KeyExchangeKind,
        /// Base64 RSA signature or HMAC tag over [`key_exchange_text`]
        proof: String,
        /// Sender's sequence number
        sequence: u64,
        /// Base64 X25519 public key
        public_key: String,
    },
    /// Sealed application message, `iv:ciphertext`.
    Data {
        /// AES-CBC output
        sealed: String,
    },
    /// Error marker sent when a frame was refused.
    MessageError,
}

impl fmt::Display for InnerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyExchange {
                kind,
                proof,
                sequence,
                public_key,
            } => write!(f, "{kind} {proof} {sequence} {public_key}"),
            Self::Data { sealed } => write!(f, "{DATA_HEADER} {sealed}"),
            Self::MessageError => f.write_str(DATA_MESSAGE_ERROR_HEADER),
        }
    }
}

impl FromStr for InnerMessage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (header, data) = match s.split_once(' ') {
            Some((header, data)) => (header, Some(data)),
            None => (s, None),
        };

        if header == DATA_MESSAGE_ERROR_HEADER {
            return Ok(Self::MessageError);
        }

        if header == DATA_HEADER {
            let sealed = data
                .filter(|d| !d.is_empty())
                .ok_or_else(|| CoreError::malformed(DATA_HEADER, "missing ciphertext"))?;
            return Ok(Self::Data {
                sealed: sealed.to_string(),
            });
        }

        let kind = KeyExchangeKind::from_name(header).ok_or_else(|| CoreError::UnknownCommand {
            header: header.to_string(),
        })?;
        let mut fields = data.unwrap_or_default().splitn(3, ' ');
        let (Some(proof), Some(sequence), Some(public_key)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(CoreError::malformed(kind.as_str(), "expected <proof> <seq> <key>"));
        };
        if proof.is_empty() || public_key.is_empty() {
            return Err(CoreError::malformed(kind.as_str(), "empty field"));
        }
        let sequence = sequence
            .parse()
            .map_err(|_| CoreError::malformed(kind.as_str(), "sequence is not a number"))?;

        Ok(Self::KeyExchange {
            kind,
            proof: proof.to_string(),
            sequence,
            public_key: public_key.to_string(),
        })
    }
}

// ============================================
// TaggedMessage
// ============================================

/// Decrypted body of a `DATA` message: `"<tag> <seq> <message>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedMessage {
    /// Base64 HMAC over [`TaggedMessage::authenticated_text`]
    pub tag: String,
    /// Sender's sequence number
    pub sequence: u64,
    /// User text
    pub message: String,
}

impl TaggedMessage {
    /// Text covered by the tag.
    #[must_use]
    pub fn authenticated_text(&self) -> String {
        Self::text_for(self.sequence, &self.message)
    }

    /// Text covered by the tag of a message not built yet.
    #[must_use]
    pub fn text_for(sequence: u64, message: &str) -> String {
        format!("{sequence} {message}")
    }
}

impl fmt::Display for TaggedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.tag, self.sequence, self.message)
    }
}

impl FromStr for TaggedMessage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let mut fields = s.splitn(3, ' ');
        let (Some(tag), Some(sequence), Some(message)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(CoreError::malformed(DATA_HEADER, "expected <tag> <seq> <message>"));
        };
        let sequence = sequence
            .parse()
            .map_err(|_| CoreError::malformed(DATA_HEADER, "sequence is not a number"))?;
        Ok(Self {
            tag: tag.to_string(),
            sequence,
            message: message.to_string(),
        })
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_selection() {
        assert_eq!(KeyExchangeKind::select(false, false), KeyExchangeKind::Start);
        assert_eq!(KeyExchangeKind::select(false, true), KeyExchangeKind::StartAccept);
        assert_eq!(KeyExchangeKind::select(true, false), KeyExchangeKind::Change);
        assert_eq!(KeyExchangeKind::select(true, true), KeyExchangeKind::ChangeAccept);
        assert!(KeyExchangeKind::ChangeAccept.is_rekey());
        assert!(!KeyExchangeKind::StartAccept.is_rekey());
        assert!(KeyExchangeKind::StartAccept.is_accept());
    }

    #[test]
    fn test_parse_key_exchange() {
        let msg: InnerMessage = "DATA_DH_CHANGE_ACCEPT tag== 3 pub==".parse().unwrap();
        assert_eq!(
            msg,
            InnerMessage::KeyExchange {
                kind: KeyExchangeKind::ChangeAccept,
                proof: "tag==".into(),
                sequence: 3,
                public_key: "pub==".into(),
            }
        );
        assert_eq!(msg.to_string(), "DATA_DH_CHANGE_ACCEPT tag== 3 pub==");
    }

    #[test]
    fn test_parse_rejects_bad_key_exchange() {
        assert!("DATA_DH_START sig 1".parse::<InnerMessage>().is_err());
        assert!("DATA_DH_START sig -1 pub".parse::<InnerMessage>().is_err());
        assert!("DATA_DH_START".parse::<InnerMessage>().is_err());
        assert!(matches!(
            "DATA_DH_BOGUS a 1 b".parse::<InnerMessage>(),
            Err(CoreError::UnknownCommand { .. })
        ));
    }

    #[test]
    fn test_parse_data_and_error() {
        assert_eq!(
            "DATA aXY=:Y3Q=".parse::<InnerMessage>().unwrap(),
            InnerMessage::Data {
                sealed: "aXY=:Y3Q=".into()
            }
        );
        assert!("DATA".parse::<InnerMessage>().is_err());
        assert_eq!(
            "DATA_MESSAGE_ERROR".parse::<InnerMessage>().unwrap(),
            InnerMessage::MessageError
        );
    }

    #[test]
    fn test_tagged_message_keeps_spaces() {
        let tagged: TaggedMessage = "t4g 7 hello there  world".parse().unwrap();
        assert_eq!(tagged.sequence, 7);
        assert_eq!(tagged.message, "hello there  world");
        assert_eq!(tagged.authenticated_text(), "7 hello there  world");
        assert_eq!(tagged.to_string(), "t4g 7 hello there  world");
    }

    #[test]
    fn test_tagged_message_errors() {
        assert!("tag 7".parse::<TaggedMessage>().is_err());
        assert!("tag x msg".parse::<TaggedMessage>().is_err());
    }
}
