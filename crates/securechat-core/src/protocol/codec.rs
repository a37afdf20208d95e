// ============================================
// File: crates/securechat-core/src/protocol/codec.rs
// ============================================
//! # Protocol Codec
//!
//! ## Creation Reason
//! Converts newline-free text lines into typed commands and back.
//!
//! ## Main Functionality
//! - [`Frame`]: `HEADER[ DATA]` split at the first space
//! - [`Codec`] trait: Generic encode/decode interface
//! - [`ProtocolCodec`]: Implementation for [`Command`] and [`InnerMessage`]
//!
//! ## Parsing Strategy
//! 1. Trim the line and split header from data
//! 2. Look up the exact header
//! 3. Split data into the header's field count (the last field keeps spaces)
//! 4. Validate each field
//!
//! ## ⚠️ Important Note for Next Developer
//! - The relay dispatches by prefix family BEFORE decoding; a decode error
//!   must still produce the family's failure reply
//! - Never log full `SEND` payloads at info level
//!
//! ## Last Modified
//! v0.1.0 - Initial codec implementation

use std::str::FromStr;

use securechat_common::types::ClientId;

use crate::crypto::{Challenge, RenewalProof};
use crate::error::{CoreError, Result};
use crate::protocol::inner::InnerMessage;
use crate::protocol::messages::{Command, CommandFamily, Header};

// ============================================
// Frame
// ============================================

/// A raw line split into header and optional data.
///
/// # Example
/// ```
/// use securechat_core::protocol::Frame;
///
/// let frame = Frame::split("SEND 2 DATA iv:ct");
/// assert_eq!(frame.header, "SEND");
/// assert_eq!(frame.data, Some("2 DATA iv:ct"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// First token
    pub header: &'a str,
    /// Everything after the first space
    pub data: Option<&'a str>,
}

impl<'a> Frame<'a> {
    /// Splits a line at its first space.
    #[must_use]
    pub fn split(line: &'a str) -> Self {
        let line = line.trim();
        match line.split_once(' ') {
            Some((header, data)) => Self {
                header,
                data: Some(data),
            },
            None => Self { header: line, data: None },
        }
    }

    /// Family of the header, by prefix.
    #[must_use]
    pub fn family(&self) -> Option<CommandFamily> {
        CommandFamily::classify(self.header)
    }

    /// First data token, as the client wrote it.
    #[must_use]
    pub fn first_token(&self) -> Option<&'a str> {
        self.data
            .and_then(|data| data.split(' ').next())
            .filter(|token| !token.is_empty())
    }
}

// ============================================
// Codec Trait
// ============================================

/// Trait for encoding and decoding protocol messages.
///
/// # Type Parameters
/// * `T` - The message type to encode/decode
pub trait Codec<T> {
    /// Encodes a message into a wire line (no trailing newline).
    fn encode(&self, msg: &T) -> String;

    /// Decodes a message from a wire line.
    ///
    /// # Errors
    /// `UnknownCommand` or `MalformedCommand` on bad input.
    fn decode(&self, line: &str) -> Result<T>;
}

// ============================================
// ProtocolCodec
// ============================================

/// Codec implementation for all protocol messages.
#[derive(Debug, Default, Clone)]
pub struct ProtocolCodec;

impl ProtocolCodec {
    /// Creates a new protocol codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Codec<Command> for ProtocolCodec {
    fn encode(&self, msg: &Command) -> String {
        msg.to_string()
    }

    fn decode(&self, line: &str) -> Result<Command> {
        let frame = Frame::split(line);
        let header = Header::from_name(frame.header).ok_or_else(|| CoreError::UnknownCommand {
            header: frame.header.to_string(),
        })?;
        let fields = Fields::new(header, frame.data);

        let command = match header {
            Header::Signup => {
                let [name, public_key] = fields.exact::<2>()?;
                Command::Signup {
                    name: name.to_string(),
                    public_key: public_key.to_string(),
                }
            }
            Header::SignupSuccess => Command::SignupSuccess {
                client_id: fields.client_id()?,
            },
            Header::SignupFailure => Command::SignupFailure,
            Header::Login => Command::Login {
                client_id: fields.client_id()?,
            },
            Header::LoginNonce => Command::LoginNonce(fields.challenge()?),
            Header::LoginAccept => {
                let [signature] = fields.exact::<1>()?;
                Command::LoginAccept {
                    signature: signature.to_string(),
                }
            }
            Header::LoginSuccess => Command::LoginSuccess,
            Header::LoginFailure => Command::LoginFailure,
            Header::SendStart => Command::SendStart {
                peer: fields.client_id()?,
            },
            Header::SendInvite => {
                let [peer, public_key] = fields.exact::<2>()?;
                Command::SendInvite {
                    peer: fields.parse_id(peer)?,
                    public_key: public_key.to_string(),
                }
            }
            Header::Send => {
                let [peer, payload] = fields.exact::<2>()?;
                Command::Send {
                    peer: fields.parse_id(peer)?,
                    payload: payload.to_string(),
                }
            }
            Header::SendFailure => Command::SendFailure {
                peer: frame.first_token().map(str::to_string),
            },
            Header::RenewKeyRequest => Command::RenewKeyRequest,
            Header::RenewKeyRequestOk => Command::RenewKeyRequestOk(fields.challenge()?),
            Header::RenewKey => {
                let [old_signature, new_public_key, new_signature] = fields.exact::<3>()?;
                Command::RenewKey(RenewalProof {
                    old_signature: old_signature.to_string(),
                    new_public_key: new_public_key.to_string(),
                    new_signature: new_signature.to_string(),
                })
            }
            Header::RenewKeySuccess => Command::RenewKeySuccess,
            Header::RenewKeyFailure => Command::RenewKeyFailure,
        };
        Ok(command)
    }
}

impl Codec<InnerMessage> for ProtocolCodec {
    fn encode(&self, msg: &InnerMessage) -> String {
        msg.to_string()
    }

    fn decode(&self, line: &str) -> Result<InnerMessage> {
        line.parse()
    }
}

impl FromStr for Command {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Codec::<Command>::decode(&ProtocolCodec::new(), s)
    }
}

// ============================================
// Field Splitting
// ============================================

/// Field accessor bound to the header being decoded, for error messages.
struct Fields<'a> {
    header: Header,
    data: &'a str,
}

impl<'a> Fields<'a> {
    fn new(header: Header, data: Option<&'a str>) -> Self {
        Self {
            header,
            data: data.unwrap_or_default().trim(),
        }
    }

    /// Splits into exactly `N` non-empty fields; the last keeps its spaces.
    fn exact<const N: usize>(&self) -> Result<[&'a str; N]> {
        let mut out = [""; N];
        let mut parts = self.data.splitn(N, ' ');
        for slot in &mut out {
            *slot = parts
                .next()
                .filter(|part| !part.is_empty())
                .ok_or_else(|| {
                    CoreError::malformed(self.header.as_str(), format!("expected {} field(s)", N))
                })?;
        }
        Ok(out)
    }

    fn parse_id(&self, token: &str) -> Result<ClientId> {
        token
            .parse()
            .map_err(|_| CoreError::malformed(self.header.as_str(), "invalid client id"))
    }

    fn client_id(&self) -> Result<ClientId> {
        let [token] = self.exact::<1>()?;
        self.parse_id(token)
    }

    fn challenge(&self) -> Result<Challenge> {
        self.data
            .parse()
            .map_err(|_| CoreError::malformed(self.header.as_str(), "expected <nonce> <timestamp>"))
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use securechat_common::time::Timestamp;

    fn decode(line: &str) -> Result<Command> {
        Codec::<Command>::decode(&ProtocolCodec::new(), line)
    }

    fn id(value: u32) -> ClientId {
        ClientId::new(value).unwrap()
    }

    #[test]
    fn test_frame_split() {
        let frame = Frame::split("  LOGIN_SUCCESS \r");
        assert_eq!(frame.header, "LOGIN_SUCCESS");
        assert_eq!(frame.data, None);
        assert_eq!(frame.first_token(), None);

        let frame = Frame::split("SEND_START abc def");
        assert_eq!(frame.family(), Some(CommandFamily::Send));
        assert_eq!(frame.first_token(), Some("abc"));
    }

    #[test]
    fn test_decode_signup_and_login() {
        assert_eq!(
            decode("SIGNUP alice MIIBIj==").unwrap(),
            Command::Signup {
                name: "alice".into(),
                public_key: "MIIBIj==".into()
            }
        );
        assert!(decode("SIGNUP alice").is_err());
        assert!(decode("SIGNUP").is_err());

        assert_eq!(
            decode("LOGIN 12").unwrap(),
            Command::Login { client_id: id(12) }
        );
        assert!(decode("LOGIN c").is_err());
        assert!(decode("LOGIN 0").is_err());

        assert_eq!(
            decode("LOGIN_NONCE -9 1700000000000").unwrap(),
            Command::LoginNonce(Challenge {
                nonce: -9,
                timestamp: Timestamp::from_millis(1_700_000_000_000),
            })
        );
        assert!(decode("LOGIN_NONCE 1").is_err());
    }

    #[test]
    fn test_decode_send_family() {
        assert_eq!(
            decode("SEND 3 DATA_DH_START sig 0 pub").unwrap(),
            Command::Send {
                peer: id(3),
                payload: "DATA_DH_START sig 0 pub".into()
            }
        );
        assert!(decode("SEND 3").is_err());
        assert!(decode("SEND x DATA").is_err());

        assert_eq!(
            decode("SEND_INVITE 4 PK==").unwrap(),
            Command::SendInvite {
                peer: id(4),
                public_key: "PK==".into()
            }
        );
        assert_eq!(
            decode("SEND_FAILURE oops").unwrap(),
            Command::SendFailure {
                peer: Some("oops".into())
            }
        );
        assert_eq!(
            decode("SEND_FAILURE").unwrap(),
            Command::SendFailure { peer: None }
        );
    }

    #[test]
    fn test_decode_renewal() {
        let cmd = decode("RENEW_KEY old new sig").unwrap();
        assert_eq!(
            cmd,
            Command::RenewKey(RenewalProof {
                old_signature: "old".into(),
                new_public_key: "new".into(),
                new_signature: "sig".into(),
            })
        );
        assert_eq!(cmd.to_string(), "RENEW_KEY old new sig");
        assert!(decode("RENEW_KEY old new").is_err());
        assert_eq!(decode("RENEW_KEY_REQUEST").unwrap(), Command::RenewKeyRequest);
    }

    #[test]
    fn test_unknown_header() {
        assert!(matches!(
            decode("HELLO world"),
            Err(CoreError::UnknownCommand { .. })
        ));
        assert!(matches!(
            decode("SIGNUPX a b"),
            Err(CoreError::UnknownCommand { .. })
        ));
    }

    #[test]
    fn test_encode_matches_decode() {
        let codec = ProtocolCodec::new();
        let commands = [
            Command::SignupSuccess { client_id: id(1) },
            Command::LoginAccept {
                signature: "c2ln".into(),
            },
            Command::SendStart { peer: id(2) },
            Command::RenewKeySuccess,
        ];
        for cmd in commands {
            let line = codec.encode(&cmd);
            assert_eq!(decode(&line).unwrap(), cmd);
        }
    }
}
