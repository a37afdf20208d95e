// ============================================
// File: crates/securechat-client/src/handlers/command.rs
// ============================================
//! # User Commands
//!
//! ## Creation Reason
//! Turns one line typed by the user into a [`UserCommand`]. A line whose
//! first word starts with `-` is a command; anything else is a message
//! for the current peer.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Command words are case-insensitive, arguments are not
//! - An unknown `-word` is reported, never sent as a message
//!
//! ## Last Modified
//! v0.1.0 - Initial command parser

use std::str::FromStr;

use securechat_common::ClientId;

use crate::error::{ClientError, Result};

/// Text printed by `-help`.
pub const HELP_TEXT: &str = "\
Commands:
  -help                      Show this help
  -exit                      Quit
  -signup <name>             Create an identity on the relay
  -login                     Log in with the stored identity
  -send <id>                 Start a conversation with a client
  -send_trust <id>           Trust the key the current peer was introduced with
  -trust <id> <publicKey>    Trust a public key for a client
  -untrust <id>              Forget the trusted key of a client
  -block <id>                Refuse all traffic from a client
  -unblock <id>              Lift a block
  -renew <id>                Replace your own identity key
Anything else is sent to the current peer.";

/// One parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// `-help`
    Help,
    /// `-exit`
    Exit,
    /// `-signup <name>`
    Signup(String),
    /// `-login`
    Login,
    /// `-send <id>`
    Send(ClientId),
    /// `-send_trust <id>`
    SendTrust(ClientId),
    /// `-trust <id> <publicKey>`
    Trust(ClientId, String),
    /// `-untrust <id>`
    Untrust(ClientId),
    /// `-block <id>`
    Block(ClientId),
    /// `-unblock <id>`
    Unblock(ClientId),
    /// `-renew <id>`
    Renew(ClientId),
    /// Text for the current peer.
    Message(String),
}

impl UserCommand {
    /// Parses a line; `Ok(None)` for a blank line.
    ///
    /// # Errors
    /// `InvalidInput` for an unknown command or missing/bad arguments.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Ok(None);
        }

        let trimmed = line.trim_start();
        if !trimmed.starts_with('-') {
            return Ok(Some(Self::Message(line.to_string())));
        }

        let mut words = trimmed.split_whitespace();
        let word = words.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = words.collect();

        let command = match word.as_str() {
            "-help" => expect_args(&word, &args, 0).map(|_| Self::Help)?,
            "-exit" => expect_args(&word, &args, 0).map(|_| Self::Exit)?,
            "-login" => expect_args(&word, &args, 0).map(|_| Self::Login)?,
            "-signup" => {
                let [name] = args_exact::<1>(&word, &args)?;
                Self::Signup(name.to_string())
            }
            "-send" => Self::Send(client_id(&word, &args)?),
            "-send_trust" => Self::SendTrust(client_id(&word, &args)?),
            "-untrust" => Self::Untrust(client_id(&word, &args)?),
            "-block" => Self::Block(client_id(&word, &args)?),
            "-unblock" => Self::Unblock(client_id(&word, &args)?),
            "-renew" => Self::Renew(client_id(&word, &args)?),
            "-trust" => {
                let [id, key] = args_exact::<2>(&word, &args)?;
                Self::Trust(parse_id(&word, id)?, key.to_string())
            }
            other => {
                return Err(ClientError::invalid_input(
                    "command",
                    format!("unknown command {other}, try -help"),
                ))
            }
        };
        Ok(Some(command))
    }
}

impl FromStr for UserCommand {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)?.ok_or_else(|| ClientError::invalid_input("command", "empty line"))
    }
}

fn expect_args(word: &str, args: &[&str], count: usize) -> Result<()> {
    if args.len() == count {
        Ok(())
    } else {
        Err(ClientError::invalid_input(
            word,
            format!("expects {count} argument(s), got {}", args.len()),
        ))
    }
}

fn args_exact<'a, const N: usize>(word: &str, args: &[&'a str]) -> Result<[&'a str; N]> {
    expect_args(word, args, N)?;
    let mut out = [""; N];
    out.copy_from_slice(args);
    Ok(out)
}

fn parse_id(word: &str, token: &str) -> Result<ClientId> {
    token
        .parse()
        .map_err(|_| ClientError::invalid_input(word, format!("'{token}' is not a Client_ID")))
}

fn client_id(word: &str, args: &[&str]) -> Result<ClientId> {
    let [token] = args_exact::<1>(word, args)?;
    parse_id(word, token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: u32) -> ClientId {
        ClientId::new(value).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        let cases = [
            ("-help", UserCommand::Help),
            ("-EXIT", UserCommand::Exit),
            ("-login", UserCommand::Login),
            ("-signup alice", UserCommand::Signup("alice".into())),
            ("-send 2", UserCommand::Send(id(2))),
            ("-send_trust 2", UserCommand::SendTrust(id(2))),
            ("-trust 3 MIIBIj==", UserCommand::Trust(id(3), "MIIBIj==".into())),
            ("-untrust 3", UserCommand::Untrust(id(3))),
            ("-block 4", UserCommand::Block(id(4))),
            ("  -unblock   4 ", UserCommand::Unblock(id(4))),
            ("-renew 1", UserCommand::Renew(id(1))),
        ];
        for (line, expected) in cases {
            assert_eq!(line.parse::<UserCommand>().unwrap(), expected, "{line}");
        }
    }

    #[test]
    fn test_plain_text_is_a_message() {
        assert_eq!(
            UserCommand::parse("hello  there\n").unwrap(),
            Some(UserCommand::Message("hello  there".into()))
        );
        assert_eq!(UserCommand::parse("   ").unwrap(), None);
        assert_eq!(UserCommand::parse("").unwrap(), None);
    }

    #[test]
    fn test_bad_commands() {
        for line in [
            "-send",
            "-send two",
            "-send 0",
            "-signup",
            "-signup two words",
            "-trust 3",
            "-login now",
            "-dance",
        ] {
            let err = UserCommand::parse(line).unwrap_err();
            assert!(err.is_policy_violation(), "{line}");
        }
    }

    #[test]
    fn test_help_lists_every_command() {
        for word in [
            "-help", "-exit", "-signup", "-login", "-send ", "-send_trust", "-trust", "-untrust",
            "-block", "-unblock", "-renew",
        ] {
            assert!(HELP_TEXT.contains(word), "{word}");
        }
    }
}
