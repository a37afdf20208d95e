// ============================================
// File: crates/securechat-client/src/handlers/dispatch.rs
// ============================================
//! # Client Dispatch
//!
//! ## Creation Reason
//! Routes relay replies and user commands to the auth and messaging
//! services, and turns their errors into notices. Holds all client state
//! so the event loop only moves lines around.
//!
//! ## Data Flow
//! ```text
//! relay line ─► decode ─► ChatClient::on_command ─┬─► ClientAuth
//!                                                 └─► MessagingEngine
//! user line  ─► UserCommand ─► ChatClient::on_user ─┘
//!                                   │
//!                                   ▼
//!                       Effects { outbound, notices }
//! ```
//!
//! ## Last Modified
//! v0.1.0 - Initial dispatcher

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use securechat_core::protocol::{Codec, Command, Frame, ProtocolCodec};

use crate::config::ClientConfig;
use crate::effects::Effects;
use crate::error::{ClientError, Result};
use crate::handlers::command::{UserCommand, HELP_TEXT};
use crate::services::{ClientAuth, ClientStore, MessagingEngine, TrustService};

/// Whether the event loop keeps running after a user line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// The user asked to quit.
    Exit,
}

/// All client-side state behind one connection.
pub struct ChatClient {
    auth: ClientAuth,
    messaging: MessagingEngine,
    codec: ProtocolCodec,
}

impl ChatClient {
    /// Creates a client from its services.
    #[must_use]
    pub const fn new(auth: ClientAuth, messaging: MessagingEngine) -> Self {
        Self {
            auth,
            messaging,
            codec: ProtocolCodec::new(),
        }
    }

    /// Creates a client over `store` with the configured tuning.
    #[must_use]
    pub fn from_config(store: Arc<dyn ClientStore>, config: &ClientConfig) -> Self {
        let auth = ClientAuth::new(Arc::clone(&store), config.identity.key_bits);
        let messaging = MessagingEngine::new(
            TrustService::new(store),
            config.messaging.rekey_min_sequence,
            config.handshake_timeout(),
        );
        Self::new(auth, messaging)
    }

    /// Auth state.
    #[must_use]
    pub fn auth(&self) -> &ClientAuth {
        &self.auth
    }

    /// Messaging state.
    #[must_use]
    pub fn messaging(&self) -> &MessagingEngine {
        &self.messaging
    }

    // ========================================
    // Relay Lines
    // ========================================

    /// Handles one line from the relay.
    pub fn handle_server_line(&mut self, line: &str) -> Effects {
        let frame = Frame::split(line);
        if frame.header.is_empty() {
            return Effects::new();
        }

        let command = match Codec::<Command>::decode(&self.codec, line) {
            Ok(command) => command,
            Err(e) => {
                warn!(header = frame.header, error = %e, "Unreadable relay line");
                let mut fx = Effects::new();
                fx.warn(format!("Unreadable reply from relay: {e}"));
                return fx;
            }
        };

        let header = command.header();
        self.on_command(command).unwrap_or_else(|e| {
            warn!(header = %header, error = %e, "Relay reply not handled");
            let mut fx = Effects::new();
            fx.error(e.to_string());
            fx
        })
    }

    fn on_command(&mut self, command: Command) -> Result<Effects> {
        match command {
            Command::SignupSuccess { client_id } => self.auth.on_signup_success(client_id),
            Command::SignupFailure => Ok(self.auth.on_signup_failure()),
            Command::LoginNonce(challenge) => self.auth.on_login_nonce(&challenge),
            Command::LoginSuccess => self.auth.on_login_success(),
            Command::LoginFailure => Ok(self.auth.on_login_failure()),
            Command::RenewKeyRequestOk(challenge) => self.auth.on_renew_challenge(&challenge),
            Command::RenewKeySuccess => self.auth.on_renew_success(),
            Command::RenewKeyFailure => Ok(self.auth.on_renew_failure()),
            Command::SendInvite { peer, public_key } => {
                let account = self.auth.account().ok_or(ClientError::NotLoggedIn)?;
                self.messaging.on_invite(account, peer, &public_key)
            }
            Command::Send { peer, payload } => {
                let account = self.auth.account().ok_or(ClientError::NotLoggedIn)?;
                Ok(self.messaging.on_send(account, peer, &payload))
            }
            Command::SendFailure { peer } => Ok(self.messaging.on_send_failure(peer.as_deref())),
            other => Err(ClientError::unexpected(
                other.header().as_str(),
                self.auth.state_name(),
            )),
        }
    }

    // ========================================
    // User Lines
    // ========================================

    /// Handles one line typed by the user.
    pub fn handle_user_line(&mut self, line: &str) -> (Flow, Effects) {
        let command = match UserCommand::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return (Flow::Continue, Effects::new()),
            Err(e) => {
                let mut fx = Effects::new();
                fx.error(e.to_string());
                return (Flow::Continue, fx);
            }
        };
        if command == UserCommand::Exit {
            return (Flow::Exit, Effects::new());
        }

        let fx = self.on_user(command).unwrap_or_else(|e| {
            if e.is_policy_violation() {
                debug!(error = %e, "Command refused");
            } else {
                warn!(error = %e, "Command failed");
            }
            let mut fx = Effects::new();
            fx.error(e.to_string());
            fx
        });
        (Flow::Continue, fx)
    }

    fn on_user(&mut self, command: UserCommand) -> Result<Effects> {
        let mut fx = Effects::new();
        match command {
            UserCommand::Help => fx.info(HELP_TEXT),
            UserCommand::Exit => {}
            UserCommand::Signup(name) => return self.auth.request_signup(&name),
            UserCommand::Login => return self.auth.request_login(),
            UserCommand::Renew(client_id) => return self.auth.request_renew(client_id),
            UserCommand::Send(peer) => {
                let account = self.auth.account().ok_or(ClientError::NotLoggedIn)?;
                return self.messaging.request_send(account, peer);
            }
            UserCommand::SendTrust(peer) => {
                let account = self.auth.account().ok_or(ClientError::NotLoggedIn)?;
                return self.messaging.send_trust(account, peer);
            }
            UserCommand::Message(text) => {
                let account = self.auth.account().ok_or(ClientError::NotLoggedIn)?;
                return self.messaging.submit_message(account, &text);
            }
            UserCommand::Trust(peer, public_key) => {
                self.messaging.trust().trust(peer, &public_key)?;
                fx.info(format!("Public key of Client_ID {peer} trusted"));
                if let Some(account) = self.auth.account() {
                    fx.extend(self.messaging.resume(account)?);
                }
            }
            UserCommand::Untrust(peer) => {
                if self.messaging.trust().untrust(peer)? {
                    fx.info(format!("Public key of Client_ID {peer} no longer trusted"));
                } else {
                    fx.info(format!("Client_ID {peer} was not trusted"));
                }
            }
            UserCommand::Block(peer) => {
                self.messaging.trust().block(peer)?;
                if self.messaging.forget_peer(peer) {
                    fx.info(format!("Conversation with Client_ID {peer} closed"));
                }
                fx.info(format!("Client_ID {peer} blocked"));
            }
            UserCommand::Unblock(peer) => {
                if self.messaging.trust().unblock(peer)? {
                    fx.info(format!("Client_ID {peer} unblocked"));
                } else {
                    fx.info(format!("Client_ID {peer} was not blocked"));
                }
            }
        }
        Ok(fx)
    }

    /// Periodic housekeeping.
    pub fn tick(&mut self, now: Instant) -> Effects {
        self.messaging.tick(now)
    }
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("auth", &self.auth)
            .field("messaging", &self.messaging)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::effects::Notice;
    use crate::services::MemoryStore;
    use securechat_common::ClientId;
    use securechat_server::services::IdentityDirectory;
    use securechat_server::{AuthService, ConnectionHandler, ConnectionState, MemoryDirectory, Router};
    use securechat_transport::OutboundQueue;

    fn id(value: u32) -> ClientId {
        ClientId::new(value).unwrap()
    }

    /// One client wired to the relay handler through in-memory queues.
    struct Endpoint {
        client: ChatClient,
        store: Arc<dyn ClientStore>,
        state: ConnectionState,
        inbox: mpsc::Receiver<String>,
        pending: Vec<String>,
        notices: Vec<Notice>,
    }

    impl Endpoint {
        fn new(label: &str) -> Self {
            let store: Arc<dyn ClientStore> = Arc::new(MemoryStore::new());
            let mut config = ClientConfig::default();
            config.identity.key_bits = 1024;
            let (queue, inbox) = OutboundQueue::channel(64);
            Self {
                client: ChatClient::from_config(Arc::clone(&store), &config),
                store,
                state: ConnectionState::new(label, queue),
                inbox,
                pending: Vec::new(),
                notices: Vec::new(),
            }
        }

        fn apply(&mut self, fx: Effects) {
            self.pending.extend(fx.outbound);
            self.notices.extend(fx.notices);
        }

        fn type_line(&mut self, line: &str) -> Flow {
            let (flow, fx) = self.client.handle_user_line(line);
            self.apply(fx);
            flow
        }

        fn messages(&self) -> Vec<String> {
            self.notices
                .iter()
                .filter(|n| matches!(n, Notice::Message { .. }))
                .map(ToString::to_string)
                .collect()
        }
    }

    fn relay() -> (ConnectionHandler, Arc<MemoryDirectory>) {
        let directory = Arc::new(MemoryDirectory::new());
        let auth = Arc::new(AuthService::new(
            Arc::clone(&directory) as Arc<dyn IdentityDirectory>,
            Duration::from_secs(300),
        ));
        (
            ConnectionHandler::new(auth, Arc::new(Router::new())),
            directory,
        )
    }

    /// Moves lines client → relay → clients until nothing is left.
    async fn settle(handler: &ConnectionHandler, endpoints: &mut [&mut Endpoint]) {
        loop {
            let mut progressed = false;
            for endpoint in endpoints.iter_mut() {
                for line in std::mem::take(&mut endpoint.pending) {
                    handler.handle_line(&mut endpoint.state, &line).await.unwrap();
                    progressed = true;
                }
            }
            for endpoint in endpoints.iter_mut() {
                while let Ok(line) = endpoint.inbox.try_recv() {
                    let fx = endpoint.client.handle_server_line(&line);
                    endpoint.apply(fx);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }

    async fn register(handler: &ConnectionHandler, endpoint: &mut Endpoint, name: &str) {
        endpoint.type_line(&format!("-signup {name}"));
        settle(handler, &mut [&mut *endpoint]).await;
        endpoint.type_line("-login");
        settle(handler, &mut [&mut *endpoint]).await;
        assert!(endpoint.client.auth().is_logged_in(), "{:?}", endpoint.notices);
    }

    #[tokio::test]
    async fn test_end_to_end_hello() {
        let (handler, _directory) = relay();
        let mut alice = Endpoint::new("alice");
        let mut bob = Endpoint::new("bob");
        register(&handler, &mut alice, "alice").await;
        register(&handler, &mut bob, "bob").await;
        assert_eq!(alice.client.auth().client_id(), Some(id(1)));
        assert_eq!(bob.client.auth().client_id(), Some(id(2)));

        alice.type_line("-send 2");
        settle(&handler, &mut [&mut alice, &mut bob]).await;
        assert_eq!(bob.client.messaging().peer(), Some(id(1)));
        assert!(bob.notices.iter().any(Notice::is_problem));

        alice.type_line("-send_trust 2");
        bob.type_line("-send_trust 1");
        alice.type_line("hello");
        settle(&handler, &mut [&mut alice, &mut bob]).await;
        assert_eq!(bob.messages(), vec!["[Client_ID 1] hello"]);

        bob.type_line("hi alice, how are you");
        settle(&handler, &mut [&mut alice, &mut bob]).await;
        assert_eq!(alice.messages(), vec!["[Client_ID 2] hi alice, how are you"]);
    }

    #[tokio::test]
    async fn test_renewal_reaches_directory() {
        let (handler, directory) = relay();
        let mut alice = Endpoint::new("alice");
        register(&handler, &mut alice, "alice").await;

        let before = alice.store.identity().unwrap().unwrap().public_key.clone();
        alice.type_line("-renew 1");
        settle(&handler, &mut [&mut alice]).await;

        let after = alice.store.identity().unwrap().unwrap().public_key.clone();
        assert_ne!(before, after);
        assert_eq!(directory.get(id(1)).unwrap().public_key, after);
        assert!(alice
            .notices
            .iter()
            .any(|n| *n == Notice::Info("Key renewed".into())));
    }

    #[tokio::test]
    async fn test_send_to_offline_peer_fails() {
        let (handler, _directory) = relay();
        let mut alice = Endpoint::new("alice");
        register(&handler, &mut alice, "alice").await;

        alice.type_line("-send 7");
        settle(&handler, &mut [&mut alice]).await;
        assert!(alice.client.messaging().peer().is_none());
        assert!(alice
            .notices
            .iter()
            .any(|n| *n == Notice::Error("Client_ID 7 is not available".into())));
    }

    #[tokio::test]
    async fn test_blocked_peer_cannot_reach() {
        let (handler, _directory) = relay();
        let mut alice = Endpoint::new("alice");
        let mut bob = Endpoint::new("bob");
        register(&handler, &mut alice, "alice").await;
        register(&handler, &mut bob, "bob").await;

        bob.type_line("-block 1");
        alice.type_line("-send 2");
        settle(&handler, &mut [&mut alice, &mut bob]).await;
        assert!(bob.client.messaging().peer().is_none());

        alice.type_line("-send_trust 2");
        alice.type_line("anyone?");
        settle(&handler, &mut [&mut alice, &mut bob]).await;
        assert!(bob.messages().is_empty());
    }

    #[test]
    fn test_local_commands() {
        let mut alice = Endpoint::new("alice");

        assert_eq!(alice.type_line(""), Flow::Continue);
        assert!(alice.pending.is_empty() && alice.notices.is_empty());

        alice.type_line("-help");
        assert_eq!(alice.notices, vec![Notice::Info(HELP_TEXT.into())]);

        alice.notices.clear();
        alice.type_line("hello");
        alice.type_line("-send 2");
        alice.type_line("-dance");
        assert_eq!(alice.notices.len(), 3);
        assert!(alice.notices.iter().all(Notice::is_problem));
        assert!(alice.pending.is_empty());

        alice.type_line("-block 9");
        assert!(alice.store.is_blocked(id(9)).unwrap());
        alice.type_line("-unblock 9");
        assert!(!alice.store.is_blocked(id(9)).unwrap());

        assert_eq!(alice.type_line("-exit"), Flow::Exit);
    }

    #[test]
    fn test_unexpected_relay_lines() {
        let mut alice = Endpoint::new("alice");
        assert!(alice.client.handle_server_line("").is_empty());

        let fx = alice.client.handle_server_line("LOGIN_SUCCESS");
        assert!(fx.notices.iter().all(Notice::is_problem));
        assert!(!alice.client.auth().is_logged_in());

        let fx = alice.client.handle_server_line("GARBAGE here");
        assert_eq!(fx.notices.len(), 1);
        assert!(fx.outbound.is_empty());
    }
}
