// ============================================
// File: crates/securechat-server/src/handlers/connection.rs
// ============================================
//! # Connection Handler
//!
//! ## Creation Reason
//! Turns inbound lines of one connection into auth steps and relay
//! actions, and sends the replies through that connection's queue.
//!
//! ## Line Processing
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  1. Split "HEADER DATA" at the first space                  │
//! │                                                             │
//! │  2. Classify the header by prefix                           │
//! │     SIGNUP*  LOGIN*  SEND*  RENEW_KEY*   (else: ignored)    │
//! │                                                             │
//! │  3. Decode the exact command                                │
//! │                                                             │
//! │  4. Run it against AuthService / Router                     │
//! │                                                             │
//! │  5. On any refusal reply with the family's failure:         │
//! │     SIGNUP_FAILURE, LOGIN_FAILURE,                          │
//! │     SEND_FAILURE <peer token>, RENEW_KEY_FAILURE            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Relay
//! `SEND_START <peer>` and `SEND <peer> <inner>` require both ends to be
//! logged in and connected. The inner payload is forwarded untouched with
//! the peer id rewritten to the sender's id.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Only a failure to write to THIS connection ends the connection;
//!   everything else is answered with a failure reply
//! - `close` runs exactly once per connection (deregister, signup purge)
//!
//! ## Last Modified
//! v0.1.0 - Initial connection handler

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use securechat_common::ClientId;
use securechat_core::protocol::{Codec, Command, CommandFamily, Frame, ProtocolCodec};
use securechat_transport::{LineSink, LineSource, OutboundQueue};

use crate::error::{Result, ServerError};
use crate::services::{AuthService, AuthSession, IdentityDirectory, Router};

// ============================================
// ConnectionState
// ============================================

/// Everything one connection owns.
#[derive(Debug)]
pub struct ConnectionState {
    label: String,
    queue: OutboundQueue,
    auth: AuthSession,
    closed: bool,
}

impl ConnectionState {
    /// Creates state for a connection whose replies go to `queue`.
    ///
    /// `label` names the connection in logs (usually the peer address).
    #[must_use]
    pub fn new(label: impl Into<String>, queue: OutboundQueue) -> Self {
        Self {
            label: label.into(),
            queue,
            auth: AuthSession::new(),
            closed: false,
        }
    }

    /// Authentication state.
    #[must_use]
    pub const fn auth(&self) -> &AuthSession {
        &self.auth
    }

    /// Returns `true` after `close`.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    async fn reply(&self, command: &Command) -> Result<()> {
        trace!(conn = %self.label, header = %command.header(), "Reply");
        self.queue.send_line(command.to_string()).await?;
        Ok(())
    }
}

// ============================================
// ConnectionHandler
// ============================================

/// Processes lines for any number of connections.
///
/// # Thread Safety
/// Shared across connection tasks; holds only shared services.
pub struct ConnectionHandler {
    auth: Arc<AuthService>,
    router: Arc<Router>,
    codec: ProtocolCodec,
}

impl ConnectionHandler {
    /// Creates a handler over the shared services.
    #[must_use]
    pub fn new(auth: Arc<AuthService>, router: Arc<Router>) -> Self {
        Self {
            auth,
            router,
            codec: ProtocolCodec::new(),
        }
    }

    /// The router this handler registers logins with.
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    fn directory(&self) -> &Arc<dyn IdentityDirectory> {
        self.auth.directory()
    }

    // ========================================
    // Connection Loop
    // ========================================

    /// Reads lines until the peer disconnects or shutdown is signalled,
    /// then runs [`ConnectionHandler::close`].
    pub async fn serve<S>(
        &self,
        source: &mut S,
        state: &mut ConnectionState,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) where
        S: LineSource + ?Sized,
    {
        info!(conn = %state.label, "Connection opened");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!(conn = %state.label, "Connection received shutdown signal");
                    break;
                }
                line = source.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if let Err(e) = self.handle_line(state, &line).await {
                                debug!(conn = %state.label, error = %e, "Connection writer gone");
                                break;
                            }
                        }
                        Ok(None) => {
                            debug!(conn = %state.label, "Peer closed the connection");
                            break;
                        }
                        Err(e) => {
                            warn!(conn = %state.label, error = %e, "Read failed");
                            break;
                        }
                    }
                }
            }
        }

        self.close(state);
        info!(conn = %state.label, "Connection closed");
    }

    /// Handles one inbound line.
    ///
    /// # Errors
    /// Only when a reply cannot be queued on this connection.
    pub async fn handle_line(&self, state: &mut ConnectionState, line: &str) -> Result<()> {
        let frame = Frame::split(line);
        let Some(family) = frame.family() else {
            debug!(conn = %state.label, header = frame.header, "Ignoring unknown header");
            return Ok(());
        };
        trace!(conn = %state.label, header = frame.header, "Received");

        let outcome = match Codec::<Command>::decode(&self.codec, line) {
            Ok(command) => self.dispatch(state, command).await,
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(ServerError::Transport(e)) => Err(ServerError::Transport(e)),
            Err(e) => {
                if e.is_policy_violation() {
                    debug!(conn = %state.label, header = frame.header, error = %e, "Command refused");
                } else {
                    warn!(conn = %state.label, header = frame.header, error = %e, "Command failed");
                }
                if family == CommandFamily::Login {
                    self.auth.abort_login(&mut state.auth);
                }
                state
                    .reply(&Command::failure_reply(family, frame.first_token()))
                    .await
            }
        }
    }

    async fn dispatch(&self, state: &mut ConnectionState, command: Command) -> Result<()> {
        match command {
            Command::Signup { name, public_key } => {
                let client_id = self.auth.signup(&mut state.auth, &name, &public_key)?;
                state.reply(&Command::SignupSuccess { client_id }).await
            }
            Command::Login { client_id } => {
                let challenge = self.auth.begin_login(&mut state.auth, client_id)?;
                state.reply(&Command::LoginNonce(challenge)).await
            }
            Command::LoginAccept { signature } => {
                let client_id = self.auth.finish_login(&mut state.auth, &signature)?;
                if self
                    .router
                    .register(client_id, state.queue.clone())
                    .is_some_and(|previous| !previous.same_queue(&state.queue))
                {
                    info!(client_id = %client_id, "Client moved to a new connection");
                }
                state.reply(&Command::LoginSuccess).await
            }
            Command::SendStart { peer } => self.introduce(state, peer).await,
            Command::Send { peer, payload } => self.relay(state, peer, payload).await,
            Command::RenewKeyRequest => {
                let challenge = self.auth.begin_renewal(&mut state.auth)?;
                state.reply(&Command::RenewKeyRequestOk(challenge)).await
            }
            Command::RenewKey(proof) => {
                self.auth.finish_renewal(&mut state.auth, &proof)?;
                state.reply(&Command::RenewKeySuccess).await
            }
            other => Err(ServerError::unexpected(
                other.header().as_str(),
                state.auth.state_name(),
            )),
        }
    }

    // ========================================
    // Relay
    // ========================================

    /// Sends each side the other's id and current public key.
    async fn introduce(&self, state: &ConnectionState, peer: ClientId) -> Result<()> {
        let me = state.auth.identity().ok_or(ServerError::NotLoggedIn)?;
        let peer_queue = self.resolve_peer(peer)?;
        let peer_identity = self.directory().get(peer)?;

        state
            .reply(&Command::SendInvite {
                peer,
                public_key: peer_identity.public_key,
            })
            .await?;

        let invite = Command::SendInvite {
            peer: me.id,
            public_key: me.public_key.clone(),
        };
        peer_queue
            .send_line(invite.to_string())
            .await
            .map_err(|_| ServerError::peer_unavailable(peer.to_string()))?;

        info!(from = %me.id, to = %peer, "Public keys exchanged");
        Ok(())
    }

    /// Forwards an opaque payload with the sender id in the envelope.
    async fn relay(&self, state: &ConnectionState, peer: ClientId, payload: String) -> Result<()> {
        let me = state.auth.client_id().ok_or(ServerError::NotLoggedIn)?;
        let peer_queue = self.resolve_peer(peer)?;

        let forwarded = Command::Send { peer: me, payload };
        peer_queue
            .send_line(forwarded.to_string())
            .await
            .map_err(|_| ServerError::peer_unavailable(peer.to_string()))?;

        debug!(from = %me, to = %peer, "Payload relayed");
        Ok(())
    }

    fn resolve_peer(&self, peer: ClientId) -> Result<OutboundQueue> {
        self.router
            .lookup(peer)
            .ok_or_else(|| ServerError::peer_unavailable(peer.to_string()))
    }

    // ========================================
    // Close
    // ========================================

    /// Deregisters the connection and purges an unconfirmed signup.
    ///
    /// Safe to call more than once; only the first call acts.
    pub fn close(&self, state: &mut ConnectionState) {
        if state.closed {
            return;
        }
        state.closed = true;

        if let Some(client_id) = self.auth.close(&mut state.auth) {
            if self.router.deregister(client_id, &state.queue) {
                info!(client_id = %client_id, "Client disconnected");
            }
        }
    }
}

impl std::fmt::Debug for ConnectionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("auth", &self.auth)
            .field("router", &self.router)
            .finish()
    }
}

// ============================================
// Tests
// ============================================
