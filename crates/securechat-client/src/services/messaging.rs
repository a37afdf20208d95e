// ============================================
// File: crates/securechat-client/src/services/messaging.rs
// ============================================
//! # Peer Messaging Engine
//!
//! ## Creation Reason
//! End-to-end encrypted conversation with one peer through the relay.
//! The relay only introduces peers and forwards `SEND` payloads; key
//! agreement, authentication and encryption all happen here.
//!
//! ## Main Functionality
//! - `PeerSession`: Ratchet state for the current peer
//! - `MessagingEngine`: User requests and inbound `SEND*` frames
//!
//! ## Ratchet
//! ```text
//!  A (queue non-empty)                         B
//!  ─ DATA_DH_START  sigRSA(0 ‖ ga) 0 ga ─────►  verify with A's pinned key
//!                                               install(gb, ga)
//!  ◄──── DATA_DH_START_ACCEPT sigRSA(0 ‖ gb) 0 gb
//!  install(ga, gb)
//!  ─ DATA  AES(tag ‖ 0 ‖ text) ─────────────►  check seq, verify tag
//!  ...after more than `rekey_min_sequence` messages the coin may fire:
//!  ─ DATA_DH_CHANGE hmac(6 ‖ ga') 6 ga' ────►  same dance, HMAC instead of RSA
//! ```
//! Both sides install at sequence 0. Sequence numbers are per direction
//! and must arrive exactly in order.
//!
//! ## ⚠️ Important Note for Next Developer
//! - One peer at a time; `-send <id>` replaces the session
//! - Nothing leaves the queue until the peer's key is pinned
//! - Faults in a peer frame are answered with `DATA_MESSAGE_ERROR`;
//!   an incoming `DATA_MESSAGE_ERROR` is never answered
//!
//! ## Last Modified
//! v0.1.0 - Initial ratchet engine

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use securechat_common::ClientId;
use securechat_core::crypto::{cipher, mac, EphemeralKeyPair, IdentityPublicKey, MessageKeys};
use securechat_core::protocol::{
    key_exchange_text, Command, InnerMessage, KeyExchangeKind, TaggedMessage,
};

use crate::effects::{Effects, Notice};
use crate::error::{ClientError, Result};
use crate::services::auth::Account;
use crate::services::trust::TrustService;

/// Default number of messages under one key before a re-key may fire.
pub const DEFAULT_REKEY_MIN_SEQUENCE: u64 = 5;

/// Default wait for the peer's half of a key exchange.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================
// PeerSession
// ============================================

/// Ratchet state for one peer.
pub struct PeerSession {
    peer: ClientId,
    /// Long-term key the relay introduced the peer with
    claimed_key: Option<String>,
    keys: Option<MessageKeys>,
    /// `false` once the current keys should be replaced before the next send
    key_current: bool,
    ephemeral: Option<EphemeralKeyPair>,
    own_seq: u64,
    peer_ephemeral: Option<String>,
    peer_seq: u64,
    queue: VecDeque<String>,
    waiting_since: Option<Instant>,
}

impl PeerSession {
    fn new(peer: ClientId) -> Self {
        Self {
            peer,
            claimed_key: None,
            keys: None,
            key_current: false,
            ephemeral: None,
            own_seq: 0,
            peer_ephemeral: None,
            peer_seq: 0,
            queue: VecDeque::new(),
            waiting_since: None,
        }
    }

    /// Peer of this session.
    #[must_use]
    pub const fn peer(&self) -> ClientId {
        self.peer
    }

    /// Whether a shared key has been installed.
    #[must_use]
    pub const fn has_shared_key(&self) -> bool {
        self.keys.is_some()
    }

    /// Messages waiting to be sent.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Whether our half of a key exchange is awaiting the peer's answer.
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        self.waiting_since.is_some()
    }

    #[cfg(test)]
    const fn peer_seq(&self) -> u64 {
        self.peer_seq
    }

    /// Drops every piece of key material but keeps peer, claimed key and queue.
    fn restart_handshake(&mut self) {
        self.keys = None;
        self.key_current = false;
        self.ephemeral = None;
        self.own_seq = 0;
        self.peer_ephemeral = None;
        self.peer_seq = 0;
        self.waiting_since = None;
    }

    /// Proof over `text`: RSA signature before the first exchange, HMAC after.
    fn prove(&self, account: &Account, text: &str) -> Result<String> {
        match &self.keys {
            Some(keys) => Ok(mac::generate_tag(keys.authentication_key(), text)?),
            None => Ok(account.keys.sign(text)?),
        }
    }

    /// Moves the ratchet forward for sending.
    ///
    /// Returns `true` once fresh keys are installed, `false` while waiting
    /// for the peer's half.
    fn update_key(&mut self, account: &Account, fx: &mut Effects) -> Result<bool> {
        match (self.ephemeral.is_some(), self.peer_ephemeral.take()) {
            // Our half is out, nothing back yet
            (true, None) => Ok(false),

            // Open an exchange
            (false, None) => {
                let ephemeral = EphemeralKeyPair::generate();
                let public_key = ephemeral.public_key_base64();
                let proof = self.prove(account, &key_exchange_text(self.own_seq, &public_key))?;
                let kind = KeyExchangeKind::select(self.keys.is_some(), false);

                self.send(
                    &InnerMessage::KeyExchange {
                        kind,
                        proof,
                        sequence: self.own_seq,
                        public_key,
                    },
                    fx,
                );
                debug!(peer = %self.peer, kind = %kind, seq = self.own_seq, "Key exchange opened");

                self.ephemeral = Some(ephemeral);
                self.waiting_since = Some(Instant::now());
                self.own_seq += 1;
                Ok(false)
            }

            // Both halves present, the crossing exchange completes it
            (true, Some(peer_public)) => {
                if let Some(own) = self.ephemeral.take() {
                    self.install(own, &peer_public)?;
                }
                Ok(true)
            }

            // Answer the peer's exchange
            (false, Some(peer_public)) => {
                let ephemeral = EphemeralKeyPair::generate();
                let public_key = ephemeral.public_key_base64();
                let sequence = self.own_seq;
                let proof = self.prove(account, &key_exchange_text(sequence, &public_key))?;
                let kind = KeyExchangeKind::select(self.keys.is_some(), true);

                self.install(ephemeral, &peer_public)?;
                self.send(
                    &InnerMessage::KeyExchange {
                        kind,
                        proof,
                        sequence,
                        public_key,
                    },
                    fx,
                );
                debug!(peer = %self.peer, kind = %kind, "Key exchange answered");
                Ok(true)
            }
        }
    }

    /// Derives the new keys and restarts both sequences at 0.
    fn install(&mut self, own: EphemeralKeyPair, peer_public: &str) -> Result<()> {
        let secret = own.exchange(peer_public)?;
        self.keys = Some(MessageKeys::derive(&secret));
        self.key_current = true;
        self.ephemeral = None;
        self.peer_ephemeral = None;
        self.own_seq = 0;
        self.peer_seq = 0;
        self.waiting_since = None;
        info!(peer = %self.peer, "Shared key installed");
        Ok(())
    }

    fn send(&self, message: &InnerMessage, fx: &mut Effects) {
        fx.send(&Command::Send {
            peer: self.peer,
            payload: message.to_string(),
        });
    }

    /// Tags, seals and sends one text under the current keys.
    fn send_text(&self, text: &str, fx: &mut Effects) -> Result<()> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| ClientError::key_state(self.peer, "no shared key to send with"))?;

        let tagged = TaggedMessage {
            tag: mac::generate_tag(
                keys.authentication_key(),
                &TaggedMessage::text_for(self.own_seq, text),
            )?,
            sequence: self.own_seq,
            message: text.to_string(),
        };
        let sealed = cipher::encrypt(keys.encryption_key(), &tagged.to_string())?;
        self.send(&InnerMessage::Data { sealed }, fx);
        Ok(())
    }

    /// Advances the send sequence; past `min` the coin decides whether the
    /// key stays current.
    fn advance_own_seq(&mut self, min: u64, coin: fn() -> bool) {
        self.own_seq += 1;
        if self.key_current && self.own_seq > min {
            self.key_current = coin();
            if !self.key_current {
                debug!(peer = %self.peer, seq = self.own_seq, "Re-key scheduled");
            }
        }
    }

    fn receive_key_exchange(
        &mut self,
        account: &Account,
        kind: KeyExchangeKind,
        proof: &str,
        sequence: u64,
        public_key: String,
        fx: &mut Effects,
    ) -> Result<()> {
        if kind.is_rekey() && self.keys.is_none() {
            return Err(ClientError::key_state(self.peer, "re-key before any shared key"));
        }
        if !kind.is_rekey() && self.keys.is_some() {
            return Err(ClientError::key_state(
                self.peer,
                "signed exchange while a shared key exists",
            ));
        }
        if sequence != self.peer_seq {
            return Err(ClientError::SequenceMismatch {
                peer: self.peer,
                found: sequence,
                expected: self.peer_seq,
            });
        }
        if kind.is_accept() && self.ephemeral.is_none() {
            return Err(ClientError::key_state(self.peer, "answer to no exchange"));
        }

        let text = key_exchange_text(sequence, &public_key);
        match &self.keys {
            Some(keys) => mac::verify_tag(keys.authentication_key(), &text, proof)?,
            None => {
                let claimed = self
                    .claimed_key
                    .as_deref()
                    .ok_or_else(|| ClientError::key_state(self.peer, "no introduced identity key"))?;
                IdentityPublicKey::from_base64(claimed)?.verify(&text, proof)?;
            }
        }
        self.peer_seq += 1;

        if kind.is_accept() {
            if let Some(own) = self.ephemeral.take() {
                self.install(own, &public_key)?;
            }
        } else {
            self.peer_ephemeral = Some(public_key);
            self.key_current = false;
            self.update_key(account, fx)?;
        }
        Ok(())
    }

    fn receive_data(&mut self, sealed: &str, fx: &mut Effects) -> Result<()> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| ClientError::key_state(self.peer, "data before key exchange"))?;

        let plaintext = cipher::decrypt(keys.encryption_key(), sealed)?;
        let tagged: TaggedMessage = plaintext.parse()?;
        if tagged.sequence != self.peer_seq {
            return Err(ClientError::SequenceMismatch {
                peer: self.peer,
                found: tagged.sequence,
                expected: self.peer_seq,
            });
        }
        mac::verify_tag(
            keys.authentication_key(),
            &tagged.authenticated_text(),
            &tagged.tag,
        )?;

        self.peer_seq += 1;
        fx.notices.push(Notice::Message {
            from: self.peer,
            text: tagged.message,
        });
        Ok(())
    }
}

impl fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("peer", &self.peer)
            .field("has_shared_key", &self.keys.is_some())
            .field("key_current", &self.key_current)
            .field("own_seq", &self.own_seq)
            .field("peer_seq", &self.peer_seq)
            .field("queued", &self.queue.len())
            .field("waiting", &self.waiting_since.is_some())
            .finish()
    }
}

// ============================================
// MessagingEngine
// ============================================

/// Conversation state of the client.
pub struct MessagingEngine {
    trust: TrustService,
    session: Option<PeerSession>,
    rekey_min_sequence: u64,
    handshake_timeout: Duration,
    rekey_coin: fn() -> bool,
}

impl MessagingEngine {
    /// Creates an engine with no peer selected.
    #[must_use]
    pub fn new(trust: TrustService, rekey_min_sequence: u64, handshake_timeout: Duration) -> Self {
        Self {
            trust,
            session: None,
            rekey_min_sequence,
            handshake_timeout,
            rekey_coin: rand::random::<bool>,
        }
    }

    /// Replaces the coin that decides whether a key stays in use.
    #[must_use]
    pub fn with_rekey_coin(mut self, coin: fn() -> bool) -> Self {
        self.rekey_coin = coin;
        self
    }

    /// Current peer session.
    #[must_use]
    pub fn session(&self) -> Option<&PeerSession> {
        self.session.as_ref()
    }

    /// Current peer.
    #[must_use]
    pub fn peer(&self) -> Option<ClientId> {
        self.session.as_ref().map(PeerSession::peer)
    }

    /// Trust service shared with the command handlers.
    #[must_use]
    pub fn trust(&self) -> &TrustService {
        &self.trust
    }

    // ========================================
    // User Requests
    // ========================================

    /// Selects `peer` and asks the relay to introduce it.
    ///
    /// # Errors
    /// `SelfSend`, `Blocked`, storage failures.
    pub fn request_send(&mut self, account: &Account, peer: ClientId) -> Result<Effects> {
        if peer == account.id {
            return Err(ClientError::SelfSend {
                client_id: account.id,
            });
        }
        if self.trust.is_blocked(peer)? {
            return Err(ClientError::Blocked { peer });
        }

        self.session = Some(PeerSession::new(peer));
        let mut fx = Effects::new();
        fx.send(&Command::SendStart { peer });
        fx.info(format!("Connecting to Client_ID {peer}..."));
        Ok(fx)
    }

    /// Queues a message for the current peer and sends what it can.
    ///
    /// # Errors
    /// `NoPeerSelected`, `Blocked`, crypto failures.
    pub fn submit_message(&mut self, account: &Account, text: &str) -> Result<Effects> {
        if text.is_empty() {
            return Err(ClientError::invalid_input("message", "cannot be empty"));
        }
        let session = self.session.as_mut().ok_or(ClientError::NoPeerSelected)?;
        let peer = session.peer;
        if self.trust.is_blocked(peer)? {
            return Err(ClientError::Blocked { peer });
        }
        session.queue.push_back(text.to_string());
        let trusted = match session.claimed_key.as_deref() {
            Some(key) => Some(self.trust.is_trusted(peer, key)?),
            None => None,
        };

        let mut fx = Effects::new();
        match trusted {
            None => fx.info(format!("Waiting for Client_ID {peer} to be introduced")),
            Some(false) => fx.warn(format!(
                "Message held: public key of Client_ID {peer} is not trusted. \
                 Verify it and use -send_trust {peer}"
            )),
            Some(true) => self.process_queue(account, &mut fx)?,
        }
        Ok(fx)
    }

    /// Pins the key the relay introduced the current peer with, then
    /// releases held messages.
    ///
    /// # Errors
    /// `InvalidInput` if `peer` is not the introduced current peer.
    pub fn send_trust(&mut self, account: &Account, peer: ClientId) -> Result<Effects> {
        let claimed = self
            .session
            .as_ref()
            .filter(|session| session.peer == peer)
            .and_then(|session| session.claimed_key.clone())
            .ok_or_else(|| {
                ClientError::invalid_input(
                    "client_id",
                    format!("no introduced key for Client_ID {peer}, use -send {peer} first"),
                )
            })?;

        self.trust.trust(peer, &claimed)?;
        let mut fx = Effects::new();
        fx.info(format!("Public key of Client_ID {peer} trusted"));
        self.process_queue(account, &mut fx)?;
        Ok(fx)
    }

    /// Sends held messages after an out-of-band trust change.
    ///
    /// # Errors
    /// Crypto or storage failures.
    pub fn resume(&mut self, account: &Account) -> Result<Effects> {
        let mut fx = Effects::new();
        self.process_queue(account, &mut fx)?;
        Ok(fx)
    }

    /// Ends the session with `peer` if it is the current one.
    pub fn forget_peer(&mut self, peer: ClientId) -> bool {
        if self.peer() == Some(peer) {
            self.session = None;
            true
        } else {
            false
        }
    }

    /// Gives up on a key exchange the peer never answered.
    #[must_use]
    pub fn tick(&mut self, now: Instant) -> Effects {
        let mut fx = Effects::new();
        let expired = self
            .session
            .as_ref()
            .and_then(|session| session.waiting_since)
            .is_some_and(|since| now.saturating_duration_since(since) >= self.handshake_timeout);

        if expired {
            if let Some(session) = self.session.take() {
                warn!(peer = %session.peer, dropped = session.queue.len(), "Key exchange timed out");
                fx.warn(format!(
                    "Client_ID {peer} did not answer the key exchange ({dropped} message(s) \
                     dropped). Use -send {peer} to reconnect",
                    peer = session.peer,
                    dropped = session.queue.len(),
                ));
            }
        }
        fx
    }

    // ========================================
    // Relay Frames
    // ========================================

    /// Handles `SEND_INVITE <peer> <key>`.
    ///
    /// # Errors
    /// Storage failures or an unparsable key.
    pub fn on_invite(
        &mut self,
        account: &Account,
        peer: ClientId,
        public_key: &str,
    ) -> Result<Effects> {
        let mut fx = Effects::new();
        if self.trust.is_blocked(peer)? {
            debug!(peer = %peer, "Invite from blocked client refused");
            fx.send(&Command::Send {
                peer,
                payload: InnerMessage::MessageError.to_string(),
            });
            return Ok(fx);
        }
        let key = IdentityPublicKey::from_base64(public_key)?;

        // Only text typed between `-send` and the first introduction is kept
        let mut session = PeerSession::new(peer);
        if let Some(previous) = self.session.take().filter(|s| s.peer == peer) {
            if previous.claimed_key.is_none() {
                session.queue = previous.queue;
            } else if !previous.queue.is_empty() {
                debug!(
                    peer = %peer,
                    dropped = previous.queue.len(),
                    "Queue flushed on re-introduction"
                );
            }
        }
        session.claimed_key = Some(key.as_base64().to_string());
        self.session = Some(session);

        if self.trust.is_trusted(peer, key.as_base64())? {
            fx.info(format!("Connected to Client_ID {peer}"));
            self.process_queue(account, &mut fx)?;
        } else {
            fx.warn(format!(
                "Client_ID {peer} presented an untrusted public key (fingerprint {}). \
                 Verify it and use -send_trust {peer}",
                key.fingerprint()
            ));
        }
        Ok(fx)
    }

    /// Handles `SEND <peer> <payload>` from the relay.
    ///
    /// Faults are turned into a `DATA_MESSAGE_ERROR` reply and a notice.
    #[must_use]
    pub fn on_send(&mut self, account: &Account, peer: ClientId, payload: &str) -> Effects {
        let mut fx = Effects::new();
        if let Err(e) = self.receive(account, peer, payload, &mut fx) {
            if e.warrants_error_reply() {
                fx.send(&Command::Send {
                    peer,
                    payload: InnerMessage::MessageError.to_string(),
                });
            }
            if matches!(e, ClientError::Blocked { .. }) {
                debug!(peer = %peer, "Frame from blocked client refused");
            } else {
                warn!(peer = %peer, error = %e, "Peer frame refused");
                fx.warn(format!("Message from Client_ID {peer} refused: {e}"));
            }
        }
        fx
    }

    /// Handles `SEND_FAILURE [<peer>]`.
    #[must_use]
    pub fn on_send_failure(&mut self, peer: Option<&str>) -> Effects {
        let mut fx = Effects::new();
        let Some(token) = peer else {
            fx.error("Send failed");
            return fx;
        };

        let unreachable = token
            .parse::<ClientId>()
            .ok()
            .filter(|id| {
                self.session
                    .as_ref()
                    .is_some_and(|s| s.peer == *id && s.keys.is_none())
            });
        if let Some(id) = unreachable {
            self.session = None;
            fx.error(format!("Client_ID {id} is not available"));
        } else {
            fx.error(format!("Could not deliver to Client_ID {token}"));
        }
        fx
    }

    fn receive(
        &mut self,
        account: &Account,
        peer: ClientId,
        payload: &str,
        fx: &mut Effects,
    ) -> Result<()> {
        let message: InnerMessage = payload.parse()?;

        if matches!(message, InnerMessage::MessageError) {
            if self.trust.is_blocked(peer)? {
                return Ok(());
            }
            if let Some(session) = self.session.as_mut().filter(|s| s.peer == peer) {
                // A refused opening leaves the peer where it was; start over
                if session.keys.is_none() {
                    session.restart_handshake();
                }
            }
            fx.warn(format!("Client_ID {peer} could not process the last message"));
            return Ok(());
        }

        if self.trust.is_blocked(peer)? {
            return Err(ClientError::Blocked { peer });
        }
        let expected = self.peer();
        let session = self
            .session
            .as_mut()
            .filter(|s| s.peer == peer)
            .ok_or(ClientError::WrongPeer {
                found: peer,
                expected,
            })?;
        let trusted = match session.claimed_key.as_deref() {
            Some(key) => self.trust.is_trusted(peer, key)?,
            None => false,
        };
        if !trusted {
            return Err(ClientError::Untrusted { peer });
        }

        match message {
            InnerMessage::KeyExchange {
                kind,
                proof,
                sequence,
                public_key,
            } => {
                session.receive_key_exchange(account, kind, &proof, sequence, public_key, fx)?;
                self.process_queue(account, fx)
            }
            InnerMessage::Data { sealed } => session.receive_data(&sealed, fx),
            InnerMessage::MessageError => Ok(()),
        }
    }

    /// Sends queued messages while the key is usable, re-keying when it is not.
    fn process_queue(&mut self, account: &Account, fx: &mut Effects) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let trusted = match session.claimed_key.as_deref() {
            Some(key) => self.trust.is_trusted(session.peer, key)?,
            None => false,
        };
        if !trusted || self.trust.is_blocked(session.peer)? {
            return Ok(());
        }

        while let Some(text) = session.queue.front().cloned() {
            if !session.key_current {
                if !session.update_key(account, fx)? {
                    break;
                }
                continue;
            }
            session.send_text(&text, fx)?;
            session.queue.pop_front();
            session.advance_own_seq(self.rekey_min_sequence, self.rekey_coin);
        }
        Ok(())
    }
}

impl fmt::Debug for MessagingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingEngine")
            .field("session", &self.session)
            .field("rekey_min_sequence", &self.rekey_min_sequence)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;
    use securechat_core::IdentityKeyPair;
    use std::sync::Arc;

    fn id(value: u32) -> ClientId {
        ClientId::new(value).unwrap()
    }

    struct Side {
        account: Account,
        engine: MessagingEngine,
    }

    impl Side {
        fn new(value: u32, coin: fn() -> bool) -> Self {
            let trust = TrustService::new(Arc::new(MemoryStore::new()));
            Self {
                account: Account {
                    id: id(value),
                    name: format!("client{value}"),
                    keys: IdentityKeyPair::generate(1024).unwrap(),
                },
                engine: MessagingEngine::new(trust, 2, DEFAULT_HANDSHAKE_TIMEOUT)
                    .with_rekey_coin(coin),
            }
        }

        fn public_key(&self) -> String {
            self.account.keys.public_key().as_base64().to_string()
        }

        fn submit(&mut self, text: &str) -> Effects {
            self.engine.submit_message(&self.account, text).unwrap()
        }
    }

    /// Everything that crossed the wire plus what each side showed.
    #[derive(Default)]
    struct Transcript {
        wire: Vec<String>,
        a: Vec<Notice>,
        b: Vec<Notice>,
    }

    impl Transcript {
        fn messages(notices: &[Notice]) -> Vec<String> {
            notices
                .iter()
                .filter_map(|n| match n {
                    Notice::Message { text, .. } => Some(text.clone()),
                    _ => None,
                })
                .collect()
        }

        fn received_by_b(&self) -> Vec<String> {
            Self::messages(&self.b)
        }

        fn received_by_a(&self) -> Vec<String> {
            Self::messages(&self.a)
        }
    }

    /// Delivers `SEND` lines back and forth until both sides are quiet.
    fn pump(a: &mut Side, b: &mut Side, a_out: Effects, b_out: Effects) -> Transcript {
        let mut log = Transcript::default();
        let (mut a_lines, mut b_lines) = (a_out.outbound, b_out.outbound);
        log.a.extend(a_out.notices);
        log.b.extend(b_out.notices);

        while !a_lines.is_empty() || !b_lines.is_empty() {
            let mut next_a = Vec::new();
            let mut next_b = Vec::new();
            for line in a_lines.drain(..) {
                log.wire.push(line.clone());
                let Command::Send { peer, payload } = line.parse::<Command>().unwrap() else {
                    panic!("unexpected line from A: {line}");
                };
                assert_eq!(peer, b.account.id);
                let fx = b.engine.on_send(&b.account, a.account.id, &payload);
                next_b.extend(fx.outbound);
                log.b.extend(fx.notices);
            }
            for line in b_lines.drain(..) {
                log.wire.push(line.clone());
                let Command::Send { peer, payload } = line.parse::<Command>().unwrap() else {
                    panic!("unexpected line from B: {line}");
                };
                assert_eq!(peer, a.account.id);
                let fx = a.engine.on_send(&a.account, b.account.id, &payload);
                next_a.extend(fx.outbound);
                log.a.extend(fx.notices);
            }
            a_lines = next_a;
            b_lines = next_b;
        }
        log
    }

    /// A selects B, the relay introduces both ways; `trust` pins the keys.
    fn connect(a: &mut Side, b: &mut Side, trust: bool) {
        let fx = a.engine.request_send(&a.account, b.account.id).unwrap();
        assert_eq!(fx.outbound, vec![format!("SEND_START {}", b.account.id)]);
        if trust {
            a.engine.trust().trust(b.account.id, &b.public_key()).unwrap();
            b.engine.trust().trust(a.account.id, &a.public_key()).unwrap();
        }
        let fx = a
            .engine
            .on_invite(&a.account, b.account.id, &b.public_key())
            .unwrap();
        assert!(fx.outbound.is_empty());
        let fx = b
            .engine
            .on_invite(&b.account, a.account.id, &a.public_key())
            .unwrap();
        assert!(fx.outbound.is_empty());
    }

    fn pair(coin: fn() -> bool) -> (Side, Side) {
        let mut a = Side::new(1, coin);
        let mut b = Side::new(2, coin);
        connect(&mut a, &mut b, true);
        (a, b)
    }

    #[test]
    fn test_first_message_runs_signed_exchange() {
        let (mut a, mut b) = pair(|| true);
        let fx = a.submit("hello bob");
        assert_eq!(fx.outbound.len(), 1);
        assert!(fx.outbound[0].starts_with("SEND 2 DATA_DH_START "));
        assert!(a.engine.session().unwrap().is_waiting());

        let log = pump(&mut a, &mut b, fx, Effects::new());
        assert!(log.wire[1].starts_with("SEND 1 DATA_DH_START_ACCEPT "));
        assert!(log.wire[2].starts_with("SEND 2 DATA "));
        assert_eq!(log.received_by_b(), vec!["hello bob"]);
        assert!(a.engine.session().unwrap().has_shared_key());
        assert!(!a.engine.session().unwrap().is_waiting());

        // Replies reuse the installed key, no exchange
        let fx = b.submit("hi alice");
        assert!(fx.outbound[0].starts_with("SEND 1 DATA "));
        let log = pump(&mut a, &mut b, Effects::new(), fx);
        assert_eq!(log.received_by_a(), vec!["hi alice"]);
    }

    #[test]
    fn test_messages_keep_order_across_rekeys() {
        let (mut a, mut b) = pair(|| false);
        let mut wire = Vec::new();
        let mut received = Vec::new();
        for i in 0..8 {
            let fx = a.submit(&format!("message {i}"));
            let log = pump(&mut a, &mut b, fx, Effects::new());
            received.extend(log.received_by_b());
            wire.extend(log.wire);
        }

        let expected: Vec<String> = (0..8).map(|i| format!("message {i}")).collect();
        assert_eq!(received, expected);
        assert!(wire.iter().any(|l| l.starts_with("SEND 2 DATA_DH_CHANGE ")));
        assert!(wire.iter().any(|l| l.starts_with("SEND 1 DATA_DH_CHANGE_ACCEPT ")));
        assert!(!wire.iter().any(|l| l.contains("DATA_MESSAGE_ERROR")));
    }

    #[test]
    fn test_replayed_data_is_refused() {
        let (mut a, mut b) = pair(|| true);
        let fx = a.submit("once");
        let log = pump(&mut a, &mut b, fx, Effects::new());
        let data_line = log.wire.last().unwrap().clone();
        let Command::Send { payload, .. } = data_line.parse::<Command>().unwrap() else {
            panic!("expected SEND");
        };

        let seen = b.engine.session().unwrap().peer_seq();
        let fx = b.engine.on_send(&b.account, a.account.id, &payload);
        assert_eq!(fx.outbound, vec!["SEND 1 DATA_MESSAGE_ERROR"]);
        assert!(Transcript::messages(&fx.notices).is_empty());
        assert!(fx.notices.iter().any(Notice::is_problem));
        assert_eq!(b.engine.session().unwrap().peer_seq(), seen);
    }

    #[test]
    fn test_skipped_sequence_is_refused() {
        let (mut a, mut b) = pair(|| true);
        let fx = a.submit("first");
        pump(&mut a, &mut b, fx, Effects::new());
        let seen = b.engine.session().unwrap().peer_seq();

        // "second" never reaches B, so "third" arrives one step ahead
        let lost = a.submit("second");
        assert!(lost.outbound[0].starts_with("SEND 2 DATA "));
        let fx = a.submit("third");
        let Command::Send { payload, .. } = fx.outbound[0].parse::<Command>().unwrap() else {
            panic!("expected SEND");
        };

        let fx = b.engine.on_send(&b.account, a.account.id, &payload);
        assert_eq!(fx.outbound, vec!["SEND 1 DATA_MESSAGE_ERROR"]);
        assert!(Transcript::messages(&fx.notices).is_empty());
        assert_eq!(b.engine.session().unwrap().peer_seq(), seen);
    }

    #[test]
    fn test_tampered_data_is_refused() {
        let (mut a, mut b) = pair(|| true);
        let fx = a.submit("first");
        pump(&mut a, &mut b, fx, Effects::new());

        let fx = a.submit("second");
        let Command::Send { payload, .. } = fx.outbound[0].parse::<Command>().unwrap() else {
            panic!("expected SEND");
        };
        let (iv, body) = payload.trim_start_matches("DATA ").split_once(':').unwrap();
        let mut bytes = body.as_bytes().to_vec();
        bytes[0] = if bytes[0] == b'A' { b'B' } else { b'A' };
        let forged = format!("DATA {iv}:{}", String::from_utf8(bytes).unwrap());

        let fx = b.engine.on_send(&b.account, a.account.id, &forged);
        assert!(Transcript::messages(&fx.notices).is_empty());
        assert!(fx.notices.iter().any(Notice::is_problem));
    }

    #[test]
    fn test_untrusted_peer_holds_then_drains() {
        let mut a = Side::new(1, || true);
        let mut b = Side::new(2, || true);
        connect(&mut a, &mut b, false);

        // B holds its message until A's key is pinned
        let fx = b.submit("held");
        assert!(fx.outbound.is_empty());
        assert!(fx.notices.iter().any(Notice::is_problem));
        assert_eq!(b.engine.session().unwrap().queued(), 1);

        a.engine.trust().trust(b.account.id, &b.public_key()).unwrap();
        let fx = b.engine.send_trust(&b.account, a.account.id).unwrap();
        assert!(fx.outbound[0].starts_with("SEND 1 DATA_DH_START "));

        let log = pump(&mut a, &mut b, Effects::new(), fx);
        assert_eq!(log.received_by_a(), vec!["held"]);
        assert_eq!(b.engine.session().unwrap().queued(), 0);
    }

    #[test]
    fn test_reintroduction_flushes_queue() {
        let mut a = Side::new(1, || true);
        let mut b = Side::new(2, || true);
        connect(&mut a, &mut b, false);

        let fx = b.submit("held before restart");
        assert!(fx.outbound.is_empty());
        assert_eq!(b.engine.session().unwrap().queued(), 1);

        b.engine
            .on_invite(&b.account, a.account.id, &a.public_key())
            .unwrap();
        assert_eq!(b.engine.session().unwrap().queued(), 0);

        // Trusting afterwards has nothing left to send
        let fx = b.engine.send_trust(&b.account, a.account.id).unwrap();
        assert!(fx.outbound.is_empty());
    }

    #[test]
    fn test_text_typed_before_introduction_survives() {
        let mut a = Side::new(1, || true);
        let b = Side::new(2, || true);
        a.engine.trust().trust(b.account.id, &b.public_key()).unwrap();
        a.engine.request_send(&a.account, b.account.id).unwrap();

        let fx = a.submit("early");
        assert!(fx.outbound.is_empty());
        assert_eq!(a.engine.session().unwrap().queued(), 1);

        let fx = a
            .engine
            .on_invite(&a.account, b.account.id, &b.public_key())
            .unwrap();
        assert!(fx.outbound[0].starts_with("SEND 2 DATA_DH_START "));
    }

    #[test]
    fn test_refused_opening_restarts_handshake() {
        let mut a = Side::new(1, || true);
        let mut b = Side::new(2, || true);
        connect(&mut a, &mut b, false);
        a.engine.trust().trust(b.account.id, &b.public_key()).unwrap();

        // B does not trust A yet and refuses the opening
        let fx = a.submit("first");
        let log = pump(&mut a, &mut b, fx, Effects::new());
        assert!(log.wire.iter().any(|l| l == "SEND 1 DATA_MESSAGE_ERROR"));
        assert!(log.received_by_b().is_empty());
        assert!(!a.engine.session().unwrap().is_waiting());

        b.engine.send_trust(&b.account, a.account.id).unwrap();
        let fx = a.submit("second");
        let log = pump(&mut a, &mut b, fx, Effects::new());
        assert_eq!(log.received_by_b(), vec!["first", "second"]);
    }

    #[test]
    fn test_block_supersedes_trust() {
        let (mut a, mut b) = pair(|| true);
        b.engine.trust().block(a.account.id).unwrap();

        let fx = a.submit("anyone there");
        let log = pump(&mut a, &mut b, fx, Effects::new());
        assert!(log.received_by_b().is_empty());
        assert!(log.wire.iter().any(|l| l == "SEND 1 DATA_MESSAGE_ERROR"));

        // B cannot write to A either
        assert!(matches!(
            b.engine.submit_message(&b.account, "no"),
            Err(ClientError::Blocked { .. })
        ));
        assert!(matches!(
            b.engine.request_send(&b.account, a.account.id),
            Err(ClientError::Blocked { .. })
        ));

        // Invites from a blocked client are answered with an error
        let fx = b
            .engine
            .on_invite(&b.account, a.account.id, &a.public_key())
            .unwrap();
        assert_eq!(fx.outbound, vec!["SEND 1 DATA_MESSAGE_ERROR"]);
    }

    #[test]
    fn test_simultaneous_openings_converge() {
        let (mut a, mut b) = pair(|| true);
        let fa = a.submit("from a");
        let fb = b.submit("from b");
        assert!(fa.outbound[0].contains("DATA_DH_START "));
        assert!(fb.outbound[0].contains("DATA_DH_START "));

        let log = pump(&mut a, &mut b, fa, fb);
        assert_eq!(log.received_by_b(), vec!["from a"]);
        assert_eq!(log.received_by_a(), vec!["from b"]);
        assert!(!log.wire.iter().any(|l| l.contains("ACCEPT")));
        assert!(!log.wire.iter().any(|l| l.contains("DATA_MESSAGE_ERROR")));
    }

    #[test]
    fn test_handshake_timeout_resets_session() {
        let (mut a, _b) = pair(|| true);
        let _unanswered = a.submit("lost");
        assert!(a.engine.tick(Instant::now()).is_empty());

        let fx = a.engine.tick(Instant::now() + DEFAULT_HANDSHAKE_TIMEOUT);
        assert!(fx.notices.iter().any(Notice::is_problem));
        assert!(a.engine.session().is_none());
    }

    #[test]
    fn test_frames_from_other_peers_are_refused() {
        let (mut a, mut b) = pair(|| true);
        let fx = a.submit("hi");
        pump(&mut a, &mut b, fx, Effects::new());

        let fx = b.engine.on_send(&b.account, id(9), "DATA abc:def");
        assert_eq!(fx.outbound, vec!["SEND 9 DATA_MESSAGE_ERROR"]);

        // Garbage is logged, never answered
        let fx = b.engine.on_send(&b.account, a.account.id, "NONSENSE");
        assert!(fx.outbound.is_empty());
        assert!(fx.notices.iter().any(Notice::is_problem));

        // Error markers are never answered
        let fx = b.engine.on_send(&b.account, a.account.id, "DATA_MESSAGE_ERROR");
        assert!(fx.outbound.is_empty());
    }

    #[test]
    fn test_request_send_refusals() {
        let mut a = Side::new(1, || true);
        assert!(matches!(
            a.engine.request_send(&a.account, id(1)),
            Err(ClientError::SelfSend { .. })
        ));
        assert!(matches!(
            a.engine.submit_message(&a.account, "x"),
            Err(ClientError::NoPeerSelected)
        ));
        assert!(a.engine.send_trust(&a.account, id(2)).is_err());
    }

    #[test]
    fn test_send_failure_drops_unanswered_session() {
        let mut a = Side::new(1, || true);
        a.engine.request_send(&a.account, id(2)).unwrap();
        let fx = a.engine.on_send_failure(Some("2"));
        assert_eq!(fx.notices.len(), 1);
        assert!(a.engine.peer().is_none());

        let fx = a.engine.on_send_failure(None);
        assert_eq!(fx.notices, vec![Notice::Error("Send failed".into())]);
    }
}
