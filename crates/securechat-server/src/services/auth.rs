// ============================================
// File: crates/securechat-server/src/services/auth.rs
// ============================================
//! # Authentication Service
//!
//! ## Creation Reason
//! Server half of signup, challenge-response login and key renewal.
//! Shared logic lives in `AuthService`; each connection owns its own
//! `AuthSession` and passes it in, so no session state is ever locked.
//!
//! ## Per-Connection State Machine
//! ```text
//!            SIGNUP                 LOGIN <id>              LOGIN_ACCEPT ok
//!  ┌─────┐ ─────────► ┌──────────┐ ───────────► ┌──────────┐ ──────────► ┌───────────┐
//!  │ New │            │ SignedUp │              │Challenged│             │ LoggedIn  │
//!  └─────┘ ──────────────────────────────────►  └──────────┘             └───────────┘
//!                       LOGIN <id>                   │ fail                 │  ▲
//!                                                    ▼                      │  │ RENEW_KEY ok
//!                                     discard challenge, purge a     RENEW_KEY_REQUEST
//!                                     stale never-logged-in signup          │  │
//!                                                                           ▼  │
//!                                                                    ┌────────────┐
//!                                                                    │  Renewing  │
//!                                                                    └────────────┘
//! ```
//!
//! ## Cleanup Rules
//! - A login failure deletes this connection's signup if it never logged
//!   in and the signup is older than the configured timeout
//! - Closing a connection deletes a never-logged-in signup unconditionally
//!
//! ## ⚠️ Important Note for Next Developer
//! - Challenges are single-use: issuing a new one overwrites the old, and
//!   a verification attempt consumes it whether it passes or not
//! - Renewal touches storage only after BOTH signatures verify
//! - Router registration is the caller's job, after `finish_login`
//!
//! ## Last Modified
//! v0.1.0 - Initial auth service

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use securechat_common::ClientId;
use securechat_core::crypto::{
    Challenge, ChallengeCrypto, DefaultChallengeCrypto, IdentityPublicKey, RenewalProof,
};

use crate::error::{Result, ServerError};
use crate::services::directory::{IdentityDirectory, RegisteredIdentity};

// ============================================
// AuthSession
// ============================================

/// Whether this connection may still sign up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignupState {
    /// No signup on this connection yet
    Available,
    /// Registered an identity at `at`
    Registered { client_id: ClientId, at: Instant },
    /// Signup used and settled (purged or connection closed)
    Closed,
}

/// A login challenge waiting for its signature.
#[derive(Debug, Clone)]
struct PendingLogin {
    identity: RegisteredIdentity,
    challenge: Challenge,
}

/// Authentication state of one connection.
#[derive(Debug)]
pub struct AuthSession {
    signup: SignupState,
    pending_login: Option<PendingLogin>,
    logged_in: Option<RegisteredIdentity>,
    renewal: Option<Challenge>,
}

impl AuthSession {
    /// Fresh state for a new connection.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            signup: SignupState::Available,
            pending_login: None,
            logged_in: None,
            renewal: None,
        }
    }

    /// Logged-in identity, as of the last login or renewal.
    #[must_use]
    pub const fn identity(&self) -> Option<&RegisteredIdentity> {
        self.logged_in.as_ref()
    }

    /// Logged-in client id.
    #[must_use]
    pub fn client_id(&self) -> Option<ClientId> {
        self.logged_in.as_ref().map(|identity| identity.id)
    }

    /// Returns `true` once a login has verified on this connection.
    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        self.logged_in.is_some()
    }

    /// Short state name for diagnostics.
    #[must_use]
    pub const fn state_name(&self) -> &'static str {
        if self.renewal.is_some() {
            "renewing"
        } else if self.logged_in.is_some() {
            "logged-in"
        } else if self.pending_login.is_some() {
            "challenged"
        } else if let SignupState::Registered { .. } = self.signup {
            "signed-up"
        } else {
            "new"
        }
    }

    /// Id registered on this connection that has not logged in, if any.
    const fn unconfirmed_signup(&self) -> Option<(ClientId, Instant)> {
        match self.signup {
            SignupState::Registered { client_id, at } if self.logged_in.is_none() => {
                Some((client_id, at))
            }
            _ => None,
        }
    }
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// AuthService
// ============================================

/// Signup, login and renewal against the identity directory.
///
/// # Thread Safety
/// Stateless apart from shared handles; one instance serves every connection.
pub struct AuthService {
    directory: Arc<dyn IdentityDirectory>,
    crypto: Arc<dyn ChallengeCrypto>,
    signup_timeout: Duration,
}

impl AuthService {
    /// Creates the service with RSA challenge verification.
    #[must_use]
    pub fn new(directory: Arc<dyn IdentityDirectory>, signup_timeout: Duration) -> Self {
        Self::with_crypto(directory, Arc::new(DefaultChallengeCrypto::new()), signup_timeout)
    }

    /// Creates the service with a custom verification backend.
    #[must_use]
    pub fn with_crypto(
        directory: Arc<dyn IdentityDirectory>,
        crypto: Arc<dyn ChallengeCrypto>,
        signup_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            crypto,
            signup_timeout,
        }
    }

    /// The directory this service reads and writes.
    #[must_use]
    pub fn directory(&self) -> &Arc<dyn IdentityDirectory> {
        &self.directory
    }

    // ========================================
    // Signup
    // ========================================

    /// Registers `(name, public_key)` and returns the new id.
    ///
    /// # Errors
    /// - `UnexpectedCommand`: This connection already signed up
    /// - `Core`: The public key does not parse
    /// - `Storage`: The directory refused the insert
    pub fn signup(
        &self,
        session: &mut AuthSession,
        name: &str,
        public_key: &str,
    ) -> Result<ClientId> {
        if session.signup != SignupState::Available {
            return Err(ServerError::unexpected("SIGNUP", session.state_name()));
        }
        if name.trim().is_empty() {
            return Err(ServerError::Core(securechat_core::CoreError::malformed(
                "SIGNUP",
                "empty name",
            )));
        }
        IdentityPublicKey::from_base64(public_key)?;

        let client_id = self.directory.insert(name, public_key)?;
        session.signup = SignupState::Registered {
            client_id,
            at: Instant::now(),
        };

        info!(client_id = %client_id, name, "Signup complete");
        Ok(client_id)
    }

    // ========================================
    // Login
    // ========================================

    /// Issues a login challenge for `client_id`.
    ///
    /// # Errors
    /// - `UnexpectedCommand`: Already logged in as a different client
    /// - `UnknownClient`: No such registration
    pub fn begin_login(&self, session: &mut AuthSession, client_id: ClientId) -> Result<Challenge> {
        if let Some(current) = session.client_id() {
            if current != client_id {
                self.abort_login(session);
                return Err(ServerError::unexpected("LOGIN", session.state_name()));
            }
        }

        let identity = match self.directory.get(client_id) {
            Ok(identity) => identity,
            Err(e) => {
                self.abort_login(session);
                return Err(e);
            }
        };

        let challenge = Challenge::generate();
        session.pending_login = Some(PendingLogin {
            identity,
            challenge,
        });

        debug!(client_id = %client_id, "Login challenge issued");
        Ok(challenge)
    }

    /// Verifies the signed challenge and marks the session logged in.
    ///
    /// # Errors
    /// - `UnexpectedCommand`: No challenge outstanding
    /// - `Core`: Signature does not verify
    pub fn finish_login(&self, session: &mut AuthSession, signature: &str) -> Result<ClientId> {
        let Some(pending) = session.pending_login.take() else {
            self.abort_login(session);
            return Err(ServerError::unexpected("LOGIN_ACCEPT", session.state_name()));
        };

        let client_id = pending.identity.id;
        if let Err(e) =
            self.crypto
                .verify_login(&pending.identity.public_key, &pending.challenge, signature)
        {
            warn!(client_id = %client_id, error = %e, "Login signature rejected");
            self.abort_login(session);
            return Err(e.into());
        }

        session.logged_in = Some(pending.identity);
        info!(client_id = %client_id, "Login success");
        Ok(client_id)
    }

    /// Discards any pending login and purges a stale, never-logged-in signup.
    ///
    /// Idempotent; call after every failed login-family command.
    pub fn abort_login(&self, session: &mut AuthSession) {
        session.pending_login = None;

        if let Some((client_id, at)) = session.unconfirmed_signup() {
            if at.elapsed() >= self.signup_timeout {
                self.purge_signup(session, client_id);
            }
        }
    }

    // ========================================
    // Renewal
    // ========================================

    /// Issues a renewal challenge.
    ///
    /// # Errors
    /// `NotLoggedIn` before a successful login.
    pub fn begin_renewal(&self, session: &mut AuthSession) -> Result<Challenge> {
        let client_id = session.client_id().ok_or(ServerError::NotLoggedIn)?;
        let challenge = Challenge::generate();
        session.renewal = Some(challenge);

        info!(client_id = %client_id, "Renewal challenge issued");
        Ok(challenge)
    }

    /// Verifies both renewal signatures and stores the new key.
    ///
    /// # Errors
    /// - `NotLoggedIn` / `UnexpectedCommand`: Out of order
    /// - `Core`: Either signature fails; storage is untouched
    /// - `Storage`: The update could not be written
    pub fn finish_renewal(&self, session: &mut AuthSession, proof: &RenewalProof) -> Result<()> {
        let challenge = session.renewal.take();
        let identity = session.logged_in.as_ref().ok_or(ServerError::NotLoggedIn)?;
        let challenge =
            challenge.ok_or_else(|| ServerError::unexpected("RENEW_KEY", "logged-in"))?;
        let client_id = identity.id;

        if let Err(e) = self
            .crypto
            .verify_renewal(&identity.public_key, &challenge, proof)
        {
            warn!(client_id = %client_id, error = %e, "Renewal proof rejected");
            return Err(e.into());
        }

        self.directory
            .update_public_key(client_id, &proof.new_public_key)?;

        // Reload so later invites carry the new key
        session.logged_in = Some(self.directory.get(client_id)?);

        info!(client_id = %client_id, "Public key renewed");
        Ok(())
    }

    // ========================================
    // Connection Close
    // ========================================

    /// Final cleanup when the connection ends.
    ///
    /// Deletes a never-logged-in signup and returns the logged-in id so the
    /// caller can deregister it. A second call does nothing.
    pub fn close(&self, session: &mut AuthSession) -> Option<ClientId> {
        if let Some((client_id, _)) = session.unconfirmed_signup() {
            self.purge_signup(session, client_id);
        }
        session.signup = SignupState::Closed;
        session.pending_login = None;
        session.renewal = None;
        session.logged_in.take().map(|identity| identity.id)
    }

    fn purge_signup(&self, session: &mut AuthSession, client_id: ClientId) {
        session.signup = SignupState::Closed;
        match self.directory.delete(client_id) {
            Ok(true) => info!(client_id = %client_id, "Abandoned signup deleted"),
            Ok(false) => debug!(client_id = %client_id, "Abandoned signup already gone"),
            Err(e) => warn!(client_id = %client_id, error = %e, "Failed to delete abandoned signup"),
        }
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("directory", &self.directory)
            .field("signup_timeout", &self.signup_timeout)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::directory::MemoryDirectory;
    use securechat_core::crypto::IdentityKeyPair;
    use securechat_core::CoreError;

    const TEST_KEY_BITS: usize = 1024;

    fn keypair() -> IdentityKeyPair {
        IdentityKeyPair::generate(TEST_KEY_BITS).unwrap()
    }

    fn service(timeout: Duration) -> (AuthService, Arc<MemoryDirectory>) {
        let directory = Arc::new(MemoryDirectory::new());
        let service = AuthService::new(directory.clone(), timeout);
        (service, directory)
    }

    fn login(service: &AuthService, session: &mut AuthSession, id: ClientId, key: &IdentityKeyPair) {
        let challenge = service.begin_login(session, id).unwrap();
        let signature = key.sign(&challenge.signing_text()).unwrap();
        service.finish_login(session, &signature).unwrap();
    }

    /// Verifier that refuses everything.
    struct RejectAll;

    impl ChallengeCrypto for RejectAll {
        fn verify_login(&self, _: &str, _: &Challenge, _: &str) -> securechat_core::Result<()> {
            Err(CoreError::SignatureVerification)
        }

        fn verify_renewal(
            &self,
            _: &str,
            _: &Challenge,
            _: &RenewalProof,
        ) -> securechat_core::Result<IdentityPublicKey> {
            Err(CoreError::SignatureVerification)
        }
    }

    #[test]
    fn test_signup_login_roundtrip() {
        let (service, directory) = service(Duration::from_secs(300));
        let key = keypair();
        let mut session = AuthSession::new();

        let id = service
            .signup(&mut session, "alice", key.public_key().as_base64())
            .unwrap();
        assert_eq!(session.state_name(), "signed-up");
        assert_eq!(directory.get(id).unwrap().name, "alice");

        login(&service, &mut session, id, &key);
        assert!(session.is_logged_in());
        assert_eq!(session.client_id(), Some(id));

        // Logging in again as the same client is harmless
        login(&service, &mut session, id, &key);
        assert_eq!(session.client_id(), Some(id));
    }

    #[test]
    fn test_signup_once_per_connection() {
        let (service, directory) = service(Duration::from_secs(300));
        let key = keypair();
        let mut session = AuthSession::new();

        service
            .signup(&mut session, "alice", key.public_key().as_base64())
            .unwrap();
        let err = service
            .signup(&mut session, "alice2", key.public_key().as_base64())
            .unwrap_err();
        assert!(err.is_protocol_error());
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_signup_rejects_bad_key() {
        let (service, directory) = service(Duration::from_secs(300));
        let mut session = AuthSession::new();

        assert!(service.signup(&mut session, "alice", "not-a-key").is_err());
        assert!(directory.is_empty());
        assert_eq!(session.state_name(), "new");
    }

    #[test]
    fn test_wrong_key_fails_login() {
        let (service, directory) = service(Duration::from_secs(300));
        let key = keypair();
        let intruder = keypair();
        let id = directory.insert("alice", key.public_key().as_base64()).unwrap();

        let mut session = AuthSession::new();
        let challenge = service.begin_login(&mut session, id).unwrap();
        let forged = intruder.sign(&challenge.signing_text()).unwrap();

        let err = service.finish_login(&mut session, &forged).unwrap_err();
        assert!(err.is_protocol_error());
        assert!(!session.is_logged_in());

        // Challenge was consumed
        let signature = key.sign(&challenge.signing_text()).unwrap();
        assert!(service.finish_login(&mut session, &signature).is_err());
    }

    #[test]
    fn test_unknown_client_fails_login() {
        let (service, _) = service(Duration::from_secs(300));
        let mut session = AuthSession::new();
        assert!(matches!(
            service.begin_login(&mut session, ClientId::FIRST),
            Err(ServerError::UnknownClient { .. })
        ));
        assert!(matches!(
            service.finish_login(&mut session, "sig"),
            Err(ServerError::UnexpectedCommand { .. })
        ));
    }

    #[test]
    fn test_failed_login_purges_stale_signup() {
        let (service, directory) = service(Duration::ZERO);
        let key = keypair();
        let mut session = AuthSession::new();
        let id = service
            .signup(&mut session, "alice", key.public_key().as_base64())
            .unwrap();

        service.begin_login(&mut session, id).unwrap();
        assert!(service.finish_login(&mut session, "bogus").is_err());
        assert!(directory.get(id).is_err());
    }

    #[test]
    fn test_failed_login_keeps_fresh_signup() {
        let (service, directory) = service(Duration::from_secs(300));
        let key = keypair();
        let mut session = AuthSession::new();
        let id = service
            .signup(&mut session, "alice", key.public_key().as_base64())
            .unwrap();

        service.begin_login(&mut session, id).unwrap();
        assert!(service.finish_login(&mut session, "bogus").is_err());
        assert!(directory.get(id).is_ok());

        // Still closable exactly once: never logged in, so it goes now
        assert_eq!(service.close(&mut session), None);
        assert!(directory.get(id).is_err());
        assert_eq!(service.close(&mut session), None);
    }

    #[test]
    fn test_close_after_login_keeps_identity() {
        let (service, directory) = service(Duration::ZERO);
        let key = keypair();
        let mut session = AuthSession::new();
        let id = service
            .signup(&mut session, "alice", key.public_key().as_base64())
            .unwrap();
        login(&service, &mut session, id, &key);

        assert_eq!(service.close(&mut session), Some(id));
        assert!(directory.get(id).is_ok());
        assert_eq!(service.close(&mut session), None);
    }

    #[test]
    fn test_renewal_replaces_key() {
        let (service, directory) = service(Duration::from_secs(300));
        let old_key = keypair();
        let new_key = keypair();
        let id = directory
            .insert("alice", old_key.public_key().as_base64())
            .unwrap();
        let mut session = AuthSession::new();

        assert!(matches!(
            service.begin_renewal(&mut session),
            Err(ServerError::NotLoggedIn)
        ));

        login(&service, &mut session, id, &old_key);
        let challenge = service.begin_renewal(&mut session).unwrap();
        assert_eq!(session.state_name(), "renewing");

        let proof = RenewalProof::create(&old_key, &new_key, &challenge).unwrap();
        service.finish_renewal(&mut session, &proof).unwrap();

        assert_eq!(
            directory.get(id).unwrap().public_key,
            new_key.public_key().as_base64()
        );
        assert_eq!(
            session.identity().unwrap().public_key,
            new_key.public_key().as_base64()
        );

        // Old key no longer logs in, new key does
        let mut fresh = AuthSession::new();
        let challenge = service.begin_login(&mut fresh, id).unwrap();
        let stale = old_key.sign(&challenge.signing_text()).unwrap();
        assert!(service.finish_login(&mut fresh, &stale).is_err());
        login(&service, &mut fresh, id, &new_key);
    }

    #[test]
    fn test_renewal_failure_leaves_key_untouched() {
        let (service, directory) = service(Duration::from_secs(300));
        let old_key = keypair();
        let new_key = keypair();
        let intruder = keypair();
        let id = directory
            .insert("alice", old_key.public_key().as_base64())
            .unwrap();
        let mut session = AuthSession::new();
        login(&service, &mut session, id, &old_key);

        // Old-key signature by the wrong key
        let challenge = service.begin_renewal(&mut session).unwrap();
        let proof = RenewalProof::create(&intruder, &new_key, &challenge).unwrap();
        assert!(service.finish_renewal(&mut session, &proof).is_err());

        // New-key signature over a different challenge
        let challenge = service.begin_renewal(&mut session).unwrap();
        let other = Challenge {
            nonce: challenge.nonce.wrapping_add(1),
            timestamp: challenge.timestamp,
        };
        let proof = RenewalProof::create(&old_key, &new_key, &other).unwrap();
        assert!(service.finish_renewal(&mut session, &proof).is_err());

        // Proof without a challenge
        let proof = RenewalProof::create(&old_key, &new_key, &challenge).unwrap();
        assert!(matches!(
            service.finish_renewal(&mut session, &proof),
            Err(ServerError::UnexpectedCommand { .. })
        ));

        assert_eq!(
            directory.get(id).unwrap().public_key,
            old_key.public_key().as_base64()
        );
        let mut fresh = AuthSession::new();
        login(&service, &mut fresh, id, &old_key);
    }

    #[test]
    fn test_custom_crypto_backend() {
        let directory = Arc::new(MemoryDirectory::new());
        let service =
            AuthService::with_crypto(directory.clone(), Arc::new(RejectAll), Duration::ZERO);
        let key = keypair();
        let id = directory.insert("alice", key.public_key().as_base64()).unwrap();

        let mut session = AuthSession::new();
        let challenge = service.begin_login(&mut session, id).unwrap();
        let signature = key.sign(&challenge.signing_text()).unwrap();
        assert!(service.finish_login(&mut session, &signature).is_err());
        // Not this connection's signup, so nothing is purged
        assert!(directory.get(id).is_ok());
    }
}
