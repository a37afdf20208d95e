// ============================================
// File: crates/securechat-client/src/services/auth.rs
// ============================================
//! # Client Authentication
//!
//! ## Creation Reason
//! Client half of signup, challenge-response login and key renewal.
//! Each user request produces the first wire line; each relay reply
//! advances the matching flow.
//!
//! ## Flows
//! ```text
//! -signup alice   ─► SIGNUP alice <pk>        ◄─ SIGNUP_SUCCESS 4    (identity stored)
//! -login          ─► LOGIN 4                  ◄─ LOGIN_NONCE n t
//!                 ─► LOGIN_ACCEPT <sig>       ◄─ LOGIN_SUCCESS       (account active)
//! -renew 4        ─► RENEW_KEY_REQUEST        ◄─ RENEW_KEY_REQUEST_OK n t
//!                 ─► RENEW_KEY <old> <pk> <new> ◄─ RENEW_KEY_SUCCESS (keys replaced)
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Keys are generated before the first line is sent, so the store is
//!   only touched once the relay has accepted
//! - The renewal key pair lives in memory until `RENEW_KEY_SUCCESS`; a
//!   failure or disconnect discards it and the old keys stay valid
//!
//! ## Last Modified
//! v0.1.0 - Initial client auth flows

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use securechat_common::ClientId;
use securechat_core::crypto::{Challenge, IdentityKeyPair, RenewalProof};
use securechat_core::protocol::Command;

use crate::effects::Effects;
use crate::error::{ClientError, Result};
use crate::services::store::{ClientStore, LocalIdentity};

// ============================================
// Account
// ============================================

/// The logged-in identity with its usable key pair.
#[derive(Clone)]
pub struct Account {
    /// Own id
    pub id: ClientId,
    /// Name given at signup
    pub name: String,
    /// Long-term identity keys
    pub keys: IdentityKeyPair,
}

impl Account {
    fn from_identity(identity: &LocalIdentity) -> Result<Self> {
        Ok(Self {
            id: identity.id,
            name: identity.name.clone(),
            keys: IdentityKeyPair::from_pkcs8_base64(&identity.private_key)?,
        })
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("key", &self.keys.public_key().fingerprint())
            .finish()
    }
}

// ============================================
// ClientAuth
// ============================================

/// Signup, login and renewal state of one client.
pub struct ClientAuth {
    store: Arc<dyn ClientStore>,
    key_bits: usize,
    pending_signup: Option<(String, IdentityKeyPair)>,
    login_attempt: Option<Account>,
    account: Option<Account>,
    pending_renewal: Option<IdentityKeyPair>,
}

impl ClientAuth {
    /// Creates the service; new identity keys use `key_bits`.
    #[must_use]
    pub fn new(store: Arc<dyn ClientStore>, key_bits: usize) -> Self {
        Self {
            store,
            key_bits,
            pending_signup: None,
            login_attempt: None,
            account: None,
            pending_renewal: None,
        }
    }

    /// The logged-in account.
    #[must_use]
    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    /// Own id once logged in.
    #[must_use]
    pub fn client_id(&self) -> Option<ClientId> {
        self.account.as_ref().map(|account| account.id)
    }

    /// Whether login has completed.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.account.is_some()
    }

    /// Short state label for logs and errors.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        if self.pending_signup.is_some() {
            "signing up"
        } else if self.login_attempt.is_some() {
            "logging in"
        } else if self.pending_renewal.is_some() {
            "renewing key"
        } else if self.account.is_some() {
            "logged in"
        } else {
            "logged out"
        }
    }

    // ========================================
    // Signup
    // ========================================

    /// Generates an identity key pair and asks the relay to register it.
    ///
    /// # Errors
    /// `InvalidInput` for an unusable name or a signup already in flight,
    /// `IdentityExists` if this store already has an identity.
    pub fn request_signup(&mut self, name: &str) -> Result<Effects> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(ClientError::invalid_input(
                "name",
                "must be a single non-empty word",
            ));
        }
        if self.pending_signup.is_some() {
            return Err(ClientError::invalid_input("signup", "already in progress"));
        }
        if let Some(existing) = self.store.identity()? {
            return Err(ClientError::IdentityExists {
                client_id: existing.id,
            });
        }

        let keys = IdentityKeyPair::generate(self.key_bits)?;
        let mut fx = Effects::new();
        fx.send(&Command::Signup {
            name: name.to_string(),
            public_key: keys.public_key().as_base64().to_string(),
        });
        fx.info(format!("Signing up as {name}..."));
        debug!(name, key = %keys.public_key().fingerprint(), "Signup requested");

        self.pending_signup = Some((name.to_string(), keys));
        Ok(fx)
    }

    /// Stores the identity the relay just registered.
    ///
    /// # Errors
    /// `UnexpectedReply` without a pending signup, storage failures.
    pub fn on_signup_success(&mut self, client_id: ClientId) -> Result<Effects> {
        let (name, keys) = self
            .pending_signup
            .take()
            .ok_or_else(|| ClientError::unexpected("SIGNUP_SUCCESS", self.state_name()))?;

        let private_key = keys.to_pkcs8_base64()?;
        self.store.set_identity(LocalIdentity {
            id: client_id,
            name,
            public_key: keys.public_key().as_base64().to_string(),
            private_key: private_key.as_str().to_string(),
        })?;
        info!(client_id = %client_id, "Signed up");

        let mut fx = Effects::new();
        fx.info(format!(
            "Signup successful. Your Client_ID: {client_id}. Use -login to log in."
        ));
        Ok(fx)
    }

    /// Drops the pending signup.
    #[must_use]
    pub fn on_signup_failure(&mut self) -> Effects {
        self.pending_signup = None;
        let mut fx = Effects::new();
        fx.error("Signup failed");
        fx
    }

    // ========================================
    // Login
    // ========================================

    /// Starts a login with the stored identity.
    ///
    /// # Errors
    /// `NoIdentity` before signup, `InvalidInput` while a login is in
    /// flight, key decoding failures.
    pub fn request_login(&mut self) -> Result<Effects> {
        if self.login_attempt.is_some() {
            return Err(ClientError::invalid_input("login", "already in progress"));
        }
        let identity = self.store.identity()?.ok_or(ClientError::NoIdentity)?;
        let attempt = Account::from_identity(&identity)?;

        let mut fx = Effects::new();
        fx.send(&Command::Login {
            client_id: attempt.id,
        });
        self.login_attempt = Some(attempt);
        Ok(fx)
    }

    /// Signs the login challenge.
    ///
    /// # Errors
    /// `UnexpectedReply` without a login in flight, signing failures.
    pub fn on_login_nonce(&mut self, challenge: &Challenge) -> Result<Effects> {
        let attempt = self
            .login_attempt
            .as_ref()
            .ok_or_else(|| ClientError::unexpected("LOGIN_NONCE", self.state_name()))?;

        let signature = attempt.keys.sign(&challenge.signing_text())?;
        let mut fx = Effects::new();
        fx.send(&Command::LoginAccept { signature });
        Ok(fx)
    }

    /// Activates the account.
    ///
    /// # Errors
    /// `UnexpectedReply` without a login in flight.
    pub fn on_login_success(&mut self) -> Result<Effects> {
        let account = self
            .login_attempt
            .take()
            .ok_or_else(|| ClientError::unexpected("LOGIN_SUCCESS", self.state_name()))?;

        info!(client_id = %account.id, "Logged in");
        let mut fx = Effects::new();
        fx.info(format!("Logged in. Your Client_ID: {}", account.id));
        self.account = Some(account);
        Ok(fx)
    }

    /// Drops the login attempt.
    #[must_use]
    pub fn on_login_failure(&mut self) -> Effects {
        self.login_attempt = None;
        let mut fx = Effects::new();
        fx.error("Login failed");
        fx
    }

    // ========================================
    // Key Renewal
    // ========================================

    /// Generates a replacement key pair and asks for a renewal challenge.
    ///
    /// # Errors
    /// `NotLoggedIn`, `InvalidInput` for someone else's id or a renewal
    /// already in flight.
    pub fn request_renew(&mut self, client_id: ClientId) -> Result<Effects> {
        let account = self.account.as_ref().ok_or(ClientError::NotLoggedIn)?;
        if client_id != account.id {
            return Err(ClientError::invalid_input(
                "client_id",
                format!("can only renew own key (Client_ID {})", account.id),
            ));
        }
        if self.pending_renewal.is_some() {
            return Err(ClientError::invalid_input("renew", "already in progress"));
        }

        let replacement = IdentityKeyPair::generate(self.key_bits)?;
        debug!(key = %replacement.public_key().fingerprint(), "Renewal key generated");
        self.pending_renewal = Some(replacement);

        let mut fx = Effects::new();
        fx.send(&Command::RenewKeyRequest);
        Ok(fx)
    }

    /// Answers the renewal challenge with both signatures.
    ///
    /// # Errors
    /// `UnexpectedReply` without a renewal in flight, signing failures.
    pub fn on_renew_challenge(&mut self, challenge: &Challenge) -> Result<Effects> {
        let (Some(account), Some(replacement)) = (&self.account, &self.pending_renewal) else {
            return Err(ClientError::unexpected(
                "RENEW_KEY_REQUEST_OK",
                self.state_name(),
            ));
        };

        let proof = RenewalProof::create(&account.keys, replacement, challenge)?;
        let mut fx = Effects::new();
        fx.send(&Command::RenewKey(proof));
        Ok(fx)
    }

    /// Persists and activates the replacement key pair.
    ///
    /// # Errors
    /// `UnexpectedReply` without a renewal in flight, storage failures.
    pub fn on_renew_success(&mut self) -> Result<Effects> {
        let state = self.state_name();
        let (Some(account), Some(replacement)) = (self.account.as_mut(), self.pending_renewal.take())
        else {
            return Err(ClientError::unexpected("RENEW_KEY_SUCCESS", state));
        };

        let private_key = replacement.to_pkcs8_base64()?;
        if let Err(e) = self.store.update_identity_keys(
            account.id,
            replacement.public_key().as_base64(),
            private_key.as_str(),
        ) {
            warn!(error = %e, "Renewed key could not be stored");
            return Err(e);
        }

        info!(
            client_id = %account.id,
            key = %replacement.public_key().fingerprint(),
            "Identity key renewed"
        );
        account.keys = replacement;

        let mut fx = Effects::new();
        fx.info("Key renewed");
        Ok(fx)
    }

    /// Discards the replacement key pair.
    #[must_use]
    pub fn on_renew_failure(&mut self) -> Effects {
        self.pending_renewal = None;
        let mut fx = Effects::new();
        fx.error("Key renewal failed");
        fx
    }
}

impl fmt::Debug for ClientAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientAuth")
            .field("state", &self.state_name())
            .field("client_id", &self.client_id())
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
    use securechat_core::crypto::{ChallengeCrypto, DefaultChallengeCrypto};

    fn id(value: u32) -> ClientId {
        ClientId::new(value).unwrap()
    }

    fn only_command(fx: &Effects) -> Command {
        assert_eq!(fx.outbound.len(), 1, "{:?}", fx.outbound);
        fx.outbound[0].parse::<Command>().unwrap()
    }

    fn signed_up(store: &Arc<dyn ClientStore>) -> ClientAuth {
        let mut auth = ClientAuth::new(Arc::clone(store), 1024);
        auth.request_signup("alice").unwrap();
        auth.on_signup_success(id(4)).unwrap();
        auth
    }

    fn logged_in(store: &Arc<dyn ClientStore>) -> ClientAuth {
        let mut auth = signed_up(store);
        auth.request_login().unwrap();
        auth.on_login_nonce(&Challenge::generate()).unwrap();
        auth.on_login_success().unwrap();
        auth
    }

    #[test]
    fn test_signup_stores_identity() {
        let store: Arc<dyn ClientStore> = Arc::new(MemoryStore::new());
        let mut auth = ClientAuth::new(Arc::clone(&store), 1024);

        let fx = auth.request_signup("alice").unwrap();
        let Command::Signup { name, public_key } = only_command(&fx) else {
            panic!("expected SIGNUP");
        };
        assert_eq!(name, "alice");
        assert_eq!(auth.state_name(), "signing up");
        assert!(store.identity().unwrap().is_none());

        auth.on_signup_success(id(4)).unwrap();
        let identity = store.identity().unwrap().unwrap();
        assert_eq!(identity.id, id(4));
        assert_eq!(identity.public_key, public_key);
        assert!(IdentityKeyPair::from_pkcs8_base64(&identity.private_key).is_ok());
        assert!(!auth.is_logged_in());
    }

    #[test]
    fn test_signup_refusals() {
        let store: Arc<dyn ClientStore> = Arc::new(MemoryStore::new());
        let mut auth = ClientAuth::new(Arc::clone(&store), 1024);

        assert!(auth.request_signup("").unwrap_err().is_policy_violation());
        assert!(auth.request_signup("two words").is_err());
        assert!(matches!(
            auth.on_signup_success(id(1)),
            Err(ClientError::UnexpectedReply { .. })
        ));

        auth.request_signup("alice").unwrap();
        let fx = auth.on_signup_failure();
        assert_eq!(fx.notices.len(), 1);
        assert!(store.identity().unwrap().is_none());

        let mut auth = signed_up(&store);
        assert!(matches!(
            auth.request_signup("again"),
            Err(ClientError::IdentityExists { .. })
        ));
    }

    #[test]
    fn test_login_signs_challenge() {
        let store: Arc<dyn ClientStore> = Arc::new(MemoryStore::new());
        let mut auth = ClientAuth::new(Arc::clone(&store), 1024);
        assert!(matches!(auth.request_login(), Err(ClientError::NoIdentity)));

        let mut auth = signed_up(&store);
        let fx = auth.request_login().unwrap();
        assert_eq!(fx.outbound, vec!["LOGIN 4"]);

        let challenge = Challenge::generate();
        let fx = auth.on_login_nonce(&challenge).unwrap();
        let Command::LoginAccept { signature } = only_command(&fx) else {
            panic!("expected LOGIN_ACCEPT");
        };
        let registered = store.identity().unwrap().unwrap().public_key.clone();
        DefaultChallengeCrypto::new()
            .verify_login(&registered, &challenge, &signature)
            .unwrap();

        auth.on_login_success().unwrap();
        assert_eq!(auth.client_id(), Some(id(4)));
        assert_eq!(auth.state_name(), "logged in");
    }

    #[test]
    fn test_login_failure_resets() {
        let store: Arc<dyn ClientStore> = Arc::new(MemoryStore::new());
        let mut auth = signed_up(&store);
        auth.request_login().unwrap();
        let _ = auth.on_login_failure();
        assert!(!auth.is_logged_in());
        assert!(matches!(
            auth.on_login_nonce(&Challenge::generate()),
            Err(ClientError::UnexpectedReply { .. })
        ));
        // A new attempt is allowed after the failure
        assert!(auth.request_login().is_ok());
    }

    #[test]
    fn test_renewal_replaces_keys() {
        let store: Arc<dyn ClientStore> = Arc::new(MemoryStore::new());
        let mut auth = logged_in(&store);
        let old_key = store.identity().unwrap().unwrap().public_key.clone();

        assert!(auth.request_renew(id(5)).unwrap_err().is_policy_violation());
        let fx = auth.request_renew(id(4)).unwrap();
        assert_eq!(fx.outbound, vec!["RENEW_KEY_REQUEST"]);

        let challenge = Challenge::generate();
        let fx = auth.on_renew_challenge(&challenge).unwrap();
        let Command::RenewKey(proof) = only_command(&fx) else {
            panic!("expected RENEW_KEY");
        };
        let new_key = DefaultChallengeCrypto::new()
            .verify_renewal(&old_key, &challenge, &proof)
            .unwrap();

        auth.on_renew_success().unwrap();
        let stored = store.identity().unwrap().unwrap();
        assert_eq!(stored.public_key, new_key.as_base64());
        assert_eq!(
            auth.account().unwrap().keys.public_key().as_base64(),
            new_key.as_base64()
        );
    }

    #[test]
    fn test_renewal_failure_keeps_old_keys() {
        let store: Arc<dyn ClientStore> = Arc::new(MemoryStore::new());
        assert!(matches!(
            ClientAuth::new(Arc::clone(&store), 1024).request_renew(id(4)),
            Err(ClientError::NotLoggedIn)
        ));

        let mut auth = logged_in(&store);
        let old_key = store.identity().unwrap().unwrap().public_key.clone();
        auth.request_renew(id(4)).unwrap();
        let _ = auth.on_renew_failure();

        assert!(auth.on_renew_success().is_err());
        assert_eq!(store.identity().unwrap().unwrap().public_key, old_key);
        assert_eq!(auth.account().unwrap().keys.public_key().as_base64(), old_key);
    }
}
