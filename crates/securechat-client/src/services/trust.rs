// ============================================
// File: crates/securechat-client/src/services/trust.rs
// ============================================
//! # Trust and Block Lists
//!
//! ## Creation Reason
//! The relay introduces peers with a claimed long-term key. The client
//! only talks to a peer once the user has pinned that exact key, and
//! never talks to a peer the user has blocked.
//!
//! ## Rules
//! - Trusting a peer removes it from the block list
//! - Blocking a peer forgets its trusted key
//! - A key is trusted only if it equals the pinned key byte for byte
//!
//! ## Last Modified
//! v0.1.0 - Initial trust service

use std::sync::Arc;

use tracing::info;

use securechat_common::ClientId;
use securechat_core::IdentityPublicKey;

use crate::error::Result;
use crate::services::store::ClientStore;

/// Trust and block decisions over a [`ClientStore`].
#[derive(Debug, Clone)]
pub struct TrustService {
    store: Arc<dyn ClientStore>,
}

impl TrustService {
    /// Creates the service.
    #[must_use]
    pub fn new(store: Arc<dyn ClientStore>) -> Self {
        Self { store }
    }

    /// Pins `public_key` for `peer` and unblocks it.
    ///
    /// # Errors
    /// Key parsing or storage failures.
    pub fn trust(&self, peer: ClientId, public_key: &str) -> Result<()> {
        let key = IdentityPublicKey::from_base64(public_key)?;
        if self.store.remove_block(peer)? {
            info!(peer = %peer, "Unblocked by trust");
        }
        self.store.upsert_trust(peer, key.as_base64())?;
        info!(peer = %peer, key = %key.fingerprint(), "Public key trusted");
        Ok(())
    }

    /// Forgets the pinned key. Returns `false` if there was none.
    ///
    /// # Errors
    /// Storage failures.
    pub fn untrust(&self, peer: ClientId) -> Result<bool> {
        self.store.remove_trust(peer)
    }

    /// Blocks `peer` and forgets its pinned key. Returns `false` if already blocked.
    ///
    /// # Errors
    /// Storage failures.
    pub fn block(&self, peer: ClientId) -> Result<bool> {
        self.store.remove_trust(peer)?;
        let added = self.store.insert_block(peer)?;
        if added {
            info!(peer = %peer, "Client blocked");
        }
        Ok(added)
    }

    /// Unblocks `peer`. Returns `false` if it was not blocked.
    ///
    /// # Errors
    /// Storage failures.
    pub fn unblock(&self, peer: ClientId) -> Result<bool> {
        self.store.remove_block(peer)
    }

    /// Whether `public_key` is the key pinned for `peer`.
    ///
    /// # Errors
    /// Storage failures.
    pub fn is_trusted(&self, peer: ClientId, public_key: &str) -> Result<bool> {
        Ok(self
            .store
            .trusted_key(peer)?
            .is_some_and(|pinned| pinned == public_key))
    }

    /// Whether `peer` is blocked.
    ///
    /// # Errors
    /// Storage failures.
    pub fn is_blocked(&self, peer: ClientId) -> Result<bool> {
        self.store.is_blocked(peer)
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ClientStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;
    use securechat_core::IdentityKeyPair;

    fn id(value: u32) -> ClientId {
        ClientId::new(value).unwrap()
    }

    #[test]
    fn test_trust_and_block_are_exclusive() {
        let trust = TrustService::new(Arc::new(MemoryStore::new()));
        let key = IdentityKeyPair::generate(1024).unwrap();
        let pk = key.public_key().as_base64().to_string();
        let peer = id(2);

        assert!(!trust.is_trusted(peer, &pk).unwrap());
        trust.trust(peer, &pk).unwrap();
        assert!(trust.is_trusted(peer, &pk).unwrap());
        assert!(!trust.is_trusted(peer, "SOMETHING_ELSE").unwrap());

        assert!(trust.block(peer).unwrap());
        assert!(trust.is_blocked(peer).unwrap());
        assert!(!trust.is_trusted(peer, &pk).unwrap());
        assert!(!trust.block(peer).unwrap());

        trust.trust(peer, &pk).unwrap();
        assert!(!trust.is_blocked(peer).unwrap());
        assert!(trust.is_trusted(peer, &pk).unwrap());

        assert!(trust.untrust(peer).unwrap());
        assert!(!trust.untrust(peer).unwrap());
        assert!(!trust.unblock(peer).unwrap());
    }

    #[test]
    fn test_trust_rejects_garbage_key() {
        let trust = TrustService::new(Arc::new(MemoryStore::new()));
        assert!(trust.trust(id(2), "not-a-key").is_err());
        assert!(trust.store().trusted_key(id(2)).unwrap().is_none());
    }
}
