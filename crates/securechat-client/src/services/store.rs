// ============================================
// File: crates/securechat-client/src/services/store.rs
// ============================================
//! # Local Client Store
//!
//! ## Creation Reason
//! The client keeps three things across runs: its own identity (id, name
//! and key pair), the public keys it has chosen to trust, and the ids it
//! has blocked.
//!
//! ## Main Functionality
//! - `LocalIdentity`: Own identity record, private key included
//! - `ClientStore`: Storage trait used by the auth and trust services
//! - `MemoryStore`: Process-local storage for tests and throwaway runs
//! - `JsonFileStore`: Same table persisted to a JSON file
//!
//! ## File Layout
//! ```text
//! {
//!   "identity": { "id": 4, "name": "alice", "public_key": "...", "private_key": "..." },
//!   "trusted":  { "7": "MIIBIjAN..." },
//!   "blocked":  [ 9 ]
//! }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The file holds the private key in the clear; it is written 0600
//! - A mutation that fails to persist leaves the table unchanged
//!
//! ## Last Modified
//! v0.1.0 - Initial store implementation

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use securechat_common::ClientId;

use crate::error::{ClientError, Result};

// ============================================
// LocalIdentity
// ============================================

/// The client's own registered identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct LocalIdentity {
    /// Id assigned by the relay
    #[zeroize(skip)]
    pub id: ClientId,
    /// Name given at signup
    #[zeroize(skip)]
    pub name: String,
    /// Base64 SPKI public key
    #[zeroize(skip)]
    pub public_key: String,
    /// Base64 PKCS#8 private key
    pub private_key: String,
}

impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("private_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

// ============================================
// ClientStore Trait
// ============================================

/// Persistent client-side state.
pub trait ClientStore: Send + Sync + fmt::Debug {
    /// Own identity, if signed up.
    ///
    /// # Errors
    /// `Storage` on backend failure.
    fn identity(&self) -> Result<Option<LocalIdentity>>;

    /// Records the identity created by a successful signup.
    ///
    /// # Errors
    /// `IdentityExists` if one is already stored, `Storage` on write failure.
    fn set_identity(&self, identity: LocalIdentity) -> Result<()>;

    /// Replaces the stored key pair after a renewal.
    ///
    /// # Errors
    /// `NoIdentity` if `id` is not the stored identity, `Storage` on write failure.
    fn update_identity_keys(&self, id: ClientId, public_key: &str, private_key: &str)
        -> Result<()>;

    /// Trusted public key of a peer.
    ///
    /// # Errors
    /// `Storage` on backend failure.
    fn trusted_key(&self, peer: ClientId) -> Result<Option<String>>;

    /// Trusts `public_key` for `peer`, replacing any earlier key.
    ///
    /// # Errors
    /// `Storage` on write failure.
    fn upsert_trust(&self, peer: ClientId, public_key: &str) -> Result<()>;

    /// Forgets the trusted key of `peer`. Returns `false` if there was none.
    ///
    /// # Errors
    /// `Storage` on write failure.
    fn remove_trust(&self, peer: ClientId) -> Result<bool>;

    /// Whether `peer` is blocked.
    ///
    /// # Errors
    /// `Storage` on backend failure.
    fn is_blocked(&self, peer: ClientId) -> Result<bool>;

    /// Blocks `peer`. Returns `false` if already blocked.
    ///
    /// # Errors
    /// `Storage` on write failure.
    fn insert_block(&self, peer: ClientId) -> Result<bool>;

    /// Unblocks `peer`. Returns `false` if it was not blocked.
    ///
    /// # Errors
    /// `Storage` on write failure.
    fn remove_block(&self, peer: ClientId) -> Result<bool>;
}

// ============================================
// StoreTable
// ============================================

/// Shared table; also the JSON file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreTable {
    #[serde(default)]
    identity: Option<LocalIdentity>,
    #[serde(default)]
    trusted: BTreeMap<u32, String>,
    #[serde(default)]
    blocked: BTreeSet<u32>,
}

impl StoreTable {
    fn set_identity(&mut self, identity: LocalIdentity) -> Result<()> {
        if let Some(existing) = &self.identity {
            return Err(ClientError::IdentityExists {
                client_id: existing.id,
            });
        }
        self.identity = Some(identity);
        Ok(())
    }

    fn update_identity_keys(
        &mut self,
        id: ClientId,
        public_key: &str,
        private_key: &str,
    ) -> Result<()> {
        let identity = self
            .identity
            .as_mut()
            .filter(|identity| identity.id == id)
            .ok_or(ClientError::NoIdentity)?;
        identity.public_key = public_key.to_string();
        identity.private_key.zeroize();
        identity.private_key = private_key.to_string();
        Ok(())
    }

    fn upsert_trust(&mut self, peer: ClientId, public_key: &str) {
        self.trusted.insert(peer.get(), public_key.to_string());
    }

    fn remove_trust(&mut self, peer: ClientId) -> bool {
        self.trusted.remove(&peer.get()).is_some()
    }

    fn insert_block(&mut self, peer: ClientId) -> bool {
        self.blocked.insert(peer.get())
    }

    fn remove_block(&mut self, peer: ClientId) -> bool {
        self.blocked.remove(&peer.get())
    }
}

// ============================================
// MemoryStore
// ============================================

/// In-memory client store.
#[derive(Default)]
pub struct MemoryStore {
    table: RwLock<StoreTable>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientStore for MemoryStore {
    fn identity(&self) -> Result<Option<LocalIdentity>> {
        Ok(self.table.read().identity.clone())
    }

    fn set_identity(&self, identity: LocalIdentity) -> Result<()> {
        self.table.write().set_identity(identity)
    }

    fn update_identity_keys(
        &self,
        id: ClientId,
        public_key: &str,
        private_key: &str,
    ) -> Result<()> {
        self.table
            .write()
            .update_identity_keys(id, public_key, private_key)
    }

    fn trusted_key(&self, peer: ClientId) -> Result<Option<String>> {
        Ok(self.table.read().trusted.get(&peer.get()).cloned())
    }

    fn upsert_trust(&self, peer: ClientId, public_key: &str) -> Result<()> {
        self.table.write().upsert_trust(peer, public_key);
        Ok(())
    }

    fn remove_trust(&self, peer: ClientId) -> Result<bool> {
        Ok(self.table.write().remove_trust(peer))
    }

    fn is_blocked(&self, peer: ClientId) -> Result<bool> {
        Ok(self.table.read().blocked.contains(&peer.get()))
    }

    fn insert_block(&self, peer: ClientId) -> Result<bool> {
        Ok(self.table.write().insert_block(peer))
    }

    fn remove_block(&self, peer: ClientId) -> Result<bool> {
        Ok(self.table.write().remove_block(peer))
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.read();
        f.debug_struct("MemoryStore")
            .field("has_identity", &table.identity.is_some())
            .field("trusted", &table.trusted.len())
            .field("blocked", &table.blocked.len())
            .finish()
    }
}

// ============================================
// JsonFileStore
// ============================================

/// Client store persisted as a JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    table: RwLock<StoreTable>,
}

impl JsonFileStore {
    /// Opens the file, starting empty if it does not exist yet.
    ///
    /// # Errors
    /// `Storage` if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table: StoreTable = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| ClientError::storage(format!("reading {}: {e}", path.display())))?;
            serde_json::from_str(&content)
                .map_err(|e| ClientError::storage(format!("parsing {}: {e}", path.display())))?
        } else {
            StoreTable::default()
        };

        info!(
            path = %path.display(),
            client_id = ?table.identity.as_ref().map(|identity| identity.id),
            trusted = table.trusted.len(),
            blocked = table.blocked.len(),
            "Client store opened"
        );
        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `change` on a copy, persists it, then commits.
    fn mutate<T>(&self, change: impl FnOnce(&mut StoreTable) -> Result<T>) -> Result<T> {
        let mut table = self.table.write();
        let mut draft = table.clone();
        let out = change(&mut draft)?;
        persist(&self.path, &draft)?;
        *table = draft;
        Ok(out)
    }
}

impl ClientStore for JsonFileStore {
    fn identity(&self) -> Result<Option<LocalIdentity>> {
        Ok(self.table.read().identity.clone())
    }

    fn set_identity(&self, identity: LocalIdentity) -> Result<()> {
        let id = identity.id;
        self.mutate(|table| table.set_identity(identity))?;
        debug!(client_id = %id, "Identity stored");
        Ok(())
    }

    fn update_identity_keys(
        &self,
        id: ClientId,
        public_key: &str,
        private_key: &str,
    ) -> Result<()> {
        self.mutate(|table| table.update_identity_keys(id, public_key, private_key))
    }

    fn trusted_key(&self, peer: ClientId) -> Result<Option<String>> {
        Ok(self.table.read().trusted.get(&peer.get()).cloned())
    }

    fn upsert_trust(&self, peer: ClientId, public_key: &str) -> Result<()> {
        self.mutate(|table| {
            table.upsert_trust(peer, public_key);
            Ok(())
        })
    }

    fn remove_trust(&self, peer: ClientId) -> Result<bool> {
        if !self.table.read().trusted.contains_key(&peer.get()) {
            return Ok(false);
        }
        self.mutate(|table| Ok(table.remove_trust(peer)))
    }

    fn is_blocked(&self, peer: ClientId) -> Result<bool> {
        Ok(self.table.read().blocked.contains(&peer.get()))
    }

    fn insert_block(&self, peer: ClientId) -> Result<bool> {
        if self.table.read().blocked.contains(&peer.get()) {
            return Ok(false);
        }
        self.mutate(|table| Ok(table.insert_block(peer)))
    }

    fn remove_block(&self, peer: ClientId) -> Result<bool> {
        if !self.table.read().blocked.contains(&peer.get()) {
            return Ok(false);
        }
        self.mutate(|table| Ok(table.remove_block(peer)))
    }
}

impl fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Writes the table and restricts the file to its owner on Unix.
fn persist(path: &Path, table: &StoreTable) -> Result<()> {
    let content = serde_json::to_string_pretty(table)
        .map_err(|e| ClientError::storage(format!("encoding store: {e}")))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ClientError::storage(format!("creating {}: {e}", parent.display())))?;
    }
    std::fs::write(path, content)
        .map_err(|e| ClientError::storage(format!("writing {}: {e}", path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| ClientError::storage(format!("restricting {}: {e}", path.display())))?;
    }

    Ok(())
}

// ============================================
// Tests
// ============================================
