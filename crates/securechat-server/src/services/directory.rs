// ============================================
// File: crates/securechat-server/src/services/directory.rs
// ============================================
//! # Identity Directory
//!
//! ## Creation Reason
//! Durable mapping from client id to registered name and public key.
//! Signup inserts, login reads, renewal overwrites the key, and abandoned
//! signups are deleted.
//!
//! ## Main Functionality
//! - `IdentityDirectory`: Storage trait used by the auth service and relay
//! - `MemoryDirectory`: Process-local storage for tests and ephemeral runs
//! - `JsonFileDirectory`: Same table persisted to a JSON file
//!
//! ## Id Allocation
//! Ids start at 1 and only move forward. A deleted id is never reissued,
//! so a stale `LOGIN <id>` can never land on someone else's identity.
//!
//! ## ⚠️ Important Note for Next Developer
//! - A mutation that fails to persist leaves the table unchanged
//! - The JSON file is rewritten whole on every mutation
//!
//! ## Last Modified
//! v0.1.0 - Initial directory implementation

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use securechat_common::ClientId;

use crate::error::{Result, ServerError};

// ============================================
// RegisteredIdentity
// ============================================

/// One registered client as the server knows it (no private key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredIdentity {
    /// Assigned identifier
    pub id: ClientId,
    /// Display name given at signup
    pub name: String,
    /// Base64 SPKI public key
    pub public_key: String,
}

// ============================================
// IdentityDirectory Trait
// ============================================

/// Storage of registered identities.
///
/// # Thread Safety
/// Shared by every connection task; implementations lock internally.
pub trait IdentityDirectory: Send + Sync + fmt::Debug {
    /// Registers a new identity and returns its freshly assigned id.
    ///
    /// # Errors
    /// `Storage` if the record cannot be persisted.
    fn insert(&self, name: &str, public_key: &str) -> Result<ClientId>;

    /// Looks up an identity.
    ///
    /// # Errors
    /// `UnknownClient` if no identity has this id.
    fn get(&self, id: ClientId) -> Result<RegisteredIdentity>;

    /// Replaces the stored public key.
    ///
    /// # Errors
    /// `UnknownClient` or `Storage`; on error the stored key is unchanged.
    fn update_public_key(&self, id: ClientId, public_key: &str) -> Result<()>;

    /// Deletes an identity. Returns `false` if it did not exist.
    ///
    /// # Errors
    /// `Storage` if the deletion cannot be persisted.
    fn delete(&self, id: ClientId) -> Result<bool>;

    /// Number of registered identities.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is registered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================
// DirectoryTable
// ============================================

/// The table both implementations share; also the JSON file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DirectoryTable {
    /// Last id handed out (0 before the first signup)
    last_id: u32,
    /// Registered identities by id
    identities: BTreeMap<u32, RegisteredIdentity>,
}

impl DirectoryTable {
    fn insert(&mut self, name: &str, public_key: &str) -> Result<ClientId> {
        let id = match ClientId::new(self.last_id) {
            Some(last) => last.next(),
            None => ClientId::FIRST,
        };
        if self.identities.contains_key(&id.get()) {
            return Err(ServerError::internal(format!("id {id} allocated twice")));
        }
        self.last_id = id.get();
        self.identities.insert(
            id.get(),
            RegisteredIdentity {
                id,
                name: name.to_string(),
                public_key: public_key.to_string(),
            },
        );
        Ok(id)
    }

    fn get(&self, id: ClientId) -> Result<RegisteredIdentity> {
        self.identities
            .get(&id.get())
            .cloned()
            .ok_or(ServerError::UnknownClient { client_id: id })
    }

    fn update_public_key(&mut self, id: ClientId, public_key: &str) -> Result<()> {
        let entry = self
            .identities
            .get_mut(&id.get())
            .ok_or(ServerError::UnknownClient { client_id: id })?;
        entry.public_key = public_key.to_string();
        Ok(())
    }

    fn delete(&mut self, id: ClientId) -> bool {
        self.identities.remove(&id.get()).is_some()
    }
}

// ============================================
// MemoryDirectory
// ============================================

/// In-memory identity directory.
#[derive(Default)]
pub struct MemoryDirectory {
    table: RwLock<DirectoryTable>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityDirectory for MemoryDirectory {
    fn insert(&self, name: &str, public_key: &str) -> Result<ClientId> {
        let id = self.table.write().insert(name, public_key)?;
        debug!(client_id = %id, "Identity registered");
        Ok(id)
    }

    fn get(&self, id: ClientId) -> Result<RegisteredIdentity> {
        self.table.read().get(id)
    }

    fn update_public_key(&self, id: ClientId, public_key: &str) -> Result<()> {
        self.table.write().update_public_key(id, public_key)
    }

    fn delete(&self, id: ClientId) -> Result<bool> {
        Ok(self.table.write().delete(id))
    }

    fn len(&self) -> usize {
        self.table.read().identities.len()
    }
}

impl fmt::Debug for MemoryDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDirectory")
            .field("identities", &self.len())
            .finish()
    }
}

// ============================================
// JsonFileDirectory
// ============================================

/// Identity directory persisted as a JSON file.
///
/// Each mutation is applied to a copy of the table, written out, and only
/// then committed in memory.
pub struct JsonFileDirectory {
    path: PathBuf,
    table: RwLock<DirectoryTable>,
}

impl JsonFileDirectory {
    /// Opens the file, starting empty if it does not exist yet.
    ///
    /// # Errors
    /// `Storage` if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| ServerError::storage(format!("reading {}: {e}", path.display())))?;
            serde_json::from_str(&content)
                .map_err(|e| ServerError::storage(format!("parsing {}: {e}", path.display())))?
        } else {
            DirectoryTable::default()
        };

        info!(
            path = %path.display(),
            identities = table.identities.len(),
            "Identity directory opened"
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
    fn mutate<T>(&self, change: impl FnOnce(&mut DirectoryTable) -> Result<T>) -> Result<T> {
        let mut table = self.table.write();
        let mut draft = table.clone();
        let out = change(&mut draft)?;
        persist(&self.path, &draft)?;
        *table = draft;
        Ok(out)
    }
}

impl IdentityDirectory for JsonFileDirectory {
    fn insert(&self, name: &str, public_key: &str) -> Result<ClientId> {
        let id = self.mutate(|table| table.insert(name, public_key))?;
        debug!(client_id = %id, "Identity registered");
        Ok(id)
    }

    fn get(&self, id: ClientId) -> Result<RegisteredIdentity> {
        self.table.read().get(id)
    }

    fn update_public_key(&self, id: ClientId, public_key: &str) -> Result<()> {
        self.mutate(|table| table.update_public_key(id, public_key))
    }

    fn delete(&self, id: ClientId) -> Result<bool> {
        if self.table.read().get(id).is_err() {
            return Ok(false);
        }
        self.mutate(|table| Ok(table.delete(id)))
    }

    fn len(&self) -> usize {
        self.table.read().identities.len()
    }
}

impl fmt::Debug for JsonFileDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonFileDirectory")
            .field("path", &self.path)
            .field("identities", &self.len())
            .finish()
    }
}

/// Writes the table and restricts the file to its owner on Unix.
fn persist(path: &Path, table: &DirectoryTable) -> Result<()> {
    let content = serde_json::to_string_pretty(table)
        .map_err(|e| ServerError::storage(format!("encoding directory: {e}")))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| ServerError::storage(format!("creating {}: {e}", parent.display())))?;
    }
    std::fs::write(path, content)
        .map_err(|e| ServerError::storage(format!("writing {}: {e}", path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| ServerError::storage(format!("restricting {}: {e}", path.display())))?;
    }

    Ok(())
}

// ============================================
// Tests
// ============================================
