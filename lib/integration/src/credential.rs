//! Per-service credential persistence.
//!
//! Credentials are opaque bearer tokens kept in a flat key/value store under
//! `"{slug}_token"`. There is one slot per service; an empty slot means the
//! service is not connected. Tokens are never validated, expired, or
//! encrypted, and never logged.

use crate::error::StorageError;
use oauth2::AccessToken;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use switchboard_core::Service;
use tracing::{debug, warn};

/// Flat string key/value storage.
///
/// Implementations must be cheap to call from async code; they are
/// invoked between await points, never across one.
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory storage, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// JSON-file storage: a single object mapping keys to string values.
///
/// The file is re-read on every access so several processes sharing the
/// path observe each other's writes. Writes go to a sibling temp file that
/// is renamed over the original.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: RwLock<()>,
}

#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

impl FileStore {
    /// Creates a store backed by `path`. The file need not exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: RwLock::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(StorageError::ReadFailed {
                    reason: format!("{}: {e}", self.path.display()),
                });
            }
        };

        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&contents).map_err(|e| StorageError::Corrupt {
            reason: format!("{}: {e}", self.path.display()),
        })
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let write_failed = |e: std::io::Error| StorageError::WriteFailed {
            reason: format!("{}: {e}", self.path.display()),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_failed)?;
        }

        let json = serde_json::to_string_pretty(map).map_err(|e| StorageError::WriteFailed {
            reason: e.to_string(),
        })?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(write_failed)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(FILE_MODE))
                .map_err(write_failed)?;
        }

        std::fs::rename(&tmp, &self.path).map_err(write_failed)
    }

    fn modify(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        let mut map = self.read_map()?;
        apply(&mut map);
        self.write_map(&map)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self
            .write_lock
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.modify(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.modify(|map| {
            map.remove(key);
        })
    }
}

/// Token persistence keyed by service.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    /// Creates a credential store over the given key/value storage.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Creates a credential store that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// The storage key for a service's token.
    #[must_use]
    pub fn storage_key(service: Service) -> String {
        format!("{}_token", service.slug())
    }

    /// Stores a token for the service, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    pub fn connect(&self, service: Service, token: &AccessToken) -> Result<(), StorageError> {
        self.store.set(&Self::storage_key(service), token.secret())?;
        debug!(%service, "credential stored");
        Ok(())
    }

    /// Removes the service's token.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    pub fn disconnect(&self, service: Service) -> Result<(), StorageError> {
        self.store.remove(&Self::storage_key(service))?;
        debug!(%service, "credential removed");
        Ok(())
    }

    /// Returns the stored token, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    pub fn token(&self, service: Service) -> Result<Option<AccessToken>, StorageError> {
        Ok(self
            .store
            .get(&Self::storage_key(service))?
            .filter(|token| !token.is_empty())
            .map(AccessToken::new))
    }

    /// Whether a token is stored for the service.
    ///
    /// Unreadable storage counts as not connected.
    #[must_use]
    pub fn is_connected(&self, service: Service) -> bool {
        match self.token(service) {
            Ok(token) => token.is_some(),
            Err(e) => {
                warn!(%service, error = %e, "credential lookup failed");
                false
            }
        }
    }
}
