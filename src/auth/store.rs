/// Durable storage for the current session's token pair
/// Backends: system keyring (Secret Service / Keychain / Credential Manager), a JSON file, memory
use keyring::Entry;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::types::StoredCredentials;

/// Keyring account under which the session record lives
const SESSION_ENTRY: &str = "session";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("keyring: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt session record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Both tokens are written and read as a single record, so readers never
/// observe an access token from one generation next to a refresh token from another.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredCredentials>, StoreError>;
    fn save(&self, credentials: &StoredCredentials) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, SESSION_ENTRY)?)
    }
}

impl CredentialStore for KeyringStore {
    fn load(&self) -> Result<Option<StoredCredentials>, StoreError> {
        match self.entry()?.get_password() {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<(), StoreError> {
        let json = serde_json::to_string(credentials)?;
        self.entry()?.set_password(&json)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry()?.delete_password() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already cleared
            Err(e) => Err(e.into()),
        }
    }
}

/// JSON file store; writes go to a sibling temp file and are renamed into place
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// `$WAYFARER_STATE_DIR`, then `$XDG_STATE_HOME/wayfarer`, then `$HOME/.local/state/wayfarer`
    pub fn default_path() -> PathBuf {
        let dir = if let Ok(dir) = std::env::var("WAYFARER_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            PathBuf::from(xdg).join("wayfarer")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".local/state/wayfarer")
        } else {
            PathBuf::from(".wayfarer")
        };
        dir.join("session.json")
    }
}

impl CredentialStore for FileStore {
    fn load(&self) -> Result<Option<StoredCredentials>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::read_to_string(&self.path) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(credentials)?)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<StoredCredentials>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(credentials: StoredCredentials) -> Self {
        Self {
            record: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Result<Option<StoredCredentials>, StoreError> {
        Ok(self.record.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<(), StoreError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
