// Session and credential lifecycle

pub mod renewal;
pub mod session;
pub mod store;
pub mod submit;

pub use renewal::RenewalSchedule;
pub use session::{SessionManager, SessionState};
pub use store::{CredentialStore, FileStore, KeyringStore, MemoryStore, StoreError};
pub use submit::{SubmitControl, SubmitGuard};

use std::sync::Arc;

use crate::config::{SessionConfig, StoreBackend};

/// Build the credential store selected in configuration
pub fn open_store(config: &SessionConfig) -> Arc<dyn CredentialStore> {
    match config.store {
        StoreBackend::Keyring => Arc::new(KeyringStore::new(&config.keyring_service)),
        StoreBackend::File => {
            let path = config.file_path.clone().unwrap_or_else(FileStore::default_path);
            Arc::new(FileStore::new(path))
        }
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    }
}
