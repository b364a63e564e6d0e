pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod jobs;
pub mod navigation;
pub mod poller;
pub mod types;

// Re-export commonly used types
pub use api::{ApiClient, AuthApi};
pub use auth::{SessionManager, SessionState};
pub use config::Config;
pub use error::ClientError;
pub use navigation::Navigator;
pub use poller::{JobSource, PollPolicy, PollStatus, Poller};
pub use types::{JobHandle, TokenPair};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
