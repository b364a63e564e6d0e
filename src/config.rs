use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::poller::PollPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Keyring,
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Delay between storing a pair and renewing it; access tokens live 15 minutes
    #[serde(default = "default_renew_after")]
    pub renew_after_secs: u64,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_store")]
    pub store: StoreBackend,
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Unset polls until a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

// Defaults
fn default_base_url() -> String { "http://localhost:5000".to_string() }
fn default_prefix() -> String { "/v1".to_string() }
fn default_renew_after() -> u64 { 13 * 60 }
fn default_login_path() -> String { "/login".to_string() }
fn default_store() -> StoreBackend { StoreBackend::Keyring }
fn default_keyring_service() -> String { "wayfarer".to_string() }
fn default_interval_ms() -> u64 { 1000 }
fn default_log_level() -> String { "info".to_string() }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            prefix: default_prefix(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            renew_after_secs: default_renew_after(),
            login_path: default_login_path(),
            store: default_store(),
            keyring_service: default_keyring_service(),
            file_path: None,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: None,
            deadline_secs: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl SessionConfig {
    pub fn renew_after(&self) -> Duration {
        Duration::from_secs(self.renew_after_secs)
    }
}

impl PollingConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            max_attempts: self.max_attempts,
            deadline: self.deadline_secs.map(Duration::from_secs),
        }
    }
}

impl Config {
    /// Load configuration from file and environment; no file means defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config_path = env::var("WAYFARER_CONFIG").ok().or_else(|| {
            let home_config = format!(
                "{}/.config/wayfarer/config.toml",
                env::var("HOME").unwrap_or_default()
            );
            ["./wayfarer.toml", "./config.toml", home_config.as_str()]
                .into_iter()
                .find(|path| Path::new(path).exists())
                .map(str::to_string)
        });

        let Some(config_path) = config_path else {
            tracing::debug!("No config file found, using defaults");
            let config = Config::default();
            config.validate()?;
            return Ok(config);
        };

        Self::from_file(&config_path)
    }

    pub fn from_file(config_path: &str) -> Result<Self> {
        // Validate config file permissions on Unix systems
        #[cfg(unix)]
        Self::validate_file_permissions(config_path)?;

        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;

        Self::parse(&config_content)
            .with_context(|| format!("Failed to parse config file: {}", config_path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        // Substitute environment variables
        let content = Self::substitute_env_vars(content);

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Substitute ${VAR_NAME} with environment variable values.
    ///
    /// Substituted values are inserted verbatim; placeholders inside them are not expanded.
    fn substitute_env_vars(content: &str) -> String {
        let mut result = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(start) = rest.find("${") {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            result.push_str(&rest[..start]);
            let var_name = &rest[start + 2..start + len];
            result.push_str(&env::var(var_name).unwrap_or_default());
            rest = &rest[start + len + 1..];
        }

        result.push_str(rest);
        result
    }

    fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid api.base_url: {}", self.api.base_url))?;
        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("api.base_url must be http or https: {}", self.api.base_url);
        }

        if self.session.renew_after_secs == 0 {
            anyhow::bail!("session.renew_after_secs must be greater than zero");
        }
        if self.polling.interval_ms == 0 {
            anyhow::bail!("polling.interval_ms must be greater than zero");
        }
        if self.polling.max_attempts == Some(0) {
            anyhow::bail!("polling.max_attempts must be greater than zero when set");
        }

        if self.polling.max_attempts.is_none() && self.polling.deadline_secs.is_none() {
            tracing::debug!("Polling is unbounded - loops run until a terminal status");
        }

        Ok(())
    }

    /// Validate config file permissions (Unix only)
    #[cfg(unix)]
    fn validate_file_permissions(path: &str) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let path_obj = Path::new(path);

        if !path_obj.exists() {
            tracing::debug!("Config file does not exist yet: {}", path);
            return Ok(());
        }

        let metadata = fs::metadata(path_obj)
            .with_context(|| format!("Failed to read metadata for config file: {}", path))?;

        let mode = metadata.permissions().mode();
        let group_writable = (mode & 0o020) != 0;
        let others_writable = (mode & 0o002) != 0;

        if group_writable || others_writable {
            anyhow::bail!(
                "Config file {} is writable by group or others (mode: {:o}). \
                This is a security risk. Run: chmod 600 {}",
                path,
                mode & 0o777,
                path
            );
        }

        Ok(())
    }
}
