//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::models::checkup::Surface;
use crate::session::Role;
use crate::{AppError, Result};

/// Keyring service name under which the API credential is stored.
pub const KEYRING_SERVICE: &str = "checkup-sync";

/// Backend connectivity settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Base URL of the clinic REST API, e.g. `http://localhost:5000/api`.
    pub base_url: String,
    /// Hard timeout for the connectivity probe.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
}

impl BackendConfig {
    /// Probe timeout as a [`Duration`].
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }
}

/// Durable slice storage settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    /// `SQLite` database file; relative paths resolve against the config file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Write-coalescing window for slice saves.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl StorageConfig {
    /// Debounce window as a [`Duration`].
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Reconciliation scheduler settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    /// Seconds between full-replace refreshes.
    #[serde(default = "default_sync_interval")]
    pub interval_seconds: u64,
}

impl SyncConfig {
    /// Refresh interval as a [`Duration`].
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_sync_interval(),
        }
    }
}

/// Operator identity and inactivity timeout settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Idle time after which the session expires.
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_seconds: u64,
    /// How long before expiry the warning countdown starts.
    #[serde(default = "default_warning_lead")]
    pub warning_lead_seconds: u64,
    /// Operator identifier reported by the authentication provider.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Operator role; defaults from the configured surface when absent.
    #[serde(default)]
    pub role: Option<Role>,
    /// Sign the operator out after inactivity. Headless `run` deployments
    /// have no input source and should turn this off.
    #[serde(default = "default_enforce_inactivity")]
    pub enforce_inactivity: bool,
}

impl SessionConfig {
    /// Inactivity timeout as a [`Duration`].
    #[must_use]
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_seconds)
    }

    /// Warning lead as a [`Duration`].
    #[must_use]
    pub fn warning_lead(&self) -> Duration {
        Duration::from_secs(self.warning_lead_seconds)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_seconds: default_inactivity_timeout(),
            warning_lead_seconds: default_warning_lead(),
            user_id: None,
            role: None,
            enforce_inactivity: default_enforce_inactivity(),
        }
    }
}

/// Backup artifact settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackupConfig {
    /// Directory receiving exported backup documents.
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
    /// Maximum number of entries kept in the export history ledger.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            history_limit: default_history_limit(),
        }
    }
}

const fn default_enforce_inactivity() -> bool {
    true
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data").join("checkup-sync.db")
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_sync_interval() -> u64 {
    30
}

fn default_inactivity_timeout() -> u64 {
    1800
}

fn default_warning_lead() -> u64 {
    300
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

fn default_history_limit() -> usize {
    10
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Dashboard surface this process acts as; stamped on every write.
    #[serde(default)]
    pub surface: Surface,
    /// Backend connectivity.
    pub backend: BackendConfig,
    /// Slice storage.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Reconciliation scheduler.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Operator session.
    #[serde(default)]
    pub session: SessionConfig,
    /// Backup export.
    #[serde(default)]
    pub backup: BackupConfig,
    /// API bearer token (populated at runtime, never from TOML).
    #[serde(skip)]
    pub api_token: String,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// Relative storage and backup paths are resolved against the
    /// directory containing the config file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        let mut config = Self::from_toml_str(&raw)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the API token from OS keychain with env-var fallback.
    ///
    /// Tries the `checkup-sync` keyring service first, then falls back to
    /// the `CHECKUP_SYNC_TOKEN` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither source provides a token.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.api_token = load_credential("api_token", "CHECKUP_SYNC_TOKEN").await?;
        Ok(())
    }

    /// Role used for the operator identity, derived from the surface when unset.
    #[must_use]
    pub fn role(&self) -> Role {
        self.session.role.unwrap_or(match self.surface {
            Surface::Admin => Role::Admin,
            Surface::Doctor => Role::Doctor,
        })
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.storage.db_path.is_relative() {
            self.storage.db_path = base.join(&self.storage.db_path);
        }
        if self.backup.dir.is_relative() {
            self.backup.dir = base.join(&self.backup.dir);
        }
    }

    fn validate(&self) -> Result<()> {
        let base_url = self.backend.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(AppError::Config(
                "backend.base_url must be an http or https url".into(),
            ));
        }

        if self.backend.probe_timeout_seconds == 0 {
            return Err(AppError::Config(
                "backend.probe_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.storage.debounce_ms == 0 {
            return Err(AppError::Config(
                "storage.debounce_ms must be greater than zero".into(),
            ));
        }

        if self.sync.interval_seconds == 0 {
            return Err(AppError::Config(
                "sync.interval_seconds must be greater than zero".into(),
            ));
        }

        if self.session.warning_lead_seconds >= self.session.inactivity_timeout_seconds {
            return Err(AppError::Config(
                "session.warning_lead_seconds must be shorter than the inactivity timeout".into(),
            ));
        }

        if !(1..=10).contains(&self.backup.history_limit) {
            return Err(AppError::Config(
                "backup.history_limit must be between 1 and 10".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    match env::var(env_key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(AppError::Config(format!(
            "credential {keyring_key} not found in keychain service {KEYRING_SERVICE} or {env_key} env var"
        ))),
    }
}
