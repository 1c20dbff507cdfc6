//! Server configuration.
//!
//! Resolution order, later wins:
//!
//! 1. Built-in defaults.
//! 2. `config/keeper.toml` (or the file passed with `--config`).
//! 3. `KEEPER_*` / `LOG_LEVEL` environment variables (`.env` is loaded
//!    into the environment first).
//! 4. `serve --bind/--port` flags.
//!
//! There is no default for either secret; [`KeeperConfig::validate`] refuses
//! to start without them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/keeper.toml";

const REDACTED: &str = "<redacted>";
const UNSET: &str = "<unset>";

/// Which user directory implementation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserBackend {
    /// In-memory map snapshotted to a JSON file.
    File,
    /// SQLite database.
    Sqlite,
}

impl std::str::FromStr for UserBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            other => bail!("unknown user backend {other:?} (expected \"file\" or \"sqlite\")"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind_addr: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 8080,
            max_body_bytes: 32 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// Root of the record store.
    pub dir: PathBuf,
    pub user_backend: UserBackend,
    /// Snapshot file for the `file` backend.
    pub users_file: PathBuf,
    /// Database file for the `sqlite` backend.
    pub database_path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/records"),
            user_backend: UserBackend::File,
            users_file: PathBuf::from("data/users.json"),
            database_path: PathBuf::from("data/keeper.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecuritySection {
    pub encryption_secret: String,
    pub token_secret: String,
    pub token_expiration_hours: i64,
    pub password_iterations: u32,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            encryption_secret: String::new(),
            token_secret: String::new(),
            token_expiration_hours: keeper_auth::DEFAULT_TTL_HOURS,
            password_iterations: keeper_vault::password::DEFAULT_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeeperConfig {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub security: SecuritySection,
    pub log: LogSection,
}

impl KeeperConfig {
    /// Read `path`. A missing file yields defaults unless `required`.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };

        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = var("KEEPER_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = var("KEEPER_PORT") {
            self.server.port = v
                .parse()
                .with_context(|| format!("KEEPER_PORT is not a port number: {v:?}"))?;
        }
        if let Some(v) = var("KEEPER_STORAGE_DIR") {
            self.storage.dir = v.into();
        }
        if let Some(v) = var("KEEPER_USER_BACKEND") {
            self.storage.user_backend = v.parse().context("invalid KEEPER_USER_BACKEND")?;
        }
        if let Some(v) = var("KEEPER_USERS_FILE") {
            self.storage.users_file = v.into();
        }
        if let Some(v) = var("KEEPER_DATABASE_PATH") {
            self.storage.database_path = v.into();
        }
        if let Some(v) = var("KEEPER_ENCRYPTION_SECRET") {
            self.security.encryption_secret = v;
        }
        if let Some(v) = var("KEEPER_TOKEN_SECRET") {
            self.security.token_secret = v;
        }
        if let Some(v) = var("KEEPER_TOKEN_EXPIRATION") {
            self.security.token_expiration_hours = v
                .parse()
                .with_context(|| format!("KEEPER_TOKEN_EXPIRATION is not a number of hours: {v:?}"))?;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log.level = v;
        }
        Ok(())
    }

    /// Reject configurations the server cannot safely run with.
    pub fn validate(&self) -> Result<()> {
        if self.security.encryption_secret.is_empty() {
            bail!("encryption secret is not set (security.encryption_secret or KEEPER_ENCRYPTION_SECRET)");
        }
        if self.security.token_secret.is_empty() {
            bail!("token secret is not set (security.token_secret or KEEPER_TOKEN_SECRET)");
        }
        self.token_ttl()?;
        if self.security.password_iterations == 0 {
            bail!("password_iterations must be at least 1");
        }
        if self.server.max_body_bytes == 0 {
            bail!("max_body_bytes must be at least 1");
        }
        Ok(())
    }

    /// Token lifetime; must be positive and representable as a duration.
    pub fn token_ttl(&self) -> Result<chrono::Duration> {
        let hours = self.security.token_expiration_hours;
        match chrono::Duration::try_hours(hours) {
            Some(ttl) if hours > 0 => Ok(ttl),
            _ => bail!("token expiration must be a positive number of hours, got {hours}"),
        }
    }

    /// TOML rendering with both secrets masked.
    pub fn redacted(&self) -> Result<String> {
        let mask = |s: &str| if s.is_empty() { UNSET } else { REDACTED }.to_string();

        let mut shown = self.clone();
        shown.security.encryption_secret = mask(&self.security.encryption_secret);
        shown.security.token_secret = mask(&self.security.token_secret);
        toml::to_string_pretty(&shown).context("failed to render configuration")
    }

    pub fn web_config(&self) -> keeper_web::WebConfig {
        keeper_web::WebConfig {
            bind_addr: self.server.bind_addr.clone(),
            port: self.server.port,
            max_body_bytes: self.server.max_body_bytes,
        }
    }
}
