use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

/// Overrides `server.base_url`.
pub const BASE_URL_ENV: &str = "TASKSYNC_BASE_URL";

/// User-level configuration loaded from `<config dir>/tasksync/config.toml`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Where the task snapshot lives. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Server root; the task API is mounted below it at `/api/tasks`.
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    pub page_size: u32,
    /// How often `watch` probes the server.
    pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            probe_interval_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Encrypt the snapshot with a key kept in the OS keyring.
    pub encrypt: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { encrypt: true }
    }
}

/// Load config from the default path, then apply environment overrides.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    let config = load_from_path(path)?;
    Ok(with_env_override(config, std::env::var(BASE_URL_ENV).ok()))
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(toml::from_str(&contents)?)
}

fn with_env_override(mut config: Config, base_url: Option<String>) -> Config {
    if let Some(url) = base_url.filter(|url| !url.trim().is_empty()) {
        config.server.base_url = url.trim().to_string();
    }
    config
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("tasksync").join("config.toml"))
}

/// Write `config` to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_if_missing(config, &default_path()?)
}

fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(path.to_path_buf())
}
