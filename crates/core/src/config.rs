//! Application configuration.
//!
//! Values come from `~/.config/gamevault/config.toml`, then `GAMEVAULT_*`
//! environment variables, then `RAWG_API_KEY` for the catalog key.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Directory under the user config dir holding `config.toml`.
pub const CONFIG_DIR: &str = "gamevault";
/// Environment variable carrying the remote catalog key.
pub const API_KEY_ENV: &str = "RAWG_API_KEY";

const DEFAULT_CONFIG: &str = r#"# GameVault configuration

# Root of the remote catalog API.
remote_base_url = "https://api.rawg.io/api"

# Catalog API key. Leave empty and export RAWG_API_KEY instead.
api_key = ""

# Base URL of the local collection store (serves /games).
local_base_url = "http://localhost:8000"

# Games per page for both sources.
page_size = 10

# HTTP timeout in seconds.
request_timeout_secs = 10
"#;

/// Runtime settings for the catalog clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the remote catalog API.
    pub remote_base_url: String,
    /// Catalog API key.
    pub api_key: String,
    /// Base URL of the local collection store.
    pub local_base_url: String,
    /// Games per page.
    pub page_size: u32,
    /// HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote_base_url: "https://api.rawg.io/api".to_string(),
            api_key: String::new(),
            local_base_url: "http://localhost:8000".to_string(),
            page_size: 10,
            request_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load from the default config file location plus the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load from `path` (optional) plus the environment.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(::config::Environment::with_prefix("GAMEVAULT").try_parsing(true))
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;

        if let Ok(key) = env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.api_key = key.trim().to_string();
            }
        }
        config.page_size = config.page_size.max(1);
        Ok(config)
    }

    /// HTTP timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Default location of `config.toml`.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join("config.toml")
}

/// Write the commented default configuration when none exists yet.
pub fn ensure_default_config() -> Result<()> {
    write_default_config(config_path())
}

/// Write the default configuration to `path` unless the file already exists.
pub fn write_default_config(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config {}", path.display()))?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(())
}
