//! Configuration management.
//!
//! Settings live in `~/.offsync/config.json`; every value can be overridden
//! from the environment.
//!
//! Resolution order for each setting:
//! 1. Explicit CLI flag (database path only)
//! 2. Environment variable (`OFFSYNC_DB`, `OFFSYNC_SUPABASE_URL`, `OFFSYNC_SUPABASE_KEY`)
//! 3. Config file
//! 4. Default

use crate::error::{Error, Result};
use crate::model::EntityType;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_DB: &str = "OFFSYNC_DB";
pub const ENV_SUPABASE_URL: &str = "OFFSYNC_SUPABASE_URL";
pub const ENV_SUPABASE_KEY: &str = "OFFSYNC_SUPABASE_KEY";

/// Contents of `config.json`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsyncConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supabase_anon_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// Tables pulled by a download pass. All entity types when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_tables: Option<Vec<String>>,
}

impl OffsyncConfig {
    /// Parsed download table list.
    ///
    /// # Errors
    ///
    /// Returns `UnknownEntityType` for a name that is not an entity table.
    pub fn download_tables(&self) -> Result<Vec<EntityType>> {
        match &self.download_tables {
            Some(names) => names.iter().map(|n| n.parse::<EntityType>()).collect(),
            None => Ok(EntityType::ALL.to_vec()),
        }
    }

    /// Remote credentials, with environment overrides applied.
    #[must_use]
    pub fn supabase(&self) -> SupabaseConfig {
        SupabaseConfig {
            url: pick(env_var(ENV_SUPABASE_URL), self.supabase_url.clone()),
            anon_key: pick(env_var(ENV_SUPABASE_KEY), self.supabase_anon_key.clone()),
        }
    }
}

/// Resolved Supabase credentials. Empty strings mean unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

impl SupabaseConfig {
    /// Both URL and key are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// First non-empty of `env`, then `file`, else empty.
fn pick(env: Option<String>, file: Option<String>) -> String {
    env.or_else(|| file.filter(|v| !v.trim().is_empty()))
        .unwrap_or_default()
}

/// The global offsync directory (`~/.offsync`).
#[must_use]
pub fn global_offsync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".offsync"))
}

/// Get the config file path.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_path() -> Result<PathBuf> {
    global_offsync_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Load the configuration file. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<OffsyncConfig> {
    load_config_from(&config_path()?)
}

/// Load configuration from an explicit path.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<OffsyncConfig> {
    if !path.exists() {
        return Ok(OffsyncConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Write the configuration file, creating its directory.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_config_to(path: &Path, config: &OffsyncConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(path, content)
        .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))
}

/// Resolve the database path.
///
/// Priority:
/// 1. `explicit_path` (the `--db` flag)
/// 2. `OFFSYNC_DB` environment variable
/// 3. `database_path` from the config file
/// 4. `~/.offsync/data/offsync.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>, config: &OffsyncConfig) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Some(db_path) = env_var(ENV_DB) {
        return Some(PathBuf::from(db_path));
    }

    if let Some(path) = &config.database_path {
        return Some(path.clone());
    }

    global_offsync_dir().map(|dir| dir.join("data").join("offsync.db"))
}
