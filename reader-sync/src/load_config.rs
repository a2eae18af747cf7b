/// `load_config` module: merges the optional static YAML config with environment credentials into a [`CliConfig`].
///
/// This module is the only place where untrusted YAML and environment input are parsed and mapped
/// to strongly-typed settings.
///
/// # Responsibilities
/// - Parse the optional YAML file (batch size, cutoff date, default tags, ledger path, pacing and
///   per-minute cap, base URLs)
/// - Fill every unset key with the built-in default
/// - Read secrets (`READWISE_TOKEN`, `CAPACITIES_TOKEN`, `CAPACITIES_SPACE_ID`) from the environment only
///
/// # Errors
/// All errors use `anyhow::Error` with context and surface at the CLI boundary.
use anyhow::{anyhow, Context, Result};
use reader_sync_core::config::{parse_cutoff, SyncConfig};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use crate::{capacities, readwise};

pub const DEFAULT_LEDGER_PATH: &str = "processed_ids.txt";

pub const READWISE_TOKEN_ENV: &str = "READWISE_TOKEN";
pub const CAPACITIES_TOKEN_ENV: &str = "CAPACITIES_TOKEN";
pub const CAPACITIES_SPACE_ID_ENV: &str = "CAPACITIES_SPACE_ID";
pub const READWISE_BASE_URL_ENV: &str = "READWISE_BASE_URL";
pub const CAPACITIES_BASE_URL_ENV: &str = "CAPACITIES_BASE_URL";

/// YAML-side settings. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub articles_per_run: Option<usize>,
    /// `YYYY-MM-DD`
    pub updated_after: Option<String>,
    pub default_tags: Option<Vec<String>>,
    pub ledger_path: Option<PathBuf>,
    pub request_interval_secs: Option<u64>,
    /// Cap on Readwise requests in any rolling minute; 0 disables it.
    pub requests_per_minute: Option<u32>,
    pub readwise_base_url: Option<String>,
    pub capacities_base_url: Option<String>,
}

/// API secrets. Debug output never shows the tokens.
#[derive(Clone)]
pub struct Credentials {
    pub readwise_token: String,
    pub capacities_token: String,
    pub capacities_space_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("readwise_token", &"<redacted>")
            .field("capacities_token", &"<redacted>")
            .field("capacities_space_id", &self.capacities_space_id)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub sync: SyncConfig,
    pub ledger_path: PathBuf,
    pub request_interval: Duration,
    pub requests_per_minute: u32,
    pub readwise_base_url: String,
    pub capacities_base_url: String,
    pub credentials: Credentials,
}

/// Loads the optional YAML file at `path`, then injects credentials from the environment.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let file = match path {
        Some(p) => load_file_config(p)?,
        None => {
            info!("No config file given, using built-in defaults");
            FileConfig::default()
        }
    };
    let credentials = credentials_from_env()?;
    resolve(file, credentials)
}

pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    info!(config_path = ?path, "Loading configuration from file");
    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path, e)
    })?;
    // An empty file is a valid "all defaults" config.
    if content.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
        anyhow!("Failed to parse config YAML: {e}")
    })
}

/// Reads the three required secrets. Blank values count as missing.
pub fn credentials_from_env() -> Result<Credentials> {
    Ok(Credentials {
        readwise_token: required_env(READWISE_TOKEN_ENV)?,
        capacities_token: required_env(CAPACITIES_TOKEN_ENV)?,
        capacities_space_id: required_env(CAPACITIES_SPACE_ID_ENV)?,
    })
}

fn required_env(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => {
            error!(env = key, "Required environment variable missing");
            Err(anyhow!("{key} missing in environment"))
        }
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Fill defaults; environment base URLs win over the file.
pub fn resolve(file: FileConfig, credentials: Credentials) -> Result<CliConfig> {
    let defaults = SyncConfig::default();
    let updated_after = match file.updated_after.as_deref() {
        Some(date) => parse_cutoff(date).context("invalid updated_after in config")?,
        None => defaults.updated_after,
    };
    let sync = SyncConfig {
        articles_per_run: file.articles_per_run.unwrap_or(defaults.articles_per_run),
        updated_after,
        default_tags: file.default_tags.unwrap_or(defaults.default_tags),
    };
    sync.validate()?;

    let config = CliConfig {
        sync,
        ledger_path: file
            .ledger_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH)),
        request_interval: file
            .request_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(readwise::DEFAULT_REQUEST_INTERVAL),
        requests_per_minute: file
            .requests_per_minute
            .unwrap_or(readwise::DEFAULT_REQUESTS_PER_MINUTE),
        readwise_base_url: optional_env(READWISE_BASE_URL_ENV)
            .or(file.readwise_base_url)
            .unwrap_or_else(|| readwise::DEFAULT_BASE_URL.to_string()),
        capacities_base_url: optional_env(CAPACITIES_BASE_URL_ENV)
            .or(file.capacities_base_url)
            .unwrap_or_else(|| capacities::DEFAULT_BASE_URL.to_string()),
        credentials,
    };
    config.sync.trace_loaded();
    info!(
        ledger_path = %config.ledger_path.display(),
        request_interval_secs = config.request_interval.as_secs(),
        requests_per_minute = config.requests_per_minute,
        "Resolved CLI configuration"
    );
    Ok(config)
}
