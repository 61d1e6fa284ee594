//! Layered settings for the Tally binaries.
//!
//! Sources are merged in order: `config/default.toml`, `config/{env}.toml`,
//! then `TALLY__`-prefixed environment variables (`TALLY__DATABASE__PATH`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "TALLY";
pub const DEFAULT_CONFIG_DIR: &str = "config";

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub checkpoints: CheckpointSettings,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    /// How long a unit of work waits on a locked book before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Planner tuning. Validation happens when the engine is built.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CheckpointSettings {
    #[serde(default = "default_min_checkpoint_count")]
    pub min_checkpoint_count: usize,
    #[serde(default = "default_min_gap_secs")]
    pub min_gap_secs: i64,
    #[serde(default = "default_boundary_offset_secs")]
    pub boundary_offset_secs: i64,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            min_checkpoint_count: default_min_checkpoint_count(),
            min_gap_secs: default_min_gap_secs(),
            boundary_offset_secs: default_boundary_offset_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Also append log lines to this file when set.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            file: None,
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/tally.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_min_checkpoint_count() -> usize {
    3
}

fn default_min_gap_secs() -> i64 {
    10
}

fn default_boundary_offset_secs() -> i64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load settings for `env` from `./config` and the process environment.
pub fn load_config(env: Option<&str>) -> Result<AppConfig> {
    load_from(Path::new(DEFAULT_CONFIG_DIR), env, None)
}

/// Load settings from `dir`. `vars` replaces the process environment, which
/// keeps tests independent of the caller's shell.
pub fn load_from(
    dir: &Path,
    env: Option<&str>,
    vars: Option<HashMap<String, String>>,
) -> Result<AppConfig> {
    let mut builder =
        Config::builder().add_source(File::from(dir.join("default.toml")).required(false));
    if let Some(env) = env {
        builder = builder.add_source(File::from(dir.join(format!("{env}.toml"))).required(false));
    }
    let environment = Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .source(vars);
    let config = builder
        .add_source(environment)
        .build()
        .with_context(|| format!("failed to read configuration from {}", dir.display()))?;
    config
        .try_deserialize()
        .context("invalid configuration values")
}

/// Render the effective settings as TOML for `tally config`.
pub fn to_toml(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(config).context("failed to render configuration")
}
