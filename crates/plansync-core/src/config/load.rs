//! Configuration loading from files and environment
//!
//! Files are read as raw TOML tables and deep-merged (later files win key by
//! key) before a single deserialization into [`Config`]. Environment
//! overrides are applied to the typed config afterwards.

use std::path::{Path, PathBuf};

use super::types::{Config, StoreKind};
use crate::{Error, Result};

/// Project config file looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = "plansync.toml";

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration from all sources with hierarchy
///
/// `explicit` replaces the project config lookup and must exist.
///
/// # Errors
///
/// Returns error if:
/// - `explicit` is given but missing
/// - A config file is malformed TOML or has wrongly typed values
/// - An environment override cannot be parsed
/// - Config values fail validation
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut table = toml::Table::new();

    if let Some(global_path) = global_config_path().filter(|p| p.exists()) {
        tracing::debug!(path = %global_path.display(), "loading global config");
        table = merge_tables(table, load_toml_file(&global_path)?);
    }

    let project_path = match explicit {
        Some(path) if !path.exists() => {
            return Err(Error::Io(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Some(path) => Some(path.to_path_buf()),
        None => Some(PathBuf::from(PROJECT_CONFIG_FILE)).filter(|p| p.exists()),
    };
    if let Some(path) = project_path {
        tracing::debug!(path = %path.display(), "loading project config");
        table = merge_tables(table, load_toml_file(&path)?);
    }

    let config = Config::from_table(table)?.apply_env_vars()?;
    config.validate()?;
    Ok(config)
}

// ═══════════════════════════════════════════════════════════════════════════
// FILE HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Get path to global config file
#[must_use]
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "plansync")
        .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
}

/// Load a TOML file as a raw table
///
/// # Errors
///
/// Returns error if the path is a directory, cannot be read, or is not TOML.
pub fn load_toml_file(path: &Path) -> Result<toml::Table> {
    if path.is_dir() {
        return Err(Error::Io(format!(
            "config path is a directory, not a file: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("failed to read config file {}: {e}", path.display())))?;

    content
        .parse::<toml::Table>()
        .map_err(|e| Error::Parse(format!("failed to parse config file {}: {e}", path.display())))
}

/// Deep-merge `overlay` into `base`. Nested tables merge key by key; any
/// other value in `overlay` replaces the one in `base`.
#[must_use]
pub fn merge_tables(mut base: toml::Table, overlay: toml::Table) -> toml::Table {
    for (key, value) in overlay {
        let merged = match (base.remove(&key), value) {
            (Some(toml::Value::Table(inner)), toml::Value::Table(over)) => {
                toml::Value::Table(merge_tables(inner, over))
            }
            (_, value) => value,
        };
        base.insert(key, merged);
    }
    base
}

impl Config {
    /// Deserialize a merged table; absent keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when a value has the wrong type.
    pub fn from_table(table: toml::Table) -> Result<Self> {
        toml::Value::Table(table)
            .try_into()
            .map_err(|e| Error::Parse(format!("invalid config: {e}")))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ENVIRONMENT VARIABLE OVERRIDES
// ═══════════════════════════════════════════════════════════════════════════

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(name).ok().map_or(Ok(None), |value| {
        value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::InvalidConfig(format!("Invalid {name} value '{value}': {e}")))
    })
}

impl Config {
    /// Apply `PLANSYNC_*` environment variable overrides
    ///
    /// # Errors
    ///
    /// Returns error if environment variable values are invalid
    pub fn apply_env_vars(mut self) -> Result<Self> {
        if let Ok(value) = std::env::var("PLANSYNC_DATABASE_URL") {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(
                    "PLANSYNC_DATABASE_URL cannot be empty - unset the variable or provide a URL"
                        .to_string(),
                ));
            }
            self.database_url = value;
        }

        if let Some(concurrency) = env_parse("PLANSYNC_WORKER_CONCURRENCY")? {
            self.worker.concurrency = concurrency;
        }
        if let Some(ttl_ms) = env_parse("PLANSYNC_LOCK_TTL_MS")? {
            self.lock.ttl_ms = ttl_ms;
        }
        if let Some(max_retries) = env_parse("PLANSYNC_LOCK_MAX_RETRIES")? {
            self.lock.max_retries = max_retries;
        }
        if let Some(debounce_ms) = env_parse("PLANSYNC_QUEUE_DEBOUNCE_MS")? {
            self.queue.debounce_ms = debounce_ms;
        }
        if let Some(attempts) = env_parse("PLANSYNC_QUEUE_ATTEMPTS")? {
            self.queue.attempts = attempts;
        }
        if let Some(kind) = env_parse::<StoreKind>("PLANSYNC_STORE_KIND")? {
            self.store.kind = kind;
        }
        if let Ok(value) = std::env::var("PLANSYNC_STORE_BASE_URL") {
            self.store.base_url = Some(value);
        }
        if let Ok(value) = std::env::var("PLANSYNC_STORE_TOKEN") {
            self.store.token = Some(value);
        }

        Ok(self)
    }
}
