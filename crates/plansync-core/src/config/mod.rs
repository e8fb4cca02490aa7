//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: `<config dir>/plansync/config.toml`
//! 3. Project config: `./plansync.toml`, or the file passed with `--config`
//! 4. Environment variables: `PLANSYNC_*`
//! 5. CLI flags (command-specific)
//!
//! # Example Config
//!
//! ```toml
//! database_url = "sqlite://plansync.db?mode=rwc"
//!
//! [worker]
//! concurrency = 8
//!
//! [lock]
//! ttl_ms = 30000
//! max_retries = 10
//!
//! [store]
//! kind = "http"
//! base_url = "https://api.example.com/documents"
//! ```
//!
//! # Module Structure
//!
//! - `types`: Configuration structures and their defaults
//! - `load`: Loading from files and environment
//! - `validate`: Range checks

mod load;
mod types;
mod validate;

pub use load::{global_config_path, load_config, load_toml_file, merge_tables, PROJECT_CONFIG_FILE};
pub use types::{Config, LockConfig, QueueConfig, StoreConfig, StoreKind, WorkerConfig};
