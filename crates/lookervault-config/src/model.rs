use std::path::PathBuf;

use lookervault_store::ContentType;
use serde::Deserialize;

use crate::error::ConfigError;

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> i64 {
    100
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(8)
}

fn default_queue_size() -> usize {
    default_workers() * 100
}

fn default_rate_limit_per_minute() -> u32 {
    100
}

fn default_rate_limit_per_second() -> u32 {
    10
}

fn default_checkpoint_interval() -> u64 {
    100
}

fn default_max_retries() -> u32 {
    5
}

fn default_retention_days() -> u32 {
    90
}

fn default_max_blob_size_mb() -> u32 {
    50
}

/// `[looker]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LookerSettings {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
}

impl Default for LookerSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            verify_ssl: true,
            timeout: default_timeout_secs(),
        }
    }
}

/// `[extraction]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub db_path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
    pub default_fields: Vec<String>,
    pub auto_resume: bool,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("lookervault.db"),
            batch_size: default_batch_size(),
            default_fields: Vec::new(),
            auto_resume: false,
        }
    }
}

/// `[parallel]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParallelSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
    #[serde(default = "default_rate_limit_per_second")]
    pub rate_limit_per_second: u32,
    #[serde(default = "default_true")]
    pub adaptive_rate_limiting: bool,
}

impl Default for ParallelSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_size: default_queue_size(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            rate_limit_per_second: default_rate_limit_per_second(),
            adaptive_rate_limiting: true,
        }
    }
}

/// `[storage]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_max_blob_size_mb")]
    pub max_blob_size_mb: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            max_blob_size_mb: default_max_blob_size_mb(),
        }
    }
}

/// `[restore.filters]` — raw string type names as written in the config
/// file; resolved to `ContentType` by [`Filters::resolve`] so a typo
/// surfaces as a `ConfigError` rather than silently matching nothing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFilters {
    pub exclude_types: Vec<String>,
    pub only_types: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub exclude_types: Vec<ContentType>,
    pub only_types: Vec<ContentType>,
}

impl RawFilters {
    pub fn resolve(&self) -> Result<Filters, ConfigError> {
        Ok(Filters {
            exclude_types: resolve_types(&self.exclude_types)?,
            only_types: resolve_types(&self.only_types)?,
        })
    }
}

fn resolve_types(names: &[String]) -> Result<Vec<ContentType>, ConfigError> {
    names
        .iter()
        .map(|n| n.parse().map_err(|_| ConfigError::InvalidContentType(n.clone())))
        .collect()
}

/// `[restore]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestoreSettings {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
    #[serde(default = "default_rate_limit_per_second")]
    pub rate_limit_per_second: u32,
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    pub filters: RawFilters,
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            rate_limit_per_second: default_rate_limit_per_second(),
            checkpoint_interval: default_checkpoint_interval(),
            max_retries: default_max_retries(),
            filters: RawFilters::default(),
        }
    }
}

/// The full merged configuration: built-in defaults, overridden by a config
/// file, overridden by environment variables, overridden by CLI flags
/// (`lookervault-cli` applies the CLI layer after [`Config::load`]).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub looker: LookerSettings,
    pub extraction: ExtractionSettings,
    pub parallel: ParallelSettings,
    pub storage: StorageSettings,
    pub restore: RestoreSettings,
}
