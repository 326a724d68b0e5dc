//! Application configuration for catalogwriter.
//!
//! User config lives at `~/.catalogwriter/catalogwriter.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CatalogWriterError, Result};
use crate::types::{MetricEntry, MetricMapping};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "catalogwriter.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".catalogwriter";

/// Prefix of the OPAL quality metric vocabulary.
const OPAL_METRICS: &str = "http://dice-research.org/opal/metrics/";

// ---------------------------------------------------------------------------
// Config structs (matching catalogwriter.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Target catalog settings.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Credential store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Queue worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Quality metric extraction.
    #[serde(default)]
    pub quality: QualityConfig,
}

/// `[catalog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// CKAN base URL, e.g. `http://localhost:5000`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Append `-1`, `-2`, ... to dataset names already produced by this process.
    #[serde(default = "default_true")]
    pub append_number: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            append_number: true,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5000".into()
}
fn default_true() -> bool {
    true
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL credential database. A leading `~` expands to home.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    format!("~/{CONFIG_DIR_NAME}/catalogwriter.db")
}

/// `[worker]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum messages processed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Bounded queue capacity between producer and consumer.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    64
}

/// `[quality]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Metrics to extract, in output order.
    #[serde(default = "default_metrics")]
    pub metrics: MetricMapping,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            metrics: default_metrics(),
        }
    }
}

fn default_metrics() -> MetricMapping {
    [
        ("availability", "Availability"),
        ("categorization", "Categorization"),
        ("dataFormat", "DataFormat"),
        ("multipleSerializations", "MultipleSerializations"),
        ("providerIdentity", "ProviderIdentity"),
        ("readability", "Readability"),
        ("retrievability", "Retrievability"),
    ]
    .into_iter()
    .map(|(key, name)| MetricEntry {
        key: key.into(),
        measurement: format!("{OPAL_METRICS}{name}"),
        name: Some(name.into()),
    })
    .collect::<Vec<_>>()
    .into()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Parsed catalog base URL. Only `http` and `https` are accepted.
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.catalog.base_url).map_err(|e| {
            CatalogWriterError::config(format!(
                "invalid catalog.base_url '{}': {e}",
                self.catalog.base_url
            ))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(CatalogWriterError::config(format!(
                "catalog.base_url must be http or https, got '{other}'"
            ))),
        }
    }

    /// Resolved credential database path with `~` expanded.
    pub fn db_path(&self) -> Result<PathBuf> {
        expand_home(&self.storage.db_path)
    }
}

/// Check the config for values the worker cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    config.base_url()?;

    if config.worker.concurrency == 0 {
        return Err(CatalogWriterError::config(
            "worker.concurrency must be at least 1",
        ));
    }
    if config.worker.queue_capacity == 0 {
        return Err(CatalogWriterError::config(
            "worker.queue_capacity must be at least 1",
        ));
    }

    let mut seen = HashSet::new();
    for entry in config.quality.metrics.iter() {
        if entry.key.trim().is_empty() {
            return Err(CatalogWriterError::config("quality metric key is empty"));
        }
        if entry.measurement.trim().is_empty() {
            return Err(CatalogWriterError::config(format!(
                "quality metric '{}' has no measurement IRI",
                entry.key
            )));
        }
        if !seen.insert(entry.key.as_str()) {
            return Err(CatalogWriterError::config(format!(
                "quality metric '{}' is configured twice",
                entry.key
            )));
        }
        if entry.name.is_none() {
            tracing::warn!(key = %entry.key, "quality metric has no display name and will be skipped");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.catalogwriter/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CatalogWriterError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.catalogwriter/catalogwriter.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CatalogWriterError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        CatalogWriterError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CatalogWriterError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CatalogWriterError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CatalogWriterError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(raw: &str) -> Result<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| CatalogWriterError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}
