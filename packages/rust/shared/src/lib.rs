//! Shared types, error model, and configuration for catalogwriter.
//!
//! This crate is the foundation depended on by all other catalogwriter crates.
//! It provides:
//! - [`CatalogWriterError`]: the unified error type
//! - Domain types ([`CatalogAccount`], [`AccountId`], [`MetricMapping`])
//! - Configuration ([`AppConfig`], config loading and validation)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CatalogConfig, QualityConfig, StorageConfig, WorkerConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use error::{CatalogWriterError, Result};
pub use types::{AccountId, CatalogAccount, MetricEntry, MetricMapping};
