//! Message processing for catalogwriter.
//!
//! This crate ties the graph parser, quality extraction, and catalog client
//! into the per-message [`CatalogWriter`] and the queue [`Consumer`] that
//! drives it.

pub mod consumer;
pub mod lazy;
pub mod quality;
pub mod writer;

pub use consumer::{Consumer, ConsumerProgress, ConsumerReport, SilentProgress, queue};
pub use lazy::LazyResource;
pub use quality::{ExtractedMetric, ExtractionSkip, extract_metric, extract_metrics, merge_extras};
pub use writer::{CatalogWriter, CredentialStore, Message, Outcome, WriterConfig, build_payload};
