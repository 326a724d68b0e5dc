//! CKAN catalog integration.
//!
//! This crate provides:
//! - [`Converter`]: DCAT graph → CKAN dataset [`Envelope`]
//! - [`Dispatcher`]: fire-and-forget `package_create` submission
//! - [`ConversionContext`]: both, bound to one API key and base URL

pub mod context;
pub mod converter;
pub mod dispatch;

pub use context::ConversionContext;
pub use converter::{Converter, Envelope, slugify};
pub use dispatch::{DispatchSnapshot, DispatchStats, Dispatcher, PACKAGE_CREATE_PATH, package_create_url};
