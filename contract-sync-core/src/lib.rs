//! contract-sync core library — domain types, configuration, state layout, errors.
//!
//! - [`types`] — newtypes and persisted domain structs
//! - [`config`] — YAML configuration lookup, load and validation
//! - [`paths`] — state directory layout
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use config::{ConfigFile, Overrides, SyncConfig};
pub use error::ConfigError;
pub use types::{ArtifactRef, ContractRecord, DocumentFormat, Fingerprint, SourceLocation};
