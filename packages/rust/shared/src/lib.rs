//! Shared types, error model, and configuration for tempdocs.
//!
//! This crate is the foundation depended on by all other tempdocs crates.
//! It provides:
//! - [`TempDocsError`]: the unified error type
//! - Domain types ([`TemplateMetadata`], [`Variable`], [`Parameter`], [`TemplateType`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_SCHEMA_BASE_URL, DEFAULT_SCHEMA_TIMEOUT_SECS, DefaultsConfig, SchemaConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, TempDocsError};
pub use types::{
    DEFAULT_AUTHOR, DEFAULT_TEMPLATE_IDENTIFIER, DEFAULT_TEMPLATE_NAME, DEFAULT_VERSION,
    OutputFormat, Parameter, TemplateMetadata, TemplateType, UNKNOWN_TEMPLATE_TYPE, Variable,
};
