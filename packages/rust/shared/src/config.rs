//! Application configuration for tempdocs.
//!
//! User config lives at `~/.tempdocs/tempdocs.toml`.
//! CLI flags override environment variables, which override config file
//! values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, TempDocsError};
use crate::types::OutputFormat;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tempdocs.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tempdocs";

/// Where the upstream template schemas are published.
pub const DEFAULT_SCHEMA_BASE_URL: &str =
    "https://raw.githubusercontent.com/harness/harness-schema/main/v1/";

/// Per-request timeout for schema fetches.
pub const DEFAULT_SCHEMA_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Config structs (matching tempdocs.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Remote schema source.
    #[serde(default)]
    pub schema: SchemaConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory (or single file) holding the templates.
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// Where generated documentation goes.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Output format: html, markdown or json.
    #[serde(default = "default_format")]
    pub format: String,

    /// Worker cap; 0 means "use available parallelism".
    #[serde(default)]
    pub concurrency: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            output_dir: default_output_dir(),
            format: default_format(),
            concurrency: 0,
        }
    }
}

fn default_source_dir() -> String {
    "templates".into()
}
fn default_output_dir() -> String {
    "docs/output".into()
}
fn default_format() -> String {
    OutputFormat::default().as_str().into()
}

/// `[schema]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Whether schema-backed validation runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL the per-type schema file names are joined onto.
    #[serde(default = "default_schema_base_url")]
    pub base_url: String,

    /// Timeout for each schema fetch.
    #[serde(default = "default_schema_timeout")]
    pub timeout_secs: u64,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_schema_base_url(),
            timeout_secs: default_schema_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_schema_base_url() -> String {
    DEFAULT_SCHEMA_BASE_URL.into()
}
fn default_schema_timeout() -> u64 {
    DEFAULT_SCHEMA_TIMEOUT_SECS
}

impl AppConfig {
    /// The configured output format, parsed.
    pub fn output_format(&self) -> Result<OutputFormat> {
        self.defaults.format.parse()
    }

    /// Worker cap, `None` when the config leaves it to the machine.
    pub fn worker_cap(&self) -> Option<usize> {
        match self.defaults.concurrency {
            0 => None,
            n => Some(n),
        }
    }

    /// Check that the resolved configuration is usable.
    pub fn validate(&self) -> Result<()> {
        self.output_format()?;

        if self.schema.enabled {
            Url::parse(&self.schema.base_url).map_err(|e| {
                TempDocsError::config(format!(
                    "invalid schema base_url '{}': {e}",
                    self.schema.base_url
                ))
            })?;

            if self.schema.timeout_secs == 0 {
                return Err(TempDocsError::config(
                    "schema timeout_secs must be at least 1",
                ));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tempdocs/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TempDocsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tempdocs/tempdocs.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| TempDocsError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| TempDocsError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TempDocsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TempDocsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TempDocsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
