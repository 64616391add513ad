//! Remote JSON Schema lookup for template validation.
//!
//! Template types map onto schema files published by the upstream schema
//! repository. [`SchemaCache`] fetches each file at most once per process
//! (modulo concurrent first-time races) and serves later lookups from memory.
//! [`SchemaEvaluator`] runs a fetched schema against a template document.

mod evaluate;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tempdocs_shared::{Result, SchemaConfig, TempDocsError};
use tokio::sync::RwLock;
use tracing::{debug, error, instrument};
use url::Url;

pub use evaluate::{CompiledSchema, JsonSchemaEvaluator, SchemaEvaluator};

/// Maximum number of redirects to follow when fetching a schema.
const MAX_REDIRECTS: usize = 3;

/// User-Agent string for schema requests.
const USER_AGENT: &str = concat!("tempdocs/", env!("CARGO_PKG_VERSION"));

/// Schema file used for any type without its own entry.
const FALLBACK_SCHEMA_FILE: &str = "pipeline.json";

// ---------------------------------------------------------------------------
// Type names
// ---------------------------------------------------------------------------

/// Map a template type name onto its canonical lowercase cache key.
///
/// Case, surrounding whitespace and word separators are ignored for the
/// known kinds, so `"Step Group"`, `"STEPGROUP"` and `"step_group"` all
/// become `"stepgroup"`. Anything else is only lowercased.
pub fn normalize_schema_type(schema_type: &str) -> String {
    let lowered = schema_type.trim().to_lowercase();
    let compact: String = lowered
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .collect();

    match compact.as_str() {
        "pipeline" | "stage" | "stepgroup" | "step" | "trigger" => compact,
        _ => lowered,
    }
}

/// Schema file name published for a normalized type.
///
/// Stages, step groups and steps share `template.json`. Unknown types fall
/// back to the pipeline schema instead of failing.
pub fn schema_file_for(normalized_type: &str) -> &'static str {
    match normalized_type {
        "pipeline" => "pipeline.json",
        "stage" | "step" | "stepgroup" => "template.json",
        "trigger" => "trigger.json",
        _ => FALLBACK_SCHEMA_FILE,
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Where schemas come from and how long a fetch may take.
#[derive(Debug, Clone)]
pub struct SchemaOptions {
    /// Base URL the schema file names are joined onto.
    pub base_url: Url,
    /// Timeout for each HTTP request, in seconds.
    pub timeout_secs: u64,
}

impl SchemaOptions {
    /// Build options from the `[schema]` config section.
    pub fn from_config(config: &SchemaConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            TempDocsError::config(format!("invalid schema base_url '{}': {e}", config.base_url))
        })?;

        Ok(Self {
            base_url,
            timeout_secs: config.timeout_secs,
        })
    }
}

// ---------------------------------------------------------------------------
// SchemaCache
// ---------------------------------------------------------------------------

/// Process-lifetime cache of fetched schemas, keyed by normalized type.
///
/// Lookups take a shared lock; a miss fetches without holding any lock and
/// then takes the exclusive lock only to store the result. Concurrent misses
/// for the same key each fetch and the last writer wins.
pub struct SchemaCache {
    client: Client,
    base_url: Url,
    schemas: RwLock<HashMap<String, Arc<Value>>>,
}

impl SchemaCache {
    /// Create an empty cache backed by the given schema source.
    pub fn new(opts: &SchemaOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| TempDocsError::network(format!("failed to build HTTP client: {e}")))?;

        // `Url::join` drops the last path segment unless the base ends in '/'.
        let mut base_url = opts.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            schemas: RwLock::new(HashMap::new()),
        })
    }

    /// Resolve a template type to its schema document.
    ///
    /// Cache hits do no I/O. A miss fetches `<base_url>/<schema file>`,
    /// parses it as JSON and stores it under the normalized type.
    #[instrument(skip(self))]
    pub async fn get_schema(&self, schema_type: &str) -> Result<Arc<Value>> {
        let key = normalize_schema_type(schema_type);

        {
            let schemas = self.schemas.read().await;
            if let Some(schema) = schemas.get(&key) {
                debug!(%key, "schema cache hit");
                return Ok(Arc::clone(schema));
            }
        }

        let schema = Arc::new(self.fetch(&key).await?);
        self.schemas
            .write()
            .await
            .insert(key.clone(), Arc::clone(&schema));

        debug!(%key, "schema cached");
        Ok(schema)
    }

    /// Normalized types currently held in the cache, sorted.
    pub async fn cached_types(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.schemas.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Full URL of the schema file for a normalized type.
    pub fn schema_url(&self, normalized_type: &str) -> Result<Url> {
        let file = schema_file_for(normalized_type);
        self.base_url.join(file).map_err(|e| {
            TempDocsError::config(format!("cannot join '{file}' onto {}: {e}", self.base_url))
        })
    }

    async fn fetch(&self, key: &str) -> Result<Value> {
        let url = self.schema_url(key)?;
        debug!(%key, %url, "fetching schema");

        let response = self.client.get(url.as_str()).send().await.map_err(|e| {
            error!(%url, error = %e, "schema request failed");
            TempDocsError::network(format!("{url}: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(%url, %status, "schema request returned an error status");
            return Err(TempDocsError::network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TempDocsError::network(format!("{url}: failed to read body: {e}")))?;

        let schema: Value = serde_json::from_str(&body)
            .map_err(|e| TempDocsError::parse(format!("{url}: schema is not valid JSON: {e}")))?;

        if !schema.is_object() {
            return Err(TempDocsError::parse(format!(
                "{url}: schema document is not a JSON object"
            )));
        }

        Ok(schema)
    }
}
