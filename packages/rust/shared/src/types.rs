//! Core domain types for extracted template metadata.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TempDocsError;

/// Display name used when a template has no `name`.
pub const DEFAULT_TEMPLATE_NAME: &str = "Unnamed Template";

/// Identifier used when a template has no `identifier`.
pub const DEFAULT_TEMPLATE_IDENTIFIER: &str = "unnamed_template";

/// Type used when a template has no string `type`.
pub const UNKNOWN_TEMPLATE_TYPE: &str = "unknown";

/// Author recorded when a template does not name one.
pub const DEFAULT_AUTHOR: &str = "Harness";

/// Version recorded when a template has no usable `versionLabel`.
pub const DEFAULT_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// TemplateType
// ---------------------------------------------------------------------------

/// The closed set of template kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    Pipeline,
    Stage,
    StepGroup,
    Step,
}

impl TemplateType {
    /// Every known type, in display order.
    pub const ALL: [TemplateType; 4] = [
        TemplateType::Pipeline,
        TemplateType::Stage,
        TemplateType::StepGroup,
        TemplateType::Step,
    ];

    /// Canonical lowercase name, also used as the output subdirectory name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::Stage => "stage",
            Self::StepGroup => "stepgroup",
            Self::Step => "step",
        }
    }

    /// Case-insensitive exact match against the canonical names.
    ///
    /// `"PIPELINE"` matches, `"Step Group"` does not.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// Documentation output format requested by the caller.
///
/// The ingestion core only looks at this to decide whether output
/// directories are needed; rendering is the collaborators' business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Html,
    Markdown,
    #[default]
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Markdown => "markdown",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = TempDocsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(Self::Html),
            "markdown" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => Err(TempDocsError::config(format!(
                "invalid output format: {s}. Must be one of [html markdown json]"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateMetadata
// ---------------------------------------------------------------------------

/// A template variable as declared under `template.variables`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub description: String,
    /// Declared value type; `"string"` when absent.
    #[serde(rename = "type")]
    pub var_type: String,
    pub required: bool,
    /// `"template"` when absent.
    pub scope: String,
}

/// A template parameter as declared under `template.parameters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub description: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub required: bool,
    /// Default value, passed through exactly as written in the template.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    pub scope: String,
}

/// Normalized metadata extracted from one validated template file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    /// Display name.
    pub name: String,
    /// Stable slug.
    pub identifier: String,
    /// Lowercased template type.
    #[serde(rename = "type")]
    pub template_type: String,
    pub description: String,
    pub author: String,
    /// Taken from `versionLabel`; numeric labels are rendered with one decimal.
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, Variable>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Parameter>,
    /// Usage examples, in source order.
    #[serde(default)]
    pub examples: Vec<String>,
    /// Non-fatal schema diagnostics recorded during validation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Verbatim copy of the parsed template document.
    pub raw_document: serde_json::Value,
}

impl TemplateMetadata {
    /// The parsed template type, if it is one of the known kinds.
    pub fn kind(&self) -> Option<TemplateType> {
        TemplateType::parse(&self.template_type)
    }
}
