//! Template ingestion for tempdocs.
//!
//! Ties together document parsing, structural and schema validation,
//! metadata extraction, and the concurrent batch processor.

pub mod document;
pub mod extractor;
pub mod output;
pub mod processor;
pub mod validator;

pub use document::{TEMPLATE_EXTENSIONS, TemplateDocument, is_template_file};
pub use extractor::extract_metadata;
pub use output::{METADATA_FILE, write_output};
pub use processor::{
    BatchResult, FileFailure, ProcessOptions, ProgressReporter, SilentProgress, TemplateProcessor,
    discover_templates,
};
pub use validator::{TemplateValidator, ValidationOutcome};
