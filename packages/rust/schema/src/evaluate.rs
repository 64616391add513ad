//! Schema evaluation seam.

use std::sync::Arc;

use jsonschema::JSONSchema;
use serde_json::Value;
use tempdocs_shared::{Result, TempDocsError};

/// Evaluates data documents against a JSON Schema.
///
/// Compilation is split from checking so a schema shared by many documents
/// is compiled once. `Err` from [`compile`](Self::compile) means evaluation
/// cannot run at all, which is a different outcome from a document failing
/// the schema.
pub trait SchemaEvaluator: Send + Sync {
    fn compile(&self, schema: &Value) -> Result<Arc<dyn CompiledSchema>>;

    /// Compile and check in one step. An empty list means the document
    /// conforms.
    fn evaluate(&self, schema: &Value, document: &Value) -> Result<Vec<String>> {
        Ok(self.compile(schema)?.violations(document))
    }
}

/// A schema ready to check documents against.
pub trait CompiledSchema: Send + Sync {
    /// Human-readable violations; empty when the document conforms.
    fn violations(&self, document: &Value) -> Vec<String>;
}

/// [`SchemaEvaluator`] backed by the `jsonschema` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSchemaEvaluator;

impl SchemaEvaluator for JsonSchemaEvaluator {
    fn compile(&self, schema: &Value) -> Result<Arc<dyn CompiledSchema>> {
        let compiled = JSONSchema::options()
            .compile(schema)
            .map_err(|e| TempDocsError::schema(format!("schema compile failed: {e}")))?;
        Ok(Arc::new(CompiledJsonSchema(compiled)))
    }
}

struct CompiledJsonSchema(JSONSchema);

impl CompiledSchema for CompiledJsonSchema {
    fn violations(&self, document: &Value) -> Vec<String> {
        match self.0.validate(document) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|error| {
                    let location = error.instance_path.to_string();
                    if location.is_empty() || location == "/" {
                        format!("(root): {error}")
                    } else {
                        format!("{location}: {error}")
                    }
                })
                .collect(),
        }
    }
}
