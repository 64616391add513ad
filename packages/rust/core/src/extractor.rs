//! Template document → [`TemplateMetadata`] extraction.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tempdocs_shared::{
    DEFAULT_AUTHOR, DEFAULT_TEMPLATE_IDENTIFIER, DEFAULT_TEMPLATE_NAME, DEFAULT_VERSION, Parameter,
    Result, TempDocsError, TemplateMetadata, UNKNOWN_TEMPLATE_TYPE, Variable,
};

use crate::document::{TemplateDocument, bool_or, mapping, string_list, string_or};

/// Build a metadata record from a parsed document.
///
/// Only a missing or non-mapping `template` section is an error. Every other
/// field falls back to a placeholder so partially written templates still
/// produce a listable record. Pure: the same document always yields the same
/// record.
pub fn extract_metadata(document: &TemplateDocument) -> Result<TemplateMetadata> {
    let template = document
        .get("template")
        .and_then(Value::as_object)
        .ok_or_else(|| TempDocsError::validation("template field is not an object or missing"))?;

    let template_type = template
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .unwrap_or_else(|| UNKNOWN_TEMPLATE_TYPE.to_string());

    Ok(TemplateMetadata {
        name: string_or(template, "name", DEFAULT_TEMPLATE_NAME),
        identifier: string_or(template, "identifier", DEFAULT_TEMPLATE_IDENTIFIER),
        template_type,
        description: string_or(template, "description", ""),
        author: string_or(template, "author", DEFAULT_AUTHOR),
        version: version_label(template),
        tags: string_list(template, "tags"),
        variables: extract_variables(template),
        parameters: extract_parameters(template),
        examples: string_list(template, "examples"),
        warnings: Vec::new(),
        raw_document: document.as_value().clone(),
    })
}

/// `versionLabel` as text; numeric labels get one decimal (`2` → `"2.0"`).
fn version_label(template: &Map<String, Value>) -> String {
    match template.get("versionLabel") {
        Some(Value::String(label)) => label.clone(),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(|v| format!("{v:.1}"))
            .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
        _ => DEFAULT_VERSION.to_string(),
    }
}

fn extract_variables(template: &Map<String, Value>) -> BTreeMap<String, Variable> {
    let Some(vars) = mapping(template, "variables") else {
        return BTreeMap::new();
    };

    vars.iter()
        .filter_map(|(name, data)| {
            let fields = data.as_object()?;
            Some((
                name.clone(),
                Variable {
                    description: string_or(fields, "description", ""),
                    var_type: string_or(fields, "type", "string"),
                    required: bool_or(fields, "required", false),
                    scope: string_or(fields, "scope", "template"),
                },
            ))
        })
        .collect()
}

fn extract_parameters(template: &Map<String, Value>) -> BTreeMap<String, Parameter> {
    let Some(params) = mapping(template, "parameters") else {
        return BTreeMap::new();
    };

    params
        .iter()
        .filter_map(|(name, data)| {
            let fields = data.as_object()?;
            Some((
                name.clone(),
                Parameter {
                    description: string_or(fields, "description", ""),
                    param_type: string_or(fields, "type", "string"),
                    required: bool_or(fields, "required", false),
                    default: fields.get("default").filter(|v| !v.is_null()).cloned(),
                    scope: string_or(fields, "scope", "template"),
                },
            ))
        })
        .collect()
}
