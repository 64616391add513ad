//! Metadata output for the external renderer.
//!
//! Layout under the output directory:
//! ```text
//! <output_dir>/
//! ├── metadata.json          # every record, sorted by type then identifier
//! └── <type>/<identifier>.json
//! ```

use std::path::{Path, PathBuf};

use tempdocs_shared::{OutputFormat, Result, TempDocsError, TemplateMetadata};
use tracing::{debug, info, instrument};

/// File name of the combined record set.
pub const METADATA_FILE: &str = "metadata.json";

/// Write the batch's records for `format`.
///
/// `metadata.json` is always written. Per-record files are only written for
/// [`OutputFormat::Json`]; the other formats are rendered downstream from
/// `metadata.json`. Returns the paths written.
#[instrument(skip_all, fields(output = %output_dir.display(), %format, records = records.len()))]
pub fn write_output(
    output_dir: &Path,
    records: &[TemplateMetadata],
    format: OutputFormat,
) -> Result<Vec<PathBuf>> {
    let sorted = sorted_records(records);

    std::fs::create_dir_all(output_dir).map_err(|e| TempDocsError::io(output_dir, e))?;

    let mut written = Vec::with_capacity(sorted.len() + 1);
    let combined = output_dir.join(METADATA_FILE);
    write_json(&combined, &sorted)?;
    written.push(combined);

    if format == OutputFormat::Json {
        for record in &sorted {
            written.push(write_record(output_dir, record)?);
        }
    } else {
        info!("{format} rendering is handled by the renderer; wrote {METADATA_FILE} only");
    }

    Ok(written)
}

/// Records ordered by type, then identifier.
pub fn sorted_records(records: &[TemplateMetadata]) -> Vec<&TemplateMetadata> {
    let mut sorted: Vec<&TemplateMetadata> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.template_type
            .cmp(&b.template_type)
            .then_with(|| a.identifier.cmp(&b.identifier))
    });
    sorted
}

fn write_record(output_dir: &Path, record: &TemplateMetadata) -> Result<PathBuf> {
    let dir = output_dir.join(file_stem(&record.template_type));
    std::fs::create_dir_all(&dir).map_err(|e| TempDocsError::io(&dir, e))?;

    let path = dir.join(format!("{}.json", file_stem(&record.identifier)));
    write_json(&path, record)?;
    Ok(path)
}

/// Path-safe form of a free-text field.
fn file_stem(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| TempDocsError::Output(format!("JSON serialization failed: {e}")))?;
    std::fs::write(path, json).map_err(|e| TempDocsError::io(path, e))?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}
