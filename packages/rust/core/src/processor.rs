//! Batch template processing: discover → fan out to workers → fan in.
//!
//! Each worker runs read → parse → validate → extract for one file at a
//! time. One file failing never affects the others; the batch itself only
//! fails when the input path is unusable.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempdocs_shared::{OutputFormat, Result, TempDocsError, TemplateMetadata, TemplateType};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;

use crate::document::{TemplateDocument, is_template_file};
use crate::extractor::extract_metadata;
use crate::validator::{TemplateValidator, ValidationOutcome};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A file that could not be turned into a metadata record.
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: TempDocsError,
}

/// Outcome of a batch run.
#[derive(Debug)]
pub struct BatchResult {
    /// Records for every accepted file, in completion order.
    pub templates: Vec<TemplateMetadata>,
    /// One entry per file that failed.
    pub failures: Vec<FileFailure>,
    /// Wall-clock time for the whole batch.
    pub elapsed: Duration,
}

impl BatchResult {
    fn empty(elapsed: Duration) -> Self {
        Self {
            templates: Vec::new(),
            failures: Vec::new(),
            elapsed,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.templates.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting batch status.
pub trait ProgressReporter: Send + Sync {
    /// Called once discovery has counted the template files.
    fn files_found(&self, total: usize);
    /// Called as each file's outcome arrives.
    fn file_processed(&self, path: &Path, succeeded: bool, current: usize, total: usize);
    /// Called when the batch completes.
    fn done(&self, result: &BatchResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn files_found(&self, _total: usize) {}
    fn file_processed(&self, _path: &Path, _succeeded: bool, _current: usize, _total: usize) {}
    fn done(&self, _result: &BatchResult) {}
}

// ---------------------------------------------------------------------------
// TemplateProcessor
// ---------------------------------------------------------------------------

/// Tuning knobs for a batch.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Upper bound on workers; `None` uses the machine's available parallelism.
    pub workers: Option<usize>,
}

/// Runs validation and extraction over template files.
pub struct TemplateProcessor {
    validator: Arc<TemplateValidator>,
    options: ProcessOptions,
}

impl TemplateProcessor {
    pub fn new(validator: TemplateValidator) -> Self {
        Self {
            validator: Arc::new(validator),
            options: ProcessOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ProcessOptions) -> Self {
        self.options = options;
        self
    }

    /// Read, parse, validate and extract a single template file.
    pub async fn process_template(&self, path: &Path) -> Result<TemplateMetadata> {
        process_file(&self.validator, path).await
    }

    /// Process a template file or every template under a directory.
    pub async fn process_all(
        &self,
        path: &Path,
        output_dir: &Path,
        format: OutputFormat,
        validate_only: bool,
    ) -> Result<BatchResult> {
        self.process_all_with_progress(path, output_dir, format, validate_only, &SilentProgress)
            .await
    }

    /// [`process_all`](Self::process_all) with progress callbacks.
    ///
    /// Unless `validate_only`, the output directory and one subdirectory per
    /// template type are created before any file is dispatched. `format` is
    /// carried for collaborators and does not change processing.
    #[instrument(skip_all, fields(path = %path.display(), %format, validate_only))]
    pub async fn process_all_with_progress(
        &self,
        path: &Path,
        output_dir: &Path,
        format: OutputFormat,
        validate_only: bool,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchResult> {
        let start = Instant::now();
        info!("starting template processing");

        let root = path.to_path_buf();
        let files = tokio::task::spawn_blocking(move || discover_templates(&root))
            .await
            .map_err(|e| TempDocsError::Output(format!("discovery task failed: {e}")))??;

        if !validate_only {
            prepare_output_dirs(output_dir)?;
        }

        progress.files_found(files.len());

        if files.is_empty() {
            warn!("no template files found");
            let result = BatchResult::empty(start.elapsed());
            progress.done(&result);
            return Ok(result);
        }

        let workers = worker_count(self.options.workers, files.len());
        info!(files = files.len(), workers, "found template files");

        let total = files.len();
        let (job_tx, job_rx) = mpsc::channel::<PathBuf>(total);
        let (result_tx, mut result_rx) = mpsc::channel::<(PathBuf, Result<TemplateMetadata>)>(total);
        let job_rx = Arc::new(Mutex::new(job_rx));

        for worker_id in 0..workers {
            let jobs = Arc::clone(&job_rx);
            let results = result_tx.clone();
            let validator = Arc::clone(&self.validator);

            tokio::spawn(async move {
                loop {
                    let next = jobs.lock().await.recv().await;
                    let Some(file) = next else { break };

                    let outcome = process_file(&validator, &file).await;
                    if results.send((file, outcome)).await.is_err() {
                        break;
                    }
                }
                debug!(worker_id, "worker finished");
            });
        }
        // Workers hold the only remaining senders.
        drop(result_tx);

        let mut outstanding: HashSet<PathBuf> = files.iter().cloned().collect();
        for file in files {
            if job_tx.send(file).await.is_err() {
                break;
            }
        }
        drop(job_tx);

        let mut templates = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for current in 1..=total {
            let Some((file, outcome)) = result_rx.recv().await else {
                break;
            };
            outstanding.remove(&file);

            match outcome {
                Ok(metadata) => {
                    progress.file_processed(&file, true, current, total);
                    templates.push(metadata);
                }
                Err(e) => {
                    error!(path = %file.display(), error = %e, "error processing template");
                    progress.file_processed(&file, false, current, total);
                    failures.push(FileFailure {
                        path: file,
                        error: e,
                    });
                }
            }
        }

        // Only reachable if a worker panicked mid-file.
        for file in outstanding {
            error!(path = %file.display(), "worker stopped before reporting this template");
            failures.push(FileFailure {
                path: file,
                error: TempDocsError::Output("worker stopped before reporting a result".into()),
            });
        }

        let result = BatchResult {
            templates,
            failures,
            elapsed: start.elapsed(),
        };

        info!(
            succeeded = result.succeeded(),
            failed = result.failed(),
            elapsed_ms = result.elapsed.as_millis(),
            "template processing complete"
        );
        progress.done(&result);

        Ok(result)
    }
}

/// The per-file unit of work.
#[instrument(skip_all, fields(path = %path.display()))]
async fn process_file(validator: &TemplateValidator, path: &Path) -> Result<TemplateMetadata> {
    debug!("processing template");

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| TempDocsError::io(path, e))?;

    let document = TemplateDocument::from_yaml_str(&content)?;

    let warnings = match validator.validate(&document).await {
        ValidationOutcome::Rejected { reason } => {
            debug!(%reason, "template rejected");
            return Err(TempDocsError::validation(reason));
        }
        ValidationOutcome::Accepted { message, warnings } => {
            debug!(%message, "template accepted");
            warnings
        }
    };

    let mut metadata = extract_metadata(&document)?;
    metadata.warnings = warnings;
    Ok(metadata)
}

// ---------------------------------------------------------------------------
// Discovery & setup
// ---------------------------------------------------------------------------

/// Collect template files from a single file path or a directory tree.
///
/// A single file must carry a template extension. Unreadable entries inside
/// a directory are logged and skipped. The result is sorted.
pub fn discover_templates(path: &Path) -> Result<Vec<PathBuf>> {
    let metadata = std::fs::metadata(path).map_err(|e| TempDocsError::io(path, e))?;

    if !metadata.is_dir() {
        if is_template_file(path) {
            return Ok(vec![path.to_path_buf()]);
        }
        return Err(TempDocsError::validation(format!(
            "specified file is not a YAML template: {}",
            path.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if entry.file_type().is_file() && is_template_file(entry.path()) {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Worker pool size: the cap (or available parallelism) bounded by the
/// file count, never below one.
pub fn worker_count(cap: Option<usize>, file_count: usize) -> usize {
    let available = cap.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1)
    });
    available.min(file_count).max(1)
}

/// Create the output directory and its per-type subdirectories.
fn prepare_output_dirs(output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir).map_err(|e| TempDocsError::io(output_dir, e))?;

    for template_type in TemplateType::ALL {
        let dir = output_dir.join(template_type.as_str());
        std::fs::create_dir_all(&dir).map_err(|e| TempDocsError::io(&dir, e))?;
    }

    debug!(path = %output_dir.display(), "output directories ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempdocs_schema::{SchemaCache, SchemaOptions};
    use url::Url;
    use uuid::Uuid;
    use wiremock::matchers::{method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scratch_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tempdocs-{label}-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("../../../fixtures/templates/{name}"))
            .unwrap_or_else(|_| panic!("missing fixture: {name}"))
    }

    fn numbered_template(i: usize) -> String {
        format!("template:\n  name: Step {i}\n  identifier: step_{i}\n  type: Step\n  versionLabel: {i}\n")
    }

    fn basic_processor(workers: Option<usize>) -> TemplateProcessor {
        TemplateProcessor::new(TemplateValidator::basic()).with_options(ProcessOptions { workers })
    }

    #[derive(Default)]
    struct CountingProgress {
        found: AtomicUsize,
        ok: AtomicUsize,
        failed: AtomicUsize,
        done: AtomicUsize,
    }

    impl ProgressReporter for CountingProgress {
        fn files_found(&self, total: usize) {
            self.found.store(total, Ordering::SeqCst);
        }
        fn file_processed(&self, _path: &Path, succeeded: bool, _current: usize, _total: usize) {
            if succeeded {
                self.ok.fetch_add(1, Ordering::SeqCst);
            } else {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn done(&self, _result: &BatchResult) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(Some(4), 10), 4);
        assert_eq!(worker_count(Some(8), 3), 3);
        assert_eq!(worker_count(Some(0), 3), 1);
        assert_eq!(worker_count(Some(4), 0), 1);
        let auto = worker_count(None, 1000);
        assert!(auto >= 1);
    }

    #[test]
    fn test_discover_directory_recursively() {
        let dir = scratch_dir("discover");
        write(&dir, "a.yaml", "x: 1");
        write(&dir, "nested/deeper/b.yml", "x: 1");
        write(&dir, "notes.txt", "x: 1");
        write(&dir, "nested/readme.md", "# hi");

        let files = discover_templates(&dir).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| is_template_file(f)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_discover_missing_path_fails() {
        let missing = std::env::temp_dir().join(format!("tempdocs-missing-{}", Uuid::now_v7()));
        let err = discover_templates(&missing).unwrap_err();
        assert!(matches!(err, TempDocsError::Io { .. }));
    }

    #[tokio::test]
    async fn test_end_to_end_mixed_directory() {
        let dir = scratch_dir("e2e");
        let templates = dir.join("templates");
        let output = dir.join("out");

        write(&templates, "build.yaml", &fixture("build-pipeline.yaml"));
        write(&templates, "release/release.yaml", &fixture("release-pipeline.yaml"));
        write(&templates, "stages/deploy.yml", &fixture("deploy-stage.yaml"));
        write(&templates, "broken/untyped.yaml", &fixture("missing-type.yaml"));

        let progress = CountingProgress::default();
        let result = basic_processor(Some(2))
            .process_all_with_progress(&templates, &output, OutputFormat::Json, false, &progress)
            .await
            .unwrap();

        assert_eq!(result.succeeded(), 3);
        assert_eq!(result.failed(), 1);
        assert!(result.failures[0].path.ends_with("broken/untyped.yaml"));
        assert!(
            result.failures[0]
                .error
                .to_string()
                .contains("Missing required field: type")
        );

        let mut types: Vec<&str> = result
            .templates
            .iter()
            .map(|t| t.template_type.as_str())
            .collect();
        types.sort();
        assert_eq!(types, vec!["pipeline", "pipeline", "stage"]);

        for template_type in TemplateType::ALL {
            assert!(output.join(template_type.as_str()).is_dir());
        }

        assert_eq!(progress.found.load(Ordering::SeqCst), 4);
        assert_eq!(progress.ok.load(Ordering::SeqCst), 3);
        assert_eq!(progress.failed.load(Ordering::SeqCst), 1);
        assert_eq!(progress.done.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_single_file_with_wrong_extension_fails() {
        let dir = scratch_dir("txt");
        let file = write(&dir, "template.txt", &fixture("build-pipeline.yaml"));
        let output = dir.join("out");

        let err = basic_processor(None)
            .process_all(&file, &output, OutputFormat::Json, false)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("not a YAML template"));
        assert!(!output.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_single_file_input() {
        let dir = scratch_dir("single");
        let file = write(&dir, "deploy.yaml", &fixture("deploy-stage.yaml"));

        let result = basic_processor(None)
            .process_all(&file, &dir.join("out"), OutputFormat::Html, true)
            .await
            .unwrap();

        assert_eq!(result.succeeded(), 1);
        assert_eq!(result.templates[0].identifier, "deploy_service");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_missing_input_path_fails() {
        let missing = std::env::temp_dir().join(format!("tempdocs-nothing-{}", Uuid::now_v7()));
        let result = basic_processor(None)
            .process_all(&missing, &missing.join("out"), OutputFormat::Json, true)
            .await;
        assert!(matches!(result, Err(TempDocsError::Io { .. })));
    }

    #[tokio::test]
    async fn test_empty_directory_is_empty_success() {
        let dir = scratch_dir("empty");
        write(&dir, "README.md", "nothing here");

        let result = basic_processor(None)
            .process_all(&dir, &dir.join("out"), OutputFormat::Json, false)
            .await
            .unwrap();

        assert_eq!(result.succeeded(), 0);
        assert_eq!(result.failed(), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_validate_only_creates_no_output() {
        let dir = scratch_dir("validate-only");
        let templates = dir.join("templates");
        let output = dir.join("out");
        write(&templates, "build.yaml", &fixture("build-pipeline.yaml"));
        write(&templates, "steps/lint.yaml", &fixture("lint-step.yaml"));

        let result = basic_processor(None)
            .process_all(&templates, &output, OutputFormat::Json, true)
            .await
            .unwrap();

        assert_eq!(result.succeeded(), 2);
        let step = result
            .templates
            .iter()
            .find(|t| t.identifier == "lint")
            .unwrap();
        assert_eq!(step.kind(), Some(TemplateType::Step));
        assert_eq!(step.version, "1.0");
        assert!(!output.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_parse_failures_do_not_abort_batch() {
        let dir = scratch_dir("parse");
        write(&dir, "good.yaml", &fixture("build-pipeline.yaml"));
        write(&dir, "bad.yaml", "template:\n  name: [unclosed\n");
        write(&dir, "list.yaml", "- just\n- a list\n");

        let result = basic_processor(Some(2))
            .process_all(&dir, &dir.join("out"), OutputFormat::Json, true)
            .await
            .unwrap();

        assert_eq!(result.succeeded(), 1);
        assert_eq!(result.failed(), 2);
        assert!(
            result
                .failures
                .iter()
                .all(|f| matches!(f.error, TempDocsError::Parse { .. }))
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_dropped_or_duplicate_records() {
        const FILES: usize = 40;

        let dir = scratch_dir("many");
        for i in 0..FILES {
            write(&dir, &format!("group-{}/step-{i}.yaml", i % 5), &numbered_template(i));
        }

        let processor = basic_processor(Some(3));
        for _ in 0..5 {
            let result = processor
                .process_all(&dir, &dir.join("out"), OutputFormat::Json, true)
                .await
                .unwrap();

            assert_eq!(result.succeeded(), FILES);
            assert_eq!(result.failed(), 0);

            let identifiers: HashSet<&str> = result
                .templates
                .iter()
                .map(|t| t.identifier.as_str())
                .collect();
            assert_eq!(identifiers.len(), FILES);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_schema_cache_under_concurrency() {
        const FILES: usize = 24;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(url_path("/v1/template.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "type": "object",
                "required": ["template"],
                "properties": {
                    "template": {
                        "properties": { "versionLabel": { "type": "string" } }
                    }
                }
            })))
            .mount(&server)
            .await;

        let opts = SchemaOptions {
            base_url: Url::parse(&format!("{}/v1/", server.uri())).unwrap(),
            timeout_secs: 5,
        };
        let cache = Arc::new(SchemaCache::new(&opts).unwrap());

        let dir = scratch_dir("schema");
        for i in 0..FILES {
            write(&dir, &format!("step-{i}.yaml"), &numbered_template(i));
        }

        let processor = TemplateProcessor::new(TemplateValidator::with_schemas(Arc::clone(&cache)))
            .with_options(ProcessOptions { workers: Some(12) });

        let result = processor
            .process_all(&dir, &dir.join("out"), OutputFormat::Json, true)
            .await
            .unwrap();

        // Numeric versionLabel violates the schema: warned, never rejected.
        assert_eq!(result.succeeded(), FILES);
        assert!(result.templates.iter().all(|t| t.warnings.len() == 1));
        assert_eq!(cache.cached_types().await, vec!["step".to_string()]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    /// Counts ERROR-level events seen on the current thread.
    struct ErrorCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for ErrorCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::ERROR {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_one_error_line_per_failed_file() {
        use tracing_subscriber::layer::SubscriberExt;

        let dir = scratch_dir("error-lines");
        write(&dir, "good.yaml", &fixture("build-pipeline.yaml"));
        write(&dir, "untyped.yaml", &fixture("missing-type.yaml"));
        write(&dir, "broken.yaml", "template:\n  name: [unclosed\n");

        let errors = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(ErrorCounter(Arc::clone(&errors)));
        let _guard = tracing::subscriber::set_default(subscriber);

        let result = basic_processor(Some(1))
            .process_all(&dir, &dir.join("out"), OutputFormat::Json, true)
            .await
            .unwrap();

        assert_eq!(result.failed(), 2);
        assert_eq!(errors.load(Ordering::SeqCst), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_process_template_unreadable_file() {
        let missing = std::env::temp_dir().join(format!("tempdocs-gone-{}.yaml", Uuid::now_v7()));
        let err = basic_processor(None)
            .process_template(&missing)
            .await
            .unwrap_err();
        assert!(matches!(err, TempDocsError::Io { .. }));
    }
}
