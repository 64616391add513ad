//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tempdocs_core::{
    BatchResult, ProcessOptions, ProgressReporter, TemplateProcessor, TemplateValidator,
    write_output,
};
use tempdocs_schema::{SchemaCache, SchemaOptions};
use tempdocs_shared::{AppConfig, OutputFormat, init_config, load_config};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// tempdocs: validate pipeline templates and extract their documentation metadata.
#[derive(Parser)]
#[command(
    name = "tempdocs",
    version,
    about = "Validate pipeline templates and extract documentation metadata.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process templates and write metadata for the documentation renderer.
    #[command(visible_alias = "gen")]
    Generate {
        /// Template file or directory (defaults to config `source_dir`).
        #[arg(short, long, env = "SOURCE_DIR")]
        source: Option<PathBuf>,

        /// Output directory (defaults to config `output_dir`).
        #[arg(short, long, env = "OUTPUT_DIR")]
        output: Option<PathBuf>,

        /// Output format: html, markdown, or json.
        #[arg(short, long, env = "FORMAT")]
        format: Option<String>,

        /// Maximum number of concurrent workers.
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Skip fetching upstream schemas; structural checks only.
        #[arg(long)]
        no_schema: bool,

        /// Only validate; write nothing.
        #[arg(long, env = "VALIDATE_ONLY")]
        validate_only: bool,
    },

    /// Validate templates without writing output.
    #[command(visible_aliases = ["val", "check"])]
    Validate {
        /// Template file or directory (defaults to config `source_dir`).
        #[arg(short, long, env = "SOURCE_DIR")]
        source: Option<PathBuf>,

        /// Maximum number of concurrent workers.
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// Skip fetching upstream schemas; structural checks only.
        #[arg(long)]
        no_schema: bool,

        /// Exit with an error if any template fails.
        #[arg(long)]
        strict: bool,
    },

    /// Print version and build information.
    Version,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(cli.verbose)));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

/// Crates whose events the default filter lets through.
const LOG_TARGETS: [&str; 4] = ["tempdocs", "tempdocs_core", "tempdocs_schema", "tempdocs_shared"];

/// Filter directives for a `-v` count, one per workspace crate.
fn default_filter(verbose: u8) -> String {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate {
            source,
            output,
            format,
            concurrency,
            no_schema,
            validate_only,
        } => {
            let config = load_config()?;
            let run = RunSettings::resolve(&config, source, concurrency, no_schema);
            let output = output.unwrap_or_else(|| PathBuf::from(&config.defaults.output_dir));
            let format = match format {
                Some(f) => f.parse::<OutputFormat>()?,
                None => config.output_format()?,
            };
            cmd_generate(&config, &run, &output, format, validate_only).await
        }
        Command::Validate {
            source,
            concurrency,
            no_schema,
            strict,
        } => {
            let config = load_config()?;
            let run = RunSettings::resolve(&config, source, concurrency, no_schema);
            cmd_validate(&config, &run, strict).await
        }
        Command::Version => cmd_version(),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Settings shared by `generate` and `validate`, with flags layered over config.
struct RunSettings {
    source: PathBuf,
    workers: Option<usize>,
    use_schemas: bool,
}

impl RunSettings {
    fn resolve(
        config: &AppConfig,
        source: Option<PathBuf>,
        concurrency: Option<usize>,
        no_schema: bool,
    ) -> Self {
        Self {
            source: source.unwrap_or_else(|| PathBuf::from(&config.defaults.source_dir)),
            workers: concurrency.filter(|n| *n > 0).or_else(|| config.worker_cap()),
            use_schemas: config.schema.enabled && !no_schema,
        }
    }
}

fn build_processor(config: &AppConfig, run: &RunSettings) -> Result<TemplateProcessor> {
    let validator = if run.use_schemas {
        let opts = SchemaOptions::from_config(&config.schema)?;
        TemplateValidator::with_schemas(Arc::new(SchemaCache::new(&opts)?))
    } else {
        info!("schema validation disabled; running structural checks only");
        TemplateValidator::basic()
    };

    Ok(TemplateProcessor::new(validator).with_options(ProcessOptions {
        workers: run.workers,
    }))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(
    config: &AppConfig,
    run: &RunSettings,
    output: &Path,
    format: OutputFormat,
    validate_only: bool,
) -> Result<()> {
    config.validate()?;
    let processor = build_processor(config, run)?;

    info!(
        source = %run.source.display(),
        output = %output.display(),
        %format,
        validate_only,
        "generating template documentation"
    );

    let reporter = CliProgress::new();
    let result = processor
        .process_all_with_progress(&run.source, output, format, validate_only, &reporter)
        .await?;

    if !validate_only {
        let written = write_output(output, &result.templates, format)?;
        info!(files = written.len(), "metadata written");
    }

    print_summary(&result);
    if !validate_only {
        println!("  Output:    {}", output.display());
    }
    println!();

    Ok(())
}

async fn cmd_validate(config: &AppConfig, run: &RunSettings, strict: bool) -> Result<()> {
    config.validate()?;
    let processor = build_processor(config, run)?;

    info!(source = %run.source.display(), strict, "validating templates");

    let reporter = CliProgress::new();
    let result = processor
        .process_all_with_progress(
            &run.source,
            Path::new(&config.defaults.output_dir),
            OutputFormat::Json,
            true,
            &reporter,
        )
        .await?;

    print_summary(&result);
    println!();

    if strict && result.failed() > 0 {
        return Err(eyre!(
            "{} of {} templates failed validation",
            result.failed(),
            result.succeeded() + result.failed()
        ));
    }

    Ok(())
}

fn print_summary(result: &BatchResult) {
    let warned = result
        .templates
        .iter()
        .filter(|t| !t.warnings.is_empty())
        .count();

    println!();
    println!("  Processed: {}", result.succeeded() + result.failed());
    println!("  Succeeded: {}", result.succeeded());
    println!("  Warnings:  {warned}");
    println!("  Failed:    {}", result.failed());
    for failure in &result.failures {
        println!("    - {}: {}", failure.path.display(), failure.error);
    }
    println!("  Time:      {:.1}s", result.elapsed.as_secs_f64());
}

fn cmd_version() -> Result<()> {
    println!("tempdocs {}", env!("CARGO_PKG_VERSION"));
    if let Some(commit) = option_env!("TEMPDOCS_GIT_COMMIT") {
        println!("  commit: {commit}");
    }
    if let Some(date) = option_env!("TEMPDOCS_BUILD_DATE") {
        println!("  built:  {date}");
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    if let Err(e) = config.validate() {
        warn!(error = %e, "configuration has problems");
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner.set_message("Discovering templates");
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn files_found(&self, total: usize) {
        self.spinner
            .set_message(format!("Found {total} template files"));
    }

    fn file_processed(&self, path: &Path, succeeded: bool, current: usize, total: usize) {
        let status = if succeeded { "ok" } else { "failed" };
        self.spinner.set_message(format!(
            "Processing [{current}/{total}] {} ({status})",
            path.display()
        ));
    }

    fn done(&self, _result: &BatchResult) {
        self.spinner.finish_and_clear();
    }
}
