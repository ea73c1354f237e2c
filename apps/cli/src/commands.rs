//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use litscreen_classifier::{GeminiClient, GeminiSettings};
use litscreen_core::{
    AnalysisOptions, ScreeningOptions, StageProgress, run_analysis, run_formatting, run_screening,
};
use litscreen_shared::{AppConfig, init_config, load_config, resolve_api_key};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// litscreen: resumable literature-review screening.
#[derive(Parser)]
#[command(
    name = "litscreen",
    version,
    about = "Screen, format, and classify literature-review records with resumable checkpoints.",
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
    /// Screen search results for relevance in batches.
    Screen {
        /// Search-stage CSV.
        #[arg(long)]
        in_csv: PathBuf,

        /// Output CSV with the included rows only.
        #[arg(long)]
        out_csv: PathBuf,

        /// Report CSV.
        #[arg(long)]
        report: PathBuf,

        /// Checkpoint CSV (defaults to `<out stem>.state.csv` next to the output).
        #[arg(long)]
        state: Option<PathBuf>,

        /// Items per classification call.
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Turn download results into a review sheet.
    Format {
        /// Download-stage CSV.
        #[arg(long)]
        in_csv: PathBuf,

        /// Formatted sheet.
        #[arg(long)]
        out_csv: PathBuf,

        /// Report CSV.
        #[arg(long)]
        report: PathBuf,
    },

    /// Classify downloaded documents with a bounded worker pool.
    Analyze {
        /// Formatted sheet.
        #[arg(long)]
        in_csv: PathBuf,

        /// Output sheet; rerunning resumes from it.
        #[arg(long)]
        out_csv: PathBuf,

        /// Report CSV.
        #[arg(long)]
        report: PathBuf,

        /// Directory holding the downloaded PDFs.
        #[arg(long)]
        pdf_dir: PathBuf,

        /// Maximum concurrent document classifications.
        #[arg(long)]
        workers: Option<usize>,

        /// Treat rows previously recorded as `Error` as pending.
        #[arg(long)]
        retry_errors: bool,
    },

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

    let filter = match cli.verbose {
        0 => "litscreen=info",
        1 => "litscreen=debug",
        _ => "litscreen=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Screen {
            in_csv,
            out_csv,
            report,
            state,
            batch_size,
        } => cmd_screen(in_csv, out_csv, report, state, batch_size).await,
        Command::Format {
            in_csv,
            out_csv,
            report,
        } => cmd_format(&in_csv, &out_csv, &report),
        Command::Analyze {
            in_csv,
            out_csv,
            report,
            pdf_dir,
            workers,
            retry_errors,
        } => cmd_analyze(in_csv, out_csv, report, pdf_dir, workers, retry_errors).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Build the service client. Fails before any work if the key is missing.
fn build_client(config: &AppConfig) -> Result<GeminiClient> {
    let api_key = resolve_api_key(config)?;
    let base_url = config.service.base_url()?;

    let client = GeminiClient::new(GeminiSettings {
        base_url: base_url.to_string(),
        api_key,
        model: config.service.model.clone(),
        screening_prompt: config.screening.prompt.clone(),
        analysis_prompt: config.analysis.prompt.clone(),
        request_timeout: Duration::from_secs(config.service.request_timeout_secs),
        poll_interval: Duration::from_millis(config.service.poll_interval_ms),
        ingest_timeout: Duration::from_secs(config.service.ingest_timeout_secs),
    })?;
    Ok(client)
}

/// `<out stem>.state.csv` next to the output file.
fn default_state_path(out_csv: &Path) -> PathBuf {
    let stem = out_csv
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "screening".to_string());
    out_csv.with_file_name(format!("{stem}.state.csv"))
}

fn positive(name: &str, value: Option<usize>) -> Result<Option<usize>> {
    match value {
        Some(0) => Err(eyre!("--{name} must be at least 1")),
        other => Ok(other),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_screen(
    in_csv: PathBuf,
    out_csv: PathBuf,
    report: PathBuf,
    state: Option<PathBuf>,
    batch_size: Option<usize>,
) -> Result<()> {
    let mut config = load_config()?;
    if let Some(size) = positive("batch-size", batch_size)? {
        config.screening.batch_size = size;
    }
    let client = build_client(&config)?;

    let state = state.unwrap_or_else(|| default_state_path(&out_csv));
    let options = ScreeningOptions {
        input: in_csv,
        output: out_csv,
        report,
        state,
        config: config.screening,
    };

    info!(
        input = %options.input.display(),
        state = %options.state.display(),
        batch_size = options.config.batch_size,
        "starting screening"
    );

    let started = Instant::now();
    let progress = CliProgress::new();
    let summary = run_screening(&client, &options, &progress).await?;

    println!();
    println!("  Screening complete!");
    println!("  Evaluated:  {}", summary.evaluated);
    println!("  Included:   {}", summary.included);
    println!("  Rejected:   {}", summary.rejected);
    println!("  Unresolved: {}", summary.unresolved);
    if summary.batches_abandoned > 0 {
        println!(
            "  Abandoned:  {} of {} batches (rerun to retry)",
            summary.batches_abandoned, summary.batches
        );
    }
    println!("  Output:     {}", options.output.display());
    println!("  Time:       {:.1}s", started.elapsed().as_secs_f64());
    println!();

    Ok(())
}

fn cmd_format(in_csv: &Path, out_csv: &Path, report: &Path) -> Result<()> {
    info!(input = %in_csv.display(), "formatting review sheet");
    let summary = run_formatting(in_csv, out_csv, report)?;

    println!();
    println!("  Review sheet written!");
    println!("  Downloaded: {}", summary.downloaded);
    println!("  Links only: {}", summary.links_only);
    println!("  Rows:       {}", summary.total_rows);
    println!("  Output:     {}", out_csv.display());
    println!();

    Ok(())
}

async fn cmd_analyze(
    in_csv: PathBuf,
    out_csv: PathBuf,
    report: PathBuf,
    pdf_dir: PathBuf,
    workers: Option<usize>,
    retry_errors: bool,
) -> Result<()> {
    let mut config = load_config()?;
    if let Some(workers) = positive("workers", workers)? {
        config.analysis.workers = workers;
    }
    config.analysis.retry_errors |= retry_errors;

    if !pdf_dir.is_dir() {
        return Err(eyre!("PDF folder not found: {}", pdf_dir.display()));
    }
    let client = Arc::new(build_client(&config)?);

    let options = AnalysisOptions {
        input: in_csv,
        output: out_csv,
        report,
        artifact_dir: pdf_dir,
        config: config.analysis,
    };

    info!(
        input = %options.input.display(),
        artifacts = %options.artifact_dir.display(),
        workers = options.config.workers,
        "starting analysis"
    );

    let started = Instant::now();
    let progress = Arc::new(CliProgress::new());
    let summary = run_analysis(client, &options, progress).await?;

    println!();
    println!("  Analysis complete!");
    println!("  Evaluated:  {}", summary.evaluated);
    println!("  Classified: {}", summary.classified);
    println!("  Errors:     {}", summary.errors);
    println!("  No match:   {}", summary.skipped_no_match);
    for (category, count) in &summary.distribution {
        println!("    {category}: {count}");
    }
    println!("  Output:     {}", options.output.display());
    println!("  Time:       {:.1}s", started.elapsed().as_secs_f64());
    println!();

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
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
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid progress template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl StageProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn advance(&self, current: usize, total: usize, label: &str) {
        self.spinner
            .set_message(format!("[{current}/{total}] {label}"));
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_path_sits_next_to_output() {
        assert_eq!(
            default_state_path(Path::new("runs/screened.csv")),
            PathBuf::from("runs/screened.state.csv")
        );
        assert_eq!(
            default_state_path(Path::new("screened")),
            PathBuf::from("screened.state.csv")
        );
    }

    #[test]
    fn zero_counts_are_rejected() {
        assert!(positive("workers", Some(0)).is_err());
        assert_eq!(positive("workers", Some(3)).unwrap(), Some(3));
        assert_eq!(positive("workers", None).unwrap(), None);
    }

    #[test]
    fn cli_parses_analyze() {
        let cli = Cli::try_parse_from([
            "litscreen",
            "-v",
            "analyze",
            "--in-csv",
            "formatted.csv",
            "--out-csv",
            "analyzed.csv",
            "--report",
            "report.csv",
            "--pdf-dir",
            "pdfs",
            "--workers",
            "4",
            "--retry-errors",
        ])
        .expect("parse");
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Analyze {
                workers,
                retry_errors,
                ..
            } => {
                assert_eq!(workers, Some(4));
                assert!(retry_errors);
            }
            _ => panic!("expected analyze"),
        }
    }
}
