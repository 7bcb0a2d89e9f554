//! # ragctl
//!
//! Batch ingestion with durable run history.
//!
//! - `ragctl batch <DIR>` chunks every supported file of a directory
//! - `ragctl retry [RUN_ID]` reprocesses the failed and skipped files of a run
//! - `ragctl history list|show` inspects recorded runs
//!
//! ```bash
//! ragctl batch ./docs --pattern "*.md" --auto-continue
//! ragctl retry --show
//! ragctl retry --yes --max-tokens 800
//! ```

mod terminal;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use console::style;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ragctl::config::keys;
use ragctl::ingestion::DEFAULT_OUTPUT_DIR;
use ragctl::{
    open_store, AppConfig, BatchRequest, ChunkStrategy, ChunkingProcessor, OperatingMode,
    Orchestrator, PipelineRun, PipelineStatus, RetryOutcome, RetryRequest, RunConfig,
};

use terminal::TerminalOperator;

#[derive(Parser)]
#[command(name = "ragctl")]
#[command(about = "Batch document ingestion with run history and failed-file retry")]
#[command(version)]
struct Cli {
    /// Path to config file (default: <config-dir>/ragctl/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// History directory, overriding config and environment
    #[arg(long, global = true)]
    history_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every matching file in a directory
    Batch {
        /// Directory to scan
        directory: PathBuf,

        /// Glob matched against file names
        #[arg(short, long, default_value = "*")]
        pattern: String,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Record failures and keep going
        #[arg(long, conflicts_with_all = ["auto_stop", "auto_skip"])]
        auto_continue: bool,

        /// Abort the remaining files on the first failure
        #[arg(long, conflicts_with = "auto_skip")]
        auto_stop: bool,

        /// Record failures as skipped and keep going
        #[arg(long)]
        auto_skip: bool,

        /// Do not record the run in history
        #[arg(long)]
        no_save_history: bool,

        /// Append every chunk to one JSON lines file
        #[arg(long)]
        single_file: bool,

        #[command(flatten)]
        processing: ProcessingArgs,
    },

    /// Reprocess the failed and skipped files of a run
    Retry {
        /// Run to retry (default: the most recent run with failures)
        run_id: Option<String>,

        /// List the files that would be retried without processing them
        #[arg(long)]
        show: bool,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Failure handling: interactive, auto-continue, auto-stop, auto-skip
        #[arg(long, default_value = "interactive", value_parser = parse_mode)]
        mode: OperatingMode,

        #[command(flatten)]
        processing: ProcessingArgs,
    },

    /// Inspect recorded runs
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List runs, most recent first
    List {
        /// Maximum runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one run with its per-file results
    Show {
        run_id: String,

        /// Print the stored record as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Chunking settings shared by `batch` and `retry`
#[derive(Args)]
struct ProcessingArgs {
    /// Output directory for chunk files
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Chunking strategy: semantic, sentence, token
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<ChunkStrategy>,

    /// Target chunk size in tokens
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Tokens shared by consecutive chunks
    #[arg(long)]
    overlap: Option<usize>,
}

impl ProcessingArgs {
    /// Only the settings given on the command line
    fn overrides(&self) -> RunConfig {
        let mut config = RunConfig::new();
        if let Some(output) = &self.output {
            config.insert(keys::OUTPUT.into(), Value::from(output.display().to_string()));
        }
        if let Some(strategy) = self.strategy {
            config.insert(keys::STRATEGY.into(), Value::from(strategy.as_str()));
        }
        if let Some(max_tokens) = self.max_tokens {
            config.insert(keys::MAX_TOKENS.into(), Value::from(max_tokens));
        }
        if let Some(overlap) = self.overlap {
            config.insert(keys::OVERLAP.into(), Value::from(overlap));
        }
        config
    }
}

fn parse_mode(value: &str) -> Result<OperatingMode, String> {
    value.parse()
}

fn parse_strategy(value: &str) -> Result<ChunkStrategy, String> {
    value.parse().map_err(|e: ragctl::Error| e.to_string())
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), err);
            let code = err
                .downcast_ref::<ragctl::Error>()
                .map(ragctl::Error::exit_code)
                .unwrap_or(2);
            ExitCode::from(u8::try_from(code).unwrap_or(2))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.history_dir {
        config.history.dir = dir;
    }
    tracing::debug!("History at {} ({:?})", config.history.dir.display(), config.history.backend);

    match cli.command {
        Commands::Batch {
            directory,
            pattern,
            recursive,
            auto_continue,
            auto_stop,
            auto_skip,
            no_save_history,
            single_file,
            processing,
        } => {
            let Some(mode) = OperatingMode::from_flags(auto_continue, auto_stop, auto_skip) else {
                bail!("--auto-continue, --auto-stop and --auto-skip are mutually exclusive");
            };

            let mut run_config = RunConfig::new();
            config.chunking.write_to(&mut run_config);
            run_config.insert(keys::OUTPUT.into(), Value::from(DEFAULT_OUTPUT_DIR));
            run_config.extend(processing.overrides());
            run_config.insert(keys::SINGLE_FILE.into(), Value::from(single_file));

            let request = BatchRequest::new(directory)
                .with_pattern(pattern)
                .with_recursive(recursive)
                .with_mode(mode)
                .with_config(run_config)
                .with_save_history(!no_save_history)
                .with_security(config.security.clone());
            batch(&config, request).await
        }
        Commands::Retry {
            run_id,
            show,
            yes,
            mode,
            processing,
        } => {
            let request = RetryRequest {
                run_id,
                show,
                assume_yes: yes,
                mode,
                overrides: processing.overrides(),
            };
            retry(&config, request).await
        }
        Commands::History { action } => history(&config, action),
    }
}

fn orchestrator(config: &AppConfig) -> anyhow::Result<Orchestrator> {
    let store = open_store(&config.history)?;
    let processor = ChunkingProcessor::new(config.chunking.clone());
    Ok(Orchestrator::new(store, Arc::new(processor)))
}

async fn batch(config: &AppConfig, request: BatchRequest) -> anyhow::Result<()> {
    let orchestrator = orchestrator(config)?;
    let plan = orchestrator.plan_batch(&request)?;

    println!(
        "Found {} file(s) to process in {}",
        plan.files.len(),
        request.directory.display()
    );
    if !plan.unsupported.is_empty() {
        println!(
            "{} {} unsupported file(s) will not be processed",
            style("!").yellow(),
            plan.unsupported.len()
        );
    }

    let mut operator = TerminalOperator::new();
    let result = orchestrator.run_plan(&request, &plan, &mut operator).await;
    operator.finish();
    report(result, request.save_history)
}

async fn retry(config: &AppConfig, request: RetryRequest) -> anyhow::Result<()> {
    let orchestrator = orchestrator(config)?;
    let mut operator = TerminalOperator::new();
    let outcome = orchestrator.retry(&request, &mut operator).await;
    operator.finish();

    match outcome {
        Ok(RetryOutcome::NothingToRetry { source }) => {
            println!("No failed files in run {}", source.run_id);
            Ok(())
        }
        Ok(RetryOutcome::DryRun { .. }) => {
            println!("Dry run mode: no files were processed");
            Ok(())
        }
        Ok(RetryOutcome::Declined { .. }) => {
            println!("Retry cancelled");
            Ok(())
        }
        Ok(RetryOutcome::Completed { source, run }) => {
            println!("Retry of run {}", source.run_id);
            report(Ok(run), true)
        }
        Err(e) => report(Err(e), true),
    }
}

/// Print the run summary; a run carried by an error is summarized before the error is returned
fn report(result: ragctl::Result<PipelineRun>, saved: bool) -> anyhow::Result<()> {
    match result {
        Ok(run) => {
            print_summary(&run, saved);
            Ok(())
        }
        Err(err) => {
            if let Some(run) = err.run() {
                let recorded = matches!(err, ragctl::Error::Orchestration { saved: true, .. });
                print_summary(run, saved && recorded);
            }
            Err(err.into())
        }
    }
}

fn print_summary(run: &PipelineRun, saved: bool) {
    let status = match run.status {
        PipelineStatus::Done => style(run.status.as_str().to_uppercase()).green(),
        PipelineStatus::Failed | PipelineStatus::Aborted => style(run.status.as_str().to_uppercase()).red(),
        _ => style(run.status.as_str().to_uppercase()).yellow(),
    };
    println!();
    println!("Run {}: {}", style(&run.run_id).bold(), status);
    println!("Success: {}/{}", run.success, run.total_files);
    println!(
        "Failed: {}  Skipped: {}  Aborted: {}",
        run.failed, run.skipped, run.aborted
    );
    println!("Duration: {:.2}s", run.duration);

    if saved && (run.failed > 0 || run.skipped > 0) {
        println!("Retry with: ragctl retry {}", run.run_id);
    }
}

fn history(config: &AppConfig, action: HistoryAction) -> anyhow::Result<()> {
    let store = open_store(&config.history)?;
    match action {
        HistoryAction::List { limit, json } => {
            let mut summaries = store.list_summaries()?;
            summaries.reverse();
            summaries.truncate(limit);

            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
                return Ok(());
            }
            if summaries.is_empty() {
                println!("No runs recorded in {}", store.location());
                return Ok(());
            }
            println!(
                "{:<32} {:<20} {:<10} {:<14} {:>7} {:>7} {:>7} {:>7}",
                "RUN", "STARTED", "STATUS", "MODE", "TOTAL", "OK", "FAILED", "SKIPPED"
            );
            for summary in summaries {
                println!(
                    "{:<32} {:<20} {:<10} {:<14} {:>7} {:>7} {:>7} {:>7}",
                    summary.run_id,
                    summary.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    summary.status.as_str(),
                    summary.mode.as_str(),
                    summary.total_files,
                    summary.success,
                    summary.failed,
                    summary.skipped
                );
            }
            Ok(())
        }
        HistoryAction::Show { run_id, json } => {
            let run = store
                .get_run(&run_id)?
                .ok_or_else(|| ragctl::Error::RunNotFound(run_id.clone()))?;

            if json {
                let value = run.to_value().context("failed to encode run")?;
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }

            println!("Run:       {}", style(&run.run_id).bold());
            println!("Started:   {}", run.timestamp.to_rfc3339());
            println!("Status:    {}", run.status);
            println!("Mode:      {}", run.mode);
            if let Some(source) = run.retry_of() {
                println!("Retry of:  {}", source);
            }
            println!(
                "Files:     {} total, {} success, {} failed, {} skipped, {} aborted",
                run.total_files, run.success, run.failed, run.skipped, run.aborted
            );
            println!("Duration:  {:.2}s", run.duration);
            println!();
            for file in &run.files {
                let detail = file
                    .reason
                    .as_deref()
                    .or(file.error.as_deref())
                    .unwrap_or("");
                println!(
                    "  {:<8} {:<40} {:>5} chunks  {}",
                    file.status.as_str(),
                    file.filename,
                    file.chunks_created,
                    detail
                );
            }
            Ok(())
        }
    }
}
