use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use netlaborious::api::HttpApiFactory;
use netlaborious::{config, BatchInterpreter, BatchResult, Cancellation, CommandRegistry, GlobalModifiers, Services};

/// Operate vSphere VMs and NETLAB+ pods, one command at a time or as a batch.
///
/// Without a command, invocations are read one per line from --batch or
/// stdin. An `ARGS ...` line sets default options for the lines after it.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "netlaborious", disable_help_subcommand = true)]
struct Cli {
    /// Print detailed messages for debugging
    #[arg(short, long)]
    verbose: bool,

    /// Report what mutating commands would do without doing it
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Configuration file [default: ~/.config/netlaborious/config.json]
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Read batch input from FILE instead of stdin
    #[arg(short, long, value_name = "FILE")]
    batch: Option<PathBuf>,

    #[command(subcommand)]
    invocation: Option<Invocation>,
}

/// Everything after the global options is handed to the named command
/// untouched, including `--help`.
#[derive(Subcommand)]
enum Invocation {
    /// info, clone, snapshot, upload, mkpod or rmpod, followed by its options
    #[command(external_subcommand)]
    Command(Vec<String>),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("netlaborious={},warn", log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = config::resolve(cli.config.as_deref()).with_context(|| "Failed to load configuration")?;
    let registry = CommandRegistry::standard(Services::new(config, Arc::new(HttpApiFactory)));
    let modifiers = GlobalModifiers {
        verbose: cli.verbose,
        dry_run: cli.dry_run,
    };
    if modifiers.dry_run {
        info!("Dry run: mutating commands will only be reported");
    }

    match cli.invocation {
        Some(Invocation::Command(words)) => {
            if cli.batch.is_some() {
                Cli::command()
                    .error(ErrorKind::ArgumentConflict, "--batch cannot be combined with a command")
                    .exit();
            }
            let Some((command, args)) = words.split_first() else {
                Cli::command().error(ErrorKind::MissingSubcommand, "missing command").exit();
            };

            let interpreter = BatchInterpreter::new(&registry, modifiers);
            match interpreter.run_single(command, args).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    error!("✗ {} failed: {}", command, e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            // Stop reading input on Ctrl-C or SIGTERM
            let cancellation = Cancellation::new();
            cancellation.watch_signals();
            let interpreter =
                BatchInterpreter::new(&registry, modifiers).with_cancellation(cancellation);

            let result = match &cli.batch {
                Some(path) if path.as_os_str() != "-" => {
                    info!("Running batch from {}", path.display());
                    let file = tokio::fs::File::open(path)
                        .await
                        .with_context(|| format!("Failed to open batch file: {}", path.display()))?;
                    interpreter.run(BufReader::new(file)).await
                }
                _ => interpreter.run(BufReader::new(tokio::io::stdin())).await,
            }
            .context("Failed to read batch input")?;

            // Report failures and summary
            report(&result);
            let code = result.exit_code();
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
    }
}

fn report(result: &BatchResult) {
    for (line, err) in result.failures() {
        eprintln!("line {}: {}", line, err);
    }

    let summary = result.summary();
    info!(
        "Batch finished: {} succeeded, {} failed, {} skipped, {} directives{}",
        summary.succeeded,
        summary.failed,
        summary.skipped,
        summary.directives,
        if result.cancelled { " (cancelled)" } else { "" }
    );
}
