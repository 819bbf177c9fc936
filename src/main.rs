use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use recolte::cli::{Args, Commands};
use recolte::config::{RunContext, SourcesConfig};
use recolte::models::RunSummary;
use recolte::walker;

fn main() {
    let args = Args::parse();
    let log_level = args.effective_log_level();

    let Some(command) = args.command else {
        // No subcommand: print usage, exit 1.
        let _ = Args::command().print_help();
        std::process::exit(1);
    };
    if let Err(err) = initialize_logging(log_level) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }

    match run(command, log_level, args.max_workers, args.timeout) {
        Ok(summary) => {
            info!(
                "{} source(s) run, {} failed; {} file(s) succeeded, {} failed",
                summary.sources_run,
                summary.sources_failed,
                summary.files_succeeded,
                summary.files_failed
            );
            std::process::exit(if summary.has_errors() { 2 } else { 0 });
        }
        Err(err) => {
            error!("{err:#}");
            std::process::exit(1);
        }
    }
}

/// Initialize terminal logging at the requested level
fn initialize_logging(log_level: LevelFilter) -> Result<()> {
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;
    Ok(())
}

/// Load the sources definition and run the requested mode to completion
fn run(
    command: Commands,
    log_level: LevelFilter,
    max_workers: usize,
    timeout_secs: Option<u64>,
) -> Result<RunSummary> {
    let sources_file = match &command {
        Commands::Collect { sources_file, .. } => sources_file.clone(),
        Commands::Postcollect { sources_file, .. } => sources_file.clone(),
    };
    let config = load_sources(&sources_file)?;

    let ctx = Arc::new(
        RunContext::new(&config, log_level, max_workers)
            .with_command_timeout(timeout_secs.map(Duration::from_secs)),
    );

    let runtime = Runtime::new().context("Failed to create Tokio runtime")?;
    let summary = runtime.block_on(async {
        let cancel = cancel_on_ctrl_c();
        match command {
            Commands::Collect { sources, .. } => {
                walker::collect_run(ctx, &config.tree, &sources, &cancel).await
            }
            Commands::Postcollect { files, .. } => {
                walker::postcollect_run(ctx, &config.tree, &files, &cancel).await
            }
        }
    });

    Ok(summary)
}

/// Load and validate the sources definition file
fn load_sources(path: &Path) -> Result<SourcesConfig> {
    SourcesConfig::from_yaml_file(path)
        .context("An error occured while reading sources file")
}

/// Cancellation token tripped by Ctrl-C: no new source pipeline is
/// dispatched after it fires, in-flight commands run to completion.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trip = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing in-flight sources");
            trip.cancel();
        }
    });
    cancel
}
