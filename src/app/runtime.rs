use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use bulk_downloader::config::{self, FileConfig, resolve_settings};
use bulk_downloader::download::{
    BatchHooks, DownloadEngine, HttpClient, ProgressTracker, default_strategies,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::exit_handler::{ProcessExit, determine_exit_outcome};
use crate::app::{input_processor, output, progress_manager, terminal};
use crate::cli::Args;

pub(crate) async fn run_downloader() -> Result<ProcessExit> {
    let args = Args::parse();

    terminal::init_tracing(terminal::resolve_default_log_level(&args));
    debug!(?args, "CLI arguments parsed");

    let file_config = load_config(&args)?;
    let settings = resolve_settings(file_config.as_ref(), &args.overrides());

    let sources = input_processor::gather_sources(&args)?;
    if sources.is_empty() {
        println!("No sources to download.");
        return Ok(ProcessExit::Success);
    }

    let http = HttpClient::with_timeouts(settings.connect_timeout, settings.read_timeout)
        .context("failed to build HTTP client")?;
    let engine = DownloadEngine::new(settings.engine, default_strategies(http))?;
    let items = engine.plan(sources);
    info!(
        items = items.len(),
        output_dir = %engine.config().output_dir.display(),
        "Downloader starting"
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling remaining downloads");
            interrupt.cancel();
        }
    });

    let tracker = Arc::new(ProgressTracker::new(items.len()));
    let use_bar = terminal::should_use_progress_bar(
        io::stderr().is_terminal(),
        args.quiet,
        args.no_progress || args.json,
        terminal::is_dumb_terminal(),
    );
    let mut hooks = BatchHooks::new().with_tracker(Arc::clone(&tracker));
    let mut transfers = None;
    if use_bar {
        let (with_channel, rx) = hooks.with_transfer_channel();
        hooks = with_channel;
        transfers = Some(rx);
    }
    let (progress_handle, progress_stop) =
        progress_manager::spawn_progress_ui(use_bar, tracker, transfers);

    let report = engine.run(items, &cancel, hooks).await;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let report = report?;
    output::print_completion_summary(&report, args.json)?;
    Ok(determine_exit_outcome(&report))
}

fn load_config(args: &Args) -> Result<Option<FileConfig>> {
    if let Some(path) = args.config.as_deref() {
        return Ok(Some(config::load_file_config(path)?));
    }
    let loaded = config::load_default_file_config()?;
    if loaded.loaded_from_file
        && let Some(path) = loaded.path.as_deref()
    {
        debug!(path = %path.display(), "Using config file");
    }
    Ok(loaded.config)
}
