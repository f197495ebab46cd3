//! Progress bar for download runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bulk_downloader::download::{ProgressTracker, ProgressUpdate};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

const POLL_INTERVAL: Duration = Duration::from_millis(120);

/// Spawns the progress bar when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_bar` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_bar: bool,
    tracker: Arc<ProgressTracker>,
    transfers: Option<mpsc::Receiver<ProgressUpdate>>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_bar {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_bar_inner(tracker, transfers, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_bar_inner(
    tracker: Arc<ProgressTracker>,
    mut transfers: Option<mpsc::Receiver<ProgressUpdate>>,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let snapshot = tracker.snapshot();
        let bar = ProgressBar::new(snapshot.total as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        let mut latest: Option<ProgressUpdate> = None;
        while !stop.load(Ordering::SeqCst) {
            if let Some(rx) = transfers.as_mut() {
                while let Ok(update) = rx.try_recv() {
                    latest = Some(update);
                }
            }

            let snapshot = tracker.snapshot();
            bar.set_position(snapshot.completed as u64);
            bar.set_message(render_message(snapshot.failed, latest.as_ref()));
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        bar.finish_and_clear();
    })
}

fn render_message(failed: usize, latest: Option<&ProgressUpdate>) -> String {
    let mut message = String::new();
    if failed > 0 {
        message.push_str(&format!("{failed} failed"));
    }
    if let Some(update) = latest
        && let Some(percent) = update.percent
        && percent < 100
    {
        if !message.is_empty() {
            message.push_str(", ");
        }
        message.push_str(&format!("{} {percent}%", update.source_id));
    }
    message
}
