//! Coalesced progress reporting for long-running stages.
//!
//! Progress callbacks can arrive far faster than a status message should be
//! edited. Each reporter owns a watch channel and one updater task: callers
//! overwrite the latest value, the task delivers at most one edit per
//! configured interval. Intermediate values are dropped by design and a
//! failed edit never aborts the job.

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::types::{Event, JobId, MessageRef};

use super::Dispatcher;

/// Which stage the reporter narrates; selects the event variant and the
/// units shown in the rendered bar
#[derive(Clone, Copy, Debug)]
pub(crate) enum ProgressKind {
    /// Download progress in bytes
    DownloadBytes,
    /// Upload progress in files
    UploadFiles,
}

/// Handle for a stage's progress stream; dropping it stops the updater task
pub(crate) struct ProgressReporter {
    tx: watch::Sender<(u64, u64)>,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    /// Spawn the updater task for one stage of one job
    pub(crate) fn start(
        dispatcher: Dispatcher,
        job: JobId,
        status: Option<MessageRef>,
        kind: ProgressKind,
    ) -> Self {
        let (tx, mut rx) = watch::channel((0u64, 0u64));
        let interval = dispatcher.config.progress.min_edit_interval;

        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let (done, total) = *rx.borrow_and_update();
                if total == 0 {
                    continue;
                }

                match kind {
                    ProgressKind::DownloadBytes => {
                        dispatcher.emit_event(Event::Downloading {
                            job,
                            bytes_done: done,
                            bytes_total: total,
                        });
                    }
                    ProgressKind::UploadFiles => {
                        dispatcher.emit_event(Event::Uploading {
                            job,
                            sent: done as usize,
                            total: total as usize,
                        });
                    }
                }

                if let Some(message) = status {
                    let label = match kind {
                        ProgressKind::DownloadBytes => "Downloading",
                        ProgressKind::UploadFiles => "Uploading",
                    };
                    let text = format!("{}\n{}", label, render_bar(done, total));
                    // Best-effort: a lost edit must never fail the job
                    if let Err(e) = dispatcher.transport.edit_status(message, &text).await {
                        tracing::debug!(job_id = job.0, error = %e, "progress edit failed");
                    }
                }

                // Throttle; the watch channel keeps only the newest value, so
                // anything reported during the pause is coalesced
                tokio::time::sleep(interval).await;
            }
        });

        Self { tx, handle }
    }

    /// Record the latest progress value; cheap and non-blocking
    pub(crate) fn update(&self, done: u64, total: u64) {
        self.tx.send((done, total)).ok();
    }

    /// Stop the updater task and wait for its last edit to finish
    pub(crate) async fn finish(self) {
        drop(self.tx);
        self.handle.await.ok();
    }
}

/// Render a 20-cell progress bar with a percentage
pub(crate) fn render_bar(cur: u64, total: u64) -> String {
    let total = total.max(1);
    let cur = cur.min(total);
    let filled = (20 * cur / total) as usize;
    let percent = cur as f64 / total as f64 * 100.0;
    format!(
        "{}{} {:.1}%  {} / {}",
        "█".repeat(filled),
        "░".repeat(20 - filled),
        percent,
        cur,
        total
    )
}
