//! Job state machine — one archive's full processing lifecycle.
//!
//! A job task drives download → extract → collect → group → upload →
//! finalize, consulting its cancellation token at every stage boundary and
//! before every file-level operation. Whatever path the job takes to a
//! terminal state, its working directory is released exactly once at the
//! end; only a parked job keeps its archive file around for the password
//! retry.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::error::JobError;
use crate::extraction::{self, ExtractOutcome};
use crate::grouping::group_files;
use crate::transport::{UploadMetadata, VideoAttributes};
use crate::types::{
    Batch, BatchKind, ClassifiedFile, ContentCategory, Event, FailedUpload, JobId, JobReport,
    JobState, MessageRef, OwnerId, SkippedFile, SourceRef, Stage, UploadHandle,
};

use super::progress::{ProgressKind, ProgressReporter};
use super::{Dispatcher, JobSpec, OwnerPrefs, ParkedJob};

/// Everything a job task needs to run to completion
pub(crate) struct JobContext {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) id: JobId,
    pub(crate) owner: OwnerId,
    pub(crate) spec: JobSpec,
    pub(crate) prefs: OwnerPrefs,
    pub(crate) submitted_at: chrono::DateTime<chrono::Utc>,
    pub(crate) cancel: CancellationToken,
    pub(crate) state_tx: tokio::sync::watch::Sender<JobState>,
}

impl JobContext {
    fn set_state(&self, state: JobState) {
        self.state_tx.send(state).ok();
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The job's exclusively owned working directory
    fn job_dir(&self) -> PathBuf {
        self.dispatcher
            .config
            .storage
            .work_dir
            .join(format!("job_{}", self.id))
    }
}

/// How a job's stage pipeline ended
enum StageOutcome {
    Completed(JobReport),
    Parked { archive_path: PathBuf },
    Cancelled { sent: usize, total: usize },
    Failed { stage: Stage, error: String },
}

/// Core job task -- orchestrates the full lifecycle of a single job.
///
/// Phases:
/// 1. Post a status message for in-place progress edits
/// 2. Run the stage pipeline until it completes, parks, fails, or cancels
/// 3. Deliver exactly one terminal summary to the owner
/// 4. Release working paths (archive retained only when parked)
/// 5. Hand the owner's queue slot back to the dispatcher
pub(crate) async fn run_job(ctx: JobContext) {
    let archive_name = ctx.spec.archive_name().to_string();
    let job_dir = ctx.job_dir();

    let status = match ctx
        .dispatcher
        .transport
        .notify(ctx.owner, &format!("Processing {archive_name}..."))
        .await
    {
        Ok(message) => Some(message),
        Err(e) => {
            debug!(job_id = ctx.id.0, error = %e, "could not post status message");
            None
        }
    };

    let outcome = execute(&ctx, &job_dir, status).await;

    let parked = match outcome {
        StageOutcome::Completed(report) => {
            ctx.set_state(JobState::Completed);
            info!(
                job_id = ctx.id.0,
                owner = ctx.owner.0,
                archive = %archive_name,
                delivered = report.delivered(),
                failed = report.failed.len(),
                skipped = report.skipped.len(),
                "job completed"
            );
            send_final(&ctx, status, &summary_text(&report)).await;
            ctx.dispatcher.emit_event(Event::Completed {
                job: ctx.id,
                report,
            });
            remove_job_dir(ctx.id, &job_dir).await;
            None
        }
        StageOutcome::Parked { archive_path } => {
            ctx.set_state(JobState::AwaitingPassword);
            info!(job_id = ctx.id.0, owner = ctx.owner.0, archive = %archive_name, "password required");
            // Drop the (empty) extraction directory; the archive stays for
            // the retry
            if let Err(e) = tokio::fs::remove_dir_all(job_dir.join("extracted")).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(job_id = ctx.id.0, error = %e, "failed to remove extraction directory");
            }
            send_final(
                &ctx,
                status,
                &format!("{archive_name} is password protected. Supply a password to resume."),
            )
            .await;
            ctx.dispatcher
                .emit_event(Event::PasswordRequested { job: ctx.id });
            Some(ParkedJob {
                id: ctx.id,
                archive_name,
                archive_path,
                submitted_at: ctx.submitted_at,
            })
        }
        StageOutcome::Cancelled { sent, total } => {
            ctx.set_state(JobState::Cancelling);
            info!(
                job_id = ctx.id.0,
                owner = ctx.owner.0,
                archive = %archive_name,
                sent,
                total,
                "job cancelled"
            );
            remove_job_dir(ctx.id, &job_dir).await;
            let text = if total > 0 {
                format!("Cancelled {archive_name}: {sent} of {total} files were sent.")
            } else {
                format!("Cancelled {archive_name}.")
            };
            send_final(&ctx, status, &text).await;
            ctx.dispatcher.emit_event(Event::Cancelled {
                job: ctx.id,
                sent,
                total,
            });
            ctx.set_state(JobState::Failed);
            None
        }
        StageOutcome::Failed { stage, error } => {
            ctx.set_state(JobState::Failed);
            warn!(
                job_id = ctx.id.0,
                owner = ctx.owner.0,
                archive = %archive_name,
                ?stage,
                error = %error,
                "job failed"
            );
            remove_job_dir(ctx.id, &job_dir).await;
            send_final(
                &ctx,
                status,
                &format!("Could not process {archive_name}: {error}"),
            )
            .await;
            ctx.dispatcher.emit_event(Event::Failed {
                job: ctx.id,
                stage,
                error,
            });
            None
        }
    };

    ctx.dispatcher.finish_job(ctx.owner, ctx.id, parked).await;
}

/// Run the stage pipeline; every return path is a well-defined outcome
async fn execute(ctx: &JobContext, job_dir: &Path, status: Option<MessageRef>) -> StageOutcome {
    // Resolve the archive on disk: fresh jobs download it, resumed jobs
    // reuse the retained file
    let (archive_path, password) = match &ctx.spec {
        JobSpec::Fresh { source } => match download_stage(ctx, job_dir, source, status).await {
            Ok(path) => (path, ctx.prefs.password.clone()),
            Err(outcome) => return outcome,
        },
        JobSpec::Resume {
            archive_path,
            password,
            ..
        } => {
            info!(
                job_id = ctx.id.0,
                "resuming parked job at the extraction stage"
            );
            (archive_path.clone(), Some(password.clone()))
        }
    };

    // --- Extracting ---
    ctx.set_state(JobState::Extracting);
    if ctx.is_cancelled() {
        return StageOutcome::Cancelled { sent: 0, total: 0 };
    }
    edit_status(ctx, status, "Extracting...").await;

    if let Ok(Some(format)) = extraction::detect_archive_type(&archive_path) {
        ctx.dispatcher
            .emit_event(Event::Extracting { job: ctx.id, format });
    }

    let extract_dir = job_dir.join("extracted");
    let outcome =
        extraction::extract_archive(ctx.id, &archive_path, &extract_dir, password.as_deref())
            .await;

    // One attempt per password, used or not
    ctx.dispatcher.clear_password_after_attempt(ctx.owner).await;

    match outcome {
        Ok(ExtractOutcome::Extracted(_)) => {}
        Ok(ExtractOutcome::PasswordRequired) => {
            return StageOutcome::Parked { archive_path };
        }
        Ok(ExtractOutcome::Unsupported) => {
            return StageOutcome::Failed {
                stage: Stage::Extract,
                error: "unsupported archive format".to_string(),
            };
        }
        Err(e) => {
            return StageOutcome::Failed {
                stage: Stage::Extract,
                error: e.to_string(),
            };
        }
    }

    if ctx.is_cancelled() {
        return StageOutcome::Cancelled { sent: 0, total: 0 };
    }

    // --- Collecting ---
    ctx.set_state(JobState::Collecting);
    let (files, skipped) = match collect_stage(ctx, &extract_dir) {
        Ok(collected) => collected,
        Err(e) => {
            return StageOutcome::Failed {
                stage: Stage::Collect,
                error: e.to_string(),
            };
        }
    };

    ctx.dispatcher.emit_event(Event::Collected {
        job: ctx.id,
        files: files.len(),
        skipped: skipped.len(),
    });

    if files.is_empty() {
        let error = if skipped.is_empty() {
            JobError::NoFilesFound.to_string()
        } else {
            format!(
                "{} ({} file(s) skipped for exceeding the size ceiling)",
                JobError::NoFilesFound,
                skipped.len()
            )
        };
        return StageOutcome::Failed {
            stage: Stage::Collect,
            error,
        };
    }

    if ctx.is_cancelled() {
        return StageOutcome::Cancelled { sent: 0, total: 0 };
    }

    // --- Grouping + Uploading ---
    ctx.set_state(JobState::Uploading);
    let batches = if ctx.prefs.grouping_enabled {
        group_files(
            files,
            ctx.prefs.max_batch_count,
            ctx.dispatcher.config.limits.max_batch_bytes,
        )
    } else {
        singleton_batches(files)
    };

    upload_stage(ctx, ctx.spec.archive_name(), batches, skipped, status).await
}

/// Fetch the inbound archive to local storage, observing cancellation
async fn download_stage(
    ctx: &JobContext,
    job_dir: &Path,
    source: &SourceRef,
    status: Option<MessageRef>,
) -> Result<PathBuf, StageOutcome> {
    ctx.set_state(JobState::Downloading);
    if ctx.is_cancelled() {
        return Err(StageOutcome::Cancelled { sent: 0, total: 0 });
    }

    if let Err(e) = tokio::fs::create_dir_all(job_dir).await {
        return Err(StageOutcome::Failed {
            stage: Stage::Download,
            error: format!("failed to create working directory: {e}"),
        });
    }

    let archive_path = job_dir.join(safe_file_name(&source.file_name));

    let reporter = ProgressReporter::start(
        ctx.dispatcher.clone(),
        ctx.id,
        status,
        ProgressKind::DownloadBytes,
    );
    let progress = |done: u64, total: u64| reporter.update(done, total);

    // Cancellation aborts the transfer at the next await point; the partial
    // file is deleted below
    let result = tokio::select! {
        _ = ctx.cancel.cancelled() => None,
        res = ctx.dispatcher.transport.download(source, &archive_path, &progress) => Some(res),
    };

    reporter.finish().await;

    match result {
        None => {
            if let Err(e) = tokio::fs::remove_file(&archive_path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(job_id = ctx.id.0, error = %e, "failed to delete partial download");
            }
            Err(StageOutcome::Cancelled { sent: 0, total: 0 })
        }
        Some(Err(e)) => Err(StageOutcome::Failed {
            stage: Stage::Download,
            error: JobError::TransferFailed {
                id: ctx.id.0,
                reason: e.to_string(),
            }
            .to_string(),
        }),
        Some(Ok(())) => Ok(archive_path),
    }
}

/// Walk the extraction directory, skip oversized files, classify the rest
///
/// Output is ordered by path so grouping and delivery are deterministic.
fn collect_stage(
    ctx: &JobContext,
    extract_dir: &Path,
) -> crate::Result<(Vec<ClassifiedFile>, Vec<SkippedFile>)> {
    let max_file_bytes = ctx.dispatcher.config.limits.max_file_bytes;
    let mut files = Vec::new();
    let mut skipped = Vec::new();

    fn visit_dir(
        dir: &Path,
        max_file_bytes: u64,
        job_id: JobId,
        files: &mut Vec<(PathBuf, u64)>,
        skipped: &mut Vec<SkippedFile>,
    ) -> crate::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                visit_dir(&path, max_file_bytes, job_id, files, skipped)?;
                continue;
            }

            let byte_size = entry.metadata()?.len();
            if byte_size > max_file_bytes {
                info!(
                    job_id = job_id.0,
                    file = %path.display(),
                    byte_size,
                    "skipping file over the size ceiling"
                );
                skipped.push(SkippedFile {
                    display_name: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string()),
                    byte_size,
                });
                continue;
            }

            files.push((path, byte_size));
        }
        Ok(())
    }

    let mut raw = Vec::new();
    visit_dir(extract_dir, max_file_bytes, ctx.id, &mut raw, &mut skipped)?;
    raw.sort_by(|a, b| a.0.cmp(&b.0));

    for (path, byte_size) in raw {
        files.push(classify(&path, byte_size));
    }

    debug!(
        job_id = ctx.id.0,
        collected = files.len(),
        skipped = skipped.len(),
        "collected extracted files"
    );

    Ok((files, skipped))
}

/// Deliver batches in order, files in order within each batch
///
/// Per-file failures are recorded and skipped; only cancellation stops the
/// loop early.
async fn upload_stage(
    ctx: &JobContext,
    archive_name: &str,
    batches: Vec<Batch>,
    skipped: Vec<SkippedFile>,
    status: Option<MessageRef>,
) -> StageOutcome {
    let total: usize = batches.iter().map(|b| b.files.len()).sum();
    let mut sent = 0usize;
    let mut report = JobReport {
        archive_name: archive_name.to_string(),
        skipped,
        ..Default::default()
    };

    edit_status(ctx, status, &format!("Uploading {total} files...")).await;
    let reporter = ProgressReporter::start(
        ctx.dispatcher.clone(),
        ctx.id,
        status,
        ProgressKind::UploadFiles,
    );

    for batch in batches {
        let mut staged: Vec<(UploadHandle, ClassifiedFile)> = Vec::new();

        for file in batch.files {
            if ctx.is_cancelled() {
                reporter.finish().await;
                return StageOutcome::Cancelled { sent, total };
            }

            let metadata = build_metadata(ctx, &file).await;

            match ctx
                .dispatcher
                .transport
                .upload_single(&file.path, &metadata)
                .await
            {
                Ok(handle) => staged.push((handle, file)),
                Err(e) => {
                    warn!(
                        job_id = ctx.id.0,
                        file = %file.display_name,
                        error = %e,
                        "file upload failed, continuing with the rest"
                    );
                    report.failed.push(FailedUpload {
                        display_name: file.display_name.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            sent += 1;
            reporter.update(sent as u64, total as u64);
        }

        deliver_batch(ctx, staged, &mut report).await;
    }

    reporter.finish().await;
    StageOutcome::Completed(report)
}

/// Deliver one staged batch as a grouped send, falling back to per-item
/// delivery when the grouped send fails
async fn deliver_batch(
    ctx: &JobContext,
    staged: Vec<(UploadHandle, ClassifiedFile)>,
    report: &mut JobReport,
) {
    if staged.is_empty() {
        return;
    }

    let handles: Vec<UploadHandle> = staged.iter().map(|(handle, _)| *handle).collect();

    match ctx
        .dispatcher
        .transport
        .upload_group(ctx.owner, handles)
        .await
    {
        Ok(()) => {
            for (_, file) in staged {
                count_delivered(report, &file);
            }
        }
        Err(e) => {
            warn!(
                job_id = ctx.id.0,
                error = %e,
                "grouped send failed, falling back to per-item delivery"
            );
            for (handle, file) in staged {
                match ctx
                    .dispatcher
                    .transport
                    .upload_group(ctx.owner, vec![handle])
                    .await
                {
                    Ok(()) => count_delivered(report, &file),
                    Err(e) => {
                        warn!(
                            job_id = ctx.id.0,
                            file = %file.display_name,
                            error = %e,
                            "per-item delivery failed, continuing"
                        );
                        report.failed.push(FailedUpload {
                            display_name: file.display_name,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Probe videos for geometry and repair muted ones before upload
async fn build_metadata(ctx: &JobContext, file: &ClassifiedFile) -> UploadMetadata {
    let mut video = None;

    if file.category == ContentCategory::Video && ctx.dispatcher.media.capabilities().can_probe {
        match ctx.dispatcher.media.probe(&file.path).await {
            Ok(probe) => {
                if !probe.has_audio_stream && ctx.dispatcher.media.capabilities().can_mux {
                    info!(
                        job_id = ctx.id.0,
                        file = %file.display_name,
                        "muted video, muxing silent audio track"
                    );
                    if let Err(e) = ctx.dispatcher.media.mux_silent_audio(&file.path).await {
                        warn!(
                            job_id = ctx.id.0,
                            file = %file.display_name,
                            error = %e,
                            "silent-audio mux failed, uploading as-is"
                        );
                    }
                }
                video = Some(VideoAttributes {
                    width: probe.width,
                    height: probe.height,
                    duration_seconds: probe.duration_seconds as u64,
                });
            }
            Err(e) => {
                debug!(
                    job_id = ctx.id.0,
                    file = %file.display_name,
                    error = %e,
                    "media probe failed, uploading without attributes"
                );
            }
        }
    }

    UploadMetadata {
        display_name: file.display_name.clone(),
        mime_label: file.mime_label.clone(),
        category: file.category,
        video,
    }
}

/// With grouping disabled every file travels alone, in collect order
fn singleton_batches(files: Vec<ClassifiedFile>) -> Vec<Batch> {
    files
        .into_iter()
        .map(|file| Batch {
            kind: if file.is_visual() {
                BatchKind::MixedMedia
            } else {
                BatchKind::Documents
            },
            byte_total: file.byte_size,
            files: vec![file],
        })
        .collect()
}

/// One human-readable completion summary per terminal state
fn summary_text(report: &JobReport) -> String {
    let mut text = format!(
        "Finished {}: delivered {} file(s) ({} image(s), {} video(s), {} document(s)).",
        report.archive_name,
        report.delivered(),
        report.images,
        report.videos,
        report.documents,
    );

    if !report.skipped.is_empty() {
        let names: Vec<&str> = report
            .skipped
            .iter()
            .map(|s| s.display_name.as_str())
            .collect();
        text.push_str(&format!(
            "\nSkipped {} oversized file(s): {}",
            names.len(),
            names.join(", ")
        ));
    }

    if !report.failed.is_empty() {
        let names: Vec<&str> = report
            .failed
            .iter()
            .map(|f| f.display_name.as_str())
            .collect();
        text.push_str(&format!(
            "\nFailed to deliver {} file(s): {}",
            names.len(),
            names.join(", ")
        ));
    }

    text
}

fn count_delivered(report: &mut JobReport, file: &ClassifiedFile) {
    match file.category {
        ContentCategory::Image => report.images += 1,
        ContentCategory::Video => report.videos += 1,
        ContentCategory::Document => report.documents += 1,
    }
}

/// Deliver the terminal summary: edit the status message in place, or post a
/// fresh message when there is none (or the edit fails)
async fn send_final(ctx: &JobContext, status: Option<MessageRef>, text: &str) {
    if let Some(message) = status
        && ctx
            .dispatcher
            .transport
            .edit_status(message, text)
            .await
            .is_ok()
    {
        return;
    }
    if let Err(e) = ctx.dispatcher.transport.notify(ctx.owner, text).await {
        warn!(job_id = ctx.id.0, error = %e, "failed to deliver summary message");
    }
}

/// Best-effort status edit during a stage; failures never abort the job
async fn edit_status(ctx: &JobContext, status: Option<MessageRef>, text: &str) {
    if let Some(message) = status
        && let Err(e) = ctx.dispatcher.transport.edit_status(message, text).await
    {
        debug!(job_id = ctx.id.0, error = %e, "status edit failed");
    }
}

/// Release the job's working directory; called once per terminal state
async fn remove_job_dir(id: JobId, job_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(job_dir).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(job_id = id.0, path = %job_dir.display(), error = %e, "failed to remove working directory");
    }
}

/// Reduce an owner-supplied file name to a single safe path component
fn safe_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| "archive.bin".to_string())
}
