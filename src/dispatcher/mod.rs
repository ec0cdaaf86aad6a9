//! Core dispatcher implementation split into focused submodules.
//!
//! The `Dispatcher` struct and its methods are organized by domain:
//! - [`admission`] - Archive submission and per-owner queueing
//! - [`control`] - Cancellation, password resume, owner preferences
//! - [`status`] - Per-owner status queries
//! - [`job`] - Job state machine execution
//! - [`progress`] - Coalesced status-message progress reporting

mod admission;
mod control;
mod job;
mod progress;
mod status;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::media::MediaInspector;
use crate::transport::Transport;
use crate::types::{Event, JobId, JobState, JobSummary, OwnerId, SourceRef};

/// Per-owner runtime preferences, seeded from [`Config`] on first contact
///
/// This is the single owner-state record: grouping mode, batch limit, and the
/// retained password all live here rather than in scattered per-owner maps.
#[derive(Clone, Debug)]
pub(crate) struct OwnerPrefs {
    /// Whether files are grouped into batches for this owner
    pub(crate) grouping_enabled: bool,
    /// Maximum files per batch for this owner
    pub(crate) max_batch_count: usize,
    /// Password retained for this owner's next extraction attempt
    pub(crate) password: Option<String>,
}

impl OwnerPrefs {
    fn from_config(config: &Config) -> Self {
        Self {
            grouping_enabled: config.grouping.enabled,
            max_batch_count: config.limits.max_batch_count,
            password: None,
        }
    }
}

/// What a job task starts from: a fresh inbound archive, or a parked archive
/// resumed with an owner-supplied password
#[derive(Clone, Debug)]
pub(crate) enum JobSpec {
    /// Download the archive from the transport, then extract
    Fresh {
        /// Inbound archive handle
        source: SourceRef,
    },
    /// Skip the download and retry extraction of an already-fetched archive
    Resume {
        /// Archive file retained from the parked job
        archive_path: PathBuf,
        /// Original archive name
        archive_name: String,
        /// Password supplied by the owner for this attempt
        password: String,
    },
}

impl JobSpec {
    pub(crate) fn archive_name(&self) -> &str {
        match self {
            JobSpec::Fresh { source } => &source.file_name,
            JobSpec::Resume { archive_name, .. } => archive_name,
        }
    }
}

/// A job waiting in an owner's pending queue
#[derive(Clone, Debug)]
pub(crate) struct QueuedJob {
    pub(crate) id: JobId,
    pub(crate) spec: JobSpec,
    pub(crate) submitted_at: DateTime<Utc>,
}

/// The at-most-one job currently executing for an owner
pub(crate) struct ActiveJob {
    pub(crate) id: JobId,
    pub(crate) archive_name: String,
    pub(crate) state_rx: tokio::sync::watch::Receiver<JobState>,
    pub(crate) cancel: CancellationToken,
    pub(crate) submitted_at: DateTime<Utc>,
}

impl ActiveJob {
    pub(crate) fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            archive_name: self.archive_name.clone(),
            state: *self.state_rx.borrow(),
            submitted_at: self.submitted_at,
        }
    }
}

/// A job parked in `AwaitingPassword`; consumes no execution resources
#[derive(Clone, Debug)]
pub(crate) struct ParkedJob {
    pub(crate) id: JobId,
    pub(crate) archive_name: String,
    /// Retained archive file; its parent job directory is removed when the
    /// job is cancelled or finishes after resume
    pub(crate) archive_path: PathBuf,
    pub(crate) submitted_at: DateTime<Utc>,
}

/// Per-owner queue state: pending jobs, the active job, parked jobs, and
/// owner preferences
///
/// Invariant: `active` is non-empty iff a job task is running for this owner;
/// `pending` never contains the active job.
#[derive(Default)]
pub(crate) struct OwnerState {
    pub(crate) pending: VecDeque<QueuedJob>,
    pub(crate) active: Option<ActiveJob>,
    pub(crate) parked: Vec<ParkedJob>,
    pub(crate) prefs: Option<OwnerPrefs>,
}

impl OwnerState {
    pub(crate) fn prefs_mut(&mut self, config: &Config) -> &mut OwnerPrefs {
        self.prefs
            .get_or_insert_with(|| OwnerPrefs::from_config(config))
    }
}

/// Main dispatcher instance (cloneable - all fields are Arc-wrapped)
///
/// Owns the per-owner queues and admits, starts, cancels, and advances jobs.
/// All queue mutations happen under one mutex so concurrent submissions,
/// cancellations, and queue-advance-on-completion never race.
#[derive(Clone)]
pub struct Dispatcher {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Outbound message transport collaborator
    pub(crate) transport: Arc<dyn Transport>,
    /// Media inspection collaborator (ffprobe/ffmpeg or no-op)
    pub(crate) media: Arc<dyn MediaInspector>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Per-owner queue state, guarded by the single queue mutex
    pub(crate) owners: Arc<tokio::sync::Mutex<HashMap<OwnerId, OwnerState>>>,
    /// Monotonic job ID allocator
    pub(crate) next_job_id: Arc<AtomicU64>,
    /// Flag to indicate whether new jobs are accepted (false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Create a new Dispatcher instance
    ///
    /// Ensures the working directory exists and sets up the event broadcast
    /// channel. The transport and media inspector are trait objects so
    /// embedders can plug in their messaging service of choice.
    pub async fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        media: Arc<dyn MediaInspector>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.storage.work_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create work directory '{}': {}",
                        config.storage.work_dir.display(),
                        e
                    ),
                ))
            })?;

        // Buffered so slow subscribers don't stall job progress
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        tracing::info!(
            work_dir = %config.storage.work_dir.display(),
            media_inspector = media.name(),
            "Dispatcher initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            transport,
            media,
            event_tx,
            owners: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            next_job_id: Arc::new(AtomicU64::new(1)),
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Subscribe to job lifecycle events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events
    /// independently. Events are buffered, but a subscriber that falls behind
    /// by more than 1000 events receives a `RecvError::Lagged` error.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    /// Job processing continues even if no one is listening.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Called by a job task on reaching a terminal state (or parking).
    ///
    /// Under the queue mutex: releases the owner's active slot, records the
    /// parked job if the task parked, and starts the owner's next pending job
    /// if any. This is the only place the queue advances.
    pub(crate) async fn finish_job(&self, owner: OwnerId, id: JobId, parked: Option<ParkedJob>) {
        let mut owners = self.owners.lock().await;
        let Some(state) = owners.get_mut(&owner) else {
            return;
        };

        if state.active.as_ref().is_some_and(|a| a.id == id) {
            state.active = None;
        }

        if let Some(parked_job) = parked {
            tracing::info!(
                job_id = id.0,
                owner = owner.0,
                "job parked awaiting password"
            );
            state.parked.push(parked_job);
        }

        if state.active.is_none()
            && let Some(next) = state.pending.pop_front()
        {
            tracing::info!(
                job_id = next.id.0,
                owner = owner.0,
                "starting next queued job"
            );
            self.spawn_job_locked(state, owner, next);
        }
    }

    /// Start a job task for an owner whose active slot is free.
    ///
    /// Must be called with the queue mutex held; inserts the active record
    /// before the task is spawned so no second job can slip in.
    pub(crate) fn spawn_job_locked(
        &self,
        state: &mut OwnerState,
        owner: OwnerId,
        queued: QueuedJob,
    ) {
        debug_assert!(state.active.is_none(), "owner already has an active job");

        let prefs = state.prefs_mut(&self.config).clone();
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = tokio::sync::watch::channel(JobState::Pending);

        state.active = Some(ActiveJob {
            id: queued.id,
            archive_name: queued.spec.archive_name().to_string(),
            state_rx,
            cancel: cancel.clone(),
            submitted_at: queued.submitted_at,
        });

        let ctx = job::JobContext {
            dispatcher: self.clone(),
            id: queued.id,
            owner,
            spec: queued.spec,
            prefs,
            submitted_at: queued.submitted_at,
            cancel,
            state_tx,
        };

        self.emit_event(Event::Started { job: queued.id });
        tokio::spawn(job::run_job(ctx));
    }

    /// Gracefully shut down the dispatcher
    ///
    /// 1. Stops accepting new jobs
    /// 2. Cancels all active jobs and discards pending and parked ones
    ///    (parked archives are deleted)
    /// 3. Waits for active job tasks to observe cancellation, with a timeout
    /// 4. Emits a shutdown event
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        // Cancel everything under the queue mutex, collect parked paths for
        // deletion outside the lock
        let mut parked_dirs = Vec::new();
        {
            let mut owners = self.owners.lock().await;
            for state in owners.values_mut() {
                if let Some(active) = &state.active {
                    active.cancel.cancel();
                }
                state.pending.clear();
                for parked in state.parked.drain(..) {
                    if let Some(dir) = parked.archive_path.parent() {
                        parked_dirs.push(dir.to_path_buf());
                    }
                }
            }
        }

        for dir in parked_dirs {
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %dir.display(), error = %e, "Failed to delete parked job directory");
            }
        }

        let shutdown_timeout = std::time::Duration::from_secs(30);
        let wait_result = tokio::time::timeout(shutdown_timeout, self.wait_for_active_jobs()).await;

        match wait_result {
            Ok(()) => {
                tracing::info!("All active jobs stopped");
            }
            Err(_) => {
                tracing::warn!("Timeout waiting for jobs to stop, proceeding with shutdown");
            }
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Wait for all active job tasks to release their slots
    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = {
                let owners = self.owners.lock().await;
                owners.values().filter(|s| s.active.is_some()).count()
            };

            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for active jobs to stop");
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
    }

    /// Allocate the next job ID
    pub(crate) fn allocate_job_id(&self) -> JobId {
        JobId(self.next_job_id.fetch_add(1, Ordering::SeqCst))
    }
}
