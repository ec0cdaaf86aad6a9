//! Archive submission and per-owner queueing.

use std::sync::atomic::Ordering;

use chrono::Utc;

use crate::error::{Error, JobError, Result};
use crate::types::{Event, OwnerId, SourceRef, SubmitOutcome};

use super::{Dispatcher, JobSpec, QueuedJob};

impl Dispatcher {
    /// Submit an inbound archive for processing
    ///
    /// If the owner has no active job, a job is created and started
    /// immediately. Otherwise the archive is appended to the owner's pending
    /// queue and its 1-based position is reported. Jobs for one owner run
    /// strictly in submission order; jobs for different owners run
    /// concurrently.
    ///
    /// Admission happens atomically under the queue mutex, so concurrent
    /// submissions can never produce two active jobs for the same owner.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] when the dispatcher is shutting down
    /// - [`JobError::ArchiveTooLarge`] when the archive exceeds the size
    ///   ceiling; this is checked before any processing begins
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use unpack_relay::{Dispatcher, types::{OwnerId, SourceRef, SubmitOutcome}};
    /// # async fn example(dispatcher: Dispatcher) -> unpack_relay::Result<()> {
    /// let source = SourceRef {
    ///     message_id: 100,
    ///     file_name: "photos.zip".to_string(),
    ///     size_bytes: 1_048_576,
    /// };
    /// match dispatcher.submit(OwnerId(7), source).await? {
    ///     SubmitOutcome::Started { job } => println!("job {job} started"),
    ///     SubmitOutcome::Queued { job, position } => {
    ///         println!("job {job} queued at position {position}")
    ///     }
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit(&self, owner: OwnerId, source: SourceRef) -> Result<SubmitOutcome> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        // The archive ceiling applies before any processing begins
        let limit = self.config.limits.max_archive_bytes;
        if source.size_bytes > limit {
            tracing::warn!(
                owner = owner.0,
                archive = %source.file_name,
                size = source.size_bytes,
                limit,
                "rejecting oversized archive at admission"
            );
            return Err(Error::Job(JobError::ArchiveTooLarge {
                size: source.size_bytes,
                limit,
            }));
        }

        let id = self.allocate_job_id();
        let archive_name = source.file_name.clone();

        let mut owners = self.owners.lock().await;
        let state = owners.entry(owner).or_default();

        let queued = QueuedJob {
            id,
            spec: JobSpec::Fresh { source },
            submitted_at: Utc::now(),
        };

        if state.active.is_none() {
            tracing::info!(
                job_id = id.0,
                owner = owner.0,
                archive = %archive_name,
                "owner idle, starting job immediately"
            );
            self.emit_event(Event::Submitted {
                job: id,
                owner,
                archive: archive_name,
                position: 0,
            });
            self.spawn_job_locked(state, owner, queued);
            Ok(SubmitOutcome::Started { job: id })
        } else {
            state.pending.push_back(queued);
            let position = state.pending.len();
            tracing::info!(
                job_id = id.0,
                owner = owner.0,
                archive = %archive_name,
                position,
                "owner busy, job queued"
            );
            self.emit_event(Event::Submitted {
                job: id,
                owner,
                archive: archive_name,
                position,
            });
            Ok(SubmitOutcome::Queued { job: id, position })
        }
    }
}
