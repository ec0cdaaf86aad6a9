//! Job lifecycle control — cancellation, password resume, owner preferences.

use crate::types::{CancelReport, OwnerId};

use super::{Dispatcher, JobSpec, QueuedJob};

impl Dispatcher {
    /// Request cancellation of the owner's active job
    ///
    /// Sets the job's cancellation token and returns whether an active job
    /// existed. Cancellation is cooperative: the job stops at its next
    /// checkpoint (stage boundary or before the next file), not mid-step,
    /// and this method never blocks waiting for it.
    pub async fn cancel_active(&self, owner: OwnerId) -> bool {
        let owners = self.owners.lock().await;
        match owners.get(&owner).and_then(|s| s.active.as_ref()) {
            Some(active) => {
                tracing::info!(
                    job_id = active.id.0,
                    owner = owner.0,
                    "cancellation requested for active job"
                );
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove one not-yet-started job from the owner's pending queue
    ///
    /// `position` is 1-based, matching the position reported by `submit` and
    /// `status_of`. The active job is never touched. Returns whether a job
    /// was removed.
    pub async fn cancel_queued(&self, owner: OwnerId, position: usize) -> bool {
        if position == 0 {
            return false;
        }

        let mut owners = self.owners.lock().await;
        let Some(state) = owners.get_mut(&owner) else {
            return false;
        };

        match state.pending.remove(position - 1) {
            Some(removed) => {
                tracing::info!(
                    job_id = removed.id.0,
                    owner = owner.0,
                    position,
                    "removed queued job"
                );
                true
            }
            None => false,
        }
    }

    /// Remove all not-yet-started jobs from the owner's pending queue
    ///
    /// The active job is never touched. Returns the number of jobs removed.
    pub async fn cancel_all_queued(&self, owner: OwnerId) -> usize {
        let mut owners = self.owners.lock().await;
        let Some(state) = owners.get_mut(&owner) else {
            return 0;
        };

        let removed = state.pending.len();
        state.pending.clear();
        if removed > 0 {
            tracing::info!(owner = owner.0, removed, "cleared pending queue");
        }
        removed
    }

    /// Cancel everything the owner has in flight: the active job
    /// (cooperatively), all pending jobs, and all parked jobs
    ///
    /// Parked jobs hold no executing task, so their cancellation is
    /// immediate: the retained archive file is deleted here rather than at a
    /// checkpoint.
    pub async fn cancel_all(&self, owner: OwnerId) -> CancelReport {
        let mut report = CancelReport::default();
        let mut parked_dirs = Vec::new();

        {
            let mut owners = self.owners.lock().await;
            let Some(state) = owners.get_mut(&owner) else {
                return report;
            };

            if let Some(active) = &state.active {
                active.cancel.cancel();
                report.active = true;
            }

            report.queued = state.pending.len();
            state.pending.clear();

            report.parked = state.parked.len();
            for parked in state.parked.drain(..) {
                if let Some(dir) = parked.archive_path.parent() {
                    parked_dirs.push(dir.to_path_buf());
                }
            }
        }

        // Delete parked archives outside the queue mutex
        for dir in parked_dirs {
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(
                    owner = owner.0,
                    path = %dir.display(),
                    error = %e,
                    "Failed to delete parked job directory"
                );
            }
        }

        tracing::info!(
            owner = owner.0,
            active = report.active,
            queued = report.queued,
            parked = report.parked,
            "cancel-all processed"
        );
        report
    }

    /// Supply a password for the owner's most recently parked job
    ///
    /// The parked job resumes at the extraction stage with its retained
    /// archive: immediately when the owner is idle, otherwise at the front of
    /// the pending queue (it predates everything queued behind it). Returns
    /// whether a parked job existed.
    ///
    /// With no parked job the password is retained in the owner's
    /// preferences and seeds the next archive's first extraction attempt.
    pub async fn supply_password(&self, owner: OwnerId, password: &str) -> bool {
        let mut owners = self.owners.lock().await;
        let state = owners.entry(owner).or_default();

        let Some(parked) = state.parked.pop() else {
            tracing::info!(owner = owner.0, "password retained for next archive");
            state.prefs_mut(&self.config).password = Some(password.to_string());
            return false;
        };

        let queued = QueuedJob {
            id: parked.id,
            spec: JobSpec::Resume {
                archive_path: parked.archive_path,
                archive_name: parked.archive_name,
                password: password.to_string(),
            },
            submitted_at: parked.submitted_at,
        };

        if state.active.is_none() {
            tracing::info!(
                job_id = queued.id.0,
                owner = owner.0,
                "resuming parked job with supplied password"
            );
            self.spawn_job_locked(state, owner, queued);
        } else {
            tracing::info!(
                job_id = queued.id.0,
                owner = owner.0,
                "owner busy, parked job resumes ahead of the queue"
            );
            state.pending.push_front(queued);
        }

        true
    }

    /// Toggle batching for an owner
    ///
    /// With grouping disabled, every file is delivered individually in
    /// collect order. Takes effect from the owner's next job.
    pub async fn set_grouping(&self, owner: OwnerId, enabled: bool) {
        let mut owners = self.owners.lock().await;
        let state = owners.entry(owner).or_default();
        state.prefs_mut(&self.config).grouping_enabled = enabled;
        tracing::info!(owner = owner.0, enabled, "grouping preference updated");
    }

    /// Set the owner's maximum files per batch (clamped to at least 1)
    ///
    /// Takes effect from the owner's next job.
    pub async fn set_batch_limit(&self, owner: OwnerId, count: usize) {
        let count = count.max(1);
        let mut owners = self.owners.lock().await;
        let state = owners.entry(owner).or_default();
        state.prefs_mut(&self.config).max_batch_count = count;
        tracing::info!(owner = owner.0, count, "batch limit updated");
    }

    /// Clear a consumed password unless retention is configured
    ///
    /// Called by the job task right after an extraction attempt — the
    /// password is used at most once regardless of the outcome.
    pub(crate) async fn clear_password_after_attempt(&self, owner: OwnerId) {
        if self.config.passwords.retain_across_jobs {
            return;
        }
        let mut owners = self.owners.lock().await;
        if let Some(state) = owners.get_mut(&owner)
            && let Some(prefs) = state.prefs.as_mut()
        {
            prefs.password = None;
        }
    }
}
