//! Per-owner status queries.

use crate::types::{OwnerId, OwnerStatus};

use super::Dispatcher;

impl Dispatcher {
    /// Answer a status query for one owner
    ///
    /// Reports the active job's summary and the depth of the pending queue,
    /// or idleness when nothing is in flight. Parked jobs are counted
    /// separately — they are waiting on the owner, not on the engine.
    pub async fn status_of(&self, owner: OwnerId) -> OwnerStatus {
        let owners = self.owners.lock().await;
        let Some(state) = owners.get(&owner) else {
            return OwnerStatus::Idle;
        };

        match &state.active {
            Some(active) => OwnerStatus::Active {
                job: active.summary(),
                pending: state.pending.len(),
                parked: state.parked.len(),
            },
            None if state.pending.is_empty() && state.parked.is_empty() => OwnerStatus::Idle,
            None => OwnerStatus::Queued {
                pending: state.pending.len(),
                parked: state.parked.len(),
            },
        }
    }
}
