use std::collections::BTreeMap;

use async_trait::async_trait;
use folhas_core::{ChangeEvent, Designer, FieldUpdates, Job, JobId, NewJob, Revision, WorkOrder};
use tokio::sync::broadcast;

use crate::error::StorageError;

/// Remote persistence collaborator for jobs and designers.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All jobs, newest first by creation time.
    async fn fetch_jobs(&self) -> Result<Vec<Job>, StorageError>;

    async fn fetch_designers(&self, active_only: bool) -> Result<Vec<Designer>, StorageError>;

    /// Current revision of each requested job. Ids that no longer exist are
    /// absent from the result.
    async fn fetch_revisions(&self, ids: &[JobId]) -> Result<BTreeMap<JobId, Revision>, StorageError>;

    /// Write `updates` and stamp a fresh revision, which is returned.
    /// With `expected` set, the write only happens if the stored revision
    /// still equals it; otherwise `StorageError::RevisionMismatch`.
    async fn update_job(
        &self,
        id: JobId,
        updates: &FieldUpdates,
        expected: Option<Revision>,
    ) -> Result<Revision, StorageError>;

    async fn delete_job(&self, id: JobId) -> Result<(), StorageError>;

    async fn insert_jobs(&self, records: &[NewJob]) -> Result<Vec<Job>, StorageError>;

    async fn count_work_order(&self, work_order: WorkOrder) -> Result<u64, StorageError>;

    /// Start receiving change events for every job write made after this call.
    fn subscribe(&self) -> Subscription;
}

/// One step of a realtime subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Event(ChangeEvent),
    /// The subscriber fell behind and this many events were dropped.
    Lagged(u64),
    Closed,
}

/// Handle on the change feed. Dropping it unsubscribes.
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next delivery.
    pub async fn next(&mut self) -> Delivery {
        match self.rx.recv().await {
            Ok(event) => Delivery::Event(event),
            Err(broadcast::error::RecvError::Lagged(n)) => Delivery::Lagged(n),
            Err(broadcast::error::RecvError::Closed) => Delivery::Closed,
        }
    }

    /// Non-blocking variant; `None` when nothing is queued.
    pub fn try_next(&mut self) -> Option<Delivery> {
        match self.rx.try_recv() {
            Ok(event) => Some(Delivery::Event(event)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Lagged(n)) => Some(Delivery::Lagged(n)),
            Err(broadcast::error::TryRecvError::Closed) => Some(Delivery::Closed),
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}
