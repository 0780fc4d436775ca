use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use folhas_core::{Designer, FieldUpdates, Job, JobId, NewJob, Revision, WorkOrder};
use folhas_storage::{RemoteStore, StorageError, Subscription};

/// `RemoteStore` wrapper that injects transport failures on demand and
/// counts writes.
pub struct FaultyStore {
    inner: Arc<dyn RemoteStore>,
    failing_updates: Mutex<BTreeSet<JobId>>,
    fail_fetch: AtomicBool,
    fail_revisions: AtomicBool,
    update_calls: AtomicUsize,
}

fn injected(what: &str) -> StorageError {
    StorageError::Transport(format!("injected failure: {what}"))
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn RemoteStore>) -> Self {
        Self {
            inner,
            failing_updates: Mutex::new(BTreeSet::new()),
            fail_fetch: AtomicBool::new(false),
            fail_revisions: AtomicBool::new(false),
            update_calls: AtomicUsize::new(0),
        }
    }

    /// Make every `update_job` for `id` fail.
    pub fn fail_updates_for(&self, id: JobId) {
        if let Ok(mut set) = self.failing_updates.lock() {
            set.insert(id);
        }
    }

    pub fn set_fail_fetch(&self, on: bool) {
        self.fail_fetch.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_revisions(&self, on: bool) {
        self.fail_revisions.store(on, Ordering::SeqCst);
    }

    /// Number of `update_job` calls that reached this wrapper.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn update_fails(&self, id: JobId) -> Result<bool, StorageError> {
        let set = self.failing_updates.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(set.contains(&id))
    }
}

#[async_trait]
impl RemoteStore for FaultyStore {
    async fn fetch_jobs(&self) -> Result<Vec<Job>, StorageError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(injected("fetch_jobs"));
        }
        self.inner.fetch_jobs().await
    }

    async fn fetch_designers(&self, active_only: bool) -> Result<Vec<Designer>, StorageError> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(injected("fetch_designers"));
        }
        self.inner.fetch_designers(active_only).await
    }

    async fn fetch_revisions(&self, ids: &[JobId]) -> Result<BTreeMap<JobId, Revision>, StorageError> {
        if self.fail_revisions.load(Ordering::SeqCst) {
            return Err(injected("fetch_revisions"));
        }
        self.inner.fetch_revisions(ids).await
    }

    async fn update_job(
        &self,
        id: JobId,
        updates: &FieldUpdates,
        expected: Option<Revision>,
    ) -> Result<Revision, StorageError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.update_fails(id)? {
            return Err(injected("update_job"));
        }
        self.inner.update_job(id, updates, expected).await
    }

    async fn delete_job(&self, id: JobId) -> Result<(), StorageError> {
        if self.update_fails(id)? {
            return Err(injected("delete_job"));
        }
        self.inner.delete_job(id).await
    }

    async fn insert_jobs(&self, records: &[NewJob]) -> Result<Vec<Job>, StorageError> {
        self.inner.insert_jobs(records).await
    }

    async fn count_work_order(&self, work_order: WorkOrder) -> Result<u64, StorageError> {
        self.inner.count_work_order(work_order).await
    }

    fn subscribe(&self) -> Subscription {
        self.inner.subscribe()
    }
}
