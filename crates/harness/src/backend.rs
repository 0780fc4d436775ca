use std::sync::Arc;

use folhas_core::{Designer, FieldUpdates, Job, JobId, NewJob, Revision, WorkOrder};
use folhas_engine::{EngineError, Session, SessionConfig};
use folhas_storage::{RemoteStore, SqliteStore, StorageError};

/// In-memory remote store shared by any number of sessions, plus helpers to
/// seed it and to write behind a session's back.
pub struct TestBackend {
    pub store: Arc<SqliteStore>,
}

impl TestBackend {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            store: Arc::new(SqliteStore::open_in_memory()?),
        })
    }

    /// Backend whose change feed holds at most `capacity` undelivered events.
    pub fn with_feed_capacity(capacity: usize) -> Result<Self, StorageError> {
        Ok(Self {
            store: Arc::new(SqliteStore::open_in_memory_with_feed(capacity)?),
        })
    }

    pub fn remote(&self) -> Arc<dyn RemoteStore> {
        self.store.clone()
    }

    pub fn add_designer(&self, name: &str) -> Result<Designer, StorageError> {
        self.store.insert_designer(name, None, true)
    }

    pub async fn add_job(&self, work_order: u16, item: &str) -> Result<Job, Box<dyn std::error::Error>> {
        let record = NewJob {
            work_order: WorkOrder::new(work_order)?,
            item: item.to_string(),
        };
        let mut jobs = self.store.insert_jobs(&[record]).await?;
        Ok(jobs.remove(0))
    }

    /// Out-of-band write, as another user would make it.
    pub async fn touch_job(&self, id: JobId, updates: FieldUpdates) -> Result<Revision, StorageError> {
        self.store.update_job(id, &updates, None).await
    }

    pub fn stored(&self, id: JobId) -> Result<Option<Job>, StorageError> {
        self.store.get_job(id)
    }

    pub async fn session(&self) -> Result<Session, EngineError> {
        self.session_with(SessionConfig::default()).await
    }

    pub async fn session_with(&self, config: SessionConfig) -> Result<Session, EngineError> {
        Session::open(self.remote(), config).await
    }
}
