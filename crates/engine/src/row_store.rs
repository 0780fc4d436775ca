use folhas_core::{ChangeEvent, Designer, DesignerId, Job, JobId, Revision};
use folhas_storage::RemoteStore;

use crate::error::EngineError;

/// Last-fetched snapshot of jobs and the active designer roster.
///
/// Jobs are kept newest first. Nothing here validates edits or reads the
/// pending overlay.
#[derive(Debug, Default)]
pub struct RowStore {
    designers: Vec<Designer>,
    jobs: Vec<Job>,
}

impl RowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a fresh fetch. On error the previous
    /// snapshot is left untouched.
    pub async fn load(&mut self, remote: &dyn RemoteStore) -> Result<(), EngineError> {
        let designers = remote.fetch_designers(true).await?;
        let jobs = remote.fetch_jobs().await?;
        tracing::debug!(jobs = jobs.len(), designers = designers.len(), "row store loaded");
        self.designers = designers;
        self.jobs = jobs;
        Ok(())
    }

    pub fn apply_remote_event(&mut self, event: &ChangeEvent) {
        match event {
            ChangeEvent::Inserted { job } => {
                if !self.contains(job.id) {
                    self.jobs.insert(0, job.clone());
                }
            }
            ChangeEvent::Updated { id, changes, revision } => {
                let Some(job) = self.jobs.iter_mut().find(|j| j.id == *id) else {
                    return;
                };
                if let Err(e) = job.apply(changes) {
                    tracing::warn!(%id, "remote update does not apply: {e}");
                }
                job.revision = *revision;
            }
            ChangeEvent::Deleted { id } => self.remove(*id),
        }
    }

    pub fn remove(&mut self, id: JobId) {
        self.jobs.retain(|j| j.id != id);
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.get(id).is_some()
    }

    pub fn revision(&self, id: JobId) -> Option<Revision> {
        self.get(id).map(|j| j.revision)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn designers(&self) -> &[Designer] {
        &self.designers
    }

    pub fn designer(&self, id: DesignerId) -> Option<&Designer> {
        self.designers.iter().find(|d| d.id == id)
    }
}
