pub mod config;
pub mod error;
pub mod flush;
pub mod logging;
pub mod metrics;
pub mod overlay;
pub mod row_store;
pub mod rules;
pub mod view;

pub use config::{ConfigError, SessionConfig};
pub use error::{EngineError, ValidationError};
pub use flush::{FlushReport, FlushStatus};
pub use overlay::{PendingEdit, PendingEdits};
pub use row_store::RowStore;
pub use rules::{Edit, Outcome, Rejection, Warning};
pub use view::{Row, SortDirection, SortOrder, ViewQuery};

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use folhas_core::{ChangeEvent, Designer, FieldValue, Job, JobField, JobId, NewJob, WorkOrder};
use folhas_storage::{Delivery, RemoteStore, Subscription};

/// Client time used for status transitions. Millisecond precision so a
/// pending value equals the one read back after the write.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Input of the "new job" form: one work-order number, one row per item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewJobForm {
    pub work_order: String,
    pub items: Vec<String>,
}

/// What a drain of the realtime feed did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pumped {
    pub applied: usize,
    pub refreshed: bool,
    pub closed: bool,
}

/// One user's working state: the row store, their pending edits and the
/// realtime subscription feeding it.
///
/// Every mutating call takes `&mut self`, so at most one flush (or any other
/// state transition) is ever in flight.
pub struct Session {
    remote: Arc<dyn RemoteStore>,
    config: SessionConfig,
    rows: RowStore,
    pending: PendingEdits,
    feed: Option<Subscription>,
}

impl Session {
    /// Subscribe, then load. A failed initial load is returned to the caller
    /// and no session exists until a retry succeeds.
    pub async fn open(remote: Arc<dyn RemoteStore>, config: SessionConfig) -> Result<Self, EngineError> {
        let feed = remote.subscribe();
        let mut rows = RowStore::new();
        rows.load(remote.as_ref()).await?;
        tracing::info!(jobs = rows.jobs().len(), "session opened");
        Ok(Self {
            remote,
            config,
            rows,
            pending: PendingEdits::new(),
            feed: Some(feed),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn jobs(&self) -> &[Job] {
        self.rows.jobs()
    }

    pub fn designers(&self) -> &[Designer] {
        self.rows.designers()
    }

    pub fn stored(&self, id: JobId) -> Option<&Job> {
        self.rows.get(id)
    }

    pub fn pending(&self) -> &PendingEdits {
        &self.pending
    }

    pub fn has_pending(&self, id: JobId) -> bool {
        self.pending.has(id)
    }

    pub async fn refresh(&mut self) -> Result<(), EngineError> {
        self.rows.load(self.remote.as_ref()).await
    }

    // ========================================================================
    // Editing
    // ========================================================================

    pub fn propose(&mut self, id: JobId, edit: Edit) -> Result<Outcome, EngineError> {
        self.propose_at(id, edit, now())
    }

    /// `propose` with an explicit transition time.
    pub fn propose_at(&mut self, id: JobId, edit: Edit, at: DateTime<Utc>) -> Result<Outcome, EngineError> {
        let stored = self.rows.get(id).ok_or(EngineError::JobNotFound(id))?;
        let current = view::effective_job(stored, self.pending.get(id));
        let outcome = rules::apply(&current, &edit, at);
        match &outcome {
            Outcome::Accepted { updates, warning } => {
                if let Some(w) = warning {
                    tracing::info!(%id, "{w}");
                }
                self.pending.propose(id, updates.clone(), Some(stored.revision));
            }
            Outcome::Rejected(reason) => {
                tracing::info!(%id, ?edit, "edit rejected: {reason}");
            }
        }
        Ok(outcome)
    }

    pub fn discard(&mut self, id: JobId) -> bool {
        self.pending.clear(id).is_some()
    }

    pub fn discard_all(&mut self) {
        self.pending.clear_all();
    }

    // ========================================================================
    // Reading
    // ========================================================================

    pub fn effective(&self, id: JobId, field: JobField) -> Option<FieldValue> {
        let job = self.rows.get(id)?;
        Some(view::effective(job, self.pending.get(id), field))
    }

    pub fn effective_job(&self, id: JobId) -> Option<Job> {
        let job = self.rows.get(id)?;
        Some(view::effective_job(job, self.pending.get(id)))
    }

    pub fn rows(&self, query: &ViewQuery) -> Vec<Row> {
        view::rows(self.rows.jobs(), &self.pending, self.rows.designers(), query)
    }

    pub fn default_query(&self) -> ViewQuery {
        self.config.default_query()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub async fn flush(&mut self) -> FlushReport {
        flush::flush(self.remote.as_ref(), &mut self.rows, &mut self.pending).await
    }

    pub async fn create_jobs(&mut self, form: &NewJobForm) -> Result<Vec<Job>, EngineError> {
        let work_order = WorkOrder::parse(&form.work_order)
            .map_err(|_| ValidationError::InvalidWorkOrder(form.work_order.trim().to_string()))?;
        let records: Vec<NewJob> = form
            .items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(|item| NewJob {
                work_order,
                item: item.to_string(),
            })
            .collect();
        if records.is_empty() {
            return Err(ValidationError::NoItems.into());
        }

        if self.remote.count_work_order(work_order).await? > 0 {
            return Err(EngineError::DuplicateWorkOrder(work_order));
        }

        let jobs = self.remote.insert_jobs(&records).await?;
        tracing::info!(%work_order, count = jobs.len(), "jobs created");
        for job in &jobs {
            self.rows
                .apply_remote_event(&ChangeEvent::Inserted { job: job.clone() });
        }
        Ok(jobs)
    }

    pub async fn delete_job(&mut self, id: JobId) -> Result<(), EngineError> {
        self.remote.delete_job(id).await?;
        tracing::info!(%id, "job deleted");
        self.rows.remove(id);
        self.pending.clear(id);
        Ok(())
    }

    // ========================================================================
    // Realtime
    // ========================================================================

    /// Merge one pushed change into the row store. Pending edits are left
    /// alone.
    pub fn ingest(&mut self, event: &ChangeEvent) {
        tracing::debug!(id = %event.job_id(), kind = event.kind_name(), "change received");
        self.rows.apply_remote_event(event);
    }

    async fn handle(&mut self, delivery: Delivery, out: &mut Pumped) -> Result<(), EngineError> {
        match delivery {
            Delivery::Event(event) => {
                self.ingest(&event);
                out.applied += 1;
            }
            Delivery::Lagged(missed) => {
                tracing::warn!(missed, "change feed lagged");
                if self.config.refresh_on_lag && !out.refreshed {
                    self.refresh().await?;
                    out.refreshed = true;
                }
            }
            Delivery::Closed => {
                tracing::warn!("change feed closed");
                self.feed = None;
                out.closed = true;
            }
        }
        Ok(())
    }

    /// Apply everything already queued on the feed without waiting.
    pub async fn pump(&mut self) -> Result<Pumped, EngineError> {
        let mut out = Pumped::default();
        loop {
            let Some(delivery) = self.feed.as_mut().and_then(Subscription::try_next) else {
                break;
            };
            self.handle(delivery, &mut out).await?;
            if out.closed {
                break;
            }
        }
        Ok(out)
    }

    /// Wait for the next delivery and apply it. Returns immediately with
    /// `closed` set if there is no feed.
    pub async fn next_change(&mut self) -> Result<Pumped, EngineError> {
        let mut out = Pumped::default();
        let delivery = match self.feed.as_mut() {
            Some(feed) => feed.next().await,
            None => Delivery::Closed,
        };
        self.handle(delivery, &mut out).await?;
        Ok(out)
    }

    pub fn unsubscribe(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.unsubscribe();
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.feed.is_some()
    }
}
