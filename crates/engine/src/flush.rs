//! Commit pending edits to the remote store.

use std::fmt::Write as _;

use folhas_core::{JobId, WorkOrder};
use folhas_storage::RemoteStore;

use crate::error::ValidationError;
use crate::overlay::PendingEdits;
use crate::row_store::RowStore;
use crate::view::effective_job;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushStatus {
    /// Nothing was pending. Informational, not an error.
    NothingToSave,
    /// Pre-validation failed; no write was attempted.
    Rejected(ValidationError),
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub status: FlushStatus,
    pub succeeded: Vec<JobId>,
    pub conflicted: Vec<JobId>,
    pub failed: Vec<JobId>,
    /// Set when the post-flush reload failed. The writes themselves stand.
    pub refresh_error: Option<String>,
}

impl FlushReport {
    fn with_status(status: FlushStatus) -> Self {
        Self {
            status,
            succeeded: Vec::new(),
            conflicted: Vec::new(),
            failed: Vec::new(),
            refresh_error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FlushStatus::Success
    }

    /// Short user-facing summary.
    pub fn message(&self) -> String {
        let mut msg = match &self.status {
            FlushStatus::NothingToSave => "nothing to save".to_string(),
            FlushStatus::Rejected(e) => e.to_string(),
            FlushStatus::Success => format!("saved {} job(s)", self.succeeded.len()),
            FlushStatus::Partial => format!(
                "saved {} job(s); {} conflicted, {} failed",
                self.succeeded.len(),
                self.conflicted.len(),
                self.failed.len()
            ),
            FlushStatus::Failure => format!(
                "nothing saved; {} conflicted, {} failed",
                self.conflicted.len(),
                self.failed.len()
            ),
        };
        if let Some(e) = &self.refresh_error {
            let _ = write!(msg, " (reload failed: {e})");
        }
        msg
    }
}

/// Paginated jobs whose effective path is blank, by work order.
fn missing_paths(rows: &RowStore, pending: &PendingEdits) -> Vec<WorkOrder> {
    pending
        .all()
        .iter()
        .filter_map(|(id, edit)| {
            let job = effective_job(rows.get(*id)?, Some(edit));
            (job.paginated && !job.has_path()).then_some(job.work_order)
        })
        .collect()
}

pub async fn flush(
    remote: &dyn RemoteStore,
    rows: &mut RowStore,
    pending: &mut PendingEdits,
) -> FlushReport {
    if pending.is_empty() {
        return FlushReport::with_status(FlushStatus::NothingToSave);
    }

    let missing = missing_paths(rows, pending);
    if !missing.is_empty() {
        let err = ValidationError::PathRequired {
            work_orders: missing,
        };
        tracing::info!("flush rejected: {err}");
        return FlushReport::with_status(FlushStatus::Rejected(err));
    }

    let snapshot = pending.snapshot();
    let ids: Vec<JobId> = snapshot.keys().copied().collect();
    tracing::info!(jobs = ids.len(), "flushing pending edits");

    let mut report = FlushReport::with_status(FlushStatus::Failure);
    let server = match remote.fetch_revisions(&ids).await {
        Ok(revs) => revs,
        Err(e) => {
            tracing::warn!("revision fetch failed, nothing written: {e}");
            report.failed = ids;
            return report;
        }
    };

    for (id, edit) in &snapshot {
        let Some(current) = server.get(id).copied() else {
            tracing::info!(%id, "job no longer exists remotely");
            report.conflicted.push(*id);
            continue;
        };
        let baseline = edit.baseline.unwrap_or(current);
        if current != baseline {
            tracing::info!(%id, ?baseline, ?current, "job changed since edit began");
            report.conflicted.push(*id);
            continue;
        }

        match remote.update_job(*id, &edit.updates, Some(current)).await {
            Ok(revision) => {
                tracing::debug!(%id, ?revision, "job saved");
                report.succeeded.push(*id);
            }
            Err(e) if e.is_conflict() => {
                tracing::info!(%id, "job changed during flush: {e}");
                report.conflicted.push(*id);
            }
            Err(e) => {
                tracing::warn!(%id, "job write failed: {e}");
                report.failed.push(*id);
            }
        }
    }

    for id in &report.succeeded {
        pending.clear(*id);
    }

    if !report.succeeded.is_empty() || !report.conflicted.is_empty() {
        match rows.load(remote).await {
            Ok(()) => {
                pending.retain(|id| rows.contains(id));
                // Conflicted edits now sit on the reloaded row; a second
                // flush overwrites it.
                for id in &report.conflicted {
                    if let Some(rev) = rows.revision(*id) {
                        pending.rebase(*id, rev);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("reload after flush failed: {e}");
                report.refresh_error = Some(e.to_string());
            }
        }
    }

    report.status = if report.succeeded.len() == snapshot.len() {
        FlushStatus::Success
    } else if report.succeeded.is_empty() {
        FlushStatus::Failure
    } else {
        FlushStatus::Partial
    };
    tracing::info!(
        succeeded = report.succeeded.len(),
        conflicted = report.conflicted.len(),
        failed = report.failed.len(),
        "flush finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use folhas_core::{FieldUpdates, NewJob, StatusFlag};
    use folhas_storage::SqliteStore;

    async fn seeded(n: usize) -> (SqliteStore, RowStore) {
        let store = SqliteStore::open_in_memory().unwrap();
        let records: Vec<NewJob> = (1..=n)
            .map(|i| NewJob {
                work_order: WorkOrder::new(1000 + i as u16).unwrap(),
                item: format!("item {i}"),
            })
            .collect();
        store.insert_jobs(&records).await.unwrap();
        let mut rows = RowStore::new();
        rows.load(&store).await.unwrap();
        (store, rows)
    }

    #[tokio::test]
    async fn empty_overlay_is_informational() {
        let (store, mut rows) = seeded(1).await;
        let report = flush(&store, &mut rows, &mut PendingEdits::new()).await;
        assert_eq!(report.status, FlushStatus::NothingToSave);
        assert_eq!(report.message(), "nothing to save");
    }

    #[tokio::test]
    async fn blank_path_aborts_whole_batch() {
        let (store, mut rows) = seeded(2).await;
        let (a, b) = (rows.jobs()[0].clone(), rows.jobs()[1].clone());
        let mut pending = PendingEdits::new();
        pending.propose(a.id, FieldUpdates::new().path("/ok"), Some(a.revision));
        pending.propose(b.id, FieldUpdates::new().flag(StatusFlag::Paginated, true), Some(b.revision));

        let report = flush(&store, &mut rows, &mut pending).await;
        assert_eq!(
            report.status,
            FlushStatus::Rejected(ValidationError::PathRequired {
                work_orders: vec![b.work_order]
            })
        );
        assert_eq!(pending.len(), 2);
        assert_eq!(store.get_job(a.id).unwrap().unwrap().path, None);
    }

    #[tokio::test]
    async fn successful_rows_are_cleared_and_reloaded() {
        let (store, mut rows) = seeded(1).await;
        let a = rows.jobs()[0].clone();
        let mut pending = PendingEdits::new();
        pending.propose(a.id, FieldUpdates::new().path("/srv/a"), Some(a.revision));

        let report = flush(&store, &mut rows, &mut pending).await;
        assert!(report.is_success());
        assert_eq!(report.succeeded, vec![a.id]);
        assert!(pending.is_empty());
        let reloaded = rows.get(a.id).unwrap();
        assert_eq!(reloaded.path.as_deref(), Some("/srv/a"));
        assert!(reloaded.revision > a.revision);
    }

    #[tokio::test]
    async fn conflicted_edit_is_kept_and_rebased() {
        let (store, mut rows) = seeded(1).await;
        let a = rows.jobs()[0].clone();
        let mut pending = PendingEdits::new();
        pending.propose(a.id, FieldUpdates::new().path("/mine"), Some(a.revision));
        store
            .update_job(a.id, &FieldUpdates::new().path("/theirs"), None)
            .await
            .unwrap();

        let report = flush(&store, &mut rows, &mut pending).await;
        assert_eq!(report.status, FlushStatus::Failure);
        assert_eq!(report.conflicted, vec![a.id]);
        assert_eq!(rows.get(a.id).unwrap().path.as_deref(), Some("/theirs"));
        let edit = pending.get(a.id).unwrap();
        assert_eq!(edit.baseline, rows.revision(a.id));

        let again = flush(&store, &mut rows, &mut pending).await;
        assert!(again.is_success());
        assert_eq!(rows.get(a.id).unwrap().path.as_deref(), Some("/mine"));
    }
}
