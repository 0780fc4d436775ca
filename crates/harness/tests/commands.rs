use std::sync::Arc;

use chrono::Datelike;
use folhas_core::WorkOrder;
use folhas_engine::metrics::{self, Period};
use folhas_engine::{Edit, EngineError, NewJobForm, Session, ValidationError};
use folhas_harness::{FaultyStore, TestBackend};
use folhas_storage::StorageError;

fn form(work_order: &str, items: &[&str]) -> NewJobForm {
    NewJobForm {
        work_order: work_order.to_string(),
        items: items.iter().map(|s| s.to_string()).collect(),
    }
}

// ============================================================================
// Creation
// ============================================================================

#[tokio::test]
async fn creates_one_job_per_item() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let mut session = backend.session().await?;

    let jobs = session.create_jobs(&form("1001", &["Expositor", "  ", "Caixa "])).await?;
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.work_order == WorkOrder::new(1001).unwrap()));
    assert!(jobs.iter().all(|j| !j.in_progress && !j.paginated && j.designer.is_none()));
    assert_eq!(jobs[1].item, "Caixa");
    assert_eq!(session.jobs().len(), 2);

    // The realtime echo of our own insert does not duplicate rows.
    let pumped = session.pump().await?;
    assert_eq!(pumped.applied, 2);
    assert_eq!(session.jobs().len(), 2);
    Ok(())
}

#[tokio::test]
async fn duplicate_work_order_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    backend.add_job(77, "first").await?;
    let mut session = backend.session().await?;

    let err = session.create_jobs(&form("77", &["again"])).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateWorkOrder(wo) if wo.get() == 77));
    assert_eq!(session.jobs().len(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_forms_never_reach_the_store() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let mut session = backend.session().await?;

    for bad in ["", "0", "10000", "12a"] {
        let err = session.create_jobs(&form(bad, &["x"])).await.unwrap_err();
        assert!(
            matches!(err, EngineError::Validation(ValidationError::InvalidWorkOrder(_))),
            "{bad:?}: {err}"
        );
    }
    let err = session.create_jobs(&form("5", &["", "   "])).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(ValidationError::NoItems)));
    assert_eq!(session.pump().await?.applied, 0);
    Ok(())
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn delete_drops_row_and_pending_edit() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let a = backend.add_job(1, "a").await?;
    let mut session = backend.session().await?;
    session.propose(a.id, Edit::Path("/a".into()))?;

    session.delete_job(a.id).await?;
    assert!(session.stored(a.id).is_none());
    assert!(!session.has_pending(a.id));
    assert!(backend.stored(a.id)?.is_none());

    let err = session.delete_job(a.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Storage(StorageError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn failed_delete_changes_nothing_locally() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let a = backend.add_job(1, "a").await?;
    let faulty = Arc::new(FaultyStore::new(backend.remote()));
    faulty.fail_updates_for(a.id);
    let mut session = Session::open(faulty, Default::default()).await?;
    session.propose(a.id, Edit::Path("/a".into()))?;

    assert!(session.delete_job(a.id).await.is_err());
    assert!(session.stored(a.id).is_some());
    assert!(session.has_pending(a.id));
    Ok(())
}

// ============================================================================
// Metrics over session data
// ============================================================================

#[tokio::test]
async fn metrics_count_created_jobs() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let ana = backend.add_designer("Ana")?;
    let mut session = backend.session().await?;
    let jobs = session.create_jobs(&form("300", &["a", "b"])).await?;
    session.propose(jobs[0].id, Edit::Designer(Some(ana.id)))?;
    assert!(session.flush().await.is_success());

    let year = jobs[0].created_at.year();
    let m = metrics::compute(session.jobs(), session.designers(), Period::Year(year));
    assert_eq!(m.total, 2);
    assert_eq!(m.available_years, vec![year]);
    assert_eq!(m.opened_per_month.iter().sum::<usize>(), 2);
    assert_eq!(m.top_per_designer.len(), 1);
    assert_eq!(m.top_per_designer[0].jobs.len(), 1);
    assert_eq!(m.top_per_designer[0].jobs[0].days, None);
    Ok(())
}
