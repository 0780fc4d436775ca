use std::sync::Arc;

use folhas_core::{FieldUpdates, FieldValue, JobField, StatusFlag};
use folhas_engine::{Edit, FlushStatus, Session, SessionConfig};
use folhas_harness::{FaultyStore, TestBackend};
use folhas_storage::RemoteStore;

// ============================================================================
// Conflicts and partial success
// ============================================================================

#[tokio::test]
async fn stale_row_is_conflicted_and_others_still_save() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let a = backend.add_job(1001, "a").await?;
    let b = backend.add_job(1002, "b").await?;
    let mut session = backend.session().await?;

    session.propose(a.id, Edit::Path("/srv/a".into()))?;
    session.propose(b.id, Edit::Path("/srv/b".into()))?;
    backend
        .touch_job(b.id, FieldUpdates::new().flag(StatusFlag::MockupSent, true))
        .await?;

    let report = session.flush().await;
    assert_eq!(report.status, FlushStatus::Partial);
    assert_eq!(report.succeeded, vec![a.id]);
    assert_eq!(report.conflicted, vec![b.id]);
    assert!(report.failed.is_empty());

    assert!(!session.has_pending(a.id));
    assert!(session.has_pending(b.id));
    assert_eq!(backend.stored(a.id)?.unwrap().path.as_deref(), Some("/srv/a"));
    assert_eq!(backend.stored(b.id)?.unwrap().path, None);

    // Reloaded after the flush: the other user's change is now visible
    // underneath the still-pending path.
    let b_view = session.effective_job(b.id).unwrap();
    assert!(b_view.mockup_sent);
    assert_eq!(b_view.path.as_deref(), Some("/srv/b"));
    Ok(())
}

#[tokio::test]
async fn conflicted_edit_can_be_flushed_again() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let a = backend.add_job(5, "a").await?;
    let mut session = backend.session().await?;

    session.propose(a.id, Edit::Path("/mine".into()))?;
    backend.touch_job(a.id, FieldUpdates::new().path("/theirs")).await?;

    let first = session.flush().await;
    assert_eq!(first.status, FlushStatus::Failure);
    assert_eq!(first.conflicted, vec![a.id]);
    assert_eq!(session.stored(a.id).unwrap().path.as_deref(), Some("/theirs"));

    let second = session.flush().await;
    assert!(second.is_success());
    assert_eq!(backend.stored(a.id)?.unwrap().path.as_deref(), Some("/mine"));
    Ok(())
}

#[tokio::test]
async fn empty_flush_is_informational() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    backend.add_job(1, "a").await?;
    let faulty = Arc::new(FaultyStore::new(backend.remote()));
    let mut session = Session::open(faulty.clone(), SessionConfig::default()).await?;

    let report = session.flush().await;
    assert_eq!(report.status, FlushStatus::NothingToSave);
    assert_eq!(faulty.update_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn prevalidation_failure_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let a = backend.add_job(1001, "a").await?;
    let b = backend.add_job(1002, "b").await?;
    let c = backend.add_job(1003, "c").await?;
    let faulty = Arc::new(FaultyStore::new(backend.remote()));
    let mut session = Session::open(faulty.clone(), SessionConfig::default()).await?;

    session.propose(a.id, Edit::Flag(StatusFlag::Paginated, true))?;
    session.propose(b.id, Edit::Path("/srv/b".into()))?;
    session.propose(c.id, Edit::Flag(StatusFlag::Paginated, true))?;

    let report = session.flush().await;
    let msg = report.message();
    assert!(matches!(report.status, FlushStatus::Rejected(_)));
    assert!(msg.contains("FO 1001"), "{msg}");
    assert!(msg.contains("FO 1003"), "{msg}");
    assert_eq!(faulty.update_calls(), 0);
    assert_eq!(session.pending().len(), 3);
    Ok(())
}

// ============================================================================
// Remote failures
// ============================================================================

#[tokio::test]
async fn write_error_is_a_per_row_failure() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let a = backend.add_job(1, "a").await?;
    let b = backend.add_job(2, "b").await?;
    let faulty = Arc::new(FaultyStore::new(backend.remote()));
    faulty.fail_updates_for(a.id);
    let mut session = Session::open(faulty.clone(), SessionConfig::default()).await?;

    session.propose(a.id, Edit::Path("/a".into()))?;
    session.propose(b.id, Edit::Path("/b".into()))?;

    let report = session.flush().await;
    assert_eq!(report.status, FlushStatus::Partial);
    assert_eq!(report.failed, vec![a.id]);
    assert_eq!(report.succeeded, vec![b.id]);
    assert!(report.conflicted.is_empty());
    assert!(session.has_pending(a.id));
    assert!(!session.has_pending(b.id));
    assert_eq!(faulty.update_calls(), 2);
    Ok(())
}

#[tokio::test]
async fn revision_fetch_failure_fails_every_row() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let a = backend.add_job(1, "a").await?;
    let faulty = Arc::new(FaultyStore::new(backend.remote()));
    let mut session = Session::open(faulty.clone(), SessionConfig::default()).await?;
    session.propose(a.id, Edit::Path("/a".into()))?;

    faulty.set_fail_revisions(true);
    let report = session.flush().await;
    assert_eq!(report.status, FlushStatus::Failure);
    assert_eq!(report.failed, vec![a.id]);
    assert_eq!(faulty.update_calls(), 0);
    assert!(session.has_pending(a.id));

    faulty.set_fail_revisions(false);
    assert!(session.flush().await.is_success());
    Ok(())
}

#[tokio::test]
async fn reload_failure_is_reported_but_writes_stand() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let a = backend.add_job(1, "a").await?;
    let faulty = Arc::new(FaultyStore::new(backend.remote()));
    let mut session = Session::open(faulty.clone(), SessionConfig::default()).await?;
    session.propose(a.id, Edit::Path("/a".into()))?;

    faulty.set_fail_fetch(true);
    let report = session.flush().await;
    assert!(report.is_success());
    assert!(report.refresh_error.is_some());
    assert!(report.message().contains("reload failed"));
    assert_eq!(backend.stored(a.id)?.unwrap().path.as_deref(), Some("/a"));
    Ok(())
}

#[tokio::test]
async fn failed_initial_load_yields_no_session() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let faulty = Arc::new(FaultyStore::new(backend.remote()));
    faulty.set_fail_fetch(true);
    assert!(Session::open(faulty.clone(), SessionConfig::default()).await.is_err());

    faulty.set_fail_fetch(false);
    assert!(Session::open(faulty, SessionConfig::default()).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn job_deleted_remotely_is_conflicted_then_dropped() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let a = backend.add_job(1, "a").await?;
    let mut session = backend.session().await?;
    session.propose(a.id, Edit::Path("/a".into()))?;

    backend.store.delete_job(a.id).await?;
    let report = session.flush().await;
    assert_eq!(report.conflicted, vec![a.id]);
    assert!(!session.has_pending(a.id));
    assert!(session.stored(a.id).is_none());
    Ok(())
}

#[tokio::test]
async fn completion_timestamp_round_trips() -> Result<(), Box<dyn std::error::Error>> {
    let backend = TestBackend::new()?;
    let a = backend.add_job(1, "a").await?;
    let mut session = backend.session().await?;

    let at = folhas_engine::now();
    session.propose(a.id, Edit::Path("/a".into()))?;
    session.propose_at(a.id, Edit::Flag(StatusFlag::Paginated, true), at)?;
    assert!(session.flush().await.is_success());

    let stored = backend.stored(a.id)?.unwrap();
    assert!(stored.paginated);
    assert_eq!(stored.completed_at, Some(at));
    assert_eq!(
        session.effective(a.id, JobField::CompletedAt),
        Some(FieldValue::Timestamp(at))
    );
    Ok(())
}
