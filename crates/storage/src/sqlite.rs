use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::broadcast;

use folhas_core::{
    ChangeEvent, Designer, DesignerId, FieldUpdates, FieldValue, Job, JobField, JobId, NewJob,
    Revision, RevisionClock, WorkOrder,
};

use crate::error::StorageError;
use crate::traits::{RemoteStore, Subscription};

/// Default number of change events buffered per subscriber before it lags.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

const JOB_COLUMNS: &str = "id, work_order, item, created_at, designer_id, in_progress, has_questions, \
     mockup_sent, paginated, questions_at, mockup_sent_at, completed_at, path, revision";

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn from_millis(ms: i64, label: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::Serialization(format!("{label} out of range: {ms}")))
}

fn opt_millis(ms: Option<i64>, label: &str) -> Result<Option<DateTime<Utc>>, StorageError> {
    ms.map(|ms| from_millis(ms, label)).transpose()
}

fn column(field: JobField) -> &'static str {
    match field {
        JobField::Designer => "designer_id",
        other => other.as_str(),
    }
}

fn to_sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Integer(n) => Value::Integer(*n),
        FieldValue::Boolean(b) => Value::Integer(i64::from(*b)),
        FieldValue::Timestamp(t) => Value::Integer(t.timestamp_millis()),
        FieldValue::DesignerRef(id) => Value::Blob(id.as_bytes().to_vec()),
    }
}

/// Tunnel a StorageError out of a query_map closure.
fn tunnel(e: StorageError) -> rusqlite::Error {
    match e {
        StorageError::Sqlite(sq) => sq,
        other => rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Blob,
            Box::new(OpaqueStorageError(other.to_string())),
        ),
    }
}

fn read_job(row: &rusqlite::Row) -> Result<Job, StorageError> {
    let id_bytes: Vec<u8> = row.get(0)?;
    let work_order: i64 = row.get(1)?;
    let designer_bytes: Option<Vec<u8>> = row.get(4)?;
    let revision_bytes: Vec<u8> = row.get(13)?;

    let designer = designer_bytes
        .map(|b| to_array::<16>(b, "designer_id").map(DesignerId::from_bytes))
        .transpose()?;

    Ok(Job {
        id: JobId::from_bytes(to_array::<16>(id_bytes, "id")?),
        work_order: WorkOrder::from_i64(work_order)?,
        item: row.get(2)?,
        created_at: from_millis(row.get(3)?, "created_at")?,
        designer,
        in_progress: row.get(5)?,
        has_questions: row.get(6)?,
        mockup_sent: row.get(7)?,
        paginated: row.get(8)?,
        questions_at: opt_millis(row.get(9)?, "questions_at")?,
        mockup_sent_at: opt_millis(row.get(10)?, "mockup_sent_at")?,
        completed_at: opt_millis(row.get(11)?, "completed_at")?,
        path: row.get(12)?,
        revision: Revision::from_bytes(&to_array::<12>(revision_bytes, "revision")?),
    })
}

fn read_designer(row: &rusqlite::Row) -> Result<Designer, StorageError> {
    let id_bytes: Vec<u8> = row.get(0)?;
    Ok(Designer {
        id: DesignerId::from_bytes(to_array::<16>(id_bytes, "designer id")?),
        name: row.get(1)?,
        email: row.get(2)?,
        active: row.get(3)?,
    })
}

struct Inner {
    conn: Connection,
    clock: RevisionClock,
}

/// Reference `RemoteStore` backed by a single SQLite connection.
///
/// Every successful write is published on an in-process broadcast channel,
/// which is what `subscribe` hands out.
pub struct SqliteStore {
    inner: Mutex<Inner>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::from_connection(Connection::open(path)?, DEFAULT_FEED_CAPACITY)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::open_in_memory_with_feed(DEFAULT_FEED_CAPACITY)
    }

    pub fn open_in_memory_with_feed(capacity: usize) -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?, capacity)
    }

    fn from_connection(conn: Connection, capacity: usize) -> Result<Self, StorageError> {
        crate::schema::init_schema(&conn)?;

        // Revisions must keep increasing across reopen.
        let mut clock = RevisionClock::new();
        let latest: Option<Vec<u8>> = conn
            .query_row(
                "SELECT revision FROM jobs ORDER BY revision DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(bytes) = latest {
            clock.observe(Revision::from_slice(&bytes)?);
        }

        let (changes, _) = broadcast::channel(capacity.max(1));
        Ok(Self {
            inner: Mutex::new(Inner { conn, clock }),
            changes,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn publish(&self, event: ChangeEvent) {
        let kind = event.kind_name();
        let id = event.job_id();
        if let Err(e) = self.changes.send(event) {
            tracing::debug!(%id, kind, "no change subscribers: {e}");
        }
    }

    fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }

    // ========================================================================
    // Designers (administered out of band)
    // ========================================================================

    pub fn insert_designer(
        &self,
        name: &str,
        email: Option<&str>,
        active: bool,
    ) -> Result<Designer, StorageError> {
        let designer = Designer {
            id: DesignerId::new(),
            name: name.to_string(),
            email: email.map(str::to_string),
            active,
        };
        let inner = self.lock()?;
        inner.conn.execute(
            "INSERT INTO designers (id, name, email, active) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                designer.id.as_bytes().as_slice(),
                designer.name,
                designer.email,
                designer.active,
            ],
        )?;
        Ok(designer)
    }

    pub fn set_designer_active(&self, id: DesignerId, active: bool) -> Result<(), StorageError> {
        let inner = self.lock()?;
        let n = inner.conn.execute(
            "UPDATE designers SET active = ?1 WHERE id = ?2",
            rusqlite::params![active, id.as_bytes().as_slice()],
        )?;
        if n == 0 {
            return Err(StorageError::NotFound(format!("designer {id}")));
        }
        Ok(())
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    pub fn get_job(&self, id: JobId) -> Result<Option<Job>, StorageError> {
        let inner = self.lock()?;
        let job = inner
            .conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                rusqlite::params![id.as_bytes().as_slice()],
                |row| read_job(row).map_err(tunnel),
            )
            .optional()?;
        Ok(job)
    }

    fn load_jobs(&self) -> Result<Vec<Job>, StorageError> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC, rowid DESC"
        ))?;
        let jobs = stmt
            .query_map([], |row| read_job(row).map_err(tunnel))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn load_designers(&self, active_only: bool) -> Result<Vec<Designer>, StorageError> {
        let inner = self.lock()?;
        let sql = if active_only {
            "SELECT id, name, email, active FROM designers WHERE active = 1 ORDER BY name"
        } else {
            "SELECT id, name, email, active FROM designers ORDER BY name"
        };
        let mut stmt = inner.conn.prepare(sql)?;
        let designers = stmt
            .query_map([], |row| read_designer(row).map_err(tunnel))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(designers)
    }

    fn load_revisions(&self, ids: &[JobId]) -> Result<BTreeMap<JobId, Revision>, StorageError> {
        let inner = self.lock()?;
        let mut stmt = inner.conn.prepare("SELECT revision FROM jobs WHERE id = ?1")?;
        let mut out = BTreeMap::new();
        for id in ids {
            let bytes: Option<Vec<u8>> = stmt
                .query_row(rusqlite::params![id.as_bytes().as_slice()], |row| row.get(0))
                .optional()?;
            if let Some(bytes) = bytes {
                out.insert(*id, Revision::from_slice(&bytes)?);
            }
        }
        Ok(out)
    }

    fn write_job(
        &self,
        id: JobId,
        updates: &FieldUpdates,
        expected: Option<Revision>,
    ) -> Result<Revision, StorageError> {
        let revision = {
            let mut guard = self.lock()?;
            let Inner { conn, clock } = &mut *guard;
            let tx = conn.transaction()?;

            let current: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT revision FROM jobs WHERE id = ?1",
                    rusqlite::params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            let current = match current {
                Some(bytes) => Revision::from_slice(&bytes)?,
                None => return Err(StorageError::NotFound(format!("job {id}"))),
            };
            if let Some(expected) = expected
                && expected != current
            {
                return Err(StorageError::RevisionMismatch {
                    id,
                    expected,
                    actual: current,
                });
            }

            let revision = clock.tick()?;
            let mut assignments = Vec::with_capacity(updates.len() + 1);
            let mut values: Vec<Value> = Vec::with_capacity(updates.len() + 2);
            for (field, value) in updates.iter() {
                values.push(to_sql_value(value));
                assignments.push(format!("{} = ?{}", column(field), values.len()));
            }
            values.push(Value::Blob(revision.to_bytes().to_vec()));
            assignments.push(format!("revision = ?{}", values.len()));
            values.push(Value::Blob(id.as_bytes().to_vec()));

            let sql = format!(
                "UPDATE jobs SET {} WHERE id = ?{}",
                assignments.join(", "),
                values.len()
            );
            tx.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
            tx.commit()?;
            revision
        };

        tracing::debug!(%id, fields = updates.len(), ?revision, "job updated");
        self.publish(ChangeEvent::Updated {
            id,
            changes: updates.clone(),
            revision,
        });
        Ok(revision)
    }

    fn remove_job(&self, id: JobId) -> Result<(), StorageError> {
        let n = {
            let inner = self.lock()?;
            inner.conn.execute(
                "DELETE FROM jobs WHERE id = ?1",
                rusqlite::params![id.as_bytes().as_slice()],
            )?
        };
        if n == 0 {
            return Err(StorageError::NotFound(format!("job {id}")));
        }
        tracing::debug!(%id, "job deleted");
        self.publish(ChangeEvent::Deleted { id });
        Ok(())
    }

    fn add_jobs(&self, records: &[NewJob]) -> Result<Vec<Job>, StorageError> {
        let jobs = {
            let mut guard = self.lock()?;
            let Inner { conn, clock } = &mut *guard;
            let tx = conn.transaction()?;
            let created_at = Self::now();
            let mut jobs = Vec::with_capacity(records.len());
            for record in records {
                let job = Job {
                    id: JobId::new(),
                    work_order: record.work_order,
                    item: record.item.clone(),
                    created_at,
                    designer: None,
                    in_progress: false,
                    has_questions: false,
                    mockup_sent: false,
                    paginated: false,
                    questions_at: None,
                    mockup_sent_at: None,
                    completed_at: None,
                    path: None,
                    revision: clock.tick()?,
                };
                tx.execute(
                    "INSERT INTO jobs (id, work_order, item, created_at, revision) VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        job.id.as_bytes().as_slice(),
                        i64::from(job.work_order.get()),
                        job.item,
                        job.created_at.timestamp_millis(),
                        &job.revision.to_bytes()[..],
                    ],
                )?;
                jobs.push(job);
            }
            tx.commit()?;
            jobs
        };

        tracing::debug!(count = jobs.len(), "jobs inserted");
        for job in &jobs {
            self.publish(ChangeEvent::Inserted { job: job.clone() });
        }
        Ok(jobs)
    }

    fn work_order_count(&self, work_order: WorkOrder) -> Result<u64, StorageError> {
        let inner = self.lock()?;
        let count: i64 = inner.conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE work_order = ?1",
            rusqlite::params![i64::from(work_order.get())],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[async_trait]
impl RemoteStore for SqliteStore {
    async fn fetch_jobs(&self) -> Result<Vec<Job>, StorageError> {
        self.load_jobs()
    }

    async fn fetch_designers(&self, active_only: bool) -> Result<Vec<Designer>, StorageError> {
        self.load_designers(active_only)
    }

    async fn fetch_revisions(&self, ids: &[JobId]) -> Result<BTreeMap<JobId, Revision>, StorageError> {
        self.load_revisions(ids)
    }

    async fn update_job(
        &self,
        id: JobId,
        updates: &FieldUpdates,
        expected: Option<Revision>,
    ) -> Result<Revision, StorageError> {
        self.write_job(id, updates, expected)
    }

    async fn delete_job(&self, id: JobId) -> Result<(), StorageError> {
        self.remove_job(id)
    }

    async fn insert_jobs(&self, records: &[NewJob]) -> Result<Vec<Job>, StorageError> {
        self.add_jobs(records)
    }

    async fn count_work_order(&self, work_order: WorkOrder) -> Result<u64, StorageError> {
        self.work_order_count(work_order)
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.changes.subscribe())
    }
}

/// Wrapper error type used to tunnel StorageError through rusqlite's error system
/// in query_map closures that must return rusqlite::Error.
#[derive(Debug)]
struct OpaqueStorageError(String);

impl std::fmt::Display for OpaqueStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for OpaqueStorageError {}
