use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

// Work-order numbers repeat across the items of one order, so there is no
// UNIQUE constraint on them. designer_id is a weak reference.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS designers (
    id BLOB PRIMARY KEY CHECK (length(id) = 16),
    name TEXT NOT NULL,
    email TEXT,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS jobs (
    id BLOB PRIMARY KEY CHECK (length(id) = 16),
    work_order INTEGER NOT NULL CHECK (work_order BETWEEN 1 AND 9999),
    item TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    designer_id BLOB CHECK (designer_id IS NULL OR length(designer_id) = 16),
    in_progress INTEGER NOT NULL DEFAULT 0,
    has_questions INTEGER NOT NULL DEFAULT 0,
    mockup_sent INTEGER NOT NULL DEFAULT 0,
    paginated INTEGER NOT NULL DEFAULT 0,
    questions_at INTEGER,
    mockup_sent_at INTEGER,
    completed_at INTEGER,
    path TEXT,
    revision BLOB NOT NULL CHECK (length(revision) = 12)
);
CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs (created_at DESC);
CREATE INDEX IF NOT EXISTS idx_jobs_work_order ON jobs (work_order);
";
