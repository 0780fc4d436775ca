use folhas_core::{JobId, Revision};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("revision mismatch on job {id}: expected {expected:?}, found {actual:?}")]
    RevisionMismatch {
        id: JobId,
        expected: Revision,
        actual: Revision,
    },

    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("core error: {0}")]
    Core(#[from] folhas_core::CoreError),
}

impl StorageError {
    /// True when the error means the row changed underneath the caller.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::RevisionMismatch { .. })
    }
}
