use serde::{Deserialize, Serialize};

use crate::ids::JobId;
use crate::job::{FieldUpdates, Job};
use crate::revision::Revision;

/// Row-level change pushed by the store to its subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    Inserted { job: Job },
    Updated {
        id: JobId,
        changes: FieldUpdates,
        revision: Revision,
    },
    Deleted { id: JobId },
}

impl ChangeEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Inserted { job } => job.id,
            Self::Updated { id, .. } | Self::Deleted { id } => *id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Inserted { .. } => "insert",
            Self::Updated { .. } => "update",
            Self::Deleted { .. } => "delete",
        }
    }
}
