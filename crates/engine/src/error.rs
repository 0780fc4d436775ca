use std::fmt;

use folhas_core::{CoreError, JobId, WorkOrder};
use folhas_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("work order {0} already exists")]
    DuplicateWorkOrder(WorkOrder),
}

/// Local rejection raised before anything reaches the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("path required for {}", FoList(.work_orders))]
    PathRequired { work_orders: Vec<WorkOrder> },

    #[error("invalid work order number: {0} (expected 1-9999)")]
    InvalidWorkOrder(String),

    #[error("at least one item is required")]
    NoItems,
}

struct FoList<'a>(&'a [WorkOrder]);

impl fmt::Display for FoList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, wo) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "FO {wo}")?;
        }
        Ok(())
    }
}
