use thiserror::Error;

use crate::job::{FieldKind, JobField};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid work order number: {0} (expected 1-9999)")]
    InvalidWorkOrder(String),

    #[error("field {field} expects a {expected} value")]
    TypeMismatch { field: JobField, expected: FieldKind },
}
