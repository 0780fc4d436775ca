pub mod change;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod job;
pub mod revision;

pub use change::ChangeEvent;
pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::*;
pub use job::{
    Designer, FieldKind, FieldUpdates, Job, JobField, JobStatus, NewJob, StatusFlag, WorkOrder,
};
pub use revision::{Revision, RevisionClock};
