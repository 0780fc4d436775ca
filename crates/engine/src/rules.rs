//! Status-field rules applied to every proposed edit.
//!
//! `apply` is a pure decision over the job as the user currently sees it
//! (stored row with pending edits merged) and the proposed change. It never
//! touches session state.

use std::fmt;

use chrono::{DateTime, Utc};
use folhas_core::{DesignerId, FieldUpdates, Job, StatusFlag, WorkOrder};

/// A single user change to one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Designer(Option<DesignerId>),
    Flag(StatusFlag, bool),
    Path(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Full set of changes to stage, side effects included.
    Accepted {
        updates: FieldUpdates,
        warning: Option<Warning>,
    },
    Rejected(Rejection),
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted { .. })
    }

    fn accept(updates: FieldUpdates) -> Self {
        Outcome::Accepted {
            updates,
            warning: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    CompletedJob,
    DesignerRequired,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::CompletedJob => f.write_str("cannot alter a completed job"),
            Rejection::DesignerRequired => f.write_str("assign a designer first"),
        }
    }
}

/// Accepted, but the job will not pass flush validation as it stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    PathRequired(WorkOrder),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::PathRequired(wo) => write!(f, "path required for FO {wo}"),
        }
    }
}

/// Clear every working-stage flag except `keep`.
fn exclusive(keep: StatusFlag) -> FieldUpdates {
    [StatusFlag::InProgress, StatusFlag::HasQuestions, StatusFlag::MockupSent]
        .into_iter()
        .fold(FieldUpdates::new(), |u, flag| u.flag(flag, flag == keep))
}

pub fn apply(job: &Job, edit: &Edit, now: DateTime<Utc>) -> Outcome {
    match edit {
        Edit::Flag(StatusFlag::Paginated, true) => {
            let updates = exclusive(StatusFlag::Paginated)
                .flag(StatusFlag::Paginated, true)
                .stamp(StatusFlag::Paginated, Some(now));
            let warning = (!job.has_path()).then_some(Warning::PathRequired(job.work_order));
            Outcome::Accepted { updates, warning }
        }
        Edit::Flag(StatusFlag::Paginated, false) => Outcome::accept(
            FieldUpdates::new()
                .flag(StatusFlag::Paginated, false)
                .stamp(StatusFlag::Paginated, None),
        ),
        Edit::Flag(_, _) | Edit::Path(_) if job.paginated => {
            Outcome::Rejected(Rejection::CompletedJob)
        }
        Edit::Flag(StatusFlag::InProgress, true) => {
            if job.designer.is_none() {
                Outcome::Rejected(Rejection::DesignerRequired)
            } else {
                Outcome::accept(exclusive(StatusFlag::InProgress))
            }
        }
        Edit::Flag(flag @ (StatusFlag::HasQuestions | StatusFlag::MockupSent), true) => {
            Outcome::accept(exclusive(*flag).stamp(*flag, Some(now)))
        }
        // A completed job keeps its stage; only the assignment changes.
        Edit::Designer(Some(id)) if job.paginated => {
            Outcome::accept(FieldUpdates::new().designer(Some(*id)))
        }
        Edit::Designer(Some(id)) => {
            Outcome::accept(exclusive(StatusFlag::InProgress).designer(Some(*id)))
        }
        Edit::Designer(None) => Outcome::accept(FieldUpdates::new().designer(None)),
        Edit::Flag(flag, on) => Outcome::accept(FieldUpdates::new().flag(*flag, *on)),
        Edit::Path(path) => Outcome::accept(FieldUpdates::new().path(path.clone())),
    }
}
