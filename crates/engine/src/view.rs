use std::collections::HashMap;

use folhas_core::{Designer, DesignerId, FieldKind, FieldValue, Job, JobField};
use serde::{Deserialize, Serialize};

use crate::overlay::{PendingEdit, PendingEdits};

// ============================================================================
// Effective values
// ============================================================================

/// The value the user sees: pending value if any, else the stored value,
/// else the field default.
pub fn effective(job: &Job, pending: Option<&PendingEdit>, field: JobField) -> FieldValue {
    pending
        .and_then(|edit| edit.updates.get(field))
        .cloned()
        .unwrap_or_else(|| job.get(field))
}

/// The stored job with its pending edit merged in.
pub fn effective_job(job: &Job, pending: Option<&PendingEdit>) -> Job {
    let mut out = job.clone();
    if let Some(edit) = pending
        && let Err(e) = out.apply(&edit.updates)
    {
        tracing::warn!(id = %job.id, "pending edit does not apply: {e}");
    }
    out
}

// ============================================================================
// Sorting
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn reversed(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub column: JobField,
    pub direction: SortDirection,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self {
            column: JobField::CreatedAt,
            direction: SortDirection::Descending,
        }
    }
}

impl SortOrder {
    /// Header click: the same column flips direction, a new one starts
    /// ascending.
    pub fn toggle(self, column: JobField) -> Self {
        if column == self.column {
            Self {
                column,
                direction: self.direction.reversed(),
            }
        } else {
            Self {
                column,
                direction: SortDirection::Ascending,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey {
    Number(i64),
    Text(String),
}

fn sort_key(value: &FieldValue, column: JobField, names: &HashMap<DesignerId, &str>) -> SortKey {
    match column.kind() {
        FieldKind::Reference => SortKey::Text(
            value
                .as_designer()
                .and_then(|id| names.get(&id))
                .map(|name| name.to_lowercase())
                .unwrap_or_default(),
        ),
        FieldKind::Timestamp => {
            SortKey::Number(value.as_timestamp().map_or(0, |t| t.timestamp_millis()))
        }
        FieldKind::Boolean => SortKey::Number(i64::from(value.as_boolean().unwrap_or(false))),
        FieldKind::Integer => SortKey::Number(value.as_integer().unwrap_or(0)),
        FieldKind::Text => SortKey::Text(value.as_text().unwrap_or_default().to_lowercase()),
    }
}

/// Stable sort of effective rows.
pub fn sort_rows(rows: &mut Vec<Row>, order: SortOrder, designers: &[Designer]) {
    let names: HashMap<DesignerId, &str> =
        designers.iter().map(|d| (d.id, d.name.as_str())).collect();
    let mut keyed: Vec<(SortKey, Row)> = rows
        .drain(..)
        .map(|row| (sort_key(&row.job.get(order.column), order.column, &names), row))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| match order.direction {
        SortDirection::Ascending => a.cmp(b),
        SortDirection::Descending => b.cmp(a),
    });
    rows.extend(keyed.into_iter().map(|(_, row)| row));
}

// ============================================================================
// Filtering
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewQuery {
    /// Hide completed (paginated) jobs.
    pub open_only: bool,
    /// Digits to look for in the work-order number.
    pub work_order: Option<String>,
    /// Case-insensitive substring of the item description.
    pub item: Option<String>,
    pub sort: SortOrder,
}

impl ViewQuery {
    fn work_order_digits(&self) -> Option<String> {
        let digits: String = self
            .work_order
            .as_deref()?
            .chars()
            .filter(char::is_ascii_digit)
            .take(4)
            .collect();
        (!digits.is_empty()).then_some(digits)
    }

    fn item_needle(&self) -> Option<String> {
        let needle = self.item.as_deref()?.trim();
        (!needle.is_empty()).then(|| needle.to_lowercase())
    }

    pub fn matches(&self, job: &Job) -> bool {
        if self.open_only && job.paginated {
            return false;
        }
        if let Some(digits) = self.work_order_digits()
            && !job.work_order.to_string().contains(&digits)
        {
            return false;
        }
        if let Some(needle) = self.item_needle()
            && !job.item.to_lowercase().contains(&needle)
        {
            return false;
        }
        true
    }
}

/// One displayed row: the effective job and whether it has unsaved edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub job: Job,
    pub has_pending: bool,
}

/// Effective rows in input order, filtered then sorted per `query`.
pub fn rows(jobs: &[Job], pending: &PendingEdits, designers: &[Designer], query: &ViewQuery) -> Vec<Row> {
    let mut out: Vec<Row> = jobs
        .iter()
        .map(|job| {
            let edit = pending.get(job.id);
            Row {
                job: effective_job(job, edit),
                has_pending: edit.is_some(),
            }
        })
        .filter(|row| query.matches(&row.job))
        .collect();
    sort_rows(&mut out, query.sort, designers);
    out
}
