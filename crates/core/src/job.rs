use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::ids::{DesignerId, JobId};
use crate::revision::Revision;

// ============================================================================
// Work-order number
// ============================================================================

/// Short external job number, 1 to 4 decimal digits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct WorkOrder(u16);

impl WorkOrder {
    pub const MAX: u16 = 9999;

    pub fn new(n: u16) -> Result<Self, CoreError> {
        if (1..=Self::MAX).contains(&n) {
            Ok(Self(n))
        } else {
            Err(CoreError::InvalidWorkOrder(n.to_string()))
        }
    }

    /// Parse user input. Only ASCII digits are accepted.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.len() > 4 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidWorkOrder(input.to_string()));
        }
        let n: u16 = trimmed
            .parse()
            .map_err(|_| CoreError::InvalidWorkOrder(input.to_string()))?;
        Self::new(n)
    }

    pub fn from_i64(n: i64) -> Result<Self, CoreError> {
        u16::try_from(n)
            .map_err(|_| CoreError::InvalidWorkOrder(n.to_string()))
            .and_then(Self::new)
    }

    pub fn get(&self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for WorkOrder {
    type Error = CoreError;

    fn try_from(n: u16) -> Result<Self, Self::Error> {
        Self::new(n)
    }
}

impl From<WorkOrder> for u16 {
    fn from(wo: WorkOrder) -> Self {
        wo.0
    }
}

impl fmt::Debug for WorkOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FO {}", self.0)
    }
}

impl fmt::Display for WorkOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Fields
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Boolean,
    Integer,
    Text,
    Timestamp,
    Reference,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::Reference => "designer reference",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobField {
    CreatedAt,
    WorkOrder,
    Designer,
    Item,
    InProgress,
    HasQuestions,
    MockupSent,
    Paginated,
    QuestionsAt,
    MockupSentAt,
    CompletedAt,
    Path,
}

impl JobField {
    pub const ALL: [JobField; 12] = [
        Self::CreatedAt,
        Self::WorkOrder,
        Self::Designer,
        Self::Item,
        Self::InProgress,
        Self::HasQuestions,
        Self::MockupSent,
        Self::Paginated,
        Self::QuestionsAt,
        Self::MockupSentAt,
        Self::CompletedAt,
        Self::Path,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::WorkOrder => "work_order",
            Self::Designer => "designer",
            Self::Item => "item",
            Self::InProgress => "in_progress",
            Self::HasQuestions => "has_questions",
            Self::MockupSent => "mockup_sent",
            Self::Paginated => "paginated",
            Self::QuestionsAt => "questions_at",
            Self::MockupSentAt => "mockup_sent_at",
            Self::CompletedAt => "completed_at",
            Self::Path => "path",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| CoreError::InvalidData(format!("unknown job field: {s}")))
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::CreatedAt | Self::QuestionsAt | Self::MockupSentAt | Self::CompletedAt => {
                FieldKind::Timestamp
            }
            Self::WorkOrder => FieldKind::Integer,
            Self::Designer => FieldKind::Reference,
            Self::Item | Self::Path => FieldKind::Text,
            Self::InProgress | Self::HasQuestions | Self::MockupSent | Self::Paginated => {
                FieldKind::Boolean
            }
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(
            self,
            Self::Designer | Self::QuestionsAt | Self::MockupSentAt | Self::CompletedAt | Self::Path
        )
    }

    /// Value shown when a row has nothing stored for this field.
    pub fn default_value(&self) -> FieldValue {
        match self.kind() {
            FieldKind::Boolean => FieldValue::Boolean(false),
            FieldKind::Text => FieldValue::Text(String::new()),
            _ => FieldValue::Null,
        }
    }

    pub fn check(&self, value: &FieldValue) -> Result<(), CoreError> {
        let ok = if value.is_null() {
            self.is_nullable()
        } else {
            value.fits(self.kind())
        };
        if !ok {
            return Err(CoreError::TypeMismatch {
                field: *self,
                expected: self.kind(),
            });
        }
        if let (Self::WorkOrder, Some(n)) = (self, value.as_integer()) {
            WorkOrder::from_i64(n)?;
        }
        Ok(())
    }
}

impl fmt::Display for JobField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Status
// ============================================================================

/// The four user-facing status checkboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFlag {
    InProgress,
    HasQuestions,
    MockupSent,
    Paginated,
}

impl StatusFlag {
    pub const ALL: [StatusFlag; 4] = [
        Self::InProgress,
        Self::HasQuestions,
        Self::MockupSent,
        Self::Paginated,
    ];

    pub fn field(&self) -> JobField {
        match self {
            Self::InProgress => JobField::InProgress,
            Self::HasQuestions => JobField::HasQuestions,
            Self::MockupSent => JobField::MockupSent,
            Self::Paginated => JobField::Paginated,
        }
    }

    /// Timestamp recorded when the flag transitions to true, if any.
    pub fn timestamp_field(&self) -> Option<JobField> {
        match self {
            Self::InProgress => None,
            Self::HasQuestions => Some(JobField::QuestionsAt),
            Self::MockupSent => Some(JobField::MockupSentAt),
            Self::Paginated => Some(JobField::CompletedAt),
        }
    }
}

/// Single-valued view of the status checkboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    InProgress,
    HasQuestions,
    MockupSent,
    Paginated,
}

// ============================================================================
// Field update bag
// ============================================================================

/// Partial set of field changes for one job. Every value is checked against
/// its field on insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<JobField, FieldValue>", into = "BTreeMap<JobField, FieldValue>")]
pub struct FieldUpdates(BTreeMap<JobField, FieldValue>);

impl FieldUpdates {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, field: JobField, value: FieldValue) -> Result<Option<FieldValue>, CoreError> {
        field.check(&value)?;
        Ok(self.0.insert(field, value))
    }

    pub fn get(&self, field: JobField) -> Option<&FieldValue> {
        self.0.get(&field)
    }

    pub fn contains(&self, field: JobField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (JobField, &FieldValue)> {
        self.0.iter().map(|(f, v)| (*f, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Shallow merge: every field in `other` overwrites the one here.
    pub fn merge(&mut self, other: FieldUpdates) {
        self.0.extend(other.0);
    }

    pub fn flag(mut self, flag: StatusFlag, on: bool) -> Self {
        self.0.insert(flag.field(), FieldValue::Boolean(on));
        self
    }

    /// Set (or clear) the transition timestamp belonging to `flag`.
    pub fn stamp(mut self, flag: StatusFlag, at: Option<DateTime<Utc>>) -> Self {
        if let Some(field) = flag.timestamp_field() {
            self.0.insert(field, FieldValue::from_timestamp(at));
        }
        self
    }

    pub fn designer(mut self, designer: Option<DesignerId>) -> Self {
        self.0.insert(JobField::Designer, FieldValue::from_designer(designer));
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.0.insert(JobField::Path, FieldValue::Text(path.into()));
        self
    }
}

impl TryFrom<BTreeMap<JobField, FieldValue>> for FieldUpdates {
    type Error = CoreError;

    fn try_from(map: BTreeMap<JobField, FieldValue>) -> Result<Self, Self::Error> {
        for (field, value) in &map {
            field.check(value)?;
        }
        Ok(Self(map))
    }
}

impl From<FieldUpdates> for BTreeMap<JobField, FieldValue> {
    fn from(updates: FieldUpdates) -> Self {
        updates.0
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Designer {
    pub id: DesignerId,
    pub name: String,
    pub email: Option<String>,
    pub active: bool,
}

/// A job ("folha de obra") as stored remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub work_order: WorkOrder,
    pub item: String,
    pub created_at: DateTime<Utc>,
    pub designer: Option<DesignerId>,
    pub in_progress: bool,
    pub has_questions: bool,
    pub mockup_sent: bool,
    pub paginated: bool,
    pub questions_at: Option<DateTime<Utc>>,
    pub mockup_sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub path: Option<String>,
    pub revision: Revision,
}

impl Job {
    /// Read a field, substituting the field default for absent values.
    pub fn get(&self, field: JobField) -> FieldValue {
        match field {
            JobField::CreatedAt => FieldValue::Timestamp(self.created_at),
            JobField::WorkOrder => FieldValue::Integer(i64::from(self.work_order.get())),
            JobField::Designer => FieldValue::from_designer(self.designer),
            JobField::Item => FieldValue::Text(self.item.clone()),
            JobField::InProgress => FieldValue::Boolean(self.in_progress),
            JobField::HasQuestions => FieldValue::Boolean(self.has_questions),
            JobField::MockupSent => FieldValue::Boolean(self.mockup_sent),
            JobField::Paginated => FieldValue::Boolean(self.paginated),
            JobField::QuestionsAt => FieldValue::from_timestamp(self.questions_at),
            JobField::MockupSentAt => FieldValue::from_timestamp(self.mockup_sent_at),
            JobField::CompletedAt => FieldValue::from_timestamp(self.completed_at),
            JobField::Path => match &self.path {
                Some(p) => FieldValue::Text(p.clone()),
                None => field.default_value(),
            },
        }
    }

    pub fn set(&mut self, field: JobField, value: FieldValue) -> Result<(), CoreError> {
        field.check(&value)?;
        match (field, value) {
            (JobField::CreatedAt, FieldValue::Timestamp(t)) => self.created_at = t,
            (JobField::WorkOrder, FieldValue::Integer(n)) => self.work_order = WorkOrder::from_i64(n)?,
            (JobField::Designer, v) => self.designer = v.as_designer(),
            (JobField::Item, FieldValue::Text(s)) => self.item = s,
            (JobField::InProgress, FieldValue::Boolean(b)) => self.in_progress = b,
            (JobField::HasQuestions, FieldValue::Boolean(b)) => self.has_questions = b,
            (JobField::MockupSent, FieldValue::Boolean(b)) => self.mockup_sent = b,
            (JobField::Paginated, FieldValue::Boolean(b)) => self.paginated = b,
            (JobField::QuestionsAt, v) => self.questions_at = v.as_timestamp(),
            (JobField::MockupSentAt, v) => self.mockup_sent_at = v.as_timestamp(),
            (JobField::CompletedAt, v) => self.completed_at = v.as_timestamp(),
            (JobField::Path, FieldValue::Text(s)) => self.path = Some(s),
            (JobField::Path, _) => self.path = None,
            (field, _) => {
                return Err(CoreError::TypeMismatch {
                    field,
                    expected: field.kind(),
                });
            }
        }
        Ok(())
    }

    pub fn apply(&mut self, updates: &FieldUpdates) -> Result<(), CoreError> {
        for (field, value) in updates.iter() {
            self.set(field, value.clone())?;
        }
        Ok(())
    }

    pub fn flag(&self, flag: StatusFlag) -> bool {
        match flag {
            StatusFlag::InProgress => self.in_progress,
            StatusFlag::HasQuestions => self.has_questions,
            StatusFlag::MockupSent => self.mockup_sent,
            StatusFlag::Paginated => self.paginated,
        }
    }

    pub fn status(&self) -> JobStatus {
        if self.paginated {
            JobStatus::Paginated
        } else if self.in_progress {
            JobStatus::InProgress
        } else if self.has_questions {
            JobStatus::HasQuestions
        } else if self.mockup_sent {
            JobStatus::MockupSent
        } else {
            JobStatus::Idle
        }
    }

    pub fn has_path(&self) -> bool {
        self.path.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

/// Insert payload. Identity, creation time and revision are assigned by the
/// store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJob {
    pub work_order: WorkOrder,
    pub item: String,
}
