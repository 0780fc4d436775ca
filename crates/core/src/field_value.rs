use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::DesignerId;
use crate::job::FieldKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    DesignerRef(DesignerId),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_designer(&self) -> Option<DesignerId> {
        match self {
            FieldValue::DesignerRef(id) => Some(*id),
            _ => None,
        }
    }

    /// Whether this non-null value has the shape of `kind`. Nullability is a
    /// per-field property, see `JobField::check`.
    pub fn fits(&self, kind: FieldKind) -> bool {
        match (self, kind) {
            (FieldValue::Text(_), FieldKind::Text) => true,
            (FieldValue::Integer(_), FieldKind::Integer) => true,
            (FieldValue::Boolean(_), FieldKind::Boolean) => true,
            (FieldValue::Timestamp(_), FieldKind::Timestamp) => true,
            (FieldValue::DesignerRef(_), FieldKind::Reference) => true,
            _ => false,
        }
    }

    pub fn from_timestamp(at: Option<DateTime<Utc>>) -> Self {
        at.map_or(FieldValue::Null, FieldValue::Timestamp)
    }

    pub fn from_designer(id: Option<DesignerId>) -> Self {
        id.map_or(FieldValue::Null, FieldValue::DesignerRef)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_fits_no_kind() {
        assert!(!FieldValue::Null.fits(FieldKind::Timestamp));
        assert!(!FieldValue::Null.fits(FieldKind::Boolean));
    }

    #[test]
    fn kinds_do_not_cross() {
        assert!(!FieldValue::Boolean(true).fits(FieldKind::Text));
        assert!(!FieldValue::Text("x".into()).fits(FieldKind::Reference));
        assert!(FieldValue::DesignerRef(DesignerId::new()).fits(FieldKind::Reference));
    }
}
