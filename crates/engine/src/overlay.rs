use std::collections::BTreeMap;

use folhas_core::{FieldUpdates, FieldValue, JobField, JobId, Revision};

/// Unsaved field changes for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    pub updates: FieldUpdates,
    /// Stored revision when the first edit was made. `None` if the job was
    /// not in the row store at that moment.
    pub baseline: Option<Revision>,
}

/// Local edits layered over the row store, keyed by job.
///
/// Only user interaction creates or grows entries; flush and discard remove
/// them. Remote events never touch this map.
#[derive(Debug, Default)]
pub struct PendingEdits {
    edits: BTreeMap<JobId, PendingEdit>,
}

impl PendingEdits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `updates` into the bag for `id`, creating it with `baseline` if
    /// absent. An existing bag keeps its original baseline.
    pub fn propose(&mut self, id: JobId, updates: FieldUpdates, baseline: Option<Revision>) {
        match self.edits.get_mut(&id) {
            Some(edit) => edit.updates.merge(updates),
            None => {
                self.edits.insert(id, PendingEdit { updates, baseline });
            }
        }
    }

    pub fn clear(&mut self, id: JobId) -> Option<PendingEdit> {
        self.edits.remove(&id)
    }

    /// Move the baseline of an existing bag to `revision`.
    pub fn rebase(&mut self, id: JobId, revision: Revision) {
        if let Some(edit) = self.edits.get_mut(&id) {
            edit.baseline = Some(revision);
        }
    }

    pub fn clear_all(&mut self) {
        self.edits.clear();
    }

    pub fn has(&self, id: JobId) -> bool {
        self.edits.contains_key(&id)
    }

    pub fn get(&self, id: JobId) -> Option<&PendingEdit> {
        self.edits.get(&id)
    }

    /// Pending value of one field, if the job has one.
    pub fn value(&self, id: JobId, field: JobField) -> Option<&FieldValue> {
        self.edits.get(&id).and_then(|e| e.updates.get(field))
    }

    pub fn all(&self) -> &BTreeMap<JobId, PendingEdit> {
        &self.edits
    }

    pub fn snapshot(&self) -> BTreeMap<JobId, PendingEdit> {
        self.edits.clone()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(JobId) -> bool) {
        self.edits.retain(|id, _| keep(*id));
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folhas_core::StatusFlag;

    #[test]
    fn propose_merges_and_keeps_first_baseline() {
        let mut pending = PendingEdits::new();
        let id = JobId::new();
        pending.propose(
            id,
            FieldUpdates::new().flag(StatusFlag::InProgress, true),
            Some(Revision::new(10, 0)),
        );
        pending.propose(
            id,
            FieldUpdates::new().flag(StatusFlag::InProgress, false).path("/a"),
            Some(Revision::new(20, 0)),
        );

        let edit = pending.get(id).unwrap();
        assert_eq!(edit.baseline, Some(Revision::new(10, 0)));
        assert_eq!(edit.updates.len(), 2);
        assert_eq!(
            pending.value(id, JobField::InProgress),
            Some(&FieldValue::Boolean(false))
        );
    }

    #[test]
    fn clear_removes_only_that_job() {
        let mut pending = PendingEdits::new();
        let (a, b) = (JobId::new(), JobId::new());
        pending.propose(a, FieldUpdates::new().path("x"), None);
        pending.propose(b, FieldUpdates::new().path("y"), None);

        assert!(pending.clear(a).is_some());
        assert!(!pending.has(a));
        assert!(pending.has(b));
        assert_eq!(pending.len(), 1);
        assert!(pending.clear(a).is_none());
    }
}
