//! Detaches a record from its label and deletes the label once unreferenced.
//!
//! # Invariants
//! - Reference counting includes every record still pointing at the label,
//!   the detaching record excluded only from "others".
//! - When the label is deleted, the pointer is cleared only after the delete
//!   succeeds; a crash in between leaves a dangling pointer, never a pointer
//!   to a label that another record still needs.

use crate::model::label::LabelId;
use crate::model::record::RecordId;
use crate::repo::label_store::LabelStore;
use crate::repo::record_store::RecordStore;
use crate::repo::StoreError;
use crate::sync::reference_index::ReferenceIndex;
use crate::sync::SyncResult;
use log::{info, warn};

/// What a retraction did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetractOutcome {
    /// The record had no pointer in the namespace.
    NoPointer,
    /// Pointer cleared; the label stays for `remaining` other records.
    Detached { label_id: LabelId, remaining: usize },
    /// Last reference: label deleted, then pointer cleared.
    Collected { label_id: LabelId },
    /// The pointer referred to a label that was already gone; pointer cleared.
    Healed { label_id: LabelId },
}

pub struct GarbageCollector<'s, R: ?Sized, L: ?Sized> {
    records: &'s R,
    labels: &'s L,
}

impl<'s, R, L> GarbageCollector<'s, R, L>
where
    R: RecordStore + ?Sized,
    L: LabelStore + ?Sized,
{
    pub fn new(records: &'s R, labels: &'s L) -> Self {
        Self { records, labels }
    }

    /// Removes `record_id`'s association in `namespace`.
    pub fn retract(&self, record_id: RecordId, namespace: &str) -> SyncResult<RetractOutcome> {
        let Some(label_id) = self.records.get_pointer(record_id, namespace)? else {
            return Ok(RetractOutcome::NoPointer);
        };

        let index = ReferenceIndex::new(self.records, self.labels);
        let mut others = index.records_pointing_at(namespace, label_id)?;
        others.remove(&record_id);

        if !others.is_empty() {
            self.records.clear_pointer(record_id, namespace)?;
            info!(
                "event=retract module=collector status=detached record_id={} namespace={} label_id={} remaining={}",
                record_id,
                namespace,
                label_id,
                others.len()
            );
            return Ok(RetractOutcome::Detached {
                label_id,
                remaining: others.len(),
            });
        }

        let outcome = match self.labels.delete(label_id) {
            Ok(()) => RetractOutcome::Collected { label_id },
            Err(StoreError::LabelNotFound(_)) => {
                warn!(
                    "event=retract module=collector status=healed reason=label_missing record_id={} namespace={} label_id={}",
                    record_id, namespace, label_id
                );
                RetractOutcome::Healed { label_id }
            }
            Err(err) => return Err(err.into()),
        };
        self.records.clear_pointer(record_id, namespace)?;

        if let RetractOutcome::Collected { .. } = outcome {
            info!(
                "event=retract module=collector status=collected record_id={} namespace={} label_id={}",
                record_id, namespace, label_id
            );
        }
        Ok(outcome)
    }
}
