//! Reverse lookups between records and labels.
//!
//! # Invariants
//! - Every count is a live point query; nothing is cached across calls.
//! - A pointer whose label is missing (or lives in another namespace) reads
//!   as "no association".

use crate::model::label::{LabelId, ShadowLabel};
use crate::model::record::RecordId;
use crate::repo::label_store::LabelStore;
use crate::repo::record_store::RecordStore;
use crate::repo::StoreResult;
use log::warn;
use std::collections::BTreeSet;

pub struct ReferenceIndex<'s, R: ?Sized, L: ?Sized> {
    records: &'s R,
    labels: &'s L,
}

impl<'s, R, L> ReferenceIndex<'s, R, L>
where
    R: RecordStore + ?Sized,
    L: LabelStore + ?Sized,
{
    pub fn new(records: &'s R, labels: &'s L) -> Self {
        Self { records, labels }
    }

    /// All records pointing at `label`, including the one being processed.
    pub fn records_for(&self, label: &ShadowLabel) -> StoreResult<BTreeSet<RecordId>> {
        self.records_pointing_at(&label.namespace, label.id)
    }

    /// Same as [`Self::records_for`], keyed by raw pointer value.
    ///
    /// Used for deletion safety where the label row may already be gone.
    pub fn records_pointing_at(
        &self,
        namespace: &str,
        label_id: LabelId,
    ) -> StoreResult<BTreeSet<RecordId>> {
        self.records.query_by_pointer(namespace, label_id)
    }

    /// Records sharing `label` with `record_id`, excluding `record_id`.
    pub fn peers_of(
        &self,
        record_id: RecordId,
        label: &ShadowLabel,
    ) -> StoreResult<BTreeSet<RecordId>> {
        let mut peers = self.records_for(label)?;
        peers.remove(&record_id);
        Ok(peers)
    }

    /// Reference count with `record_id` counted as already associated.
    pub fn reference_count_including(
        &self,
        record_id: RecordId,
        label: &ShadowLabel,
    ) -> StoreResult<usize> {
        Ok(self.peers_of(record_id, label)?.len() + 1)
    }

    /// Label the record currently points at in `namespace`.
    pub fn label_for(&self, record_id: RecordId, namespace: &str) -> StoreResult<Option<ShadowLabel>> {
        let Some(label_id) = self.records.get_pointer(record_id, namespace)? else {
            return Ok(None);
        };

        match self.labels.get(label_id)? {
            Some(label) if label.namespace == namespace => Ok(Some(label)),
            Some(label) => {
                warn!(
                    "event=pointer_anomaly module=reference_index status=ignored reason=namespace_mismatch record_id={} namespace={} label_id={} label_namespace={}",
                    record_id, namespace, label_id, label.namespace
                );
                Ok(None)
            }
            None => {
                warn!(
                    "event=pointer_anomaly module=reference_index status=ignored reason=label_missing record_id={} namespace={} label_id={}",
                    record_id, namespace, label_id
                );
                Ok(None)
            }
        }
    }
}
