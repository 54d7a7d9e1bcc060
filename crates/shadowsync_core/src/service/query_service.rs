//! Read-only queries over shadow associations.
//!
//! # Invariants
//! - Never writes; a dangling pointer reads as "no label".
//! - Results are sorted by record id.

use crate::model::label::ShadowLabel;
use crate::model::record::{Record, RecordId};
use crate::repo::label_store::LabelStore;
use crate::repo::record_store::RecordStore;
use crate::repo::StoreResult;
use crate::sync::reference_index::ReferenceIndex;

pub struct ShadowQueryService<'s, R: ?Sized, L: ?Sized> {
    records: &'s R,
    labels: &'s L,
}

impl<'s, R, L> ShadowQueryService<'s, R, L>
where
    R: RecordStore + ?Sized,
    L: LabelStore + ?Sized,
{
    pub fn new(records: &'s R, labels: &'s L) -> Self {
        Self { records, labels }
    }

    /// Label `record_id` mirrors into in `namespace`.
    pub fn label_for(&self, record_id: RecordId, namespace: &str) -> StoreResult<Option<ShadowLabel>> {
        self.index().label_for(record_id, namespace)
    }

    /// Records currently pointing at `label`.
    ///
    /// Pointers left behind by records already dropped from the store are skipped.
    pub fn records_for(&self, label: &ShadowLabel) -> StoreResult<Vec<Record>> {
        let mut records = Vec::new();
        for record_id in self.index().records_for(label)? {
            if let Some(record) = self.records.get(record_id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Records of `target_type` sharing `record_id`'s label, excluding `record_id`.
    pub fn related_records(
        &self,
        record_id: RecordId,
        namespace: &str,
        target_type: &str,
    ) -> StoreResult<Vec<Record>> {
        let Some(label) = self.label_for(record_id, namespace)? else {
            return Ok(Vec::new());
        };
        Ok(self
            .records_for(&label)?
            .into_iter()
            .filter(|record| record.id != record_id && record.record_type == target_type)
            .collect())
    }

    fn index(&self) -> ReferenceIndex<'s, R, L> {
        ReferenceIndex::new(self.records, self.labels)
    }
}
