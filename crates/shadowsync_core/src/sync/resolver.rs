//! Finds or creates the label a qualifying record mirrors into.
//!
//! # Invariants
//! - An existing, live pointer is returned without any write.
//! - A name/slug collision adopts the existing label instead of failing.
//! - A store-reported `Conflict` is retried once, then propagated.
//! - A created or adopted label is always followed by the pointer write;
//!   a failed pointer write fails the event.

use crate::model::label::{slugify, ShadowLabel};
use crate::model::record::Record;
use crate::repo::label_store::{LabelClaim, LabelStore};
use crate::repo::record_store::RecordStore;
use crate::repo::StoreError;
use crate::sync::reference_index::ReferenceIndex;
use crate::sync::{SyncError, SyncResult};
use log::{error, info, warn};

/// Label resolved for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub label: ShadowLabel,
    /// `true` only when this call inserted a new label row.
    pub created: bool,
}

pub struct LabelResolver<'s, R: ?Sized, L: ?Sized> {
    records: &'s R,
    labels: &'s L,
}

impl<'s, R, L> LabelResolver<'s, R, L>
where
    R: RecordStore + ?Sized,
    L: LabelStore + ?Sized,
{
    pub fn new(records: &'s R, labels: &'s L) -> Self {
        Self { records, labels }
    }

    /// Returns the record's label in `namespace`, creating or adopting one
    /// and writing the pointer when none is associated.
    pub fn resolve(&self, record: &Record, namespace: &str) -> SyncResult<Resolution> {
        let index = ReferenceIndex::new(self.records, self.labels);
        if let Some(label) = index.label_for(record.id, namespace)? {
            return Ok(Resolution {
                label,
                created: false,
            });
        }

        let slug = mirrored_slug(record);
        let claim = match self.labels.create_or_adopt(namespace, &record.title, &slug) {
            Err(StoreError::Conflict { .. }) => {
                warn!(
                    "event=label_claim module=resolver status=retry reason=conflict record_id={} namespace={}",
                    record.id, namespace
                );
                // A concurrent event may have finished the association meanwhile.
                if let Some(label) = index.label_for(record.id, namespace)? {
                    return Ok(Resolution {
                        label,
                        created: false,
                    });
                }
                self.labels
                    .create_or_adopt(namespace, &record.title, &slug)?
            }
            other => other?,
        };

        let label = self.read_back(claim)?;
        if let Err(err) = self.records.set_pointer(record.id, namespace, label.id) {
            error!(
                "event=pointer_write module=resolver status=error record_id={} namespace={} label_id={} error={}",
                record.id, namespace, label.id, err
            );
            return Err(err.into());
        }

        info!(
            "event=label_resolved module=resolver status=ok record_id={} namespace={} label_id={} adopted={}",
            record.id, namespace, label.id, claim.adopted
        );
        Ok(Resolution {
            label,
            created: !claim.adopted,
        })
    }

    fn read_back(&self, claim: LabelClaim) -> SyncResult<ShadowLabel> {
        self.labels
            .get(claim.id)?
            .ok_or(SyncError::InconsistentState(
                "claimed label not found in read-back",
            ))
    }
}

/// Slug a record's label should carry.
///
/// Blank record slugs fall back to the slugified title, then to the record id.
pub fn mirrored_slug(record: &Record) -> String {
    let slug = record.slug.trim();
    if !slug.is_empty() {
        return slug.to_string();
    }
    let derived = slugify(&record.title);
    if derived.is_empty() {
        record.id.to_string()
    } else {
        derived
    }
}
