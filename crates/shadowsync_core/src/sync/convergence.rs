//! Per-event convergence of one record into its shadow label.
//!
//! Event path:
//!
//! ```text
//! Received -> Evaluated -> Skipped                          (never qualified)
//!                       -> Retracted                        (qualified before, not now)
//!                       -> Resolved -> Frozen(shared)       (>= 2 references)
//!                                   -> Frozen(in sync)      (nothing to write)
//!                                   -> Frozen(collision)    (name/slug held by another label)
//!                                   -> Applied              (mirrored fields written)
//! ```
//!
//! # Invariants
//! - Mirrored fields are written only while the record is the sole reference.
//! - A name/slug collision on update leaves the label as is; the next event
//!   retries once the other label frees the name.
//! - A converged record produces no writes; this is what stops a label update
//!   from re-triggering itself through host hooks.
//! - Trashed/deleted records never qualify.

use crate::model::conditions::Conditions;
use crate::model::label::ShadowLabel;
use crate::model::record::Record;
use crate::repo::label_store::LabelStore;
use crate::repo::record_store::RecordStore;
use crate::repo::StoreError;
use crate::sync::collector::{GarbageCollector, RetractOutcome};
use crate::sync::predicate::PredicateEvaluator;
use crate::sync::reference_index::ReferenceIndex;
use crate::sync::resolver::{mirrored_slug, LabelResolver, Resolution};
use crate::sync::SyncResult;
use log::{debug, info, warn};

/// Why mirrored fields were left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeReason {
    /// More than one record points at the label; no record is authoritative.
    SharedAuthority { references: usize },
    /// Label already mirrors the record.
    InSync,
    /// Another label in the namespace already holds the record's name or slug.
    Collision,
}

/// Terminal state of one convergence event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceOutcome {
    Skipped,
    Retracted(RetractOutcome),
    Applied {
        label: ShadowLabel,
        created: bool,
    },
    Frozen {
        label: ShadowLabel,
        created: bool,
        reason: FreezeReason,
    },
}

impl ConvergenceOutcome {
    /// Label the record is associated with after the event, if any.
    pub fn label(&self) -> Option<&ShadowLabel> {
        match self {
            Self::Applied { label, .. } | Self::Frozen { label, .. } => Some(label),
            Self::Skipped | Self::Retracted(_) => None,
        }
    }

    fn status(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Retracted(_) => "retracted",
            Self::Applied { .. } => "applied",
            Self::Frozen {
                reason: FreezeReason::SharedAuthority { .. },
                ..
            } => "frozen_shared",
            Self::Frozen {
                reason: FreezeReason::InSync,
                ..
            } => "frozen_in_sync",
            Self::Frozen {
                reason: FreezeReason::Collision,
                ..
            } => "frozen_collision",
        }
    }
}

/// Convergence predicate: does `label` already mirror `record`?
pub fn is_converged(label: &ShadowLabel, record: &Record) -> bool {
    label.mirrors(&record.title, &mirrored_slug(record))
}

pub struct ConvergenceEngine<'s, R: ?Sized, L: ?Sized> {
    records: &'s R,
    labels: &'s L,
    predicate: &'s PredicateEvaluator,
}

impl<'s, R, L> ConvergenceEngine<'s, R, L>
where
    R: RecordStore + ?Sized,
    L: LabelStore + ?Sized,
{
    pub fn new(records: &'s R, labels: &'s L, predicate: &'s PredicateEvaluator) -> Self {
        Self {
            records,
            labels,
            predicate,
        }
    }

    /// Reacts to one change event for `record` in `namespace`.
    ///
    /// `conditions` must already be validated.
    pub fn converge(
        &self,
        record: &Record,
        namespace: &str,
        conditions: &Conditions,
    ) -> SyncResult<ConvergenceOutcome> {
        let outcome = self.run(record, namespace, conditions)?;
        let label_id = outcome
            .label()
            .map_or_else(|| "none".to_string(), |label| label.id.to_string());
        if matches!(
            outcome,
            ConvergenceOutcome::Skipped
                | ConvergenceOutcome::Frozen {
                    reason: FreezeReason::InSync,
                    created: false,
                    ..
                }
        ) {
            debug!(
                "event=converge module=convergence status={} record_id={} namespace={}",
                outcome.status(),
                record.id,
                namespace
            );
        } else {
            info!(
                "event=converge module=convergence status={} record_id={} namespace={} label_id={}",
                outcome.status(),
                record.id,
                namespace,
                label_id
            );
        }
        Ok(outcome)
    }

    fn run(
        &self,
        record: &Record,
        namespace: &str,
        conditions: &Conditions,
    ) -> SyncResult<ConvergenceOutcome> {
        let qualifies = !record.is_removed() && self.predicate.qualifies(record, conditions);
        if !qualifies {
            if self.records.get_pointer(record.id, namespace)?.is_none() {
                return Ok(ConvergenceOutcome::Skipped);
            }
            let retracted =
                GarbageCollector::new(self.records, self.labels).retract(record.id, namespace)?;
            return Ok(ConvergenceOutcome::Retracted(retracted));
        }

        let Resolution { label, created } =
            LabelResolver::new(self.records, self.labels).resolve(record, namespace)?;

        let references = ReferenceIndex::new(self.records, self.labels)
            .reference_count_including(record.id, &label)?;
        if references > 1 {
            return Ok(ConvergenceOutcome::Frozen {
                label,
                created,
                reason: FreezeReason::SharedAuthority { references },
            });
        }

        if is_converged(&label, record) {
            return Ok(ConvergenceOutcome::Frozen {
                label,
                created,
                reason: FreezeReason::InSync,
            });
        }

        let slug = mirrored_slug(record);
        match self.labels.update(label.id, &record.title, &slug) {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => {
                warn!(
                    "event=label_update module=convergence status=frozen reason=collision record_id={} namespace={} label_id={}",
                    record.id, namespace, label.id
                );
                return Ok(ConvergenceOutcome::Frozen {
                    label,
                    created,
                    reason: FreezeReason::Collision,
                });
            }
            Err(err) => return Err(err.into()),
        }
        Ok(ConvergenceOutcome::Applied {
            label: ShadowLabel {
                name: record.title.clone(),
                slug,
                ..label
            },
            created,
        })
    }
}
