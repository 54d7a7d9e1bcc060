//! Event dispatcher holding explicit subscription objects.
//!
//! # Responsibility
//! - Register `(record_type, namespace, conditions)` subscriptions at startup.
//! - Route lifecycle events to the convergence engine or the collector.
//!
//! # Invariants
//! - Conditions are validated at `subscribe`, never per event.
//! - At most one subscription per `(record_type, namespace)`.
//! - Records are read fresh from the store on every event.
//! - Store errors propagate to the caller; nothing is retried here.

use crate::config::SyncConfig;
use crate::model::conditions::{ConditionSpecError, Conditions};
use crate::model::record::{Record, RecordId};
use crate::repo::label_store::LabelStore;
use crate::repo::record_store::RecordStore;
use crate::service::query_service::ShadowQueryService;
use crate::sync::collector::{GarbageCollector, RetractOutcome};
use crate::sync::convergence::{ConvergenceEngine, ConvergenceOutcome};
use crate::sync::predicate::PredicateEvaluator;
use crate::sync::{SyncError, SyncResult};
use log::{error, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Opaque handle returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(u64);

/// One registered subscription with validated conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub record_type: String,
    pub namespace: String,
    pub conditions: Conditions,
}

impl Subscription {
    fn applies_to(&self, record: &Record) -> bool {
        self.record_type == record.record_type
    }
}

/// Subscription registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    BlankRecordType,
    BlankNamespace,
    InvalidConditions {
        namespace: String,
        source: ConditionSpecError,
    },
    Duplicate {
        record_type: String,
        namespace: String,
    },
}

impl Display for SubscriptionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankRecordType => write!(f, "subscription record type must not be blank"),
            Self::BlankNamespace => write!(f, "subscription namespace must not be blank"),
            Self::InvalidConditions { namespace, source } => {
                write!(f, "invalid conditions for `{namespace}`: {source}")
            }
            Self::Duplicate {
                record_type,
                namespace,
            } => write!(
                f,
                "subscription already registered for `{record_type}` -> `{namespace}`"
            ),
        }
    }
}

impl Error for SubscriptionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidConditions { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Outcome of one event in one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    pub namespace: String,
    pub outcome: ConvergenceOutcome,
}

/// Counters returned by [`EventDispatcher::resync_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncSummary {
    pub records_visited: usize,
    pub created: usize,
    pub applied: usize,
    pub frozen: usize,
    pub retracted: usize,
    pub skipped: usize,
    /// Records whose event failed; each is logged and the resync moves on.
    pub failed: usize,
}

impl ResyncSummary {
    fn record(&mut self, outcome: &ConvergenceOutcome) {
        match outcome {
            ConvergenceOutcome::Skipped => self.skipped += 1,
            ConvergenceOutcome::Retracted(_) => self.retracted += 1,
            ConvergenceOutcome::Applied { created, .. } => {
                self.applied += 1;
                self.created += usize::from(*created);
            }
            ConvergenceOutcome::Frozen { created, .. } => {
                self.frozen += 1;
                self.created += usize::from(*created);
            }
        }
    }
}

/// In-process dispatcher over one record store and one label store.
pub struct EventDispatcher<R, L> {
    records: R,
    labels: L,
    predicate: PredicateEvaluator,
    subscriptions: BTreeMap<SubscriptionHandle, Subscription>,
    next_handle: u64,
}

impl<R: RecordStore, L: LabelStore> EventDispatcher<R, L> {
    pub fn new(records: R, labels: L) -> Self {
        Self {
            records,
            labels,
            predicate: PredicateEvaluator::default(),
            subscriptions: BTreeMap::new(),
            next_handle: 1,
        }
    }

    /// Replaces the predicate evaluator (e.g. to add clause strategies).
    pub fn with_predicate(mut self, predicate: PredicateEvaluator) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn records(&self) -> &R {
        &self.records
    }

    pub fn labels(&self) -> &L {
        &self.labels
    }

    /// Read-only queries over the same stores.
    pub fn query(&self) -> ShadowQueryService<'_, R, L> {
        ShadowQueryService::new(&self.records, &self.labels)
    }

    /// Registers one subscription after validating its conditions.
    pub fn subscribe(
        &mut self,
        record_type: &str,
        namespace: &str,
        conditions: Conditions,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        let record_type = record_type.trim();
        let namespace = namespace.trim();
        if record_type.is_empty() {
            return Err(SubscriptionError::BlankRecordType);
        }
        if namespace.is_empty() {
            return Err(SubscriptionError::BlankNamespace);
        }
        if self
            .subscriptions
            .values()
            .any(|sub| sub.record_type == record_type && sub.namespace == namespace)
        {
            return Err(SubscriptionError::Duplicate {
                record_type: record_type.to_string(),
                namespace: namespace.to_string(),
            });
        }

        let conditions =
            conditions
                .validate(namespace)
                .map_err(|source| SubscriptionError::InvalidConditions {
                    namespace: namespace.to_string(),
                    source,
                })?;

        let handle = SubscriptionHandle(self.next_handle);
        self.next_handle += 1;
        self.subscriptions.insert(
            handle,
            Subscription {
                handle,
                record_type: record_type.to_string(),
                namespace: namespace.to_string(),
                conditions,
            },
        );
        info!(
            "event=subscribe module=dispatcher status=ok record_type={} namespace={}",
            record_type, namespace
        );
        Ok(handle)
    }

    /// Registers every subscription in `config`, stopping at the first error.
    pub fn subscribe_all(
        &mut self,
        config: &SyncConfig,
    ) -> Result<Vec<SubscriptionHandle>, SubscriptionError> {
        config
            .subscriptions
            .iter()
            .map(|sub| self.subscribe(&sub.record_type, &sub.namespace, sub.conditions.clone()))
            .collect()
    }

    /// Removes one subscription. Returns `false` for unknown handles.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        self.subscriptions.remove(&handle).is_some()
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    /// Handles create/update of one record.
    ///
    /// Trashed/deleted records are routed to retraction.
    pub fn on_record_changed(&self, record_id: RecordId) -> SyncResult<Vec<EventReport>> {
        self.dispatch("record_changed", record_id, |_| true)
    }

    /// Handles a membership change in `namespace`.
    ///
    /// Only subscriptions shadowing other namespaces are re-evaluated.
    pub fn on_memberships_changed(
        &self,
        record_id: RecordId,
        namespace: &str,
    ) -> SyncResult<Vec<EventReport>> {
        self.dispatch("memberships_changed", record_id, |sub| {
            sub.namespace != namespace
        })
    }

    /// Handles trash/permanent delete of one record.
    ///
    /// When the record is already gone from the store, every subscribed
    /// namespace is retracted, since its type is no longer known.
    pub fn on_record_removed(&self, record_id: RecordId) -> SyncResult<Vec<EventReport>> {
        let result = self.retract_everywhere(record_id);
        if let Err(err) = &result {
            error!(
                "event=record_removed module=dispatcher status=error record_id={} error={}",
                record_id, err
            );
        }
        result
    }

    /// Converges every record of every subscribed type once.
    ///
    /// A failing record is counted in `failed` and does not stop the run;
    /// only listing record ids can fail the whole resync.
    pub fn resync_all(&self) -> SyncResult<ResyncSummary> {
        let mut summary = ResyncSummary::default();
        let record_types: BTreeSet<&str> = self
            .subscriptions
            .values()
            .map(|sub| sub.record_type.as_str())
            .collect();

        for record_type in record_types {
            for record_id in self.records.list_ids_by_type(record_type)? {
                summary.records_visited += 1;
                match self.on_record_changed(record_id) {
                    Ok(reports) => {
                        for report in reports {
                            summary.record(&report.outcome);
                        }
                    }
                    Err(err) => {
                        summary.failed += 1;
                        warn!(
                            "event=resync module=dispatcher status=record_failed record_id={} transient={}",
                            record_id,
                            err.is_transient()
                        );
                    }
                }
            }
        }

        info!(
            "event=resync module=dispatcher status=ok records={} created={} applied={} frozen={} retracted={} skipped={} failed={}",
            summary.records_visited,
            summary.created,
            summary.applied,
            summary.frozen,
            summary.retracted,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    fn dispatch(
        &self,
        event: &'static str,
        record_id: RecordId,
        filter: impl Fn(&Subscription) -> bool,
    ) -> SyncResult<Vec<EventReport>> {
        let result = self
            .records
            .get(record_id)
            .map_err(SyncError::from)
            .and_then(|record| record.ok_or(SyncError::RecordNotFound(record_id)))
            .and_then(|record| self.converge_matching(&record, filter));
        if let Err(err) = &result {
            error!(
                "event={} module=dispatcher status=error record_id={} error={}",
                event, record_id, err
            );
        }
        result
    }

    fn converge_matching(
        &self,
        record: &Record,
        filter: impl Fn(&Subscription) -> bool,
    ) -> SyncResult<Vec<EventReport>> {
        let engine = ConvergenceEngine::new(&self.records, &self.labels, &self.predicate);
        let mut reports = Vec::new();
        for sub in self
            .subscriptions
            .values()
            .filter(|sub| sub.applies_to(record) && filter(sub))
        {
            let outcome = engine.converge(record, &sub.namespace, &sub.conditions)?;
            reports.push(EventReport {
                namespace: sub.namespace.clone(),
                outcome,
            });
        }
        Ok(reports)
    }

    fn retract_everywhere(&self, record_id: RecordId) -> SyncResult<Vec<EventReport>> {
        let record = self.records.get(record_id)?;
        let namespaces: BTreeSet<&str> = self
            .subscriptions
            .values()
            .filter(|sub| record.as_ref().map_or(true, |record| sub.applies_to(record)))
            .map(|sub| sub.namespace.as_str())
            .collect();

        let collector = GarbageCollector::new(&self.records, &self.labels);
        let mut reports = Vec::with_capacity(namespaces.len());
        for namespace in namespaces {
            let outcome = collector.retract(record_id, namespace)?;
            if outcome != RetractOutcome::NoPointer {
                info!(
                    "event=record_removed module=dispatcher status=ok record_id={} namespace={}",
                    record_id, namespace
                );
            }
            reports.push(EventReport {
                namespace: namespace.to_string(),
                outcome: ConvergenceOutcome::Retracted(outcome),
            });
        }
        Ok(reports)
    }
}
