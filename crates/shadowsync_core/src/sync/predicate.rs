//! Qualification predicate.
//!
//! Pure: reads only the record's in-memory memberships, never the stores.
//! Clause evaluation is a strategy table keyed by namespace; namespaces with
//! no registered strategy use the membership check.

use crate::model::conditions::{ConditionClause, ConditionOperator, Conditions};
use crate::model::record::Record;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Evaluates one clause against one record.
pub trait ClauseEvaluator: Send + Sync {
    fn holds(&self, record: &Record, clause: &ConditionClause) -> bool;
}

/// Default strategy: the record holds at least one required value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MembershipClause;

impl ClauseEvaluator for MembershipClause {
    fn holds(&self, record: &Record, clause: &ConditionClause) -> bool {
        clause
            .required_values
            .iter()
            .any(|value| record.has_membership(&clause.namespace, value))
    }
}

/// Predicate with per-namespace clause strategies.
#[derive(Clone, Default)]
pub struct PredicateEvaluator {
    strategies: BTreeMap<String, Arc<dyn ClauseEvaluator>>,
}

impl PredicateEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes clauses on `namespace` to `evaluator` instead of the membership check.
    pub fn with_strategy(
        mut self,
        namespace: impl Into<String>,
        evaluator: Arc<dyn ClauseEvaluator>,
    ) -> Self {
        self.strategies.insert(namespace.into(), evaluator);
        self
    }

    /// Returns whether `record` currently qualifies under `conditions`.
    ///
    /// A `record_type` mismatch fails before any clause runs. No clauses
    /// means vacuously true for both operators.
    pub fn qualifies(&self, record: &Record, conditions: &Conditions) -> bool {
        if let Some(record_type) = conditions.record_type.as_deref() {
            if record.record_type != record_type {
                return false;
            }
        }
        if conditions.clauses.is_empty() {
            return true;
        }

        let mut results = conditions
            .clauses
            .iter()
            .map(|clause| self.clause_holds(record, clause));
        match conditions.operator {
            ConditionOperator::And => results.all(|holds| holds),
            ConditionOperator::Or => results.any(|holds| holds),
        }
    }

    fn clause_holds(&self, record: &Record, clause: &ConditionClause) -> bool {
        match self.strategies.get(&clause.namespace) {
            Some(strategy) => strategy.holds(record, clause),
            None => MembershipClause.holds(record, clause),
        }
    }
}

/// Evaluates `conditions` with the default membership strategy only.
pub fn qualifies(record: &Record, conditions: &Conditions) -> bool {
    PredicateEvaluator::default().qualifies(record, conditions)
}
