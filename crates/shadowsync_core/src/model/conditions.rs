//! Qualification conditions declared per subscription.
//!
//! # Responsibility
//! - Describe which records qualify for shadow-label membership.
//! - Validate and normalize a declaration before any event is processed.
//!
//! # Invariants
//! - Validated conditions never contain blank namespaces or values.
//! - No clause targets the shadow namespace it gates.
//! - Clause namespaces are unique within one condition set.

use crate::model::record::normalize_value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Boolean combinator over clauses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConditionOperator {
    #[default]
    And,
    Or,
}

/// One membership requirement: at least one of `required_values` in `namespace`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionClause {
    pub namespace: String,
    pub required_values: Vec<String>,
}

impl ConditionClause {
    pub fn new(namespace: impl Into<String>, required_values: &[&str]) -> Self {
        Self {
            namespace: namespace.into(),
            required_values: required_values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Declarative qualification rules.
///
/// `Conditions::default()` is the empty condition set: every record qualifies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default)]
    pub operator: ConditionOperator,
    #[serde(default)]
    pub clauses: Vec<ConditionClause>,
    /// Records of any other type fail regardless of clauses.
    #[serde(default)]
    pub record_type: Option<String>,
}

impl Conditions {
    pub fn all_of(clauses: Vec<ConditionClause>) -> Self {
        Self {
            operator: ConditionOperator::And,
            clauses,
            record_type: None,
        }
    }

    pub fn any_of(clauses: Vec<ConditionClause>) -> Self {
        Self {
            operator: ConditionOperator::Or,
            clauses,
            record_type: None,
        }
    }

    pub fn with_record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty() && self.record_type.is_none()
    }

    /// Validates these conditions for use under `shadow_namespace` and returns the
    /// normalized copy used at evaluation time.
    ///
    /// # Errors
    /// - Blank `record_type` filter.
    /// - Clause with blank namespace, no values, or a blank value.
    /// - Clause targeting `shadow_namespace` itself.
    /// - Two clauses on the same namespace.
    pub fn validate(&self, shadow_namespace: &str) -> Result<Conditions, ConditionSpecError> {
        let record_type = match self.record_type.as_deref() {
            Some(value) if value.trim().is_empty() => {
                return Err(ConditionSpecError::BlankRecordType);
            }
            Some(value) => Some(value.trim().to_string()),
            None => None,
        };

        let mut seen = BTreeSet::<String>::new();
        let mut clauses = Vec::with_capacity(self.clauses.len());
        for (index, clause) in self.clauses.iter().enumerate() {
            let namespace = clause.namespace.trim();
            if namespace.is_empty() {
                return Err(ConditionSpecError::BlankClauseNamespace { index });
            }
            if namespace == shadow_namespace.trim() {
                return Err(ConditionSpecError::SelfReferentialClause(
                    namespace.to_string(),
                ));
            }
            if !seen.insert(namespace.to_string()) {
                return Err(ConditionSpecError::DuplicateClauseNamespace(
                    namespace.to_string(),
                ));
            }
            if clause.required_values.is_empty() {
                return Err(ConditionSpecError::EmptyRequiredValues(
                    namespace.to_string(),
                ));
            }

            let mut values = BTreeSet::new();
            for value in &clause.required_values {
                let Some(normalized) = normalize_value(value) else {
                    return Err(ConditionSpecError::BlankRequiredValue(
                        namespace.to_string(),
                    ));
                };
                values.insert(normalized);
            }

            clauses.push(ConditionClause {
                namespace: namespace.to_string(),
                required_values: values.into_iter().collect(),
            });
        }

        Ok(Conditions {
            operator: self.operator,
            clauses,
            record_type,
        })
    }
}

/// Malformed conditions declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionSpecError {
    BlankRecordType,
    BlankClauseNamespace { index: usize },
    EmptyRequiredValues(String),
    BlankRequiredValue(String),
    SelfReferentialClause(String),
    DuplicateClauseNamespace(String),
}

impl Display for ConditionSpecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankRecordType => write!(f, "record type filter must not be blank"),
            Self::BlankClauseNamespace { index } => {
                write!(f, "clause #{index} has a blank namespace")
            }
            Self::EmptyRequiredValues(namespace) => {
                write!(f, "clause on `{namespace}` lists no required values")
            }
            Self::BlankRequiredValue(namespace) => {
                write!(f, "clause on `{namespace}` contains a blank value")
            }
            Self::SelfReferentialClause(namespace) => {
                write!(f, "clause must not target its own shadow namespace `{namespace}`")
            }
            Self::DuplicateClauseNamespace(namespace) => {
                write!(f, "namespace `{namespace}` appears in more than one clause")
            }
        }
    }
}

impl Error for ConditionSpecError {}
