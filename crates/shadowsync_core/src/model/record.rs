//! Record domain model.
//!
//! # Responsibility
//! - Define the primary entity mirrored by shadow labels.
//! - Keep namespace memberships in normalized form for predicate evaluation.
//!
//! # Invariants
//! - `id` is stable and never reused for another record.
//! - Membership values are trimmed and lowercase.
//! - The shadow pointer is not a membership; it lives in the record store.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Stable identifier for every record.
pub type RecordId = Uuid;

/// Lifecycle state for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Draft,
    Published,
    /// Soft-removed; may still be restored by the host.
    Trashed,
    /// Permanently removed; the host drops the row after notifying the engine.
    Deleted,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Trashed => "trashed",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            "trashed" => Some(Self::Trashed),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Primary entity owned by the external record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Serialized as `type` to match host schema naming.
    #[serde(rename = "type")]
    pub record_type: String,
    pub title: String,
    /// URL-safe identity string. May be blank for records that never got one.
    pub slug: String,
    pub status: RecordStatus,
    /// Namespace -> held values (term slugs), excluding the shadow pointer.
    #[serde(default)]
    pub memberships: BTreeMap<String, BTreeSet<String>>,
}

impl Record {
    /// Creates a published record with a generated stable ID.
    pub fn new(
        record_type: impl Into<String>,
        title: impl Into<String>,
        slug: impl Into<String>,
    ) -> Self {
        Self::with_id(Uuid::new_v4(), record_type, title, slug)
    }

    /// Creates a published record with a caller-provided stable ID.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(
        id: RecordId,
        record_type: impl Into<String>,
        title: impl Into<String>,
        slug: impl Into<String>,
    ) -> Self {
        Self {
            id,
            record_type: record_type.into(),
            title: title.into(),
            slug: slug.into(),
            status: RecordStatus::Published,
            memberships: BTreeMap::new(),
        }
    }

    /// Adds one membership value in `namespace`, normalizing the value.
    ///
    /// Blank values are ignored.
    pub fn add_membership(&mut self, namespace: &str, value: &str) {
        if let Some(value) = normalize_value(value) {
            self.memberships
                .entry(namespace.trim().to_string())
                .or_default()
                .insert(value);
        }
    }

    /// Returns whether the record currently holds `value` in `namespace`.
    pub fn has_membership(&self, namespace: &str, value: &str) -> bool {
        let Some(values) = self.memberships.get(namespace) else {
            return false;
        };
        match normalize_value(value) {
            Some(normalized) => values.contains(&normalized),
            None => false,
        }
    }

    /// Returns whether this record has left its active lifecycle.
    pub fn is_removed(&self) -> bool {
        matches!(self.status, RecordStatus::Trashed | RecordStatus::Deleted)
    }
}

/// Normalizes one membership value (trim + lowercase).
pub fn normalize_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes and deduplicates membership values.
pub fn normalize_values(values: &[String]) -> BTreeSet<String> {
    values
        .iter()
        .filter_map(|value| normalize_value(value))
        .collect()
}
