//! Shadow label domain model.
//!
//! # Responsibility
//! - Define the derived entity mirroring a record's `title` and `slug`.
//! - Derive URL-safe slugs for records that carry none.
//!
//! # Invariants
//! - A label lives in exactly one namespace for its whole lifetime.
//! - `(namespace, slug)` and `(namespace, name)` identify at most one label.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static NON_SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug regex"));

/// Store-assigned label identifier.
pub type LabelId = i64;

/// Derived entity owned by the external label store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowLabel {
    pub id: LabelId,
    pub namespace: String,
    /// Mirrors the authoritative record's `title`.
    pub name: String,
    /// Mirrors the authoritative record's `slug`.
    pub slug: String,
}

impl ShadowLabel {
    /// Returns whether mirrored fields already equal `(name, slug)`.
    pub fn mirrors(&self, name: &str, slug: &str) -> bool {
        self.name == name && self.slug == slug
    }
}

/// Derives a URL-safe slug from a display title.
///
/// Rules: lowercase, runs of non `[a-z0-9]` characters collapse into one `-`,
/// no leading/trailing `-`. Returns an empty string for titles with no
/// ASCII alphanumerics.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let replaced = NON_SLUG_RE.replace_all(&lowered, "-");
    replaced.trim_matches('-').to_string()
}
