//! Domain model for records, shadow labels and qualification conditions.
//!
//! # Responsibility
//! - Define canonical data structures used by the convergence engine.
//! - Keep storage concerns out of the model.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordId`.
//! - Labels are keyed by store-assigned `LabelId` within one namespace.

pub mod conditions;
pub mod label;
pub mod record;
