//! Shadow-label convergence engine.
//!
//! # Responsibility
//! - Keep one shadow label per qualifying record consistent with that record.
//! - React to one lifecycle event at a time, reading state fresh per event.
//!
//! # Invariants
//! - A label is never deleted while another record still points at it.
//! - Mirrored fields change only while exactly one record points at the label.
//! - Replaying an event on a converged record issues no writes.
//! - At most one label mutation and one pointer write per event.
//!
//! # Components (leaf-first)
//! - [`predicate`]: does the record qualify right now?
//! - [`reference_index`]: label -> records and record -> label lookups.
//! - [`resolver`]: find or create-or-adopt the record's label.
//! - [`collector`]: detach a record and delete its label once unreferenced.
//! - [`convergence`]: per-event orchestration of the above.

use crate::model::record::RecordId;
use crate::repo::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod collector;
pub mod convergence;
pub mod predicate;
pub mod reference_index;
pub mod resolver;

pub type SyncResult<T> = Result<T, SyncError>;

/// Failure of one event; the event is considered unprocessed.
#[derive(Debug)]
pub enum SyncError {
    /// Store read/write failed. Redelivery is up to the event source.
    Store(StoreError),
    /// The event names a record the record store does not know.
    RecordNotFound(RecordId),
    /// A write succeeded but its read-back did not.
    InconsistentState(&'static str),
}

impl SyncError {
    /// Returns whether redelivering the event may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(err) => err.is_transient(),
            Self::RecordNotFound(_) | Self::InconsistentState(_) => false,
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::RecordNotFound(id) => write!(f, "record not found: {id}"),
            Self::InconsistentState(details) => write!(f, "inconsistent shadow state: {details}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::RecordNotFound(id) => Self::RecordNotFound(id),
            other => Self::Store(other),
        }
    }
}
