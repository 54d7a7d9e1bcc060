//! Store ports consumed by the engine, plus SQLite reference implementations.
//!
//! # Responsibility
//! - Define the `RecordStore` and `LabelStore` contracts the engine writes through.
//! - Isolate SQLite query details from engine orchestration.
//!
//! # Invariants
//! - Ports return semantic errors (`RecordNotFound`, `Conflict`) in addition
//!   to transport errors.
//! - `StoreError::Db` is the only transient error kind.

use crate::db::DbError;
use crate::model::label::LabelId;
use crate::model::record::RecordId;
use rusqlite::{Connection, ErrorCode};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod label_store;
pub mod record_store;

pub type StoreResult<T> = Result<T, StoreError>;

/// Error surfaced by record/label store ports.
#[derive(Debug)]
pub enum StoreError {
    /// Transport failure; the event is unprocessed and may be redelivered.
    Db(DbError),
    RecordNotFound(RecordId),
    LabelNotFound(LabelId),
    /// Name/slug collision reported by a store that cannot adopt atomically.
    Conflict {
        namespace: String,
        name: String,
        slug: String,
    },
    InvalidData(String),
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl StoreError {
    /// Returns whether the failure may succeed on redelivery.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Db(_))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::RecordNotFound(id) => write!(f, "record not found: {id}"),
            Self::LabelNotFound(id) => write!(f, "label not found: {id}"),
            // Name and slug derive from record titles and stay out of log lines.
            Self::Conflict { namespace, .. } => {
                write!(f, "label name or slug already taken in `{namespace}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == ErrorCode::ConstraintViolation
    )
}

pub(crate) fn ensure_tables(
    conn: &Connection,
    required: &[(&'static str, &[&'static str])],
) -> StoreResult<()> {
    for &(table, columns) in required {
        if !table_exists(conn, table)? {
            return Err(StoreError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(StoreError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
