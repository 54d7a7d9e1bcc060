//! Label store port and SQLite implementation.
//!
//! # Responsibility
//! - Persist shadow labels per namespace.
//! - Provide create-or-adopt so concurrent creations converge on one label.
//!
//! # Invariants
//! - `create_or_adopt` never fails on a name/slug collision in SQLite; it
//!   returns the existing label with `adopted = true`.
//! - `update` reports a collision with another label as `StoreError::Conflict`.

use crate::model::label::{LabelId, ShadowLabel};
use crate::repo::{ensure_tables, is_constraint_violation, StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Result of `LabelStore::create_or_adopt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelClaim {
    pub id: LabelId,
    /// `true` when an existing label was returned instead of a new one.
    pub adopted: bool,
}

/// Port over the externally owned label store.
pub trait LabelStore {
    /// Creates a label or returns the one already holding `name` or `slug`.
    ///
    /// Stores without atomic adoption may return `StoreError::Conflict`.
    fn create_or_adopt(&self, namespace: &str, name: &str, slug: &str) -> StoreResult<LabelClaim>;
    fn update(&self, id: LabelId, name: &str, slug: &str) -> StoreResult<()>;
    fn delete(&self, id: LabelId) -> StoreResult<()>;
    fn get(&self, id: LabelId) -> StoreResult<Option<ShadowLabel>>;
}

/// SQLite-backed label store.
#[derive(Clone, Copy)]
pub struct SqliteLabelStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLabelStore<'conn> {
    /// Constructs a store from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_tables(conn, &[("labels", &["id", "namespace", "name", "slug"])])?;
        Ok(Self { conn })
    }

    /// Lists all labels in one namespace sorted by slug.
    pub fn list(&self, namespace: &str) -> StoreResult<Vec<ShadowLabel>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, namespace, name, slug
             FROM labels
             WHERE namespace = ?1
             ORDER BY slug ASC;",
        )?;
        let mut rows = stmt.query([namespace])?;
        let mut labels = Vec::new();
        while let Some(row) = rows.next()? {
            labels.push(parse_label_row(row)?);
        }
        Ok(labels)
    }

    fn find_existing(&self, namespace: &str, name: &str, slug: &str) -> StoreResult<Option<LabelId>> {
        let id = self
            .conn
            .query_row(
                "SELECT id
                 FROM labels
                 WHERE namespace = ?1 AND (slug = ?2 OR name = ?3)
                 ORDER BY CASE WHEN slug = ?2 THEN 0 ELSE 1 END
                 LIMIT 1;",
                params![namespace, slug, name],
                |row| row.get::<_, LabelId>(0),
            )
            .optional()?;
        Ok(id)
    }
}

impl LabelStore for SqliteLabelStore<'_> {
    fn create_or_adopt(&self, namespace: &str, name: &str, slug: &str) -> StoreResult<LabelClaim> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO labels (namespace, name, slug) VALUES (?1, ?2, ?3);",
            params![namespace, name, slug],
        )?;
        if inserted == 1 {
            return Ok(LabelClaim {
                id: self.conn.last_insert_rowid(),
                adopted: false,
            });
        }

        match self.find_existing(namespace, name, slug)? {
            Some(id) => Ok(LabelClaim { id, adopted: true }),
            // Ignored insert with no visible holder: the row vanished in between.
            None => Err(StoreError::Conflict {
                namespace: namespace.to_string(),
                name: name.to_string(),
                slug: slug.to_string(),
            }),
        }
    }

    fn update(&self, id: LabelId, name: &str, slug: &str) -> StoreResult<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE labels SET name = ?2, slug = ?3 WHERE id = ?1;",
                params![id, name, slug],
            )
            .map_err(|err| {
                if is_constraint_violation(&err) {
                    let namespace = self
                        .get(id)
                        .ok()
                        .flatten()
                        .map(|label| label.namespace)
                        .unwrap_or_default();
                    StoreError::Conflict {
                        namespace,
                        name: name.to_string(),
                        slug: slug.to_string(),
                    }
                } else {
                    StoreError::from(err)
                }
            })?;
        if changed == 0 {
            return Err(StoreError::LabelNotFound(id));
        }
        Ok(())
    }

    fn delete(&self, id: LabelId) -> StoreResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM labels WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(StoreError::LabelNotFound(id));
        }
        Ok(())
    }

    fn get(&self, id: LabelId) -> StoreResult<Option<ShadowLabel>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, namespace, name, slug
             FROM labels
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_label_row(row)?)),
            None => Ok(None),
        }
    }
}

fn parse_label_row(row: &Row<'_>) -> StoreResult<ShadowLabel> {
    Ok(ShadowLabel {
        id: row.get("id")?,
        namespace: row.get("namespace")?,
        name: row.get("name")?,
        slug: row.get("slug")?,
    })
}
