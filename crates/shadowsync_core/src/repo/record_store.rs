//! Record store port and SQLite implementation.
//!
//! # Responsibility
//! - Expose the only record attribute the engine writes: the per-namespace
//!   label pointer.
//! - Provide host-side record CRUD for the SQLite reference store.
//!
//! # Invariants
//! - At most one pointer per `(record, namespace)`.
//! - `query_by_pointer` is a point query on the `(namespace, label_id)` index.
//! - Pointers are not removed by `delete_record`; only `clear_pointer` does.

use crate::model::label::LabelId;
use crate::model::record::{normalize_values, Record, RecordId, RecordStatus};
use crate::repo::{ensure_tables, StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Port over the externally owned record store.
pub trait RecordStore {
    /// Reads one record with its current memberships.
    fn get(&self, id: RecordId) -> StoreResult<Option<Record>>;
    fn get_pointer(&self, id: RecordId, namespace: &str) -> StoreResult<Option<LabelId>>;
    fn set_pointer(&self, id: RecordId, namespace: &str, label_id: LabelId) -> StoreResult<()>;
    /// Removes the pointer. Clearing an absent pointer is a no-op.
    fn clear_pointer(&self, id: RecordId, namespace: &str) -> StoreResult<()>;
    /// Returns every record whose pointer in `namespace` equals `label_id`.
    fn query_by_pointer(&self, namespace: &str, label_id: LabelId)
        -> StoreResult<BTreeSet<RecordId>>;
    fn has_membership(&self, id: RecordId, namespace: &str, value: &str) -> StoreResult<bool>;
    /// Lists record ids of one type, used for bulk resync.
    fn list_ids_by_type(&self, record_type: &str) -> StoreResult<Vec<RecordId>>;
}

/// SQLite-backed record store.
#[derive(Clone, Copy)]
pub struct SqliteRecordStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRecordStore<'conn> {
    /// Constructs a store from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_tables(
            conn,
            &[
                ("records", &["id", "record_type", "title", "slug", "status"]),
                ("record_memberships", &["record_id", "namespace", "value"]),
                ("record_pointers", &["record_id", "namespace", "label_id"]),
            ],
        )?;
        Ok(Self { conn })
    }

    /// Inserts one record and its memberships.
    pub fn create_record(&self, record: &Record) -> StoreResult<RecordId> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO records (id, record_type, title, slug, status)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                record.id.to_string(),
                record.record_type.as_str(),
                record.title.as_str(),
                record.slug.as_str(),
                record.status.as_str(),
            ],
        )?;
        insert_memberships(&tx, record)?;
        tx.commit()?;
        Ok(record.id)
    }

    /// Replaces every field and the full membership set of an existing record.
    pub fn update_record(&self, record: &Record) -> StoreResult<()> {
        let id_text = record.id.to_string();
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE records
             SET
                record_type = ?2,
                title = ?3,
                slug = ?4,
                status = ?5,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                id_text,
                record.record_type.as_str(),
                record.title.as_str(),
                record.slug.as_str(),
                record.status.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::RecordNotFound(record.id));
        }

        tx.execute(
            "DELETE FROM record_memberships WHERE record_id = ?1;",
            [id_text.as_str()],
        )?;
        insert_memberships(&tx, record)?;
        tx.commit()?;
        Ok(())
    }

    /// Replaces the membership values of one record in one namespace.
    pub fn set_memberships(
        &self,
        id: RecordId,
        namespace: &str,
        values: &[String],
    ) -> StoreResult<()> {
        let id_text = id.to_string();
        let tx = self.conn.unchecked_transaction()?;
        if !record_exists(&tx, &id_text)? {
            return Err(StoreError::RecordNotFound(id));
        }

        tx.execute(
            "DELETE FROM record_memberships WHERE record_id = ?1 AND namespace = ?2;",
            params![id_text, namespace],
        )?;
        for value in normalize_values(values) {
            tx.execute(
                "INSERT INTO record_memberships (record_id, namespace, value)
                 VALUES (?1, ?2, ?3);",
                params![id_text, namespace, value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn set_status(&self, id: RecordId, status: RecordStatus) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE records
             SET status = ?2, updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), status.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::RecordNotFound(id));
        }
        Ok(())
    }

    /// Hard-deletes one record row and its memberships.
    ///
    /// Pointer rows survive until the removal event clears them.
    pub fn delete_record(&self, id: RecordId) -> StoreResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM records WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(StoreError::RecordNotFound(id));
        }
        Ok(())
    }
}

impl RecordStore for SqliteRecordStore<'_> {
    fn get(&self, id: RecordId) -> StoreResult<Option<Record>> {
        let id_text = id.to_string();
        let mut stmt = self.conn.prepare(
            "SELECT id, record_type, title, slug, status
             FROM records
             WHERE id = ?1;",
        )?;
        let mut rows = stmt.query([id_text.as_str()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let mut record = parse_record_row(row)?;
        record.memberships = load_memberships(self.conn, &id_text)?;
        Ok(Some(record))
    }

    fn get_pointer(&self, id: RecordId, namespace: &str) -> StoreResult<Option<LabelId>> {
        let label_id = self
            .conn
            .query_row(
                "SELECT label_id
                 FROM record_pointers
                 WHERE record_id = ?1 AND namespace = ?2;",
                params![id.to_string(), namespace],
                |row| row.get::<_, LabelId>(0),
            )
            .optional()?;
        Ok(label_id)
    }

    fn set_pointer(&self, id: RecordId, namespace: &str, label_id: LabelId) -> StoreResult<()> {
        let id_text = id.to_string();
        if !record_exists(self.conn, &id_text)? {
            return Err(StoreError::RecordNotFound(id));
        }

        self.conn.execute(
            "INSERT INTO record_pointers (record_id, namespace, label_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (record_id, namespace)
             DO UPDATE SET label_id = excluded.label_id;",
            params![id_text, namespace, label_id],
        )?;
        Ok(())
    }

    fn clear_pointer(&self, id: RecordId, namespace: &str) -> StoreResult<()> {
        self.conn.execute(
            "DELETE FROM record_pointers WHERE record_id = ?1 AND namespace = ?2;",
            params![id.to_string(), namespace],
        )?;
        Ok(())
    }

    fn query_by_pointer(
        &self,
        namespace: &str,
        label_id: LabelId,
    ) -> StoreResult<BTreeSet<RecordId>> {
        let mut stmt = self.conn.prepare(
            "SELECT record_id
             FROM record_pointers
             WHERE namespace = ?1 AND label_id = ?2;",
        )?;
        let mut rows = stmt.query(params![namespace, label_id])?;
        let mut ids = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            ids.insert(parse_record_id(&text)?);
        }
        Ok(ids)
    }

    fn has_membership(&self, id: RecordId, namespace: &str, value: &str) -> StoreResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM record_memberships
                WHERE record_id = ?1 AND namespace = ?2 AND value = ?3
            );",
            params![id.to_string(), namespace, value.trim().to_lowercase()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn list_ids_by_type(&self, record_type: &str) -> StoreResult<Vec<RecordId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id
             FROM records
             WHERE record_type = ?1
             ORDER BY updated_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query([record_type])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            ids.push(parse_record_id(&text)?);
        }
        Ok(ids)
    }
}

fn insert_memberships(conn: &Connection, record: &Record) -> StoreResult<()> {
    let id_text = record.id.to_string();
    for (namespace, values) in &record.memberships {
        for value in values {
            conn.execute(
                "INSERT OR IGNORE INTO record_memberships (record_id, namespace, value)
                 VALUES (?1, ?2, ?3);",
                params![id_text, namespace, value.trim().to_lowercase()],
            )?;
        }
    }
    Ok(())
}

fn load_memberships(
    conn: &Connection,
    record_id: &str,
) -> StoreResult<BTreeMap<String, BTreeSet<String>>> {
    let mut stmt = conn.prepare(
        "SELECT namespace, value
         FROM record_memberships
         WHERE record_id = ?1;",
    )?;
    let mut rows = stmt.query([record_id])?;
    let mut memberships: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let namespace: String = row.get("namespace")?;
        let value: String = row.get("value")?;
        memberships.entry(namespace).or_default().insert(value);
    }
    Ok(memberships)
}

fn record_exists(conn: &Connection, record_id: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM records WHERE id = ?1);",
        [record_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn parse_record_row(row: &Row<'_>) -> StoreResult<Record> {
    let id_text: String = row.get("id")?;
    let status_text: String = row.get("status")?;
    let status = RecordStatus::parse(&status_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid status `{status_text}` in records.status"))
    })?;

    Ok(Record {
        id: parse_record_id(&id_text)?,
        record_type: row.get("record_type")?,
        title: row.get("title")?,
        slug: row.get("slug")?,
        status,
        memberships: BTreeMap::new(),
    })
}

fn parse_record_id(value: &str) -> StoreResult<RecordId> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid value `{value}` in records.id")))
}

#[cfg(test)]
mod tests {
    use super::{RecordStore, SqliteRecordStore};
    use crate::db::open_db_in_memory;
    use crate::model::record::{Record, RecordStatus};
    use crate::repo::StoreError;
    use rusqlite::Connection;
    use uuid::Uuid;

    #[test]
    fn rejects_unmigrated_connection() {
        let conn = Connection::open_in_memory().expect("in-memory db");
        let err = SqliteRecordStore::try_new(&conn)
            .err()
            .expect("missing tables must be rejected");
        assert!(matches!(err, StoreError::MissingRequiredTable("records")));
    }

    #[test]
    fn get_loads_memberships_and_status() {
        let conn = open_db_in_memory().expect("db");
        let store = SqliteRecordStore::try_new(&conn).expect("store");
        let mut record = Record::new("widget", "Alpha", "alpha");
        record.status = RecordStatus::Draft;
        record.add_membership("color", "Red");
        store.create_record(&record).expect("create");

        let loaded = store.get(record.id).expect("get").expect("exists");
        assert_eq!(loaded, record);
        assert!(store.has_membership(record.id, "color", "RED").expect("query"));
        assert!(!store.has_membership(record.id, "color", "blue").expect("query"));
    }

    #[test]
    fn pointer_is_upserted_and_cleared_idempotently() {
        let conn = open_db_in_memory().expect("db");
        let store = SqliteRecordStore::try_new(&conn).expect("store");
        let record = Record::new("widget", "Alpha", "alpha");
        store.create_record(&record).expect("create");

        store.set_pointer(record.id, "shadow", 7).expect("set");
        store.set_pointer(record.id, "shadow", 9).expect("overwrite");
        assert_eq!(store.get_pointer(record.id, "shadow").expect("get"), Some(9));
        assert!(store.query_by_pointer("shadow", 7).expect("query").is_empty());
        assert_eq!(store.query_by_pointer("shadow", 9).expect("query").len(), 1);

        store.clear_pointer(record.id, "shadow").expect("clear");
        store.clear_pointer(record.id, "shadow").expect("clear again");
        assert_eq!(store.get_pointer(record.id, "shadow").expect("get"), None);
    }

    #[test]
    fn set_pointer_requires_existing_record() {
        let conn = open_db_in_memory().expect("db");
        let store = SqliteRecordStore::try_new(&conn).expect("store");
        let missing = Uuid::new_v4();
        let err = store.set_pointer(missing, "shadow", 1).unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound(id) if id == missing));
    }

    #[test]
    fn delete_record_keeps_pointer_row() {
        let conn = open_db_in_memory().expect("db");
        let store = SqliteRecordStore::try_new(&conn).expect("store");
        let record = Record::new("widget", "Alpha", "alpha");
        store.create_record(&record).expect("create");
        store.set_pointer(record.id, "shadow", 3).expect("set");

        store.delete_record(record.id).expect("delete");
        assert!(store.get(record.id).expect("get").is_none());
        assert_eq!(store.get_pointer(record.id, "shadow").expect("get"), Some(3));
    }

    #[test]
    fn set_memberships_replaces_one_namespace_only() {
        let conn = open_db_in_memory().expect("db");
        let store = SqliteRecordStore::try_new(&conn).expect("store");
        let mut record = Record::new("widget", "Alpha", "alpha");
        record.add_membership("color", "red");
        record.add_membership("size", "large");
        store.create_record(&record).expect("create");

        store
            .set_memberships(record.id, "color", &["Blue".to_string(), " ".to_string()])
            .expect("replace");
        let loaded = store.get(record.id).expect("get").expect("exists");
        assert!(loaded.has_membership("color", "blue"));
        assert!(!loaded.has_membership("color", "red"));
        assert!(loaded.has_membership("size", "large"));
    }
}
