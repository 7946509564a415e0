//! Durable per-table row storage.
//!
//! Rows live in memory in a `BTreeMap` keyed by row id and are written
//! through to one JSON document per table. Every mutating call rewrites the
//! document atomically (temp file, fsync, rename), so a crash exposes either
//! the pre-call or the post-call state — never a torn file. The row-id
//! counter is part of the persisted state and never runs backwards.

use crate::db::value::Value;
use crate::db::write_json_atomic;
use crate::error::DBError;
use chrono::{DateTime, Utc};
use opaldb_primitives::RowId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A single stored row. `data` is positional, pinned by the table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub row_id: RowId,
    pub data: Vec<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// On-disk shape of a table file.
#[derive(Debug, Serialize, Deserialize)]
struct TableFile {
    rows: Vec<Row>,
    next_row_id: i64,
    last_modified: DateTime<Utc>,
}

pub struct TableStorage {
    table_name: String,
    path: PathBuf,
    rows: BTreeMap<RowId, Row>,
    next_row_id: RowId,
    last_modified: DateTime<Utc>,
}

impl TableStorage {
    pub fn file_path(data_dir: &Path, table_name: &str) -> PathBuf {
        data_dir.join(format!("{table_name}.json"))
    }

    /// Create storage for a new table and persist its (empty) file.
    pub fn create(data_dir: &Path, table_name: &str) -> Result<Self, DBError> {
        let storage = TableStorage {
            table_name: table_name.to_string(),
            path: Self::file_path(data_dir, table_name),
            rows: BTreeMap::new(),
            next_row_id: RowId::FIRST,
            last_modified: Utc::now(),
        };
        storage.persist()?;
        Ok(storage)
    }

    /// Open existing storage. The file must exist; recovery treats a
    /// cataloged table without its file as an error, not an empty table.
    pub fn open(data_dir: &Path, table_name: &str) -> Result<Self, DBError> {
        let path = Self::file_path(data_dir, table_name);
        let contents = fs::read(&path)?;
        let file: TableFile = serde_json::from_slice(&contents)?;
        let rows: BTreeMap<RowId, Row> = file.rows.into_iter().map(|r| (r.row_id, r)).collect();
        Ok(TableStorage {
            table_name: table_name.to_string(),
            path,
            rows,
            next_row_id: RowId(file.next_row_id),
            last_modified: file.last_modified,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// Assign the next row id and persist the row.
    pub fn insert(&mut self, data: Vec<Value>) -> Result<RowId, DBError> {
        let row_id = self.next_row_id;
        self.next_row_id = row_id.next();
        let now = Utc::now();
        self.rows.insert(
            row_id,
            Row {
                row_id,
                data,
                created_at: now,
                updated_at: now,
            },
        );
        self.last_modified = now;
        self.persist()?;
        Ok(row_id)
    }

    /// Bulk insert under a single durable write. Ids are consecutive.
    pub fn insert_many(&mut self, rows: Vec<Vec<Value>>) -> Result<Vec<RowId>, DBError> {
        let now = Utc::now();
        let mut ids = Vec::with_capacity(rows.len());
        for data in rows {
            let row_id = self.next_row_id;
            self.next_row_id = row_id.next();
            self.rows.insert(
                row_id,
                Row {
                    row_id,
                    data,
                    created_at: now,
                    updated_at: now,
                },
            );
            ids.push(row_id);
        }
        self.last_modified = now;
        self.persist()?;
        Ok(ids)
    }

    pub fn get(&self, row_id: RowId) -> Option<&Row> {
        self.rows.get(&row_id)
    }

    /// Overwrite a row's data, refreshing `updated_at`. Returns `false` if
    /// the row does not exist.
    pub fn update(&mut self, row_id: RowId, data: Vec<Value>) -> Result<bool, DBError> {
        let Some(row) = self.rows.get_mut(&row_id) else {
            return Ok(false);
        };
        row.data = data;
        row.updated_at = Utc::now();
        self.last_modified = row.updated_at;
        self.persist()?;
        Ok(true)
    }

    pub fn delete(&mut self, row_id: RowId) -> Result<bool, DBError> {
        if self.rows.remove(&row_id).is_none() {
            return Ok(false);
        }
        self.last_modified = Utc::now();
        self.persist()?;
        Ok(true)
    }

    /// Remove every row, keeping the row-id counter where it was.
    pub fn delete_all(&mut self) -> Result<usize, DBError> {
        let count = self.rows.len();
        self.rows.clear();
        self.last_modified = Utc::now();
        self.persist()?;
        Ok(count)
    }

    /// Rows in row-id order.
    pub fn scan(&self) -> impl Iterator<Item = &Row> {
        self.rows.values()
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    fn persist(&self) -> Result<(), DBError> {
        let file = TableFile {
            rows: self.rows.values().cloned().collect(),
            next_row_id: self.next_row_id.0,
            last_modified: self.last_modified,
        };
        write_json_atomic(&self.path, &file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TableStorage, TempDir) {
        let tmp = TempDir::new().unwrap();
        let storage = TableStorage::create(tmp.path(), "users").unwrap();
        (storage, tmp)
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let (mut storage, _tmp) = setup();
        let a = storage.insert(vec![Value::Int(1)]).unwrap();
        let b = storage.insert(vec![Value::Int(2)]).unwrap();
        assert_eq!(a, RowId(1));
        assert_eq!(b, RowId(2));
        assert_eq!(storage.count(), 2);
    }

    #[test]
    fn ids_are_never_reused_after_delete() {
        let (mut storage, _tmp) = setup();
        let a = storage.insert(vec![Value::Int(1)]).unwrap();
        assert!(storage.delete(a).unwrap());
        let b = storage.insert(vec![Value::Int(2)]).unwrap();
        assert_eq!(b, RowId(2));
    }

    #[test]
    fn update_refreshes_updated_at() {
        let (mut storage, _tmp) = setup();
        let id = storage.insert(vec![Value::Int(1)]).unwrap();
        let created = storage.get(id).unwrap().created_at;
        assert!(storage.update(id, vec![Value::Int(5)]).unwrap());
        let row = storage.get(id).unwrap();
        assert_eq!(row.data, vec![Value::Int(5)]);
        assert!(row.updated_at >= created);
        assert!(!storage.update(RowId(99), vec![]).unwrap());
    }

    #[test]
    fn scan_is_in_row_id_order() {
        let (mut storage, _tmp) = setup();
        let ids = storage
            .insert_many(vec![
                vec![Value::Int(10)],
                vec![Value::Int(20)],
                vec![Value::Int(30)],
            ])
            .unwrap();
        assert_eq!(ids, vec![RowId(1), RowId(2), RowId(3)]);
        let seen: Vec<RowId> = storage.scan().map(|r| r.row_id).collect();
        assert_eq!(seen, ids);
    }

    #[test]
    fn reopen_restores_rows_and_counter() {
        let tmp = TempDir::new().unwrap();
        {
            let mut storage = TableStorage::create(tmp.path(), "t").unwrap();
            storage.insert(vec![Value::Text("a".into())]).unwrap();
            storage.insert(vec![Value::Text("b".into())]).unwrap();
            storage.delete(RowId(2)).unwrap();
        }
        let mut storage = TableStorage::open(tmp.path(), "t").unwrap();
        assert_eq!(storage.count(), 1);
        // The counter survives the reopen; id 2 is not handed out again.
        assert_eq!(storage.insert(vec![Value::Null]).unwrap(), RowId(3));
    }

    #[test]
    fn delete_all_keeps_counter() {
        let (mut storage, _tmp) = setup();
        storage.insert(vec![Value::Int(1)]).unwrap();
        storage.insert(vec![Value::Int(2)]).unwrap();
        assert_eq!(storage.delete_all().unwrap(), 2);
        assert_eq!(storage.count(), 0);
        assert_eq!(storage.insert(vec![Value::Int(3)]).unwrap(), RowId(3));
    }

    #[test]
    fn open_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(TableStorage::open(tmp.path(), "ghost").is_err());
    }
}
