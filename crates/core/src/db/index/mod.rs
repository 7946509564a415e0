//! Index engine: per-table index set plus the coordination primitives the
//! executor drives.
//!
//! The manager iterates indexes in column-name order, so multi-index
//! operations have a defined order and a failure can unwind exactly the
//! prefix it already applied. Null keys are never indexed; the null checks
//! live here so [`btree::BTreeIndex`] can assume non-null keys.

pub mod btree;

use crate::db::schema::Schema;
use crate::db::value::Value;
use crate::db::write_json_atomic;
use crate::error::{DBError, IndexError};
use btree::{BTreeIndex, IndexSnapshot, IndexStats};
use opaldb_primitives::RowId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk shape of a table's index file.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    table_name: String,
    indexes: Vec<IndexSnapshot>,
}

/// All indexes of one table, keyed by indexed column.
pub struct IndexManager {
    table_name: String,
    path: PathBuf,
    indexes: BTreeMap<String, BTreeIndex>,
}

impl IndexManager {
    pub fn file_path(data_dir: &Path, table_name: &str) -> PathBuf {
        data_dir.join(format!("{table_name}_indexes.json"))
    }

    pub fn new(data_dir: &Path, table_name: &str) -> Self {
        IndexManager {
            table_name: table_name.to_string(),
            path: Self::file_path(data_dir, table_name),
            indexes: BTreeMap::new(),
        }
    }

    /// Load a table's indexes from its index file, if one exists.
    pub fn open(data_dir: &Path, table_name: &str) -> Result<Self, DBError> {
        let path = Self::file_path(data_dir, table_name);
        let mut indexes = BTreeMap::new();
        if path.exists() {
            let contents = fs::read(&path)?;
            let file: IndexFile = serde_json::from_slice(&contents)?;
            for snapshot in file.indexes {
                let index = BTreeIndex::from_snapshot(snapshot);
                indexes.insert(index.column().to_string(), index);
            }
        }
        Ok(IndexManager {
            table_name: table_name.to_string(),
            path,
            indexes,
        })
    }

    pub fn get(&self, column: &str) -> Option<&BTreeIndex> {
        self.indexes.get(column)
    }

    pub fn has_index(&self, column: &str) -> bool {
        self.indexes.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(|s| s.as_str())
    }

    pub fn stats(&self) -> Vec<IndexStats> {
        self.indexes.values().map(|idx| idx.stats()).collect()
    }

    /// Register a fully built index and persist. The caller builds and
    /// populates the index first so a failed population never registers.
    pub fn adopt(&mut self, index: BTreeIndex) -> Result<(), DBError> {
        self.indexes.insert(index.column().to_string(), index);
        self.save()
    }

    /// Drop one index. Removing the last index also removes the index file,
    /// keeping the on-disk set in step with the catalog.
    pub fn drop_index(&mut self, column: &str) -> Result<bool, DBError> {
        if self.indexes.remove(column).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Add a row to every index of the table, in column order. On the first
    /// failure every insert already applied in this call is rolled back.
    pub fn insert_into_indexes(
        &mut self,
        schema: &Schema,
        row_id: RowId,
        data: &[Value],
    ) -> Result<(), DBError> {
        let mut applied: Vec<(String, Value)> = Vec::new();
        let mut failed = None;

        for (column, index) in self.indexes.iter_mut() {
            let Some(key) = Self::key_for(schema, column, data) else {
                continue;
            };
            match index.insert(key.clone(), row_id) {
                Ok(()) => applied.push((column.clone(), key.clone())),
                Err(err) => {
                    failed = Some(err);
                    break;
                }
            }
        }

        if let Some(err) = failed {
            for (column, key) in applied {
                if let Some(index) = self.indexes.get_mut(&column) {
                    index.delete(&key, Some(row_id));
                }
            }
            log::debug!(
                "index insert rolled back for row {row_id} of `{}`: {err}",
                self.table_name
            );
            return Err(err.into());
        }

        self.save()
    }

    /// Remove a row's entries from every index of the table.
    pub fn delete_from_indexes(
        &mut self,
        schema: &Schema,
        row_id: RowId,
        data: &[Value],
    ) -> Result<(), DBError> {
        for (column, index) in self.indexes.iter_mut() {
            if let Some(key) = Self::key_for(schema, column, data) {
                index.delete(key, Some(row_id));
            }
        }
        self.save()
    }

    /// Re-key a row in every index whose key changed. On failure, indexes
    /// already re-keyed in this call are moved back.
    pub fn update_indexes(
        &mut self,
        schema: &Schema,
        row_id: RowId,
        old_data: &[Value],
        new_data: &[Value],
    ) -> Result<(), DBError> {
        // (column, old key, new key); a null stands for "not indexed".
        let mut applied: Vec<(String, Value, Value)> = Vec::new();
        let mut failed = None;

        for (column, index) in self.indexes.iter_mut() {
            let old_key = Self::key_for(schema, column, old_data);
            let new_key = Self::key_for(schema, column, new_data);

            let result = match (old_key, new_key) {
                (None, None) => continue,
                (Some(old), Some(new)) if old == new => continue,
                (Some(old), Some(new)) => index.update(old, new.clone(), row_id).map(|()| {
                    applied.push((column.clone(), old.clone(), new.clone()));
                }),
                (None, Some(new)) => index.insert(new.clone(), row_id).map(|()| {
                    applied.push((column.clone(), Value::Null, new.clone()));
                }),
                (Some(old), None) => {
                    index.delete(old, Some(row_id));
                    applied.push((column.clone(), old.clone(), Value::Null));
                    continue;
                }
            };

            if let Err(err) = result {
                failed = Some(err);
                break;
            }
        }

        if let Some(err) = failed {
            for (column, old_key, new_key) in applied {
                let Some(index) = self.indexes.get_mut(&column) else {
                    continue;
                };
                // Undo in the weaker direction: the old key was free a
                // moment ago, so re-inserting it cannot fail.
                match (old_key.is_null(), new_key.is_null()) {
                    (true, false) => index.delete(&new_key, Some(row_id)),
                    (false, true) => {
                        let _ = index.insert(old_key, row_id);
                    }
                    _ => {
                        let _ = index.update(&new_key, old_key, row_id);
                    }
                }
            }
            log::debug!(
                "index update rolled back for row {row_id} of `{}`: {err}",
                self.table_name
            );
            return Err(err.into());
        }

        self.save()
    }

    /// Clear one index and refill it from the live rows.
    pub fn rebuild(
        &mut self,
        schema: &Schema,
        column: &str,
        rows: impl Iterator<Item = (RowId, Vec<Value>)>,
    ) -> Result<(), DBError> {
        let Some(col_id) = schema.col_id(column) else {
            return Ok(());
        };
        let Some(index) = self.indexes.get_mut(column) else {
            return Ok(());
        };
        index.clear();
        let mut failure: Option<IndexError> = None;
        for (row_id, data) in rows {
            let key = &data[col_id.idx()];
            if key.is_null() {
                continue;
            }
            if let Err(err) = index.insert(key.clone(), row_id) {
                failure = Some(err);
                break;
            }
        }
        if let Some(err) = failure {
            return Err(err.into());
        }
        self.save()
    }

    /// The row's key for `column`; `None` when the value is null (null keys
    /// are never indexed) or the column is gone from the schema.
    fn key_for<'a>(schema: &Schema, column: &str, data: &'a [Value]) -> Option<&'a Value> {
        let col_id = schema.col_id(column)?;
        let value = data.get(col_id.idx())?;
        (!value.is_null()).then_some(value)
    }

    fn save(&self) -> Result<(), DBError> {
        if self.indexes.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        let file = IndexFile {
            table_name: self.table_name.clone(),
            indexes: self.indexes.values().map(|idx| idx.snapshot()).collect(),
        };
        write_json_atomic(&self.path, &file)
    }

    /// Remove every index and the index file. Used by `DROP TABLE`.
    pub fn drop_all(&mut self) -> Result<(), DBError> {
        self.indexes.clear();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{Column, ColumnConstraint};
    use crate::db::value::DataType;
    use tempfile::TempDir;

    fn test_schema() -> Schema {
        Schema::new(
            "users".into(),
            vec![
                Column {
                    name: "id".into(),
                    data_type: DataType::Integer,
                    max_length: None,
                    constraints: vec![ColumnConstraint::PrimaryKey],
                    default: None,
                },
                Column {
                    name: "email".into(),
                    data_type: DataType::Varchar,
                    max_length: Some(50),
                    constraints: vec![ColumnConstraint::Unique],
                    default: None,
                },
                Column {
                    name: "age".into(),
                    data_type: DataType::Integer,
                    max_length: None,
                    constraints: vec![],
                    default: None,
                },
            ],
        )
        .unwrap()
    }

    fn manager_with_indexes(dir: &Path) -> IndexManager {
        let mut mgr = IndexManager::new(dir, "users");
        mgr.adopt(BTreeIndex::new("id", true)).unwrap();
        mgr.adopt(BTreeIndex::new("email", true)).unwrap();
        mgr.adopt(BTreeIndex::new("age", false)).unwrap();
        mgr
    }

    fn row(id: i64, email: &str, age: i64) -> Vec<Value> {
        vec![
            Value::Int(id),
            Value::Text(email.into()),
            Value::Int(age),
        ]
    }

    #[test]
    fn insert_populates_every_index() {
        let tmp = TempDir::new().unwrap();
        let schema = test_schema();
        let mut mgr = manager_with_indexes(tmp.path());

        mgr.insert_into_indexes(&schema, RowId(1), &row(1, "a@x", 30))
            .unwrap();
        assert_eq!(
            mgr.get("age").unwrap().point_lookup(&Value::Int(30)),
            vec![RowId(1)]
        );
        assert_eq!(
            mgr.get("email")
                .unwrap()
                .point_lookup(&Value::Text("a@x".into())),
            vec![RowId(1)]
        );
    }

    #[test]
    fn failed_insert_rolls_back_earlier_indexes() {
        let tmp = TempDir::new().unwrap();
        let schema = test_schema();
        let mut mgr = manager_with_indexes(tmp.path());

        mgr.insert_into_indexes(&schema, RowId(1), &row(1, "a@x", 30))
            .unwrap();
        // Indexes apply in column order (age, email, id). The duplicate
        // email fails second, so the age entry must be rolled back and the
        // id index never touched.
        let err = mgr
            .insert_into_indexes(&schema, RowId(2), &row(2, "a@x", 40))
            .unwrap_err();
        assert!(matches!(err, DBError::Index(IndexError::Unique { .. })));
        assert!(mgr.get("age").unwrap().point_lookup(&Value::Int(40)).is_empty());
        assert!(mgr.get("id").unwrap().point_lookup(&Value::Int(2)).is_empty());
    }

    #[test]
    fn null_keys_are_not_indexed() {
        let tmp = TempDir::new().unwrap();
        let schema = test_schema();
        let mut mgr = manager_with_indexes(tmp.path());

        mgr.insert_into_indexes(
            &schema,
            RowId(1),
            &[Value::Int(1), Value::Null, Value::Null],
        )
        .unwrap();
        assert_eq!(mgr.get("email").unwrap().len(), 0);
        assert_eq!(mgr.get("age").unwrap().len(), 0);
        assert_eq!(mgr.get("id").unwrap().len(), 1);
    }

    #[test]
    fn update_rekeys_changed_columns_only() {
        let tmp = TempDir::new().unwrap();
        let schema = test_schema();
        let mut mgr = manager_with_indexes(tmp.path());

        let old = row(1, "a@x", 30);
        let new = row(1, "a@x", 31);
        mgr.insert_into_indexes(&schema, RowId(1), &old).unwrap();
        mgr.update_indexes(&schema, RowId(1), &old, &new).unwrap();

        assert_eq!(
            mgr.get("age").unwrap().point_lookup(&Value::Int(31)),
            vec![RowId(1)]
        );
        assert!(mgr.get("age").unwrap().point_lookup(&Value::Int(30)).is_empty());
        assert_eq!(mgr.get("email").unwrap().len(), 1);
    }

    #[test]
    fn update_to_null_deletes_and_back_inserts() {
        let tmp = TempDir::new().unwrap();
        let schema = test_schema();
        let mut mgr = manager_with_indexes(tmp.path());

        let old = row(1, "a@x", 30);
        let nulled = vec![Value::Int(1), Value::Null, Value::Int(30)];
        mgr.insert_into_indexes(&schema, RowId(1), &old).unwrap();
        mgr.update_indexes(&schema, RowId(1), &old, &nulled).unwrap();
        assert!(mgr.get("email").unwrap().is_empty());

        mgr.update_indexes(&schema, RowId(1), &nulled, &old).unwrap();
        assert_eq!(
            mgr.get("email")
                .unwrap()
                .point_lookup(&Value::Text("a@x".into())),
            vec![RowId(1)]
        );
    }

    #[test]
    fn failed_update_restores_prior_state() {
        let tmp = TempDir::new().unwrap();
        let schema = test_schema();
        let mut mgr = manager_with_indexes(tmp.path());

        mgr.insert_into_indexes(&schema, RowId(1), &row(1, "a", 30))
            .unwrap();
        mgr.insert_into_indexes(&schema, RowId(2), &row(2, "b", 40))
            .unwrap();

        // email "b" collides with row 2; the age re-key that happened first
        // must be undone.
        let err = mgr
            .update_indexes(&schema, RowId(1), &row(1, "a", 30), &row(1, "b", 35))
            .unwrap_err();
        assert!(matches!(err, DBError::Index(IndexError::Unique { .. })));
        assert_eq!(
            mgr.get("age").unwrap().point_lookup(&Value::Int(30)),
            vec![RowId(1)]
        );
        assert!(mgr.get("age").unwrap().point_lookup(&Value::Int(35)).is_empty());
        assert_eq!(
            mgr.get("email").unwrap().point_lookup(&Value::Text("a".into())),
            vec![RowId(1)]
        );
    }

    #[test]
    fn delete_removes_row_everywhere() {
        let tmp = TempDir::new().unwrap();
        let schema = test_schema();
        let mut mgr = manager_with_indexes(tmp.path());

        let data = row(1, "a@x", 30);
        mgr.insert_into_indexes(&schema, RowId(1), &data).unwrap();
        mgr.delete_from_indexes(&schema, RowId(1), &data).unwrap();
        assert!(mgr.get("id").unwrap().is_empty());
        assert!(mgr.get("email").unwrap().is_empty());
        assert!(mgr.get("age").unwrap().is_empty());
    }

    #[test]
    fn dropping_last_index_removes_file() {
        let tmp = TempDir::new().unwrap();
        let mut mgr = IndexManager::new(tmp.path(), "users");
        mgr.adopt(BTreeIndex::new("age", false)).unwrap();
        let path = IndexManager::file_path(tmp.path(), "users");
        assert!(path.exists());
        assert!(mgr.drop_index("age").unwrap());
        assert!(!path.exists());
        assert!(!mgr.drop_index("age").unwrap());
    }

    #[test]
    fn reopen_restores_index_contents() {
        let tmp = TempDir::new().unwrap();
        let schema = test_schema();
        {
            let mut mgr = manager_with_indexes(tmp.path());
            mgr.insert_into_indexes(&schema, RowId(1), &row(1, "a@x", 30))
                .unwrap();
        }
        let mgr = IndexManager::open(tmp.path(), "users").unwrap();
        assert!(mgr.get("email").unwrap().is_unique());
        assert_eq!(
            mgr.get("age").unwrap().point_lookup(&Value::Int(30)),
            vec![RowId(1)]
        );
    }

    #[test]
    fn rebuild_skips_nulls_and_reports_unique_violations() {
        let tmp = TempDir::new().unwrap();
        let schema = test_schema();
        let mut mgr = IndexManager::new(tmp.path(), "users");
        mgr.adopt(BTreeIndex::new("email", true)).unwrap();

        let rows = vec![
            (RowId(1), row(1, "a", 10)),
            (RowId(2), vec![Value::Int(2), Value::Null, Value::Int(20)]),
        ];
        mgr.rebuild(&schema, "email", rows.into_iter()).unwrap();
        assert_eq!(mgr.get("email").unwrap().len(), 1);

        let dup = vec![(RowId(1), row(1, "a", 10)), (RowId(2), row(2, "a", 20))];
        assert!(mgr.rebuild(&schema, "email", dup.into_iter()).is_err());
    }
}
