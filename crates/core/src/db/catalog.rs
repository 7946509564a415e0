//! The system catalog: one durable document describing every table and
//! index.
//!
//! The catalog is the recovery root. On startup the engine reads it back,
//! reopens each cataloged table's storage and reattaches index handles;
//! anything the catalog names that is missing on disk is a recovery error.
//! A catalog write is the commit point of every DDL statement, so saves
//! happen before success is reported.

use crate::db::schema::Schema;
use crate::db::write_json_atomic;
use crate::error::DBError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CATALOG_FILE: &str = "catalog.json";
const CATALOG_VERSION: &str = "0.3.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    pub schema: Schema,
    pub row_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub table: String,
    pub column: String,
    pub unique: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CatalogDoc {
    version: String,
    created_at: DateTime<Utc>,
    /// Keyed by table name.
    tables: BTreeMap<String, TableEntry>,
    /// Keyed by `table.column`.
    indexes: BTreeMap<String, IndexEntry>,
}

impl CatalogDoc {
    fn new() -> Self {
        CatalogDoc {
            version: CATALOG_VERSION.to_string(),
            created_at: Utc::now(),
            tables: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }
}

pub struct Catalog {
    path: PathBuf,
    doc: CatalogDoc,
}

impl Catalog {
    /// Load the catalog document, initializing a fresh one for a new data
    /// directory.
    pub fn open(data_dir: &Path) -> Result<Self, DBError> {
        let path = data_dir.join(CATALOG_FILE);
        let doc = if path.exists() {
            serde_json::from_slice(&fs::read(&path)?)?
        } else {
            let doc = CatalogDoc::new();
            write_json_atomic(&path, &doc)?;
            doc
        };
        Ok(Catalog { path, doc })
    }

    pub fn save(&self) -> Result<(), DBError> {
        write_json_atomic(&self.path, &self.doc)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.doc.created_at
    }

    pub fn version(&self) -> &str {
        &self.doc.version
    }

    fn index_key(table: &str, column: &str) -> String {
        format!("{table}.{column}")
    }

    // In-memory mutations only; callers batch them and `save` once per
    // statement.

    pub fn register_table(&mut self, schema: Schema) {
        let now = Utc::now();
        self.doc.tables.insert(
            schema.table_name.clone(),
            TableEntry {
                schema,
                row_count: 0,
                created_at: now,
                last_modified: now,
            },
        );
    }

    /// Remove a table and every index registered against it.
    pub fn unregister_table(&mut self, table: &str) {
        self.doc.tables.remove(table);
        self.doc.indexes.retain(|_, entry| entry.table != table);
    }

    pub fn register_index(&mut self, name: &str, table: &str, column: &str, unique: bool) {
        self.doc.indexes.insert(
            Self::index_key(table, column),
            IndexEntry {
                name: name.to_string(),
                table: table.to_string(),
                column: column.to_string(),
                unique,
                created_at: Utc::now(),
            },
        );
    }

    pub fn unregister_index(&mut self, table: &str, column: &str) {
        self.doc.indexes.remove(&Self::index_key(table, column));
    }

    pub fn update_table_stats(&mut self, table: &str, row_count: u64) {
        if let Some(entry) = self.doc.tables.get_mut(table) {
            entry.row_count = row_count;
            entry.last_modified = Utc::now();
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableEntry> {
        self.doc.tables.get(name)
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.doc.tables.contains_key(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &TableEntry)> {
        self.doc.tables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn indexes(&self) -> impl Iterator<Item = &IndexEntry> {
        self.doc.indexes.values()
    }

    pub fn index_on(&self, table: &str, column: &str) -> Option<&IndexEntry> {
        self.doc.indexes.get(&Self::index_key(table, column))
    }

    /// Look an index up by its name within one table.
    pub fn index_by_name(&self, table: &str, name: &str) -> Option<&IndexEntry> {
        self.doc
            .indexes
            .values()
            .find(|entry| entry.table == table && entry.name == name)
    }
}
