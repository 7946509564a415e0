//! The engine handle.
//!
//! A [`RelationalDB`] owns the catalog, the per-table storage and index
//! handles, and the data-directory lock; everything is scoped to the
//! handle's lifetime. Statements come in through [`RelationalDB::execute`].
//!
//! Locking: the table map takes a read lock to find a table, each table has
//! its own `RwLock` serializing writers while letting readers share, and
//! the catalog has its own mutex. Locks are always taken in that order
//! (map, table, catalog), so statements cannot deadlock each other.

use crate::db::catalog::{Catalog, IndexEntry, TableEntry};
use crate::db::index::btree::{BTreeIndex, IndexStats};
use crate::db::index::IndexManager;
use crate::db::lock_file::LockFile;
use crate::db::schema::Schema;
use crate::db::storage::TableStorage;
use crate::db::value::Value;
use crate::error::{DBError, NotFoundError, SchemaError};
use crate::sql::execute::{run_statement, QueryResult};
use anyhow::anyhow;
use opaldb_sql_parser::{parse, ParseError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A table's schema, rows and indexes. The enclosing `RwLock` co-locks all
/// three, so storage and indexes can never be observed out of step.
pub(crate) struct TableState {
    pub schema: Schema,
    pub storage: TableStorage,
    pub indexes: IndexManager,
}

pub struct RelationalDB {
    data_dir: PathBuf,
    catalog: Mutex<Catalog>,
    tables: RwLock<HashMap<String, Arc<RwLock<TableState>>>>,
    // Dropped last: fields drop in declaration order and the advisory lock
    // must outlive every file handle.
    _lock: LockFile,
}

impl RelationalDB {
    /// Open a database at `data_dir`, creating the directory if needed and
    /// recovering all tables and indexes listed in the catalog.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, DBError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        let lock = LockFile::lock(&data_dir)?;
        let catalog = Catalog::open(&data_dir)?;

        let mut tables = HashMap::new();
        for (name, entry) in catalog.tables() {
            let storage = TableStorage::open(&data_dir, name).map_err(|e| {
                DBError::Internal(anyhow!(
                    "recovery: table `{name}` is cataloged but its storage cannot be opened: {e}"
                ))
            })?;
            let indexes = IndexManager::open(&data_dir, name)?;
            tables.insert(
                name.to_string(),
                Arc::new(RwLock::new(TableState {
                    schema: entry.schema.clone(),
                    storage,
                    indexes,
                })),
            );
        }

        // Reattach every cataloged index, rebuilding any whose on-disk
        // contents are missing. A dangling index is a recovery error.
        for entry in catalog.indexes() {
            let state = tables.get(&entry.table).ok_or_else(|| {
                DBError::Internal(anyhow!(
                    "recovery: index `{}` references missing table `{}`",
                    entry.name,
                    entry.table
                ))
            })?;
            let mut state = state.write();
            if state.schema.column(&entry.column).is_none() {
                return Err(DBError::Internal(anyhow!(
                    "recovery: index `{}` references missing column `{}.{}`",
                    entry.name,
                    entry.table,
                    entry.column
                )));
            }
            if !state.indexes.has_index(&entry.column) {
                log::warn!(
                    "index `{}` on `{}.{}` has no on-disk contents, rebuilding",
                    entry.name,
                    entry.table,
                    entry.column
                );
                state
                    .indexes
                    .adopt(BTreeIndex::new(entry.column.clone(), entry.unique))?;
                let rows: Vec<_> = state
                    .storage
                    .scan()
                    .map(|r| (r.row_id, r.data.clone()))
                    .collect();
                let schema = state.schema.clone();
                state
                    .indexes
                    .rebuild(&schema, &entry.column, rows.into_iter())?;
            }
        }

        // Indexes on disk but not in the catalog are stale; the catalog is
        // the source of truth.
        for state in tables.values() {
            let mut state = state.write();
            let table = state.storage.table_name().to_string();
            let stale: Vec<String> = state
                .indexes
                .columns()
                .filter(|col| catalog.index_on(&table, col).is_none())
                .map(str::to_string)
                .collect();
            for col in stale {
                log::warn!("dropping uncataloged index on `{table}.{col}`");
                state.indexes.drop_index(&col)?;
            }
        }

        log::info!(
            "database opened at {}: {} tables, {} indexes",
            data_dir.display(),
            catalog.tables().count(),
            catalog.indexes().count()
        );

        Ok(RelationalDB {
            data_dir,
            catalog: Mutex::new(catalog),
            tables: RwLock::new(tables),
            _lock: lock,
        })
    }

    /// Execute one SQL statement. Never panics on bad input; every failure
    /// comes back as `QueryResult { success: false, .. }`.
    pub fn execute(&self, sql: &str) -> QueryResult {
        self.execute_with_params(sql, &[])
    }

    /// Execute a statement with `?` placeholders bound positionally from
    /// `params`.
    pub fn execute_with_params(&self, sql: &str, params: &[Value]) -> QueryResult {
        match self.run(sql, params) {
            Ok(result) => result,
            Err(err) => {
                log::debug!("statement failed: {err}");
                QueryResult::failure(err.to_string())
            }
        }
    }

    pub(crate) fn run(&self, sql: &str, params: &[Value]) -> Result<QueryResult, DBError> {
        let ast = parse(sql)?;
        let expected = ast.param_count();
        if expected != params.len() {
            return Err(ParseError::ParamCount {
                expected,
                given: params.len(),
            }
            .into());
        }
        run_statement(self, ast, params)
    }

    /// Handle to a table's state, or `NotFound`.
    pub(crate) fn table(&self, name: &str) -> Result<Arc<RwLock<TableState>>, DBError> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| NotFoundError::Table(name.to_string()).into())
    }

    // DDL. These hold the table-map write lock so two concurrent DDL
    // statements on the same name serialize cleanly.

    /// Register a validated schema: storage file, implicit unique indexes
    /// for PRIMARY KEY and UNIQUE columns, catalog entry. The catalog save
    /// is the commit point; nothing is registered on any column error.
    pub(crate) fn create_table(&self, schema: Schema) -> Result<(), DBError> {
        let mut tables = self.tables.write();
        let name = schema.table_name.clone();
        if tables.contains_key(&name) {
            return Err(SchemaError::TableExists(name).into());
        }

        let storage = TableStorage::create(&self.data_dir, &name)?;
        let mut indexes = IndexManager::new(&self.data_dir, &name);
        for (_, col) in schema.unique_columns() {
            indexes.adopt(BTreeIndex::new(col.name.clone(), true))?;
        }

        {
            let mut catalog = self.catalog.lock();
            catalog.register_table(schema.clone());
            for (_, col) in schema.unique_columns() {
                let index_name = format!("{name}_{}_key", col.name);
                catalog.register_index(&index_name, &name, &col.name, true);
            }
            catalog.save()?;
        }

        log::debug!("created table `{name}`");
        tables.insert(
            name,
            Arc::new(RwLock::new(TableState {
                schema,
                storage,
                indexes,
            })),
        );
        Ok(())
    }

    /// Drop a table, its indexes and its rows. Ordered so a crash cannot
    /// leave an index pointing at a missing table: index file first, then
    /// the catalog (the commit point), then the storage file. At worst an
    /// orphaned, uncataloged storage file survives a crash.
    pub(crate) fn drop_table(&self, name: &str) -> Result<(), DBError> {
        let mut tables = self.tables.write();
        let state = tables
            .get(name)
            .ok_or_else(|| NotFoundError::Table(name.to_string()))?
            .clone();

        state.write().indexes.drop_all()?;
        {
            let mut catalog = self.catalog.lock();
            catalog.unregister_table(name);
            catalog.save()?;
        }
        tables.remove(name);

        let storage_path = TableStorage::file_path(&self.data_dir, name);
        if storage_path.exists() {
            fs::remove_file(storage_path)?;
        }
        log::debug!("dropped table `{name}`");
        Ok(())
    }

    /// Create an index and populate it from the existing rows. A unique
    /// violation during population discards the half-built index and
    /// registers nothing.
    pub(crate) fn create_index(
        &self,
        index_name: &str,
        table: &str,
        column: &str,
        unique: bool,
    ) -> Result<(), DBError> {
        let state_arc = self.table(table)?;
        let mut state = state_arc.write();
        let Some(col_id) = state.schema.col_id(column) else {
            return Err(NotFoundError::Column(column.to_string()).into());
        };

        let mut catalog = self.catalog.lock();
        if state.indexes.has_index(column)
            || catalog.index_on(table, column).is_some()
            || catalog.index_by_name(table, index_name).is_some()
        {
            return Err(SchemaError::IndexExists {
                index: index_name.to_string(),
                table: table.to_string(),
                column: column.to_string(),
            }
            .into());
        }

        let mut index = BTreeIndex::new(column.to_string(), unique);
        for row in state.storage.scan() {
            let key = &row.data[col_id.idx()];
            if key.is_null() {
                continue;
            }
            index.insert(key.clone(), row.row_id)?;
        }

        state.indexes.adopt(index)?;
        catalog.register_index(index_name, table, column, unique);
        catalog.save()?;
        log::debug!("created index `{index_name}` on `{table}.{column}`");
        Ok(())
    }

    /// Drop an index by name.
    pub(crate) fn drop_index(&self, table: &str, index_name: &str) -> Result<(), DBError> {
        let state_arc = self.table(table)?;
        let mut state = state_arc.write();
        let mut catalog = self.catalog.lock();

        let entry = catalog
            .index_by_name(table, index_name)
            .cloned()
            .ok_or_else(|| NotFoundError::Index {
                index: index_name.to_string(),
                table: table.to_string(),
            })?;

        state.indexes.drop_index(&entry.column)?;
        catalog.unregister_index(table, &entry.column);
        catalog.save()?;
        log::debug!("dropped index `{index_name}` on `{table}.{}`", entry.column);
        Ok(())
    }

    /// Refresh a table's row count and last-modified time. Durable before
    /// the enclosing statement reports success.
    pub(crate) fn update_table_stats(&self, table: &str, row_count: u64) -> Result<(), DBError> {
        let mut catalog = self.catalog.lock();
        catalog.update_table_stats(table, row_count);
        catalog.save()
    }

    // Catalog introspection.

    /// Names of all tables, sorted.
    pub fn tables(&self) -> Vec<String> {
        self.catalog
            .lock()
            .tables()
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Catalog entry for one table: schema, row count, timestamps.
    pub fn table_info(&self, name: &str) -> Option<TableEntry> {
        self.catalog.lock().table(name).cloned()
    }

    /// Every index the catalog knows about.
    pub fn indexes(&self) -> Vec<IndexEntry> {
        self.catalog.lock().indexes().cloned().collect()
    }

    /// Live statistics for each index of `table`.
    pub fn index_stats(&self, table: &str) -> Result<Vec<IndexStats>, DBError> {
        let state = self.table(table)?;
        let state = state.read();
        Ok(state.indexes.stats())
    }
}
