//! OpalDB: a single-node relational database engine with a small SQL
//! dialect, durable schema-validated tables, and secondary indexes.
//!
//! The public surface is intentionally narrow: open a database with
//! [`RelationalDB::open`] and feed it statements through
//! [`RelationalDB::execute`], which returns a [`QueryResult`] and never
//! panics on bad input. Everything else — the catalog, the storage layer,
//! the index engine — hangs off the engine handle and shares its lifetime;
//! there is no global state.

pub mod db;
pub mod error;
pub mod sql;

pub use db::relational_db::RelationalDB;
pub use db::schema::{Column, ColumnConstraint, Schema};
pub use db::value::{DataType, Value};
pub use error::DBError;
pub use sql::execute::QueryResult;
