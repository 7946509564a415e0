//! Statement-level error taxonomy.
//!
//! Every executor path maps to exactly one [`DBError`] variant. Errors are
//! structured values; the public entry point flattens them into
//! `QueryResult { success: false, message }`.

use crate::db::value::{DataType, Value};
use enum_as_inner::EnumAsInner;
use opaldb_sql_parser::ParseError;
use thiserror::Error;

#[derive(Error, Debug, EnumAsInner)]
pub enum DBError {
    #[error("ParseError: {0}")]
    Parse(#[from] ParseError),
    #[error("SchemaError: {0}")]
    Schema(#[from] SchemaError),
    #[error("NotFound: {0}")]
    NotFound(#[from] NotFoundError),
    #[error("TypeError: {0}")]
    Type(#[from] TypeError),
    #[error("ConstraintViolation: {0}")]
    Constraint(#[from] ConstraintViolation),
    #[error("IndexError: {0}")]
    Index(#[from] IndexError),
    /// Several failures from validating one row. Every sub-error stays in
    /// the message, so nothing a statement collected is dropped.
    #[error("{}", join_errors(.0))]
    Multiple(Vec<DBError>),
    #[error("Internal: {0}")]
    Internal(#[from] anyhow::Error),
}

fn join_errors(errors: &[DBError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collected row-validation failures: a lone failure keeps its own kind,
/// several surface together as [`DBError::Multiple`].
impl From<Vec<DBError>> for DBError {
    fn from(mut errors: Vec<DBError>) -> Self {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            DBError::Multiple(errors)
        }
    }
}

impl From<std::io::Error> for DBError {
    fn from(err: std::io::Error) -> Self {
        DBError::Internal(err.into())
    }
}

impl From<serde_json::Error> for DBError {
    fn from(err: serde_json::Error) -> Self {
        DBError::Internal(err.into())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("table `{0}` already exists")]
    TableExists(String),
    #[error("index `{index}` on `{table}.{column}` already exists")]
    IndexExists {
        index: String,
        table: String,
        column: String,
    },
    #[error("unknown data type: `{0}`")]
    UnknownType(String),
    #[error("duplicate column name `{column}` in table `{table}`")]
    DuplicateColumn { table: String, column: String },
    #[error("table `{0}` declares more than one PRIMARY KEY column")]
    MultiplePrimaryKeys(String),
    #[error("VARCHAR column `{0}` must declare a positive max length")]
    VarcharLength(String),
    #[error("default value for column `{column}` is not a valid {ty}: {value}")]
    InvalidDefault {
        column: String,
        ty: DataType,
        value: String,
    },
    #[error("JOIN condition must reference both tables: {0}")]
    InvalidJoin(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("table `{0}` does not exist")]
    Table(String),
    #[error("column `{0}` does not exist")]
    Column(String),
    #[error("index `{index}` on table `{table}` does not exist")]
    Index { index: String, table: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeError {
    #[error("cannot coerce {value} to {ty} for column `{column}`")]
    Coercion {
        column: String,
        ty: DataType,
        value: Value,
    },
    #[error("value for column `{column}` exceeds VARCHAR({max}) length")]
    TooLong { column: String, max: u32 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstraintViolation {
    #[error("column `{0}` cannot be NULL")]
    NotNull(String),
    #[error("{kind} violation: column `{column}` value {value} already exists")]
    Unique {
        /// `PRIMARY KEY` or `UNIQUE`, for the message only.
        kind: &'static str,
        column: String,
        value: Value,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("unique index on `{column}` already contains key {key}")]
    Unique { column: String, key: Value },
}

/// Shorthand for tests that bubble any error with `?`.
pub type ResultTest<T = ()> = Result<T, Box<dyn std::error::Error>>;
