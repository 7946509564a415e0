//! Dynamically typed column values.
//!
//! [`Value`] is the tagged union every row cell, index key and literal
//! flows through. Comparison dispatches on the tag; the schema layer
//! guarantees a single index never mixes tags, so the cross-tag ordering
//! only decides how heterogeneous data sorts in `ORDER BY`, where `NULL`
//! sorts as smallest.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The declarable column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Integer,
    Varchar,
    Float,
    Boolean,
    Date,
    Text,
}

impl DataType {
    /// Parse a type word as written in `CREATE TABLE`. Case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "INTEGER" => Some(DataType::Integer),
            "VARCHAR" => Some(DataType::Varchar),
            "FLOAT" => Some(DataType::Float),
            "BOOLEAN" => Some(DataType::Boolean),
            "DATE" => Some(DataType::Date),
            "TEXT" => Some(DataType::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Integer => "INTEGER",
            DataType::Varchar => "VARCHAR",
            DataType::Float => "FLOAT",
            DataType::Boolean => "BOOLEAN",
            DataType::Date => "DATE",
            DataType::Text => "TEXT",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single typed value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    /// A civil date, canonically rendered `YYYY-MM-DD`.
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The type this value inhabits; `None` for `Null`, which inhabits all.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Float),
            Value::Bool(_) => Some(DataType::Boolean),
            Value::Text(_) => Some(DataType::Text),
            Value::Date(_) => Some(DataType::Date),
        }
    }

    /// Plain textual form, as used by VARCHAR/TEXT coercion and LIKE.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => x.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Text(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    fn tag_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) => 1,
            Value::Float(_) => 2,
            Value::Bool(_) => 3,
            Value::Text(_) => 4,
            Value::Date(_) => 5,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            // Distinct tags: order by tag rank. The schema keeps this from
            // ever deciding an index lookup.
            _ => self.tag_rank().cmp(&other.tag_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

/// Literal-style rendering, used in error messages.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Date(d) => write!(f, "'{}'", d.format("%Y-%m-%d")),
        }
    }
}
