//! Table schemas: column definitions, constraints, row validation and type
//! coercion.
//!
//! Rows are stored positionally, pinned by the schema's column order; this
//! module is the only place that translates between named row data and the
//! positional layout.

use crate::db::value::{DataType, Value};
use crate::error::{ConstraintViolation, DBError, NotFoundError, SchemaError, TypeError};
use chrono::NaiveDate;
use indexmap::IndexMap;
use itertools::Itertools;
use opaldb_primitives::{ColId, RowId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnConstraint {
    PrimaryKey,
    Unique,
    NotNull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    /// Required for VARCHAR, ignored elsewhere.
    pub max_length: Option<u32>,
    pub constraints: Vec<ColumnConstraint>,
    pub default: Option<Value>,
}

impl Column {
    pub fn is_primary_key(&self) -> bool {
        self.constraints.contains(&ColumnConstraint::PrimaryKey)
    }

    /// PRIMARY KEY implies UNIQUE.
    pub fn is_unique(&self) -> bool {
        self.is_primary_key() || self.constraints.contains(&ColumnConstraint::Unique)
    }

    /// PRIMARY KEY implies NOT NULL.
    pub fn is_not_null(&self) -> bool {
        self.is_primary_key() || self.constraints.contains(&ColumnConstraint::NotNull)
    }

    /// `PRIMARY KEY` or `UNIQUE`, for constraint-violation messages.
    pub fn unique_kind(&self) -> &'static str {
        if self.is_primary_key() {
            "PRIMARY KEY"
        } else {
            "UNIQUE"
        }
    }

    fn coercion_err(&self, value: &Value) -> TypeError {
        TypeError::Coercion {
            column: self.name.clone(),
            ty: self.data_type,
            value: value.clone(),
        }
    }

    /// Coerce `value` to this column's declared type.
    ///
    /// `Null` passes through untouched; NOT NULL is a validation concern,
    /// not a coercion one. The rules mirror what each type accepts:
    ///
    /// - INTEGER: ints; integral floats; text matching `[+-]?\d+`.
    /// - FLOAT: ints (widened), floats, numeric text.
    /// - BOOLEAN: bools; 0/1; a fixed set of true/false words.
    /// - VARCHAR/TEXT: anything, stringified; VARCHAR checks length after.
    /// - DATE: `YYYY-MM-DD` text or a date value.
    pub fn coerce_value(&self, value: &Value) -> Result<Value, TypeError> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        let coerced = match self.data_type {
            DataType::Integer => match value {
                Value::Int(n) => Value::Int(*n),
                Value::Float(x) if x.fract() == 0.0 => Value::Int(*x as i64),
                Value::Text(s) => {
                    let t = s.trim();
                    let digits = t.strip_prefix(['+', '-']).unwrap_or(t);
                    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                        Value::Int(t.parse::<i64>().map_err(|_| self.coercion_err(value))?)
                    } else {
                        return Err(self.coercion_err(value));
                    }
                }
                _ => return Err(self.coercion_err(value)),
            },
            DataType::Float => match value {
                Value::Float(x) => Value::Float(*x),
                Value::Int(n) => Value::Float(*n as f64),
                Value::Text(s) => Value::Float(
                    s.trim()
                        .parse::<f64>()
                        .map_err(|_| self.coercion_err(value))?,
                ),
                _ => return Err(self.coercion_err(value)),
            },
            DataType::Boolean => match value {
                Value::Bool(b) => Value::Bool(*b),
                Value::Int(0) => Value::Bool(false),
                Value::Int(1) => Value::Bool(true),
                Value::Text(s) => match s.to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" | "t" | "y" => Value::Bool(true),
                    "false" | "0" | "no" | "f" | "n" => Value::Bool(false),
                    _ => return Err(self.coercion_err(value)),
                },
                _ => return Err(self.coercion_err(value)),
            },
            DataType::Varchar | DataType::Text => Value::Text(value.to_text()),
            DataType::Date => match value {
                Value::Date(d) => Value::Date(*d),
                Value::Text(s) => Value::Date(
                    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                        .map_err(|_| self.coercion_err(value))?,
                ),
                _ => return Err(self.coercion_err(value)),
            },
        };

        // VARCHAR length is enforced on the coerced, rendered form.
        if self.data_type == DataType::Varchar {
            let max = self.max_length.unwrap_or(0);
            if let Value::Text(s) = &coerced {
                if s.chars().count() > max as usize {
                    return Err(TypeError::TooLong {
                        column: self.name.clone(),
                        max,
                    });
                }
            }
        }

        Ok(coerced)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub table_name: String,
    pub columns: Vec<Column>,
}

impl Schema {
    /// Build and validate a schema. Errors leave no partial schema behind.
    pub fn new(table_name: String, columns: Vec<Column>) -> Result<Self, DBError> {
        let mut seen = Vec::with_capacity(columns.len());
        for col in &columns {
            if seen.contains(&&col.name) {
                return Err(SchemaError::DuplicateColumn {
                    table: table_name,
                    column: col.name.clone(),
                }
                .into());
            }
            seen.push(&col.name);
        }

        if columns.iter().filter(|c| c.is_primary_key()).count() > 1 {
            return Err(SchemaError::MultiplePrimaryKeys(table_name).into());
        }

        for col in &columns {
            if col.data_type == DataType::Varchar && col.max_length.unwrap_or(0) == 0 {
                return Err(SchemaError::VarcharLength(col.name.clone()).into());
            }
        }

        // Defaults must be of a compatible type; check once at definition
        // time rather than on every insert.
        let mut columns = columns;
        for col in &mut columns {
            if let Some(default) = &col.default {
                if !default.is_null() {
                    let coerced =
                        col.coerce_value(default)
                            .map_err(|_| SchemaError::InvalidDefault {
                                column: col.name.clone(),
                                ty: col.data_type,
                                value: default.to_string(),
                            })?;
                    col.default = Some(coerced);
                }
            }
        }

        Ok(Schema {
            table_name,
            columns,
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of `name` in the column order. Lookups are case-sensitive.
    pub fn col_id(&self, name: &str) -> Option<ColId> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .map(ColId::from)
    }

    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_primary_key())
    }

    pub fn unique_columns(&self) -> impl Iterator<Item = (ColId, &Column)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_unique())
            .map(|(i, c)| (ColId::from(i), c))
    }

    /// Turn named insert data into a coerced positional row.
    ///
    /// Columns absent from `named` take their default, or `Null`. All
    /// failures are collected so the caller can report them together.
    pub fn coerce_row(&self, named: &IndexMap<String, Value>) -> Result<Vec<Value>, Vec<DBError>> {
        let mut errors: Vec<DBError> = Vec::new();

        for key in named.keys() {
            if self.column(key).is_none() {
                errors.push(NotFoundError::Column(key.clone()).into());
            }
        }

        let mut row = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            let value = match named.get(&col.name) {
                Some(v) => v.clone(),
                None => col.default.clone().unwrap_or(Value::Null),
            };

            if value.is_null() {
                if col.is_not_null() {
                    errors.push(ConstraintViolation::NotNull(col.name.clone()).into());
                }
                row.push(Value::Null);
                continue;
            }

            match col.coerce_value(&value) {
                Ok(v) => row.push(v),
                Err(e) => {
                    errors.push(e.into());
                    row.push(Value::Null);
                }
            }
        }

        if errors.is_empty() {
            Ok(row)
        } else {
            Err(errors)
        }
    }

    /// Render the schema back to the `CREATE TABLE` statement that would
    /// recreate it.
    pub fn to_create_sql(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|col| {
                let mut out = format!("{} {}", col.name, col.data_type);
                if col.data_type == DataType::Varchar {
                    out.push_str(&format!("({})", col.max_length.unwrap_or(0)));
                }
                for constraint in &col.constraints {
                    out.push_str(match constraint {
                        ColumnConstraint::PrimaryKey => " PRIMARY KEY",
                        ColumnConstraint::Unique => " UNIQUE",
                        ColumnConstraint::NotNull => " NOT NULL",
                    });
                }
                if let Some(default) = &col.default {
                    out.push_str(&format!(" DEFAULT {}", sql_literal(default)));
                }
                out
            })
            .join(", ");
        format!("CREATE TABLE {} ({cols})", self.table_name)
    }

    /// Check a candidate value against every live value of a unique column.
    ///
    /// `Null` never conflicts. `exclude` skips the row being updated.
    pub fn check_unique<'a>(
        &self,
        column: &Column,
        value: &Value,
        existing: impl Iterator<Item = (RowId, &'a Value)>,
        exclude: Option<RowId>,
    ) -> Result<(), ConstraintViolation> {
        if value.is_null() {
            return Ok(());
        }
        for (row_id, live) in existing {
            if exclude == Some(row_id) {
                continue;
            }
            if live == value {
                return Err(ConstraintViolation::Unique {
                    kind: column.unique_kind(),
                    column: column.name.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A value as a SQL literal, with embedded quotes doubled.
fn sql_literal(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.to_string(),
    }
}
