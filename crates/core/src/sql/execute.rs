//! Statement dispatch: drives storage, indexes, schema and catalog for each
//! AST variant, with rollback on partial failure.
//!
//! Write-path ordering is load-bearing. INSERT writes storage before
//! indexes and compensates with a storage delete if an index rejects;
//! DELETE removes index entries before the row. Either way no observer can
//! see an index entry pointing at a missing row. UPDATE restores the old
//! row data if re-keying the indexes fails. Multi-row UPDATE and DELETE
//! have no cross-row rollback: rows already processed stay committed.

use crate::db::relational_db::{RelationalDB, TableState};
use crate::db::schema::{Column, ColumnConstraint, Schema};
use crate::db::storage::Row;
use crate::db::value::{DataType, Value};
use crate::error::{ConstraintViolation, DBError, NotFoundError, SchemaError};
use crate::sql::like::compile_like;
use anyhow::anyhow;
use indexmap::IndexMap;
use opaldb_primitives::{ColId, RowId};
use opaldb_sql_parser::ast::{
    CmpOp, ConstraintDef, CreateIndex, CreateTable, Delete, Insert, Join, JoinKind, Literal,
    OrderBy, Predicate, PredicateOp, Projection, Select, SqlAst, Update,
};

/// One result row: ordered, typed column name → value.
pub type ResultRow = IndexMap<String, Value>;

/// What every statement returns.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub success: bool,
    pub message: String,
    pub rows: Vec<ResultRow>,
    pub rows_affected: u64,
}

impl QueryResult {
    fn ok(message: impl Into<String>) -> Self {
        QueryResult {
            success: true,
            message: message.into(),
            rows: Vec::new(),
            rows_affected: 0,
        }
    }

    fn affected(message: impl Into<String>, rows_affected: u64) -> Self {
        QueryResult {
            rows_affected,
            ..Self::ok(message)
        }
    }

    fn with_rows(rows: Vec<ResultRow>) -> Self {
        QueryResult {
            message: format!("{} rows selected", rows.len()),
            rows,
            ..Self::ok("")
        }
    }

    pub(crate) fn failure(message: String) -> Self {
        QueryResult {
            success: false,
            message,
            rows: Vec::new(),
            rows_affected: 0,
        }
    }
}

pub(crate) fn run_statement(
    db: &RelationalDB,
    ast: SqlAst,
    params: &[Value],
) -> Result<QueryResult, DBError> {
    match ast {
        SqlAst::CreateTable(stmt) => create_table(db, stmt, params),
        SqlAst::DropTable { table } => {
            db.drop_table(&table)?;
            Ok(QueryResult::ok(format!("Table '{table}' dropped")))
        }
        SqlAst::CreateIndex(stmt) => create_index(db, stmt),
        SqlAst::DropIndex { index, table } => {
            db.drop_index(&table, &index)?;
            Ok(QueryResult::ok(format!("Index '{index}' dropped")))
        }
        SqlAst::Insert(stmt) => insert(db, stmt, params),
        SqlAst::Select(stmt) => select(db, *stmt, params),
        SqlAst::Update(stmt) => update(db, stmt, params),
        SqlAst::Delete(stmt) => delete(db, stmt, params),
    }
}

fn literal_to_value(lit: &Literal, params: &[Value]) -> Result<Value, DBError> {
    Ok(match lit {
        Literal::Int(n) => Value::Int(*n),
        Literal::Float(x) => Value::Float(*x),
        Literal::Str(s) => Value::Text(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
        Literal::Param(i) => params
            .get(*i as usize)
            .cloned()
            .ok_or_else(|| DBError::Internal(anyhow!("unbound parameter ?{i}")))?,
    })
}

// ---------------------------------------------------------------------------
// DDL

fn create_table(
    db: &RelationalDB,
    stmt: CreateTable,
    params: &[Value],
) -> Result<QueryResult, DBError> {
    let mut columns = Vec::with_capacity(stmt.columns.len());
    for def in stmt.columns {
        let data_type = DataType::parse(&def.data_type)
            .ok_or(SchemaError::UnknownType(def.data_type.clone()))?;
        let constraints = def
            .constraints
            .iter()
            .map(|c| match c {
                ConstraintDef::PrimaryKey => ColumnConstraint::PrimaryKey,
                ConstraintDef::Unique => ColumnConstraint::Unique,
                ConstraintDef::NotNull => ColumnConstraint::NotNull,
            })
            .collect();
        let default = def
            .default
            .as_ref()
            .map(|lit| literal_to_value(lit, params))
            .transpose()?;
        columns.push(Column {
            name: def.name,
            data_type,
            max_length: def.max_length,
            constraints,
            default,
        });
    }

    let table = stmt.table;
    let schema = Schema::new(table.clone(), columns)?;
    db.create_table(schema)?;
    Ok(QueryResult::ok(format!("Table '{table}' created")))
}

fn create_index(db: &RelationalDB, stmt: CreateIndex) -> Result<QueryResult, DBError> {
    db.create_index(&stmt.index, &stmt.table, &stmt.column, stmt.unique)?;
    Ok(QueryResult::ok(format!("Index '{}' created", stmt.index)))
}

// ---------------------------------------------------------------------------
// Column resolution over one or two bound tables

/// The tables a statement can see: `(label, schema)`, left side first.
/// Labels are the alias when one was written, else the table name.
struct QueryContext<'a> {
    bindings: Vec<(String, &'a Schema)>,
}

impl<'a> QueryContext<'a> {
    fn resolve(&self, name: &str) -> Result<(usize, ColId, &'a Column), DBError> {
        if let Some((qualifier, column)) = name.split_once('.') {
            for (side, (label, schema)) in self.bindings.iter().enumerate() {
                if label == qualifier {
                    return match schema.col_id(column) {
                        Some(col_id) => Ok((side, col_id, &schema.columns()[col_id.idx()])),
                        None => Err(NotFoundError::Column(name.to_string()).into()),
                    };
                }
            }
            return Err(NotFoundError::Column(name.to_string()).into());
        }
        // Bare name: first side that has it wins; left side is first.
        for (side, (_, schema)) in self.bindings.iter().enumerate() {
            if let Some(col_id) = schema.col_id(name) {
                return Ok((side, col_id, &schema.columns()[col_id.idx()]));
            }
        }
        Err(NotFoundError::Column(name.to_string()).into())
    }
}

/// A materialized candidate row: one stored row per side, `None` for the
/// right side of an unmatched LEFT JOIN.
struct MatRow {
    sides: Vec<Option<Row>>,
}

impl MatRow {
    fn value(&self, side: usize, col_id: ColId) -> Value {
        self.sides
            .get(side)
            .and_then(|s| s.as_ref())
            .map(|row| row.data[col_id.idx()].clone())
            .unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Predicate evaluation

/// Coerce a comparison literal to the column's type. An over-length VARCHAR
/// literal is still a valid comparison operand, it just matches nothing
/// equal to a stored value, so the length check is skipped here.
fn coerce_operand(column: &Column, value: &Value) -> Result<Value, DBError> {
    use crate::error::TypeError;
    match column.coerce_value(value) {
        Ok(v) => Ok(v),
        Err(TypeError::TooLong { .. }) => Ok(Value::Text(value.to_text())),
        Err(e) => Err(e.into()),
    }
}

/// Evaluate the full conjunction against one materialized row.
///
/// Comparisons against `NULL` on either side are false; `IS [NOT] NULL` is
/// the null test. This runs after any index prefilter, which only
/// over-approximates.
fn eval_predicates(
    ctx: &QueryContext,
    row: &MatRow,
    predicates: &[Predicate],
    params: &[Value],
) -> Result<bool, DBError> {
    for pred in predicates {
        let (side, col_id, column) = ctx.resolve(&pred.column)?;
        let value = row.value(side, col_id);

        let hit = match &pred.op {
            PredicateOp::IsNull => value.is_null(),
            PredicateOp::IsNotNull => !value.is_null(),
            PredicateOp::Like(lit) => {
                let pattern = literal_to_value(lit, params)?;
                let Value::Text(pattern) = pattern else {
                    return Err(crate::error::TypeError::Coercion {
                        column: column.name.clone(),
                        ty: DataType::Text,
                        value: pattern,
                    }
                    .into());
                };
                if value.is_null() {
                    false
                } else {
                    compile_like(&pattern)?.is_match(&value.to_text())
                }
            }
            PredicateOp::Cmp(op, lit) => {
                let operand = literal_to_value(lit, params)?;
                if value.is_null() || operand.is_null() {
                    false
                } else {
                    let operand = coerce_operand(column, &operand)?;
                    match op {
                        CmpOp::Eq => value == operand,
                        CmpOp::Ne => value != operand,
                        CmpOp::Lt => value < operand,
                        CmpOp::Le => value <= operand,
                        CmpOp::Gt => value > operand,
                        CmpOp::Ge => value >= operand,
                    }
                }
            }
        };

        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Index-assisted candidate selection

/// Find the first predicate of the form `col OP literal` where `col` has an
/// index on the queried table and `OP` is `=` or an ordering comparison,
/// and turn it into a row-id list. `None` means full scan. The result
/// over-approximates; the caller still applies the whole WHERE clause.
fn index_prefilter(
    state: &TableState,
    label: &str,
    predicates: &[Predicate],
    params: &[Value],
) -> Result<Option<Vec<RowId>>, DBError> {
    for pred in predicates {
        // Only bare or left-qualified columns can use the left index.
        let column = match pred.column.split_once('.') {
            Some((qualifier, column)) if qualifier == label => column,
            Some(_) => continue,
            None => pred.column.as_str(),
        };
        let Some(col) = state.schema.column(column) else {
            continue;
        };
        let Some(index) = state.indexes.get(column) else {
            continue;
        };
        let PredicateOp::Cmp(op, lit) = &pred.op else {
            continue;
        };
        let operand = literal_to_value(lit, params)?;
        if operand.is_null() {
            continue;
        }
        // If the literal does not coerce, leave it to the full predicate
        // pass to report.
        let Ok(key) = coerce_operand(col, &operand) else {
            continue;
        };

        let ids = match op {
            CmpOp::Eq => index.point_lookup(&key),
            CmpOp::Gt => index.range_lookup(Some(&key), None, false, true),
            CmpOp::Ge => index.range_lookup(Some(&key), None, true, true),
            CmpOp::Lt => index.range_lookup(None, Some(&key), true, false),
            CmpOp::Le => index.range_lookup(None, Some(&key), true, true),
            CmpOp::Ne => continue,
        };
        log::debug!(
            "index on `{}.{column}` prefiltered {} candidate rows",
            state.storage.table_name(),
            ids.len()
        );
        return Ok(Some(ids));
    }
    Ok(None)
}

/// Candidate rows for a statement on a single table, cloned out of storage.
fn candidate_rows(
    state: &TableState,
    label: &str,
    predicates: &[Predicate],
    params: &[Value],
) -> Result<Vec<Row>, DBError> {
    Ok(match index_prefilter(state, label, predicates, params)? {
        Some(ids) => ids
            .into_iter()
            .filter_map(|id| state.storage.get(id).cloned())
            .collect(),
        None => state.storage.scan().cloned().collect(),
    })
}

// ---------------------------------------------------------------------------
// SELECT

fn select(db: &RelationalDB, stmt: Select, params: &[Value]) -> Result<QueryResult, DBError> {
    let left_label = stmt.alias.clone().unwrap_or_else(|| stmt.table.clone());

    // Copy what we need out of the left table and release its lock before
    // touching the joined table; no statement ever holds two table locks.
    let left_arc = db.table(&stmt.table)?;
    let (left_schema, candidates) = {
        let left = left_arc.read();
        let rows = candidate_rows(&left, &left_label, &stmt.selection, params)?;
        (left.schema.clone(), rows)
    };

    let mut bindings: Vec<(String, Schema)> = vec![(left_label.clone(), left_schema)];
    let mut rows: Vec<MatRow>;

    if let Some(join) = &stmt.join {
        let right_label = join.alias.clone().unwrap_or_else(|| join.table.clone());
        let (right_schema, right_rows) = if join.table == stmt.table {
            let state = left_arc.read();
            (state.schema.clone(), state.storage.scan().cloned().collect())
        } else {
            let right_arc = db.table(&join.table)?;
            let state = right_arc.read();
            let rows: Vec<Row> = state.storage.scan().cloned().collect();
            (state.schema.clone(), rows)
        };
        bindings.push((right_label, right_schema));
        rows = join_rows(&bindings, candidates, right_rows, join)?;
    } else {
        rows = candidates
            .into_iter()
            .map(|row| MatRow {
                sides: vec![Some(row)],
            })
            .collect();
    }

    let ctx = QueryContext {
        bindings: bindings.iter().map(|(l, s)| (l.clone(), s)).collect(),
    };

    // The index step over-approximates, so the whole conjunction applies
    // to the materialized rows.
    let mut filtered = Vec::with_capacity(rows.len());
    for row in rows.drain(..) {
        if eval_predicates(&ctx, &row, &stmt.selection, params)? {
            filtered.push(row);
        }
    }

    // Sort before projecting: ORDER BY may name non-projected columns.
    sort_rows(&ctx, &mut filtered, &stmt.order_by)?;

    let mut out = Vec::with_capacity(filtered.len());
    for row in &filtered {
        out.push(project(&ctx, row, &stmt.projection, stmt.join.is_some())?);
    }

    let offset = stmt.offset.unwrap_or(0) as usize;
    let out: Vec<ResultRow> = match stmt.limit {
        Some(limit) => out.into_iter().skip(offset).take(limit as usize).collect(),
        None => out.into_iter().skip(offset).collect(),
    };

    Ok(QueryResult::with_rows(out))
}

/// Nested-loop join of the candidate rows against a full scan of the right
/// table. Null join keys never match. LEFT JOIN keeps unmatched left rows
/// with a missing right side, which projects as nulls.
fn join_rows(
    bindings: &[(String, Schema)],
    left_rows: Vec<Row>,
    right_rows: Vec<Row>,
    join: &Join,
) -> Result<Vec<MatRow>, DBError> {
    let side_of = |qualifier: &str| -> Result<usize, DBError> {
        bindings
            .iter()
            .position(|(label, _)| label == qualifier)
            .ok_or_else(|| NotFoundError::Table(qualifier.to_string()).into())
    };

    let resolve_on = |side: usize, column: &str| -> Result<ColId, DBError> {
        bindings[side]
            .1
            .col_id(column)
            .ok_or_else(|| NotFoundError::Column(format!("{}.{column}", bindings[side].0)).into())
    };

    let lhs_side = side_of(&join.on_left.qualifier)?;
    let rhs_side = side_of(&join.on_right.qualifier)?;
    if lhs_side == rhs_side {
        return Err(SchemaError::InvalidJoin(format!(
            "{} = {}",
            join.on_left, join.on_right
        ))
        .into());
    }
    // Normalize so `left_key` is the left table's column.
    let (left_on, right_on) = if lhs_side == 0 {
        (&join.on_left, &join.on_right)
    } else {
        (&join.on_right, &join.on_left)
    };
    let left_key = resolve_on(0, &left_on.column)?;
    let right_key = resolve_on(1, &right_on.column)?;

    let mut out = Vec::new();
    for left in left_rows {
        let left_val = &left.data[left_key.idx()];
        let mut matched = false;
        if !left_val.is_null() {
            for right in &right_rows {
                let right_val = &right.data[right_key.idx()];
                if !right_val.is_null() && left_val == right_val {
                    out.push(MatRow {
                        sides: vec![Some(left.clone()), Some(right.clone())],
                    });
                    matched = true;
                }
            }
        }
        if !matched && join.kind == JoinKind::Left {
            out.push(MatRow {
                sides: vec![Some(left), None],
            });
        }
    }
    Ok(out)
}

/// Stable sort, applied key by key from rightmost to leftmost so the
/// leftmost key dominates. Nulls sort smallest.
fn sort_rows(ctx: &QueryContext, rows: &mut [MatRow], order_by: &[OrderBy]) -> Result<(), DBError> {
    for key in order_by.iter().rev() {
        let (side, col_id, _) = ctx.resolve(&key.column)?;
        rows.sort_by(|a, b| {
            let ord = a.value(side, col_id).cmp(&b.value(side, col_id));
            if key.desc {
                ord.reverse()
            } else {
                ord
            }
        });
    }
    Ok(())
}

fn project(
    ctx: &QueryContext,
    row: &MatRow,
    projection: &Projection,
    qualified: bool,
) -> Result<ResultRow, DBError> {
    let mut out = ResultRow::new();
    match projection {
        Projection::Star => {
            for (side, (label, schema)) in ctx.bindings.iter().enumerate() {
                for (i, col) in schema.columns().iter().enumerate() {
                    let key = if qualified {
                        format!("{label}.{}", col.name)
                    } else {
                        col.name.clone()
                    };
                    out.insert(key, row.value(side, ColId::from(i)));
                }
            }
        }
        Projection::Columns(names) => {
            for name in names {
                let (side, col_id, _) = ctx.resolve(name)?;
                out.insert(name.clone(), row.value(side, col_id));
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// INSERT

/// Unique pre-check against the live table, through the column's index when
/// one exists, otherwise a storage scan.
fn check_unique_live(
    state: &TableState,
    col_id: ColId,
    column: &Column,
    value: &Value,
    exclude: Option<RowId>,
) -> Result<(), DBError> {
    if value.is_null() {
        return Ok(());
    }
    if let Some(index) = state.indexes.get(&column.name) {
        if index
            .point_lookup(value)
            .into_iter()
            .any(|id| exclude != Some(id))
        {
            return Err(ConstraintViolation::Unique {
                kind: column.unique_kind(),
                column: column.name.clone(),
                value: value.clone(),
            }
            .into());
        }
        return Ok(());
    }
    state
        .schema
        .check_unique(
            column,
            value,
            state
                .storage
                .scan()
                .map(|row| (row.row_id, &row.data[col_id.idx()])),
            exclude,
        )
        .map_err(Into::into)
}

fn insert(db: &RelationalDB, stmt: Insert, params: &[Value]) -> Result<QueryResult, DBError> {
    let state_arc = db.table(&stmt.table)?;
    let mut guard = state_arc.write();
    let state = &mut *guard;

    let mut named: IndexMap<String, Value> = IndexMap::with_capacity(stmt.columns.len());
    for (column, lit) in stmt.columns.iter().zip(&stmt.values) {
        named.insert(column.clone(), literal_to_value(lit, params)?);
    }

    // Defaults, validation and coercion in one pass over the schema. Every
    // collected failure is kept; the rejection names them all.
    let data = state.schema.coerce_row(&named)?;

    for (col_id, column) in state.schema.unique_columns() {
        check_unique_live(state, col_id, column, &data[col_id.idx()], None)?;
    }

    let row_id = state.storage.insert(data.clone())?;
    if let Err(err) = state.indexes.insert_into_indexes(&state.schema, row_id, &data) {
        // Compensate: the row must not be visible if its index entries
        // could not all be written.
        state.storage.delete(row_id)?;
        return Err(err);
    }

    let count = state.storage.count() as u64;
    db.update_table_stats(&stmt.table, count)?;
    Ok(QueryResult::affected(
        format!("1 row inserted (row id {row_id})"),
        1,
    ))
}

// ---------------------------------------------------------------------------
// UPDATE

fn update(db: &RelationalDB, stmt: Update, params: &[Value]) -> Result<QueryResult, DBError> {
    let state_arc = db.table(&stmt.table)?;
    let mut guard = state_arc.write();
    let state = &mut *guard;
    let schema = state.schema.clone();

    // Resolve and coerce the SET list once; it is the same for every row.
    // Failures are collected so the rejection names every bad assignment.
    let mut assignments: Vec<(ColId, Value)> = Vec::with_capacity(stmt.assignments.len());
    let mut errors: Vec<DBError> = Vec::new();
    for (name, lit) in &stmt.assignments {
        let Some(col_id) = schema.col_id(name) else {
            errors.push(NotFoundError::Column(name.clone()).into());
            continue;
        };
        let column = &schema.columns()[col_id.idx()];
        let value = literal_to_value(lit, params)?;
        if value.is_null() {
            if column.is_not_null() {
                errors.push(ConstraintViolation::NotNull(column.name.clone()).into());
            } else {
                assignments.push((col_id, Value::Null));
            }
            continue;
        }
        match column.coerce_value(&value) {
            Ok(coerced) => assignments.push((col_id, coerced)),
            Err(err) => errors.push(err.into()),
        }
    }
    if !errors.is_empty() {
        return Err(errors.into());
    }
    let unique_assigned: Vec<ColId> = assignments
        .iter()
        .map(|(col_id, _)| *col_id)
        .filter(|col_id| schema.columns()[col_id.idx()].is_unique())
        .collect();

    let targets = filter_targets(state, &stmt.table, &stmt.selection, params)?;

    let mut updated = 0u64;
    for (row_id, old_data) in targets {
        let mut new_data = old_data.clone();
        for (col_id, value) in &assignments {
            new_data[col_id.idx()] = value.clone();
        }

        // Unique checks exclude the row being rewritten but see every
        // previously committed row, including earlier rows of this very
        // statement.
        for col_id in &unique_assigned {
            let column = &schema.columns()[col_id.idx()];
            check_unique_live(state, *col_id, column, &new_data[col_id.idx()], Some(row_id))?;
        }

        state.storage.update(row_id, new_data.clone())?;
        if let Err(err) = state
            .indexes
            .update_indexes(&schema, row_id, &old_data, &new_data)
        {
            // Put the storage row back; earlier rows stay in their new
            // state, which is the documented cross-row behavior.
            state.storage.update(row_id, old_data)?;
            return Err(err);
        }
        updated += 1;
    }

    let count = state.storage.count() as u64;
    db.update_table_stats(&stmt.table, count)?;
    Ok(QueryResult::affected(format!("{updated} rows updated"), updated))
}

// ---------------------------------------------------------------------------
// DELETE

fn delete(db: &RelationalDB, stmt: Delete, params: &[Value]) -> Result<QueryResult, DBError> {
    let state_arc = db.table(&stmt.table)?;
    let mut guard = state_arc.write();
    let state = &mut *guard;
    let schema = state.schema.clone();

    let targets = filter_targets(state, &stmt.table, &stmt.selection, params)?;

    let mut deleted = 0u64;
    for (row_id, data) in targets {
        // Indexes first, then the row: the mirror image of INSERT, so an
        // index never points at a missing row.
        state.indexes.delete_from_indexes(&schema, row_id, &data)?;
        state.storage.delete(row_id)?;
        deleted += 1;
    }

    let count = state.storage.count() as u64;
    db.update_table_stats(&stmt.table, count)?;
    Ok(QueryResult::affected(format!("{deleted} rows deleted"), deleted))
}

/// Rows a WHERE clause selects on one table: `(row_id, data)` snapshots,
/// index-prefiltered when possible, then fully filtered.
fn filter_targets(
    state: &TableState,
    table: &str,
    predicates: &[Predicate],
    params: &[Value],
) -> Result<Vec<(RowId, Vec<Value>)>, DBError> {
    let ctx = QueryContext {
        bindings: vec![(table.to_string(), &state.schema)],
    };
    let mut targets = Vec::new();
    for row in candidate_rows(state, table, predicates, params)? {
        let mat = MatRow {
            sides: vec![Some(row)],
        };
        if eval_predicates(&ctx, &mat, predicates, params)? {
            let row = mat.sides.into_iter().next().unwrap().unwrap();
            targets.push((row.row_id, row.data));
        }
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::relational_db::RelationalDB;
    use crate::error::ResultTest;
    use tempfile::TempDir;

    fn make_test_db() -> ResultTest<(RelationalDB, TempDir)> {
        let tmp = TempDir::new()?;
        let db = RelationalDB::open(tmp.path())?;
        Ok((db, tmp))
    }

    fn run_ok(db: &RelationalDB, sql: &str) -> QueryResult {
        let result = db.execute(sql);
        assert!(result.success, "`{sql}` failed: {}", result.message);
        result
    }

    fn seed_people(db: &RelationalDB) {
        run_ok(
            db,
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name VARCHAR(40), age INTEGER)",
        );
        for (id, name, age) in [
            (1, "Alice", "30"),
            (2, "Bob", "25"),
            (3, "Cara", "35"),
        ] {
            run_ok(
                db,
                &format!("INSERT INTO people (id, name, age) VALUES ({id}, '{name}', {age})"),
            );
        }
    }

    #[test]
    fn select_preserves_types() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        run_ok(
            &db,
            "CREATE TABLE c (id INTEGER PRIMARY KEY, active BOOLEAN DEFAULT TRUE, score FLOAT)",
        );
        run_ok(&db, "INSERT INTO c (id, active, score) VALUES (1, 'true', '3.5')");

        let result = run_ok(&db, "SELECT * FROM c WHERE id = 1");
        let row = &result.rows[0];
        assert_eq!(row["id"], Value::Int(1));
        assert_eq!(row["active"], Value::Bool(true));
        assert_eq!(row["score"], Value::Float(3.5));
        Ok(())
    }

    #[test]
    fn comparisons_with_null_never_match() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        run_ok(&db, "CREATE TABLE t (id INTEGER PRIMARY KEY, age INTEGER)");
        run_ok(&db, "INSERT INTO t (id, age) VALUES (1, NULL)");
        run_ok(&db, "INSERT INTO t (id, age) VALUES (2, 30)");

        assert_eq!(run_ok(&db, "SELECT * FROM t WHERE age = NULL").rows.len(), 0);
        assert_eq!(run_ok(&db, "SELECT * FROM t WHERE age != 30").rows.len(), 0);
        assert_eq!(run_ok(&db, "SELECT * FROM t WHERE age IS NULL").rows.len(), 1);
        assert_eq!(
            run_ok(&db, "SELECT * FROM t WHERE age IS NOT NULL").rows.len(),
            1
        );
        Ok(())
    }

    #[test]
    fn order_by_sorts_nulls_smallest_and_is_stable() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        run_ok(
            &db,
            "CREATE TABLE t (id INTEGER PRIMARY KEY, grp INTEGER, age INTEGER)",
        );
        for (id, grp, age) in [(1, 1, "NULL"), (2, 1, "20"), (3, 2, "10"), (4, 2, "10")] {
            run_ok(
                &db,
                &format!("INSERT INTO t (id, grp, age) VALUES ({id}, {grp}, {age})"),
            );
        }

        let result = run_ok(&db, "SELECT id FROM t ORDER BY grp ASC, age DESC");
        let ids: Vec<Value> = result.rows.iter().map(|r| r["id"].clone()).collect();
        // grp 1: age 20 before null; grp 2: ties keep row-id order.
        assert_eq!(
            ids,
            vec![Value::Int(2), Value::Int(1), Value::Int(3), Value::Int(4)]
        );
        Ok(())
    }

    #[test]
    fn order_by_may_name_non_projected_columns() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        seed_people(&db);
        let result = run_ok(&db, "SELECT name FROM people ORDER BY age DESC");
        let names: Vec<Value> = result.rows.iter().map(|r| r["name"].clone()).collect();
        assert_eq!(
            names,
            vec![
                Value::Text("Cara".into()),
                Value::Text("Alice".into()),
                Value::Text("Bob".into())
            ]
        );
        Ok(())
    }

    #[test]
    fn limit_zero_returns_no_rows() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        seed_people(&db);
        assert_eq!(run_ok(&db, "SELECT * FROM people LIMIT 0").rows.len(), 0);
        let page = run_ok(&db, "SELECT id FROM people ORDER BY id ASC LIMIT 2 OFFSET 1");
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0]["id"], Value::Int(2));
        Ok(())
    }

    #[test]
    fn unknown_projection_column_is_not_found() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        seed_people(&db);
        let result = db.execute("SELECT nope FROM people");
        assert!(!result.success);
        assert!(result.message.contains("NotFound"), "{}", result.message);
        Ok(())
    }

    #[test]
    fn like_is_anchored_and_literal() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        seed_people(&db);
        assert_eq!(
            run_ok(&db, "SELECT * FROM people WHERE name LIKE 'A%'").rows.len(),
            1
        );
        assert_eq!(
            run_ok(&db, "SELECT * FROM people WHERE name LIKE '%a%'").rows.len(),
            1,
            "only Cara has a lowercase 'a'; LIKE is case-sensitive"
        );
        assert_eq!(
            run_ok(&db, "SELECT * FROM people WHERE name LIKE 'li'").rows.len(),
            0
        );
        Ok(())
    }

    #[test]
    fn inner_and_left_join() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        seed_people(&db);
        run_ok(
            &db,
            "CREATE TABLE posts (id INTEGER PRIMARY KEY, author_id INTEGER, title VARCHAR(50))",
        );
        run_ok(&db, "INSERT INTO posts (id, author_id, title) VALUES (1, 1, 'hello')");
        run_ok(&db, "INSERT INTO posts (id, author_id, title) VALUES (2, 9, 'orphan')");

        let inner = run_ok(
            &db,
            "SELECT p.name, q.title FROM people p INNER JOIN posts q ON p.id = q.author_id",
        );
        assert_eq!(inner.rows.len(), 1);
        assert_eq!(inner.rows[0]["p.name"], Value::Text("Alice".into()));
        assert_eq!(inner.rows[0]["q.title"], Value::Text("hello".into()));

        let left = run_ok(
            &db,
            "SELECT * FROM people p LEFT JOIN posts q ON p.id = q.author_id ORDER BY p.id ASC",
        );
        assert_eq!(left.rows.len(), 3);
        // Unmatched left rows carry nulls for every right column.
        assert_eq!(left.rows[1]["q.title"], Value::Null);
        assert_eq!(left.rows[0]["q.title"], Value::Text("hello".into()));
        Ok(())
    }

    #[test]
    fn join_on_must_reference_both_tables() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        seed_people(&db);
        run_ok(&db, "CREATE TABLE x (id INTEGER PRIMARY KEY)");
        let result =
            db.execute("SELECT * FROM people p INNER JOIN x ON p.id = p.age");
        assert!(!result.success);
        assert!(result.message.contains("JOIN"), "{}", result.message);
        Ok(())
    }

    #[test]
    fn update_without_where_touches_every_row() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        seed_people(&db);
        let result = run_ok(&db, "UPDATE people SET age = 40");
        assert_eq!(result.rows_affected, 3);
        assert_eq!(
            run_ok(&db, "SELECT * FROM people WHERE age = 40").rows.len(),
            3
        );
        Ok(())
    }

    #[test]
    fn catalog_row_count_tracks_storage() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        seed_people(&db);
        assert_eq!(db.table_info("people").unwrap().row_count, 3);
        run_ok(&db, "DELETE FROM people WHERE age > 28");
        assert_eq!(db.table_info("people").unwrap().row_count, 1);
        Ok(())
    }

    #[test]
    fn insert_rejects_unknown_column() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        seed_people(&db);
        let result = db.execute("INSERT INTO people (id, nope) VALUES (9, 1)");
        assert!(!result.success);
        assert!(result.message.contains("NotFound"), "{}", result.message);
        assert_eq!(db.table_info("people").unwrap().row_count, 3);
        Ok(())
    }

    #[test]
    fn not_null_violation_is_a_constraint_violation() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        run_ok(
            &db,
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name VARCHAR(10) NOT NULL)",
        );
        let result = db.execute("INSERT INTO t (id) VALUES (1)");
        assert!(!result.success);
        assert!(
            result.message.contains("ConstraintViolation"),
            "{}",
            result.message
        );
        Ok(())
    }

    #[test]
    fn varchar_overflow_is_a_type_error() -> ResultTest<()> {
        let (db, _tmp) = make_test_db()?;
        run_ok(&db, "CREATE TABLE t (id INTEGER PRIMARY KEY, s VARCHAR(3))");
        let result = db.execute("INSERT INTO t (id, s) VALUES (1, 'toolong')");
        assert!(!result.success);
        assert!(result.message.contains("TypeError"), "{}", result.message);
        Ok(())
    }
}
