//! The typed AST the parser produces.
//!
//! Literals stay close to the surface grammar: numbers are parsed, but a
//! column's declared type decides what a literal ultimately means, so
//! coercion happens later, in the schema layer. Type names in column
//! definitions are likewise carried as written; unknown types are a schema
//! error, not a parse error.

use std::fmt;

/// One parsed SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlAst {
    CreateTable(CreateTable),
    DropTable { table: String },
    CreateIndex(CreateIndex),
    DropIndex { index: String, table: String },
    Insert(Insert),
    Select(Box<Select>),
    Update(Update),
    Delete(Delete),
}

impl SqlAst {
    /// Number of `?` parameters the statement carries.
    pub fn param_count(&self) -> usize {
        fn lit(l: &Literal, n: &mut usize) {
            if matches!(l, Literal::Param(_)) {
                *n += 1;
            }
        }
        fn preds(ps: &[Predicate], n: &mut usize) {
            for p in ps {
                match &p.op {
                    PredicateOp::Cmp(_, l) | PredicateOp::Like(l) => lit(l, n),
                    PredicateOp::IsNull | PredicateOp::IsNotNull => {}
                }
            }
        }

        let mut n = 0;
        match self {
            SqlAst::CreateTable(c) => {
                for col in &c.columns {
                    if let Some(d) = &col.default {
                        lit(d, &mut n);
                    }
                }
            }
            SqlAst::Insert(i) => {
                for v in &i.values {
                    lit(v, &mut n);
                }
            }
            SqlAst::Select(s) => preds(&s.selection, &mut n),
            SqlAst::Update(u) => {
                for (_, v) in &u.assignments {
                    lit(v, &mut n);
                }
                preds(&u.selection, &mut n);
            }
            SqlAst::Delete(d) => preds(&d.selection, &mut n),
            SqlAst::DropTable { .. } | SqlAst::CreateIndex(_) | SqlAst::DropIndex { .. } => {}
        }
        n
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

/// A column definition inside `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    /// The type word as written, e.g. `INTEGER` or `VARCHAR`.
    pub data_type: String,
    /// Parenthesized length, e.g. the `100` in `VARCHAR(100)`.
    pub max_length: Option<u32>,
    pub constraints: Vec<ConstraintDef>,
    pub default: Option<Literal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintDef {
    PrimaryKey,
    Unique,
    NotNull,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    pub index: String,
    pub table: String,
    pub column: String,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<Literal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub alias: Option<String>,
    pub projection: Projection,
    pub join: Option<Join>,
    /// Conjunction of predicates; empty means no WHERE clause.
    pub selection: Vec<Predicate>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Star,
    /// Explicit column list; entries may be qualified (`alias.column`).
    Columns(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: Option<String>,
    pub on_left: ColumnRef,
    pub on_right: ColumnRef,
}

/// A qualified column reference in an ON clause, e.g. `u.id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub qualifier: String,
    pub column: String,
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.qualifier, self.column)
    }
}

/// One `column OP literal` conjunct of a WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// May be qualified (`alias.column`) in join queries.
    pub column: String,
    pub op: PredicateOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredicateOp {
    Cmp(CmpOp, Literal),
    Like(Literal),
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Literal)>,
    pub selection: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub selection: Vec<Predicate>,
}

/// A literal as it appears in statement text.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    /// `?` placeholder, numbered left to right from zero.
    Param(u16),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Str(s) => write!(f, "'{s}'"),
            Literal::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Literal::Null => write!(f, "NULL"),
            Literal::Param(i) => write!(f, "?{i}"),
        }
    }
}
