//! Recursive-descent parser over the token stream.
//!
//! Each statement kind has its own `parse_*` function. Errors carry the
//! offending fragment; nothing is returned on failure.

use crate::ast::*;
use crate::lexer::{tokenize, Token};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("empty SQL statement")]
    Empty,
    #[error("unexpected end of statement, expected {expected}")]
    UnexpectedEnd { expected: String },
    #[error("expected {expected}, found `{found}`")]
    Expected { expected: String, found: String },
    #[error("unterminated string literal starting at `{0}`")]
    UnterminatedString(String),
    #[error("numeric literal out of range: `{0}`")]
    InvalidNumber(String),
    #[error("unrecognized character `{0}`")]
    UnexpectedChar(char),
    #[error("unsupported SQL: {0}")]
    Unsupported(String),
    #[error("trailing input after statement: `{0}`")]
    TrailingInput(String),
    #[error("column count ({columns}) does not match value count ({values})")]
    ColumnValueCount { columns: usize, values: usize },
    #[error("statement expects {expected} bound parameters, got {given}")]
    ParamCount { expected: usize, given: usize },
}

/// Parse one SQL statement. A trailing `;` is permitted and stripped.
pub fn parse(sql: &str) -> Result<SqlAst, ParseError> {
    let sql = sql.trim();
    if sql.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut tokens = tokenize(sql)?;
    if tokens.last() == Some(&Token::Semi) {
        tokens.pop();
    }
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut p = Parser {
        tokens,
        pos: 0,
        params: 0,
    };
    let ast = p.parse_statement()?;
    p.expect_end()?;
    Ok(ast)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Running count of `?` placeholders, used to number them.
    params: u16,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn at_kw(&self, kw: &str) -> bool {
        self.peek().is_some_and(|t| t.is_kw(kw))
    }

    /// Consume the keyword if it is next; report whether it was.
    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.at_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{kw}`")))
        }
    }

    fn expect_tok(&mut self, tok: Token) -> Result<(), ParseError> {
        if self.peek() == Some(&tok) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{tok}`")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.next() {
            Some(Token::Ident(s)) => Ok(s),
            Some(tok) => Err(ParseError::Expected {
                expected: what.into(),
                found: tok.to_string(),
            }),
            None => Err(ParseError::UnexpectedEnd {
                expected: what.into(),
            }),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(tok) => ParseError::Expected {
                expected: expected.into(),
                found: tok.to_string(),
            },
            None => ParseError::UnexpectedEnd {
                expected: expected.into(),
            },
        }
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            let rest: Vec<String> = self.tokens[self.pos..]
                .iter()
                .take(6)
                .map(|t| t.to_string())
                .collect();
            Err(ParseError::TrailingInput(rest.join(" ")))
        }
    }

    fn parse_statement(&mut self) -> Result<SqlAst, ParseError> {
        if self.at_kw("CREATE") {
            self.parse_create()
        } else if self.at_kw("DROP") {
            self.parse_drop()
        } else if self.eat_kw("INSERT") {
            self.parse_insert()
        } else if self.eat_kw("SELECT") {
            self.parse_select()
        } else if self.eat_kw("UPDATE") {
            self.parse_update()
        } else if self.eat_kw("DELETE") {
            self.parse_delete()
        } else {
            Err(self.unexpected("a SQL statement"))
        }
    }

    // CREATE TABLE name (col_def, ...)
    // CREATE [UNIQUE] INDEX name ON table (column)
    fn parse_create(&mut self) -> Result<SqlAst, ParseError> {
        self.expect_kw("CREATE")?;
        if self.eat_kw("TABLE") {
            let table = self.expect_ident("table name")?;
            self.expect_tok(Token::LParen)?;
            let mut columns = vec![self.parse_column_def()?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                columns.push(self.parse_column_def()?);
            }
            self.expect_tok(Token::RParen)?;
            Ok(SqlAst::CreateTable(CreateTable { table, columns }))
        } else {
            let unique = self.eat_kw("UNIQUE");
            self.expect_kw("INDEX")?;
            let index = self.expect_ident("index name")?;
            self.expect_kw("ON")?;
            let table = self.expect_ident("table name")?;
            self.expect_tok(Token::LParen)?;
            let column = self.expect_ident("column name")?;
            self.expect_tok(Token::RParen)?;
            Ok(SqlAst::CreateIndex(CreateIndex {
                index,
                table,
                column,
                unique,
            }))
        }
    }

    // name type [(n)] [PRIMARY KEY | UNIQUE | NOT NULL]* [DEFAULT lit]
    fn parse_column_def(&mut self) -> Result<ColumnDef, ParseError> {
        let name = self.expect_ident("column name")?;
        let data_type = self.expect_ident("column type")?;

        let mut max_length = None;
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            match self.next() {
                Some(Token::Int(n)) if n >= 0 && n <= u32::MAX as i64 => {
                    max_length = Some(n as u32);
                }
                Some(tok) => {
                    return Err(ParseError::Expected {
                        expected: "type length".into(),
                        found: tok.to_string(),
                    })
                }
                None => {
                    return Err(ParseError::UnexpectedEnd {
                        expected: "type length".into(),
                    })
                }
            }
            self.expect_tok(Token::RParen)?;
        }

        let mut constraints = Vec::new();
        let mut default = None;
        loop {
            if self.eat_kw("PRIMARY") {
                self.expect_kw("KEY")?;
                constraints.push(ConstraintDef::PrimaryKey);
            } else if self.eat_kw("UNIQUE") {
                constraints.push(ConstraintDef::Unique);
            } else if self.eat_kw("NOT") {
                self.expect_kw("NULL")?;
                constraints.push(ConstraintDef::NotNull);
            } else if self.eat_kw("DEFAULT") {
                default = Some(self.parse_literal()?);
            } else {
                break;
            }
        }

        Ok(ColumnDef {
            name,
            data_type,
            max_length,
            constraints,
            default,
        })
    }

    // DROP TABLE name | DROP INDEX name ON table
    fn parse_drop(&mut self) -> Result<SqlAst, ParseError> {
        self.expect_kw("DROP")?;
        if self.eat_kw("TABLE") {
            let table = self.expect_ident("table name")?;
            Ok(SqlAst::DropTable { table })
        } else if self.eat_kw("INDEX") {
            let index = self.expect_ident("index name")?;
            self.expect_kw("ON")?;
            let table = self.expect_ident("table name")?;
            Ok(SqlAst::DropIndex { index, table })
        } else {
            Err(self.unexpected("`TABLE` or `INDEX`"))
        }
    }

    // INSERT INTO table (col, ...) VALUES (lit, ...)
    fn parse_insert(&mut self) -> Result<SqlAst, ParseError> {
        self.expect_kw("INTO")?;
        let table = self.expect_ident("table name")?;

        self.expect_tok(Token::LParen)?;
        let mut columns = vec![self.expect_ident("column name")?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            columns.push(self.expect_ident("column name")?);
        }
        self.expect_tok(Token::RParen)?;

        self.expect_kw("VALUES")?;
        self.expect_tok(Token::LParen)?;
        let mut values = vec![self.parse_literal()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            values.push(self.parse_literal()?);
        }
        self.expect_tok(Token::RParen)?;

        if columns.len() != values.len() {
            return Err(ParseError::ColumnValueCount {
                columns: columns.len(),
                values: values.len(),
            });
        }

        Ok(SqlAst::Insert(Insert {
            table,
            columns,
            values,
        }))
    }

    // SELECT projection FROM table [alias] [join] [WHERE ..] [ORDER BY ..]
    // [LIMIT n [OFFSET m]]
    fn parse_select(&mut self) -> Result<SqlAst, ParseError> {
        let projection = if self.peek() == Some(&Token::Star) {
            self.pos += 1;
            Projection::Star
        } else {
            let mut cols = vec![self.parse_column_name()?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                cols.push(self.parse_column_name()?);
            }
            Projection::Columns(cols)
        };

        self.expect_kw("FROM")?;
        let table = self.expect_ident("table name")?;
        let alias = self.parse_optional_alias();

        let mut join = None;
        if self.at_join() {
            join = Some(self.parse_join()?);
            if self.at_join() {
                return Err(ParseError::Unsupported(
                    "more than one JOIN clause".into(),
                ));
            }
        }

        let selection = self.parse_where()?;
        let order_by = self.parse_order_by()?;
        let (limit, offset) = self.parse_limit_offset()?;

        Ok(SqlAst::Select(Box::new(Select {
            table,
            alias,
            projection,
            join,
            selection,
            order_by,
            limit,
            offset,
        })))
    }

    fn at_join(&self) -> bool {
        self.at_kw("JOIN") || self.at_kw("INNER") || self.at_kw("LEFT") || self.at_kw("RIGHT")
    }

    fn parse_join(&mut self) -> Result<Join, ParseError> {
        let kind = if self.eat_kw("INNER") {
            JoinKind::Inner
        } else if self.eat_kw("LEFT") {
            JoinKind::Left
        } else if self.eat_kw("RIGHT") {
            // Recognized but not executable; fail here rather than mid-query.
            return Err(ParseError::Unsupported("RIGHT JOIN".into()));
        } else {
            JoinKind::Inner
        };
        self.expect_kw("JOIN")?;

        let table = self.expect_ident("table name")?;
        let alias = self.parse_optional_alias();
        self.expect_kw("ON")?;
        let on_left = self.parse_column_ref()?;
        self.expect_tok(Token::Eq)?;
        let on_right = self.parse_column_ref()?;

        Ok(Join {
            kind,
            table,
            alias,
            on_left,
            on_right,
        })
    }

    /// A bare identifier following a table name, unless it opens a clause.
    fn parse_optional_alias(&mut self) -> Option<String> {
        const CLAUSES: &[&str] = &[
            "JOIN", "INNER", "LEFT", "RIGHT", "ON", "WHERE", "ORDER", "LIMIT", "OFFSET", "SET",
        ];
        match self.peek() {
            Some(Token::Ident(s)) if !CLAUSES.iter().any(|kw| s.eq_ignore_ascii_case(kw)) => {
                let alias = s.clone();
                self.pos += 1;
                Some(alias)
            }
            _ => None,
        }
    }

    // UPDATE table SET col = lit, ... [WHERE ..]
    fn parse_update(&mut self) -> Result<SqlAst, ParseError> {
        let table = self.expect_ident("table name")?;
        self.expect_kw("SET")?;

        let mut assignments = Vec::new();
        loop {
            let column = self.expect_ident("column name")?;
            self.expect_tok(Token::Eq)?;
            let value = self.parse_literal()?;
            assignments.push((column, value));
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }

        let selection = self.parse_where()?;
        Ok(SqlAst::Update(Update {
            table,
            assignments,
            selection,
        }))
    }

    // DELETE FROM table [WHERE ..]
    fn parse_delete(&mut self) -> Result<SqlAst, ParseError> {
        self.expect_kw("FROM")?;
        let table = self.expect_ident("table name")?;
        let selection = self.parse_where()?;
        Ok(SqlAst::Delete(Delete { table, selection }))
    }

    /// WHERE clause: conjunction of `column OP literal` predicates.
    fn parse_where(&mut self) -> Result<Vec<Predicate>, ParseError> {
        if !self.eat_kw("WHERE") {
            return Ok(Vec::new());
        }

        let mut predicates = vec![self.parse_predicate()?];
        loop {
            if self.eat_kw("AND") {
                predicates.push(self.parse_predicate()?);
            } else if self.at_kw("OR") {
                return Err(ParseError::Unsupported("OR in WHERE clause".into()));
            } else {
                break;
            }
        }
        Ok(predicates)
    }

    fn parse_predicate(&mut self) -> Result<Predicate, ParseError> {
        let column = self.parse_column_name()?;

        if self.eat_kw("IS") {
            let negated = self.eat_kw("NOT");
            self.expect_kw("NULL")?;
            let op = if negated {
                PredicateOp::IsNotNull
            } else {
                PredicateOp::IsNull
            };
            return Ok(Predicate { column, op });
        }

        if self.eat_kw("LIKE") {
            let pattern = self.parse_literal()?;
            return Ok(Predicate {
                column,
                op: PredicateOp::Like(pattern),
            });
        }

        let op = match self.next() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Neq) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(tok) => {
                return Err(ParseError::Expected {
                    expected: "a comparison operator".into(),
                    found: tok.to_string(),
                })
            }
            None => {
                return Err(ParseError::UnexpectedEnd {
                    expected: "a comparison operator".into(),
                })
            }
        };
        let value = self.parse_literal()?;
        Ok(Predicate {
            column,
            op: PredicateOp::Cmp(op, value),
        })
    }

    fn parse_order_by(&mut self) -> Result<Vec<OrderBy>, ParseError> {
        if !self.eat_kw("ORDER") {
            return Ok(Vec::new());
        }
        self.expect_kw("BY")?;

        let mut keys = Vec::new();
        loop {
            let column = self.parse_column_name()?;
            let desc = if self.eat_kw("DESC") {
                true
            } else {
                self.eat_kw("ASC");
                false
            };
            keys.push(OrderBy { column, desc });
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(keys)
    }

    fn parse_limit_offset(&mut self) -> Result<(Option<u64>, Option<u64>), ParseError> {
        if !self.eat_kw("LIMIT") {
            return Ok((None, None));
        }
        let limit = self.parse_count("LIMIT")?;
        let offset = if self.eat_kw("OFFSET") {
            Some(self.parse_count("OFFSET")?)
        } else {
            None
        };
        Ok((Some(limit), offset))
    }

    fn parse_count(&mut self, clause: &str) -> Result<u64, ParseError> {
        match self.next() {
            Some(Token::Int(n)) if n >= 0 => Ok(n as u64),
            Some(tok) => Err(ParseError::Expected {
                expected: format!("a non-negative {clause} count"),
                found: tok.to_string(),
            }),
            None => Err(ParseError::UnexpectedEnd {
                expected: format!("a {clause} count"),
            }),
        }
    }

    /// `ident` or `ident.ident`, joined back into one dotted name.
    fn parse_column_name(&mut self) -> Result<String, ParseError> {
        let first = self.expect_ident("column name")?;
        if self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            let second = self.expect_ident("column name")?;
            Ok(format!("{first}.{second}"))
        } else {
            Ok(first)
        }
    }

    /// `qualifier.column`; the qualifier is required in ON clauses.
    fn parse_column_ref(&mut self) -> Result<ColumnRef, ParseError> {
        let qualifier = self.expect_ident("table or alias")?;
        self.expect_tok(Token::Dot)?;
        let column = self.expect_ident("column name")?;
        Ok(ColumnRef { qualifier, column })
    }

    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        let negative = match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                true
            }
            Some(Token::Plus) => {
                self.pos += 1;
                false
            }
            _ => false,
        };

        let lit = match self.next() {
            Some(Token::Int(n)) => Literal::Int(if negative { -n } else { n }),
            Some(Token::Float(x)) => Literal::Float(if negative { -x } else { x }),
            Some(tok) if negative => {
                return Err(ParseError::Expected {
                    expected: "a numeric literal".into(),
                    found: tok.to_string(),
                })
            }
            Some(Token::Str(s)) => Literal::Str(s),
            Some(Token::Param) => {
                let idx = self.params;
                self.params += 1;
                Literal::Param(idx)
            }
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case("TRUE") => Literal::Bool(true),
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case("FALSE") => Literal::Bool(false),
            Some(Token::Ident(s)) if s.eq_ignore_ascii_case("NULL") => Literal::Null,
            Some(tok) => {
                return Err(ParseError::Expected {
                    expected: "a literal".into(),
                    found: tok.to_string(),
                })
            }
            None => {
                return Err(ParseError::UnexpectedEnd {
                    expected: "a literal".into(),
                })
            }
        };
        Ok(lit)
    }
}
