//! # SQL Front-End
//!
//! Lexer, AST, and recursive-descent parser for the statement surface the
//! engine accepts:
//!
//! ```text
//! CREATE TABLE <name> (<col> <type>, ...)        types: TEXT | INTEGER |
//!                                                       NUMERIC | REAL | BLOB
//! SELECT * | <col>, ... FROM <name> [WHERE <predicate>]
//! INSERT INTO <name> VALUES (<literal>, ...)
//! ```
//!
//! WHERE predicates compare INTEGER columns against integer literals with
//! `= != < <= > >=`, combined by `AND` / `OR` with parentheses. Execution
//! lives in the [`crate::database`] layer; this module only turns text
//! into [`ast::Statement`] values.
//!
//! The same parser serves two inputs: statements typed by the user, and
//! the `CREATE TABLE` text stored in schema records, which may carry
//! column constraints this engine does not model; the parser skips
//! unknown tokens between a column's type and the next comma so such
//! tables still load.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{
    ColumnDecl, CompareOp, CreateTableStmt, Expr, InsertStmt, Literal, SelectColumns, SelectStmt,
    Statement, TypeName,
};
pub use lexer::{Keyword, Lexer, Token};
pub use parser::Parser;

use eyre::Result;

/// Parses a single SQL statement.
pub fn parse(sql: &str) -> Result<Statement> {
    Parser::new(sql).parse_statement()
}
