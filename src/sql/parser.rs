//! Recursive-descent statement parser.
//!
//! The WHERE grammar mirrors the precedence SQL gives `OR` and `AND`:
//!
//! ```text
//! predicate  := or
//! or         := and (OR and)*
//! and        := comparison (AND comparison)*
//! comparison := '(' or ')'
//!             | <column> ('=' | '!=' | '<' | '<=' | '>' | '>=') <integer>
//! ```
//!
//! Inside a CREATE TABLE column list, anything between a column's type
//! and the next comma (constraints like `PRIMARY KEY`) is skipped so that
//! schema text written by other tools still parses.

use std::mem;

use eyre::{bail, ensure, Result};

use crate::sql::ast::{
    ColumnDecl, CompareOp, CreateTableStmt, Expr, InsertStmt, Literal, SelectColumns, SelectStmt,
    Statement, TypeName,
};
use crate::sql::lexer::{Keyword, Lexer, Token};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Self { lexer, current }
    }

    fn advance(&mut self) -> Token {
        let next = self.lexer.next_token();
        mem::replace(&mut self.current, next)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.current == *token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        self.eat(&Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        ensure!(
            self.current == token,
            "expected {:?}, found {:?}",
            token,
            self.current
        );
        self.advance();
        Ok(())
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn ident(&mut self) -> Result<String> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => bail!("expected an identifier, found {:?}", other),
        }
    }

    pub fn parse_statement(&mut self) -> Result<Statement> {
        let statement = match &self.current {
            Token::Keyword(Keyword::Create) => Statement::CreateTable(self.parse_create_table()?),
            Token::Keyword(Keyword::Select) => Statement::Select(self.parse_select()?),
            Token::Keyword(Keyword::Insert) => Statement::Insert(self.parse_insert()?),
            other => bail!("expected CREATE, SELECT, or INSERT, found {:?}", other),
        };
        self.eat(&Token::Semicolon);
        ensure!(
            self.current == Token::Eof,
            "unexpected trailing input: {:?}",
            self.current
        );
        Ok(statement)
    }

    fn parse_create_table(&mut self) -> Result<CreateTableStmt> {
        self.expect_keyword(Keyword::Create)?;
        self.expect_keyword(Keyword::Table)?;
        let name = self.ident()?;
        self.expect(Token::LParen)?;

        let mut columns = Vec::new();
        loop {
            let column_name = self.ident()?;
            let type_name = match self.current {
                Token::Keyword(
                    Keyword::Text
                    | Keyword::Integer
                    | Keyword::Numeric
                    | Keyword::Real
                    | Keyword::Blob,
                ) => Some(self.type_name()?),
                _ => None,
            };
            columns.push(ColumnDecl {
                name: column_name,
                type_name,
            });

            // skip constraints up to the next column or the closing paren
            while !matches!(self.current, Token::Comma | Token::RParen | Token::Eof) {
                self.advance();
            }

            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            break;
        }

        ensure!(!columns.is_empty(), "CREATE TABLE with no columns");
        Ok(CreateTableStmt { name, columns })
    }

    fn type_name(&mut self) -> Result<TypeName> {
        match self.advance() {
            Token::Keyword(Keyword::Text) => Ok(TypeName::Text),
            Token::Keyword(Keyword::Integer) => Ok(TypeName::Integer),
            Token::Keyword(Keyword::Numeric) => Ok(TypeName::Numeric),
            Token::Keyword(Keyword::Real) => Ok(TypeName::Real),
            Token::Keyword(Keyword::Blob) => Ok(TypeName::Blob),
            other => bail!("expected a column type, found {:?}", other),
        }
    }

    fn parse_select(&mut self) -> Result<SelectStmt> {
        self.expect_keyword(Keyword::Select)?;

        let columns = if self.eat(&Token::Star) {
            SelectColumns::All
        } else {
            let mut names = vec![self.ident()?];
            while self.eat(&Token::Comma) {
                names.push(self.ident()?);
            }
            SelectColumns::Named(names)
        };

        self.expect_keyword(Keyword::From)?;
        let table = self.ident()?;

        let predicate = if self.eat_keyword(Keyword::Where) {
            Some(self.parse_or()?)
        } else {
            None
        };

        Ok(SelectStmt {
            columns,
            table,
            predicate,
        })
    }

    fn parse_insert(&mut self) -> Result<InsertStmt> {
        self.expect_keyword(Keyword::Insert)?;
        self.expect_keyword(Keyword::Into)?;
        let table = self.ident()?;
        self.expect_keyword(Keyword::Values)?;
        self.expect(Token::LParen)?;

        let mut values = vec![self.literal()?];
        while self.eat(&Token::Comma) {
            values.push(self.literal()?);
        }
        self.expect(Token::RParen)?;

        Ok(InsertStmt { table, values })
    }

    fn literal(&mut self) -> Result<Literal> {
        let negative = self.eat(&Token::Minus);
        match self.advance() {
            Token::Integer(value) => Ok(Literal::Integer(if negative { -value } else { value })),
            Token::Real(value) => Ok(Literal::Real(if negative { -value } else { value })),
            Token::StringLit(text) => {
                ensure!(!negative, "a string literal cannot be negated");
                Ok(Literal::Text(text))
            }
            other => bail!("expected a literal, found {:?}", other),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut expr = self.parse_and()?;
        while self.eat_keyword(Keyword::Or) {
            let rhs = self.parse_and()?;
            expr = Expr::Or(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut expr = self.parse_comparison()?;
        while self.eat_keyword(Keyword::And) {
            let rhs = self.parse_comparison()?;
            expr = Expr::And(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        if self.eat(&Token::LParen) {
            let expr = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(expr);
        }

        let column = self.ident()?;
        let op = match self.advance() {
            Token::Eq => CompareOp::Eq,
            Token::NotEq => CompareOp::NotEq,
            Token::Less => CompareOp::Less,
            Token::LessEq => CompareOp::LessEq,
            Token::Greater => CompareOp::Greater,
            Token::GreaterEq => CompareOp::GreaterEq,
            other => bail!("expected a comparison operator, found {:?}", other),
        };
        let negative = self.eat(&Token::Minus);
        let value = match self.advance() {
            Token::Integer(value) => {
                if negative {
                    -value
                } else {
                    value
                }
            }
            other => bail!("expected an integer literal, found {:?}", other),
        };

        Ok(Expr::Compare { column, op, value })
    }
}
