//! Statement and expression nodes produced by the parser.

/// Declared column type. Maps one-to-one onto a storage affinity; only
/// TEXT and INTEGER are exercised by inserts and selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    Text,
    Integer,
    Numeric,
    Real,
    Blob,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    CreateTable(CreateTableStmt),
    Select(SelectStmt),
    Insert(InsertStmt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub name: String,
    pub columns: Vec<ColumnDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDecl {
    pub name: String,
    /// `None` when the declaration carries no type, as some tables
    /// written by other tools do; such columns get BLOB affinity.
    pub type_name: Option<TypeName>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub columns: SelectColumns,
    pub table: String,
    pub predicate: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumns {
    All,
    Named(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub table: String,
    pub values: Vec<Literal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Real(f64),
    Text(String),
}

/// WHERE predicate over INTEGER columns. Comparisons are signed 64-bit.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare {
        column: String,
        op: CompareOp,
        value: i64,
    },
}

impl Expr {
    /// Column names referenced anywhere in the predicate.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Or(a, b) | Expr::And(a, b) => {
                a.collect_columns(out);
                b.collect_columns(out);
            }
            Expr::Compare { column, .. } => out.push(column),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl CompareOp {
    pub fn eval(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::NotEq => lhs != rhs,
            CompareOp::Less => lhs < rhs,
            CompareOp::LessEq => lhs <= rhs,
            CompareOp::Greater => lhs > rhs,
            CompareOp::GreaterEq => lhs >= rhs,
        }
    }
}
