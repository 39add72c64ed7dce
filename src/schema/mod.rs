//! # Schema Catalog
//!
//! The schema table is itself a rowid table rooted at page 1. Each row
//! describes one database object with five columns:
//!
//! ```text
//! ordinal  column    use here
//! 1        type      only "table" rows are loaded
//! 2        name      table name
//! 3        tbl_name  same as name for tables
//! 4        rootpage  root page number of the table's b-tree
//! 5        sql       the original CREATE TABLE text
//! ```
//!
//! Loading walks the page-1 b-tree and re-parses each stored CREATE
//! TABLE text with the crate's own lexer, recording columns in
//! declaration order: ordinal N in a record is the Nth declared column.
//! A column named `id` is the table's rowid alias: its record body is
//! empty and its value is the cell's rowid.

use eyre::{bail, Result};
use hashbrown::HashMap;
use tracing::debug;

use crate::btree;
use crate::config::SCHEMA_ROOT_PAGE;
use crate::sql::{self, Statement, TypeName};
use crate::storage::Pager;

/// Storage class recommendation for a column. Only `Text` and `Integer`
/// are exercised by the statement surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAffinity {
    Text,
    Integer,
    Numeric,
    Real,
    Blob,
}

impl From<TypeName> for ColumnAffinity {
    fn from(type_name: TypeName) -> Self {
        match type_name {
            TypeName::Text => ColumnAffinity::Text,
            TypeName::Integer => ColumnAffinity::Integer,
            TypeName::Numeric => ColumnAffinity::Numeric,
            TypeName::Real => ColumnAffinity::Real,
            TypeName::Blob => ColumnAffinity::Blob,
        }
    }
}

impl ColumnAffinity {
    /// Untyped column declarations get BLOB ("no") affinity.
    pub fn from_declared(type_name: Option<TypeName>) -> Self {
        type_name.map(Self::from).unwrap_or(ColumnAffinity::Blob)
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub affinity: ColumnAffinity,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub root_page: u32,
    /// Declaration order; record ordinal = index + 1.
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Zero-based declaration index of a column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// The column aliasing the rowid, if the table declared one.
    pub fn rowid_column(&self) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.name == "id" && column.affinity == ColumnAffinity::Integer)
    }
}

pub struct Catalog {
    tables: HashMap<String, TableSchema>,
    next_schema_rowid: u64,
}

impl Catalog {
    pub fn empty() -> Self {
        Self {
            tables: HashMap::new(),
            next_schema_rowid: 1,
        }
    }

    /// Walks the page-1 b-tree and loads every rowid table.
    pub fn load(pager: &mut Pager) -> Result<Self> {
        let mut tables = HashMap::new();
        let mut max_rowid = 0u64;

        btree::scan(pager, SCHEMA_ROOT_PAGE, &mut |payload| {
            max_rowid = max_rowid.max(payload.rowid());

            let object_type = payload.text_column(1)?;
            if object_type != "table" {
                return Ok(());
            }
            let name = payload.text_column(2)?.to_string();
            let root_page = payload.integer_column(4)? as u32;
            let sql_text = payload.text_column(5)?;

            let columns = parse_columns(sql_text)?;
            debug!(table = %name, root_page, columns = columns.len(), "loaded table schema");
            tables.insert(
                name.clone(),
                TableSchema {
                    name,
                    root_page,
                    columns,
                },
            );
            Ok(())
        })?;

        Ok(Self {
            tables,
            next_schema_rowid: max_rowid + 1,
        })
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn root_of(&self, name: &str) -> Result<u32> {
        match self.tables.get(name) {
            Some(schema) => Ok(schema.root_page),
            None => bail!("no such table: {}", name),
        }
    }

    pub fn register(&mut self, schema: TableSchema) {
        self.tables.insert(schema.name.clone(), schema);
    }

    /// Rowid for the next schema-table record.
    pub fn next_schema_rowid(&mut self) -> u64 {
        let rowid = self.next_schema_rowid;
        self.next_schema_rowid += 1;
        rowid
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }
}

/// Columns of a stored CREATE TABLE text, in declaration order.
fn parse_columns(sql_text: &str) -> Result<Vec<Column>> {
    match sql::parse(sql_text)? {
        Statement::CreateTable(create) => Ok(create
            .columns
            .into_iter()
            .map(|decl| Column {
                name: decl.name,
                affinity: ColumnAffinity::from_declared(decl.type_name),
            })
            .collect()),
        other => bail!("schema row holds a non-CREATE statement: {:?}", other),
    }
}
