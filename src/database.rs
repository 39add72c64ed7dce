//! # Database API
//!
//! The public face of the engine and the glue between parsed statements
//! and the b-tree. A [`Database`] owns one open file through its pager
//! and the catalog parsed from page 1.
//!
//! ## Statement Execution
//!
//! - `CREATE TABLE` appends a fresh empty leaf as the table's root and
//!   inserts a row into the page-1 schema b-tree describing it.
//! - `INSERT` builds a record from the literals in declaration order.
//!   The column named `id` supplies the cell rowid (serial type 0, empty
//!   body); it must be a positive integer.
//! - `SELECT` walks the table's b-tree, filters with the WHERE predicate,
//!   and projects the requested columns.
//!
//! WHERE comparisons treat INTEGER columns as signed 64-bit values,
//! matching the record encoding.
//!
//! ## Locking
//!
//! The engine is single-threaded by design; the locks below only grant
//! the `&self` methods interior mutability over the pager and catalog.
//! They make the type safe to share, not concurrent: every statement
//! holds the pager for its full duration.

use std::path::{Path, PathBuf};

use eyre::{bail, ensure, Result};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::btree::{self, InsertOutcome};
use crate::config::SCHEMA_ROOT_PAGE;
use crate::record::{Payload, Value};
use crate::schema::{Catalog, Column, ColumnAffinity, TableSchema};
use crate::sql::{
    self, CreateTableStmt, Expr, InsertStmt, Literal, SelectColumns, SelectStmt, Statement,
};
use crate::storage::{Page, PageType, Pager};

/// One column value materialised out of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<OwnedValue>,
}

impl Row {
    pub fn new(values: Vec<OwnedValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&OwnedValue> {
        self.values.get(index)
    }

    pub fn get_int(&self, index: usize) -> Result<i64> {
        match self.values.get(index) {
            Some(OwnedValue::Integer(value)) => Ok(*value),
            other => bail!("column {} is not an integer: {:?}", index, other),
        }
    }

    pub fn get_text(&self, index: usize) -> Result<&str> {
        match self.values.get(index) {
            Some(OwnedValue::Text(text)) => Ok(text),
            other => bail!("column {} is not text: {:?}", index, other),
        }
    }

    pub fn column_count(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[OwnedValue] {
        &self.values
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteResult {
    CreateTable { root_page: u32 },
    Insert { rows_affected: usize },
    Select { rows: Vec<Row> },
}

pub struct Database {
    path: PathBuf,
    pager: Mutex<Pager>,
    catalog: RwLock<Catalog>,
}

impl Database {
    /// Opens an existing database file and parses its schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut pager = Pager::open(&path)?;
        let catalog = Catalog::load(&mut pager)?;
        debug!(path = %path.display(), "opened database");
        Ok(Self {
            path,
            pager: Mutex::new(pager),
            catalog: RwLock::new(catalog),
        })
    }

    /// Creates a fresh database file holding only the empty schema table.
    pub fn create<P: AsRef<Path>>(path: P, page_size: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let pager = Pager::create(&path, page_size)?;
        debug!(path = %path.display(), page_size, "created database");
        Ok(Self {
            path,
            pager: Mutex::new(pager),
            catalog: RwLock::new(Catalog::empty()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> u32 {
        self.pager.lock().page_size()
    }

    pub fn database_size_in_pages(&self) -> u32 {
        self.pager.lock().database_size_in_pages()
    }

    /// Parses and runs a single statement.
    pub fn execute(&self, sql_text: &str) -> Result<ExecuteResult> {
        match sql::parse(sql_text)? {
            Statement::CreateTable(create) => self.execute_create_table(create, sql_text),
            Statement::Insert(insert) => self.execute_insert(insert),
            Statement::Select(select) => {
                let rows = self.execute_select(select)?;
                Ok(ExecuteResult::Select { rows })
            }
        }
    }

    /// Runs a SELECT and returns its rows.
    pub fn query(&self, sql_text: &str) -> Result<Vec<Row>> {
        match self.execute(sql_text)? {
            ExecuteResult::Select { rows } => Ok(rows),
            other => bail!("statement is not a query: {:?}", other),
        }
    }

    // --- low-level contracts used by tests and tooling ---

    /// Root page number of a table.
    pub fn root_of(&self, table_name: &str) -> Result<u32> {
        self.catalog.read().root_of(table_name)
    }

    /// Names of every table in the catalog, in no particular order.
    pub fn table_names(&self) -> Vec<String> {
        self.catalog
            .read()
            .tables()
            .map(|schema| schema.name.clone())
            .collect()
    }

    /// Point lookup on an arbitrary table b-tree.
    pub fn find(&self, root: u32, rowid: u64) -> Result<Option<Payload>> {
        btree::find(&mut self.pager.lock(), root, rowid)
    }

    /// Raw insert on an arbitrary table b-tree.
    pub fn insert(&self, root: u32, rowid: u64, payload: &Payload) -> Result<InsertOutcome> {
        btree::insert(&mut self.pager.lock(), root, rowid, payload)
    }

    /// Walks every leaf payload of a table b-tree.
    pub fn scan(&self, root: u32, visit: &mut dyn FnMut(Payload) -> Result<()>) -> Result<()> {
        btree::scan(&mut self.pager.lock(), root, visit)
    }

    // --- statement execution ---

    fn execute_create_table(
        &self,
        create: CreateTableStmt,
        sql_text: &str,
    ) -> Result<ExecuteResult> {
        let mut catalog = self.catalog.write();
        ensure!(
            !catalog.contains(&create.name),
            "table {} already exists",
            create.name
        );

        let mut pager = self.pager.lock();
        let (page_size, usable_size) = (pager.page_size(), pager.usable_size());
        let root_page =
            pager.append_page(Page::fresh(PageType::LeafTable, page_size, usable_size).buf())?;

        let canonical_sql = sql_text.trim().trim_end_matches(';').trim_end();
        let rowid = catalog.next_schema_rowid();
        let payload = Payload::encode(
            rowid,
            &[
                Value::Text("table".into()),
                Value::Text(create.name.clone()),
                Value::Text(create.name.clone()),
                Value::Integer(i64::from(root_page)),
                Value::Text(canonical_sql.to_string()),
            ],
        );

        match btree::insert(&mut pager, SCHEMA_ROOT_PAGE, rowid, &payload)? {
            InsertOutcome::Inserted => {}
            InsertOutcome::RowidAlreadyInDatabase => {
                bail!("schema rowid {} already taken", rowid)
            }
            InsertOutcome::TripleSplitUnsupported => {
                bail!("CREATE TABLE statement too large for the schema page")
            }
        }

        let columns = create
            .columns
            .into_iter()
            .map(|decl| Column {
                name: decl.name,
                affinity: ColumnAffinity::from_declared(decl.type_name),
            })
            .collect();
        catalog.register(TableSchema {
            name: create.name.clone(),
            root_page,
            columns,
        });
        debug!(table = %create.name, root_page, "created table");

        Ok(ExecuteResult::CreateTable { root_page })
    }

    fn execute_insert(&self, insert: InsertStmt) -> Result<ExecuteResult> {
        let catalog = self.catalog.read();
        let Some(table) = catalog.table(&insert.table) else {
            bail!("no such table: {}", insert.table);
        };
        ensure!(
            insert.values.len() == table.columns.len(),
            "table {} has {} columns but {} values were supplied",
            table.name,
            table.columns.len(),
            insert.values.len()
        );

        let rowid_index = table.rowid_column();
        let mut rowid: Option<u64> = None;
        let mut values = Vec::with_capacity(insert.values.len());

        for (index, (column, literal)) in
            table.columns.iter().zip(insert.values.iter()).enumerate()
        {
            let value = match (column.affinity, literal) {
                (ColumnAffinity::Text, Literal::Text(text)) => Value::Text(text.clone()),
                (ColumnAffinity::Integer, Literal::Integer(n)) => {
                    if rowid_index == Some(index) {
                        ensure!(
                            *n >= 1,
                            "rowid column {} must be a positive integer, got {}",
                            column.name,
                            n
                        );
                        rowid = Some(*n as u64);
                        Value::RowidAlias
                    } else {
                        Value::Integer(*n)
                    }
                }
                (ColumnAffinity::Real, Literal::Real(x)) => Value::Real(*x),
                (ColumnAffinity::Real, Literal::Integer(n)) => Value::Real(*n as f64),
                (affinity, literal) => bail!(
                    "value {:?} does not match column {} of type {:?}",
                    literal,
                    column.name,
                    affinity
                ),
            };
            values.push(value);
        }

        let Some(rowid) = rowid else {
            bail!("table {} has no INTEGER column named id to supply the rowid", table.name);
        };

        let payload = Payload::encode(rowid, &values);
        let mut pager = self.pager.lock();
        match btree::insert(&mut pager, table.root_page, rowid, &payload)? {
            InsertOutcome::Inserted => Ok(ExecuteResult::Insert { rows_affected: 1 }),
            InsertOutcome::RowidAlreadyInDatabase => {
                bail!("rowid {} already exists in table {}", rowid, table.name)
            }
            InsertOutcome::TripleSplitUnsupported => {
                bail!("row too large: a two-way page split cannot hold it")
            }
        }
    }

    fn execute_select(&self, select: SelectStmt) -> Result<Vec<Row>> {
        let catalog = self.catalog.read();
        let Some(table) = catalog.table(&select.table) else {
            bail!("no such table: {}", select.table);
        };

        // record ordinals are 1-based declaration positions
        let projection: Vec<(usize, ColumnAffinity)> = match &select.columns {
            SelectColumns::All => table
                .columns
                .iter()
                .enumerate()
                .map(|(index, column)| (index + 1, column.affinity))
                .collect(),
            SelectColumns::Named(names) => names
                .iter()
                .map(|name| match table.column_index(name) {
                    Some(index) => Ok((index + 1, table.columns[index].affinity)),
                    None => bail!("no column {} in table {}", name, table.name),
                })
                .collect::<Result<_>>()?,
        };

        if let Some(predicate) = &select.predicate {
            validate_predicate(predicate, table)?;
        }

        let mut rows = Vec::new();
        let mut pager = self.pager.lock();
        btree::scan(&mut pager, table.root_page, &mut |payload| {
            if let Some(predicate) = &select.predicate {
                if !eval_predicate(predicate, table, &payload)? {
                    return Ok(());
                }
            }
            let mut values = Vec::with_capacity(projection.len());
            for &(ordinal, affinity) in &projection {
                values.push(materialise(&payload, ordinal, affinity)?);
            }
            rows.push(Row::new(values));
            Ok(())
        })?;

        Ok(rows)
    }
}

/// Every column a predicate touches must exist and be INTEGER.
fn validate_predicate(predicate: &Expr, table: &TableSchema) -> Result<()> {
    for name in predicate.columns() {
        match table.column_index(name) {
            None => bail!("no column {} in table {}", name, table.name),
            Some(index) => ensure!(
                table.columns[index].affinity == ColumnAffinity::Integer,
                "WHERE only supports INTEGER columns, {} is {:?}",
                name,
                table.columns[index].affinity
            ),
        }
    }
    Ok(())
}

fn eval_predicate(predicate: &Expr, table: &TableSchema, payload: &Payload) -> Result<bool> {
    match predicate {
        Expr::Or(lhs, rhs) => {
            Ok(eval_predicate(lhs, table, payload)? || eval_predicate(rhs, table, payload)?)
        }
        Expr::And(lhs, rhs) => {
            Ok(eval_predicate(lhs, table, payload)? && eval_predicate(rhs, table, payload)?)
        }
        Expr::Compare { column, op, value } => {
            // validated up front, so the unwrap cannot miss
            let ordinal = table.column_index(column).unwrap() + 1;
            let lhs = payload.integer_column(ordinal)?;
            Ok(op.eval(lhs, *value))
        }
    }
}

fn materialise(payload: &Payload, ordinal: usize, affinity: ColumnAffinity) -> Result<OwnedValue> {
    match affinity {
        ColumnAffinity::Text => Ok(OwnedValue::Text(payload.text_column(ordinal)?.to_string())),
        ColumnAffinity::Integer => Ok(OwnedValue::Integer(payload.integer_column(ordinal)?)),
        ColumnAffinity::Real => Ok(OwnedValue::Real(payload.real_column(ordinal)?)),
        ColumnAffinity::Blob => Ok(OwnedValue::Blob(payload.blob_column(ordinal)?.to_vec())),
        ColumnAffinity::Numeric => bail!("NUMERIC columns cannot be projected"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fresh_db(page_size: u32) -> (tempfile::TempDir, Database) {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path().join("db.lite"), page_size).unwrap();
        (dir, db)
    }

    #[test]
    fn create_table_allocates_root_page_two() {
        let (_dir, db) = fresh_db(4096);
        let result = db
            .execute("CREATE TABLE t (id INTEGER, name TEXT)")
            .unwrap();
        assert_eq!(result, ExecuteResult::CreateTable { root_page: 2 });
        assert_eq!(db.root_of("t").unwrap(), 2);
    }

    #[test]
    fn duplicate_create_table_is_an_error() {
        let (_dir, db) = fresh_db(4096);
        db.execute("CREATE TABLE t (id INTEGER)").unwrap();
        assert!(db.execute("CREATE TABLE t (id INTEGER)").is_err());
    }

    #[test]
    fn insert_into_missing_table_is_an_error() {
        let (_dir, db) = fresh_db(4096);
        assert!(db.execute("INSERT INTO ghost VALUES (1)").is_err());
    }

    #[test]
    fn insert_value_count_must_match_columns() {
        let (_dir, db) = fresh_db(4096);
        db.execute("CREATE TABLE t (id INTEGER, name TEXT)").unwrap();
        assert!(db.execute("INSERT INTO t VALUES (1)").is_err());
        assert!(db.execute("INSERT INTO t VALUES (1, 'a', 2)").is_err());
    }

    #[test]
    fn insert_requires_positive_rowid() {
        let (_dir, db) = fresh_db(4096);
        db.execute("CREATE TABLE t (id INTEGER, name TEXT)").unwrap();
        assert!(db.execute("INSERT INTO t VALUES (0, 'a')").is_err());
        assert!(db.execute("INSERT INTO t VALUES (-3, 'a')").is_err());
    }

    #[test]
    fn type_mismatch_on_insert_is_an_error() {
        let (_dir, db) = fresh_db(4096);
        db.execute("CREATE TABLE t (id INTEGER, name TEXT)").unwrap();
        assert!(db.execute("INSERT INTO t VALUES ('x', 'a')").is_err());
        assert!(db.execute("INSERT INTO t VALUES (1, 2)").is_err());
    }

    #[test]
    fn select_unknown_column_is_an_error() {
        let (_dir, db) = fresh_db(4096);
        db.execute("CREATE TABLE t (id INTEGER, name TEXT)").unwrap();
        assert!(db.query("SELECT ghost FROM t").is_err());
    }

    #[test]
    fn where_on_text_column_is_an_error() {
        let (_dir, db) = fresh_db(4096);
        db.execute("CREATE TABLE t (id INTEGER, name TEXT)").unwrap();
        db.execute("INSERT INTO t VALUES (1, 'a')").unwrap();
        assert!(db.query("SELECT * FROM t WHERE name = 1").is_err());
    }

    #[test]
    fn id_column_projects_the_rowid() {
        let (_dir, db) = fresh_db(4096);
        db.execute("CREATE TABLE t (id INTEGER, name TEXT)").unwrap();
        db.execute("INSERT INTO t VALUES (41, 'zed')").unwrap();
        let rows = db.query("SELECT id, name FROM t").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_int(0).unwrap(), 41);
        assert_eq!(rows[0].get_text(1).unwrap(), "zed");
    }
}
