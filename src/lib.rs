//! # rowlite - SQLite-Format Rowid-Table Storage Engine
//!
//! rowlite reads and writes database files in the SQLite 3 on-disk
//! format, restricted to rowid tables: it opens an existing file, parses
//! the schema from page 1, and executes single-table SELECT and INSERT
//! statements against it, mutating the file in place, including growing
//! table b-trees through page splits and root promotion.
//!
//! ## Quick Start
//!
//! ```ignore
//! use rowlite::Database;
//!
//! let db = Database::create("people.db", 4096)?;
//! db.execute("CREATE TABLE t (id INTEGER, name TEXT)")?;
//! db.execute("INSERT INTO t VALUES (1, 'alice')")?;
//!
//! let rows = db.query("SELECT name FROM t WHERE id = 1")?;
//! assert_eq!(rows[0].get_text(0)?, "alice");
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------+
//! |        Database (SQL glue)           |
//! +--------------------------------------+
//! |  sql: lexer / parser  |  schema      |
//! +--------------------------------------+
//! |        btree: find / insert / scan   |
//! +--------------------------------------+
//! |  record codec  |  storage: page,     |
//! |  (serial types)|  pager, file header |
//! +--------------------------------------+
//! |        encoding: varint, big-endian  |
//! +--------------------------------------+
//! ```
//!
//! ## What It Deliberately Is Not
//!
//! No transactions, journal, or WAL; no crash recovery beyond the
//! format's append-before-link discipline; no page cache; no free-list
//! reuse; no DELETE or UPDATE; no index b-trees (their page types are
//! recognised, never traversed); no concurrency: a single process owns
//! one open file.

pub mod btree;
pub mod cli;
pub mod config;
pub mod database;
pub mod encoding;
pub mod record;
pub mod schema;
pub mod sql;
pub mod storage;

pub use btree::InsertOutcome;
pub use database::{Database, ExecuteResult, OwnedValue, Row};
pub use record::{Payload, Value};
