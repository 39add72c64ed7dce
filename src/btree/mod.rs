//! # Table B-Tree Engine
//!
//! Point lookup, insertion, and full scans over on-disk table b-trees.
//! All data lives in leaf cells keyed by rowid; interior pages hold
//! separator cells `(left child, rowid)` plus a right-most child pointer.
//! A separator's rowid is the largest rowid in its left subtree, so
//! descent takes the first cell whose rowid is `>= ` the target and falls
//! through to the right-most child past the last cell.
//!
//! ## Growth
//!
//! Inserts that overflow a leaf trigger a 2-way split: the cell sequence
//! (including the incoming cell) is cut at the most size-balanced index,
//! the right half moves to a fresh page, and the separator is promoted
//! into the parent, splitting ancestors as needed. When the root itself
//! splits it is rewritten **in place** as an interior page over two fresh
//! children; tables are addressed by root page number, so root identity
//! must survive every insert.
//!
//! Pages are written child-first: split halves and overflow chains reach
//! the file before any pointer to them does. A crash mid-insert can leave
//! orphan pages at EOF but never a dangling pointer.
//!
//! ## What Is Not Here
//!
//! No deletion, so no underflow handling, merging, or rebalancing. A
//! payload so large that one of the two halves still cannot hold its
//! share surfaces [`InsertOutcome::TripleSplitUnsupported`] rather than a
//! 3-way split.

pub mod tree;

pub use tree::{find, insert, scan, InsertOutcome};
