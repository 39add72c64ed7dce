//! # Configuration Module
//!
//! Centralizes the on-disk format constants for rowlite. The values here are
//! fixed by the SQLite 3 file format, not tunable: changing any of them
//! produces files that real SQLite builds cannot read. They live in one
//! module so the layout arithmetic (header sizes, offsets, page-size bounds)
//! has a single source of truth.
//!
//! ## Module Organization
//!
//! - [`constants`]: file-header layout, page-header sizes, page-size bounds

pub mod constants;
pub use constants::*;
