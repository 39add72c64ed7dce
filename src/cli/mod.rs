//! Interactive shell for poking at database files.

pub mod repl;

pub use repl::Repl;
