//! # Encoding Module
//!
//! Byte-level primitives shared by every layer that touches the file:
//!
//! - **Varint encoding**: the 1-9 byte MSB-continuation variable-length
//!   integers used for payload sizes, rowids, and record serial types
//! - **Fixed-width integers**: big-endian signed readers/writers at the
//!   widths the record format stores (8/16/24/32/48/64 bit), plus the
//!   unsigned u16/u32 helpers used by page headers and cell pointers

pub mod int;
pub mod varint;

pub use varint::{read_varint, varint_len, varint_len_plus, write_varint};
