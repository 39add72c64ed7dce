//! # Record (Payload) Codec
//!
//! Every table b-tree leaf cell stores its row in the record format: a
//! self-describing header followed by the concatenated column bodies.
//!
//! ## Record Binary Layout
//!
//! ```text
//! +------------------------+------------------------+--------------------+
//! | bytes_in_header varint | serial-type varint x N | column bodies ...  |
//! +------------------------+------------------------+--------------------+
//! |<------------- bytes_in_header ---------------->|
//! ```
//!
//! The leading varint counts itself, which is why the encoder sizes it
//! with [`varint_len_plus`]. Each serial type encodes both the storage
//! class and the body length of one column:
//!
//! | serial type | meaning              | body bytes   |
//! |-------------|----------------------|--------------|
//! | 0           | NULL                 | 0            |
//! | 1           | int8                 | 1            |
//! | 2, 3, 4     | int16, int24, int32  | 2, 3, 4      |
//! | 5           | int48                | 6            |
//! | 6           | int64                | 8            |
//! | 7           | IEEE 754 float64     | 8            |
//! | 8, 9        | literal 0, literal 1 | 0            |
//! | 10, 11      | reserved             | -            |
//! | N even >=12 | BLOB                 | (N - 12) / 2 |
//! | N odd  >=13 | text                 | (N - 13) / 2 |
//!
//! ## Rowid Aliasing
//!
//! A table column declared `id INTEGER` is the rowid. Its record body is
//! empty (serial type 0) and the value lives in the cell's rowid varint
//! instead. Getters take 1-based ordinals matching declaration order;
//! ordinal 0 names the implicit rowid, and a serial-type-0 column read as
//! an integer materialises from the rowid as well.
//!
//! ## Column Access
//!
//! Access is a sequential walk of the serial types, accumulating body
//! offsets until the requested ordinal is reached. Rows here are a
//! handful of columns wide, so the walk is not worth indexing.

use eyre::{bail, ensure, Result};

use crate::encoding::int;
use crate::encoding::{read_varint, varint_len, varint_len_plus, write_varint};

/// One column value when building a record for insertion.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    /// The designated rowid column: serial type 0, empty body. The value
    /// rides in the cell's rowid varint, not in the record.
    RowidAlias,
}

impl Value {
    fn serial_type(&self) -> u64 {
        match self {
            Value::Null | Value::RowidAlias => 0,
            Value::Integer(_) => 6,
            Value::Real(_) => 7,
            Value::Text(text) => 2 * text.len() as u64 + 13,
            Value::Blob(blob) => 2 * blob.len() as u64 + 12,
        }
    }
}

/// Body length in bytes for a serial type.
pub fn content_size(serial_type: u64) -> u64 {
    match serial_type {
        0..=4 => serial_type,
        5 => 6,
        6 | 7 => 8,
        8 | 9 => 0,
        // reserved codes never appear in a well-formed file
        10 | 11 => 0,
        n if n % 2 == 0 => (n - 12) / 2,
        n => (n - 13) / 2,
    }
}

/// A decoded or to-be-inserted row: the record bytes plus the rowid that
/// keys the cell. `bytes.len()` is the payload size `P`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    rowid: u64,
    bytes: Vec<u8>,
}

impl Payload {
    pub fn new(rowid: u64, bytes: Vec<u8>) -> Self {
        Self { rowid, bytes }
    }

    /// Serialises typed values into the record format. Values are written
    /// in the order given, which must match column declaration order.
    pub fn encode(rowid: u64, values: &[Value]) -> Self {
        let serial_types_len: usize = values
            .iter()
            .map(|value| varint_len(value.serial_type()))
            .sum();
        let bytes_in_header = serial_types_len + varint_len_plus(serial_types_len as u64);

        let body_len: usize = values
            .iter()
            .map(|value| content_size(value.serial_type()) as usize)
            .sum();

        let mut bytes = vec![0u8; bytes_in_header + body_len];
        let mut offset = write_varint(bytes_in_header as u64, &mut bytes);
        for value in values {
            offset += write_varint(value.serial_type(), &mut bytes[offset..]);
        }
        debug_assert_eq!(offset, bytes_in_header);

        for value in values {
            match value {
                Value::Null | Value::RowidAlias => {}
                Value::Integer(n) => offset += int::write_i64(*n, &mut bytes[offset..]),
                Value::Real(x) => offset += int::write_f64(*x, &mut bytes[offset..]),
                Value::Text(text) => {
                    bytes[offset..offset + text.len()].copy_from_slice(text.as_bytes());
                    offset += text.len();
                }
                Value::Blob(blob) => {
                    bytes[offset..offset + blob.len()].copy_from_slice(blob);
                    offset += blob.len();
                }
            }
        }

        Self { rowid, bytes }
    }

    /// Payload size `P`: record header plus bodies.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn rowid(&self) -> u64 {
        self.rowid
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn column_count(&self) -> Result<usize> {
        let (bytes_in_header, mut offset) = read_varint(&self.bytes)?;
        let bytes_in_header = bytes_in_header as usize;
        ensure!(
            bytes_in_header <= self.bytes.len(),
            "record header claims {} bytes but payload has {}",
            bytes_in_header,
            self.bytes.len()
        );
        let mut columns = 0;
        while offset < bytes_in_header {
            let (_, read) = read_varint(&self.bytes[offset..bytes_in_header])?;
            offset += read;
            columns += 1;
        }
        Ok(columns)
    }

    /// Serial type and body range of the column at a 1-based ordinal.
    fn locate(&self, ordinal: usize) -> Result<(u64, usize, usize)> {
        ensure!(ordinal >= 1, "column ordinal {} out of range", ordinal);
        let (bytes_in_header, mut offset) = read_varint(&self.bytes)?;
        let bytes_in_header = bytes_in_header as usize;
        ensure!(
            bytes_in_header <= self.bytes.len(),
            "record header claims {} bytes but payload has {}",
            bytes_in_header,
            self.bytes.len()
        );

        let mut content_offset = bytes_in_header;
        let mut column = 0;
        while offset < bytes_in_header {
            let (serial_type, read) = read_varint(&self.bytes[offset..bytes_in_header])?;
            offset += read;
            column += 1;
            let size = content_size(serial_type) as usize;
            if column == ordinal {
                ensure!(
                    content_offset + size <= self.bytes.len(),
                    "column {} body overruns payload",
                    ordinal
                );
                return Ok((serial_type, content_offset, size));
            }
            content_offset += size;
        }
        bail!("column ordinal {} out of range ({} columns)", ordinal, column)
    }

    /// Reads an INTEGER column. Ordinal 0 and serial-type-0 columns yield
    /// the rowid; serial types 8 and 9 decode to the literals 0 and 1.
    pub fn integer_column(&self, ordinal: usize) -> Result<i64> {
        if ordinal == 0 {
            return Ok(self.rowid as i64);
        }
        let (serial_type, offset, size) = self.locate(ordinal)?;
        let body = &self.bytes[offset..offset + size];
        match serial_type {
            0 => Ok(self.rowid as i64),
            1 => Ok(i64::from(int::read_i8(body))),
            2 => Ok(i64::from(int::read_i16(body))),
            3 => Ok(i64::from(int::read_i24(body))),
            4 => Ok(i64::from(int::read_i32(body))),
            5 => Ok(int::read_i48(body)),
            6 => Ok(int::read_i64(body)),
            7 => bail!("column {} is REAL, not an integer", ordinal),
            8 => Ok(0),
            9 => Ok(1),
            10 | 11 => bail!("unsupported content size for reserved serial type {}", serial_type),
            n if n % 2 == 0 => bail!("column {} is a BLOB, not an integer", ordinal),
            _ => bail!("column {} is text, not an integer", ordinal),
        }
    }

    pub fn text_column(&self, ordinal: usize) -> Result<&str> {
        let (serial_type, offset, size) = self.locate(ordinal)?;
        ensure!(
            serial_type >= 13 && serial_type % 2 == 1,
            "column {} has serial type {}, not text",
            ordinal,
            serial_type
        );
        std::str::from_utf8(&self.bytes[offset..offset + size])
            .map_err(|e| eyre::eyre!("column {} is not valid UTF-8: {}", ordinal, e))
    }

    pub fn real_column(&self, ordinal: usize) -> Result<f64> {
        let (serial_type, offset, size) = self.locate(ordinal)?;
        match serial_type {
            7 => Ok(int::read_f64(&self.bytes[offset..offset + size])),
            0..=6 | 8 | 9 => Ok(self.integer_column(ordinal)? as f64),
            _ => bail!("column {} has serial type {}, not numeric", ordinal, serial_type),
        }
    }

    pub fn blob_column(&self, ordinal: usize) -> Result<&[u8]> {
        let (serial_type, offset, size) = self.locate(ordinal)?;
        ensure!(
            serial_type >= 12 && serial_type % 2 == 0,
            "column {} has serial type {}, not a BLOB",
            ordinal,
            serial_type
        );
        Ok(&self.bytes[offset..offset + size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_sizes_match_serial_type_table() {
        assert_eq!(content_size(0), 0);
        assert_eq!(content_size(1), 1);
        assert_eq!(content_size(2), 2);
        assert_eq!(content_size(3), 3);
        assert_eq!(content_size(4), 4);
        assert_eq!(content_size(5), 6);
        assert_eq!(content_size(6), 8);
        assert_eq!(content_size(7), 8);
        assert_eq!(content_size(8), 0);
        assert_eq!(content_size(9), 0);
        assert_eq!(content_size(12), 0);
        assert_eq!(content_size(13), 0);
        assert_eq!(content_size(20), 4);
        assert_eq!(content_size(21), 4);
    }

    #[test]
    fn encode_then_read_typed_columns() {
        let payload = Payload::encode(
            7,
            &[
                Value::RowidAlias,
                Value::Text("alice".into()),
                Value::Integer(-42),
            ],
        );

        assert_eq!(payload.column_count().unwrap(), 3);
        assert_eq!(payload.integer_column(1).unwrap(), 7);
        assert_eq!(payload.text_column(2).unwrap(), "alice");
        assert_eq!(payload.integer_column(3).unwrap(), -42);
        assert_eq!(payload.integer_column(0).unwrap(), 7);
    }

    #[test]
    fn header_length_counts_itself() {
        let payload = Payload::encode(1, &[Value::Text("x".repeat(40))]);
        let (bytes_in_header, read) = read_varint(payload.bytes()).unwrap();
        let serial_len = varint_len(2 * 40 + 13);
        assert_eq!(bytes_in_header as usize, read + serial_len);
    }

    #[test]
    fn header_plus_bodies_equals_payload_size() {
        let payload = Payload::encode(
            3,
            &[
                Value::RowidAlias,
                Value::Integer(500),
                Value::Text("hello".into()),
                Value::Null,
                Value::Blob(vec![1, 2, 3]),
            ],
        );
        let (bytes_in_header, mut offset) = read_varint(payload.bytes()).unwrap();
        let mut bodies = 0;
        while offset < bytes_in_header as usize {
            let (serial_type, read) = read_varint(&payload.bytes()[offset..]).unwrap();
            offset += read;
            bodies += content_size(serial_type);
        }
        assert_eq!(bytes_in_header + bodies, payload.size());
    }

    #[test]
    fn integer_widths_decode_with_sign_extension() {
        // hand-built record: header length 4, serial types int8, int24, int16
        let mut bytes = vec![4u8, 1, 3, 2];
        bytes.push(0xff); // int8 -1
        bytes.extend_from_slice(&[0xff, 0xfe, 0x00]); // int24 -0x200
        bytes.extend_from_slice(&[0x01, 0x00]); // int16 256
        let payload = Payload::new(9, bytes);
        assert_eq!(payload.integer_column(1).unwrap(), -1);
        assert_eq!(payload.integer_column(2).unwrap(), -0x200);
        assert_eq!(payload.integer_column(3).unwrap(), 256);
    }

    #[test]
    fn literal_serial_types_decode_without_bodies() {
        let bytes = vec![3u8, 8, 9];
        let payload = Payload::new(1, bytes);
        assert_eq!(payload.integer_column(1).unwrap(), 0);
        assert_eq!(payload.integer_column(2).unwrap(), 1);
    }

    #[test]
    fn type_mismatch_reported_both_directions() {
        let payload = Payload::encode(1, &[Value::Text("t".into()), Value::Integer(5)]);
        assert!(payload.integer_column(1).is_err());
        assert!(payload.text_column(2).is_err());
    }

    #[test]
    fn ordinal_out_of_range_reported() {
        let payload = Payload::encode(1, &[Value::Integer(5)]);
        assert!(payload.integer_column(2).is_err());
        assert!(payload.text_column(99).is_err());
    }

    #[test]
    fn overlong_header_rejected() {
        // header claims 100 bytes, payload has 3
        let payload = Payload::new(1, vec![100u8, 6, 6]);
        assert!(payload.integer_column(1).is_err());
    }

    #[test]
    fn real_column_reads_float_and_widens_integers() {
        let payload = Payload::encode(1, &[Value::Real(2.5), Value::Integer(4)]);
        assert_eq!(payload.real_column(1).unwrap(), 2.5);
        assert_eq!(payload.real_column(2).unwrap(), 4.0);
        assert!(payload.integer_column(1).is_err());
    }
}
