//! # Database File Header
//!
//! The first 100 bytes of the file, shared with page 1. All multi-byte
//! fields are big-endian, which is why the struct below is built from
//! `zerocopy` big-endian field types rather than native integers: the
//! bytes on disk are the struct, no per-field swabbing.
//!
//! ## Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  ---------------------------------------------
//! 0       16    magic "SQLite format 3\0"
//! 16      2     page_size (1 means 65536)
//! 18      1     file format write version
//! 19      1     file format read version
//! 20      1     unused reserved space per page
//! 21      1     max embedded payload fraction (64)
//! 22      1     min embedded payload fraction (32)
//! 23      1     leaf payload fraction (32)
//! 24      4     file change counter
//! 28      4     database size in pages
//! 32      4     first freelist trunk page
//! 36      4     total freelist pages
//! 40      4     schema cookie
//! 44      4     schema format number
//! 48      4     default page cache size
//! 52      4     largest root b-tree page
//! 56      4     database text encoding (1 = UTF-8)
//! 60      4     user version
//! 64      4     incremental vacuum mode
//! 68      4     application id
//! 72      20    reserved expansion
//! 92      4     version-valid-for number
//! 96      4     sqlite version number
//! ```
//!
//! ## The In-Header Size
//!
//! `database_size_in_pages` at offset 28 is authoritative only when it is
//! non-zero and `file_change_counter == version_valid_for_number`;
//! otherwise the reader must fall back to `file_length / page_size`. The
//! pager rewrites offset 28 on every page write so files it produces
//! always carry a trustworthy size.

use eyre::{ensure, eyre, Result};
use zerocopy::byteorder::big_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::config::{is_valid_page_size, FILE_HEADER_SIZE, FILE_MAGIC, MAX_PAGE_SIZE};

/// Emitted into fresh files; readers do not interpret it.
const SQLITE_VERSION_NUMBER: u32 = 3_045_000;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct FileHeader {
    magic: [u8; 16],
    page_size: U16,
    file_format_write_version: u8,
    file_format_read_version: u8,
    reserved_space: u8,
    max_embedded_payload_fraction: u8,
    min_embedded_payload_fraction: u8,
    leaf_payload_fraction: u8,
    file_change_counter: U32,
    database_size_in_pages: U32,
    first_freelist_trunk_page: U32,
    total_freelist_pages: U32,
    schema_cookie: U32,
    schema_format_number: U32,
    default_page_cache_size: U32,
    largest_root_btree_page: U32,
    text_encoding: U32,
    user_version: U32,
    incremental_vacuum_mode: U32,
    application_id: U32,
    reserved_expansion: [u8; 20],
    version_valid_for_number: U32,
    sqlite_version_number: U32,
}

const _: () = assert!(std::mem::size_of::<FileHeader>() == FILE_HEADER_SIZE);

impl FileHeader {
    /// Header for a fresh single-page database. The change counter and
    /// version-valid-for fields are written equal so the in-header size
    /// starts out authoritative.
    pub fn new(page_size: u32) -> Self {
        debug_assert!(is_valid_page_size(page_size));
        Self {
            magic: *FILE_MAGIC,
            // 65536 wraps to the encoded value 1
            page_size: U16::new((page_size & 0xffff) as u16),
            file_format_write_version: 1,
            file_format_read_version: 1,
            reserved_space: 0,
            max_embedded_payload_fraction: 64,
            min_embedded_payload_fraction: 32,
            leaf_payload_fraction: 32,
            file_change_counter: U32::new(1),
            database_size_in_pages: U32::new(1),
            first_freelist_trunk_page: U32::new(0),
            total_freelist_pages: U32::new(0),
            schema_cookie: U32::new(1),
            schema_format_number: U32::new(1),
            default_page_cache_size: U32::new(0),
            largest_root_btree_page: U32::new(0),
            text_encoding: U32::new(1),
            user_version: U32::new(0),
            incremental_vacuum_mode: U32::new(0),
            application_id: U32::new(0),
            reserved_expansion: [0; 20],
            version_valid_for_number: U32::new(1),
            sqlite_version_number: U32::new(SQLITE_VERSION_NUMBER),
        }
    }

    /// Parses and validates the first 100 bytes of a file.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= FILE_HEADER_SIZE,
            "file too short for a database header: {} bytes",
            bytes.len()
        );
        let header = FileHeader::read_from_bytes(&bytes[..FILE_HEADER_SIZE])
            .map_err(|e| eyre!("failed to read file header: {:?}", e))?;
        ensure!(&header.magic == FILE_MAGIC, "bad magic string in file header");
        let page_size = header.page_size();
        ensure!(
            is_valid_page_size(page_size),
            "invalid page size in file header: {}",
            page_size
        );
        Ok(header)
    }

    /// Decoded page size; the stored value 1 means 65536.
    pub fn page_size(&self) -> u32 {
        match self.page_size.get() {
            1 => MAX_PAGE_SIZE,
            n => u32::from(n),
        }
    }

    pub fn usable_size(&self) -> u32 {
        self.page_size() - u32::from(self.reserved_space)
    }

    pub fn reserved_space(&self) -> u8 {
        self.reserved_space
    }

    pub fn database_size_in_pages(&self) -> u32 {
        self.database_size_in_pages.get()
    }

    pub fn set_database_size_in_pages(&mut self, pages: u32) {
        self.database_size_in_pages = U32::new(pages);
    }

    /// The offset-28 counter can be trusted only when the change counter
    /// matches the version-valid-for field.
    pub fn size_is_authoritative(&self) -> bool {
        self.database_size_in_pages.get() > 0
            && self.file_change_counter.get() == self.version_valid_for_number.get()
    }
}
