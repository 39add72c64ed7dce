//! # Pager
//!
//! The only component that performs file I/O. Page N lives at file offset
//! `(N - 1) * page_size`; reads and writes are positioned, blocking, and
//! unbuffered. There is no cache and no dirty list, so a write
//! is durable (to the OS) the moment it returns.
//!
//! ## Growth Discipline
//!
//! The file grows strictly by appending whole pages at EOF. Allocation
//! and write are one operation ([`Pager::append_page`]): the next page
//! number comes from the current file length, the in-header size counter
//! is bumped, and the page is written before the call returns. Callers
//! therefore can never allocate two pages onto the same number, and a
//! crash mid-mutation leaves at worst orphan pages past the last pointer
//! written, never a pointer to a page that does not exist.
//!
//! ## The Offset-28 Counter
//!
//! Every page write re-patches the 4-byte database-size-in-pages field at
//! file offset 28 from the in-memory header, keeping the on-disk counter
//! in lockstep with successful appends.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use tracing::debug;

use crate::config::{
    is_valid_page_size, DB_SIZE_OFFSET, FILE_HEADER_SIZE, OVERFLOW_NEXT_SIZE,
};
use crate::encoding::int;
use crate::storage::header::FileHeader;
use crate::storage::page::Page;

pub struct Pager {
    file: File,
    header: FileHeader,
    page_size: u32,
    usable_size: u32,
}

impl Pager {
    /// Opens an existing database file and validates its header. When the
    /// in-header size is not authoritative, the page count falls back to
    /// the file length.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open database file {:?}", path))?;

        let mut head = [0u8; FILE_HEADER_SIZE];
        file.read_exact(&mut head)
            .wrap_err_with(|| format!("failed to read file header of {:?}", path))?;
        let mut header = FileHeader::parse(&head)?;

        let page_size = header.page_size();
        let usable_size = header.usable_size();

        if !header.size_is_authoritative() {
            let file_len = file
                .metadata()
                .wrap_err("failed to stat database file")?
                .len();
            let pages = (file_len / u64::from(page_size)) as u32;
            debug!(pages, "in-header size not authoritative, using file length");
            header.set_database_size_in_pages(pages);
        }

        Ok(Self {
            file,
            header,
            page_size,
            usable_size,
        })
    }

    /// Creates a fresh single-page database: the 100-byte header followed
    /// by an empty schema-table leaf rooted on page 1.
    pub fn create<P: AsRef<Path>>(path: P, page_size: u32) -> Result<Self> {
        ensure!(
            is_valid_page_size(page_size),
            "invalid page size {}: must be a power of two in 512..=65536",
            page_size
        );
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create database file {:?}", path))?;

        let header = FileHeader::new(page_size);
        let page_one = Page::fresh_schema_root(page_size, header.usable_size());
        let mut buf = page_one.into_buf();
        buf[..FILE_HEADER_SIZE].copy_from_slice(zerocopy::IntoBytes::as_bytes(&header));

        let usable_size = header.usable_size();
        let mut pager = Self {
            file,
            header,
            page_size,
            usable_size,
        };
        pager.write_page(1, &buf)?;
        debug!(page_size, "created database file");
        Ok(pager)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn usable_size(&self) -> u32 {
        self.usable_size
    }

    pub fn database_size_in_pages(&self) -> u32 {
        self.header.database_size_in_pages()
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn read_page(&mut self, page_no: u32) -> Result<Vec<u8>> {
        ensure!(page_no >= 1, "page numbers start at 1");
        let mut buf = vec![0u8; self.page_size as usize];
        self.file
            .seek(SeekFrom::Start(
                u64::from(page_no - 1) * u64::from(self.page_size),
            ))
            .wrap_err("seek failed")?;
        self.file
            .read_exact(&mut buf)
            .wrap_err_with(|| format!("failed to read page {}", page_no))?;
        Ok(buf)
    }

    /// Reads and parses page N into a typed page buffer.
    pub fn load_page(&mut self, page_no: u32) -> Result<Page> {
        let buf = self.read_page(page_no)?;
        Page::from_bytes(buf, page_no, self.usable_size)
    }

    /// Writes a full page image and re-patches the in-header size counter
    /// at offset 28.
    pub fn write_page(&mut self, page_no: u32, buf: &[u8]) -> Result<()> {
        ensure!(page_no >= 1, "page numbers start at 1");
        ensure!(
            buf.len() == self.page_size as usize,
            "page image is {} bytes, page size is {}",
            buf.len(),
            self.page_size
        );
        self.file
            .seek(SeekFrom::Start(
                u64::from(page_no - 1) * u64::from(self.page_size),
            ))
            .wrap_err("seek failed")?;
        self.file
            .write_all(buf)
            .wrap_err_with(|| format!("failed to write page {}", page_no))?;

        self.file
            .seek(SeekFrom::Start(DB_SIZE_OFFSET))
            .wrap_err("seek failed")?;
        self.file
            .write_all(&self.header.database_size_in_pages().to_be_bytes())
            .wrap_err("failed to update database size counter")?;
        Ok(())
    }

    /// Page count from the file length, ignoring the in-header counter.
    pub fn page_count_on_disk(&mut self) -> Result<u32> {
        let file_len = self
            .file
            .metadata()
            .wrap_err("failed to stat database file")?
            .len();
        Ok((file_len / u64::from(self.page_size)) as u32)
    }

    /// Allocates the next page number at EOF, bumps the in-header size,
    /// and writes the page, one indivisible step from the caller's view,
    /// so consecutive appends can never collide on a page number.
    pub fn append_page(&mut self, buf: &[u8]) -> Result<u32> {
        let page_no = self.page_count_on_disk()? + 1;
        self.header
            .set_database_size_in_pages(self.header.database_size_in_pages() + 1);
        self.write_page(page_no, buf)?;
        debug!(page_no, "appended page");
        Ok(page_no)
    }

    /// Writes `data` to a fresh chain of overflow pages at EOF and
    /// returns the first page number. Each page starts with the big-endian
    /// number of the next page in the chain, 0 on the last.
    pub fn write_overflow_chain(&mut self, data: &[u8]) -> Result<u32> {
        debug_assert!(!data.is_empty());
        let chunk = (self.usable_size - OVERFLOW_NEXT_SIZE) as usize;
        let pages = data.len().div_ceil(chunk);
        let first = self.page_count_on_disk()? + 1;

        for (i, piece) in data.chunks(chunk).enumerate() {
            let mut buf = vec![0u8; self.page_size as usize];
            let next = if i + 1 == pages {
                0
            } else {
                first + i as u32 + 1
            };
            int::write_u32(next, &mut buf);
            buf[OVERFLOW_NEXT_SIZE as usize..OVERFLOW_NEXT_SIZE as usize + piece.len()]
                .copy_from_slice(piece);
            let page_no = self.append_page(&buf)?;
            debug_assert_eq!(page_no, first + i as u32);
        }

        debug!(first, pages, bytes = data.len(), "wrote overflow chain");
        Ok(first)
    }

    /// Follows an overflow chain and returns exactly `total` payload
    /// bytes. A chain that ends early or runs long is a format error.
    pub fn read_overflow_chain(&mut self, first: u32, total: u64) -> Result<Vec<u8>> {
        let chunk = u64::from(self.usable_size - OVERFLOW_NEXT_SIZE);
        let mut out = Vec::with_capacity(total as usize);
        let mut next = first;
        let mut remaining = total;

        while next != 0 {
            ensure!(
                remaining > 0,
                "overflow chain continues past the payload end"
            );
            let page = self.read_page(next)?;
            next = int::read_u32(&page);
            let take = remaining.min(chunk) as usize;
            out.extend_from_slice(
                &page[OVERFLOW_NEXT_SIZE as usize..OVERFLOW_NEXT_SIZE as usize + take],
            );
            remaining -= take as u64;
        }

        ensure!(
            remaining == 0,
            "overflow chain ended {} bytes short",
            remaining
        );
        Ok(out)
    }
}
