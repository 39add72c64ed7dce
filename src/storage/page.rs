//! # B-Tree Page Buffer
//!
//! One fixed-size page with its typed header and slotted cell directory.
//! This module owns every byte-layout rule inside a page; the b-tree
//! engine above it only ever speaks in slots, rowids, and payloads.
//!
//! ## Page Body Layout
//!
//! ```text
//! +-----------------------------+  offset 0 (100 on page 1)
//! | page header (8 or 12 bytes) |
//! +-----------------------------+
//! | cell pointer array          |  2 bytes per cell, in rowid order
//! +-----------------------------+
//! | unallocated gap             |
//! +-----------------------------+  <- cell_content_start
//! | cell content area           |  grows downward toward the pointers
//! +-----------------------------+  offset U (usable size)
//! ```
//!
//! ## Page Header
//!
//! ```text
//! Offset  Size  Field
//! 0       1     page type (0x02/0x05/0x0a/0x0d)
//! 1       2     first free block
//! 3       2     cell count
//! 5       2     start of cell content area (0 means 65536)
//! 7       1     fragmented free bytes
//! 8       4     right-most child pointer (interior pages only)
//! ```
//!
//! ## Cell Layouts (table b-tree)
//!
//! ```text
//! leaf:     varint P | varint rowid | payload prefix (K bytes) | u32 first overflow page (iff K < P)
//! interior: u32 left child | varint rowid
//! ```
//!
//! ## Payload Spill
//!
//! With `U` the usable size, `M = ((U-12)*32/255) - 23` the minimum
//! in-page payload and `X = U - 35` the maximum for a table leaf, the
//! directly stored prefix of a P-byte payload is:
//!
//! ```text
//! K = P                            if P <= X
//!   = M + ((P - M) mod (U - 4))    if that is <= X
//!   = M                            otherwise
//! ```
//!
//! The remainder lives on a chain of overflow pages holding `U - 4`
//! payload bytes each after their leading next-page pointer.
//!
//! ## Split Planning
//!
//! [`Page::split_plan`] sizes the virtual cell sequence "old cells with
//! the new cell already at its slot" and picks the split index whose
//! running sum is closest to half the total, ties to the earliest index.
//! The plan's offset/size arrays let the b-tree engine rebuild each half
//! by raw cell copy without re-encoding surviving cells.

use eyre::{bail, ensure, Result};
use tracing::debug;

use crate::config::{
    CELL_POINTER_SIZE, FILE_HEADER_SIZE, INTERIOR_HEADER_SIZE, LEAF_HEADER_SIZE, MAX_PAGE_SIZE,
};
use crate::encoding::int;
use crate::encoding::{read_varint, varint_len, write_varint};
use crate::record::Payload;
use crate::storage::pager::Pager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    InteriorIndex,
    InteriorTable,
    LeafIndex,
    LeafTable,
}

impl PageType {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x02 => Ok(PageType::InteriorIndex),
            0x05 => Ok(PageType::InteriorTable),
            0x0a => Ok(PageType::LeafIndex),
            0x0d => Ok(PageType::LeafTable),
            other => bail!("invalid b-tree page type byte 0x{:02x}", other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            PageType::InteriorIndex => 0x02,
            PageType::InteriorTable => 0x05,
            PageType::LeafIndex => 0x0a,
            PageType::LeafTable => 0x0d,
        }
    }

    pub fn is_interior(self) -> bool {
        matches!(self, PageType::InteriorIndex | PageType::InteriorTable)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub page_type: PageType,
    pub first_free_block: u16,
    pub cell_count: u16,
    pub cell_content_start: u32,
    pub fragmented_free_bytes: u8,
    /// Valid on interior pages only; leaves carry 0.
    pub right_most_child: u32,
}

/// Result of a local cell insertion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageInsert {
    Inserted,
    NoSpace,
}

/// Split point and per-cell geometry for the virtual sequence of a full
/// page plus one incoming cell.
#[derive(Debug)]
pub struct SplitPlan {
    pub split_index: usize,
    pub cell_sizes: Vec<u32>,
    /// In-page offset of each pre-existing cell; `u32::MAX` marks the
    /// incoming cell, which is re-encoded rather than copied.
    pub cell_offsets: Vec<u32>,
    pub sums: Vec<u32>,
}

pub struct Page {
    buf: Vec<u8>,
    pub header: PageHeader,
    is_first: bool,
    usable_size: u32,
}

impl Page {
    /// Parses a page image read from disk. `page_no` 1 shifts the header
    /// past the 100-byte file header.
    pub fn from_bytes(buf: Vec<u8>, page_no: u32, usable_size: u32) -> Result<Self> {
        let is_first = page_no == 1;
        let base = if is_first { FILE_HEADER_SIZE } else { 0 };
        ensure!(
            buf.len() > base + LEAF_HEADER_SIZE as usize,
            "page {} too small: {} bytes",
            page_no,
            buf.len()
        );

        let page_type = PageType::from_byte(buf[base])?;
        let first_free_block = int::read_u16(&buf[base + 1..]);
        let cell_count = int::read_u16(&buf[base + 3..]);
        let raw_start = int::read_u16(&buf[base + 5..]);
        let cell_content_start = if raw_start == 0 {
            MAX_PAGE_SIZE
        } else {
            u32::from(raw_start)
        };
        let fragmented_free_bytes = buf[base + 7];
        let right_most_child = if page_type.is_interior() {
            int::read_u32(&buf[base + 8..])
        } else {
            0
        };

        ensure!(
            cell_content_start <= usable_size,
            "page {}: cell content starts at {} beyond usable size {}",
            page_no,
            cell_content_start,
            usable_size
        );

        let page = Self {
            buf,
            header: PageHeader {
                page_type,
                first_free_block,
                cell_count,
                cell_content_start,
                fragmented_free_bytes,
                right_most_child,
            },
            is_first,
            usable_size,
        };
        ensure!(
            cell_content_start as usize
                >= page.header_size() + CELL_POINTER_SIZE as usize * usize::from(cell_count),
            "page {}: cell directory overlaps the content area",
            page_no
        );
        Ok(page)
    }

    /// A zeroed page of the given type with an empty cell directory,
    /// header already serialised.
    pub fn fresh(page_type: PageType, page_size: u32, usable_size: u32) -> Self {
        let mut page = Self {
            buf: vec![0u8; page_size as usize],
            header: PageHeader {
                page_type,
                first_free_block: 0,
                cell_count: 0,
                cell_content_start: usable_size,
                fragmented_free_bytes: 0,
                right_most_child: 0,
            },
            is_first: false,
            usable_size,
        };
        page.write_header();
        page
    }

    /// A fresh page 1: an empty schema-table leaf whose b-tree header
    /// starts after the 100-byte file header slot. The caller lays the
    /// file header over the first 100 bytes.
    pub fn fresh_schema_root(page_size: u32, usable_size: u32) -> Self {
        let mut page = Self::fresh(PageType::LeafTable, page_size, usable_size);
        page.is_first = true;
        page.write_header();
        page
    }

    /// Re-types the page in place with an empty cell directory, keeping
    /// the buffer and the page-1 header offset. Used to repurpose a root
    /// during promotion; stale cell bytes are simply unreferenced.
    pub fn reinit(&mut self, page_type: PageType) {
        self.header = PageHeader {
            page_type,
            first_free_block: 0,
            cell_count: 0,
            cell_content_start: self.usable_size,
            fragmented_free_bytes: 0,
            right_most_child: 0,
        };
    }

    pub fn buf(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_buf(self) -> Vec<u8> {
        self.buf
    }

    pub fn cell_count(&self) -> usize {
        usize::from(self.header.cell_count)
    }

    pub fn usable_size(&self) -> u32 {
        self.usable_size
    }

    pub fn header_size(&self) -> usize {
        let base = if self.header.page_type.is_interior() {
            INTERIOR_HEADER_SIZE
        } else {
            LEAF_HEADER_SIZE
        };
        base as usize + if self.is_first { FILE_HEADER_SIZE } else { 0 }
    }

    pub fn free_space(&self) -> u32 {
        self.header.cell_content_start
            - (self.header_size() as u32 + CELL_POINTER_SIZE * u32::from(self.header.cell_count))
    }

    /// Serialises the header back into the buffer.
    pub fn write_header(&mut self) {
        let base = if self.is_first { FILE_HEADER_SIZE } else { 0 };
        self.buf[base] = self.header.page_type.as_byte();
        int::write_u16(self.header.first_free_block, &mut self.buf[base + 1..]);
        int::write_u16(self.header.cell_count, &mut self.buf[base + 3..]);
        // 65536 wraps to the stored value 0
        int::write_u16(
            (self.header.cell_content_start & 0xffff) as u16,
            &mut self.buf[base + 5..],
        );
        self.buf[base + 7] = self.header.fragmented_free_bytes;
        if self.header.page_type.is_interior() {
            int::write_u32(self.header.right_most_child, &mut self.buf[base + 8..]);
        }
    }

    // --- cell pointer array ---

    pub fn cell_offset(&self, idx: usize) -> usize {
        let at = self.header_size() + CELL_POINTER_SIZE as usize * idx;
        usize::from(int::read_u16(&self.buf[at..]))
    }

    fn set_cell_offset(&mut self, idx: usize, offset: usize) {
        let at = self.header_size() + CELL_POINTER_SIZE as usize * idx;
        int::write_u16(offset as u16, &mut self.buf[at..]);
    }

    /// Opens slot `idx` by shifting later pointers right. The cell count
    /// must already include the incoming cell.
    fn shift_cell_offsets(&mut self, idx: usize) {
        for i in (idx + 1..self.cell_count()).rev() {
            let offset = self.cell_offset(i - 1);
            self.set_cell_offset(i, offset);
        }
    }

    // --- cell field accessors ---

    pub fn cell_rowid(&self, offset: usize) -> Result<u64> {
        match self.header.page_type {
            PageType::InteriorTable => {
                let (rowid, _) = read_varint(&self.buf[offset + 4..])?;
                Ok(rowid)
            }
            PageType::LeafTable => {
                let (_, n) = read_varint(&self.buf[offset..])?;
                let (rowid, _) = read_varint(&self.buf[offset + n..])?;
                Ok(rowid)
            }
            other => bail!("cell rowid undefined for {:?} pages", other),
        }
    }

    pub fn cell_left_child(&self, offset: usize) -> Result<u32> {
        ensure!(
            self.header.page_type == PageType::InteriorTable,
            "left child pointer undefined for {:?} pages",
            self.header.page_type
        );
        Ok(int::read_u32(&self.buf[offset..]))
    }

    pub fn cell_payload_size(&self, offset: usize) -> Result<u64> {
        ensure!(
            self.header.page_type == PageType::LeafTable,
            "payload size undefined for {:?} pages",
            self.header.page_type
        );
        let (payload_size, _) = read_varint(&self.buf[offset..])?;
        Ok(payload_size)
    }

    pub fn cell_first_overflow(&self, offset: usize) -> Result<u32> {
        ensure!(
            self.header.page_type == PageType::LeafTable,
            "overflow pointer undefined for {:?} pages",
            self.header.page_type
        );
        let (payload_size, n1) = read_varint(&self.buf[offset..])?;
        let (_, n2) = read_varint(&self.buf[offset + n1..])?;
        let in_page = self.directly_stored(payload_size) as u64;
        if in_page == payload_size {
            return Ok(0);
        }
        Ok(int::read_u32(
            &self.buf[offset + n1 + n2 + in_page as usize..],
        ))
    }

    /// Smallest index whose cell rowid is `>= rowid`, or the cell count.
    pub fn lower_bound(&self, rowid: u64) -> Result<usize> {
        let mut left = 0usize;
        let mut right = self.cell_count();
        while left < right {
            let mid = (left + right) / 2;
            let mid_rowid = self.cell_rowid(self.cell_offset(mid))?;
            if mid_rowid < rowid {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        Ok(left)
    }

    // --- payload spill rule ---

    pub fn min_payload(&self) -> u32 {
        (self.usable_size - 12) * 32 / 255 - 23
    }

    pub fn max_payload(&self) -> u32 {
        self.usable_size - 35
    }

    /// K: how many payload bytes stay on this page for a P-byte payload.
    pub fn directly_stored(&self, payload_size: u64) -> u32 {
        let x = u64::from(self.max_payload());
        if payload_size <= x {
            return payload_size as u32;
        }
        let m = u64::from(self.min_payload());
        let k = m + (payload_size - m) % u64::from(self.usable_size - 4);
        if k <= x {
            k as u32
        } else {
            m as u32
        }
    }

    pub fn cell_size(&self, rowid: u64, payload_size: u64) -> Result<u32> {
        match self.header.page_type {
            PageType::InteriorTable => Ok(4 + varint_len(rowid) as u32),
            PageType::LeafTable => {
                let in_page = self.directly_stored(payload_size);
                let spill = if u64::from(in_page) < payload_size { 4 } else { 0 };
                Ok(varint_len(payload_size) as u32
                    + varint_len(rowid) as u32
                    + in_page
                    + spill)
            }
            other => bail!("cell size undefined for {:?} pages", other),
        }
    }

    // --- cell insertion ---

    /// Inserts a leaf cell at `slot`, spilling the payload tail to fresh
    /// overflow pages when it exceeds the in-page maximum. Returns
    /// `NoSpace` without mutating anything if the cell cannot fit.
    pub fn insert_leaf_cell(
        &mut self,
        rowid: u64,
        slot: usize,
        payload: &Payload,
        pager: &mut Pager,
    ) -> Result<PageInsert> {
        ensure!(
            self.header.page_type == PageType::LeafTable,
            "leaf cell insert on {:?} page",
            self.header.page_type
        );
        let payload_size = payload.size();
        let in_page = self.directly_stored(payload_size) as usize;
        let cell_size = self.cell_size(rowid, payload_size)?;

        if cell_size > self.free_space() {
            return Ok(PageInsert::NoSpace);
        }

        self.header.cell_content_start -= cell_size;
        self.header.cell_count += 1;
        let mut offset = self.header.cell_content_start as usize;
        self.shift_cell_offsets(slot);
        self.set_cell_offset(slot, offset);
        self.write_header();

        offset += write_varint(payload_size, &mut self.buf[offset..]);
        offset += write_varint(rowid, &mut self.buf[offset..]);
        self.buf[offset..offset + in_page].copy_from_slice(&payload.bytes()[..in_page]);
        offset += in_page;

        if (in_page as u64) < payload_size {
            // chain pages are on disk before the pointer to them exists
            let first_overflow = pager.write_overflow_chain(&payload.bytes()[in_page..])?;
            int::write_u32(first_overflow, &mut self.buf[offset..]);
            debug!(
                rowid,
                payload_size,
                in_page,
                first_overflow,
                "payload spilled to overflow chain"
            );
        }

        Ok(PageInsert::Inserted)
    }

    pub fn insert_interior_cell(
        &mut self,
        rowid: u64,
        slot: usize,
        left_child: u32,
    ) -> Result<PageInsert> {
        ensure!(
            self.header.page_type == PageType::InteriorTable,
            "interior cell insert on {:?} page",
            self.header.page_type
        );
        let cell_size = self.cell_size(rowid, 0)?;

        if cell_size > self.free_space() {
            return Ok(PageInsert::NoSpace);
        }

        self.header.cell_content_start -= cell_size;
        self.header.cell_count += 1;
        let mut offset = self.header.cell_content_start as usize;
        self.shift_cell_offsets(slot);
        self.set_cell_offset(slot, offset);
        self.write_header();

        offset += int::write_u32(left_child, &mut self.buf[offset..]);
        write_varint(rowid, &mut self.buf[offset..]);
        Ok(PageInsert::Inserted)
    }

    /// Appends a cell verbatim after all existing cells. Used by split
    /// rebuilds, where cells arrive in rowid order and keep their exact
    /// on-disk encoding (including any overflow pointer).
    pub fn append_raw_cell(&mut self, cell: &[u8]) {
        self.header.cell_content_start -= cell.len() as u32;
        self.header.cell_count += 1;
        let offset = self.header.cell_content_start as usize;
        self.set_cell_offset(self.cell_count() - 1, offset);
        self.buf[offset..offset + cell.len()].copy_from_slice(cell);
        self.write_header();
    }

    pub fn raw_cell(&self, offset: usize, size: usize) -> &[u8] {
        &self.buf[offset..offset + size]
    }

    // --- split planning ---

    /// Sizes the virtual cell sequence with the incoming cell already at
    /// `new_slot` and picks the most balanced split index.
    pub fn split_plan(&self, new_slot: usize, new_cell_size: u32) -> Result<SplitPlan> {
        ensure!(
            self.header.page_type == PageType::LeafTable,
            "split plan on {:?} page",
            self.header.page_type
        );
        let count = self.cell_count() + 1;
        let mut cell_sizes = vec![0u32; count];
        let mut cell_offsets = vec![0u32; count];
        cell_sizes[new_slot] = new_cell_size;
        cell_offsets[new_slot] = u32::MAX;

        for i in 0..self.cell_count() {
            let offset = self.cell_offset(i);
            let rowid = self.cell_rowid(offset)?;
            let payload_size = self.cell_payload_size(offset)?;
            let virtual_idx = if i >= new_slot { i + 1 } else { i };
            cell_sizes[virtual_idx] = self.cell_size(rowid, payload_size)?;
            cell_offsets[virtual_idx] = offset as u32;
        }

        let mut sums = vec![0u32; count];
        let mut running = 0u32;
        for i in 0..count {
            running += cell_sizes[i];
            sums[i] = running;
        }

        let total = sums[count - 1];
        let mut split_index = 0;
        let mut min_diff = total;
        for (i, &sum) in sums.iter().enumerate() {
            let diff = (i64::from(total) - 2 * i64::from(sum)).unsigned_abs() as u32;
            if diff < min_diff {
                min_diff = diff;
                split_index = i;
            }
        }

        Ok(SplitPlan {
            split_index,
            cell_sizes,
            cell_offsets,
            sums,
        })
    }

    // --- cell reads ---

    /// Materialises the full payload of a leaf cell, following the
    /// overflow chain when the cell spilled.
    pub fn read_cell(&self, offset: usize, pager: &mut Pager) -> Result<Payload> {
        ensure!(
            self.header.page_type == PageType::LeafTable,
            "cell read on {:?} page",
            self.header.page_type
        );
        let (payload_size, n1) = read_varint(&self.buf[offset..])?;
        let (rowid, n2) = read_varint(&self.buf[offset + n1..])?;
        let in_page = self.directly_stored(payload_size) as usize;
        let body_start = offset + n1 + n2;
        ensure!(
            body_start + in_page <= self.buf.len(),
            "cell at offset {} overruns the page",
            offset
        );

        let mut bytes = Vec::with_capacity(payload_size as usize);
        bytes.extend_from_slice(&self.buf[body_start..body_start + in_page]);

        if (in_page as u64) < payload_size {
            let first_overflow = int::read_u32(&self.buf[body_start + in_page..]);
            let tail =
                pager.read_overflow_chain(first_overflow, payload_size - in_page as u64)?;
            bytes.extend_from_slice(&tail);
        }

        Ok(Payload::new(rowid, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use tempfile::tempdir;

    fn scratch_pager(page_size: u32) -> (tempfile::TempDir, Pager) {
        let dir = tempdir().unwrap();
        let pager = Pager::create(dir.path().join("scratch.db"), page_size).unwrap();
        (dir, pager)
    }

    fn leaf_with(rowids: &[u64], pager: &mut Pager) -> Page {
        let mut page = Page::fresh(PageType::LeafTable, 512, 512);
        for &rowid in rowids {
            let payload = Payload::encode(rowid, &[Value::RowidAlias, Value::Integer(1)]);
            let slot = page.lower_bound(rowid).unwrap();
            assert_eq!(
                page.insert_leaf_cell(rowid, slot, &payload, pager).unwrap(),
                PageInsert::Inserted
            );
        }
        page
    }

    #[test]
    fn page_type_bytes_round_trip() {
        for byte in [0x02u8, 0x05, 0x0a, 0x0d] {
            assert_eq!(PageType::from_byte(byte).unwrap().as_byte(), byte);
        }
        assert!(PageType::from_byte(0x00).is_err());
        assert!(PageType::from_byte(0x03).is_err());
    }

    #[test]
    fn fresh_page_has_full_free_space() {
        let page = Page::fresh(PageType::LeafTable, 512, 512);
        assert_eq!(page.free_space(), 512 - 8);
        let page = Page::fresh(PageType::InteriorTable, 512, 512);
        assert_eq!(page.free_space(), 512 - 12);
    }

    #[test]
    fn header_round_trips_through_buffer() {
        let mut page = Page::fresh(PageType::InteriorTable, 512, 512);
        page.header.cell_count = 3;
        page.header.cell_content_start = 400;
        page.header.right_most_child = 9;
        page.write_header();
        let parsed = Page::from_bytes(page.into_buf(), 2, 512).unwrap();
        assert_eq!(parsed.header.page_type, PageType::InteriorTable);
        assert_eq!(parsed.header.cell_count, 3);
        assert_eq!(parsed.header.cell_content_start, 400);
        assert_eq!(parsed.header.right_most_child, 9);
    }

    #[test]
    fn inserted_cells_stay_in_rowid_order() {
        let (_dir, mut pager) = scratch_pager(512);
        let page = leaf_with(&[5, 1, 9, 3, 7], &mut pager);
        let mut previous = 0;
        for i in 0..page.cell_count() {
            let rowid = page.cell_rowid(page.cell_offset(i)).unwrap();
            assert!(rowid > previous, "rowids out of order at slot {}", i);
            previous = rowid;
        }
    }

    #[test]
    fn free_space_accounts_for_every_inserted_byte() {
        let (_dir, mut pager) = scratch_pager(512);
        let mut page = Page::fresh(PageType::LeafTable, 512, 512);
        let mut cell_bytes = 0;
        for rowid in 1..=8u64 {
            let payload = Payload::encode(rowid, &[Value::RowidAlias, Value::Integer(7)]);
            cell_bytes += page.cell_size(rowid, payload.size()).unwrap();
            let slot = page.lower_bound(rowid).unwrap();
            page.insert_leaf_cell(rowid, slot, &payload, &mut pager)
                .unwrap();
        }
        assert_eq!(
            page.free_space(),
            512 - 8 - 2 * page.cell_count() as u32 - cell_bytes
        );
    }

    #[test]
    fn lower_bound_finds_first_not_less() {
        let (_dir, mut pager) = scratch_pager(512);
        let page = leaf_with(&[2, 4, 6], &mut pager);
        assert_eq!(page.lower_bound(1).unwrap(), 0);
        assert_eq!(page.lower_bound(2).unwrap(), 0);
        assert_eq!(page.lower_bound(3).unwrap(), 1);
        assert_eq!(page.lower_bound(6).unwrap(), 2);
        assert_eq!(page.lower_bound(7).unwrap(), 3);
    }

    #[test]
    fn spill_thresholds_for_512_byte_page() {
        let page = Page::fresh(PageType::LeafTable, 512, 512);
        assert_eq!(page.min_payload(), (512 - 12) * 32 / 255 - 23);
        assert_eq!(page.max_payload(), 477);
        assert_eq!(page.directly_stored(477), 477);
        assert!(page.directly_stored(478) < 478);
        let k = page.directly_stored(4000);
        assert!(u64::from(k) <= 477);
        let m = u64::from(page.min_payload());
        let expected = m + (4000 - m) % (512 - 4);
        if expected <= 477 {
            assert_eq!(u64::from(k), expected);
        } else {
            assert_eq!(u64::from(k), m);
        }
    }

    #[test]
    fn leaf_cell_size_includes_overflow_pointer_when_spilling() {
        let page = Page::fresh(PageType::LeafTable, 512, 512);
        let small = page.cell_size(1, 100).unwrap();
        assert_eq!(small, 1 + 1 + 100);
        let spilling = page.cell_size(1, 1000).unwrap();
        let k = page.directly_stored(1000);
        assert_eq!(spilling, 2 + 1 + k + 4);
    }

    #[test]
    fn interior_cell_size_is_child_plus_rowid() {
        let page = Page::fresh(PageType::InteriorTable, 512, 512);
        assert_eq!(page.cell_size(1, 0).unwrap(), 5);
        assert_eq!(page.cell_size(300, 0).unwrap(), 6);
    }

    #[test]
    fn full_page_reports_no_space_without_mutation() {
        let (_dir, mut pager) = scratch_pager(512);
        let mut page = Page::fresh(PageType::LeafTable, 512, 512);
        let mut rowid = 1;
        loop {
            let payload = Payload::encode(rowid, &[Value::RowidAlias, Value::Text("x".repeat(40))]);
            let slot = page.lower_bound(rowid).unwrap();
            let before = (page.header.cell_count, page.header.cell_content_start);
            match page
                .insert_leaf_cell(rowid, slot, &payload, &mut pager)
                .unwrap()
            {
                PageInsert::Inserted => rowid += 1,
                PageInsert::NoSpace => {
                    assert_eq!(
                        before,
                        (page.header.cell_count, page.header.cell_content_start)
                    );
                    break;
                }
            }
        }
        assert!(rowid > 1, "expected at least one insert before filling up");
    }

    #[test]
    fn split_plan_balances_uniform_cells() {
        let (_dir, mut pager) = scratch_pager(512);
        let page = leaf_with(&[1, 2, 3, 4, 5, 6], &mut pager);
        let new_size = page.cell_size(7, 12).unwrap();
        let plan = page.split_plan(6, new_size).unwrap();
        assert_eq!(plan.cell_sizes.len(), 7);
        assert_eq!(plan.sums.len(), 7);
        // uniform sizes: the midpoint wins
        assert_eq!(plan.split_index, 3);
        assert_eq!(plan.cell_offsets[6], u32::MAX);
    }

    #[test]
    fn split_plan_accounts_for_new_cell_slot() {
        let (_dir, mut pager) = scratch_pager(512);
        let page = leaf_with(&[1, 2, 4, 5], &mut pager);
        let new_size = page.cell_size(3, 12).unwrap();
        let plan = page.split_plan(2, new_size).unwrap();
        // virtual slot 2 is the incoming cell; old cells 2,3 shifted right
        assert_eq!(plan.cell_offsets[2], u32::MAX);
        assert_eq!(plan.cell_sizes.len(), 5);
        let total: u32 = plan.cell_sizes.iter().sum();
        assert_eq!(plan.sums[4], total);
    }

    #[test]
    fn read_cell_round_trips_in_page_payload() {
        let (_dir, mut pager) = scratch_pager(512);
        let mut page = Page::fresh(PageType::LeafTable, 512, 512);
        let payload = Payload::encode(
            42,
            &[Value::RowidAlias, Value::Text("carol".into()), Value::Integer(-3)],
        );
        page.insert_leaf_cell(42, 0, &payload, &mut pager).unwrap();
        let back = page.read_cell(page.cell_offset(0), &mut pager).unwrap();
        assert_eq!(back, payload);
        assert_eq!(page.cell_first_overflow(page.cell_offset(0)).unwrap(), 0);
    }

    #[test]
    fn read_cell_reassembles_overflow_chain() {
        let (_dir, mut pager) = scratch_pager(512);
        let mut page = Page::fresh(PageType::LeafTable, 512, 512);
        let text: String = std::iter::repeat("abcdefgh").take(500).collect::<String>();
        let payload = Payload::encode(1, &[Value::RowidAlias, Value::Text(text)]);
        assert!(payload.size() > 477);
        page.insert_leaf_cell(1, 0, &payload, &mut pager).unwrap();

        let first_overflow = page.cell_first_overflow(page.cell_offset(0)).unwrap();
        assert_ne!(first_overflow, 0);

        let back = page.read_cell(page.cell_offset(0), &mut pager).unwrap();
        assert_eq!(back, payload);

        let k = u64::from(page.directly_stored(payload.size()));
        let chunk = u64::from(page.usable_size() - 4);
        let expected_pages = (payload.size() - k).div_ceil(chunk);
        assert_eq!(
            u64::from(pager.database_size_in_pages()),
            1 + expected_pages
        );
    }
}
