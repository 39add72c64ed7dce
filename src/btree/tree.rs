//! B-tree descent, insertion with split-and-promote, and scanning.
//!
//! The insert path in detail:
//!
//! ```text
//! 1. Descend from the root, stacking parent page numbers.
//! 2. Try a local leaf insert. Done on success; duplicate rowids bounce.
//! 3. Leaf full: plan the most balanced 2-way cut of old + new cells,
//!    rebuild the two halves, and promote the separator.
//!    - Leaf was the root: append both halves, rewrite the root in place
//!      as an interior page with one cell. Root page number unchanged.
//!    - Otherwise: right half overwrites the old leaf's page (so cells
//!      >= separator keep their parent pointer), left half is appended,
//!      and (separator, left page) is inserted into the parent.
//! 4. A parent that overflows splits at cell_count / 2: the median cell
//!    is promoted, its left child becomes the left half's right-most
//!    pointer, and the walk continues upward. An overflowing root is
//!    rewritten in place exactly as in the leaf case.
//! ```

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;
use tracing::debug;

use crate::config::{CELL_POINTER_SIZE, LEAF_HEADER_SIZE};
use crate::record::Payload;
use crate::storage::{Page, PageInsert, PageType, Pager, SplitPlan};

/// What became of an insert. Only genuine failures (I/O, corrupt pages)
/// are errors; these three are expected answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    RowidAlreadyInDatabase,
    /// Both halves of a 2-way split would still overflow. The tree is
    /// untouched but earlier overflow pages may already be on disk.
    TripleSplitUnsupported,
}

/// Descends from `root` and returns the payload stored under `rowid`.
pub fn find(pager: &mut Pager, root: u32, rowid: u64) -> Result<Option<Payload>> {
    let mut page = pager.load_page(root)?;
    while page.header.page_type == PageType::InteriorTable {
        let idx = page.lower_bound(rowid)?;
        let child = if idx < page.cell_count() {
            page.cell_left_child(page.cell_offset(idx))?
        } else {
            page.header.right_most_child
        };
        page = pager.load_page(child)?;
    }
    ensure!(
        page.header.page_type == PageType::LeafTable,
        "table b-tree descent reached a {:?} page",
        page.header.page_type
    );

    let idx = page.lower_bound(rowid)?;
    if idx == page.cell_count() {
        return Ok(None);
    }
    let offset = page.cell_offset(idx);
    if page.cell_rowid(offset)? != rowid {
        return Ok(None);
    }
    Ok(Some(page.read_cell(offset, pager)?))
}

/// Walks the whole tree depth-first and hands every leaf payload to
/// `visit`. Visit order across leaves follows the explicit stack, not
/// rowid order.
pub fn scan(
    pager: &mut Pager,
    root: u32,
    visit: &mut dyn FnMut(Payload) -> Result<()>,
) -> Result<()> {
    let mut stack: SmallVec<[u32; 16]> = SmallVec::new();
    stack.push(root);

    while let Some(page_no) = stack.pop() {
        let page = pager.load_page(page_no)?;
        match page.header.page_type {
            PageType::LeafTable => {
                for i in 0..page.cell_count() {
                    let payload = page.read_cell(page.cell_offset(i), pager)?;
                    visit(payload)?;
                }
            }
            PageType::InteriorTable => {
                for i in 0..page.cell_count() {
                    stack.push(page.cell_left_child(page.cell_offset(i))?);
                }
                stack.push(page.header.right_most_child);
            }
            other => bail!("table b-tree walk reached a {:?} page", other),
        }
    }
    Ok(())
}

/// Inserts `payload` under `rowid`, splitting and promoting as needed.
pub fn insert(
    pager: &mut Pager,
    root: u32,
    rowid: u64,
    payload: &Payload,
) -> Result<InsertOutcome> {
    let mut parents: SmallVec<[u32; 8]> = SmallVec::new();
    let mut page_no = root;
    let mut page = pager.load_page(page_no)?;

    while page.header.page_type == PageType::InteriorTable {
        parents.push(page_no);
        let idx = page.lower_bound(rowid)?;
        page_no = if idx < page.cell_count() {
            page.cell_left_child(page.cell_offset(idx))?
        } else {
            page.header.right_most_child
        };
        page = pager.load_page(page_no)?;
    }
    ensure!(
        page.header.page_type == PageType::LeafTable,
        "table b-tree descent reached a {:?} page",
        page.header.page_type
    );

    let slot = page.lower_bound(rowid)?;
    if slot < page.cell_count() && page.cell_rowid(page.cell_offset(slot))? == rowid {
        return Ok(InsertOutcome::RowidAlreadyInDatabase);
    }

    if page.insert_leaf_cell(rowid, slot, payload, pager)? == PageInsert::Inserted {
        pager.write_page(page_no, page.buf())?;
        return Ok(InsertOutcome::Inserted);
    }

    // leaf is full: plan the 2-way cut over old cells plus the new one
    let new_cell_size = page.cell_size(rowid, payload.size())?;
    let plan = page.split_plan(slot, new_cell_size)?;
    let split_rowid = if plan.split_index == slot {
        rowid
    } else {
        page.cell_rowid(plan.cell_offsets[plan.split_index] as usize)?
    };

    if !halves_fit(&plan, page.usable_size()) {
        debug!(rowid, split_index = plan.split_index, "triple split needed, giving up");
        return Ok(InsertOutcome::TripleSplitUnsupported);
    }

    let page_size = pager.page_size();
    let usable_size = pager.usable_size();
    let virtual_count = plan.cell_sizes.len();

    let mut right = Page::fresh(PageType::LeafTable, page_size, usable_size);
    fill_leaf_half(
        &mut right,
        &page,
        &plan,
        plan.split_index + 1..virtual_count,
        slot,
        rowid,
        payload,
        pager,
    )?;

    let mut left = Page::fresh(PageType::LeafTable, page_size, usable_size);
    fill_leaf_half(
        &mut left,
        &page,
        &plan,
        0..plan.split_index + 1,
        slot,
        rowid,
        payload,
        pager,
    )?;

    if page_no == root {
        // root promotion: both halves become fresh children and the root
        // page is repurposed in place, keeping its page number
        let left_no = pager.append_page(left.buf())?;
        let right_no = pager.append_page(right.buf())?;

        page.reinit(PageType::InteriorTable);
        page.header.right_most_child = right_no;
        ensure!(
            page.insert_interior_cell(split_rowid, 0, left_no)? == PageInsert::Inserted,
            "rebuilt root cannot hold a single separator cell"
        );
        pager.write_page(page_no, page.buf())?;
        debug!(
            root = page_no,
            left = left_no,
            right = right_no,
            split_rowid,
            "leaf root split"
        );
        return Ok(InsertOutcome::Inserted);
    }

    // the right half keeps the old page number so the parent's existing
    // pointer still covers rowids above the separator; the left half is
    // appended and promoted
    pager.write_page(page_no, right.buf())?;
    let left_no = pager.append_page(left.buf())?;
    debug!(leaf = page_no, left = left_no, split_rowid, "leaf split");

    let mut promote_rowid = split_rowid;
    let mut promote_child = left_no;

    loop {
        let Some(parent_no) = parents.pop() else {
            bail!("split propagation walked past the root");
        };
        let mut parent = pager.load_page(parent_no)?;
        ensure!(
            parent.header.page_type == PageType::InteriorTable,
            "split propagation reached a {:?} page",
            parent.header.page_type
        );

        let idx = parent.lower_bound(promote_rowid)?;
        if parent.insert_interior_cell(promote_rowid, idx, promote_child)? == PageInsert::Inserted
        {
            pager.write_page(parent_no, parent.buf())?;
            return Ok(InsertOutcome::Inserted);
        }

        // interior split: materialise the virtual cell sequence, promote
        // the median, hand its left child to the left half as right-most
        let old_count = parent.cell_count();
        let mut cells: Vec<(u64, u32)> = Vec::with_capacity(old_count + 1);
        for i in 0..=old_count {
            if i == idx {
                cells.push((promote_rowid, promote_child));
            }
            if i < old_count {
                let offset = parent.cell_offset(i);
                cells.push((parent.cell_rowid(offset)?, parent.cell_left_child(offset)?));
            }
        }

        let split_index = old_count / 2;
        let (up_rowid, up_child) = cells[split_index];

        let mut right = Page::fresh(PageType::InteriorTable, page_size, usable_size);
        right.header.right_most_child = parent.header.right_most_child;
        for &(cell_rowid, child) in &cells[split_index + 1..] {
            let slot = right.cell_count();
            ensure!(
                right.insert_interior_cell(cell_rowid, slot, child)? == PageInsert::Inserted,
                "interior split right half does not fit"
            );
        }

        let mut left = Page::fresh(PageType::InteriorTable, page_size, usable_size);
        left.header.right_most_child = up_child;
        for &(cell_rowid, child) in &cells[..split_index] {
            let slot = left.cell_count();
            ensure!(
                left.insert_interior_cell(cell_rowid, slot, child)? == PageInsert::Inserted,
                "interior split left half does not fit"
            );
        }

        if parent_no == root {
            let left_no = pager.append_page(left.buf())?;
            let right_no = pager.append_page(right.buf())?;

            parent.reinit(PageType::InteriorTable);
            parent.header.right_most_child = right_no;
            ensure!(
                parent.insert_interior_cell(up_rowid, 0, left_no)? == PageInsert::Inserted,
                "rebuilt root cannot hold a single separator cell"
            );
            pager.write_page(parent_no, parent.buf())?;
            debug!(
                root = parent_no,
                left = left_no,
                right = right_no,
                split_rowid = up_rowid,
                "interior root split"
            );
            return Ok(InsertOutcome::Inserted);
        }

        pager.write_page(parent_no, right.buf())?;
        let left_no = pager.append_page(left.buf())?;
        debug!(
            interior = parent_no,
            left = left_no,
            split_rowid = up_rowid,
            "interior split"
        );
        promote_rowid = up_rowid;
        promote_child = left_no;
    }
}

/// Both halves of the planned cut must fit a fresh leaf: cells, pointer
/// array, and the 8-byte header.
fn halves_fit(plan: &SplitPlan, usable_size: u32) -> bool {
    let count = plan.cell_sizes.len();
    let split = plan.split_index;
    let total = plan.sums[count - 1];
    let left_cells = (split + 1) as u32;
    let right_cells = (count - 1 - split) as u32;

    plan.sums[split] + LEAF_HEADER_SIZE + CELL_POINTER_SIZE * left_cells <= usable_size
        && (total - plan.sums[split]) + LEAF_HEADER_SIZE + CELL_POINTER_SIZE * right_cells
            <= usable_size
}

/// Rebuilds one half of a splitting leaf. Surviving cells are copied
/// verbatim (overflow pointers ride along); the incoming cell is
/// re-encoded through the normal insert path so its overflow chain is
/// created exactly once, in the half that owns it.
#[allow(clippy::too_many_arguments)]
fn fill_leaf_half(
    target: &mut Page,
    source: &Page,
    plan: &SplitPlan,
    range: std::ops::Range<usize>,
    new_slot: usize,
    rowid: u64,
    payload: &Payload,
    pager: &mut Pager,
) -> Result<()> {
    for i in range {
        if i == new_slot {
            let slot = target.cell_count();
            ensure!(
                target.insert_leaf_cell(rowid, slot, payload, pager)? == PageInsert::Inserted,
                "split half cannot hold the new cell"
            );
        } else {
            let offset = plan.cell_offsets[i] as usize;
            let size = plan.cell_sizes[i] as usize;
            target.append_raw_cell(source.raw_cell(offset, size));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;
    use hashbrown::HashSet;
    use tempfile::{tempdir, TempDir};

    fn tree_fixture(page_size: u32) -> (TempDir, Pager, u32) {
        let dir = tempdir().unwrap();
        let mut pager = Pager::create(dir.path().join("tree.db"), page_size).unwrap();
        let usable_size = pager.usable_size();
        let root = pager
            .append_page(Page::fresh(PageType::LeafTable, page_size, usable_size).buf())
            .unwrap();
        (dir, pager, root)
    }

    fn row(rowid: u64, text_len: usize) -> Payload {
        Payload::encode(
            rowid,
            &[Value::RowidAlias, Value::Text("x".repeat(text_len))],
        )
    }

    /// Recursively checks separator ordering and collects reachable pages.
    fn check_subtree(
        pager: &mut Pager,
        page_no: u32,
        low: u64,
        high: u64,
        seen: &mut HashSet<u32>,
    ) {
        assert!(seen.insert(page_no), "page {} reachable twice", page_no);
        let page = pager.load_page(page_no).unwrap();
        match page.header.page_type {
            PageType::LeafTable => {
                for i in 0..page.cell_count() {
                    let rowid = page.cell_rowid(page.cell_offset(i)).unwrap();
                    assert!(rowid > low && rowid <= high, "rowid {} outside ({}, {}]", rowid, low, high);
                }
            }
            PageType::InteriorTable => {
                assert!(page.cell_count() >= 1);
                let mut lower = low;
                for i in 0..page.cell_count() {
                    let offset = page.cell_offset(i);
                    let separator = page.cell_rowid(offset).unwrap();
                    let child = page.cell_left_child(offset).unwrap();
                    assert!(separator > lower);
                    check_subtree(pager, child, lower, separator, seen);
                    lower = separator;
                }
                assert_ne!(page.header.right_most_child, 0);
                check_subtree(pager, page.header.right_most_child, lower, high, seen);
            }
            other => panic!("unexpected page type {:?}", other),
        }
    }

    #[test]
    fn insert_then_find_single_row() {
        let (_dir, mut pager, root) = tree_fixture(4096);
        let payload = row(1, 5);
        assert_eq!(
            insert(&mut pager, root, 1, &payload).unwrap(),
            InsertOutcome::Inserted
        );
        let found = find(&mut pager, root, 1).unwrap().unwrap();
        assert_eq!(found, payload);
        assert!(find(&mut pager, root, 2).unwrap().is_none());
    }

    #[test]
    fn duplicate_rowid_leaves_tree_untouched() {
        let (_dir, mut pager, root) = tree_fixture(4096);
        let original = row(1, 5);
        insert(&mut pager, root, 1, &original).unwrap();
        assert_eq!(
            insert(&mut pager, root, 1, &row(1, 9)).unwrap(),
            InsertOutcome::RowidAlreadyInDatabase
        );
        assert_eq!(find(&mut pager, root, 1).unwrap().unwrap(), original);
    }

    #[test]
    fn root_split_keeps_root_page_number() {
        let (_dir, mut pager, root) = tree_fixture(512);
        for rowid in 1..=30u64 {
            assert_eq!(
                insert(&mut pager, root, rowid, &row(rowid, 200)).unwrap(),
                InsertOutcome::Inserted,
                "insert of rowid {} failed",
                rowid
            );
        }
        let root_page = pager.load_page(root).unwrap();
        assert_eq!(root_page.header.page_type, PageType::InteriorTable);
        for rowid in 1..=30u64 {
            let payload = find(&mut pager, root, rowid).unwrap().unwrap();
            assert_eq!(payload, row(rowid, 200));
        }
    }

    #[test]
    fn descending_inserts_split_correctly() {
        let (_dir, mut pager, root) = tree_fixture(512);
        for rowid in (1..=30u64).rev() {
            assert_eq!(
                insert(&mut pager, root, rowid, &row(rowid, 120)).unwrap(),
                InsertOutcome::Inserted
            );
        }
        for rowid in 1..=30u64 {
            assert!(find(&mut pager, root, rowid).unwrap().is_some());
        }
    }

    #[test]
    fn deep_tree_stays_ordered_and_acyclic() {
        let (_dir, mut pager, root) = tree_fixture(512);
        // enough rows at this payload size to split interior pages too
        for rowid in 1..=800u64 {
            assert_eq!(
                insert(&mut pager, root, rowid, &row(rowid, 100)).unwrap(),
                InsertOutcome::Inserted,
                "insert of rowid {} failed",
                rowid
            );
        }

        let mut seen = HashSet::new();
        check_subtree(&mut pager, root, 0, u64::MAX, &mut seen);

        for rowid in [1u64, 57, 199, 256, 400, 555, 800] {
            assert_eq!(
                find(&mut pager, root, rowid).unwrap().unwrap(),
                row(rowid, 100)
            );
        }
        assert!(find(&mut pager, root, 801).unwrap().is_none());
    }

    #[test]
    fn scan_visits_every_row_exactly_once() {
        let (_dir, mut pager, root) = tree_fixture(512);
        for rowid in 1..=100u64 {
            insert(&mut pager, root, rowid, &row(rowid, 40)).unwrap();
        }
        let mut rowids = Vec::new();
        scan(&mut pager, root, &mut |payload| {
            rowids.push(payload.rowid());
            Ok(())
        })
        .unwrap();
        rowids.sort_unstable();
        assert_eq!(rowids, (1..=100u64).collect::<Vec<_>>());
    }

    #[test]
    fn spilled_payload_round_trips_through_find() {
        let (_dir, mut pager, root) = tree_fixture(512);
        let big = row(1, 4000);
        insert(&mut pager, root, 1, &big).unwrap();
        assert_eq!(find(&mut pager, root, 1).unwrap().unwrap(), big);
        // chain length: ceil((P - K) / (U - 4)) extra pages past header + root
        let page = pager.load_page(root).unwrap();
        let in_page = u64::from(page.directly_stored(big.size()));
        let chain = (big.size() - in_page).div_ceil(u64::from(pager.usable_size() - 4));
        assert_eq!(u64::from(pager.database_size_in_pages()), 2 + chain);
    }

    #[test]
    fn interleaved_inserts_with_spills_stay_consistent() {
        let (_dir, mut pager, root) = tree_fixture(512);
        let mut expected = Vec::new();
        for rowid in 1..=40u64 {
            let len = if rowid % 7 == 0 { 1500 } else { 80 };
            let payload = row(rowid, len);
            assert_eq!(
                insert(&mut pager, root, rowid, &payload).unwrap(),
                InsertOutcome::Inserted
            );
            expected.push((rowid, payload));
        }
        for (rowid, payload) in expected {
            assert_eq!(find(&mut pager, root, rowid).unwrap().unwrap(), payload);
        }
    }
}
