//! Stateful range-scan cursor.
//!
//! An active scan owns exactly one standing pin: the leaf the cursor sits
//! on. Each step re-fetches that leaf for access and returns the access pin
//! immediately, so the standing pin is the only one that crosses an
//! operation boundary. Sibling hops trade the standing pin for one on the
//! next leaf; `end_scan` (or drop) releases it.

use storage::{BufferPoolManager, PageId};

use crate::error::{IndexError, IndexResult};
use crate::lifecycle::BTreeIndex;
use crate::node::{self, LeafNode, Rid};
use crate::predicate::{RangePredicate, ScanOp};
use crate::tree;

pub(crate) struct ScanState {
    /// Leaf the cursor is pinned on; `None` once the scan ran off the
    /// rightmost leaf and released its pin.
    leaf: Option<PageId>,
    next_entry: usize,
    predicate: RangePredicate,
}

enum Step {
    Down(node::InternalNode),
    Found(LeafNode),
}

/// Decodes the leaf at `page_id`, leaving it pinned on success.
fn pin_leaf(pool: &BufferPoolManager, page_id: PageId) -> IndexResult<LeafNode> {
    let decoded = {
        let guard = tree::fetch_page(pool, page_id)?;
        node::read_leaf(&guard)
    };
    match decoded {
        Ok(leaf) => Ok(leaf),
        Err(err) => {
            pool.unpin_page(page_id, false)?;
            Err(err)
        }
    }
}

impl BTreeIndex {
    /// Positions a scan on the first entry matching the given bounds.
    ///
    /// A scan already in progress is ended first. Fails with `BadOpcodes`
    /// or `BadScanRange` for malformed bounds and `NoSuchKeyFound` when no
    /// entry qualifies; no page stays pinned on failure.
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: ScanOp,
        high: i32,
        high_op: ScanOp,
    ) -> IndexResult<()> {
        let predicate = RangePredicate::new(low, low_op, high, high_op)?;
        if self.scan.is_some() {
            self.end_scan()?;
        }

        // Descend toward the leftmost leaf that can hold the lower bound.
        // Internal pages give their pin straight back; the leaf keeps its
        // pin as the scan's standing pin.
        let mut page_id = self.root_page_id;
        let mut leaf = loop {
            let decoded = {
                let guard = tree::fetch_page(&self.pool, page_id)?;
                match node::read_page_type(&guard) {
                    Ok(node::PageType::Internal) => node::read_internal(&guard).map(Step::Down),
                    Ok(node::PageType::Leaf) => node::read_leaf(&guard).map(Step::Found),
                    Ok(node::PageType::Meta) => Err(IndexError::Corrupted(
                        "scan descent reached the meta page".to_string(),
                    )),
                    Err(err) => Err(err),
                }
            };
            match decoded {
                Ok(Step::Down(internal)) => {
                    self.pool.unpin_page(page_id, false)?;
                    page_id =
                        internal.children[tree::scan_child_index(&internal.keys, predicate.low())];
                }
                Ok(Step::Found(leaf)) => break leaf,
                Err(err) => {
                    self.pool.unpin_page(page_id, false)?;
                    return Err(err);
                }
            }
        };

        loop {
            let position = leaf
                .entries
                .partition_point(|entry| !predicate.matches_lower(entry.key));
            if let Some(entry) = leaf.entries.get(position) {
                if !predicate.matches_upper(entry.key) {
                    self.pool.unpin_page(page_id, false)?;
                    return Err(IndexError::NoSuchKeyFound);
                }
                self.scan = Some(ScanState {
                    leaf: Some(page_id),
                    next_entry: position,
                    predicate,
                });
                return Ok(());
            }

            // Every key here is below the range; the first match, if any,
            // lives further right.
            let next = leaf.right_sibling;
            self.pool.unpin_page(page_id, false)?;
            match next {
                None => return Err(IndexError::NoSuchKeyFound),
                Some(sibling) => {
                    leaf = pin_leaf(&self.pool, sibling)?;
                    page_id = sibling;
                }
            }
        }
    }

    /// Yields the rid of the next matching entry and advances the cursor.
    ///
    /// Fails with `ScanNotInitialized` when no scan is running and
    /// `IndexScanCompleted` once the range is exhausted.
    pub fn scan_next(&mut self) -> IndexResult<Rid> {
        let state = self.scan.as_mut().ok_or(IndexError::ScanNotInitialized)?;
        let mut page_id = state.leaf.ok_or(IndexError::IndexScanCompleted)?;
        let mut leaf = tree::read_leaf_node(&self.pool, page_id)?;

        while state.next_entry >= leaf.entries.len() {
            // Leaf drained: trade the standing pin for one on the sibling.
            let next = leaf.right_sibling;
            self.pool.unpin_page(page_id, false)?;
            state.leaf = None;
            let Some(sibling) = next else {
                return Err(IndexError::IndexScanCompleted);
            };
            leaf = pin_leaf(&self.pool, sibling)?;
            state.leaf = Some(sibling);
            state.next_entry = 0;
            page_id = sibling;
        }

        let entry = leaf.entries[state.next_entry];
        if !state.predicate.matches(entry.key) {
            return Err(IndexError::IndexScanCompleted);
        }
        state.next_entry += 1;
        Ok(entry.rid)
    }

    /// Releases the scan's pinned leaf and clears the cursor.
    pub fn end_scan(&mut self) -> IndexResult<()> {
        let state = self.scan.take().ok_or(IndexError::ScanNotInitialized)?;
        if let Some(page_id) = state.leaf {
            self.pool.unpin_page(page_id, false)?;
        }
        Ok(())
    }

    /// All rids stored under `key`, via an equality scan. Runs its own scan,
    /// so any scan already in progress is ended.
    pub fn get(&mut self, key: i32) -> IndexResult<Vec<Rid>> {
        match self.start_scan(key, ScanOp::Gte, key, ScanOp::Lte) {
            Err(IndexError::NoSuchKeyFound) => return Ok(Vec::new()),
            other => other?,
        }
        let mut rids = Vec::new();
        loop {
            match self.scan_next() {
                Ok(rid) => rids.push(rid),
                Err(IndexError::IndexScanCompleted) => break,
                Err(err) => {
                    let _ = self.end_scan();
                    return Err(err);
                }
            }
        }
        self.end_scan()?;
        Ok(rids)
    }
}
