//! Insertion descent, node splits, and root promotion.
//!
//! Nodes are mutated in the read-decode / modify / encode-write style: a page
//! is pinned only long enough to decode or encode it, so no pin survives an
//! insert. Split points follow the occupancy handed in through `TreeConfig`,
//! which the lifecycle derives from the page layout.

use log::{debug, trace};
use storage::{BufferPoolManager, PageGuard, PageId};

use crate::error::{IndexError, IndexResult};
use crate::node::{self, InternalNode, LeafEntry, LeafNode, MetaNode, PageType, Rid};

/// Node capacities used by the mutator. Separated from the on-page maxima so
/// unit tests can drive deep trees with tiny nodes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeConfig {
    pub leaf_occupancy: usize,
    pub node_occupancy: usize,
}

pub(crate) fn fetch_page<'a>(
    pool: &'a BufferPoolManager,
    page_id: PageId,
) -> IndexResult<PageGuard<'a>> {
    pool.fetch_page(page_id)?.ok_or(IndexError::PoolExhausted)
}

/// Allocates a zero-filled page and returns it unpinned.
pub(crate) fn allocate_page(pool: &BufferPoolManager) -> IndexResult<PageId> {
    let page_id = pool.new_page()?.ok_or(IndexError::PoolExhausted)?;
    pool.unpin_page(page_id, false)?;
    Ok(page_id)
}

pub(crate) fn read_leaf_node(pool: &BufferPoolManager, page_id: PageId) -> IndexResult<LeafNode> {
    let decoded = {
        let guard = fetch_page(pool, page_id)?;
        node::read_leaf(&guard)
    };
    pool.unpin_page(page_id, false)?;
    decoded
}

pub(crate) fn write_leaf_node(
    pool: &BufferPoolManager,
    page_id: PageId,
    leaf: &LeafNode,
) -> IndexResult<()> {
    let result = {
        let mut guard = fetch_page(pool, page_id)?;
        node::write_leaf(&mut guard, leaf)
    };
    pool.unpin_page(page_id, true)?;
    result
}

pub(crate) fn write_internal_node(
    pool: &BufferPoolManager,
    page_id: PageId,
    internal: &InternalNode,
) -> IndexResult<()> {
    let result = {
        let mut guard = fetch_page(pool, page_id)?;
        node::write_internal(&mut guard, internal)
    };
    pool.unpin_page(page_id, true)?;
    result
}

pub(crate) fn read_meta_node(pool: &BufferPoolManager, page_id: PageId) -> IndexResult<MetaNode> {
    let decoded = {
        let guard = fetch_page(pool, page_id)?;
        node::read_meta(&guard)
    };
    pool.unpin_page(page_id, false)?;
    decoded
}

pub(crate) fn write_meta_node(
    pool: &BufferPoolManager,
    page_id: PageId,
    meta: &MetaNode,
) -> IndexResult<()> {
    let result = {
        let mut guard = fetch_page(pool, page_id)?;
        node::write_meta(&mut guard, meta)
    };
    pool.unpin_page(page_id, true)?;
    result
}

/// Index of the child whose subtree covers `key` for insertion: the number
/// of separators at or below it. Keys equal to a separator belong to the
/// right subtree.
pub(crate) fn child_index(keys: &[i32], key: i32) -> usize {
    keys.partition_point(|&separator| separator <= key)
}

/// Index of the leftmost child whose subtree may hold `key`, for scan
/// positioning: duplicates of a separator key can sit immediately left of
/// the boundary, so a scan descends left on ties and walks right from there.
pub(crate) fn scan_child_index(keys: &[i32], key: i32) -> usize {
    keys.partition_point(|&separator| separator < key)
}

pub(crate) enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

pub(crate) fn read_node(pool: &BufferPoolManager, page_id: PageId) -> IndexResult<Node> {
    let decoded = {
        let guard = fetch_page(pool, page_id)?;
        match node::read_page_type(&guard) {
            Ok(PageType::Leaf) => node::read_leaf(&guard).map(Node::Leaf),
            Ok(PageType::Internal) => node::read_internal(&guard).map(Node::Internal),
            Ok(PageType::Meta) => Err(IndexError::Corrupted(
                "tree descent reached the meta page".to_string(),
            )),
            Err(err) => Err(err),
        }
    };
    pool.unpin_page(page_id, false)?;
    decoded
}

/// Inserts `(key, rid)` under `root`. Returns the id of a new root page when
/// the old root split; the caller owns making that root visible.
pub(crate) fn insert_entry(
    pool: &BufferPoolManager,
    root: PageId,
    key: i32,
    rid: Rid,
    config: &TreeConfig,
) -> IndexResult<Option<PageId>> {
    match insert_descend(pool, root, key, rid, config)? {
        None => Ok(None),
        Some((separator, right)) => {
            let new_root = allocate_page(pool)?;
            let node = InternalNode {
                keys: vec![separator],
                children: vec![root, right],
            };
            write_internal_node(pool, new_root, &node)?;
            debug!(
                "root split: page {} now parents {} and {}",
                new_root, root, right
            );
            Ok(Some(new_root))
        }
    }
}

fn insert_descend(
    pool: &BufferPoolManager,
    page_id: PageId,
    key: i32,
    rid: Rid,
    config: &TreeConfig,
) -> IndexResult<Option<(i32, PageId)>> {
    match read_node(pool, page_id)? {
        Node::Leaf(mut leaf) => {
            if leaf.entries.len() < config.leaf_occupancy {
                let position = leaf.entries.partition_point(|entry| entry.key <= key);
                leaf.entries.insert(position, LeafEntry { key, rid });
                write_leaf_node(pool, page_id, &leaf)?;
                Ok(None)
            } else {
                split_leaf(pool, page_id, leaf, key, rid).map(Some)
            }
        }
        Node::Internal(mut internal) => {
            let child = internal.children[child_index(&internal.keys, key)];
            match insert_descend(pool, child, key, rid, config)? {
                None => Ok(None),
                Some((separator, new_child)) => {
                    if internal.keys.len() < config.node_occupancy {
                        let position = internal.keys.partition_point(|&k| k <= separator);
                        internal.keys.insert(position, separator);
                        internal.children.insert(position + 1, new_child);
                        write_internal_node(pool, page_id, &internal)?;
                        Ok(None)
                    } else {
                        split_internal(pool, page_id, internal, separator, new_child).map(Some)
                    }
                }
            }
        }
    }
}

/// Splits a full leaf around its midpoint and places the incoming entry on
/// the side it sorts into. Returns the separator to install in the parent:
/// the first key of the new right sibling.
fn split_leaf(
    pool: &BufferPoolManager,
    page_id: PageId,
    mut leaf: LeafNode,
    key: i32,
    rid: Rid,
) -> IndexResult<(i32, PageId)> {
    let len = leaf.entries.len();
    let mut mid = len / 2;
    // An odd occupancy would leave the left side smaller whenever the new
    // entry goes right; shifting the midpoint keeps it at least as large.
    if len % 2 == 1 && key > leaf.entries[mid].key {
        mid += 1;
    }

    let right_entries = leaf.entries.split_off(mid);
    let right_page_id = allocate_page(pool)?;
    let mut right = LeafNode {
        right_sibling: leaf.right_sibling,
        entries: right_entries,
    };
    leaf.right_sibling = Some(right_page_id);

    let last_left = leaf.entries[leaf.entries.len() - 1].key;
    if key <= last_left {
        let position = leaf.entries.partition_point(|entry| entry.key <= key);
        leaf.entries.insert(position, LeafEntry { key, rid });
    } else {
        let position = right.entries.partition_point(|entry| entry.key <= key);
        right.entries.insert(position, LeafEntry { key, rid });
    }

    let separator = right.entries[0].key;
    write_leaf_node(pool, page_id, &leaf)?;
    write_leaf_node(pool, right_page_id, &right)?;
    trace!(
        "leaf split: {} -> {} at separator {}",
        page_id,
        right_page_id,
        separator
    );
    Ok((separator, right_page_id))
}

/// Splits a full internal node that must absorb `(separator, new_child)`.
/// One resident key is promoted to the parent; entries strictly to its right
/// move to the new sibling, and the incoming separator lands on whichever
/// side the promoted key assigns it (equal keys go right).
fn split_internal(
    pool: &BufferPoolManager,
    page_id: PageId,
    mut internal: InternalNode,
    separator: i32,
    new_child: PageId,
) -> IndexResult<(i32, PageId)> {
    let len = internal.keys.len();
    let mut mid = len / 2;
    // An even occupancy would leave the right side larger whenever the
    // incoming separator goes left; stepping the promoted slot down keeps
    // the sides balanced.
    if len % 2 == 0 && separator < internal.keys[mid] {
        mid -= 1;
    }
    let promoted = internal.keys[mid];

    let right_keys = internal.keys.split_off(mid + 1);
    let right_children = internal.children.split_off(mid + 1);
    internal.keys.truncate(mid);
    let mut right = InternalNode {
        keys: right_keys,
        children: right_children,
    };

    let right_page_id = allocate_page(pool)?;
    if separator < promoted {
        let position = internal.keys.partition_point(|&k| k <= separator);
        internal.keys.insert(position, separator);
        internal.children.insert(position + 1, new_child);
    } else {
        let position = right.keys.partition_point(|&k| k <= separator);
        right.keys.insert(position, separator);
        right.children.insert(position + 1, new_child);
    }

    write_internal_node(pool, page_id, &internal)?;
    write_internal_node(pool, right_page_id, &right)?;
    trace!(
        "internal split: {} -> {} promoting {}",
        page_id,
        right_page_id,
        promoted
    );
    Ok((promoted, right_page_id))
}
