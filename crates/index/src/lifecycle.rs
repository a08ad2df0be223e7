//! Index lifecycle: open-or-build on a named file, metadata management,
//! and the initial bulk build from a relation scan.

use std::path::Path;

use log::debug;
use storage::{BufferPoolError, BufferPoolManager, DiskManager, FlushMode, PageId};

use crate::error::{IndexError, IndexResult};
use crate::node::{self, AttrType, LeafNode, MetaNode, Rid, MAX_RELATION_NAME};
use crate::scan::ScanState;
use crate::tree::{self, TreeConfig};

/// The metadata page is always the first page of the index file.
const META_PAGE_ID: PageId = 1;

/// Buffer pool frames to use when the caller has no preference.
pub const DEFAULT_POOL_SIZE: usize = 128;

/// Source of records for the initial bulk build: successive `(rid, record)`
/// pairs of the indexed relation, `None` once the relation is exhausted.
pub trait RelationSource {
    fn next_record(&mut self) -> IndexResult<Option<(Rid, Vec<u8>)>>;
}

/// A B+ tree index over one fixed-width integer attribute of a relation.
///
/// Operations run one at a time; running an insert while a scan is active
/// is outside the contract.
pub struct BTreeIndex {
    pub(crate) pool: BufferPoolManager,
    pub(crate) root_page_id: PageId,
    pub(crate) scan: Option<ScanState>,
    index_name: String,
    leaf_occupancy: usize,
    node_occupancy: usize,
}

impl BTreeIndex {
    /// Opens the index for `relation_name` keyed on the `i32` found at byte
    /// `attr_offset` of each record. The index file is named
    /// `"<relation_name>.<attr_offset>"` under `dir`.
    ///
    /// When the file already exists its metadata must describe the same
    /// relation and attribute (`BadIndexInfo` otherwise) and `source` is
    /// untouched. When it does not, a fresh index is built by draining
    /// `source` and flushed.
    pub fn open(
        dir: &Path,
        relation_name: &str,
        attr_offset: u32,
        attr_type: AttrType,
        source: &mut dyn RelationSource,
        pool_size: usize,
    ) -> IndexResult<Self> {
        if relation_name.len() > MAX_RELATION_NAME {
            return Err(IndexError::BadIndexInfo(format!(
                "relation name exceeds {} bytes",
                MAX_RELATION_NAME
            )));
        }
        let index_name = format!("{}.{}", relation_name, attr_offset);
        let path = dir.join(&index_name);
        let disk_manager = DiskManager::open(&path).map_err(BufferPoolError::from)?;
        let fresh = disk_manager.is_new();
        let pool = BufferPoolManager::new(disk_manager, pool_size);
        if fresh {
            Self::build(pool, index_name, relation_name, attr_offset, attr_type, source)
        } else {
            Self::load(pool, index_name, relation_name, attr_offset, attr_type)
        }
    }

    fn build(
        pool: BufferPoolManager,
        index_name: String,
        relation_name: &str,
        attr_offset: u32,
        attr_type: AttrType,
        source: &mut dyn RelationSource,
    ) -> IndexResult<Self> {
        let meta_page_id = tree::allocate_page(&pool)?;
        if meta_page_id != META_PAGE_ID {
            return Err(IndexError::Corrupted(format!(
                "metadata page allocated at {} instead of {}",
                meta_page_id, META_PAGE_ID
            )));
        }
        let root_page_id = tree::allocate_page(&pool)?;
        tree::write_leaf_node(
            &pool,
            root_page_id,
            &LeafNode {
                right_sibling: None,
                entries: Vec::new(),
            },
        )?;
        let meta = MetaNode {
            relation_name: relation_name.to_string(),
            attr_offset,
            attr_type,
            root_page_id,
        };
        tree::write_meta_node(&pool, META_PAGE_ID, &meta)?;

        let mut index = Self {
            pool,
            root_page_id,
            scan: None,
            index_name,
            leaf_occupancy: node::LEAF_OCCUPANCY,
            node_occupancy: node::NODE_OCCUPANCY,
        };
        let mut count = 0usize;
        while let Some((rid, record)) = source.next_record()? {
            let key = key_at(&record, attr_offset)?;
            index.insert(key, rid)?;
            count += 1;
        }
        index.pool.flush_all_pages()?;
        debug!(
            "index {} built: {} entries from relation {}",
            index.index_name, count, relation_name
        );
        Ok(index)
    }

    fn load(
        pool: BufferPoolManager,
        index_name: String,
        relation_name: &str,
        attr_offset: u32,
        attr_type: AttrType,
    ) -> IndexResult<Self> {
        let meta = tree::read_meta_node(&pool, META_PAGE_ID)?;
        if meta.relation_name != relation_name
            || meta.attr_offset != attr_offset
            || meta.attr_type != attr_type
        {
            return Err(IndexError::BadIndexInfo(format!(
                "index {} was built over {}.{}, not {}.{}",
                index_name, meta.relation_name, meta.attr_offset, relation_name, attr_offset
            )));
        }
        debug!(
            "index {} reopened, root at page {}",
            index_name, meta.root_page_id
        );
        Ok(Self {
            pool,
            root_page_id: meta.root_page_id,
            scan: None,
            index_name,
            leaf_occupancy: node::LEAF_OCCUPANCY,
            node_occupancy: node::NODE_OCCUPANCY,
        })
    }

    /// Canonical name of the index, also the file name under its directory.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Page id of the current root.
    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// The buffer pool backing this index.
    pub fn buffer_pool(&self) -> &BufferPoolManager {
        &self.pool
    }

    /// Greatest number of entries a leaf holds.
    pub fn leaf_occupancy(&self) -> usize {
        self.leaf_occupancy
    }

    /// Greatest number of separator keys an internal node holds.
    pub fn node_occupancy(&self) -> usize {
        self.node_occupancy
    }

    #[cfg(test)]
    pub(crate) fn set_occupancies(&mut self, leaf: usize, node: usize) {
        self.leaf_occupancy = leaf;
        self.node_occupancy = node;
    }

    /// Inserts `(key, rid)`. Duplicate keys are permitted.
    pub fn insert(&mut self, key: i32, rid: Rid) -> IndexResult<()> {
        let config = TreeConfig {
            leaf_occupancy: self.leaf_occupancy,
            node_occupancy: self.node_occupancy,
        };
        if let Some(new_root) = tree::insert_entry(&self.pool, self.root_page_id, key, rid, &config)?
        {
            // The metadata rewrite is the visibility point for the new root:
            // both children are on their pages before it happens.
            let mut meta = tree::read_meta_node(&self.pool, META_PAGE_ID)?;
            meta.root_page_id = new_root;
            tree::write_meta_node(&self.pool, META_PAGE_ID, &meta)?;
            self.root_page_id = new_root;
        }
        Ok(())
    }

    /// Number of levels from the root down to the leaves.
    pub fn height(&self) -> IndexResult<usize> {
        let mut levels = 1;
        let mut page_id = self.root_page_id;
        loop {
            match tree::read_node(&self.pool, page_id)? {
                tree::Node::Leaf(_) => return Ok(levels),
                tree::Node::Internal(internal) => {
                    page_id = internal.children[0];
                    levels += 1;
                }
            }
        }
    }

    /// Total number of entries, counted along the leaf chain.
    pub fn key_count(&self) -> IndexResult<usize> {
        let mut page_id = self.root_page_id;
        loop {
            match tree::read_node(&self.pool, page_id)? {
                tree::Node::Leaf(_) => break,
                tree::Node::Internal(internal) => page_id = internal.children[0],
            }
        }
        let mut total = 0;
        let mut next = Some(page_id);
        while let Some(page_id) = next {
            let leaf = tree::read_leaf_node(&self.pool, page_id)?;
            total += leaf.entries.len();
            next = leaf.right_sibling;
        }
        Ok(total)
    }

    /// Ends any active scan and forces every dirty page to disk.
    pub fn close(mut self) -> IndexResult<()> {
        if self.scan.is_some() {
            let _ = self.end_scan();
        }
        self.pool.flush_all_pages_with_mode(FlushMode::Force)?;
        Ok(())
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        if self.scan.is_some() {
            let _ = self.end_scan();
        }
        let _ = self.pool.flush_all_pages();
    }
}

fn key_at(record: &[u8], attr_offset: u32) -> IndexResult<i32> {
    let start = attr_offset as usize;
    let bytes = record.get(start..start + 4).ok_or_else(|| {
        IndexError::BadIndexInfo(format!(
            "record of {} bytes cannot hold a key at offset {}",
            record.len(),
            attr_offset
        ))
    })?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
