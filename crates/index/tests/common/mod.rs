#![allow(dead_code)]

use index::{AttrType, BTreeIndex, DEFAULT_POOL_SIZE, IndexError, IndexResult, RelationSource, Rid};
use tempfile::TempDir;

/// Byte offset of the key within the fixture records.
pub const ATTR_OFFSET: u32 = 4;

const RECORD_LEN: usize = 16;

pub fn rid_for(key: i32) -> Rid {
    Rid {
        page_id: key as u32,
        slot_id: 0,
    }
}

pub fn record_for(key: i32) -> Vec<u8> {
    let mut record = vec![0u8; RECORD_LEN];
    record[ATTR_OFFSET as usize..ATTR_OFFSET as usize + 4].copy_from_slice(&key.to_le_bytes());
    record
}

/// In-memory relation whose records carry the key at `ATTR_OFFSET`.
pub struct MemRelation {
    records: Vec<(Rid, Vec<u8>)>,
    cursor: usize,
}

impl MemRelation {
    pub fn new(keys: &[i32]) -> Self {
        let records = keys
            .iter()
            .map(|&key| (rid_for(key), record_for(key)))
            .collect();
        Self { records, cursor: 0 }
    }
}

impl RelationSource for MemRelation {
    fn next_record(&mut self) -> IndexResult<Option<(Rid, Vec<u8>)>> {
        match self.records.get(self.cursor) {
            Some(item) => {
                self.cursor += 1;
                Ok(Some(item.clone()))
            }
            None => Ok(None),
        }
    }
}

/// Relation source for reopen tests: an existing index must never scan it.
pub struct MustNotScan;

impl RelationSource for MustNotScan {
    fn next_record(&mut self) -> IndexResult<Option<(Rid, Vec<u8>)>> {
        panic!("an existing index must not rebuild from the relation");
    }
}

pub fn build_index(dir: &TempDir, keys: &[i32]) -> BTreeIndex {
    let mut source = MemRelation::new(keys);
    BTreeIndex::open(
        dir.path(),
        "relation",
        ATTR_OFFSET,
        AttrType::Integer,
        &mut source,
        DEFAULT_POOL_SIZE,
    )
    .expect("index build failed")
}

pub fn reopen_index(dir: &TempDir) -> IndexResult<BTreeIndex> {
    BTreeIndex::open(
        dir.path(),
        "relation",
        ATTR_OFFSET,
        AttrType::Integer,
        &mut MustNotScan,
        DEFAULT_POOL_SIZE,
    )
}

/// Drains an active scan, returning every yielded rid.
pub fn drain(index: &mut BTreeIndex) -> Vec<Rid> {
    let mut rids = Vec::new();
    loop {
        match index.scan_next() {
            Ok(rid) => rids.push(rid),
            Err(IndexError::IndexScanCompleted) => return rids,
            Err(err) => panic!("scan failed: {err}"),
        }
    }
}
