//! Paged storage substrate: a page file on disk plus a buffer pool that
//! pins fixed-size pages in memory for callers.
//!
//! `DiskManager` owns the file and hands out monotonically increasing page
//! ids; `BufferPoolManager` caches pages in frames and enforces the
//! pin/unpin contract; `Replacer` decides which unpinned frame to evict.

mod buffer;
mod disk;
mod page;
mod replacer;

pub use buffer::{BufferPoolError, BufferPoolManager, BufferPoolResult, FlushMode, PageGuard};
pub use disk::{DiskManager, INVALID_PAGE_ID, PAGE_SIZE, PageId};
pub use page::Page;
pub use replacer::{FrameId, LRUReplacer, Replacer};
