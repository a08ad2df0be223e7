use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::page::Page;
use crate::replacer::{FrameId, LRUReplacer, Replacer};
use crate::{DiskManager, PAGE_SIZE, PageId};

/// Errors returned by the buffer pool manager.
#[derive(Debug, Error)]
pub enum BufferPoolError {
    /// The buffer pool lock was poisoned.
    #[error("buffer pool lock poisoned")]
    LockPoisoned,
    /// The underlying disk manager failed.
    #[error("disk manager error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for buffer pool results.
pub type BufferPoolResult<T> = Result<T, BufferPoolError>;

/// Guard that provides access to a pinned page while holding the pool lock.
///
/// Dropping the guard releases the lock only; the pin taken by `fetch_page`
/// or `new_page` stays until `unpin_page`, which is what lets a caller keep
/// a page pinned across operations without holding the pool hostage.
pub struct PageGuard<'a> {
    state: MutexGuard<'a, BufferPoolState>,
    frame_id: FrameId,
}

impl<'a> PageGuard<'a> {
    /// Returns the frame id backing this guard.
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for PageGuard<'_> {
    type Target = Page;

    fn deref(&self) -> &Self::Target {
        &self.state.pages[self.frame_id]
    }
}

impl DerefMut for PageGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state.pages[self.frame_id]
    }
}

struct BufferPoolState {
    disk_manager: DiskManager,
    replacer: LRUReplacer,
    pages: Vec<Page>,
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
}

/// Buffer pool manager for caching pages between disk and memory.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<Mutex<BufferPoolState>>,
}

/// Flush mode for buffer pool writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Defer disk sync to later (default behavior).
    Lazy,
    /// Force the disk write to be synced.
    Force,
}

impl BufferPoolManager {
    /// Creates a new buffer pool manager with a fixed number of frames.
    pub fn new(disk_manager: DiskManager, pool_size: usize) -> Self {
        let pages = vec![Page::new(); pool_size];
        let free_list = (0..pool_size).rev().collect();
        let state = BufferPoolState {
            disk_manager,
            replacer: LRUReplacer::new(pool_size),
            pages,
            page_table: HashMap::new(),
            free_list,
        };
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn lock_state(&self) -> BufferPoolResult<MutexGuard<'_, BufferPoolState>> {
        self.inner.lock().map_err(|_| BufferPoolError::LockPoisoned)
    }

    /// Number of pages currently held with a nonzero pin count. Every public
    /// tree operation is expected to leave this at zero, except for the one
    /// leaf an active scan keeps pinned.
    pub fn pinned_page_count(&self) -> BufferPoolResult<usize> {
        let state = self.lock_state()?;
        Ok(state
            .pages
            .iter()
            .filter(|page| page.page_id.is_some() && page.pin_count > 0)
            .count())
    }

    fn evict_if_needed(state: &mut BufferPoolState, frame_id: FrameId) -> BufferPoolResult<()> {
        let (disk_manager, pages, page_table) = (
            &mut state.disk_manager,
            &mut state.pages,
            &mut state.page_table,
        );
        if let Some(old_page_id) = pages[frame_id].page_id {
            if pages[frame_id].is_dirty {
                let data = pages[frame_id].bytes();
                disk_manager.write_page(old_page_id, data)?;
            }
            page_table.remove(&old_page_id);
        }
        Ok(())
    }

    fn flush_page_data(
        state: &mut BufferPoolState,
        page_id: PageId,
        data: &[u8; PAGE_SIZE],
        force_disk: bool,
    ) -> BufferPoolResult<()> {
        state.disk_manager.write_page(page_id, data)?;
        if force_disk {
            state.disk_manager.sync_data()?;
        }
        Ok(())
    }

    /// Allocates a new zero-filled page on disk and pins it in the pool.
    pub fn new_page(&self) -> BufferPoolResult<Option<PageId>> {
        let mut state = self.lock_state()?;
        let frame_id = if let Some(frame_id) = state.free_list.pop() {
            frame_id
        } else if let Some(frame_id) = state.replacer.victim() {
            frame_id
        } else {
            return Ok(None);
        };

        Self::evict_if_needed(&mut state, frame_id)?;

        let page_id = state.disk_manager.allocate_page()?;
        {
            let page = &mut state.pages[frame_id];
            page.clear();
            page.page_id = Some(page_id);
            page.pin_count = 1;
        }
        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);
        Ok(Some(page_id))
    }

    /// Fetches a page into memory and pins it, returning a guarded reference.
    pub fn fetch_page(&self, page_id: PageId) -> BufferPoolResult<Option<PageGuard<'_>>> {
        let mut state = self.lock_state()?;
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let page = &mut state.pages[frame_id];
            page.pin_count += 1;
            state.replacer.pin(frame_id);
            return Ok(Some(PageGuard { state, frame_id }));
        }

        let frame_id = if let Some(frame_id) = state.free_list.pop() {
            frame_id
        } else if let Some(frame_id) = state.replacer.victim() {
            frame_id
        } else {
            return Ok(None);
        };

        Self::evict_if_needed(&mut state, frame_id)?;
        {
            let state = &mut *state;
            let (disk_manager, pages) = (&mut state.disk_manager, &mut state.pages);
            let page = &mut pages[frame_id];
            page.clear();
            disk_manager.read_page(page_id, page.bytes_mut())?;
            page.page_id = Some(page_id);
            page.pin_count = 1;
        }
        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);
        Ok(Some(PageGuard { state, frame_id }))
    }

    /// Unpins a page and optionally marks it dirty.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> BufferPoolResult<bool> {
        let mut state = self.lock_state()?;
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        let page = &mut state.pages[frame_id];
        if page.pin_count == 0 {
            return Ok(false);
        }
        if is_dirty {
            page.is_dirty = true;
        }
        page.pin_count -= 1;
        if page.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
        Ok(true)
    }

    /// Flushes a page to disk, if present.
    pub fn flush_page(&self, page_id: PageId) -> BufferPoolResult<bool> {
        self.flush_page_with_mode(page_id, FlushMode::Lazy)
    }

    pub fn flush_page_with_mode(&self, page_id: PageId, mode: FlushMode) -> BufferPoolResult<bool> {
        let mut state = self.lock_state()?;
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        let data = {
            let page = &mut state.pages[frame_id];
            let data = *page.bytes();
            page.is_dirty = false;
            data
        };
        Self::flush_page_data(&mut state, page_id, &data, mode == FlushMode::Force)?;
        Ok(true)
    }

    /// Flushes all dirty pages to disk.
    pub fn flush_all_pages(&self) -> BufferPoolResult<()> {
        self.flush_all_pages_with_mode(FlushMode::Lazy)
    }

    pub fn flush_all_pages_with_mode(&self, mode: FlushMode) -> BufferPoolResult<()> {
        let mut state = self.lock_state()?;
        let page_ids = state
            .pages
            .iter()
            .filter_map(|page| page.page_id)
            .collect::<Vec<_>>();
        for page_id in page_ids {
            let frame_id = match state.page_table.get(&page_id) {
                Some(&frame_id) => frame_id,
                None => continue,
            };
            let (data, is_dirty) = {
                let page = &mut state.pages[frame_id];
                let data = *page.bytes();
                let is_dirty = page.is_dirty;
                page.is_dirty = false;
                (data, is_dirty)
            };
            if !is_dirty {
                continue;
            }
            Self::flush_page_data(&mut state, page_id, &data, false)?;
        }
        if mode == FlushMode::Force {
            state.disk_manager.sync_data()?;
        }
        Ok(())
    }
}
