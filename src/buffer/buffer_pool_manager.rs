use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::common::{
    CairnError, FrameId, PageId, Result, StorageConfig, INVALID_PAGE_ID,
};
use crate::storage::disk::DiskManager;
use crate::storage::page::Page;

use super::{ClockReplacer, PageGuard, Replacer};

/// When an unpin callback runs relative to the unpin bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackType {
    /// The caller's pin is still held.
    Before,
    /// Pin count and dirty flag have been updated.
    After,
}

/// Metadata guarded by the pool mutex.
struct PoolState {
    /// Page table: maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Free list: frames that hold no page
    free_list: VecDeque<FrameId>,
    /// Pages whose bytes are moving between a frame and disk
    in_flight: HashSet<PageId>,
}

/// A page being evicted to make room.
#[derive(Clone, Copy)]
struct Victim {
    page_id: PageId,
    dirty: bool,
}

enum InstallError {
    /// Writing the dirty victim back failed; the frame still holds it.
    WriteBack(CairnError),
    /// Reading the requested page failed.
    Read(CairnError),
}

/// BufferPoolManager caches disk pages in a fixed set of frames.
///
/// Metadata (page table, free list, in-flight set) lives behind one mutex
/// that is never held across disk I/O. Page bytes are protected by each
/// page's own latch. Every successful `fetch_page`/`new_page` pins the page
/// once and must be matched by exactly one `unpin_page`.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// The buffer pool frames
    pages: Vec<Arc<Page>>,
    state: Mutex<PoolState>,
    /// Signalled whenever a page leaves the in-flight set
    io_done: Condvar,
    replacer: Box<dyn Replacer>,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames using the clock replacer.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::with_replacer(pool_size, disk_manager, Box::new(ClockReplacer::new(pool_size)))
    }

    /// Creates a pool with a caller-supplied replacement policy.
    pub fn with_replacer(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        let mut pages = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            pages.push(Arc::new(Page::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            pages,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
                in_flight: HashSet::new(),
            }),
            io_done: Condvar::new(),
            replacer,
            disk_manager,
        }
    }

    /// Opens the database described by `config` and builds a pool over it.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        let disk_manager = Arc::new(DiskManager::new(&config.db_path)?);
        Ok(Self::new(config.pool_size, disk_manager))
    }

    /// Fetches a page, reading it from disk if it is not resident, and pins it.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Arc<Page>> {
        if !page_id.is_valid() {
            return Err(CairnError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();
        if let Some(frame_id) = self.resident_frame(&mut state, page_id) {
            let page = &self.pages[frame_id.as_usize()];
            page.pin();
            self.replacer.pin(frame_id);
            trace!(%page_id, %frame_id, "buffer pool hit");
            return Ok(Arc::clone(page));
        }

        debug!(%page_id, "buffer pool miss");
        self.install_page(state, page_id, true)
    }

    /// Allocates a fresh zeroed page and pins it.
    pub fn new_page(&self) -> Result<Arc<Page>> {
        let state = self.state.lock();
        let page = self.install_page(state, INVALID_PAGE_ID, false)?;
        debug!(page_id = %page.page_id(), "new page");
        Ok(page)
    }

    /// Fetches a page wrapped in a guard that unpins it on drop.
    pub fn fetch_page_guarded(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        let page = self.fetch_page(page_id)?;
        Ok(PageGuard::new(self, page))
    }

    /// Allocates a new page wrapped in a guard that unpins it on drop.
    pub fn new_page_guarded(&self) -> Result<PageGuard<'_>> {
        let page = self.new_page()?;
        Ok(PageGuard::new(self, page))
    }

    /// Releases one pin on a page, OR-ing `is_dirty` into its dirty flag.
    ///
    /// `callback` is invoked with [`CallbackType::Before`] while the caller's
    /// pin is still held and with [`CallbackType::After`] once the pin has
    /// been released. Returns false if the page is not resident or was not
    /// pinned, in which case the callback is never invoked.
    pub fn unpin_page(
        &self,
        page_id: PageId,
        is_dirty: bool,
        mut callback: Option<&mut dyn FnMut(CallbackType, PageId)>,
    ) -> bool {
        if let Some(cb) = callback.as_mut() {
            // A caller holding a pin keeps the page resident until it unpins
            let pinned = {
                let state = self.state.lock();
                state
                    .page_table
                    .get(&page_id)
                    .is_some_and(|frame_id| self.pages[frame_id.as_usize()].pin_count() > 0)
            };
            if !pinned {
                warn!(%page_id, "unpin of a page that is not pinned, skipping callback");
                return false;
            }
            cb(CallbackType::Before, page_id);
        }

        let unpinned = {
            let state = self.state.lock();
            match state.page_table.get(&page_id) {
                None => {
                    warn!(%page_id, "unpin of a page that is not resident");
                    false
                }
                Some(&frame_id) => {
                    let page = &self.pages[frame_id.as_usize()];
                    match page.unpin() {
                        None => {
                            warn!(%page_id, "unpin without matching pin");
                            false
                        }
                        Some(remaining) => {
                            if is_dirty {
                                page.set_dirty(true);
                            }
                            if remaining == 0 {
                                self.replacer.unpin(frame_id);
                            }
                            true
                        }
                    }
                }
            }
        };

        if unpinned {
            if let Some(cb) = callback.as_mut() {
                cb(CallbackType::After, page_id);
            }
        }
        unpinned
    }

    /// Removes a page from the pool and deallocates it on disk.
    /// Returns false if the page is pinned.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.state.lock();
        if let Some(frame_id) = self.resident_frame(&mut state, page_id) {
            let page = &self.pages[frame_id.as_usize()];
            if page.pin_count() > 0 {
                warn!(%page_id, pin_count = page.pin_count(), "refusing to delete a pinned page");
                return false;
            }

            state.page_table.remove(&page_id);
            self.replacer.pin(frame_id);
            {
                let mut data = page.write();
                page.reset(&mut data);
            }
            state.free_list.push_back(frame_id);
        }
        drop(state);

        self.disk_manager.deallocate_page(page_id);
        true
    }

    /// Writes a resident page to disk regardless of its dirty flag, then
    /// clears the flag. Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let page = {
            let mut state = self.state.lock();
            match self.resident_frame(&mut state, page_id) {
                None => return Ok(false),
                Some(frame_id) => {
                    let page = &self.pages[frame_id.as_usize()];
                    page.pin();
                    self.replacer.pin(frame_id);
                    Arc::clone(page)
                }
            }
        };

        let result = {
            let data = page.read();
            let result = self.disk_manager.write_page(page_id, &data[..]);
            if result.is_ok() {
                page.set_dirty(false);
            }
            result
        };

        self.unpin_page(page_id, false, None);
        result.map(|_| true)
    }

    /// Flushes every resident page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        for page_id in self.resident_pages() {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Returns the pin count for a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.pages[frame_id.as_usize()].pin_count())
    }

    /// Returns the dirty flag for a resident page.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.pages[frame_id.as_usize()].is_dirty())
    }

    /// Returns the IDs of all resident pages, sorted.
    pub fn resident_pages(&self) -> Vec<PageId> {
        let state = self.state.lock();
        let mut ids: Vec<_> = state.page_table.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Returns the number of frames the replacer may evict.
    pub fn evictable_count(&self) -> usize {
        self.replacer.size()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Looks up a resident page, waiting out any I/O in flight for it.
    fn resident_frame(
        &self,
        state: &mut MutexGuard<'_, PoolState>,
        page_id: PageId,
    ) -> Option<FrameId> {
        while state.in_flight.contains(&page_id) {
            self.io_done.wait(state);
        }
        state.page_table.get(&page_id).copied()
    }

    /// Gets a frame, either from the free list or by evicting a page.
    /// A dirty victim is marked in flight until its write-back finishes.
    fn take_frame(&self, state: &mut PoolState) -> Result<(FrameId, Option<Victim>)> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok((frame_id, None));
        }

        let Some(frame_id) = self.replacer.victim() else {
            warn!(pool_size = self.pool_size, "buffer pool exhausted, every frame is pinned");
            return Err(CairnError::BufferPoolFull);
        };

        let page = &self.pages[frame_id.as_usize()];
        let victim = Victim {
            page_id: page.page_id(),
            dirty: page.is_dirty(),
        };
        state.page_table.remove(&victim.page_id);
        if victim.dirty {
            state.in_flight.insert(victim.page_id);
        }
        debug!(victim = %victim.page_id, %frame_id, dirty = victim.dirty, "evicting page");

        Ok((frame_id, Some(victim)))
    }

    /// Claims a frame for `page_id` (or a newly allocated id when `load` is
    /// false), then does the disk I/O with the pool mutex released.
    fn install_page(
        &self,
        mut state: MutexGuard<'_, PoolState>,
        page_id: PageId,
        load: bool,
    ) -> Result<Arc<Page>> {
        let (frame_id, victim) = self.take_frame(&mut state)?;
        let page_id = if load {
            page_id
        } else {
            self.disk_manager.allocate_page()
        };

        let page = Arc::clone(&self.pages[frame_id.as_usize()]);
        state.page_table.insert(page_id, frame_id);
        state.in_flight.insert(page_id);
        page.set_page_id(page_id);
        page.set_pin_count(1);
        page.set_dirty(false);
        drop(state);

        let result = self.transfer(&page, page_id, victim, load);

        let mut state = self.state.lock();
        state.in_flight.remove(&page_id);
        if let Some(victim) = victim {
            state.in_flight.remove(&victim.page_id);
        }

        let outcome = match result {
            Ok(()) => {
                self.replacer.pin(frame_id);
                Ok(page)
            }
            Err(InstallError::WriteBack(e)) => {
                state.page_table.remove(&page_id);
                if let Some(victim) = victim {
                    // The frame still holds the victim's bytes; put it back.
                    state.page_table.insert(victim.page_id, frame_id);
                    page.set_page_id(victim.page_id);
                    page.set_pin_count(0);
                    page.set_dirty(true);
                    self.replacer.unpin(frame_id);
                }
                if !load {
                    self.disk_manager.deallocate_page(page_id);
                }
                Err(e)
            }
            Err(InstallError::Read(e)) => {
                state.page_table.remove(&page_id);
                page.set_page_id(INVALID_PAGE_ID);
                page.set_pin_count(0);
                state.free_list.push_back(frame_id);
                Err(e)
            }
        };
        drop(state);
        self.io_done.notify_all();
        outcome
    }

    /// Writes back the victim (if dirty) and fills the frame for `page_id`.
    fn transfer(
        &self,
        page: &Page,
        page_id: PageId,
        victim: Option<Victim>,
        load: bool,
    ) -> std::result::Result<(), InstallError> {
        let mut data = page.write();

        if let Some(victim) = victim.filter(|v| v.dirty) {
            self.disk_manager
                .write_page(victim.page_id, &data[..])
                .map_err(InstallError::WriteBack)?;
        }

        if load {
            self.disk_manager
                .read_page(page_id, &mut data[..])
                .map_err(InstallError::Read)?;
        } else {
            data.fill(0);
        }
        Ok(())
    }
}
