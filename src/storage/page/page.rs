use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use crate::common::{
    FrameId, LatchReadGuard, LatchWriteGuard, Lsn, PageId, ReaderWriterLatch, INVALID_PAGE_ID,
    PAGE_SIZE,
};

use super::{read_i32, write_i32};

/// Offset of the page id in every page header.
pub const PAGE_ID_OFFSET: usize = 0;
/// Offset of the LSN in every page header.
pub const LSN_OFFSET: usize = 4;
/// Size of the header shared by every page kind.
pub const PAGE_HEADER_SIZE: usize = 8;

/// Raw page bytes as stored in a frame.
pub type PageData = Box<[u8; PAGE_SIZE]>;

/// Page is a single buffer frame: the bytes of one disk page plus the
/// bookkeeping the buffer pool keeps about it.
///
/// The bytes sit behind the page's own reader/writer latch. Pin count, dirty
/// flag and resident page id are maintained by the buffer pool.
pub struct Page {
    /// The frame ID (index in the buffer pool)
    frame_id: FrameId,
    /// The page ID stored in this frame (INVALID_PAGE_ID if empty)
    page_id: AtomicI32,
    /// Pin count - number of callers currently holding this page
    pin_count: AtomicU32,
    /// Whether the page has been modified since being read from disk
    is_dirty: AtomicBool,
    data: ReaderWriterLatch<PageData>,
}

impl Page {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicI32::new(INVALID_PAGE_ID.as_i32()),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: ReaderWriterLatch::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the page ID held by this frame.
    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::Acquire))
    }

    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.as_i32(), Ordering::Release);
    }

    /// Returns the current pin count.
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the pin count was already 0.
    pub(crate) fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    pub(crate) fn set_pin_count(&self, count: u32) {
        self.pin_count.store(count, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Takes the page's read latch.
    pub fn read(&self) -> LatchReadGuard<'_, PageData> {
        self.data.read()
    }

    /// Takes the page's write latch.
    pub fn write(&self) -> LatchWriteGuard<'_, PageData> {
        self.data.write()
    }

    /// Returns the LSN stored in the page header.
    pub fn lsn(&self) -> Lsn {
        page_lsn(&self.data.read()[..])
    }

    /// Stamps an LSN into the page header.
    pub fn set_lsn(&self, lsn: Lsn) {
        set_page_lsn(&mut self.data.write()[..], lsn);
    }

    /// Clears the frame back to its free state.
    pub(crate) fn reset(&self, data: &mut PageData) {
        data.fill(0);
        self.set_page_id(INVALID_PAGE_ID);
        self.set_pin_count(0);
        self.set_dirty(false);
    }
}

/// Reads the page id from a page header.
pub fn header_page_id(data: &[u8]) -> PageId {
    PageId::new(read_i32(data, PAGE_ID_OFFSET))
}

/// Writes the page id into a page header.
pub fn set_header_page_id(data: &mut [u8], page_id: PageId) {
    write_i32(data, PAGE_ID_OFFSET, page_id.as_i32());
}

/// Reads the LSN from a page header.
pub fn page_lsn(data: &[u8]) -> Lsn {
    read_i32(data, LSN_OFFSET)
}

/// Writes the LSN into a page header.
pub fn set_page_lsn(data: &mut [u8], lsn: Lsn) {
    write_i32(data, LSN_OFFSET, lsn);
}
