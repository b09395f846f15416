use std::cell::Cell;
use std::ops::Deref;
use std::sync::Arc;

use crate::common::{LatchReadGuard, LatchWriteGuard, PageId};
use crate::storage::page::{Page, PageData};

use super::BufferPoolManager;

/// RAII pin on a buffer pool page.
///
/// Dropping the guard unpins the page, passing along whether it was written
/// through [`PageGuard::write`] or flagged with [`PageGuard::mark_dirty`].
/// The page latch is taken separately for each access, so a guard can be held
/// across several short read/write sections.
pub struct PageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page: Arc<Page>,
    page_id: PageId,
    is_dirty: Cell<bool>,
}

impl<'a> PageGuard<'a> {
    pub(crate) fn new(bpm: &'a BufferPoolManager, page: Arc<Page>) -> Self {
        let page_id = page.page_id();
        Self {
            bpm,
            page,
            page_id,
            is_dirty: Cell::new(false),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Takes the page's read latch.
    pub fn read(&self) -> LatchReadGuard<'_, PageData> {
        self.page.read()
    }

    /// Takes the page's write latch and marks the page dirty.
    pub fn write(&self) -> LatchWriteGuard<'_, PageData> {
        self.is_dirty.set(true);
        self.page.write()
    }

    /// Marks the page dirty without writing through the guard.
    pub fn mark_dirty(&self) {
        self.is_dirty.set(true);
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.get()
    }
}

impl Deref for PageGuard<'_> {
    type Target = Page;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.bpm
            .unpin_page(self.page_id, self.is_dirty.get(), None);
    }
}
