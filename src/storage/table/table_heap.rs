use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::buffer::{BufferPoolManager, CallbackType};
use crate::common::{CairnError, Lsn, PageId, Result, Rid};
use crate::storage::page::{Page, TablePage, MAX_TUPLE_SIZE};

/// Hands out log sequence numbers for pages a table heap modifies.
///
/// This is the only piece of the write-ahead log the heap depends on.
pub trait LsnSource: Send + Sync {
    fn next_lsn(&self) -> Lsn;
}

/// TableHeap stores the tuples of one table in a doubly linked list of
/// table pages, all accessed through the buffer pool.
pub struct TableHeap {
    bpm: Arc<BufferPoolManager>,
    first_page_id: PageId,
    lsn_source: Option<Arc<dyn LsnSource>>,
    /// Serializes inserts so two threads never extend the list at once
    append_latch: Mutex<()>,
}

impl TableHeap {
    /// Creates a heap with a single empty page.
    pub fn create(
        bpm: Arc<BufferPoolManager>,
        lsn_source: Option<Arc<dyn LsnSource>>,
    ) -> Result<Self> {
        let page = bpm.new_page()?;
        let first_page_id = page.page_id();
        {
            let mut data = page.write();
            TablePage::new(&mut data[..]).init(first_page_id, None);
        }

        let heap = Self::open(bpm, first_page_id, lsn_source);
        heap.release(&page, true);
        debug!(%first_page_id, "created table heap");
        Ok(heap)
    }

    /// Opens an existing heap whose list starts at `first_page_id`.
    pub fn open(
        bpm: Arc<BufferPoolManager>,
        first_page_id: PageId,
        lsn_source: Option<Arc<dyn LsnSource>>,
    ) -> Self {
        Self {
            bpm,
            first_page_id,
            lsn_source,
            append_latch: Mutex::new(()),
        }
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Inserts a tuple into the first page with room, appending a page to
    /// the end of the list when none has any.
    pub fn insert_tuple(&self, tuple: &[u8]) -> Result<Rid> {
        if tuple.len() > MAX_TUPLE_SIZE {
            return Err(CairnError::PageOverflow {
                tuple_size: tuple.len(),
                available: MAX_TUPLE_SIZE,
            });
        }

        let _append = self.append_latch.lock();
        let mut page_id = self.first_page_id;
        loop {
            let page = self.bpm.fetch_page(page_id)?;
            let (outcome, next) = {
                let mut data = page.write();
                let mut table_page = TablePage::new(&mut data[..]);
                (table_page.insert_tuple(tuple), table_page.next_page_id())
            };

            match outcome {
                Ok(rid) => {
                    self.release(&page, true);
                    return Ok(rid);
                }
                Err(CairnError::PageOverflow { .. }) => match next {
                    Some(next_page_id) => {
                        self.release(&page, false);
                        page_id = next_page_id;
                    }
                    None => {
                        let appended = self.append_page(&page);
                        self.release(&page, appended.is_ok());
                        page_id = appended?;
                    }
                },
                Err(e) => {
                    self.release(&page, false);
                    return Err(e);
                }
            }
        }
    }

    /// Links a fresh page after `tail` and returns its id.
    fn append_page(&self, tail: &Page) -> Result<PageId> {
        let page = self.bpm.new_page()?;
        let page_id = page.page_id();
        {
            let mut data = page.write();
            TablePage::new(&mut data[..]).init(page_id, Some(tail.page_id()));
        }
        {
            let mut data = tail.write();
            TablePage::new(&mut data[..]).set_next_page_id(Some(page_id));
        }
        self.release(&page, true);
        debug!(%page_id, prev = %tail.page_id(), "appended table page");
        Ok(page_id)
    }

    /// Returns a copy of the tuple at `rid`.
    pub fn get_tuple(&self, rid: Rid) -> Result<Vec<u8>> {
        let page = self.fetch(rid)?;
        let result = {
            let data = page.read();
            TablePage::new(&data[..])
                .get_tuple(rid.slot_num)
                .map(|tuple| tuple.to_vec())
        };
        self.release(&page, false);
        result
    }

    /// Flags a tuple as deleted. Returns false if it already was.
    pub fn mark_delete(&self, rid: Rid) -> Result<bool> {
        self.modify(rid, |page| page.mark_delete(rid.slot_num))
    }

    /// Undoes `mark_delete`.
    pub fn rollback_delete(&self, rid: Rid) -> Result<()> {
        self.modify(rid, |page| page.rollback_delete(rid.slot_num))
    }

    /// Physically removes a tuple and returns its bytes.
    pub fn apply_delete(&self, rid: Rid) -> Result<Vec<u8>> {
        self.modify(rid, |page| page.apply_delete(rid.slot_num))
    }

    /// Replaces a tuple in place and returns the old bytes. Fails with
    /// `PageOverflow` if the page cannot hold the new version.
    pub fn update_tuple(&self, rid: Rid, tuple: &[u8]) -> Result<Vec<u8>> {
        self.modify(rid, |page| page.update_tuple(rid.slot_num, tuple))
    }

    /// Collects the RIDs of every live tuple, following the page list.
    pub fn rids(&self) -> Result<Vec<Rid>> {
        let mut rids = Vec::new();
        let mut next = Some(self.first_page_id);
        while let Some(page_id) = next {
            let page = self.bpm.fetch_page(page_id)?;
            {
                let data = page.read();
                let table_page = TablePage::new(&data[..]);
                rids.extend(table_page.rids());
                next = table_page.next_page_id();
            }
            self.release(&page, false);
        }
        Ok(rids)
    }

    fn fetch(&self, rid: Rid) -> Result<Arc<Page>> {
        if !rid.is_valid() {
            return Err(CairnError::InvalidPageId(rid.page_id));
        }
        self.bpm.fetch_page(rid.page_id)
    }

    fn modify<T>(
        &self,
        rid: Rid,
        op: impl FnOnce(&mut TablePage<&mut [u8]>) -> Result<T>,
    ) -> Result<T> {
        let page = self.fetch(rid)?;
        let result = {
            let mut data = page.write();
            op(&mut TablePage::new(&mut data[..]))
        };
        self.release(&page, result.is_ok());
        result
    }

    /// Unpins a page, stamping a fresh LSN first if it was modified.
    /// The page latch must not be held.
    fn release(&self, page: &Page, is_dirty: bool) {
        let page_id = page.page_id();
        match &self.lsn_source {
            Some(source) if is_dirty => {
                let mut stamp = |when: CallbackType, _: PageId| {
                    if when == CallbackType::Before {
                        page.set_lsn(source.next_lsn());
                    }
                };
                self.bpm.unpin_page(page_id, true, Some(&mut stamp));
            }
            _ => {
                self.bpm.unpin_page(page_id, is_dirty, None);
            }
        }
    }
}
