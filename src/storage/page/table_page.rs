use crate::common::{CairnError, Lsn, PageId, Result, Rid, INVALID_LSN, INVALID_PAGE_ID, PAGE_SIZE};

use super::{
    header_page_id, page_lsn, read_i32, read_u32, set_header_page_id, set_page_lsn, write_i32,
    write_u32,
};

/// Table page header layout:
///
/// | Field              | Offset | Size |
/// |--------------------|--------|------|
/// | page_id            | 0      | 4    |
/// | lsn                | 4      | 4    |
/// | prev_page_id       | 8      | 4    |
/// | next_page_id       | 12     | 4    |
/// | free_space_pointer | 16     | 4    |
/// | tuple_count        | 20     | 4    |
///
/// The tuple directory of `{offset: 4, size: 4}` entries grows forward from
/// byte 24; tuple bytes grow backward from the end of the page.
const PREV_PAGE_ID_OFFSET: usize = 8;
const NEXT_PAGE_ID_OFFSET: usize = 12;
const FREE_SPACE_POINTER_OFFSET: usize = 16;
const TUPLE_COUNT_OFFSET: usize = 20;

/// Total size of the table page header
pub const TABLE_PAGE_HEADER_SIZE: usize = 24;

/// Size of one tuple directory entry
const SLOT_SIZE: usize = 8;

/// Bit 31 of a tuple size marks the tuple as deleted
const DELETE_MASK: u32 = 1 << 31;

/// Largest tuple that fits in an empty table page.
pub const MAX_TUPLE_SIZE: usize = PAGE_SIZE - TABLE_PAGE_HEADER_SIZE - SLOT_SIZE;

/// Returns true if a stored tuple size carries the delete flag.
fn is_deleted(size: u32) -> bool {
    size & DELETE_MASK != 0
}

/// Slotted page holding the tuples of a table heap.
///
/// Pages of one table form a doubly linked list through `prev_page_id` and
/// `next_page_id`. Deleting a tuple is two-phase: `mark_delete` flags it and
/// `apply_delete` reclaims its bytes (or `rollback_delete` clears the flag).
pub struct TablePage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> TablePage<B> {
    pub fn new(data: B) -> Self {
        Self { data }
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn page_id(&self) -> PageId {
        header_page_id(self.bytes())
    }

    pub fn lsn(&self) -> Lsn {
        page_lsn(self.bytes())
    }

    /// Returns the previous page ID, or None at the head of the list.
    pub fn prev_page_id(&self) -> Option<PageId> {
        link(read_i32(self.bytes(), PREV_PAGE_ID_OFFSET))
    }

    /// Returns the next page ID, or None at the tail of the list.
    pub fn next_page_id(&self) -> Option<PageId> {
        link(read_i32(self.bytes(), NEXT_PAGE_ID_OFFSET))
    }

    pub fn free_space_pointer(&self) -> usize {
        read_u32(self.bytes(), FREE_SPACE_POINTER_OFFSET) as usize
    }

    /// Number of directory entries, including emptied ones.
    pub fn tuple_count(&self) -> u32 {
        read_u32(self.bytes(), TUPLE_COUNT_OFFSET)
    }

    fn tuple_offset(&self, slot_num: u32) -> usize {
        read_u32(self.bytes(), slot_entry(slot_num)) as usize
    }

    fn raw_tuple_size(&self, slot_num: u32) -> u32 {
        read_u32(self.bytes(), slot_entry(slot_num) + 4)
    }

    /// Bytes between the end of the tuple directory and the first tuple.
    pub fn free_space_remaining(&self) -> usize {
        self.free_space_pointer()
            - TABLE_PAGE_HEADER_SIZE
            - SLOT_SIZE * self.tuple_count() as usize
    }

    /// Returns whether the slot currently holds a tuple flagged as deleted.
    pub fn is_marked_deleted(&self, slot_num: u32) -> bool {
        slot_num < self.tuple_count() && is_deleted(self.raw_tuple_size(slot_num))
    }

    /// Returns the tuple stored in `slot_num`.
    pub fn get_tuple(&self, slot_num: u32) -> Result<&[u8]> {
        if slot_num >= self.tuple_count() {
            return Err(CairnError::InvalidSlot(slot_num));
        }
        let size = self.raw_tuple_size(slot_num);
        if is_deleted(size) {
            return Err(CairnError::TupleDeleted(slot_num));
        }
        if size == 0 {
            return Err(CairnError::InvalidSlot(slot_num));
        }

        let offset = self.tuple_offset(slot_num);
        Ok(&self.bytes()[offset..offset + size as usize])
    }

    /// RIDs of all live tuples on this page, in slot order.
    pub fn rids(&self) -> Vec<Rid> {
        let page_id = self.page_id();
        (0..self.tuple_count())
            .filter(|&slot| {
                let size = self.raw_tuple_size(slot);
                size != 0 && !is_deleted(size)
            })
            .map(|slot| Rid::new(page_id, slot))
            .collect()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> TablePage<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    /// Formats an empty table page linked after `prev_page_id`.
    pub fn init(&mut self, page_id: PageId, prev_page_id: Option<PageId>) {
        set_header_page_id(self.bytes_mut(), page_id);
        set_page_lsn(self.bytes_mut(), INVALID_LSN);
        self.set_prev_page_id(prev_page_id);
        self.set_next_page_id(None);
        self.set_free_space_pointer(PAGE_SIZE);
        self.set_tuple_count(0);
    }

    pub fn set_lsn(&mut self, lsn: Lsn) {
        set_page_lsn(self.bytes_mut(), lsn);
    }

    pub fn set_prev_page_id(&mut self, page_id: Option<PageId>) {
        let value = page_id.unwrap_or(INVALID_PAGE_ID).as_i32();
        write_i32(self.bytes_mut(), PREV_PAGE_ID_OFFSET, value);
    }

    pub fn set_next_page_id(&mut self, page_id: Option<PageId>) {
        let value = page_id.unwrap_or(INVALID_PAGE_ID).as_i32();
        write_i32(self.bytes_mut(), NEXT_PAGE_ID_OFFSET, value);
    }

    fn set_free_space_pointer(&mut self, pointer: usize) {
        write_u32(self.bytes_mut(), FREE_SPACE_POINTER_OFFSET, pointer as u32);
    }

    fn set_tuple_count(&mut self, count: u32) {
        write_u32(self.bytes_mut(), TUPLE_COUNT_OFFSET, count);
    }

    fn set_tuple_offset(&mut self, slot_num: u32, offset: usize) {
        write_u32(self.bytes_mut(), slot_entry(slot_num), offset as u32);
    }

    fn set_tuple_size(&mut self, slot_num: u32, size: u32) {
        write_u32(self.bytes_mut(), slot_entry(slot_num) + 4, size);
    }

    /// Inserts a tuple and returns its RID. Emptied directory entries are
    /// reused before the directory grows.
    pub fn insert_tuple(&mut self, tuple: &[u8]) -> Result<Rid> {
        if tuple.is_empty() {
            return Err(CairnError::PageOverflow {
                tuple_size: 0,
                available: self.free_space_remaining(),
            });
        }

        let count = self.tuple_count();
        let reusable = (0..count).find(|&slot| self.raw_tuple_size(slot) == 0);
        let needed = tuple.len() + if reusable.is_some() { 0 } else { SLOT_SIZE };
        let available = self.free_space_remaining();
        if needed > available {
            return Err(CairnError::PageOverflow {
                tuple_size: tuple.len(),
                available,
            });
        }

        let slot_num = reusable.unwrap_or(count);
        let offset = self.free_space_pointer() - tuple.len();
        self.bytes_mut()[offset..offset + tuple.len()].copy_from_slice(tuple);
        self.set_free_space_pointer(offset);
        self.set_tuple_offset(slot_num, offset);
        self.set_tuple_size(slot_num, tuple.len() as u32);
        if slot_num == count {
            self.set_tuple_count(count + 1);
        }

        Ok(Rid::new(self.page_id(), slot_num))
    }

    /// Flags a tuple as deleted. Returns false if it is already flagged.
    pub fn mark_delete(&mut self, slot_num: u32) -> Result<bool> {
        let size = self.live_slot_size(slot_num)?;
        if is_deleted(size) {
            return Ok(false);
        }
        self.set_tuple_size(slot_num, size | DELETE_MASK);
        Ok(true)
    }

    /// Clears the delete flag set by `mark_delete`.
    pub fn rollback_delete(&mut self, slot_num: u32) -> Result<()> {
        let size = self.live_slot_size(slot_num)?;
        self.set_tuple_size(slot_num, size & !DELETE_MASK);
        Ok(())
    }

    /// Removes a tuple for good and compacts the tuple area. Returns the
    /// removed bytes.
    pub fn apply_delete(&mut self, slot_num: u32) -> Result<Vec<u8>> {
        let size = (self.live_slot_size(slot_num)? & !DELETE_MASK) as usize;
        let offset = self.tuple_offset(slot_num);
        let removed = self.bytes()[offset..offset + size].to_vec();

        let free_ptr = self.free_space_pointer();
        self.bytes_mut().copy_within(free_ptr..offset, free_ptr + size);
        self.set_free_space_pointer(free_ptr + size);
        self.set_tuple_offset(slot_num, 0);
        self.set_tuple_size(slot_num, 0);
        self.shift_offsets_below(offset, size as isize);

        Ok(removed)
    }

    /// Replaces a tuple in place, shifting the tuples stored before it.
    /// Returns the old bytes.
    pub fn update_tuple(&mut self, slot_num: u32, new_tuple: &[u8]) -> Result<Vec<u8>> {
        let size = self.live_slot_size(slot_num)?;
        if is_deleted(size) {
            return Err(CairnError::TupleDeleted(slot_num));
        }
        if new_tuple.is_empty() {
            return Err(CairnError::PageOverflow {
                tuple_size: 0,
                available: self.free_space_remaining(),
            });
        }

        let old_size = size as usize;
        let available = self.free_space_remaining();
        if new_tuple.len() > old_size + available {
            return Err(CairnError::PageOverflow {
                tuple_size: new_tuple.len(),
                available: old_size + available,
            });
        }

        let offset = self.tuple_offset(slot_num);
        let old = self.bytes()[offset..offset + old_size].to_vec();

        // Tuples between the free space pointer and this one slide by the
        // size difference; the new bytes end where the old ones did.
        let delta = old_size as isize - new_tuple.len() as isize;
        let free_ptr = self.free_space_pointer();
        let new_free_ptr = (free_ptr as isize + delta) as usize;
        self.bytes_mut().copy_within(free_ptr..offset, new_free_ptr);
        self.set_free_space_pointer(new_free_ptr);

        self.shift_offsets_below(offset, delta);
        let new_offset = (offset as isize + delta) as usize;
        self.bytes_mut()[new_offset..new_offset + new_tuple.len()].copy_from_slice(new_tuple);
        self.set_tuple_offset(slot_num, new_offset);
        self.set_tuple_size(slot_num, new_tuple.len() as u32);

        Ok(old)
    }

    /// Size field of a slot that holds a tuple (deleted or not).
    fn live_slot_size(&self, slot_num: u32) -> Result<u32> {
        if slot_num >= self.tuple_count() {
            return Err(CairnError::InvalidSlot(slot_num));
        }
        match self.raw_tuple_size(slot_num) {
            0 => Err(CairnError::InvalidSlot(slot_num)),
            size => Ok(size),
        }
    }

    /// Moves the recorded offset of every tuple stored below `offset`.
    fn shift_offsets_below(&mut self, offset: usize, delta: isize) {
        for slot in 0..self.tuple_count() {
            let tuple_offset = self.tuple_offset(slot);
            if self.raw_tuple_size(slot) != 0 && tuple_offset < offset {
                self.set_tuple_offset(slot, (tuple_offset as isize + delta) as usize);
            }
        }
    }
}

fn slot_entry(slot_num: u32) -> usize {
    TABLE_PAGE_HEADER_SIZE + slot_num as usize * SLOT_SIZE
}

fn link(raw: i32) -> Option<PageId> {
    let page_id = PageId::new(raw);
    page_id.is_valid().then_some(page_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_page(data: &mut [u8]) -> TablePage<&mut [u8]> {
        let mut page = TablePage::new(data);
        page.init(PageId::new(3), None);
        page
    }

    #[test]
    fn test_table_page_init() {
        let mut data = [0u8; PAGE_SIZE];
        let page = new_page(&mut data);

        assert_eq!(page.page_id(), PageId::new(3));
        assert_eq!(page.lsn(), INVALID_LSN);
        assert_eq!(page.prev_page_id(), None);
        assert_eq!(page.next_page_id(), None);
        assert_eq!(page.tuple_count(), 0);
        assert_eq!(page.free_space_pointer(), PAGE_SIZE);
        assert_eq!(page.free_space_remaining(), PAGE_SIZE - 24);
    }

    #[test]
    fn test_table_page_header_layout() {
        let mut data = [0u8; PAGE_SIZE];
        {
            let mut page = TablePage::new(&mut data[..]);
            page.init(PageId::new(3), Some(PageId::new(2)));
            page.set_next_page_id(Some(PageId::new(4)));
            page.set_lsn(11);
            page.insert_tuple(b"abcd").unwrap();
        }
        assert_eq!(&data[0..4], &3i32.to_le_bytes());
        assert_eq!(&data[4..8], &11i32.to_le_bytes());
        assert_eq!(&data[8..12], &2i32.to_le_bytes());
        assert_eq!(&data[12..16], &4i32.to_le_bytes());
        assert_eq!(&data[16..20], &((PAGE_SIZE - 4) as u32).to_le_bytes());
        assert_eq!(&data[20..24], &1u32.to_le_bytes());
        assert_eq!(&data[24..28], &((PAGE_SIZE - 4) as u32).to_le_bytes());
        assert_eq!(&data[28..32], &4u32.to_le_bytes());
        assert_eq!(&data[PAGE_SIZE - 4..], b"abcd");
    }

    #[test]
    fn test_table_page_insert_get() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = new_page(&mut data);

        let r0 = page.insert_tuple(b"hello").unwrap();
        let r1 = page.insert_tuple(b"world!").unwrap();
        assert_eq!(r0, Rid::new(PageId::new(3), 0));
        assert_eq!(r1, Rid::new(PageId::new(3), 1));
        assert_eq!(page.get_tuple(0).unwrap(), b"hello");
        assert_eq!(page.get_tuple(1).unwrap(), b"world!");
        assert!(matches!(page.get_tuple(2), Err(CairnError::InvalidSlot(2))));
        assert_eq!(page.free_space_remaining(), PAGE_SIZE - 24 - 16 - 11);
    }

    #[test]
    fn test_table_page_overflow() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = new_page(&mut data);

        let big = vec![1u8; MAX_TUPLE_SIZE];
        page.insert_tuple(&big).unwrap();
        assert_eq!(page.free_space_remaining(), 0);
        assert!(matches!(
            page.insert_tuple(b"x"),
            Err(CairnError::PageOverflow { .. })
        ));
    }

    #[test]
    fn test_table_page_mark_and_rollback_delete() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = new_page(&mut data);
        page.insert_tuple(b"abc").unwrap();

        assert!(page.mark_delete(0).unwrap());
        assert!(!page.mark_delete(0).unwrap());
        assert!(page.is_marked_deleted(0));
        assert!(matches!(page.get_tuple(0), Err(CairnError::TupleDeleted(0))));
        assert!(page.rids().is_empty());

        page.rollback_delete(0).unwrap();
        assert_eq!(page.get_tuple(0).unwrap(), b"abc");
        assert!(matches!(page.mark_delete(5), Err(CairnError::InvalidSlot(5))));
    }

    #[test]
    fn test_table_page_apply_delete_compacts() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = new_page(&mut data);
        page.insert_tuple(b"aaaa").unwrap();
        page.insert_tuple(b"bbbbbb").unwrap();
        page.insert_tuple(b"cc").unwrap();
        let free_before = page.free_space_remaining();

        page.mark_delete(1).unwrap();
        assert_eq!(page.apply_delete(1).unwrap(), b"bbbbbb");
        assert_eq!(page.free_space_remaining(), free_before + 6);
        assert_eq!(page.get_tuple(0).unwrap(), b"aaaa");
        assert_eq!(page.get_tuple(2).unwrap(), b"cc");
        assert!(page.get_tuple(1).is_err());
        assert_eq!(
            page.rids(),
            vec![Rid::new(PageId::new(3), 0), Rid::new(PageId::new(3), 2)]
        );

        // The emptied slot is reused without growing the directory.
        let rid = page.insert_tuple(b"ddd").unwrap();
        assert_eq!(rid.slot_num, 1);
        assert_eq!(page.tuple_count(), 3);
        assert_eq!(page.get_tuple(1).unwrap(), b"ddd");
        assert_eq!(page.get_tuple(2).unwrap(), b"cc");
    }

    #[test]
    fn test_table_page_update_tuple() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = new_page(&mut data);
        page.insert_tuple(b"first").unwrap();
        page.insert_tuple(b"second").unwrap();
        page.insert_tuple(b"third").unwrap();

        assert_eq!(page.update_tuple(1, b"2").unwrap(), b"second");
        assert_eq!(page.get_tuple(0).unwrap(), b"first");
        assert_eq!(page.get_tuple(1).unwrap(), b"2");
        assert_eq!(page.get_tuple(2).unwrap(), b"third");

        assert_eq!(page.update_tuple(0, b"much longer first").unwrap(), b"first");
        assert_eq!(page.get_tuple(0).unwrap(), b"much longer first");
        assert_eq!(page.get_tuple(1).unwrap(), b"2");
        assert_eq!(page.get_tuple(2).unwrap(), b"third");

        page.mark_delete(2).unwrap();
        assert!(matches!(
            page.update_tuple(2, b"x"),
            Err(CairnError::TupleDeleted(2))
        ));
    }

    #[test]
    fn test_table_page_update_too_large() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = new_page(&mut data);
        page.insert_tuple(b"tiny").unwrap();
        let huge = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            page.update_tuple(0, &huge),
            Err(CairnError::PageOverflow { .. })
        ));
        assert_eq!(page.get_tuple(0).unwrap(), b"tiny");
    }
}
