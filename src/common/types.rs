use std::fmt;

/// Page identifier type - uniquely identifies a page on disk.
/// Negative values are never allocated; `-1` is the invalid sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub i32);

impl PageId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }

    /// Byte offset of this page inside the data file.
    pub fn file_offset(&self, page_size: usize) -> u64 {
        (self.0 as u64) * (page_size as u64)
    }

    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({})", self.0)
    }
}

/// Frame identifier type - identifies a buffer frame in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

impl FrameId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

/// Row identifier - the page holding a tuple plus its slot number.
///
/// Packs into a single `i64`: the page id in the high 32 bits and the slot
/// number in the low 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rid {
    pub page_id: PageId,
    pub slot_num: u32,
}

impl Rid {
    /// Size of an encoded RID in bytes.
    pub const SIZE: usize = 8;

    pub fn new(page_id: PageId, slot_num: u32) -> Self {
        Self { page_id, slot_num }
    }

    pub fn from_i64(rid: i64) -> Self {
        Self {
            page_id: PageId::new((rid >> 32) as i32),
            slot_num: rid as u32,
        }
    }

    pub fn as_i64(&self) -> i64 {
        ((self.page_id.as_i32() as i64) << 32) | self.slot_num as i64
    }

    pub fn is_valid(&self) -> bool {
        self.page_id.is_valid()
    }
}

impl Default for Rid {
    fn default() -> Self {
        Self::new(super::INVALID_PAGE_ID, 0)
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rid(page: {}, slot: {})", self.page_id.0, self.slot_num)
    }
}

/// LSN (Log Sequence Number) stamped into every page header
pub type Lsn = i32;

/// Invalid LSN constant
pub const INVALID_LSN: Lsn = -1;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::INVALID_PAGE_ID;

    #[test]
    fn test_rid_packs_page_and_slot() {
        let rid = Rid::new(PageId::new(10), 14);
        assert_eq!(rid.as_i64(), (10i64 << 32) | 14);
        assert_eq!(Rid::from_i64(rid.as_i64()), rid);
    }

    #[test]
    fn test_rid_round_trip_extremes() {
        for rid in [
            Rid::new(PageId::new(0), 0),
            Rid::new(PageId::new(i32::MAX), u32::MAX),
            Rid::new(PageId::new(7), u32::MAX),
            Rid::default(),
        ] {
            assert_eq!(Rid::from_i64(rid.as_i64()), rid);
        }
    }

    #[test]
    fn test_rid_default_is_invalid() {
        let rid = Rid::default();
        assert_eq!(rid.page_id, INVALID_PAGE_ID);
        assert_eq!(rid.slot_num, 0);
        assert!(!rid.is_valid());
    }
}
