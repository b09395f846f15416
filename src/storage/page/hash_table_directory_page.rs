use std::collections::HashMap;

use tracing::{debug, error};

use crate::common::{
    CairnError, Lsn, PageId, Result, DIRECTORY_ARRAY_SIZE, INVALID_PAGE_ID, MAX_GLOBAL_DEPTH,
};

use super::{
    header_page_id, page_lsn, read_i32, read_u32, set_header_page_id, set_page_lsn, write_i32,
    write_u32,
};

/// Directory page layout:
///
/// | Field           | Offset | Size      |
/// |-----------------|--------|-----------|
/// | page_id         | 0      | 4         |
/// | lsn             | 4      | 4         |
/// | global_depth    | 8      | 4         |
/// | local_depths    | 12     | 512 x 1   |
/// | bucket_page_ids | 524    | 512 x 4   |
///
/// The remaining 1524 bytes are unused.
const GLOBAL_DEPTH_OFFSET: usize = 8;
const LOCAL_DEPTHS_OFFSET: usize = 12;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE;

/// Extendible hashing directory over a raw page buffer.
///
/// Slot `i` of the directory maps hashes whose low `global_depth` bits equal
/// `i` to a bucket page; each slot also records the local depth of that
/// bucket. The view does no latching of its own.
pub struct HashTableDirectoryPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> HashTableDirectoryPage<B> {
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

    /// Lookup a bucket page using a directory index.
    pub fn bucket_page_id(&self, bucket_idx: u32) -> PageId {
        PageId::new(read_i32(
            self.bytes(),
            BUCKET_PAGE_IDS_OFFSET + bucket_idx as usize * 4,
        ))
    }

    pub fn global_depth(&self) -> u32 {
        read_u32(self.bytes(), GLOBAL_DEPTH_OFFSET)
    }

    /// Mask of `global_depth` ones from the LSB upwards.
    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth()) - 1
    }

    pub fn local_depth(&self, bucket_idx: u32) -> u32 {
        self.bytes()[LOCAL_DEPTHS_OFFSET + bucket_idx as usize] as u32
    }

    /// Mask of the bucket's local depth ones from the LSB upwards.
    pub fn local_depth_mask(&self, bucket_idx: u32) -> u32 {
        (1u32 << self.local_depth(bucket_idx)) - 1
    }

    /// The highest hash bit that distinguishes this bucket from its split
    /// image, or 0 for a bucket of local depth 0.
    pub fn local_high_bit(&self, bucket_idx: u32) -> u32 {
        match self.local_depth(bucket_idx) {
            0 => 0,
            depth => 1 << (depth - 1),
        }
    }

    /// Directory index of the bucket this one was split from (or with).
    pub fn split_image_index(&self, bucket_idx: u32) -> u32 {
        bucket_idx ^ self.local_high_bit(bucket_idx)
    }

    /// Number of directory slots in use.
    pub fn size(&self) -> u32 {
        1 << self.global_depth()
    }

    /// True when every bucket's local depth is below the global depth, so
    /// the directory can be halved.
    pub fn can_shrink(&self) -> bool {
        let global_depth = self.global_depth();
        global_depth > 0 && (0..self.size()).all(|idx| self.local_depth(idx) < global_depth)
    }

    /// Checks that
    /// - every local depth is at most the global depth,
    /// - every bucket is referenced by exactly `2^(GD - LD)` slots, and
    /// - all slots sharing a bucket report the same local depth.
    pub fn verify_integrity(&self) -> Result<()> {
        let global_depth = self.global_depth();
        let mut counts: HashMap<PageId, u32> = HashMap::new();
        let mut depths: HashMap<PageId, u32> = HashMap::new();

        for idx in 0..self.size() {
            let page_id = self.bucket_page_id(idx);
            let local_depth = self.local_depth(idx);

            if page_id == INVALID_PAGE_ID {
                return self.integrity_error(format!("slot {} has no bucket page", idx));
            }
            if local_depth > global_depth {
                return self.integrity_error(format!(
                    "slot {} local depth {} exceeds global depth {}",
                    idx, local_depth, global_depth
                ));
            }

            *counts.entry(page_id).or_insert(0) += 1;
            match depths.get(&page_id) {
                Some(&old) if old != local_depth => {
                    return self.integrity_error(format!(
                        "local depth {} at slot {} disagrees with {} for {}",
                        local_depth, idx, old, page_id
                    ));
                }
                Some(_) => {}
                None => {
                    depths.insert(page_id, local_depth);
                }
            }
        }

        for (page_id, count) in counts {
            let required = 1u32 << (global_depth - depths[&page_id]);
            if count != required {
                return self.integrity_error(format!(
                    "{} has {} pointers, required {}",
                    page_id, count, required
                ));
            }
        }

        Ok(())
    }

    fn integrity_error(&self, message: String) -> Result<()> {
        error!(directory = %self.page_id(), %message, "directory integrity check failed");
        self.print_directory();
        Err(CairnError::DirectoryCorrupted(message))
    }

    /// Dumps the directory at debug level.
    pub fn print_directory(&self) {
        debug!(
            "======== DIRECTORY (global depth: {}) ========",
            self.global_depth()
        );
        debug!("| bucket idx | page id | local depth |");
        for idx in 0..self.size() {
            debug!(
                "| {:>10} | {:>7} | {:>11} |",
                idx,
                self.bucket_page_id(idx).as_i32(),
                self.local_depth(idx)
            );
        }
        debug!("================ END DIRECTORY ================");
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HashTableDirectoryPage<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    /// Formats an empty directory of global depth 0 whose single slot points
    /// at `bucket_page_id`.
    pub fn init(&mut self, page_id: PageId, bucket_page_id: PageId) {
        self.bytes_mut().fill(0);
        set_header_page_id(self.bytes_mut(), page_id);
        for idx in 0..DIRECTORY_ARRAY_SIZE as u32 {
            self.set_bucket_page_id(idx, INVALID_PAGE_ID);
        }
        self.set_bucket_page_id(0, bucket_page_id);
    }

    pub fn set_page_id(&mut self, page_id: PageId) {
        set_header_page_id(self.bytes_mut(), page_id);
    }

    pub fn set_lsn(&mut self, lsn: Lsn) {
        set_page_lsn(self.bytes_mut(), lsn);
    }

    /// Updates the directory index using a bucket index and page id.
    pub fn set_bucket_page_id(&mut self, bucket_idx: u32, bucket_page_id: PageId) {
        write_i32(
            self.bytes_mut(),
            BUCKET_PAGE_IDS_OFFSET + bucket_idx as usize * 4,
            bucket_page_id.as_i32(),
        );
    }

    pub fn set_local_depth(&mut self, bucket_idx: u32, local_depth: u8) {
        self.bytes_mut()[LOCAL_DEPTHS_OFFSET + bucket_idx as usize] = local_depth;
    }

    pub fn incr_local_depth(&mut self, bucket_idx: u32) {
        let depth = self.local_depth(bucket_idx) as u8;
        self.set_local_depth(bucket_idx, depth + 1);
    }

    pub fn decr_local_depth(&mut self, bucket_idx: u32) {
        let depth = self.local_depth(bucket_idx) as u8;
        self.set_local_depth(bucket_idx, depth.saturating_sub(1));
    }

    /// Doubles the directory: the new upper half mirrors the lower half, so
    /// every bucket keeps its local depth and gains twice the pointers.
    pub fn incr_global_depth(&mut self) -> Result<()> {
        let global_depth = self.global_depth();
        if global_depth >= MAX_GLOBAL_DEPTH {
            return Err(CairnError::DirectoryFull);
        }

        let size = self.size();
        for idx in 0..size {
            let page_id = self.bucket_page_id(idx);
            let depth = self.local_depth(idx) as u8;
            self.set_bucket_page_id(idx + size, page_id);
            self.set_local_depth(idx + size, depth);
        }
        write_u32(self.bytes_mut(), GLOBAL_DEPTH_OFFSET, global_depth + 1);
        Ok(())
    }

    /// Halves the directory. The dropped upper half is cleared.
    pub fn decr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        if global_depth == 0 {
            return;
        }

        let half = self.size() / 2;
        for idx in half..half * 2 {
            self.set_bucket_page_id(idx, INVALID_PAGE_ID);
            self.set_local_depth(idx, 0);
        }
        write_u32(self.bytes_mut(), GLOBAL_DEPTH_OFFSET, global_depth - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PAGE_SIZE;

    fn new_directory(data: &mut [u8]) -> HashTableDirectoryPage<&mut [u8]> {
        let mut dir = HashTableDirectoryPage::new(data);
        dir.init(PageId::new(0), PageId::new(1));
        dir
    }

    #[test]
    fn test_directory_layout() {
        let mut data = [0u8; PAGE_SIZE];
        {
            let mut dir = new_directory(&mut data);
            dir.set_lsn(9);
            dir.set_local_depth(3, 2);
            dir.set_bucket_page_id(3, PageId::new(77));
        }
        assert_eq!(&data[0..4], &0i32.to_le_bytes());
        assert_eq!(&data[4..8], &9i32.to_le_bytes());
        assert_eq!(&data[8..12], &0u32.to_le_bytes());
        assert_eq!(data[12 + 3], 2);
        assert_eq!(&data[524..528], &1i32.to_le_bytes());
        assert_eq!(&data[524 + 12..524 + 16], &77i32.to_le_bytes());
    }

    #[test]
    fn test_fresh_directory() {
        let mut data = [0u8; PAGE_SIZE];
        let dir = new_directory(&mut data);
        assert_eq!(dir.page_id(), PageId::new(0));
        assert_eq!(dir.global_depth(), 0);
        assert_eq!(dir.size(), 1);
        assert_eq!(dir.global_depth_mask(), 0);
        assert_eq!(dir.bucket_page_id(0), PageId::new(1));
        assert!(!dir.can_shrink());
        assert!(dir.verify_integrity().is_ok());
    }

    #[test]
    fn test_grow_mirrors_lower_half() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = new_directory(&mut data);

        dir.incr_global_depth().unwrap();
        assert_eq!(dir.global_depth(), 1);
        assert_eq!(dir.size(), 2);
        assert_eq!(dir.global_depth_mask(), 1);
        assert_eq!(dir.bucket_page_id(1), PageId::new(1));
        // Both slots share a bucket of local depth 0.
        assert!(dir.verify_integrity().is_ok());
        assert!(dir.can_shrink());

        dir.incr_local_depth(0);
        dir.incr_local_depth(1);
        dir.set_bucket_page_id(1, PageId::new(2));
        assert!(dir.verify_integrity().is_ok());
        assert!(!dir.can_shrink());
        assert_eq!(dir.local_depth_mask(1), 1);
        assert_eq!(dir.local_high_bit(1), 1);
        assert_eq!(dir.split_image_index(1), 0);
        assert_eq!(dir.split_image_index(0), 1);

        dir.incr_global_depth().unwrap();
        assert_eq!(dir.bucket_page_id(2), PageId::new(1));
        assert_eq!(dir.bucket_page_id(3), PageId::new(2));
        assert_eq!(dir.local_depth(3), 1);
        assert!(dir.verify_integrity().is_ok());
        assert!(dir.can_shrink());

        dir.decr_global_depth();
        assert_eq!(dir.global_depth(), 1);
        assert_eq!(dir.bucket_page_id(2), INVALID_PAGE_ID);
        assert!(dir.verify_integrity().is_ok());
    }

    #[test]
    fn test_grow_stops_at_max_depth() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = new_directory(&mut data);
        for _ in 0..MAX_GLOBAL_DEPTH {
            dir.incr_global_depth().unwrap();
        }
        assert_eq!(dir.size() as usize, DIRECTORY_ARRAY_SIZE);
        assert!(matches!(
            dir.incr_global_depth(),
            Err(CairnError::DirectoryFull)
        ));
    }

    #[test]
    fn test_verify_detects_bad_pointer_count() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = new_directory(&mut data);
        dir.incr_global_depth().unwrap();
        // Slot 1 claims its own bucket but keeps local depth 0.
        dir.set_bucket_page_id(1, PageId::new(2));
        assert!(matches!(
            dir.verify_integrity(),
            Err(CairnError::DirectoryCorrupted(_))
        ));
    }

    #[test]
    fn test_verify_detects_mismatched_local_depth() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = new_directory(&mut data);
        dir.incr_global_depth().unwrap();
        dir.set_local_depth(1, 1);
        assert!(dir.verify_integrity().is_err());
    }

    #[test]
    fn test_verify_detects_depth_above_global() {
        let mut data = [0u8; PAGE_SIZE];
        let mut dir = new_directory(&mut data);
        dir.set_local_depth(0, 1);
        assert!(dir.verify_integrity().is_err());
    }

    #[test]
    fn test_read_only_view() {
        let mut data = [0u8; PAGE_SIZE];
        new_directory(&mut data).incr_global_depth().unwrap();
        let dir = HashTableDirectoryPage::new(&data[..]);
        assert_eq!(dir.global_depth(), 1);
        assert_eq!(dir.bucket_page_id(1), PageId::new(1));
    }
}
