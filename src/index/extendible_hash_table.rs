use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};
use xxhash_rust::xxh64::xxh64;

use crate::buffer::{BufferPoolManager, PageGuard};
use crate::common::{
    CairnError, PageId, ReaderWriterLatch, Result, Rid, MAX_GLOBAL_DEPTH, MAX_SPLIT_ATTEMPTS,
};
use crate::storage::page::{bucket_capacity, HashTableBucketPage, HashTableDirectoryPage, Page};

/// Disk-backed extendible hash table mapping fixed-size keys to RIDs.
///
/// One directory page holds the global depth plus a local depth and a bucket
/// page id per slot; each bucket lives in its own page. A key lands in slot
/// `hash(key) & global_depth_mask`. Full buckets split (doubling the
/// directory when needed) and emptied buckets merge back into their split
/// image.
///
/// Point operations hold the table latch shared and latch individual pages;
/// splits and merges hold it exclusively.
pub struct ExtendibleHashTable {
    directory_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    table_latch: ReaderWriterLatch<()>,
    key_size: usize,
}

impl ExtendibleHashTable {
    /// Creates a table with a directory of global depth 0 and one bucket.
    pub fn new(bpm: Arc<BufferPoolManager>, key_size: usize) -> Result<Self> {
        Self::check_key_size(key_size)?;

        let directory = bpm.new_page_guarded()?;
        let bucket = bpm.new_page_guarded()?;
        {
            let mut data = directory.write();
            HashTableDirectoryPage::new(&mut data[..]).init(directory.page_id(), bucket.page_id());
        }
        bucket.mark_dirty();

        debug!(
            directory = %directory.page_id(),
            bucket = %bucket.page_id(),
            key_size,
            "created extendible hash table"
        );

        let directory_page_id = directory.page_id();
        drop(bucket);
        drop(directory);
        Self::open(bpm, directory_page_id, key_size)
    }

    /// Opens a table whose directory already lives at `directory_page_id`.
    pub fn open(
        bpm: Arc<BufferPoolManager>,
        directory_page_id: PageId,
        key_size: usize,
    ) -> Result<Self> {
        Self::check_key_size(key_size)?;
        Ok(Self {
            directory_page_id,
            bpm,
            table_latch: ReaderWriterLatch::new(()),
            key_size,
        })
    }

    fn check_key_size(key_size: usize) -> Result<()> {
        if key_size == 0 || bucket_capacity(key_size) == 0 {
            return Err(CairnError::InvalidConfig(format!(
                "hash table key size {} does not fit a bucket page",
                key_size
            )));
        }
        Ok(())
    }

    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Hashes a key: 64-bit xxHash truncated to 32 bits.
    pub fn hash(key: &[u8]) -> u32 {
        xxh64(key, 0) as u32
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.key_size {
            return Err(CairnError::InvalidKeySize {
                expected: self.key_size,
                actual: key.len(),
            });
        }
        Ok(())
    }

    /// Looks up the bucket page for `key` under the directory's read latch.
    fn bucket_page_for(&self, directory: &PageGuard<'_>, key: &[u8]) -> PageId {
        let data = directory.read();
        let dir = HashTableDirectoryPage::new(&data[..]);
        dir.bucket_page_id(Self::hash(key) & dir.global_depth_mask())
    }

    /// Returns every RID stored under `key`.
    pub fn get_value(&self, key: &[u8]) -> Result<Vec<Rid>> {
        self.check_key(key)?;
        let _table = self.table_latch.read();

        let directory = self.bpm.fetch_page_guarded(self.directory_page_id)?;
        let bucket = self
            .bpm
            .fetch_page_guarded(self.bucket_page_for(&directory, key))?;

        let mut result = Vec::new();
        let data = bucket.read();
        HashTableBucketPage::new(&data[..], self.key_size).get_value(key, &mut result);
        Ok(result)
    }

    /// Inserts a (key, RID) pair. Returns false if the pair already exists
    /// or the bucket cannot be split any further.
    pub fn insert(&self, key: &[u8], rid: Rid) -> Result<bool> {
        self.check_key(key)?;
        {
            let _table = self.table_latch.read();
            let directory = self.bpm.fetch_page_guarded(self.directory_page_id)?;
            let bucket_guard = self
                .bpm
                .fetch_page_guarded(self.bucket_page_for(&directory, key))?;

            let mut data = Page::write(&bucket_guard);
            let mut bucket = HashTableBucketPage::new(&mut data[..], self.key_size);
            if bucket.contains(key, rid) {
                return Ok(false);
            }
            if !bucket.is_full() {
                bucket.insert(key, rid);
                bucket_guard.mark_dirty();
                return Ok(true);
            }
        }

        self.split_insert(key, rid)
    }

    /// Splits the target bucket until the pair fits, up to
    /// `MAX_SPLIT_ATTEMPTS` splits.
    fn split_insert(&self, key: &[u8], rid: Rid) -> Result<bool> {
        let _table = self.table_latch.write();
        let hash = Self::hash(key);

        for splits in 0..=MAX_SPLIT_ATTEMPTS {
            let directory = self.bpm.fetch_page_guarded(self.directory_page_id)?;
            let mut dir_data = Page::write(&directory);
            let mut dir = HashTableDirectoryPage::new(&mut dir_data[..]);

            let bucket_idx = hash & dir.global_depth_mask();
            let bucket_page_id = dir.bucket_page_id(bucket_idx);
            let bucket_guard = self.bpm.fetch_page_guarded(bucket_page_id)?;
            let mut bucket_data = Page::write(&bucket_guard);
            let mut bucket = HashTableBucketPage::new(&mut bucket_data[..], self.key_size);

            if bucket.contains(key, rid) {
                return Ok(false);
            }
            if !bucket.is_full() {
                bucket.insert(key, rid);
                bucket_guard.mark_dirty();
                return Ok(true);
            }

            let local_depth = dir.local_depth(bucket_idx);
            let entries = bucket.readable_entries();

            // Splitting only helps once some entry lands on the other side of
            // the new key. Reject up front when that takes too many levels, so
            // a hopeless insert leaves the table untouched.
            let reachable = Self::separating_bit(&entries, hash, local_depth).filter(|&bit| {
                bit < MAX_GLOBAL_DEPTH && (bit - local_depth) as usize + splits < MAX_SPLIT_ATTEMPTS
            });
            if reachable.is_none() {
                warn!(
                    %bucket_page_id,
                    local_depth,
                    splits,
                    "bucket cannot be split further, insert rejected"
                );
                return Ok(false);
            }

            // Allocate the split image before touching the directory so a
            // failure leaves the table unchanged.
            let image_guard = self.bpm.new_page_guarded()?;
            let image_page_id = image_guard.page_id();

            if local_depth == dir.global_depth() {
                dir.incr_global_depth()?;
                debug!(global_depth = dir.global_depth(), "directory doubled");
            }

            let high_bit = 1u32 << local_depth;
            for idx in 0..dir.size() {
                if dir.bucket_page_id(idx) == bucket_page_id {
                    dir.set_local_depth(idx, (local_depth + 1) as u8);
                    if idx & high_bit != 0 {
                        dir.set_bucket_page_id(idx, image_page_id);
                    }
                }
            }

            bucket.clear();
            let mut image_data = Page::write(&image_guard);
            let mut image = HashTableBucketPage::new(&mut image_data[..], self.key_size);
            for (entry_key, entry_rid) in &entries {
                if Self::hash(entry_key) & high_bit != 0 {
                    image.insert(entry_key, *entry_rid);
                } else {
                    bucket.insert(entry_key, *entry_rid);
                }
            }

            debug!(
                %bucket_page_id,
                %image_page_id,
                local_depth = local_depth + 1,
                kept = bucket.num_readable(),
                moved = image.num_readable(),
                "split bucket"
            );

            directory.mark_dirty();
            bucket_guard.mark_dirty();
            image_guard.mark_dirty();
        }

        Ok(false)
    }

    /// Lowest hash bit at or above `from` on which some entry differs from
    /// `hash`. Splitting the bucket through that bit separates them.
    fn separating_bit(entries: &[(Vec<u8>, Rid)], hash: u32, from: u32) -> Option<u32> {
        let differing = entries
            .iter()
            .fold(0u32, |acc, (entry_key, _)| acc | (Self::hash(entry_key) ^ hash));
        let differing = differing & !((1u32 << from) - 1);
        (differing != 0).then(|| differing.trailing_zeros())
    }

    /// Removes a (key, RID) pair, merging the bucket into its split image
    /// if it became empty. Returns false if the pair was not present.
    pub fn remove(&self, key: &[u8], rid: Rid) -> Result<bool> {
        self.check_key(key)?;
        let now_empty = {
            let _table = self.table_latch.read();
            let directory = self.bpm.fetch_page_guarded(self.directory_page_id)?;
            let bucket_guard = self
                .bpm
                .fetch_page_guarded(self.bucket_page_for(&directory, key))?;

            let mut data = Page::write(&bucket_guard);
            let mut bucket = HashTableBucketPage::new(&mut data[..], self.key_size);
            if !bucket.remove(key, rid) {
                return Ok(false);
            }
            bucket_guard.mark_dirty();
            bucket.is_empty()
        };

        if now_empty {
            self.merge(key)?;
        }
        Ok(true)
    }

    /// Folds the empty bucket addressed by `key` into its split image.
    /// Only one level is merged per call.
    fn merge(&self, key: &[u8]) -> Result<()> {
        let _table = self.table_latch.write();

        let directory = self.bpm.fetch_page_guarded(self.directory_page_id)?;
        let mut dir_data = Page::write(&directory);
        let mut dir = HashTableDirectoryPage::new(&mut dir_data[..]);

        let bucket_idx = Self::hash(key) & dir.global_depth_mask();
        let local_depth = dir.local_depth(bucket_idx);
        if local_depth == 0 {
            return Ok(());
        }
        let image_idx = dir.split_image_index(bucket_idx);
        if dir.local_depth(image_idx) != local_depth {
            return Ok(());
        }
        let bucket_page_id = dir.bucket_page_id(bucket_idx);
        let image_page_id = dir.bucket_page_id(image_idx);
        if bucket_page_id == image_page_id {
            return Ok(());
        }

        {
            let bucket_guard = self.bpm.fetch_page_guarded(bucket_page_id)?;
            let data = bucket_guard.read();
            if !HashTableBucketPage::new(&data[..], self.key_size).is_empty() {
                return Ok(());
            }
        }

        for idx in 0..dir.size() {
            let page_id = dir.bucket_page_id(idx);
            if page_id == bucket_page_id || page_id == image_page_id {
                dir.set_bucket_page_id(idx, image_page_id);
                dir.set_local_depth(idx, (local_depth - 1) as u8);
            }
        }
        debug!(
            %bucket_page_id,
            %image_page_id,
            local_depth = local_depth - 1,
            "merged bucket into split image"
        );

        if dir.can_shrink() {
            dir.decr_global_depth();
            debug!(global_depth = dir.global_depth(), "directory shrunk");
        }
        directory.mark_dirty();

        if !self.bpm.delete_page(bucket_page_id) {
            warn!(%bucket_page_id, "merged bucket page still pinned, not deleted");
        }
        Ok(())
    }

    /// Returns the directory's global depth.
    pub fn global_depth(&self) -> Result<u32> {
        self.with_directory(|dir| Ok(dir.global_depth()))
    }

    /// Checks the directory invariants.
    pub fn verify_integrity(&self) -> Result<()> {
        self.with_directory(|dir| dir.verify_integrity())
    }

    /// Number of distinct bucket pages the directory references.
    pub fn bucket_count(&self) -> Result<usize> {
        self.with_directory(|dir| {
            let pages: HashSet<PageId> =
                (0..dir.size()).map(|idx| dir.bucket_page_id(idx)).collect();
            Ok(pages.len())
        })
    }

    fn with_directory<T>(
        &self,
        f: impl FnOnce(&HashTableDirectoryPage<&[u8]>) -> Result<T>,
    ) -> Result<T> {
        let _table = self.table_latch.read();
        let directory = self.bpm.fetch_page_guarded(self.directory_page_id)?;
        let data = directory.read();
        f(&HashTableDirectoryPage::new(&data[..]))
    }
}
