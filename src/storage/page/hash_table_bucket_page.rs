use crate::common::{Rid, PAGE_SIZE};

use super::{read_i64, write_i64};

/// Number of (key, RID) slots a bucket page holds for the given key size.
///
/// Chosen so that two `ceil(n / 8)`-byte bitmaps plus `n` slots of
/// `key_size + 8` bytes fit in a page.
pub fn bucket_capacity(key_size: usize) -> usize {
    let kv_size = key_size + Rid::SIZE;
    (4 * PAGE_SIZE - 7) / (4 * kv_size + 1)
}

/// Hash bucket page. Stores keys and RIDs together; duplicate keys are
/// allowed as long as the (key, RID) pair differs.
///
/// Layout:
///
/// ```text
/// occupied (n bits) | readable (n bits) | KEY(1) RID(1) | ... | KEY(n) RID(n)
/// ```
///
/// A slot is occupied once it has ever held an entry and readable while it
/// holds a live one. Removal only clears the readable bit; inserts reuse such
/// slots before claiming a fresh one, so occupied slots always form a prefix.
pub struct HashTableBucketPage<B> {
    data: B,
    key_size: usize,
    capacity: usize,
    bitmap_size: usize,
}

impl<B: AsRef<[u8]>> HashTableBucketPage<B> {
    pub fn new(data: B, key_size: usize) -> Self {
        let capacity = bucket_capacity(key_size);
        Self {
            data,
            key_size,
            capacity,
            bitmap_size: (capacity - 1) / 8 + 1,
        }
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    fn kv_size(&self) -> usize {
        self.key_size + Rid::SIZE
    }

    fn slot_offset(&self, bucket_idx: usize) -> usize {
        2 * self.bitmap_size + bucket_idx * self.kv_size()
    }

    fn bit(&self, bitmap_offset: usize, bucket_idx: usize) -> bool {
        self.bytes()[bitmap_offset + bucket_idx / 8] & (1 << (bucket_idx % 8)) != 0
    }

    pub fn is_occupied(&self, bucket_idx: usize) -> bool {
        self.bit(0, bucket_idx)
    }

    pub fn is_readable(&self, bucket_idx: usize) -> bool {
        self.bit(self.bitmap_size, bucket_idx)
    }

    pub fn key_at(&self, bucket_idx: usize) -> &[u8] {
        let offset = self.slot_offset(bucket_idx);
        &self.bytes()[offset..offset + self.key_size]
    }

    pub fn value_at(&self, bucket_idx: usize) -> Rid {
        Rid::from_i64(read_i64(
            self.bytes(),
            self.slot_offset(bucket_idx) + self.key_size,
        ))
    }

    /// Appends every RID stored under `key` to `result`.
    /// Returns true if at least one matched.
    pub fn get_value(&self, key: &[u8], result: &mut Vec<Rid>) -> bool {
        let before = result.len();
        for idx in self.occupied_slots() {
            if self.is_readable(idx) && self.key_at(idx) == key {
                result.push(self.value_at(idx));
            }
        }
        result.len() > before
    }

    /// Returns true if this exact (key, RID) pair is stored.
    pub fn contains(&self, key: &[u8], rid: Rid) -> bool {
        self.find(key, rid).is_some()
    }

    fn find(&self, key: &[u8], rid: Rid) -> Option<usize> {
        self.occupied_slots().find(|&idx| {
            self.is_readable(idx) && self.key_at(idx) == key && self.value_at(idx) == rid
        })
    }

    fn occupied_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.capacity).take_while(move |&idx| self.is_occupied(idx))
    }

    /// Number of live entries.
    pub fn num_readable(&self) -> usize {
        let readable = &self.bytes()[self.bitmap_size..2 * self.bitmap_size];
        readable.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_full(&self) -> bool {
        self.num_readable() == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.num_readable() == 0
    }

    /// Copies out every live entry.
    pub fn readable_entries(&self) -> Vec<(Vec<u8>, Rid)> {
        self.occupied_slots()
            .filter(|&idx| self.is_readable(idx))
            .map(|idx| (self.key_at(idx).to_vec(), self.value_at(idx)))
            .collect()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HashTableBucketPage<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    fn set_bit(&mut self, bitmap_offset: usize, bucket_idx: usize, value: bool) {
        let byte = &mut self.bytes_mut()[bitmap_offset + bucket_idx / 8];
        if value {
            *byte |= 1 << (bucket_idx % 8);
        } else {
            *byte &= !(1 << (bucket_idx % 8));
        }
    }

    /// Inserts a (key, RID) pair.
    /// Returns false if the exact pair is already present or the bucket is full.
    pub fn insert(&mut self, key: &[u8], rid: Rid) -> bool {
        debug_assert_eq!(key.len(), self.key_size);

        let mut free_slot = None;
        for idx in 0..self.capacity {
            if !self.is_occupied(idx) {
                if free_slot.is_none() {
                    free_slot = Some(idx);
                }
                break;
            }
            if self.is_readable(idx) {
                if self.key_at(idx) == key && self.value_at(idx) == rid {
                    return false;
                }
            } else if free_slot.is_none() {
                free_slot = Some(idx);
            }
        }

        let Some(idx) = free_slot else {
            return false;
        };

        let offset = self.slot_offset(idx);
        let key_size = self.key_size;
        self.bytes_mut()[offset..offset + key_size].copy_from_slice(key);
        write_i64(self.bytes_mut(), offset + key_size, rid.as_i64());
        self.set_bit(0, idx, true);
        let bitmap_size = self.bitmap_size;
        self.set_bit(bitmap_size, idx, true);
        true
    }

    /// Removes a (key, RID) pair. Returns false if it was not found.
    pub fn remove(&mut self, key: &[u8], rid: Rid) -> bool {
        match self.find(key, rid) {
            Some(idx) => {
                self.remove_at(idx);
                true
            }
            None => false,
        }
    }

    /// Clears the readable bit of a slot; the slot stays occupied.
    pub fn remove_at(&mut self, bucket_idx: usize) {
        let bitmap_size = self.bitmap_size;
        self.set_bit(bitmap_size, bucket_idx, false);
    }

    /// Empties the bucket, occupied bits included.
    pub fn clear(&mut self) {
        let bitmap_size = self.bitmap_size;
        self.bytes_mut()[..2 * bitmap_size].fill(0);
    }
}
