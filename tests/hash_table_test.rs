//! Integration tests for the extendible hash table index

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use cairn::buffer::BufferPoolManager;
use cairn::common::{PageId, Rid};
use cairn::index::ExtendibleHashTable;
use cairn::storage::disk::DiskManager;
use cairn::storage::page::{bucket_capacity, HashTableDirectoryPage};
use rand::Rng;
use tempfile::TempDir;

fn create_table(pool_size: usize) -> (ExtendibleHashTable, Arc<BufferPoolManager>, TempDir) {
    let dir = TempDir::new().unwrap();
    let dm = Arc::new(DiskManager::new(dir.path().join("test.db")).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, dm));
    let table = ExtendibleHashTable::new(Arc::clone(&bpm), 4).unwrap();
    (table, bpm, dir)
}

fn key(k: u32) -> [u8; 4] {
    k.to_le_bytes()
}

fn rid(n: u32) -> Rid {
    Rid::new(PageId::new(n as i32), n)
}

fn assert_all_unpinned(bpm: &BufferPoolManager) {
    for page_id in bpm.resident_pages() {
        assert_eq!(bpm.get_pin_count(page_id), Some(0), "{} left pinned", page_id);
    }
}

#[test]
fn test_first_overflow_doubles_directory_once() {
    let (table, bpm, _dir) = create_table(16);
    let capacity = bucket_capacity(4) as u32;
    assert_eq!(capacity, 334);

    for i in 0..capacity {
        assert!(table.insert(&key(i), rid(i)).unwrap());
    }
    assert_eq!(table.global_depth().unwrap(), 0);
    assert_eq!(table.bucket_count().unwrap(), 1);

    assert!(table.insert(&key(capacity), rid(capacity)).unwrap());
    assert_eq!(table.global_depth().unwrap(), 1);
    assert_eq!(table.bucket_count().unwrap(), 2);
    assert_eq!(table.get_value(&key(capacity)).unwrap(), vec![rid(capacity)]);
    table.verify_integrity().unwrap();

    // Both slots now carry local depth 1.
    let directory = bpm.fetch_page_guarded(table.directory_page_id()).unwrap();
    {
        let data = directory.read();
        let dir = HashTableDirectoryPage::new(&data[..]);
        assert_eq!(dir.local_depth(0), 1);
        assert_eq!(dir.local_depth(1), 1);
        assert_ne!(dir.bucket_page_id(0), dir.bucket_page_id(1));
    }
    drop(directory);
    assert_all_unpinned(&bpm);
}

#[test]
fn test_emptying_bucket_merges_and_shrinks() {
    let (table, bpm, _dir) = create_table(16);
    let capacity = bucket_capacity(4) as u32;
    for i in 0..=capacity {
        table.insert(&key(i), rid(i)).unwrap();
    }
    assert_eq!(table.global_depth().unwrap(), 1);

    // Empty the bucket behind slot 0.
    let slot0: Vec<u32> = (0..=capacity)
        .filter(|&i| ExtendibleHashTable::hash(&key(i)) & 1 == 0)
        .collect();
    for &i in &slot0 {
        assert!(table.remove(&key(i), rid(i)).unwrap());
    }

    assert_eq!(table.global_depth().unwrap(), 0);
    assert_eq!(table.bucket_count().unwrap(), 1);
    table.verify_integrity().unwrap();
    for i in (0..=capacity).filter(|i| !slot0.contains(i)) {
        assert_eq!(table.get_value(&key(i)).unwrap(), vec![rid(i)]);
    }
    assert_all_unpinned(&bpm);
}

#[test]
fn test_round_trip() {
    let (table, _bpm, _dir) = create_table(8);
    for i in 0..50 {
        assert!(table.insert(&key(i % 10), rid(i)).unwrap());
        assert!(table.get_value(&key(i % 10)).unwrap().contains(&rid(i)));
    }
    for i in 0..50 {
        assert!(table.remove(&key(i % 10), rid(i)).unwrap());
        assert!(!table.get_value(&key(i % 10)).unwrap().contains(&rid(i)));
    }
}

#[test]
fn test_random_workload_keeps_directory_consistent() {
    let (table, bpm, _dir) = create_table(32);
    let mut rng = rand::thread_rng();
    let mut expected: HashMap<u32, Vec<Rid>> = HashMap::new();

    for n in 0..4000u32 {
        let k = rng.gen_range(0..1500u32);
        if rng.gen_bool(0.65) {
            let r = rid(n);
            assert!(table.insert(&key(k), r).unwrap());
            expected.entry(k).or_default().push(r);
        } else if let Some(rids) = expected.get_mut(&k) {
            if let Some(r) = rids.pop() {
                assert!(table.remove(&key(k), r).unwrap());
            }
        }

        if n % 250 == 0 {
            table.verify_integrity().unwrap();
        }
    }

    table.verify_integrity().unwrap();
    for (k, rids) in &expected {
        let mut found = table.get_value(&key(*k)).unwrap();
        let mut want = rids.clone();
        found.sort_by_key(|r| r.as_i64());
        want.sort_by_key(|r| r.as_i64());
        assert_eq!(found, want);
    }
    assert_all_unpinned(&bpm);
}

#[test]
fn test_concurrent_inserts_and_lookups() {
    let (table, bpm, _dir) = create_table(32);
    let table = Arc::new(table);

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..300u32 {
                    let k = t * 1000 + i;
                    assert!(table.insert(&key(k), rid(k)).unwrap());
                    assert_eq!(table.get_value(&key(k)).unwrap(), vec![rid(k)]);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    table.verify_integrity().unwrap();
    for t in 0..4u32 {
        for i in 0..300u32 {
            let k = t * 1000 + i;
            assert_eq!(table.get_value(&key(k)).unwrap(), vec![rid(k)]);
        }
    }
    assert_all_unpinned(&bpm);
}

#[test]
fn test_table_survives_small_pool() {
    // Directory plus two buckets must fit; everything else gets evicted.
    let (table, bpm, _dir) = create_table(4);
    for i in 0..2000u32 {
        assert!(table.insert(&key(i), rid(i)).unwrap());
    }
    for i in 0..2000u32 {
        assert_eq!(table.get_value(&key(i)).unwrap(), vec![rid(i)]);
    }
    table.verify_integrity().unwrap();
    assert!(bpm.disk_manager().get_num_writes() > 0);
}
