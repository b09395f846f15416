//! Integration tests for the reader/writer latch

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cairn::common::ReaderWriterLatch;

#[test]
fn test_latch_readers_and_writers_converge() {
    let counter = Arc::new(ReaderWriterLatch::new(5i32));

    let handles: Vec<_> = (0..100)
        .map(|i| {
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                if i % 2 == 0 {
                    let value = *counter.read();
                    assert!(value >= 5);
                } else {
                    *counter.write() += 1;
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*counter.read(), 55);
}

#[test]
fn test_latch_shared_readers() {
    let latch = ReaderWriterLatch::new(0u32);
    let r1 = latch.read();
    let r2 = latch.read();
    assert!(latch.try_read().is_some());
    assert!(latch.try_write().is_none());
    drop(r1);
    drop(r2);
    assert!(latch.try_write().is_some());
}

#[test]
fn test_latch_writer_blocks_until_reader_leaves() {
    let latch = Arc::new(ReaderWriterLatch::new(()));
    let written = Arc::new(AtomicBool::new(false));

    let reader = latch.read();
    let handle = {
        let latch = Arc::clone(&latch);
        let written = Arc::clone(&written);
        thread::spawn(move || {
            let _w = latch.write();
            written.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!written.load(Ordering::SeqCst));
    drop(reader);
    handle.join().unwrap();
    assert!(written.load(Ordering::SeqCst));
}
