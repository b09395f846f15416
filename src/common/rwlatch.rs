use parking_lot::lock_api::{self, GuardSend};
use parking_lot::{Condvar, Mutex};

/// Upper bound on concurrent readers; further readers block until one leaves.
pub const MAX_READERS: u32 = u32::MAX;

struct LatchState {
    reader_count: u32,
    writer_entered: bool,
}

/// Monitor-style reader/writer latch.
///
/// Any number of readers or a single writer. A writer that has entered blocks
/// new readers, so it only waits for the readers already inside to drain.
pub struct RawLatch {
    state: Mutex<LatchState>,
    reader: Condvar,
    writer: Condvar,
}

unsafe impl lock_api::RawRwLock for RawLatch {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawLatch {
        state: parking_lot::const_mutex(LatchState {
            reader_count: 0,
            writer_entered: false,
        }),
        reader: Condvar::new(),
        writer: Condvar::new(),
    };

    type GuardMarker = GuardSend;

    fn lock_shared(&self) {
        let mut state = self.state.lock();
        while state.writer_entered || state.reader_count == MAX_READERS {
            self.reader.wait(&mut state);
        }
        state.reader_count += 1;
    }

    fn try_lock_shared(&self) -> bool {
        let mut state = self.state.lock();
        if state.writer_entered || state.reader_count == MAX_READERS {
            return false;
        }
        state.reader_count += 1;
        true
    }

    unsafe fn unlock_shared(&self) {
        let mut state = self.state.lock();
        state.reader_count -= 1;
        if state.writer_entered {
            if state.reader_count == 0 {
                self.writer.notify_one();
            }
        } else if state.reader_count == MAX_READERS - 1 {
            self.reader.notify_one();
        }
    }

    fn lock_exclusive(&self) {
        let mut state = self.state.lock();
        while state.writer_entered {
            self.reader.wait(&mut state);
        }
        state.writer_entered = true;
        while state.reader_count > 0 {
            self.writer.wait(&mut state);
        }
    }

    fn try_lock_exclusive(&self) -> bool {
        let mut state = self.state.lock();
        if state.writer_entered || state.reader_count > 0 {
            return false;
        }
        state.writer_entered = true;
        true
    }

    unsafe fn unlock_exclusive(&self) {
        let mut state = self.state.lock();
        state.writer_entered = false;
        self.reader.notify_all();
    }
}

/// Reader/writer latch protecting a value of type `T`.
pub type ReaderWriterLatch<T> = lock_api::RwLock<RawLatch, T>;

/// Shared guard returned by [`ReaderWriterLatch::read`].
pub type LatchReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawLatch, T>;

/// Exclusive guard returned by [`ReaderWriterLatch::write`].
pub type LatchWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawLatch, T>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_readers_and_writers_converge() {
        let counter = Arc::new(ReaderWriterLatch::new(5u32));

        let handles: Vec<_> = (0..100)
            .map(|i| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    if i % 2 == 0 {
                        let _ = *counter.read();
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
    fn test_many_readers_share_the_latch() {
        let latch = ReaderWriterLatch::new(());
        let r1 = latch.read();
        let r2 = latch.read();
        assert!(latch.try_write().is_none());
        drop(r1);
        assert!(latch.try_write().is_none());
        drop(r2);
        assert!(latch.try_write().is_some());
    }

    #[test]
    fn test_writer_excludes_readers() {
        let latch = ReaderWriterLatch::new(0);
        let w = latch.write();
        assert!(latch.try_read().is_none());
        assert!(latch.try_write().is_none());
        drop(w);
        assert!(latch.try_read().is_some());
    }

    #[test]
    fn test_writer_waits_for_reader_to_drain() {
        let latch = Arc::new(ReaderWriterLatch::new(0u32));
        let reader = latch.read();

        let writer = {
            let latch = Arc::clone(&latch);
            thread::spawn(move || {
                *latch.write() = 7;
            })
        };

        thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(*reader, 0);
        drop(reader);

        writer.join().unwrap();
        assert_eq!(*latch.read(), 7);
    }
}
