use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::common::{CairnError, Result};

use super::DiskManager;

/// Completion handle for an asynchronous log flush.
///
/// Can be polled without blocking or waited on. The outcome is stored once
/// so every caller observes the same result.
pub struct FlushFuture {
    outcome: Mutex<Option<bool>>,
    resolved: Condvar,
}

/// Producer half of a [`FlushFuture`]. Dropping it unresolved fails the
/// future.
pub struct FlushPromise {
    future: Arc<FlushFuture>,
}

/// Creates a connected promise/future pair.
pub fn flush_channel() -> (FlushPromise, Arc<FlushFuture>) {
    let future = Arc::new(FlushFuture {
        outcome: Mutex::new(None),
        resolved: Condvar::new(),
    });
    (
        FlushPromise {
            future: Arc::clone(&future),
        },
        future,
    )
}

impl FlushPromise {
    /// Resolves the future. `ok` reports whether the flush succeeded.
    pub fn complete(self, ok: bool) {
        self.future.resolve(ok);
    }
}

impl Drop for FlushPromise {
    fn drop(&mut self) {
        self.future.resolve(false);
    }
}

impl FlushFuture {
    /// First resolution wins.
    fn resolve(&self, ok: bool) {
        let mut outcome = self.outcome.lock();
        if outcome.is_none() {
            *outcome = Some(ok);
            self.resolved.notify_all();
        }
    }

    /// Returns true once the flush has finished, without blocking.
    pub fn is_complete(&self) -> bool {
        self.outcome.lock().is_some()
    }

    /// Blocks until the flush finishes and returns whether it succeeded.
    pub fn wait(&self) -> bool {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(ok) = *outcome {
                return ok;
            }
            // Releases the lock while parked, so pollers are never blocked
            self.resolved.wait(&mut outcome);
        }
    }
}

struct LogRequest {
    data: Vec<u8>,
    promise: FlushPromise,
}

/// LogFlusher owns a background thread that appends log buffers to the log
/// file, so callers can hand off a flush and poll its future later.
pub struct LogFlusher {
    disk_manager: Arc<DiskManager>,
    request_sender: Sender<LogRequest>,
    /// Flag to signal shutdown
    shutdown: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl LogFlusher {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<LogRequest>(64);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm_clone = Arc::clone(&disk_manager);
        let shutdown_clone = Arc::clone(&shutdown);

        let worker_handle = thread::spawn(move || {
            Self::run_worker(dm_clone, receiver, shutdown_clone);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues `data` for appending and returns its completion handle. The
    /// handle is also registered with the disk manager so a later synchronous
    /// `write_log` waits behind this flush.
    pub fn flush_async(&self, data: Vec<u8>) -> Result<Arc<FlushFuture>> {
        let (promise, future) = flush_channel();
        self.disk_manager.set_flush_log_future(Arc::clone(&future));

        self.request_sender
            .send(LogRequest { data, promise })
            .map_err(|e| CairnError::LogFlusher(format!("Failed to queue log flush: {}", e)))?;

        Ok(future)
    }

    /// Queues `data` and blocks until it reaches the log file.
    pub fn flush(&self, data: Vec<u8>) -> Result<bool> {
        Ok(self.flush_async(data)?.wait())
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    fn run_worker(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<LogRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process_request(&disk_manager, request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("log flusher stopped");
    }

    fn process_request(disk_manager: &DiskManager, request: LogRequest) {
        let ok = match disk_manager.append_log(&request.data) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, len = request.data.len(), "async log flush failed");
                false
            }
        };
        request.promise.complete(ok);
    }
}

impl Drop for LogFlusher {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_flusher() -> (LogFlusher, TempDir) {
        let dir = TempDir::new().unwrap();
        let dm = Arc::new(DiskManager::new(dir.path().join("test.db")).unwrap());
        (LogFlusher::new(dm), dir)
    }

    #[test]
    fn test_flush_future_completion() {
        let (promise, future) = flush_channel();
        assert!(!future.is_complete());
        promise.complete(true);
        assert!(future.is_complete());
        assert!(future.wait());
        assert!(future.wait());
    }

    #[test]
    fn test_dropped_promise_reports_failure() {
        let (promise, future) = flush_channel();
        drop(promise);
        assert!(future.is_complete());
        assert!(!future.wait());
    }

    #[test]
    fn test_poll_does_not_block_behind_waiter() {
        let (promise, future) = flush_channel();

        let waiter = {
            let future = Arc::clone(&future);
            thread::spawn(move || future.wait())
        };
        thread::sleep(Duration::from_millis(50));

        let (tx, rx) = bounded(1);
        let poller = {
            let future = Arc::clone(&future);
            thread::spawn(move || {
                let _ = tx.send(future.is_complete());
            })
        };
        assert_eq!(rx.recv_timeout(Duration::from_millis(500)), Ok(false));

        promise.complete(true);
        assert!(waiter.join().unwrap());
        poller.join().unwrap();
        assert!(future.is_complete());
        assert!(future.wait());
    }

    #[test]
    fn test_many_waiters_see_same_outcome() {
        let (promise, future) = flush_channel();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let future = Arc::clone(&future);
                thread::spawn(move || future.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        promise.complete(true);
        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    fn test_async_flush_reaches_log_file() {
        let (flusher, _dir) = create_flusher();

        let future = flusher.flush_async(b"abc".to_vec()).unwrap();
        assert!(future.wait());
        assert!(future.is_complete());

        let dm = flusher.disk_manager();
        assert!(dm.has_flush_log_future());
        assert_eq!(dm.get_num_flushes(), 1);

        let mut buf = [0u8; 3];
        assert!(dm.read_log(&mut buf, 0).unwrap());
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn test_sync_write_orders_after_async_flush() {
        let (flusher, _dir) = create_flusher();

        flusher.flush_async(b"first;".to_vec()).unwrap();
        flusher.disk_manager().write_log(b"second").unwrap();

        let mut buf = [0u8; 12];
        assert!(flusher.disk_manager().read_log(&mut buf, 0).unwrap());
        assert_eq!(&buf, b"first;second");
    }

    #[test]
    fn test_blocking_flush() {
        let (flusher, _dir) = create_flusher();
        assert!(flusher.flush(b"x".to_vec()).unwrap());
        assert!(flusher.flush(b"y".to_vec()).unwrap());
        assert_eq!(flusher.disk_manager().get_num_flushes(), 2);
    }
}
