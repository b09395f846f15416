use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::common::{log_path_for, CairnError, PageId, Result, PAGE_SIZE};

use super::FlushFuture;

/// DiskManager is responsible for reading and writing pages to/from disk.
/// It owns the database file plus an append-only log file next to it, and
/// hands out page ids from a monotonic counter.
pub struct DiskManager {
    /// The database file
    db_file: Mutex<File>,
    /// The log file, written sequentially and read by explicit offset
    log_file: Mutex<File>,
    db_path: PathBuf,
    log_path: PathBuf,
    /// Next page id to hand out
    next_page_id: AtomicI32,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
    /// Number of log flushes performed
    num_flushes: AtomicU32,
    /// Set while a log write is in progress
    flush_log: AtomicBool,
    /// Completion handle of the most recent asynchronous log flush
    flush_log_future: Mutex<Option<Arc<FlushFuture>>>,
}

impl DiskManager {
    /// Opens (creating if needed) the database file at `db_path` and its log
    /// file, whose name is `db_path` with the extension replaced by `.log`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let log_path = log_path_for(&db_path)?;

        let db_file = open_file(&db_path)?;
        let log_file = open_file(&log_path)?;

        let file_size = db_file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as i32;
        debug!(path = %db_path.display(), num_pages, "opened database file");

        Ok(Self {
            db_file: Mutex::new(db_file),
            log_file: Mutex::new(log_file),
            db_path,
            log_path,
            next_page_id: AtomicI32::new(num_pages),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
            num_flushes: AtomicU32::new(0),
            flush_log: AtomicBool::new(false),
            flush_log_future: Mutex::new(None),
        })
    }

    /// Reads a page from disk into the provided buffer.
    ///
    /// A page that was never written (beyond the end of the file) or a short
    /// read leaves the missing bytes zero-filled.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        if !page_id.is_valid() {
            return Err(CairnError::InvalidPageId(page_id));
        }

        let offset = page_id.file_offset(PAGE_SIZE);
        let mut file = self.db_file.lock();

        let file_size = file.metadata().map_err(|e| log_io("stat db file", e))?.len();
        if offset >= file_size {
            debug!(%page_id, "read past end of file, zero-filling");
            data.fill(0);
            self.num_reads.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| log_io("seek db file", e))?;
        let bytes_read = read_full(&mut *file, data).map_err(|e| log_io("read page", e))?;
        if bytes_read < PAGE_SIZE {
            debug!(%page_id, bytes_read, "short page read, zero-filling");
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk and syncs it before returning.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        if !page_id.is_valid() {
            return Err(CairnError::InvalidPageId(page_id));
        }

        let offset = page_id.file_offset(PAGE_SIZE);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| log_io("seek db file", e))?;
        file.write_all(data).map_err(|e| log_io("write page", e))?;
        file.sync_data().map_err(|e| log_io("sync db file", e))?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Appends a log buffer to the log file and syncs it.
    ///
    /// If an asynchronous flush is registered, waits for it first so log
    /// records reach the file in order.
    pub fn write_log(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        let pending = self.flush_log_future.lock().clone();
        if let Some(future) = pending {
            future.wait();
        }

        self.append_log(data)
    }

    /// Performs the actual log append. Used by `write_log` and by the
    /// background log flusher.
    pub(crate) fn append_log(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        self.flush_log.store(true, Ordering::Release);
        self.num_flushes.fetch_add(1, Ordering::Relaxed);

        let result = {
            let mut file = self.log_file.lock();
            file.seek(SeekFrom::End(0))
                .and_then(|_| file.write_all(data))
                .and_then(|_| file.sync_data())
        };

        self.flush_log.store(false, Ordering::Release);
        result.map_err(|e| log_io("append log", e))
    }

    /// Reads `data.len()` bytes of the log starting at `offset`.
    ///
    /// Returns `false` when `offset` is at or past the end of the log. A read
    /// that runs off the end leaves the rest of `data` zero-filled.
    pub fn read_log(&self, data: &mut [u8], offset: u64) -> Result<bool> {
        let mut file = self.log_file.lock();

        let file_size = file.metadata().map_err(|e| log_io("stat log file", e))?.len();
        if offset >= file_size {
            debug!(offset, file_size, "log read past end of file");
            return Ok(false);
        }

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| log_io("seek log file", e))?;
        let bytes_read = read_full(&mut *file, data).map_err(|e| log_io("read log", e))?;
        if bytes_read < data.len() {
            debug!(offset, bytes_read, "short log read, zero-filling");
            data[bytes_read..].fill(0);
        }

        Ok(true)
    }

    /// Hands out the next page id. Never touches the file.
    pub fn allocate_page(&self) -> PageId {
        PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Deallocation is accepted but the space is never reclaimed.
    pub fn deallocate_page(&self, page_id: PageId) {
        debug!(%page_id, "deallocate page");
    }

    /// Returns the number of pages allocated so far.
    pub fn get_num_pages(&self) -> u32 {
        self.next_page_id.load(Ordering::Relaxed) as u32
    }

    /// Returns the number of disk reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of disk writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns the number of log flushes performed.
    pub fn get_num_flushes(&self) -> u32 {
        self.num_flushes.load(Ordering::Relaxed)
    }

    /// Returns true while a log write has not reached the file yet.
    pub fn get_flush_state(&self) -> bool {
        self.flush_log.load(Ordering::Acquire)
    }

    /// Registers the completion handle of a non-blocking log flush.
    pub fn set_flush_log_future(&self, future: Arc<FlushFuture>) {
        *self.flush_log_future.lock() = Some(future);
    }

    pub fn has_flush_log_future(&self) -> bool {
        self.flush_log_future.lock().is_some()
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn get_log_path(&self) -> &Path {
        &self.log_path
    }

    /// Flushes both files to disk.
    pub fn sync(&self) -> Result<()> {
        self.db_file.lock().sync_all()?;
        self.log_file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.db_file.get_mut().sync_all();
        let _ = self.log_file.get_mut().sync_all();
    }
}

fn open_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| {
            error!(path = %path.display(), error = %e, "cannot open file");
            CairnError::Io(e)
        })
}

/// Reads until `buf` is full or EOF, returning the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

fn log_io(op: &str, e: std::io::Error) -> CairnError {
    error!(op, error = %e, "disk I/O failed");
    CairnError::Io(e)
}
