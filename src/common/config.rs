use std::path::{Path, PathBuf};

use super::types::{FrameId, PageId};
use super::{CairnError, Result};

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(-1);

/// Invalid frame ID constant
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Number of slots in a hash table directory page (2^MAX_GLOBAL_DEPTH)
pub const DIRECTORY_ARRAY_SIZE: usize = 512;

/// Largest global depth the fixed-size directory can address
pub const MAX_GLOBAL_DEPTH: u32 = 9;

/// Bucket splits attempted by a single insert before it gives up
pub const MAX_SPLIT_ATTEMPTS: usize = 8;

/// Extension of the write-ahead log file that sits next to the data file
pub const LOG_FILE_EXTENSION: &str = "log";

/// Runtime settings for opening a storage engine instance.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the primary data file.
    pub db_path: PathBuf,
    /// Number of frames in the buffer pool.
    pub pool_size: usize,
}

impl StorageConfig {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            pool_size: DEFAULT_BUFFER_POOL_SIZE,
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Path of the log file: the data file name with its extension replaced.
    pub fn log_path(&self) -> Result<PathBuf> {
        log_path_for(&self.db_path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(CairnError::InvalidConfig(
                "pool_size must be > 0".to_string(),
            ));
        }
        self.log_path().map(|_| ())
    }
}

/// Derives `foo.log` from `foo.db`.
pub(crate) fn log_path_for(db_path: &Path) -> Result<PathBuf> {
    match db_path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext != LOG_FILE_EXTENSION => Ok(db_path.with_extension(LOG_FILE_EXTENSION)),
        _ => Err(CairnError::InvalidDatabaseFile(
            db_path.display().to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path_replaces_extension() {
        let config = StorageConfig::new("/tmp/data/test.db");
        assert_eq!(
            config.log_path().unwrap(),
            PathBuf::from("/tmp/data/test.log")
        );
    }

    #[test]
    fn test_validate() {
        assert!(StorageConfig::new("a.db").validate().is_ok());
        assert!(StorageConfig::new("a.db").with_pool_size(0).validate().is_err());
        assert!(matches!(
            StorageConfig::new("no_extension").validate(),
            Err(CairnError::InvalidDatabaseFile(_))
        ));
        assert!(StorageConfig::new("wal.log").validate().is_err());
    }

    #[test]
    fn test_directory_fits_max_depth() {
        assert_eq!(1usize << MAX_GLOBAL_DEPTH, DIRECTORY_ARRAY_SIZE);
    }
}
