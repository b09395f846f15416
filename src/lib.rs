//! Cairn - a disk-oriented storage engine core in Rust
//!
//! This crate provides the paged storage layer of a relational database: a
//! buffer pool over a disk file, a slotted table heap, and a disk-backed
//! extendible hash index. All structures live in fixed-size pages that are
//! cached by the buffer pool and written back to disk on eviction.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//!
//! - **Storage Layer** (`storage`): Handles disk I/O and page organization
//!   - `DiskManager`: Reads and writes pages and the log file
//!   - `LogFlusher`: Background log writes with completion handles
//!   - `TablePage` / `TableHeap`: Slotted tuple storage in linked pages
//!   - `HashTableDirectoryPage` / `HashTableBucketPage`: Hash index layouts
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPoolManager`: Fetches pages from disk and caches them in memory
//!   - `ClockReplacer`: Clock page replacement policy
//!   - `PageGuard`: RAII pin that unpins on drop
//!
//! - **Index** (`index`): `ExtendibleHashTable` and the `Index` trait
//!
//! - **Types** (`types`): Typed values and the key encoder
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cairn::buffer::BufferPoolManager;
//! use cairn::common::{PageId, Rid};
//! use cairn::index::ExtendibleHashTable;
//! use cairn::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let table = ExtendibleHashTable::new(Arc::clone(&bpm), 4).unwrap();
//! table.insert(&7u32.to_le_bytes(), Rid::new(PageId::new(1), 0)).unwrap();
//! assert_eq!(table.get_value(&7u32.to_le_bytes()).unwrap().len(), 1);
//!
//! bpm.flush_all_pages().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;
pub mod types;

// Re-export commonly used types at the crate root
pub use common::{CairnError, PageId, Result, Rid};
