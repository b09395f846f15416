use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, Result, Rid};
use crate::types::Value;

use super::{ExtendibleHashTable, Index, IndexMetadata};

/// An [`Index`] over typed key values backed by an [`ExtendibleHashTable`].
pub struct ExtendibleHashIndex {
    metadata: IndexMetadata,
    table: ExtendibleHashTable,
}

impl ExtendibleHashIndex {
    pub fn new(metadata: IndexMetadata, bpm: Arc<BufferPoolManager>) -> Result<Self> {
        let table = ExtendibleHashTable::new(bpm, metadata.key_size())?;
        Ok(Self { metadata, table })
    }

    /// Reattaches to an index whose directory page already exists.
    pub fn open(
        metadata: IndexMetadata,
        bpm: Arc<BufferPoolManager>,
        directory_page_id: PageId,
    ) -> Result<Self> {
        let table = ExtendibleHashTable::open(bpm, directory_page_id, metadata.key_size())?;
        Ok(Self { metadata, table })
    }

    pub fn table(&self) -> &ExtendibleHashTable {
        &self.table
    }
}

impl Index for ExtendibleHashIndex {
    fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    fn insert_entry(&self, key: &[Value], rid: Rid) -> Result<bool> {
        let key = self.metadata.key_schema().encode(key)?;
        self.table.insert(&key, rid)
    }

    fn delete_entry(&self, key: &[Value], rid: Rid) -> Result<bool> {
        let key = self.metadata.key_schema().encode(key)?;
        self.table.remove(&key, rid)
    }

    fn scan_key(&self, key: &[Value]) -> Result<Vec<Rid>> {
        let key = self.metadata.key_schema().encode(key)?;
        self.table.get_value(&key)
    }
}
