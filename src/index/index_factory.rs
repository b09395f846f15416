use std::fmt;
use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{Result, Rid};
use crate::types::{KeySchema, Value};

use super::ExtendibleHashIndex;

/// Describes an index: its name, the table it covers, which table columns
/// form the key, and how the key is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    name: String,
    table_name: String,
    key_attrs: Vec<u32>,
    key_schema: KeySchema,
}

impl IndexMetadata {
    pub fn new(
        name: impl Into<String>,
        table_name: impl Into<String>,
        key_attrs: Vec<u32>,
        key_schema: KeySchema,
    ) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            key_attrs,
            key_schema,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Positions of the key columns in the table schema.
    pub fn key_attrs(&self) -> &[u32] {
        &self.key_attrs
    }

    pub fn key_schema(&self) -> &KeySchema {
        &self.key_schema
    }

    /// Size in bytes of an encoded key.
    pub fn key_size(&self) -> usize {
        self.key_schema.key_size()
    }
}

/// Operations every index supports. Keys are given as typed values and
/// encoded with the index's key schema.
pub trait Index: Send + Sync {
    fn metadata(&self) -> &IndexMetadata;

    /// Adds an entry. Returns false if it was already present or could not
    /// be placed.
    fn insert_entry(&self, key: &[Value], rid: Rid) -> Result<bool>;

    /// Removes an entry. Returns false if it was not present.
    fn delete_entry(&self, key: &[Value], rid: Rid) -> Result<bool>;

    /// Returns every RID stored under `key`.
    fn scan_key(&self, key: &[Value]) -> Result<Vec<Rid>>;
}

/// The index implementations [`create_index`] can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    ExtendibleHash,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::ExtendibleHash => write!(f, "extendible_hash"),
        }
    }
}

/// Builds a new, empty index of the given kind.
pub fn create_index(
    kind: IndexKind,
    metadata: IndexMetadata,
    bpm: Arc<BufferPoolManager>,
) -> Result<Box<dyn Index>> {
    match kind {
        IndexKind::ExtendibleHash => Ok(Box::new(ExtendibleHashIndex::new(metadata, bpm)?)),
    }
}
