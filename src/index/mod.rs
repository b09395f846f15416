mod extendible_hash_table;
mod hash_index;
mod index_factory;

pub use extendible_hash_table::ExtendibleHashTable;
pub use hash_index::ExtendibleHashIndex;
pub use index_factory::{create_index, Index, IndexKind, IndexMetadata};
