use std::fmt;

use thiserror::Error;

use super::types::PageId;

/// Database error types
#[derive(Error, Debug)]
pub enum CairnError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid database file: {0}")]
    InvalidDatabaseFile(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Log flusher error: {0}")]
    LogFlusher(String),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Page overflow: tuple size {tuple_size} exceeds available space {available}")]
    PageOverflow { tuple_size: usize, available: usize },

    #[error("Invalid slot: {0}")]
    InvalidSlot(u32),

    #[error("Tuple in slot {0} is deleted")]
    TupleDeleted(u32),

    #[error("Hash directory cannot grow beyond its fixed size")]
    DirectoryFull,

    #[error("Hash directory corrupted: {0}")]
    DirectoryCorrupted(String),

    #[error("Key size mismatch: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("Type error: {0}")]
    Type(#[from] TypeError),
}

pub type Result<T> = std::result::Result<T, CairnError>;

/// Kinds of failures raised by the typed value system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeErrorKind {
    OutOfRange,
    Conversion,
    UnknownType,
    Decimal,
    MismatchType,
    DivideByZero,
    IncompatibleType,
    NotImplemented,
}

impl fmt::Display for TypeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeErrorKind::OutOfRange => "out_of_range",
            TypeErrorKind::Conversion => "conversion",
            TypeErrorKind::UnknownType => "unknown_type",
            TypeErrorKind::Decimal => "decimal",
            TypeErrorKind::MismatchType => "mismatched_type",
            TypeErrorKind::DivideByZero => "divide_by_zero",
            TypeErrorKind::IncompatibleType => "incompatible_type",
            TypeErrorKind::NotImplemented => "not_implemented",
        };
        f.write_str(name)
    }
}

/// A typed error from the value system: a kind plus a human readable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TypeError {
    pub kind: TypeErrorKind,
    pub message: String,
}

impl TypeError {
    pub fn new(kind: TypeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is(&self, kind: TypeErrorKind) -> bool {
        self.kind == kind
    }
}
