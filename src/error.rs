//! Error types shared by the storage, access and executor layers.

use crate::access::Type;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur while reading, writing or reducing rows.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Malformed page data: {0}")]
    Format(String),

    #[error("Page {0} has no free slot")]
    SlotFull(PageId),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Index {index} out of range (len: {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Transaction {0} aborted")]
    TransactionAborted(TransactionId),

    #[error("Type mismatch at column {index}: expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        expected: Type,
        found: Type,
    },

    #[error("Field {0} is unset")]
    UnsetField(usize),

    #[error("Aggregate result {0} does not fit the output column")]
    Overflow(i64),

    #[error("Row stream is not open")]
    StreamNotOpen,

    #[error("Page {0} is leased read-only")]
    PermissionDenied(PageId),

    #[error("Page not found: {0}")]
    PageNotFound(PageId),

    #[error("Buffer pool is full: no clean unpinned page to evict")]
    BufferPoolFull,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for heapdb operations.
pub type DbResult<T> = Result<T, DbError>;
