use thiserror::Error;

use crate::file::{FileError, Rrn};

/// Result type for index file operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur while reading or writing the index file
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File error: {0}")]
    FileError(#[from] FileError),

    #[error("Invalid index header: {0}")]
    InvalidHeader(String),

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Corrupted page data at page {0}: {1}")]
    CorruptedPage(Rrn, String),

    #[error("Invalid node type: {0}")]
    InvalidNodeType(u8),

    #[error("Page {0} holds more entries than the page layout allows")]
    PageOverflow(Rrn),

    #[error("Key '{key}' on page {rrn} is wider than the {width}-byte key cell")]
    KeyTooWide { rrn: Rrn, key: String, width: usize },
}
