use thiserror::Error;

use super::KeyId;
use crate::file::Rrn;
use crate::free_list::FreeListError;
use crate::index::IndexError;

/// Errors that can occur during B-tree operations
#[derive(Debug, Error)]
pub enum BTreeError {
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Free-slot list error: {0}")]
    FreeList(#[from] FreeListError),

    #[error("Duplicate key: {0}")]
    DuplicateKey(KeyId),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid page: {0}")]
    InvalidPage(u16),

    #[error("Invalid order: {0} (must be >= 3)")]
    InvalidOrder(usize),

    #[error("No page RRN left to allocate")]
    PageSpaceExhausted,

    #[error("Invalid tree state: {0}")]
    InvalidState(String),
}

impl BTreeError {
    /// Shorthand for the structural-invariant failures reported by `validate`
    pub(crate) fn invalid_state(rrn: Rrn, message: impl Into<String>) -> Self {
        BTreeError::InvalidState(format!("page {}: {}", rrn, message.into()))
    }
}

pub type BTreeResult<T> = Result<T, BTreeError>;
