use crate::btree::BTreeError;
use crate::file::{FileError, Rrn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Invalid key: {0}")]
    InvalidKey(#[from] BTreeError),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid record file header: {0}")]
    InvalidHeader(String),

    #[error("Record size mismatch: expected {expected}, got {actual}")]
    RecordSizeMismatch { expected: usize, actual: usize },

    #[error("Payload of {actual} bytes exceeds the maximum of {max}")]
    PayloadTooLarge { actual: usize, max: usize },

    #[error("Record slot {0} is deleted")]
    Tombstoned(Rrn),

    #[error("No record slot left to allocate")]
    SlotSpaceExhausted,
}

pub type RecordResult<T> = Result<T, RecordError>;
