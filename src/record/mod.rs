//! Fixed-size record file with tombstoned deletes

mod error;
mod record;
mod store;

pub use error::{RecordError, RecordResult};
pub use record::{Record, RecordLayout, TOMBSTONE, is_tombstone};
pub use store::{RecordHeader, RecordStore};
