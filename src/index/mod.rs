//! On-disk index file: header, page codec and page slots

mod error;
mod index_file;
mod serialization;

pub use error::{IndexError, IndexResult};
pub use index_file::IndexFile;
pub use serialization::{IndexHeader, PageLayout};
