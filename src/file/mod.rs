mod error;
mod page_cache;
mod slot_file;

pub use error::{FileError, FileResult};
pub use page_cache::{CacheStats, PageCache, SharedPage};
pub use slot_file::{SlotFile, slot_offset};

/// Relative record number: position of a fixed-size slot inside its file
pub type Rrn = u16;

/// On-disk sentinel for "no slot" (empty root, end of the leaf chain, unused child)
pub const NO_RRN: Rrn = Rrn::MAX;

/// Default number of pages held by the page cache
pub const DEFAULT_CACHE_CAPACITY: usize = 16;

/// Read a little-endian u16 at `offset`
pub fn get_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

/// Write a little-endian u16 at `offset`
pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}
