//! Index file management

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::btree::Page;
use crate::file::{NO_RRN, Rrn, SlotFile};

use super::error::{IndexError, IndexResult};
use super::serialization::{
    HEADER_FIXED_BYTES, IndexHeader, PageLayout, deserialize_header, deserialize_page,
    header_size_of, serialize_header, serialize_page,
};

/// Header plus fixed-size page slots on disk.
///
/// Knows how to read and write pages and the root pointer; the tree logic
/// lives in `crate::btree`.
pub struct IndexFile {
    file: SlotFile,
    header: IndexHeader,
    layout: PageLayout,
    /// First RRN never handed out (high-water mark)
    next_fresh: usize,
}

impl IndexFile {
    /// Create a new index file with an empty tree
    pub fn create<P: AsRef<Path>>(
        path: P,
        layout: PageLayout,
        free_list_id: &str,
    ) -> IndexResult<Self> {
        let page_size = Self::checked_page_size(layout)?;
        let header = IndexHeader::new(page_size, free_list_id)?;

        let mut file = SlotFile::create(path)?;
        file.write_at(0, &serialize_header(&header))?;

        debug!(
            path = %file.path().display(),
            page_size,
            header_size = header.header_size,
            "created index file"
        );

        Ok(Self {
            file,
            header,
            layout,
            next_fresh: 0,
        })
    }

    /// Open an existing index file; its page size must match `layout`
    pub fn open<P: AsRef<Path>>(path: P, layout: PageLayout) -> IndexResult<Self> {
        let mut file = SlotFile::open(path)?;

        let mut fixed = [0u8; HEADER_FIXED_BYTES];
        file.read_at(0, &mut fixed)?;
        let header_size = header_size_of(&fixed)?;
        if (header_size as usize) <= HEADER_FIXED_BYTES {
            return Err(IndexError::InvalidHeader(format!(
                "header size {} too small",
                header_size
            )));
        }

        let mut buf = vec![0u8; header_size as usize];
        file.read_at(0, &mut buf)?;
        let header = deserialize_header(&buf)?;

        if header.page_size as usize != layout.page_size() {
            return Err(IndexError::InvalidPageSize {
                expected: layout.page_size(),
                actual: header.page_size as usize,
            });
        }

        let next_fresh = file.slot_count(header.header_size, header.page_size)?;

        debug!(
            path = %file.path().display(),
            root = ?header.root_rrn,
            pages = next_fresh,
            "opened index file"
        );

        Ok(Self {
            file,
            header,
            layout,
            next_fresh,
        })
    }

    fn checked_page_size(layout: PageLayout) -> IndexResult<u16> {
        u16::try_from(layout.page_size()).map_err(|_| IndexError::InvalidPageSize {
            expected: u16::MAX as usize,
            actual: layout.page_size(),
        })
    }

    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Location of the free page list, next to the index file
    pub fn free_list_path(&self) -> PathBuf {
        self.file.path().with_file_name(&self.header.free_list_id)
    }

    pub fn root_rrn(&self) -> Option<Rrn> {
        self.header.root_rrn
    }

    /// Overwrite the root pointer (first two header bytes)
    pub fn write_root_rrn(&mut self, root: Option<Rrn>) -> IndexResult<()> {
        self.file
            .write_at(0, &root.unwrap_or(NO_RRN).to_le_bytes())?;
        self.header.root_rrn = root;
        Ok(())
    }

    /// Read and decode the page stored at `rrn`
    pub fn read_page(&mut self, rrn: Rrn) -> IndexResult<Page> {
        let mut buf = vec![0u8; self.layout.page_size()];
        self.file
            .read_slot(self.header.header_size, self.header.page_size, rrn, &mut buf)?;
        deserialize_page(&buf, rrn, self.layout)
    }

    /// Encode `page` and write it to its own slot
    pub fn write_page(&mut self, page: &Page) -> IndexResult<()> {
        let buf = serialize_page(page, self.layout)?;
        self.file
            .write_slot(self.header.header_size, self.header.page_size, page.rrn, &buf)?;

        if page.rrn as usize >= self.next_fresh {
            self.next_fresh = page.rrn as usize + 1;
        }
        Ok(())
    }

    /// Next never-used RRN; `None` once the RRN space is exhausted
    pub fn fresh_rrn(&mut self) -> Option<Rrn> {
        if self.next_fresh >= NO_RRN as usize {
            return None;
        }
        let rrn = self.next_fresh as Rrn;
        self.next_fresh += 1;
        Some(rrn)
    }

    /// Number of page slots handed out so far (live or free)
    pub fn page_count(&self) -> usize {
        self.next_fresh
    }

    /// Flush changes to disk
    pub fn sync(&mut self) -> IndexResult<()> {
        self.file.sync()?;
        Ok(())
    }
}
