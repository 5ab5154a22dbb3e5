use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::Rrn;

/// Byte offset of slot `rrn` in a file whose slots start after `header_size` bytes
pub fn slot_offset(header_size: u16, slot_size: u16, rrn: Rrn) -> u64 {
    header_size as u64 + slot_size as u64 * rrn as u64
}

/// A file made of a variable-length header followed by fixed-size slots.
///
/// Both the index file (pages) and the record file (records) are slot files;
/// this type only knows offsets and bytes, never what a slot contains.
pub struct SlotFile {
    file: File,
    path: PathBuf,
}

impl SlotFile {
    /// Create a new, empty file. Fails if the file already exists.
    pub fn create<P: AsRef<Path>>(path: P) -> FileResult<Self> {
        let path = path.as_ref();

        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing file for reading and writing
    pub fn open<P: AsRef<Path>>(path: P) -> FileResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(FileError::FileNotFound(path.display().to_string()));
        }

        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file length in bytes
    pub fn len(&self) -> FileResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> FileResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of whole slots stored after the header
    pub fn slot_count(&self, header_size: u16, slot_size: u16) -> FileResult<usize> {
        let len = self.len()?;
        let header = header_size as u64;
        if len <= header || slot_size == 0 {
            return Ok(0);
        }
        Ok(((len - header) / slot_size as u64) as usize)
    }

    /// Read exactly `buffer.len()` bytes starting at `offset`
    pub fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> FileResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buffer.len() {
            let n = self.file.read(&mut buffer[filled..])?;
            if n == 0 {
                return Err(FileError::ShortRead {
                    offset,
                    expected: buffer.len(),
                    actual: filled,
                });
            }
            filled += n;
        }

        Ok(())
    }

    /// Write the whole buffer at `offset`, extending the file when needed,
    /// and flush before returning
    pub fn write_at(&mut self, offset: u64, buffer: &[u8]) -> FileResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buffer)?;
        self.file.flush()?;
        Ok(())
    }

    /// Read slot `rrn`; the slot must lie entirely inside the file
    pub fn read_slot(
        &mut self,
        header_size: u16,
        slot_size: u16,
        rrn: Rrn,
        buffer: &mut [u8],
    ) -> FileResult<()> {
        if rrn as usize >= self.slot_count(header_size, slot_size)? {
            return Err(FileError::SlotOutOfRange(rrn as usize));
        }
        self.read_at(slot_offset(header_size, slot_size, rrn), buffer)
    }

    /// Overwrite (or append) slot `rrn`
    pub fn write_slot(
        &mut self,
        header_size: u16,
        slot_size: u16,
        rrn: Rrn,
        buffer: &[u8],
    ) -> FileResult<()> {
        self.write_at(slot_offset(header_size, slot_size, rrn), buffer)
    }

    /// Sync file contents to disk (flush all OS buffers)
    pub fn sync(&mut self) -> FileResult<()> {
        self.file.sync_data()?;
        Ok(())
    }
}
