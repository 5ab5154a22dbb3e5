use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::{RecordError, RecordResult};
use super::record::{Record, RecordLayout, TOMBSTONE, is_tombstone};
use crate::file::{NO_RRN, Rrn, SlotFile, get_u16, put_u16};

/// header_size (2) + record_size (2)
const HEADER_FIXED_BYTES: usize = 4;

/// Record file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub header_size: u16,
    pub record_size: u16,
    /// Name of the file holding the free record-slot list
    pub free_list_id: String,
}

impl RecordHeader {
    fn new(record_size: u16, free_list_id: &str) -> RecordResult<Self> {
        if free_list_id.is_empty() || free_list_id.contains('\0') {
            return Err(RecordError::InvalidHeader(format!(
                "bad free-list identifier '{}'",
                free_list_id
            )));
        }
        let header_size = u16::try_from(HEADER_FIXED_BYTES + free_list_id.len() + 1)
            .map_err(|_| RecordError::InvalidHeader("free-list identifier too long".to_string()))?;

        Ok(Self {
            header_size,
            record_size,
            free_list_id: free_list_id.to_string(),
        })
    }

    fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.header_size as usize];
        put_u16(&mut buf, 0, self.header_size);
        put_u16(&mut buf, 2, self.record_size);
        let id = self.free_list_id.as_bytes();
        buf[HEADER_FIXED_BYTES..HEADER_FIXED_BYTES + id.len()].copy_from_slice(id);
        buf
    }

    fn deserialize(buf: &[u8]) -> RecordResult<Self> {
        if buf.len() <= HEADER_FIXED_BYTES {
            return Err(RecordError::InvalidHeader("header truncated".to_string()));
        }
        let header_size = get_u16(buf, 0);
        let record_size = get_u16(buf, 2);

        let id_bytes = &buf[HEADER_FIXED_BYTES..];
        let end = id_bytes.iter().position(|&b| b == 0).ok_or_else(|| {
            RecordError::InvalidHeader("free-list identifier not terminated".to_string())
        })?;
        let free_list_id = String::from_utf8(id_bytes[..end].to_vec())
            .map_err(|e| RecordError::InvalidHeader(e.to_string()))?;

        Ok(Self {
            header_size,
            record_size,
            free_list_id,
        })
    }
}

/// Fixed-size records addressed by slot number
pub struct RecordStore {
    file: SlotFile,
    header: RecordHeader,
    layout: RecordLayout,
}

impl RecordStore {
    /// Create a new, empty record file
    pub fn create<P: AsRef<Path>>(
        path: P,
        layout: RecordLayout,
        free_list_id: &str,
    ) -> RecordResult<Self> {
        let record_size = u16::try_from(layout.record_size()).map_err(|_| {
            RecordError::RecordSizeMismatch {
                expected: u16::MAX as usize,
                actual: layout.record_size(),
            }
        })?;
        let header = RecordHeader::new(record_size, free_list_id)?;

        let mut file = SlotFile::create(path)?;
        file.write_at(0, &header.serialize())?;

        debug!(path = %file.path().display(), record_size, "created record file");
        Ok(Self {
            file,
            header,
            layout,
        })
    }

    /// Open an existing record file; its record size must match `layout`
    pub fn open<P: AsRef<Path>>(path: P, layout: RecordLayout) -> RecordResult<Self> {
        let mut file = SlotFile::open(path)?;

        let mut fixed = [0u8; HEADER_FIXED_BYTES];
        file.read_at(0, &mut fixed)?;
        let header_size = get_u16(&fixed, 0) as usize;
        if header_size <= HEADER_FIXED_BYTES {
            return Err(RecordError::InvalidHeader(format!(
                "header size {} too small",
                header_size
            )));
        }

        let mut buf = vec![0u8; header_size];
        file.read_at(0, &mut buf)?;
        let header = RecordHeader::deserialize(&buf)?;

        if header.record_size as usize != layout.record_size() {
            return Err(RecordError::RecordSizeMismatch {
                expected: layout.record_size(),
                actual: header.record_size as usize,
            });
        }

        debug!(path = %file.path().display(), "opened record file");
        Ok(Self {
            file,
            header,
            layout,
        })
    }

    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Location of the free record-slot list, next to the record file
    pub fn free_list_path(&self) -> PathBuf {
        self.file.path().with_file_name(&self.header.free_list_id)
    }

    /// Number of slots in the file, live or deleted
    pub fn slot_count(&self) -> RecordResult<usize> {
        Ok(self
            .file
            .slot_count(self.header.header_size, self.header.record_size)?)
    }

    /// Slot a new record appended to the file would take
    pub fn next_slot(&self) -> RecordResult<Rrn> {
        let count = self.slot_count()?;
        if count >= NO_RRN as usize {
            return Err(RecordError::SlotSpaceExhausted);
        }
        Ok(count as Rrn)
    }

    fn read_raw(&mut self, slot: Rrn) -> RecordResult<Vec<u8>> {
        let mut buf = vec![0u8; self.layout.record_size()];
        self.file.read_slot(
            self.header.header_size,
            self.header.record_size,
            slot,
            &mut buf,
        )?;
        Ok(buf)
    }

    /// Read the record at `slot`; `Tombstoned` if it was deleted
    pub fn load(&mut self, slot: Rrn) -> RecordResult<Record> {
        let buf = self.read_raw(slot)?;
        Record::deserialize(&buf, slot, self.layout)
    }

    pub fn is_tombstoned(&mut self, slot: Rrn) -> RecordResult<bool> {
        Ok(is_tombstone(&self.read_raw(slot)?))
    }

    /// Write `record` to `slot`, overwriting or extending the file
    pub fn store(&mut self, slot: Rrn, record: &Record) -> RecordResult<()> {
        let buf = record.serialize(self.layout)?;
        self.file
            .write_slot(self.header.header_size, self.header.record_size, slot, &buf)?;
        Ok(())
    }

    /// Append `record` after the last slot
    pub fn append(&mut self, record: &Record) -> RecordResult<Rrn> {
        let slot = self.next_slot()?;
        self.store(slot, record)?;
        Ok(slot)
    }

    /// Overwrite the record at `slot` with the tombstone byte
    pub fn tombstone(&mut self, slot: Rrn) -> RecordResult<()> {
        if slot as usize >= self.slot_count()? {
            return Err(crate::file::FileError::SlotOutOfRange(slot as usize).into());
        }
        let buf = vec![TOMBSTONE; self.layout.record_size()];
        self.file
            .write_slot(self.header.header_size, self.header.record_size, slot, &buf)?;
        debug!(slot, "tombstoned record");
        Ok(())
    }

    pub fn sync(&mut self) -> RecordResult<()> {
        self.file.sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::KeyId;
    use tempfile::TempDir;

    fn layout() -> RecordLayout {
        RecordLayout::new(7, 32)
    }

    fn record(n: usize) -> Record {
        Record::new(
            KeyId::new(format!("AAA{:04}", n), 7).unwrap(),
            format!("payload {}", n),
        )
    }

    fn setup_store() -> (TempDir, RecordStore) {
        let temp_dir = TempDir::new().unwrap();
        let store =
            RecordStore::create(temp_dir.path().join("records.dat"), layout(), "records.hlp")
                .unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_header_written_on_create() {
        let (temp_dir, store) = setup_store();
        assert_eq!(store.header().header_size as usize, 4 + "records.hlp".len() + 1);
        assert_eq!(store.header().record_size as usize, layout().record_size());
        assert_eq!(store.slot_count().unwrap(), 0);
        assert_eq!(store.free_list_path(), temp_dir.path().join("records.hlp"));
    }

    #[test]
    fn test_append_and_load() {
        let (_temp, mut store) = setup_store();

        for n in 0..5 {
            assert_eq!(store.append(&record(n)).unwrap(), n as Rrn);
        }
        assert_eq!(store.slot_count().unwrap(), 5);
        assert_eq!(store.next_slot().unwrap(), 5);
        assert_eq!(store.load(3).unwrap(), record(3));
    }

    #[test]
    fn test_tombstone_and_overwrite() {
        let (_temp, mut store) = setup_store();
        for n in 0..3 {
            store.append(&record(n)).unwrap();
        }

        store.tombstone(1).unwrap();
        assert!(store.is_tombstoned(1).unwrap());
        assert!(matches!(store.load(1), Err(RecordError::Tombstoned(1))));
        assert_eq!(store.slot_count().unwrap(), 3);

        store.store(1, &record(9)).unwrap();
        assert_eq!(store.load(1).unwrap(), record(9));
        assert!(!store.is_tombstoned(1).unwrap());

        assert!(store.tombstone(7).is_err());
    }

    #[test]
    fn test_load_out_of_range() {
        let (_temp, mut store) = setup_store();
        assert!(matches!(store.load(0), Err(RecordError::File(_))));
    }

    #[test]
    fn test_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("records.dat");
        {
            let mut store = RecordStore::create(&path, layout(), "records.hlp").unwrap();
            store.append(&record(0)).unwrap();
            store.append(&record(1)).unwrap();
            store.sync().unwrap();
        }

        let mut store = RecordStore::open(&path, layout()).unwrap();
        assert_eq!(store.slot_count().unwrap(), 2);
        assert_eq!(store.load(1).unwrap(), record(1));
        assert_eq!(store.header().free_list_id, "records.hlp");

        let result = RecordStore::open(&path, RecordLayout::new(7, 64));
        assert!(matches!(
            result,
            Err(RecordError::RecordSizeMismatch { .. })
        ));
    }
}
