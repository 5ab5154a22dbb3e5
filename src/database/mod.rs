//! Index plus record store behind one handle
//!
//! A database directory holds four files:
//! - `btree-<order>.idx` and its free page list `btree-<order>.hlp`
//! - `records.dat` and its free record-slot list `records.hlp`

use csv::ReaderBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::btree::{BTree, BTreeError, DeleteOutcome, Key, KeyId, TreeStats};
use crate::config::{ConfigError, EngineConfig};
use crate::file::Rrn;
use crate::free_list::{FreeListError, FreeSlotList};
use crate::record::{Record, RecordError, RecordStore};

/// Record file name inside a database directory
pub const RECORD_FILE: &str = "records.dat";

/// Free record-slot list name inside a database directory
pub const RECORD_FREE_LIST: &str = "records.hlp";

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database already exists at {0}")]
    DatabaseExists(String),

    #[error("No database found at {0}")]
    DatabaseNotFound(String),

    #[error("Cannot read/write file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Index error: {0}")]
    BTreeError(#[from] BTreeError),

    #[error("Record error: {0}")]
    RecordError(#[from] RecordError),

    #[error("Free-slot list error: {0}")]
    FreeListError(#[from] FreeListError),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Index entry {key} points at slot {slot} holding a different record")]
    KeyMismatch { key: KeyId, slot: Rrn },
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Outcome of `Database::build`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub inserted: usize,
    /// Deleted slots passed over
    pub tombstoned: usize,
    /// Records whose key was already indexed
    pub duplicates: usize,
}

pub struct Database {
    dir: PathBuf,
    config: EngineConfig,
    tree: BTree,
    records: RecordStore,
    /// Reclaimed record slots
    free_records: FreeSlotList,
}

impl Database {
    /// Create a new database in `dir`
    pub fn create<P: AsRef<Path>>(dir: P, config: EngineConfig) -> DatabaseResult<Self> {
        config.validate()?;
        let dir = dir.as_ref();
        let index_path = dir.join(config.index_file_name());

        if index_path.exists() || dir.join(RECORD_FILE).exists() {
            return Err(DatabaseError::DatabaseExists(dir.display().to_string()));
        }
        fs::create_dir_all(dir)?;

        let tree = BTree::create(&index_path, config.page_layout(), config.cache_capacity()?)?;
        let records =
            RecordStore::create(dir.join(RECORD_FILE), config.record_layout(), RECORD_FREE_LIST)?;
        let free_records = FreeSlotList::new(records.free_list_path());
        free_records.persist()?;

        info!(dir = %dir.display(), order = config.order, "created database");

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            tree,
            records,
            free_records,
        })
    }

    /// Open the database in `dir`; `config` must match the one it was created with
    pub fn open<P: AsRef<Path>>(dir: P, config: EngineConfig) -> DatabaseResult<Self> {
        config.validate()?;
        let dir = dir.as_ref();
        let index_path = dir.join(config.index_file_name());

        if !index_path.exists() || !dir.join(RECORD_FILE).exists() {
            return Err(DatabaseError::DatabaseNotFound(dir.display().to_string()));
        }

        let tree = BTree::open(&index_path, config.page_layout(), config.cache_capacity()?)?;
        let records = RecordStore::open(dir.join(RECORD_FILE), config.record_layout())?;
        let free_records = FreeSlotList::load(records.free_list_path())?;

        info!(
            dir = %dir.display(),
            records = records.slot_count()?,
            free_slots = free_records.len(),
            "opened database"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            tree,
            records,
            free_records,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tree(&self) -> &BTree {
        &self.tree
    }

    /// Record slots waiting to be reused
    pub fn free_record_slots(&self) -> &[Rrn] {
        self.free_records.slots()
    }

    /// Number of slots in the record file, live or deleted
    pub fn record_slots(&self) -> DatabaseResult<usize> {
        Ok(self.records.slot_count()?)
    }

    fn key_id(&self, key: &str) -> DatabaseResult<KeyId> {
        Ok(KeyId::new(key, self.config.key_width)?)
    }

    /// Load the record an index entry points at
    fn load_record(&mut self, key: &Key) -> DatabaseResult<Record> {
        let record = self.records.load(key.slot)?;
        if record.key != key.id {
            return Err(DatabaseError::KeyMismatch {
                key: key.id.clone(),
                slot: key.slot,
            });
        }
        Ok(record)
    }

    /// Find the record stored under `key`
    pub fn search(&mut self, key: &str) -> DatabaseResult<Option<Record>> {
        let id = self.key_id(key)?;
        match self.tree.lookup(&id)? {
            Some(entry) => Ok(Some(self.load_record(&entry)?)),
            None => Ok(None),
        }
    }

    /// Records with `start <= key <= end`, ascending
    pub fn range_search(&mut self, start: &str, end: &str) -> DatabaseResult<Vec<Record>> {
        let start = self.key_id(start)?;
        let end = self.key_id(end)?;

        let entries = self.tree.range_search(&start, &end)?;
        entries
            .iter()
            .map(|entry| self.load_record(entry))
            .collect()
    }

    /// Store a new record and index it; returns its slot.
    ///
    /// A reclaimed slot is used before the record file grows. The record is
    /// written before the key is indexed; if indexing fails the slot is
    /// tombstoned and goes on the free list.
    pub fn insert(&mut self, key: &str, payload: &[u8]) -> DatabaseResult<Rrn> {
        let record = Record::new(self.key_id(key)?, payload);

        let (slot, reused) = match self.free_records.get_free() {
            Some(slot) => (slot, true),
            None => (self.records.next_slot()?, false),
        };

        if let Err(err) = self.records.store(slot, &record) {
            if reused {
                self.free_records.insert_free(slot)?;
            }
            return Err(err.into());
        }

        if let Err(err) = self.tree.insert(Key::new(record.key.clone(), slot)) {
            self.free_records.insert_free(slot)?;
            self.records.tombstone(slot)?;
            return Err(err.into());
        }

        debug!(key = %record.key, slot, reused, "inserted record");
        Ok(slot)
    }

    /// Remove `key` from the index and tombstone its record.
    ///
    /// The slot goes on the free list before the tombstone is written, so a
    /// failed tombstone never loses it.
    pub fn delete(&mut self, key: &str) -> DatabaseResult<DeleteOutcome> {
        let id = self.key_id(key)?;
        let outcome = self.tree.delete(&id)?;

        if let DeleteOutcome::Removed(slot) = outcome {
            self.free_records.insert_free(slot)?;
            self.records.tombstone(slot)?;
            debug!(key = %id, slot, "deleted record");
        }
        Ok(outcome)
    }

    /// Append a record to the record file without indexing it
    pub fn append_preloaded(&mut self, key: &str, payload: &[u8]) -> DatabaseResult<Rrn> {
        let record = Record::new(self.key_id(key)?, payload);
        Ok(self.records.append(&record)?)
    }

    /// Append every `key,payload` row of a headerless CSV file; returns the row count
    pub fn import_csv<P: AsRef<Path>>(&mut self, path: P) -> DatabaseResult<usize> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path.as_ref())?;

        let mut imported = 0;
        for row in reader.records() {
            let row = row?;
            let Some(key) = row.get(0).map(str::trim).filter(|k| !k.is_empty()) else {
                continue;
            };
            let payload = row.get(1).unwrap_or("").trim();
            self.append_preloaded(key, payload.as_bytes())?;
            imported += 1;
        }

        info!(path = %path.as_ref().display(), imported, "imported records");
        Ok(imported)
    }

    /// Index the first `n` records of the record file (slot i holds record i)
    pub fn build(&mut self, n: usize) -> DatabaseResult<BuildReport> {
        let mut report = BuildReport::default();
        let count = n.min(self.records.slot_count()?);

        for slot in 0..count {
            let slot = slot as Rrn;
            if self.records.is_tombstoned(slot)? {
                warn!(slot, "skipping deleted record");
                report.tombstoned += 1;
                continue;
            }

            let record = self.records.load(slot)?;
            match self.tree.insert(Key::new(record.key.clone(), slot)) {
                Ok(()) => report.inserted += 1,
                Err(BTreeError::DuplicateKey(key)) => {
                    warn!(%key, slot, "key already indexed");
                    report.duplicates += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        info!(
            inserted = report.inserted,
            tombstoned = report.tombstoned,
            duplicates = report.duplicates,
            "built index"
        );
        Ok(report)
    }

    /// Text table of every index page
    pub fn dump(&mut self) -> DatabaseResult<String> {
        Ok(self.tree.dump()?)
    }

    /// Check the index structure
    pub fn validate(&mut self) -> DatabaseResult<TreeStats> {
        Ok(self.tree.validate()?)
    }

    /// Persist both free lists and sync both files
    pub fn close(&mut self) -> DatabaseResult<()> {
        self.tree.close()?;
        self.free_records.persist()?;
        self.records.sync()?;
        debug!(dir = %self.dir.display(), "closed database");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests;
