//! Persistent stack of reclaimed slot numbers.
//!
//! One list hands out page RRNs to the B-tree, another hands out record
//! slots to the record store. A slot is reusable only while it is on the
//! list, and it can be on the list at most once.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::file::Rrn;

#[derive(Debug, Error)]
pub enum FreeListError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Slot {0} is already on the free list")]
    DuplicateSlot(Rrn),
}

pub type FreeListResult<T> = Result<T, FreeListError>;

/// On-disk form of the list
#[derive(Debug, Default, Serialize, Deserialize)]
struct FreeListFile {
    slots: Vec<Rrn>,
}

/// Free-slot list backed by a small JSON file
#[derive(Debug)]
pub struct FreeSlotList {
    path: PathBuf,
    /// Stack of free slots (top = last)
    slots: Vec<Rrn>,
    /// Membership set guarding against handing a slot out twice
    members: AHashSet<Rrn>,
}

impl FreeSlotList {
    /// An empty list that will persist to `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            slots: Vec::new(),
            members: AHashSet::new(),
        }
    }

    /// Load the list stored at `path`; a missing file is an empty list
    pub fn load<P: AsRef<Path>>(path: P) -> FreeListResult<Self> {
        let mut list = Self::new(path);
        if !list.path.exists() {
            return Ok(list);
        }

        let content = fs::read_to_string(&list.path)?;
        let file: FreeListFile = serde_json::from_str(&content)?;
        for rrn in file.slots {
            list.insert_free(rrn)?;
        }

        debug!(path = %list.path.display(), free = list.len(), "loaded free-slot list");
        Ok(list)
    }

    /// Rewrite the backing file with the current contents
    pub fn persist(&self) -> FreeListResult<()> {
        let file = FreeListFile {
            slots: self.slots.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Pop the most recently freed slot. `None` means the caller must
    /// append a fresh slot to its file.
    pub fn get_free(&mut self) -> Option<Rrn> {
        let rrn = self.slots.pop()?;
        self.members.remove(&rrn);
        Some(rrn)
    }

    /// Return a slot to the list
    pub fn insert_free(&mut self, rrn: Rrn) -> FreeListResult<()> {
        if !self.members.insert(rrn) {
            return Err(FreeListError::DuplicateSlot(rrn));
        }
        self.slots.push(rrn);
        Ok(())
    }

    pub fn contains(&self, rrn: Rrn) -> bool {
        self.members.contains(&rrn)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Free slots, bottom of the stack first
    pub fn slots(&self) -> &[Rrn] {
        &self.slots
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
