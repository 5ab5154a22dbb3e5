use std::fmt;

use crate::file::Rrn;

use super::error::{BTreeError, BTreeResult};

/// Fixed-width key identifier.
///
/// Stored on disk NUL-padded to the configured width, so an identifier is
/// 1..=width bytes and never contains a NUL byte. Ordering is plain byte
/// order, the same as comparing the padded on-disk form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId(String);

impl KeyId {
    /// Validate `id` against the key width
    pub fn new(id: impl Into<String>, width: usize) -> BTreeResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(BTreeError::InvalidKey("empty key".to_string()));
        }
        if id.len() > width {
            return Err(BTreeError::InvalidKey(format!(
                "'{}' is {} bytes, key width is {}",
                id,
                id.len(),
                width
            )));
        }
        if id.bytes().any(|b| b == 0) {
            return Err(BTreeError::InvalidKey(format!("'{}' contains NUL", id)));
        }
        Ok(Self(id))
    }

    /// Decode a NUL-padded identifier; `None` for an all-NUL or non UTF-8 cell
    pub fn decode(padded: &[u8]) -> Option<Self> {
        let end = padded.iter().position(|&b| b == 0).unwrap_or(padded.len());
        if end == 0 {
            return None;
        }
        String::from_utf8(padded[..end].to_vec()).ok().map(Self)
    }

    /// Write the identifier into `cell`, NUL-padding the rest
    pub fn encode_into(&self, cell: &mut [u8]) {
        let bytes = self.0.as_bytes();
        cell[..bytes.len()].copy_from_slice(bytes);
        cell[bytes.len()..].fill(0);
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index entry: identifier plus the record slot it refers to.
///
/// Separator keys in internal pages are copies of leaf keys, so they carry
/// the slot of the leaf entry they were copied from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub id: KeyId,
    pub slot: Rrn,
}

impl Key {
    pub fn new(id: KeyId, slot: Rrn) -> Self {
        Self { id, slot }
    }
}

/// One tree page (node).
///
/// Internal pages: `children.len() == keys.len() + 1` and `next_leaf` is None.
/// Leaf pages: no children, `next_leaf` links to the right neighbour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Position of this page in the index file
    pub rrn: Rrn,
    pub is_leaf: bool,
    /// Keys in strictly ascending order
    pub keys: Vec<Key>,
    /// Child page RRNs (internal pages only)
    pub children: Vec<Rrn>,
    /// Next leaf in key order (leaf pages only)
    pub next_leaf: Option<Rrn>,
}

impl Page {
    /// Create an empty leaf
    pub fn new_leaf(rrn: Rrn) -> Self {
        Self {
            rrn,
            is_leaf: true,
            keys: Vec::new(),
            children: Vec::new(),
            next_leaf: None,
        }
    }

    /// Create an internal page with the given separators and children
    pub fn new_internal(rrn: Rrn, keys: Vec<Key>, children: Vec<Rrn>) -> Self {
        debug_assert_eq!(keys.len() + 1, children.len());
        Self {
            rrn,
            is_leaf: false,
            keys,
            children,
            next_leaf: None,
        }
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Linear scan for the first key >= `id`.
    ///
    /// `Ok(pos)` on an exact match, `Err(pos)` with the insertion point
    /// otherwise (same convention as `slice::binary_search`).
    pub fn find_position(&self, id: &KeyId) -> Result<usize, usize> {
        for (i, key) in self.keys.iter().enumerate() {
            if key.id == *id {
                return Ok(i);
            }
            if key.id > *id {
                return Err(i);
            }
        }
        Err(self.keys.len())
    }

    /// Child to follow for `id`: the one before the first key greater than `id`.
    ///
    /// A key equal to a separator lives in the right subtree because
    /// separators are copies of the right page's first key.
    pub fn child_index(&self, id: &KeyId) -> usize {
        self.keys
            .iter()
            .position(|key| key.id > *id)
            .unwrap_or(self.keys.len())
    }

    /// Child RRN at `index`
    pub fn child(&self, index: usize) -> BTreeResult<Rrn> {
        self.children
            .get(index)
            .copied()
            .ok_or(BTreeError::InvalidPage(self.rrn))
    }

    /// Insert `key` at `pos`, shifting right; for internal pages the new
    /// right child goes directly after the key
    pub fn insert_at(&mut self, pos: usize, key: Key, right_child: Option<Rrn>) {
        self.keys.insert(pos, key);
        if let Some(child) = right_child {
            self.children.insert(pos + 1, child);
        }
    }

    /// Remove and return the key at `pos`, shifting left
    pub fn remove_at(&mut self, pos: usize) -> Key {
        self.keys.remove(pos)
    }

    pub fn first_key(&self) -> Option<&Key> {
        self.keys.first()
    }

    pub fn last_key(&self) -> Option<&Key> {
        self.keys.last()
    }
}
