//! Disk-backed B+ tree over fixed-width string keys
//!
//! Every page lives in its own slot of the index file and is written back
//! as soon as an operation changes it. Pages are shared between the page
//! cache and the call frames of an operation as `Rc<RefCell<Page>>`:
//! - Internal pages hold separator keys that are copies of leaf keys
//! - Leaves are chained through `next_leaf` for range scans
//! - Page RRNs vacated by merges are recycled through a free-slot list
//!
//! Deleting a key that is also a separator is not supported: the delete
//! stops at the internal page and reports `DeleteOutcome::SeparatorRetained`.

mod delete;
mod error;
mod insert;
mod node;

pub use delete::DeleteOutcome;
pub use error::{BTreeError, BTreeResult};
pub use node::{Key, KeyId, Page};

use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::path::Path;
use std::rc::Rc;

use prettytable::{Table, row};
use tracing::{debug, info, trace};

use crate::file::{CacheStats, PageCache, Rrn, SharedPage};
use crate::free_list::FreeSlotList;
use crate::index::{IndexFile, PageLayout};

/// Default tree order (max children per internal page)
pub const DEFAULT_ORDER: usize = 5;

/// Default key identifier width in bytes
pub const DEFAULT_KEY_WIDTH: usize = 7;

/// Where a page handle came from.
///
/// The tag does not manage memory: dropping the `Rc` handle is what frees a
/// page once no cache entry or frame holds it. It records origin only, so
/// tests and `release` can tell a root, a cache hit and a fresh disk read apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Residency {
    Root,
    Cached,
    Local,
}

/// A loaded page together with its residency tag
pub(crate) struct PageRef {
    page: SharedPage,
    residency: Residency,
}

impl PageRef {
    fn root(page: SharedPage) -> Self {
        Self {
            page,
            residency: Residency::Root,
        }
    }

    fn rrn(&self) -> Rrn {
        self.page.borrow().rrn
    }
}

/// Result of `BTree::search`: the page where the descent stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub rrn: Rrn,
    pub is_leaf: bool,
    /// Position of the key, or where it would be inserted
    pub position: usize,
    pub found: bool,
}

/// Shape of the tree, as measured by `BTree::validate`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub height: usize,
    pub pages: usize,
    pub leaves: usize,
    pub keys: usize,
}

/// Accumulator for the validation walk
#[derive(Default)]
struct Walk {
    stats: TreeStats,
    leaves: Vec<Rrn>,
    leaf_depth: Option<usize>,
}

/// Order-bounded B+ tree stored in an index file
///
/// Order `m` means:
/// - Pages hold at most `m-1` keys, internal pages at most `m` children
/// - Leaves (except root) hold at least `ceil((m-1)/2)` keys
/// - Internal pages (except root) hold at least `floor((m-1)/2)` keys
pub struct BTree {
    index: IndexFile,
    cache: PageCache,
    /// Reclaimed page RRNs
    free_pages: FreeSlotList,
    /// Root page, kept in memory for the lifetime of the tree
    root: Option<SharedPage>,
    order: usize,
}

impl BTree {
    /// Create a new index file holding an empty tree
    pub fn create<P: AsRef<Path>>(
        path: P,
        layout: PageLayout,
        cache_capacity: NonZeroUsize,
    ) -> BTreeResult<Self> {
        if layout.order < 3 {
            return Err(BTreeError::InvalidOrder(layout.order));
        }

        let path = path.as_ref();
        let free_list_id = Self::free_list_id(path);
        let index = IndexFile::create(path, layout, &free_list_id)?;

        let free_pages = FreeSlotList::new(index.free_list_path());
        free_pages.persist()?;

        info!(path = %path.display(), order = layout.order, "created index");

        Ok(Self {
            index,
            cache: PageCache::new(cache_capacity),
            free_pages,
            root: None,
            order: layout.order,
        })
    }

    /// Open an existing index file and load its root page
    pub fn open<P: AsRef<Path>>(
        path: P,
        layout: PageLayout,
        cache_capacity: NonZeroUsize,
    ) -> BTreeResult<Self> {
        if layout.order < 3 {
            return Err(BTreeError::InvalidOrder(layout.order));
        }

        let mut index = IndexFile::open(path.as_ref(), layout)?;
        let free_pages = FreeSlotList::load(index.free_list_path())?;

        let root = match index.root_rrn() {
            Some(rrn) => Some(Rc::new(RefCell::new(index.read_page(rrn)?))),
            None => None,
        };

        info!(
            path = %path.as_ref().display(),
            root = ?index.root_rrn(),
            free_pages = free_pages.len(),
            "opened index"
        );

        Ok(Self {
            index,
            cache: PageCache::new(cache_capacity),
            free_pages,
            root,
            order: layout.order,
        })
    }

    /// `btree-5.idx` keeps its free page list in `btree-5.hlp`
    fn free_list_id(path: &Path) -> String {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        format!("{}.hlp", stem)
    }

    /// Persist the free page list, sync the file and drop every cached page
    pub fn close(&mut self) -> BTreeResult<()> {
        self.free_pages.persist()?;
        self.index.sync()?;
        self.cache.clear();
        debug!(path = %self.index.path().display(), "closed index");
        Ok(())
    }

    // ========== Accessors ==========

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn root_rrn(&self) -> Option<Rrn> {
        self.root.as_ref().map(|root| root.borrow().rrn)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Page RRNs currently on the free list
    pub fn free_pages(&self) -> &[Rrn] {
        self.free_pages.slots()
    }

    pub fn index_path(&self) -> &Path {
        self.index.path()
    }

    fn max_keys(&self) -> usize {
        self.order - 1
    }

    /// Minimum keys in a non-root leaf
    fn min_leaf_keys(&self) -> usize {
        (self.order - 1).div_ceil(2)
    }

    /// Minimum keys in a non-root internal page
    fn min_internal_keys(&self) -> usize {
        (self.order - 1) / 2
    }

    // ========== Page handling ==========

    /// Fetch a page: the root, then the cache, then the index file
    fn load_page(&mut self, rrn: Rrn) -> BTreeResult<PageRef> {
        if let Some(root) = &self.root {
            if root.borrow().rrn == rrn {
                return Ok(PageRef::root(Rc::clone(root)));
            }
        }

        if let Some(page) = self.cache.lookup(rrn) {
            return Ok(PageRef {
                page,
                residency: Residency::Cached,
            });
        }

        let page = Rc::new(RefCell::new(self.index.read_page(rrn)?));
        self.cache.push(Rc::clone(&page));
        Ok(PageRef {
            page,
            residency: Residency::Local,
        })
    }

    /// Drop a handle once the descent has moved past it.
    ///
    /// Dropping `page` frees it; a `Local` page the cache has since evicted
    /// goes away here and is traced.
    fn release(&self, page: PageRef) {
        if page.residency == Residency::Local && !self.cache.holds(&page.page) {
            trace!(rrn = page.rrn(), "discarding uncached page");
        }
    }

    fn release_path(&self, path: Vec<(PageRef, usize)>) {
        for (page, _) in path {
            self.release(page);
        }
    }

    /// Write a page to its slot and make it the cached copy for its RRN
    fn persist(&mut self, page: &SharedPage) -> BTreeResult<()> {
        let rrn = {
            let page = page.borrow();
            self.index.write_page(&page)?;
            page.rrn
        };

        let is_root = self
            .root
            .as_ref()
            .is_some_and(|root| Rc::ptr_eq(root, page));
        if !is_root && !self.cache.holds(page) {
            self.cache.invalidate(rrn);
            self.cache.push(Rc::clone(page));
        }
        Ok(())
    }

    /// Replace an in-memory page with its on-disk copy after a failed write
    fn restore(&mut self, page: &SharedPage) -> BTreeResult<()> {
        let rrn = page.borrow().rrn;
        let stored = self.index.read_page(rrn)?;
        *page.borrow_mut() = stored;
        debug!(rrn, "restored page from disk");
        Ok(())
    }

    /// RRN for a new page: a reclaimed one if available, else the next fresh slot
    fn allocate_rrn(&mut self) -> BTreeResult<Rrn> {
        if let Some(rrn) = self.free_pages.get_free() {
            debug!(rrn, "reusing free page");
            return Ok(rrn);
        }
        self.index
            .fresh_rrn()
            .ok_or(BTreeError::PageSpaceExhausted)
    }

    /// Return a discarded page's RRN to the free list
    fn free_rrn(&mut self, rrn: Rrn) -> BTreeResult<()> {
        self.cache.invalidate(rrn);
        self.free_pages.insert_free(rrn)?;
        debug!(rrn, "freed page");
        Ok(())
    }

    /// Replace the root and rewrite the root pointer in the header
    fn set_root(&mut self, root: Option<SharedPage>) -> BTreeResult<()> {
        let rrn = root.as_ref().map(|page| page.borrow().rrn);
        self.index.write_root_rrn(rrn)?;
        self.root = root;
        debug!(root = ?rrn, "root changed");
        Ok(())
    }

    // ========== Search ==========

    /// Descend towards `id`, stopping at the first page holding it exactly.
    ///
    /// Returns `None` for an empty tree. The last page is returned whether or
    /// not the key was found.
    pub fn search(&mut self, id: &KeyId) -> BTreeResult<Option<Location>> {
        let Some(root) = self.root.clone() else {
            return Ok(None);
        };

        let mut current = PageRef::root(root);
        loop {
            let (location, child) = {
                let page = current.page.borrow();
                let position = page.find_position(id);
                let location = Location {
                    rrn: page.rrn,
                    is_leaf: page.is_leaf,
                    position: position.unwrap_or_else(|pos| pos),
                    found: position.is_ok(),
                };
                let child = match position {
                    Err(pos) if !page.is_leaf => Some(page.child(pos)?),
                    _ => None,
                };
                (location, child)
            };

            match child {
                None => {
                    self.release(current);
                    return Ok(Some(location));
                }
                Some(rrn) => {
                    let next = self.load_page(rrn)?;
                    self.release(current);
                    current = next;
                }
            }
        }
    }

    /// Leaf whose key range covers `id`
    fn find_leaf(&mut self, id: &KeyId) -> BTreeResult<Option<PageRef>> {
        let Some(root) = self.root.clone() else {
            return Ok(None);
        };

        let mut current = PageRef::root(root);
        loop {
            let child = {
                let page = current.page.borrow();
                if page.is_leaf {
                    None
                } else {
                    Some(page.child(page.child_index(id))?)
                }
            };

            match child {
                None => return Ok(Some(current)),
                Some(rrn) => {
                    let next = self.load_page(rrn)?;
                    self.release(current);
                    current = next;
                }
            }
        }
    }

    /// Leaf entry for `id`, if present
    pub fn lookup(&mut self, id: &KeyId) -> BTreeResult<Option<Key>> {
        let Some(leaf) = self.find_leaf(id)? else {
            return Ok(None);
        };

        let key = {
            let page = leaf.page.borrow();
            page.find_position(id)
                .ok()
                .map(|pos| page.keys[pos].clone())
        };
        self.release(leaf);
        Ok(key)
    }

    /// All leaf entries with `start <= id <= end`, ascending
    pub fn range_search(&mut self, start: &KeyId, end: &KeyId) -> BTreeResult<Vec<Key>> {
        let mut results = Vec::new();
        if start > end {
            return Ok(results);
        }

        let Some(mut leaf) = self.find_leaf(start)? else {
            return Ok(results);
        };

        loop {
            let next = {
                let page = leaf.page.borrow();
                let mut past_end = false;
                for key in &page.keys {
                    if key.id > *end {
                        past_end = true;
                        break;
                    }
                    if key.id >= *start {
                        results.push(key.clone());
                    }
                }
                if past_end { None } else { page.next_leaf }
            };

            match next {
                None => {
                    self.release(leaf);
                    break;
                }
                Some(rrn) => {
                    let next_leaf = self.load_page(rrn)?;
                    self.release(leaf);
                    leaf = next_leaf;
                }
            }
        }

        Ok(results)
    }

    // ========== Inspection ==========

    /// Render every page level by level as a text table
    pub fn dump(&mut self) -> BTreeResult<String> {
        let mut table = Table::new();
        table.set_titles(row!["Level", "RRN", "Leaf", "Keys", "Children", "Next"]);

        let mut level: Vec<Rrn> = self.root_rrn().into_iter().collect();
        let mut depth = 0;
        while !level.is_empty() {
            let mut next_level = Vec::new();
            for rrn in level {
                let page = self.load_page(rrn)?;
                {
                    let p = page.page.borrow();
                    let keys = p
                        .keys
                        .iter()
                        .map(|k| format!("{}@{}", k.id, k.slot))
                        .collect::<Vec<_>>()
                        .join(" ");
                    let children = p
                        .children
                        .iter()
                        .map(|c| c.to_string())
                        .collect::<Vec<_>>()
                        .join(" ");
                    let next = p
                        .next_leaf
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    table.add_row(row![depth, p.rrn, p.is_leaf, keys, children, next]);
                    next_level.extend(p.children.iter().copied());
                }
                self.release(page);
            }
            level = next_level;
            depth += 1;
        }

        Ok(table.to_string())
    }

    /// Walk the whole tree and check its structural invariants
    pub fn validate(&mut self) -> BTreeResult<TreeStats> {
        let Some(root) = self.root.clone() else {
            return Ok(TreeStats::default());
        };

        let mut walk = Walk::default();
        self.validate_page(PageRef::root(root), None, None, 1, &mut walk)?;
        self.validate_leaf_chain(&walk.leaves)?;

        Ok(walk.stats)
    }

    /// Check one page and recurse; keys must lie in `[low, high)`
    fn validate_page(
        &mut self,
        page: PageRef,
        low: Option<KeyId>,
        high: Option<KeyId>,
        depth: usize,
        walk: &mut Walk,
    ) -> BTreeResult<()> {
        let is_root = page.residency == Residency::Root;
        let (rrn, is_leaf, keys, children) = {
            let p = page.page.borrow();
            (p.rrn, p.is_leaf, p.keys.clone(), p.children.clone())
        };
        self.release(page);

        if keys.len() > self.max_keys() {
            return Err(BTreeError::invalid_state(rrn, "too many keys"));
        }
        if keys.windows(2).any(|pair| pair[0].id >= pair[1].id) {
            return Err(BTreeError::invalid_state(rrn, "keys out of order"));
        }
        if let (Some(low), Some(first)) = (&low, keys.first()) {
            if first.id < *low {
                return Err(BTreeError::invalid_state(rrn, "key below separator"));
            }
        }
        if let (Some(high), Some(last)) = (&high, keys.last()) {
            if last.id >= *high {
                return Err(BTreeError::invalid_state(rrn, "key above separator"));
            }
        }

        walk.stats.pages += 1;
        walk.stats.height = walk.stats.height.max(depth);

        if is_leaf {
            if !is_root && keys.len() < self.min_leaf_keys() {
                return Err(BTreeError::invalid_state(rrn, "leaf underflow"));
            }
            match walk.leaf_depth {
                Some(d) if d != depth => {
                    return Err(BTreeError::invalid_state(rrn, "leaves at different depths"));
                }
                _ => walk.leaf_depth = Some(depth),
            }
            walk.stats.leaves += 1;
            walk.stats.keys += keys.len();
            walk.leaves.push(rrn);
            return Ok(());
        }

        if keys.is_empty() || (!is_root && keys.len() < self.min_internal_keys()) {
            return Err(BTreeError::invalid_state(rrn, "internal underflow"));
        }
        if children.len() != keys.len() + 1 {
            return Err(BTreeError::invalid_state(rrn, "child count mismatch"));
        }

        for (i, &child) in children.iter().enumerate() {
            let child_low = if i == 0 {
                low.clone()
            } else {
                Some(keys[i - 1].id.clone())
            };
            let child_high = if i == keys.len() {
                high.clone()
            } else {
                Some(keys[i].id.clone())
            };
            let child_page = self.load_page(child)?;
            self.validate_page(child_page, child_low, child_high, depth + 1, walk)?;
        }

        Ok(())
    }

    /// The `next_leaf` chain must visit exactly the leaves in key order
    fn validate_leaf_chain(&mut self, leaves: &[Rrn]) -> BTreeResult<()> {
        let mut next = leaves.first().copied();
        let mut seen = 0;

        while let Some(rrn) = next {
            if leaves.get(seen) != Some(&rrn) {
                return Err(BTreeError::invalid_state(rrn, "leaf chain out of order"));
            }
            let page = self.load_page(rrn)?;
            next = page.page.borrow().next_leaf;
            self.release(page);
            seen += 1;
        }

        if seen != leaves.len() {
            let last = leaves.last().copied().unwrap_or_default();
            return Err(BTreeError::invalid_state(last, "leaf chain ends early"));
        }
        Ok(())
    }
}

impl Drop for BTree {
    fn drop(&mut self) {
        // Persist the free page list when the tree is dropped
        let _ = self.close();
    }
}
