use lru::LruCache;
use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::rc::Rc;
use tracing::trace;

use super::Rrn;
use crate::btree::Page;

/// A tree page shared between the cache and any call frame holding it.
///
/// Eviction only drops the cache's handle; a frame that still holds the
/// page keeps it alive until the frame lets go.
pub type SharedPage = Rc<RefCell<Page>>;

/// Counters for cache activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded set of recently pushed tree pages, keyed by page RRN.
///
/// Eviction is FIFO by push order: lookups use `peek`, so reading a page
/// never refreshes its position and the LRU end of the underlying cache is
/// always the oldest push.
pub struct PageCache {
    /// Pages in push order (most recent at the front)
    entries: LruCache<Rrn, SharedPage>,
    stats: CacheStats,
}

impl PageCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    /// Maximum number of pages held at once
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the exact shared page object cached for `rrn`, if any
    pub fn lookup(&mut self, rrn: Rrn) -> Option<SharedPage> {
        match self.entries.peek(&rrn) {
            Some(page) => {
                self.stats.hits += 1;
                trace!(rrn, "page cache hit");
                Some(Rc::clone(page))
            }
            None => {
                self.stats.misses += 1;
                trace!(rrn, "page cache miss");
                None
            }
        }
    }

    /// Check membership without touching the counters
    pub fn contains(&self, rrn: Rrn) -> bool {
        self.entries.contains(&rrn)
    }

    /// True when the cache tracks this exact page object (not just its RRN)
    pub fn holds(&self, page: &SharedPage) -> bool {
        let rrn = page.borrow().rrn;
        self.entries
            .peek(&rrn)
            .is_some_and(|cached| Rc::ptr_eq(cached, page))
    }

    /// Track a page. No-op when its RRN is already cached; at capacity the
    /// oldest push is evicted first.
    pub fn push(&mut self, page: SharedPage) {
        let rrn = page.borrow().rrn;
        if self.entries.contains(&rrn) {
            return;
        }

        if self.entries.len() >= self.capacity() {
            self.pop_oldest();
        }

        self.entries.put(rrn, page);
    }

    /// Remove and return the least recently pushed page
    pub fn pop_oldest(&mut self) -> Option<SharedPage> {
        let (rrn, page) = self.entries.pop_lru()?;
        self.stats.evictions += 1;
        trace!(rrn, "evicted page from cache");
        Some(page)
    }

    /// Forget the page cached for `rrn` (its slot was returned to the free list)
    pub fn invalidate(&mut self, rrn: Rrn) -> Option<SharedPage> {
        self.entries.pop(&rrn)
    }

    /// Cached RRNs, most recently pushed first
    pub fn cached_rrns(&self) -> Vec<Rrn> {
        self.entries.iter().map(|(rrn, _)| *rrn).collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Drop every tracked page in one pass
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
