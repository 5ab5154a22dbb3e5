use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use super::error::{BTreeError, BTreeResult};
use super::node::{Key, Page};
use super::{BTree, PageRef};
use crate::file::Rrn;

/// What an insert one level down reports to its caller
#[derive(Debug)]
enum InsertOutcome {
    Inserted,
    /// The child split: `key` and the new `right` page go into the parent
    Promoted { key: Key, right: Rrn },
}

impl BTree {
    /// Insert `key`, splitting pages and growing a new root as needed.
    ///
    /// Fails with `DuplicateKey` when the identifier is already present.
    pub fn insert(&mut self, key: Key) -> BTreeResult<()> {
        let Some(root) = self.root.clone() else {
            let rrn = self.allocate_rrn()?;
            let mut leaf = Page::new_leaf(rrn);
            leaf.keys.push(key);

            if let Err(err) = self.index.write_page(&leaf) {
                self.free_rrn(rrn)?;
                return Err(err.into());
            }
            self.set_root(Some(Rc::new(RefCell::new(leaf))))?;
            debug!(rrn, "created root leaf");
            return Ok(());
        };

        let old_root = root.borrow().rrn;
        match self.insert_key(PageRef::root(root), key)? {
            InsertOutcome::Inserted => Ok(()),
            InsertOutcome::Promoted { key, right } => {
                let rrn = self.allocate_rrn()?;
                let page = Page::new_internal(rrn, vec![key], vec![old_root, right]);

                if let Err(err) = self.index.write_page(&page) {
                    self.free_rrn(rrn)?;
                    return Err(err.into());
                }
                self.set_root(Some(Rc::new(RefCell::new(page))))?;
                debug!(rrn, left = old_root, right, "grew new root");
                Ok(())
            }
        }
    }

    /// Recursive insert below `page`
    fn insert_key(&mut self, page: PageRef, key: Key) -> BTreeResult<InsertOutcome> {
        let (pos, child) = {
            let p = page.page.borrow();
            match p.find_position(&key.id) {
                Ok(_) => return Err(BTreeError::DuplicateKey(key.id.clone())),
                Err(pos) if p.is_leaf => (pos, None),
                Err(pos) => (pos, Some(p.child(pos)?)),
            }
        };

        let outcome = match child {
            None => self.insert_into_page(&page, pos, key, None)?,
            Some(child_rrn) => {
                let child = self.load_page(child_rrn)?;
                match self.insert_key(child, key)? {
                    InsertOutcome::Inserted => InsertOutcome::Inserted,
                    InsertOutcome::Promoted { key, right } => {
                        self.insert_into_page(&page, pos, key, Some(right))?
                    }
                }
            }
        };

        self.release(page);
        Ok(outcome)
    }

    /// Place `key` (and for internal pages its right child) at `pos`, splitting when full
    fn insert_into_page(
        &mut self,
        page: &PageRef,
        pos: usize,
        key: Key,
        right_child: Option<Rrn>,
    ) -> BTreeResult<InsertOutcome> {
        let has_room = page.page.borrow().key_count() < self.max_keys();
        if !has_room {
            return self.split(page, pos, key, right_child);
        }

        page.page.borrow_mut().insert_at(pos, key, right_child);
        if let Err(err) = self.persist(&page.page) {
            self.restore(&page.page)?;
            return Err(err);
        }
        Ok(InsertOutcome::Inserted)
    }

    /// Split a full page around the incoming key.
    ///
    /// The page overflows to ORDER keys first, then `split = (ORDER-1)/2`:
    /// - Leaf: left keeps `[0, split]`, the right page's first key is copied up
    /// - Internal: left keeps `[0, split-1]`, key `split` moves up
    ///
    /// The sibling is written before the split page. If either write fails
    /// the sibling RRN goes back on the free list and the split page is
    /// reloaded from disk.
    fn split(
        &mut self,
        page: &PageRef,
        pos: usize,
        key: Key,
        right_child: Option<Rrn>,
    ) -> BTreeResult<InsertOutcome> {
        let sibling_rrn = self.allocate_rrn()?;
        let split = (self.order - 1) / 2;

        let (sibling, promoted) = {
            let mut left = page.page.borrow_mut();
            left.insert_at(pos, key, right_child);

            if left.is_leaf {
                let mut sibling = Page::new_leaf(sibling_rrn);
                sibling.keys = left.keys.split_off(split + 1);
                sibling.next_leaf = left.next_leaf;
                left.next_leaf = Some(sibling_rrn);

                let promoted = sibling
                    .first_key()
                    .cloned()
                    .ok_or_else(|| BTreeError::invalid_state(sibling_rrn, "empty split sibling"))?;
                (sibling, promoted)
            } else {
                let left_rrn = left.rrn;
                let keys = left.keys.split_off(split + 1);
                let children = left.children.split_off(split + 1);
                let promoted = left
                    .keys
                    .pop()
                    .ok_or_else(|| BTreeError::invalid_state(left_rrn, "empty split page"))?;
                (Page::new_internal(sibling_rrn, keys, children), promoted)
            }
        };

        let sibling = Rc::new(RefCell::new(sibling));
        if let Err(err) = self
            .persist(&sibling)
            .and_then(|()| self.persist(&page.page))
        {
            self.free_rrn(sibling_rrn)?;
            self.restore(&page.page)?;
            return Err(err);
        }

        debug!(
            left = page.rrn(),
            right = sibling_rrn,
            promoted = %promoted.id,
            "split page"
        );

        Ok(InsertOutcome::Promoted {
            key: promoted,
            right: sibling_rrn,
        })
    }
}
