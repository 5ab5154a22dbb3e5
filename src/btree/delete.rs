use tracing::debug;

use super::error::{BTreeError, BTreeResult};
use super::node::KeyId;
use super::{BTree, PageRef};
use crate::file::Rrn;

/// Result of `BTree::delete`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Key removed from its leaf; carries the record slot it referenced
    Removed(Rrn),
    /// Key found as a separator in an internal page; nothing changed
    SeparatorRetained,
    NotFound,
}

/// One step of the delete descent
enum Descent {
    Leaf(usize),
    Separator,
    Missing,
    Child(usize, Rrn),
}

impl BTree {
    /// Delete `id` and rebalance the pages it leaves short.
    ///
    /// The descent stops at the first page holding `id`. If that page is
    /// internal the tree is left untouched.
    pub fn delete(&mut self, id: &KeyId) -> BTreeResult<DeleteOutcome> {
        let Some(root) = self.root.clone() else {
            return Ok(DeleteOutcome::NotFound);
        };

        // Parents of `current`, each with the child index taken from it
        let mut path: Vec<(PageRef, usize)> = Vec::new();
        let mut current = PageRef::root(root);

        let pos = loop {
            let step = {
                let page = current.page.borrow();
                match page.find_position(id) {
                    Ok(pos) if page.is_leaf => Descent::Leaf(pos),
                    Ok(_) => Descent::Separator,
                    Err(_) if page.is_leaf => Descent::Missing,
                    Err(pos) => Descent::Child(pos, page.child(pos)?),
                }
            };

            match step {
                Descent::Leaf(pos) => break pos,
                Descent::Separator => {
                    debug!(key = %id, rrn = current.rrn(), "key is a separator, not deleted");
                    self.release(current);
                    self.release_path(path);
                    return Ok(DeleteOutcome::SeparatorRetained);
                }
                Descent::Missing => {
                    self.release(current);
                    self.release_path(path);
                    return Ok(DeleteOutcome::NotFound);
                }
                Descent::Child(index, rrn) => {
                    let child = self.load_page(rrn)?;
                    path.push((current, index));
                    current = child;
                }
            }
        };

        let removed = current.page.borrow_mut().remove_at(pos);
        let remaining = current.page.borrow().key_count();

        if path.is_empty() {
            if remaining == 0 {
                let rrn = current.rrn();
                self.release(current);
                self.set_root(None)?;
                self.free_rrn(rrn)?;
                debug!(rrn, "tree is now empty");
            } else {
                self.persist(&current.page)?;
                self.release(current);
            }
            return Ok(DeleteOutcome::Removed(removed.slot));
        }

        self.persist(&current.page)?;
        if remaining < self.min_leaf_keys() {
            self.rebalance_leaf(current, path)?;
        } else {
            self.release(current);
            self.release_path(path);
        }

        Ok(DeleteOutcome::Removed(removed.slot))
    }

    /// Fix a short non-root leaf: borrow from a sibling, else merge with one
    fn rebalance_leaf(&mut self, leaf: PageRef, mut path: Vec<(PageRef, usize)>) -> BTreeResult<()> {
        let Some((parent, idx)) = path.pop() else {
            self.release(leaf);
            return Ok(());
        };
        let min = self.min_leaf_keys();
        let child_count = parent.page.borrow().child_count();

        let mut left_sibling = None;
        if idx > 0 {
            let left_rrn = parent.page.borrow().child(idx - 1)?;
            let left = self.load_page(left_rrn)?;

            if left.page.borrow().key_count() > min {
                let borrowed = left
                    .page
                    .borrow_mut()
                    .keys
                    .pop()
                    .ok_or_else(|| BTreeError::invalid_state(left_rrn, "empty sibling"))?;
                leaf.page.borrow_mut().keys.insert(0, borrowed.clone());
                parent.page.borrow_mut().keys[idx - 1] = borrowed;

                self.persist(&left.page)?;
                self.persist(&leaf.page)?;
                self.persist(&parent.page)?;
                debug!(from = left_rrn, to = leaf.rrn(), "borrowed key from left leaf");

                self.release(left);
                self.release(leaf);
                self.release(parent);
                self.release_path(path);
                return Ok(());
            }
            left_sibling = Some(left);
        }

        let mut right_sibling = None;
        if idx + 1 < child_count {
            let right_rrn = parent.page.borrow().child(idx + 1)?;
            let right = self.load_page(right_rrn)?;

            if right.page.borrow().key_count() > min {
                let separator = {
                    let mut donor = right.page.borrow_mut();
                    let borrowed = donor.remove_at(0);
                    leaf.page.borrow_mut().keys.push(borrowed);
                    let next_first = donor.first_key().cloned();
                    next_first
                        .ok_or_else(|| BTreeError::invalid_state(right_rrn, "empty sibling"))?
                };
                parent.page.borrow_mut().keys[idx] = separator;

                self.persist(&right.page)?;
                self.persist(&leaf.page)?;
                self.persist(&parent.page)?;
                debug!(from = right_rrn, to = leaf.rrn(), "borrowed key from right leaf");

                if let Some(left) = left_sibling {
                    self.release(left);
                }
                self.release(right);
                self.release(leaf);
                self.release(parent);
                self.release_path(path);
                return Ok(());
            }
            right_sibling = Some(right);
        }

        // Merge, with the left page of the pair as the base
        let (left, right, sep_idx) = match (left_sibling, right_sibling) {
            (Some(left), right) => {
                if let Some(right) = right {
                    self.release(right);
                }
                (left, leaf, idx - 1)
            }
            (None, Some(right)) => (leaf, right, idx),
            (None, None) => {
                return Err(BTreeError::invalid_state(leaf.rrn(), "leaf has no sibling"));
            }
        };

        let right_rrn = right.rrn();
        {
            let mut base = left.page.borrow_mut();
            let mut absorbed = right.page.borrow_mut();
            base.keys.append(&mut absorbed.keys);
            base.next_leaf = absorbed.next_leaf;
        }
        {
            let mut p = parent.page.borrow_mut();
            p.remove_at(sep_idx);
            p.children.remove(sep_idx + 1);
        }

        self.persist(&left.page)?;
        self.persist(&parent.page)?;
        debug!(left = left.rrn(), right = right_rrn, "merged leaves");

        self.release(right);
        self.free_rrn(right_rrn)?;
        self.release(left);

        self.rebalance_internal(parent, path)
    }

    /// Fix an internal page after it lost a key: collapse an empty root,
    /// otherwise rotate through the parent or merge, cascading upward
    fn rebalance_internal(
        &mut self,
        node: PageRef,
        mut path: Vec<(PageRef, usize)>,
    ) -> BTreeResult<()> {
        let count = node.page.borrow().key_count();

        let Some((parent, idx)) = path.pop() else {
            if count == 0 {
                let old_root = node.rrn();
                let child_rrn = node.page.borrow().child(0)?;
                self.release(node);

                let child = self.load_page(child_rrn)?;
                self.set_root(Some(child.page.clone()))?;
                self.free_rrn(old_root)?;
                debug!(old_root, new_root = child_rrn, "collapsed root");
            } else {
                self.release(node);
            }
            return Ok(());
        };

        let min = self.min_internal_keys();
        if count >= min {
            self.release(node);
            self.release(parent);
            self.release_path(path);
            return Ok(());
        }

        let child_count = parent.page.borrow().child_count();

        let mut left_sibling = None;
        if idx > 0 {
            let left_rrn = parent.page.borrow().child(idx - 1)?;
            let left = self.load_page(left_rrn)?;

            if left.page.borrow().key_count() > min {
                {
                    let mut donor = left.page.borrow_mut();
                    let key = donor
                        .keys
                        .pop()
                        .ok_or_else(|| BTreeError::invalid_state(left_rrn, "empty sibling"))?;
                    let child = donor
                        .children
                        .pop()
                        .ok_or_else(|| BTreeError::invalid_state(left_rrn, "no child to move"))?;

                    let separator = std::mem::replace(&mut parent.page.borrow_mut().keys[idx - 1], key);
                    let mut receiver = node.page.borrow_mut();
                    receiver.keys.insert(0, separator);
                    receiver.children.insert(0, child);
                }

                self.persist(&left.page)?;
                self.persist(&node.page)?;
                self.persist(&parent.page)?;
                debug!(from = left_rrn, to = node.rrn(), "rotated key from left page");

                self.release(left);
                self.release(node);
                self.release(parent);
                self.release_path(path);
                return Ok(());
            }
            left_sibling = Some(left);
        }

        let mut right_sibling = None;
        if idx + 1 < child_count {
            let right_rrn = parent.page.borrow().child(idx + 1)?;
            let right = self.load_page(right_rrn)?;

            if right.page.borrow().key_count() > min {
                {
                    let mut donor = right.page.borrow_mut();
                    let key = donor.remove_at(0);
                    let child = donor.children.remove(0);

                    let separator = std::mem::replace(&mut parent.page.borrow_mut().keys[idx], key);
                    let mut receiver = node.page.borrow_mut();
                    receiver.keys.push(separator);
                    receiver.children.push(child);
                }

                self.persist(&right.page)?;
                self.persist(&node.page)?;
                self.persist(&parent.page)?;
                debug!(from = right_rrn, to = node.rrn(), "rotated key from right page");

                if let Some(left) = left_sibling {
                    self.release(left);
                }
                self.release(right);
                self.release(node);
                self.release(parent);
                self.release_path(path);
                return Ok(());
            }
            right_sibling = Some(right);
        }

        let (left, right, sep_idx) = match (left_sibling, right_sibling) {
            (Some(left), right) => {
                if let Some(right) = right {
                    self.release(right);
                }
                (left, node, idx - 1)
            }
            (None, Some(right)) => (node, right, idx),
            (None, None) => {
                return Err(BTreeError::invalid_state(node.rrn(), "page has no sibling"));
            }
        };

        // The separator between the pair comes down into the merged page
        let right_rrn = right.rrn();
        {
            let mut p = parent.page.borrow_mut();
            let separator = p.remove_at(sep_idx);
            p.children.remove(sep_idx + 1);

            let mut base = left.page.borrow_mut();
            let mut absorbed = right.page.borrow_mut();
            base.keys.push(separator);
            base.keys.append(&mut absorbed.keys);
            base.children.append(&mut absorbed.children);
        }

        self.persist(&left.page)?;
        self.persist(&parent.page)?;
        debug!(left = left.rrn(), right = right_rrn, "merged internal pages");

        self.release(right);
        self.free_rrn(right_rrn)?;
        self.release(left);

        self.rebalance_internal(parent, path)
    }
}
