//! tree drives btree operations across pages: search, insert with splits
//! propagating up, delete with borrow/merge rebalancing, and in-order scans.
//!
//! Children are referenced by page number, never by a resident handle; the
//! scan rebuilds its path in a local stack of decoded pages. Pages are
//! mutated in memory and written back whole through the Pager.

use std::path::Path;

use log::debug;

use super::header::PageHeader;
use super::interior::InteriorPage;
use super::leaf::LeafPage;
use super::{PageType, RowId, MIN_KEYS};
use crate::pager::{PageNum, Pager, PAGE_SIZE};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Btree: {0}")]
    Pager(#[from] crate::pager::Error),
    #[error("Btree: {0}")]
    Header(#[from] super::header::Error),
    #[error("Btree: {0}")]
    Leaf(#[from] super::leaf::Error),
    #[error("Btree: {0}")]
    Interior(#[from] super::interior::Error),
    #[error("Btree: tree structure is inconsistent: {0}")]
    TreeShape(&'static str),
}

enum Node {
    Leaf(LeafPage),
    Interior(InteriorPage),
}

impl Node {
    fn num_keys(&self) -> usize {
        match self {
            Node::Leaf(p) => p.num_keys(),
            Node::Interior(p) => p.num_keys(),
        }
    }
}

/// An ordered `RowId -> bytes` map stored across the pages of one table
/// file. The current root page number is mirrored in the file's 4-byte
/// header after every operation that moves the root.
pub struct BTree {
    pager: Pager,
    root_page: PageNum,
}

impl BTree {
    /// Opens the btree stored in the table file at `path`, creating the
    /// file (with an empty root at page 1) if it does not exist.
    pub fn open(path: &Path) -> Result<BTree, Error> {
        let mut pager = Pager::open(path)?;
        let root_page = pager.read_root_page_number()?;
        Ok(BTree { pager, root_page })
    }

    pub fn root_page(&self) -> PageNum {
        self.root_page
    }

    /// Flushes and fsyncs the underlying file.
    pub fn close(self) -> Result<(), Error> {
        self.pager.close()?;
        Ok(())
    }

    fn load_node(&mut self, page_number: PageNum) -> Result<Node, Error> {
        let data = self.pager.read_page(page_number)?;
        if super::header::is_blank_page(&data) {
            return Ok(Node::Leaf(LeafPage::new()));
        }
        match PageHeader::from_bytes(&data)?.page_type {
            PageType::Leaf => Ok(Node::Leaf(LeafPage::from_bytes(&data)?)),
            PageType::Interior => Ok(Node::Interior(InteriorPage::from_bytes(&data)?)),
        }
    }

    fn write_leaf(&mut self, page_number: PageNum, page: &LeafPage) -> Result<(), Error> {
        let bytes = page.to_bytes()?;
        self.pager.write_page(page_number, &bytes)?;
        Ok(())
    }

    fn write_interior(&mut self, page_number: PageNum, page: &InteriorPage) -> Result<(), Error> {
        let bytes = page.to_bytes()?;
        self.pager.write_page(page_number, &bytes)?;
        Ok(())
    }

    /// Whether the tree holds no cells at all.
    pub fn is_empty(&mut self) -> Result<bool, Error> {
        match self.load_node(self.root_page)? {
            Node::Leaf(leaf) => Ok(leaf.num_keys() == 0),
            Node::Interior(_) => Ok(false),
        }
    }

    /// The largest key currently stored, found by walking the rightmost
    /// spine. `None` for an empty tree.
    pub fn max_key(&mut self) -> Result<Option<RowId>, Error> {
        let mut page_number = self.root_page;
        loop {
            match self.load_node(page_number)? {
                Node::Leaf(leaf) => return Ok(leaf.cells.last().map(|(k, _)| *k)),
                Node::Interior(node) => page_number = node.child_at(node.num_keys()),
            }
        }
    }

    /// Standard descent to the value stored under `key`, or a miss.
    pub fn search(&mut self, key: RowId) -> Result<Option<Vec<u8>>, Error> {
        let mut page_number = self.root_page;
        loop {
            match self.load_node(page_number)? {
                Node::Leaf(leaf) => return Ok(leaf.get(key).map(|v| v.to_vec())),
                Node::Interior(node) => page_number = node.child_at(node.child_index(key)),
            }
        }
    }

    /// Inserts `(key, value)`, splitting on the way back up as needed. An
    /// existing key is overwritten in place and never triggers a split.
    /// Returns the page number of the leaf that finally holds the key.
    pub fn insert(&mut self, key: RowId, value: &[u8]) -> Result<PageNum, Error> {
        let (landed, split) = self.insert_into(self.root_page, key, value)?;
        if let Some((separator, right_page)) = split {
            // Promotion passed the old root: grow the tree by one level.
            let mut new_root = InteriorPage::new(self.root_page);
            new_root.insert_separator(separator, right_page);
            let new_root_page = self.pager.allocate_page()?;
            self.write_interior(new_root_page, &new_root)?;
            self.root_page = new_root_page;
            self.pager.write_root_page_number(new_root_page)?;
            debug!(
                "root split: new root page {} with separator {}",
                new_root_page, separator
            );
        }
        Ok(landed)
    }

    fn insert_into(
        &mut self,
        page_number: PageNum,
        key: RowId,
        value: &[u8],
    ) -> Result<(PageNum, Option<(RowId, PageNum)>), Error> {
        match self.load_node(page_number)? {
            Node::Leaf(mut leaf) => {
                if leaf.contains_key(key) || !leaf.is_full(value) {
                    leaf.insert_cell(key, value.to_vec());
                    self.write_leaf(page_number, &leaf)?;
                    return Ok((page_number, None));
                }
                leaf.insert_cell(key, value.to_vec());
                let (separator, right) = leaf.split();
                let right_page = self.pager.allocate_page()?;
                self.write_leaf(right_page, &right)?;
                self.write_leaf(page_number, &leaf)?;
                debug!(
                    "leaf {} split: separator {} to new page {}",
                    page_number, separator, right_page
                );
                let landed = if key >= separator { right_page } else { page_number };
                Ok((landed, Some((separator, right_page))))
            }
            Node::Interior(mut node) => {
                let idx = node.child_index(key);
                let child = node.child_at(idx);
                let (landed, split) = self.insert_into(child, key, value)?;
                let Some((separator, right_page)) = split else {
                    return Ok((landed, None));
                };
                node.insert_separator(separator, right_page);
                if node.is_overfull() {
                    let (up_separator, right) = node.split();
                    let right_interior = self.pager.allocate_page()?;
                    self.write_interior(right_interior, &right)?;
                    self.write_interior(page_number, &node)?;
                    debug!(
                        "interior {} split: separator {} to new page {}",
                        page_number, up_separator, right_interior
                    );
                    return Ok((landed, Some((up_separator, right_interior))));
                }
                self.write_interior(page_number, &node)?;
                Ok((landed, None))
            }
        }
    }

    /// Rewrites the value of an existing cell in place. `page_hint` is the
    /// leaf page recorded when the row was materialized; if the tree has
    /// reorganized since and the key is no longer there, the leaf is found
    /// again by descent. Returns the page that now holds the key.
    pub fn update_in_leaf(
        &mut self,
        page_hint: PageNum,
        key: RowId,
        value: &[u8],
    ) -> Result<PageNum, Error> {
        if page_hint >= 1 {
            if let Node::Leaf(mut leaf) = self.load_node(page_hint)? {
                if leaf.contains_key(key) {
                    leaf.update_cell(key, value.to_vec())?;
                    self.write_leaf(page_hint, &leaf)?;
                    return Ok(page_hint);
                }
            }
        }
        let (page_number, mut leaf) = self.find_leaf(key)?;
        leaf.update_cell(key, value.to_vec())?;
        self.write_leaf(page_number, &leaf)?;
        Ok(page_number)
    }

    fn find_leaf(&mut self, key: RowId) -> Result<(PageNum, LeafPage), Error> {
        let mut page_number = self.root_page;
        loop {
            match self.load_node(page_number)? {
                Node::Leaf(leaf) => return Ok((page_number, leaf)),
                Node::Interior(node) => page_number = node.child_at(node.child_index(key)),
            }
        }
    }

    /// Deletes `key`, rebalancing underfull pages on the way back up.
    /// Returns whether the key was present. Freed pages are orphaned, not
    /// reused.
    pub fn delete(&mut self, key: RowId) -> Result<bool, Error> {
        let removed = self.delete_from(self.root_page, key)?;
        if removed {
            if let Node::Interior(root) = self.load_node(self.root_page)? {
                if root.num_keys() == 0 {
                    // The root lost its last separator: its only child is
                    // the new root.
                    self.root_page = root.leftmost_child;
                    self.pager.write_root_page_number(self.root_page)?;
                    debug!("root collapsed to page {}", self.root_page);
                }
            }
        }
        Ok(removed)
    }

    fn delete_from(&mut self, page_number: PageNum, key: RowId) -> Result<bool, Error> {
        match self.load_node(page_number)? {
            Node::Leaf(mut leaf) => {
                if !leaf.remove_cell(key) {
                    return Ok(false);
                }
                self.write_leaf(page_number, &leaf)?;
                Ok(true)
            }
            Node::Interior(mut node) => {
                let idx = node.child_index(key);
                let child = node.child_at(idx);
                let removed = self.delete_from(child, key)?;
                if removed {
                    self.rebalance_child(&mut node, idx)?;
                    self.write_interior(page_number, &node)?;
                }
                Ok(removed)
            }
        }
    }

    /// Restores the minimum-occupancy invariant for child `child_idx` of
    /// `parent` after a delete below it. Borrows from the left sibling
    /// first, then the right; otherwise merges, preferring the left
    /// sibling. The caller writes the (possibly modified) parent.
    fn rebalance_child(
        &mut self,
        parent: &mut InteriorPage,
        child_idx: usize,
    ) -> Result<(), Error> {
        let child_page = parent.child_at(child_idx);
        let child = self.load_node(child_page)?;
        if child.num_keys() >= MIN_KEYS {
            return Ok(());
        }
        if child_idx > 0 {
            let left_page = parent.child_at(child_idx - 1);
            let left = self.load_node(left_page)?;
            if left.num_keys() > MIN_KEYS {
                return self.borrow_from_left(parent, child_idx, left_page, left, child_page, child);
            }
        }
        if child_idx < parent.num_keys() {
            let right_page = parent.child_at(child_idx + 1);
            let right = self.load_node(right_page)?;
            if right.num_keys() > MIN_KEYS {
                return self.borrow_from_right(
                    parent, child_idx, child_page, child, right_page, right,
                );
            }
        }
        if child_idx > 0 {
            let left_page = parent.child_at(child_idx - 1);
            let left = self.load_node(left_page)?;
            self.merge_into_left(parent, child_idx - 1, left_page, left, child)
        } else if child_idx < parent.num_keys() {
            let right_page = parent.child_at(child_idx + 1);
            let right = self.load_node(right_page)?;
            self.merge_into_left(parent, child_idx, child_page, child, right)
        } else {
            // A parent with a single child only occurs at the root, which
            // is collapsed by delete() once the unwind reaches it.
            Ok(())
        }
    }

    fn borrow_from_left(
        &mut self,
        parent: &mut InteriorPage,
        child_idx: usize,
        left_page: PageNum,
        left: Node,
        child_page: PageNum,
        child: Node,
    ) -> Result<(), Error> {
        let sep_idx = child_idx - 1;
        match (left, child) {
            (Node::Leaf(mut left), Node::Leaf(mut child)) => {
                let Some(cell) = left.cells.pop() else {
                    return Err(Error::TreeShape("borrow source leaf is empty"));
                };
                // The moved cell becomes the child's minimum and the new
                // boundary in the parent.
                parent.entries[sep_idx].0 = cell.0;
                child.cells.insert(0, cell);
                self.write_leaf(left_page, &left)?;
                self.write_leaf(child_page, &child)?;
                debug!("leaf {} borrowed key from left sibling {}", child_page, left_page);
                Ok(())
            }
            (Node::Interior(mut left), Node::Interior(mut child)) => {
                let Some((up_key, moved_child)) = left.entries.pop() else {
                    return Err(Error::TreeShape("borrow source interior is empty"));
                };
                // Parent separator rotates down; the left sibling's edge
                // key rotates up; its edge child pointer follows.
                let down_key = parent.entries[sep_idx].0;
                child.entries.insert(0, (down_key, child.leftmost_child));
                child.leftmost_child = moved_child;
                parent.entries[sep_idx].0 = up_key;
                self.write_interior(left_page, &left)?;
                self.write_interior(child_page, &child)?;
                Ok(())
            }
            _ => Err(Error::TreeShape("siblings have different page types")),
        }
    }

    fn borrow_from_right(
        &mut self,
        parent: &mut InteriorPage,
        child_idx: usize,
        child_page: PageNum,
        child: Node,
        right_page: PageNum,
        right: Node,
    ) -> Result<(), Error> {
        let sep_idx = child_idx;
        match (child, right) {
            (Node::Leaf(mut child), Node::Leaf(mut right)) => {
                if right.cells.is_empty() {
                    return Err(Error::TreeShape("borrow source leaf is empty"));
                }
                let cell = right.cells.remove(0);
                child.cells.push(cell);
                let Some(&(new_min, _)) = right.cells.first() else {
                    return Err(Error::TreeShape("borrow drained the right sibling"));
                };
                parent.entries[sep_idx].0 = new_min;
                self.write_leaf(child_page, &child)?;
                self.write_leaf(right_page, &right)?;
                debug!("leaf {} borrowed key from right sibling {}", child_page, right_page);
                Ok(())
            }
            (Node::Interior(mut child), Node::Interior(mut right)) => {
                if right.entries.is_empty() {
                    return Err(Error::TreeShape("borrow source interior is empty"));
                }
                let down_key = parent.entries[sep_idx].0;
                child.entries.push((down_key, right.leftmost_child));
                let (up_key, new_leftmost) = right.entries.remove(0);
                right.leftmost_child = new_leftmost;
                parent.entries[sep_idx].0 = up_key;
                self.write_interior(child_page, &child)?;
                self.write_interior(right_page, &right)?;
                Ok(())
            }
            _ => Err(Error::TreeShape("siblings have different page types")),
        }
    }

    /// Merges the child at `left_idx + 1` into the child at `left_idx`,
    /// removing the separator between them from the parent. The emptied
    /// right page is orphaned. A merge that would overflow the byte bound
    /// is skipped; the page stays slightly underfull, which the
    /// byte-derived capacity tolerates.
    // TODO: track orphaned pages in a free list so allocate_page can reuse
    // them instead of growing the file.
    fn merge_into_left(
        &mut self,
        parent: &mut InteriorPage,
        left_idx: usize,
        left_page: PageNum,
        left: Node,
        right: Node,
    ) -> Result<(), Error> {
        match (left, right) {
            (Node::Leaf(mut left), Node::Leaf(right)) => {
                let combined =
                    left.encoded_size() + right.encoded_size() - super::header::PAGE_HEADER_SIZE;
                if combined > PAGE_SIZE {
                    return Ok(());
                }
                parent.entries.remove(left_idx);
                left.cells.extend(right.cells);
                self.write_leaf(left_page, &left)?;
                debug!("merged leaf into page {}", left_page);
                Ok(())
            }
            (Node::Interior(mut left), Node::Interior(right)) => {
                let merged_keys = left.num_keys() + 1 + right.num_keys();
                if InteriorPage::encoded_size_for(merged_keys) > PAGE_SIZE {
                    return Ok(());
                }
                let (separator, _right_page) = parent.entries.remove(left_idx);
                left.entries.push((separator, right.leftmost_child));
                left.entries.extend(right.entries);
                self.write_interior(left_page, &left)?;
                debug!("merged interior into page {}", left_page);
                Ok(())
            }
            _ => Err(Error::TreeShape("siblings have different page types")),
        }
    }

    /// An in-order traversal over every leaf cell, yielding
    /// `(key, value, page_number)` triples in ascending key order. The
    /// sequence is lazy, finite, and not restartable; call again for a
    /// fresh traversal.
    pub fn scan(&mut self) -> Scan<'_> {
        Scan {
            tree: self,
            stack: vec![],
            started: false,
        }
    }

    /// Resets the tree to a single empty leaf at page 1. Pages past the
    /// root are orphaned, not reclaimed.
    pub fn clear(&mut self) -> Result<(), Error> {
        let empty = LeafPage::new();
        self.pager.write_page(1, &empty.to_bytes()?)?;
        if self.root_page != 1 {
            self.root_page = 1;
            self.pager.write_root_page_number(1)?;
        }
        Ok(())
    }
}

enum Frame {
    Leaf {
        page_number: PageNum,
        page: LeafPage,
        next_cell: usize,
    },
    Interior {
        page: InteriorPage,
        next_child: usize,
    },
}

/// Iterator state for one in-order traversal: a stack of decoded pages
/// from the root down to the current leaf.
pub struct Scan<'p> {
    tree: &'p mut BTree,
    stack: Vec<Frame>,
    started: bool,
}

impl<'p> Scan<'p> {
    fn push_page(&mut self, page_number: PageNum) -> Result<(), Error> {
        match self.tree.load_node(page_number)? {
            Node::Leaf(page) => self.stack.push(Frame::Leaf {
                page_number,
                page,
                next_cell: 0,
            }),
            Node::Interior(page) => self.stack.push(Frame::Interior {
                page,
                next_child: 0,
            }),
        }
        Ok(())
    }
}

impl<'p> Iterator for Scan<'p> {
    type Item = Result<(RowId, Vec<u8>, PageNum), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            let root = self.tree.root_page;
            if let Err(e) = self.push_page(root) {
                return Some(Err(e));
            }
        }
        loop {
            let descend_to = match self.stack.last_mut() {
                None => return None,
                Some(Frame::Leaf {
                    page_number,
                    page,
                    next_cell,
                }) => {
                    if *next_cell < page.cells.len() {
                        let (key, value) = page.cells[*next_cell].clone();
                        let page_number = *page_number;
                        *next_cell += 1;
                        return Some(Ok((key, value, page_number)));
                    }
                    None
                }
                Some(Frame::Interior { page, next_child }) => {
                    if *next_child <= page.num_keys() {
                        let child = page.child_at(*next_child);
                        *next_child += 1;
                        Some(child)
                    } else {
                        None
                    }
                }
            };
            match descend_to {
                Some(child) => {
                    if let Err(e) = self.push_page(child) {
                        self.stack.clear();
                        return Some(Err(e));
                    }
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::MAX_KEYS;

    fn open_temp_tree() -> (BTree, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let tree = BTree::open(&dir.path().join("t.tbl")).expect("Should have opened btree.");
        (tree, dir)
    }

    fn collect_keys(tree: &mut BTree) -> Vec<RowId> {
        tree.scan()
            .map(|item| item.expect("Scan should not fail.").0)
            .collect()
    }

    /// Walks every page checking the occupancy and ordering invariants.
    fn check_invariants(tree: &mut BTree) {
        fn check(tree: &mut BTree, page_number: PageNum, is_root: bool) {
            match tree.load_node(page_number).unwrap() {
                Node::Leaf(leaf) => {
                    if !is_root {
                        assert!(
                            leaf.num_keys() >= MIN_KEYS,
                            "leaf {} below minimum occupancy",
                            page_number
                        );
                    }
                    assert!(leaf.num_keys() <= MAX_KEYS);
                    for pair in leaf.cells.windows(2) {
                        assert!(pair[0].0 < pair[1].0, "leaf keys not strictly ascending");
                    }
                }
                Node::Interior(node) => {
                    if !is_root {
                        assert!(node.num_keys() >= MIN_KEYS);
                    }
                    for pair in node.entries.windows(2) {
                        assert!(pair[0].0 < pair[1].0, "separators not strictly ascending");
                    }
                    for i in 0..=node.num_keys() {
                        check(tree, node.child_at(i), false);
                    }
                }
            }
        }
        let root = tree.root_page();
        check(tree, root, true);
    }

    #[test]
    fn test_insert_and_search_single_page() {
        let (mut tree, _dir) = open_temp_tree();
        tree.insert(2, b"two").unwrap();
        tree.insert(1, b"one").unwrap();
        assert_eq!(tree.search(1).unwrap(), Some(b"one".to_vec()));
        assert_eq!(tree.search(2).unwrap(), Some(b"two".to_vec()));
        assert_eq!(tree.search(3).unwrap(), None);
    }

    #[test]
    fn test_overwrite_existing_key_keeps_scan_length() {
        let (mut tree, _dir) = open_temp_tree();
        tree.insert(1, b"first").unwrap();
        tree.insert(1, b"second").unwrap();
        assert_eq!(tree.search(1).unwrap(), Some(b"second".to_vec()));
        assert_eq!(collect_keys(&mut tree).len(), 1);
    }

    #[test]
    fn test_split_produces_interior_root() {
        let (mut tree, _dir) = open_temp_tree();
        for k in 1..=(MAX_KEYS as RowId + 1) {
            tree.insert(k, format!("row{k}").as_bytes()).unwrap();
        }
        assert!(tree.root_page() > 1, "root should have moved off page 1");
        assert!(matches!(
            tree.load_node(tree.root_page()).unwrap(),
            Node::Interior(_)
        ));
        assert_eq!(
            collect_keys(&mut tree),
            (1..=(MAX_KEYS as RowId + 1)).collect::<Vec<_>>()
        );
        check_invariants(&mut tree);
    }

    #[test]
    fn test_scan_is_ordered_after_shuffled_inserts() {
        let (mut tree, _dir) = open_temp_tree();
        // Deterministic but thoroughly out-of-order insertion sequence.
        let mut keys: Vec<RowId> = (1..=200).collect();
        for i in 0..keys.len() {
            keys.swap(i, (i * 73 + 11) % 200);
        }
        for k in &keys {
            tree.insert(*k, format!("v{k}").as_bytes()).unwrap();
        }
        assert_eq!(collect_keys(&mut tree), (1..=200).collect::<Vec<_>>());
        check_invariants(&mut tree);
    }

    #[test]
    fn test_scan_reports_leaf_page_numbers() {
        let (mut tree, _dir) = open_temp_tree();
        for k in 1..=100_u16 {
            tree.insert(k, b"x").unwrap();
        }
        let pages: std::collections::HashSet<PageNum> = tree
            .scan()
            .map(|item| item.unwrap().2)
            .collect();
        assert!(pages.len() > 1, "100 keys should span multiple leaves");
        let root = tree.root_page();
        assert!(!pages.contains(&root), "interior pages are never yielded");
    }

    #[test]
    fn test_insert_returns_holding_leaf() {
        let (mut tree, _dir) = open_temp_tree();
        for k in 1..=100_u16 {
            let page = tree.insert(k, format!("v{k}").as_bytes()).unwrap();
            match tree.load_node(page).unwrap() {
                Node::Leaf(leaf) => assert!(leaf.contains_key(k)),
                Node::Interior(_) => panic!("insert reported an interior page"),
            }
        }
    }

    #[test]
    fn test_delete_from_single_leaf() {
        let (mut tree, _dir) = open_temp_tree();
        tree.insert(1, b"one").unwrap();
        tree.insert(2, b"two").unwrap();
        assert!(tree.delete(1).unwrap());
        assert!(!tree.delete(1).unwrap());
        assert_eq!(tree.search(1).unwrap(), None);
        assert_eq!(collect_keys(&mut tree), vec![2]);
    }

    #[test]
    fn test_delete_rebalances_and_preserves_order() {
        let (mut tree, _dir) = open_temp_tree();
        for k in 1..=200_u16 {
            tree.insert(k, format!("v{k}").as_bytes()).unwrap();
        }
        for k in (1..=200_u16).filter(|k| k % 3 != 0) {
            assert!(tree.delete(k).unwrap(), "key {k} should have been present");
            check_invariants(&mut tree);
        }
        let expected: Vec<RowId> = (1..=200).filter(|k| k % 3 == 0).collect();
        assert_eq!(collect_keys(&mut tree), expected);
    }

    #[test]
    fn test_delete_everything_collapses_root() {
        let (mut tree, _dir) = open_temp_tree();
        for k in 1..=100_u16 {
            tree.insert(k, b"v").unwrap();
        }
        assert!(tree.root_page() > 1);
        for k in 1..=100_u16 {
            assert!(tree.delete(k).unwrap());
        }
        assert!(tree.is_empty().unwrap());
        assert!(matches!(
            tree.load_node(tree.root_page()).unwrap(),
            Node::Leaf(_)
        ));
    }

    // Three-level trees (root, interior pages, leaves) need more keys than
    // one interior page can point at: > MAX_KEYS + 1 leaves.
    fn build_three_level_tree(tree: &mut BTree, n: RowId) {
        for k in 1..=n {
            tree.insert(k, format!("v{k}").as_bytes()).unwrap();
        }
        let is_three_levels = match tree.load_node(tree.root_page()).unwrap() {
            Node::Interior(root) => matches!(
                tree.load_node(root.leftmost_child).unwrap(),
                Node::Interior(_)
            ),
            Node::Leaf(_) => false,
        };
        assert!(is_three_levels, "{n} keys should build a three-level tree");
    }

    #[test]
    fn test_ascending_deletes_rebalance_interior_level() {
        let (mut tree, _dir) = open_temp_tree();
        build_three_level_tree(&mut tree, 2000);
        // Draining from the low end keeps underflowing each leftmost page,
        // forcing borrows and merges from right siblings at both levels.
        for k in 1..=1900_u16 {
            assert!(tree.delete(k).unwrap());
            if k % 97 == 0 {
                check_invariants(&mut tree);
            }
        }
        check_invariants(&mut tree);
        assert_eq!(collect_keys(&mut tree), (1901..=2000).collect::<Vec<_>>());
    }

    #[test]
    fn test_descending_deletes_rebalance_interior_level() {
        let (mut tree, _dir) = open_temp_tree();
        build_three_level_tree(&mut tree, 2000);
        // Draining from the high end exercises the left-sibling borrow and
        // merge paths instead.
        for k in (101..=2000_u16).rev() {
            assert!(tree.delete(k).unwrap());
            if k % 97 == 0 {
                check_invariants(&mut tree);
            }
        }
        check_invariants(&mut tree);
        assert_eq!(collect_keys(&mut tree), (1..=100).collect::<Vec<_>>());
    }

    #[test]
    fn test_update_in_leaf_uses_hint_and_fallback() {
        let (mut tree, _dir) = open_temp_tree();
        let page = tree.insert(5, b"old").unwrap();
        let same = tree.update_in_leaf(page, 5, b"new").unwrap();
        assert_eq!(same, page);
        assert_eq!(tree.search(5).unwrap(), Some(b"new".to_vec()));
        // A stale hint still lands on the right leaf by descent.
        let found = tree.update_in_leaf(page + 100, 5, b"newer").unwrap();
        assert_eq!(found, page);
        assert_eq!(tree.search(5).unwrap(), Some(b"newer".to_vec()));
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tbl");
        {
            let mut tree = BTree::open(&path).unwrap();
            for k in 1..=150_u16 {
                tree.insert(k, format!("row{k}").as_bytes()).unwrap();
            }
            tree.close().unwrap();
        }
        let mut tree = BTree::open(&path).unwrap();
        assert_eq!(collect_keys(&mut tree), (1..=150).collect::<Vec<_>>());
        assert_eq!(tree.search(77).unwrap(), Some(b"row77".to_vec()));
    }

    #[test]
    fn test_max_key_walks_rightmost_spine() {
        let (mut tree, _dir) = open_temp_tree();
        assert_eq!(tree.max_key().unwrap(), None);
        for k in [5_u16, 90, 33, 120, 2] {
            tree.insert(k, b"v").unwrap();
        }
        assert_eq!(tree.max_key().unwrap(), Some(120));
        for k in 1..=100_u16 {
            tree.insert(k + 200, b"v").unwrap();
        }
        assert_eq!(tree.max_key().unwrap(), Some(300));
    }

    #[test]
    fn test_clear_resets_to_empty_root() {
        let (mut tree, _dir) = open_temp_tree();
        for k in 1..=100_u16 {
            tree.insert(k, b"v").unwrap();
        }
        tree.clear().unwrap();
        assert_eq!(tree.root_page(), 1);
        assert!(tree.is_empty().unwrap());
        assert_eq!(collect_keys(&mut tree), Vec::<RowId>::new());
    }

    #[test]
    fn test_big_values_split_on_byte_bound() {
        let (mut tree, _dir) = open_temp_tree();
        // Four ~1.5kB values cannot share one 4kB page.
        let blob = vec![0x61_u8; 1500];
        for k in 1..=4_u16 {
            tree.insert(k, &blob).unwrap();
        }
        assert_eq!(collect_keys(&mut tree), vec![1, 2, 3, 4]);
        assert_eq!(tree.search(4).unwrap().map(|v| v.len()), Some(1500));
    }
}
