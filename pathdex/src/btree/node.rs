//! B-Tree Node Types

use std::fmt::Display;
use std::mem;

use serde::{Deserialize, Serialize};

use super::tree::TreeError;
use super::tree::TreeKey;

/// A `(key, path)` pair stored in a [`BTree`](super::BTree).
///
/// Entries are placed in the tree by `key` alone. The `path` is an opaque payload which is only
/// consulted when checking whether a specific entry exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry<K> {
    key: K,
    path: String,
}

impl<K> Entry<K> {
    /// Create a new entry.
    pub fn new(key: K, path: impl Into<String>) -> Self {
        Self {
            key,
            path: path.into(),
        }
    }

    /// The key of this entry.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The path of this entry.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Split the entry into its key and path.
    pub fn into_parts(self) -> (K, String) {
        (self.key, self.path)
    }
}

impl<K: Display> Display for Entry<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.key, self.path)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Node<K> {
    entries: Vec<Entry<K>>,
    children: Vec<Box<Node<K>>>,
    degree: usize,
}

impl<K> Node<K>
where
    K: TreeKey,
{
    pub(crate) fn root(degree: usize, entry: Entry<K>) -> Self {
        assert!(degree >= 2);
        let mut entries = Vec::with_capacity(2 * degree - 1);
        entries.push(entry);
        Node {
            entries,
            children: vec![],
            degree,
        }
    }

    #[cfg(test)]
    fn leaf(degree: usize, entries: Vec<Entry<K>>) -> Self {
        assert!(degree >= 2);
        Node {
            entries,
            children: vec![],
            degree,
        }
    }

    pub(crate) fn internal(
        degree: usize,
        entries: Vec<Entry<K>>,
        children: Vec<Box<Node<K>>>,
    ) -> Self {
        assert!(degree >= 2);
        assert_eq!(entries.len() + 1, children.len());
        Node {
            entries,
            children,
            degree,
        }
    }

    pub(crate) fn entries(&self) -> &[Entry<K>] {
        &self.entries
    }

    pub(crate) fn children(&self) -> &[Box<Node<K>>] {
        &self.children
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.entries.len() == 2 * self.degree - 1
    }

    /// Take the only remaining child of an emptied internal node.
    pub(crate) fn into_only_child(mut self) -> Option<Box<Node<K>>> {
        debug_assert!(self.entries.is_empty());
        self.children.pop()
    }

    /// Index of the first entry whose key is not less than `key`.
    ///
    /// Entries with equal keys sit side by side, so `find_index(key)..upper_index(key)` is the
    /// run of entries for `key` in this node, and the children at `find_index(key)` up to and
    /// including `upper_index(key)` are the only ones which may hold more of them.
    pub(crate) fn find_index(&self, key: &K) -> usize {
        self.entries.partition_point(|entry| entry.key < *key)
    }

    /// Index of the first entry whose key is greater than `key`.
    ///
    /// New entries go here, after any entries which already carry the same key.
    pub(crate) fn upper_index(&self, key: &K) -> usize {
        self.entries.partition_point(|entry| entry.key <= *key)
    }

    pub(crate) fn find(&self, key: &K) -> Option<&Entry<K>> {
        let mut node = self;
        loop {
            let idx = node.find_index(key);
            if let Some(entry) = node.entries.get(idx).filter(|entry| entry.key == *key) {
                return Some(entry);
            }
            if node.is_leaf() {
                return None;
            }
            node = &*node.children[idx];
        }
    }

    /// Is there an entry with exactly this key and path in the subtree?
    ///
    /// A run of equal keys may straddle several children, so every child bordering the run is
    /// searched.
    pub(crate) fn search(&self, key: &K, path: &str) -> bool {
        let lower = self.find_index(key);
        let upper = self.upper_index(key);
        if self.entries[lower..upper]
            .iter()
            .any(|entry| entry.path == path)
        {
            return true;
        }
        !self.is_leaf()
            && self.children[lower..=upper]
                .iter()
                .any(|child| child.search(key, path))
    }

    pub(crate) fn first_entry(&self) -> Option<&Entry<K>> {
        let mut node = self;
        while !node.is_leaf() {
            node = &*node.children[0];
        }
        node.entries.first()
    }

    pub(crate) fn last_entry(&self) -> Option<&Entry<K>> {
        let mut node = self;
        while !node.is_leaf() {
            node = &*node.children[node.children.len() - 1];
        }
        node.entries.last()
    }

    pub(crate) fn height(&self) -> usize {
        let mut node = self;
        let mut height = 1;
        while !node.is_leaf() {
            node = &*node.children[0];
            height += 1;
        }
        height
    }

    pub(crate) fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|child| child.node_count())
            .sum::<usize>()
    }

    /// Insert into a node which is known to have room.
    ///
    /// Full children are split before we descend into them, so the recursive insert can never
    /// overflow. An entry whose key is already present is placed after the existing ones.
    pub(crate) fn insert_non_full(&mut self, entry: Entry<K>) {
        debug_assert!(!self.is_full());
        let mut idx = self.upper_index(&entry.key);

        if self.is_leaf() {
            self.entries.insert(idx, entry);
            return;
        }

        if self.children[idx].is_full() {
            self.split_child(idx);
            // The promoted median may belong on either side of our key
            if self.entries[idx].key <= entry.key {
                idx += 1;
            }
        }
        self.children[idx].insert_non_full(entry);
    }

    /// Split the full child at `idx`.
    ///
    /// The upper `t - 1` entries (and upper `t` children) move into a new sibling at `idx + 1`
    /// and the median entry moves up into this node at `idx`.
    pub(crate) fn split_child(&mut self, idx: usize) {
        let degree = self.degree;
        let child = &mut self.children[idx];
        assert!(child.is_full());

        let upper_entries = child.entries.split_off(degree);
        let upper_children = if child.is_leaf() {
            vec![]
        } else {
            child.children.split_off(degree)
        };
        let median = child.entries.remove(degree - 1);
        let sibling = Node {
            entries: upper_entries,
            children: upper_children,
            degree,
        };
        tracing::debug!(
            median = %median.key,
            left = child.len(),
            right = sibling.len(),
            "split child {idx}"
        );

        self.entries.insert(idx, median);
        self.children.insert(idx + 1, Box::new(sibling));
    }

    /// Remove the entry with this key and path from this subtree.
    ///
    /// We only descend into a child once we know it holds the entry, so a missing entry returns
    /// `None` and leaves the subtree untouched. The caller ensures this node is the root or holds
    /// at least `t` entries.
    pub(crate) fn delete(&mut self, key: &K, path: &str) -> Option<Entry<K>> {
        let lower = self.find_index(key);
        let upper = self.upper_index(key);

        if let Some(idx) = (lower..upper).find(|idx| self.entries[*idx].path == path) {
            return self.remove_at(idx);
        }

        if self.is_leaf() {
            tracing::debug!(%key, path, "entry not found");
            return None;
        }

        let Some(mut idx) = (lower..=upper).find(|idx| self.children[*idx].search(key, path))
        else {
            tracing::debug!(%key, path, "entry not found");
            return None;
        };

        if self.children[idx].len() < self.degree {
            self.fill(idx);
            // Filling the last child may merge it into its left neighbour
            if idx > self.len() {
                idx -= 1;
            }
        }
        self.children[idx].delete(key, path)
    }

    fn remove_at(&mut self, idx: usize) -> Option<Entry<K>> {
        if self.is_leaf() {
            return Some(self.entries.remove(idx));
        }

        let degree = self.degree;
        if self.children[idx].len() >= degree {
            let predecessor = self.children[idx].pop_last()?;
            Some(mem::replace(&mut self.entries[idx], predecessor))
        } else if self.children[idx + 1].len() >= degree {
            let successor = self.children[idx + 1].pop_first()?;
            Some(mem::replace(&mut self.entries[idx], successor))
        } else {
            // Both neighbours are minimal, the merged node holds our entry at its midpoint
            self.merge(idx);
            self.children[idx].remove_at(degree - 1)
        }
    }

    /// Remove the greatest entry of this subtree.
    fn pop_last(&mut self) -> Option<Entry<K>> {
        if self.is_leaf() {
            return self.entries.pop();
        }
        let idx = self.len();
        if self.children[idx].len() < self.degree {
            self.fill(idx);
        }
        let idx = self.len();
        self.children[idx].pop_last()
    }

    /// Remove the smallest entry of this subtree.
    fn pop_first(&mut self) -> Option<Entry<K>> {
        if self.is_leaf() {
            if self.entries.is_empty() {
                return None;
            }
            return Some(self.entries.remove(0));
        }
        if self.children[0].len() < self.degree {
            self.fill(0);
        }
        self.children[0].pop_first()
    }

    /// Make sure the child at `idx` holds at least `t` entries.
    fn fill(&mut self, idx: usize) {
        let degree = self.degree;
        if idx != 0 && self.children[idx - 1].len() >= degree {
            self.borrow_from_prev(idx);
        } else if idx != self.len() && self.children[idx + 1].len() >= degree {
            self.borrow_from_next(idx);
        } else if idx != self.len() {
            self.merge(idx);
        } else {
            self.merge(idx - 1);
        }
    }

    /// Rotate the last entry of the left sibling up through the separator into the child.
    fn borrow_from_prev(&mut self, idx: usize) {
        let (left, right) = self.children.split_at_mut(idx);
        let sibling = &mut left[idx - 1];
        let child = &mut right[0];

        let last = sibling.entries.len() - 1;
        let borrowed = sibling.entries.remove(last);
        let separator = mem::replace(&mut self.entries[idx - 1], borrowed);
        child.entries.insert(0, separator);
        if let Some(grandchild) = sibling.children.pop() {
            child.children.insert(0, grandchild);
        }
        tracing::debug!(
            separator = %self.entries[idx - 1].key,
            "borrowed from previous sibling of child {idx}"
        );
    }

    /// Rotate the first entry of the right sibling up through the separator into the child.
    fn borrow_from_next(&mut self, idx: usize) {
        let (left, right) = self.children.split_at_mut(idx + 1);
        let child = &mut left[idx];
        let sibling = &mut right[0];

        let borrowed = sibling.entries.remove(0);
        let separator = mem::replace(&mut self.entries[idx], borrowed);
        child.entries.push(separator);
        if !sibling.is_leaf() {
            child.children.push(sibling.children.remove(0));
        }
        tracing::debug!(
            separator = %self.entries[idx].key,
            "borrowed from next sibling of child {idx}"
        );
    }

    /// Fold the separator at `idx` and the child at `idx + 1` into the child at `idx`.
    ///
    /// The absorbed sibling is dropped.
    fn merge(&mut self, idx: usize) {
        let sibling = self.children.remove(idx + 1);
        let separator = self.entries.remove(idx);
        let child = &mut self.children[idx];

        child.entries.push(separator);
        let Node {
            entries, children, ..
        } = *sibling;
        child.entries.extend(entries);
        child.children.extend(children);
        assert!(child.len() <= 2 * self.degree - 1);
        tracing::debug!(merged = child.len(), "merged children {idx} and {}", idx + 1);
    }

    /// Check the B-Tree properties of this subtree, returning its height.
    ///
    /// Keys must not decrease within a node, and every key must lie between `lower` and `upper`
    /// inclusive, since a run of equal keys may straddle a separator.
    pub(crate) fn verify(
        &self,
        is_root: bool,
        lower: Option<&K>,
        upper: Option<&K>,
    ) -> Result<usize, TreeError> {
        if self.entries.is_empty() {
            return Err(TreeError::Invariant("node has no entries".to_string()));
        }
        if self.len() > 2 * self.degree - 1 {
            return Err(TreeError::Invariant(format!(
                "node has {} entries, maximum is {}",
                self.len(),
                2 * self.degree - 1
            )));
        }
        if !is_root && self.len() < self.degree - 1 {
            return Err(TreeError::Invariant(format!(
                "node has {} entries, minimum is {}",
                self.len(),
                self.degree - 1
            )));
        }
        for pair in self.entries.windows(2) {
            if pair[0].key > pair[1].key {
                return Err(TreeError::Invariant(format!(
                    "keys out of order: {} before {}",
                    pair[0].key, pair[1].key
                )));
            }
        }
        if let (Some(lower), Some(first)) = (lower, self.entries.first()) {
            if first.key < *lower {
                return Err(TreeError::Invariant(format!(
                    "key {} below separator {lower}",
                    first.key
                )));
            }
        }
        if let (Some(upper), Some(last)) = (upper, self.entries.last()) {
            if last.key > *upper {
                return Err(TreeError::Invariant(format!(
                    "key {} above separator {upper}",
                    last.key
                )));
            }
        }

        if self.is_leaf() {
            return Ok(1);
        }

        if self.children.len() != self.len() + 1 {
            return Err(TreeError::Invariant(format!(
                "node has {} entries but {} children",
                self.len(),
                self.children.len()
            )));
        }

        let mut height = None;
        for (idx, child) in self.children.iter().enumerate() {
            if child.degree != self.degree {
                return Err(TreeError::Invariant(format!(
                    "child degree {} differs from parent degree {}",
                    child.degree, self.degree
                )));
            }
            let child_lower = if idx == 0 {
                lower
            } else {
                Some(&self.entries[idx - 1].key)
            };
            let child_upper = self.entries.get(idx).map(|entry| &entry.key).or(upper);
            let child_height = child.verify(false, child_lower, child_upper)?;
            match height {
                Some(h) if h != child_height => {
                    return Err(TreeError::Invariant(format!(
                        "leaves at different depths: {h} and {child_height}"
                    )));
                }
                _ => height = Some(child_height),
            }
        }
        Ok(height.unwrap_or_default() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(keys: &[usize]) -> Vec<Entry<usize>> {
        keys.iter()
            .map(|k| Entry::new(*k, format!("/data/{k}")))
            .collect()
    }

    fn keys(node: &Node<usize>) -> Vec<usize> {
        node.entries().iter().map(|e| *e.key()).collect()
    }

    fn internal(degree: usize, separators: &[usize], children: Vec<Node<usize>>) -> Node<usize> {
        Node::internal(
            degree,
            entries(separators),
            children.into_iter().map(Box::new).collect(),
        )
    }

    #[test]
    fn it_finds_an_index() {
        let target = Node::leaf(3, entries(&[10, 20, 30]));
        assert_eq!(target.find_index(&5), 0);
        assert_eq!(target.find_index(&10), 0);
        assert_eq!(target.find_index(&15), 1);
        assert_eq!(target.find_index(&30), 2);
        assert_eq!(target.find_index(&31), 3);
    }

    #[test]
    fn it_splits_a_full_child() {
        let mut target = internal(
            3,
            &[100],
            vec![
                Node::leaf(3, entries(&[1, 2, 3, 4, 5])),
                Node::leaf(3, entries(&[101, 102])),
            ],
        );
        target.split_child(0);
        assert_eq!(keys(&target), vec![3, 100]);
        assert_eq!(target.children().len(), 3);
        assert_eq!(keys(&target.children()[0]), vec![1, 2]);
        assert_eq!(keys(&target.children()[1]), vec![4, 5]);
        assert_eq!(keys(&target.children()[2]), vec![101, 102]);
        target.verify(true, None, None).expect("valid after split");
    }

    #[test]
    fn it_splits_a_full_internal_child() {
        let grandchildren = (0..4)
            .map(|i| Node::leaf(2, entries(&[i * 10 + 1])))
            .collect();
        let child = internal(2, &[5, 15, 25], grandchildren);
        let mut target = internal(2, &[], vec![child]);
        target.split_child(0);
        assert_eq!(keys(&target), vec![15]);
        assert_eq!(target.children()[0].children().len(), 2);
        assert_eq!(target.children()[1].children().len(), 2);
        target.verify(true, None, None).expect("valid after split");
    }

    #[test]
    fn it_keeps_entries_with_equal_keys() {
        let mut target = Node::root(3, Entry::new(7usize, "/old"));
        target.insert_non_full(Entry::new(7, "/new"));
        target.insert_non_full(Entry::new(3, "/three"));
        assert_eq!(keys(&target), vec![3, 7, 7]);
        assert_eq!(target.entries()[2].path(), "/new");
        assert!(target.search(&7, "/new"));
        assert!(target.search(&7, "/old"));
        target.verify(true, None, None).expect("equal keys are in order");
    }

    #[test]
    fn it_searches_equal_keys_across_children() {
        // A run of 5s straddling the separator on both sides
        let target = Node::internal(
            2,
            vec![Entry::new(5usize, "/mid")],
            vec![
                Box::new(Node::leaf(2, vec![Entry::new(1, "/one"), Entry::new(5, "/left")])),
                Box::new(Node::leaf(2, vec![Entry::new(5, "/right"), Entry::new(9, "/nine")])),
            ],
        );
        target.verify(true, None, None).expect("valid with equal keys");
        assert!(target.search(&5, "/left"));
        assert!(target.search(&5, "/mid"));
        assert!(target.search(&5, "/right"));
        assert!(!target.search(&5, "/nowhere"));
    }

    #[test]
    fn it_deletes_an_equal_key_from_the_right_child() {
        let mut target = Node::internal(
            2,
            vec![Entry::new(5usize, "/mid")],
            vec![
                Box::new(Node::leaf(2, vec![Entry::new(1, "/one"), Entry::new(5, "/left")])),
                Box::new(Node::leaf(2, vec![Entry::new(5, "/right")])),
            ],
        );
        let removed = target.delete(&5, "/right").expect("removes /right");
        assert_eq!(removed, Entry::new(5, "/right"));
        assert!(target.search(&5, "/left"));
        assert!(target.search(&5, "/mid"));
        assert!(!target.search(&5, "/right"));
        target.verify(true, None, None).expect("valid after delete");
    }

    #[test]
    fn it_searches_by_key_and_path() {
        let target = internal(
            2,
            &[10],
            vec![
                Node::leaf(2, entries(&[5])),
                Node::leaf(2, entries(&[15])),
            ],
        );
        assert!(target.search(&10, "/data/10"));
        assert!(target.search(&15, "/data/15"));
        assert!(!target.search(&15, "/data/16"));
        assert!(!target.search(&16, "/data/16"));
        assert_eq!(target.find(&5).map(|e| e.path()), Some("/data/5"));
    }

    #[test]
    fn it_borrows_from_previous_sibling() {
        let mut target = internal(
            2,
            &[10],
            vec![
                Node::leaf(2, entries(&[1, 5])),
                Node::leaf(2, entries(&[15])),
            ],
        );
        target.fill(1);
        assert_eq!(keys(&target), vec![5]);
        assert_eq!(keys(&target.children()[0]), vec![1]);
        assert_eq!(keys(&target.children()[1]), vec![10, 15]);
    }

    #[test]
    fn it_borrows_from_next_sibling() {
        let mut target = internal(
            2,
            &[10],
            vec![
                Node::leaf(2, entries(&[5])),
                Node::leaf(2, entries(&[15, 20])),
            ],
        );
        target.fill(0);
        assert_eq!(keys(&target), vec![15]);
        assert_eq!(keys(&target.children()[0]), vec![5, 10]);
        assert_eq!(keys(&target.children()[1]), vec![20]);
    }

    #[test]
    fn it_moves_grandchildren_when_borrowing() {
        let left = internal(
            2,
            &[3, 6],
            vec![
                Node::leaf(2, entries(&[1])),
                Node::leaf(2, entries(&[4])),
                Node::leaf(2, entries(&[7])),
            ],
        );
        let right = internal(
            2,
            &[12],
            vec![
                Node::leaf(2, entries(&[11])),
                Node::leaf(2, entries(&[13])),
            ],
        );
        let mut target = internal(2, &[10], vec![left, right]);
        target.fill(1);
        assert_eq!(keys(&target), vec![6]);
        assert_eq!(keys(&target.children()[1]), vec![10, 12]);
        assert_eq!(keys(&target.children()[1].children()[0]), vec![7]);
        target.verify(true, None, None).expect("valid after borrow");
    }

    #[test]
    fn it_merges_leaf_children() {
        let mut target = internal(
            3,
            &[10, 20],
            vec![
                Node::leaf(3, entries(&[1, 2])),
                Node::leaf(3, entries(&[11, 12])),
                Node::leaf(3, entries(&[21, 22])),
            ],
        );
        target.merge(0);
        assert_eq!(keys(&target), vec![20]);
        assert_eq!(target.children().len(), 2);
        assert_eq!(keys(&target.children()[0]), vec![1, 2, 10, 11, 12]);
        target.verify(true, None, None).expect("valid after merge");
    }

    #[test]
    fn it_fills_last_child_by_merging_left() {
        let mut target = internal(
            2,
            &[10],
            vec![
                Node::leaf(2, entries(&[5])),
                Node::leaf(2, entries(&[15])),
            ],
        );
        target.fill(1);
        assert!(target.is_empty());
        assert_eq!(target.children().len(), 1);
        assert_eq!(keys(&target.children()[0]), vec![5, 10, 15]);
    }

    #[test]
    fn it_deletes_from_internal_node_using_predecessor() {
        let mut target = internal(
            2,
            &[10],
            vec![
                Node::leaf(2, entries(&[1, 5])),
                Node::leaf(2, entries(&[15])),
            ],
        );
        let removed = target.delete(&10, "/data/10").expect("removes 10");
        assert_eq!(removed, Entry::new(10, "/data/10"));
        assert_eq!(keys(&target), vec![5]);
        target.verify(true, None, None).expect("valid after delete");
    }

    #[test]
    fn it_deletes_from_internal_node_using_successor() {
        let mut target = internal(
            2,
            &[10],
            vec![
                Node::leaf(2, entries(&[5])),
                Node::leaf(2, entries(&[15, 20])),
            ],
        );
        target.delete(&10, "/data/10").expect("removes 10");
        assert_eq!(keys(&target), vec![15]);
        target.verify(true, None, None).expect("valid after delete");
    }

    #[test]
    fn it_deletes_from_internal_node_by_merging() {
        let mut target = internal(
            2,
            &[10],
            vec![
                Node::leaf(2, entries(&[5])),
                Node::leaf(2, entries(&[15])),
            ],
        );
        target.delete(&10, "/data/10").expect("removes 10");
        assert!(target.is_empty());
        assert_eq!(keys(&target.children()[0]), vec![5, 15]);
    }

    #[test]
    fn it_reports_missing_key_without_changes() {
        let mut target = Node::leaf(3, entries(&[1, 2, 3]));
        assert!(target.delete(&4, "/data/4").is_none());
        assert!(target.delete(&3, "/elsewhere").is_none());
        assert_eq!(keys(&target), vec![1, 2, 3]);
    }

    #[test]
    fn it_leaves_minimal_children_alone_when_missing() {
        let mut target = internal(
            2,
            &[10],
            vec![
                Node::leaf(2, entries(&[5])),
                Node::leaf(2, entries(&[15])),
            ],
        );
        // Descending for 15 would merge both children if we didn't check first
        assert!(target.delete(&15, "/elsewhere").is_none());
        assert!(target.delete(&12, "/data/12").is_none());
        assert_eq!(keys(&target), vec![10]);
        assert_eq!(target.children().len(), 2);
        assert_eq!(keys(&target.children()[1]), vec![15]);
    }

    #[test]
    fn it_detects_out_of_order_keys() {
        let target = Node::leaf(3, entries(&[3, 2]));
        assert!(matches!(
            target.verify(true, None, None),
            Err(TreeError::Invariant(_))
        ));
    }

    #[test]
    fn it_detects_underfull_children() {
        let target = internal(
            3,
            &[10],
            vec![
                Node::leaf(3, entries(&[5])),
                Node::leaf(3, entries(&[15, 16])),
            ],
        );
        assert!(target.verify(true, None, None).is_err());
    }
}
