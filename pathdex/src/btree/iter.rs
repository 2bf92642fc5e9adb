//! In-order traversal of a tree

use std::iter::FusedIterator;

use super::node::Entry;
use super::node::Node;
use super::tree::Direction;
use super::tree::TreeKey;

/// A lazy, in-order iterator over the entries of a [`BTree`](super::BTree).
///
/// Created by [`BTree::entries`](super::BTree::entries).
#[derive(Clone, Debug)]
pub struct Entries<'a, K> {
    // Each frame is a node and the position of the next entry to visit. Ascending, that is the
    // index of the entry. Descending, it is the number of entries still to visit.
    stack: Vec<(&'a Node<K>, usize)>,
    direction: Direction,
    remaining: usize,
}

impl<'a, K> Entries<'a, K>
where
    K: TreeKey,
{
    pub(crate) fn new(root: Option<&'a Node<K>>, len: usize, direction: Direction) -> Self {
        let mut entries = Self {
            stack: vec![],
            direction,
            remaining: len,
        };
        if let Some(root) = root {
            entries.descend(root);
        }
        entries
    }

    /// Push `node` and the outermost path below it, stopping at a leaf.
    fn descend(&mut self, mut node: &'a Node<K>) {
        loop {
            let start = match self.direction {
                Direction::Ascending => 0,
                Direction::Descending => node.len(),
            };
            self.stack.push((node, start));
            if node.is_leaf() {
                break;
            }
            node = &*node.children()[start];
        }
    }
}

impl<'a, K> Iterator for Entries<'a, K>
where
    K: TreeKey,
{
    type Item = &'a Entry<K>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (node, position) = self.stack.pop()?;
            let (entry, next) = match self.direction {
                Direction::Ascending if position < node.len() => (position, position + 1),
                Direction::Descending if position > 0 => (position - 1, position - 1),
                // This node is exhausted, carry on with its parent
                _ => continue,
            };
            self.stack.push((node, next));
            if !node.is_leaf() {
                self.descend(&node.children()[next]);
            }
            self.remaining = self.remaining.saturating_sub(1);
            return Some(&node.entries()[entry]);
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K> ExactSizeIterator for Entries<'a, K> where K: TreeKey {}

impl<'a, K> FusedIterator for Entries<'a, K> where K: TreeKey {}
