//! B-Tree implementation
//!
//! This is the main data structure exposed by the library.
//!

use std::fmt::Debug;
use std::fmt::Display;

use anyhow::Result;
use num_bigint::BigInt;
use strum::EnumString;
use thiserror::Error;

use super::iter::Entries;
use super::node::Entry;
use super::node::Node;

/// When accessing tree contents serially, ascending or descending order.
#[derive(Clone, Copy, Debug, EnumString, PartialEq)]
#[strum(ascii_case_insensitive)]
pub enum Direction {
    /// Process in ascending order.
    Ascending,
    /// Process in descending order.
    Descending,
}

/// Minimum degree used by [`BTree::new`].
pub const DEFAULT_DEGREE: usize = 3;

/// Keys which we wish to store in a pathdex tree.
pub trait TreeKey: Clone + Ord + Debug + Display {}

// Blanket implementation which satisfies the compiler
impl<K> TreeKey for K
where
    K: Clone + Ord + Debug + Display,
{
    // Nothing to implement, since K already supports the other traits.
}

/// Arbitrary precision key used to index file paths.
pub type PathKey = BigInt;

/// pathdex specific errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TreeError {
    /// Supplied minimum degree too small
    #[error("degree: {0} must be >=2")]
    DegreeTooSmall(usize),

    /// No entry with the requested key and path
    #[error("key not found")]
    KeyNotFound,

    /// The tree holds no entries
    #[error("tree is empty")]
    EmptyTree,

    /// A node breaks the B-Tree properties
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// An in-memory B-Tree mapping keys to file paths.
#[derive(Clone, Debug)]
pub struct BTree<K> {
    root: Option<Box<Node<K>>>,
    degree: usize,
    len: usize,
}

impl<K> Default for BTree<K>
where
    K: TreeKey,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> BTree<K>
where
    K: TreeKey,
{
    /// Create an empty tree with the default minimum degree.
    pub fn new() -> Self {
        Self {
            root: None,
            degree: DEFAULT_DEGREE,
            len: 0,
        }
    }

    /// Create an empty tree with the specified minimum degree.
    pub fn try_new(degree: usize) -> Result<Self> {
        if degree < 2 {
            return Err(TreeError::DegreeTooSmall(degree).into());
        }
        tracing::debug!(degree, "creating B-Tree");
        Ok(Self {
            root: None,
            degree,
            len: 0,
        })
    }

    /// The minimum degree of this tree.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Return count of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is the tree empty?
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of levels in the tree, zero when empty.
    pub fn height(&self) -> usize {
        self.root.as_ref().map_or(0, |root| root.height())
    }

    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        self.root.as_ref().map_or(0, |root| root.node_count())
    }

    /// Clear our tree.
    pub fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }

    /// Insert a key and path.
    ///
    /// Entries are ordered by key alone. Inserting a key which is already present keeps the
    /// existing entries and places the new one after them, so `search` finds every path which
    /// was inserted under the key.
    pub fn insert(&mut self, key: K, path: impl Into<String>) {
        let entry = Entry::new(key, path);
        tracing::debug!(key = %entry.key(), path = entry.path(), "inserting");

        match self.root.take() {
            None => {
                self.root = Some(Box::new(Node::root(self.degree, entry)));
            }
            Some(root) if root.is_full() => {
                // The only way the tree gets taller
                let mut new_root = Node::internal(self.degree, vec![], vec![root]);
                new_root.split_child(0);
                new_root.insert_non_full(entry);
                self.root = Some(Box::new(new_root));
                tracing::debug!(height = self.height(), "grew a new root");
            }
            Some(mut root) => {
                root.insert_non_full(entry);
                self.root = Some(root);
            }
        }
        self.len += 1;
    }

    /// Delete the entry with this key and path, returning it.
    ///
    /// The tree is left untouched if no such entry exists. When the same key and path were
    /// inserted more than once, one of them is removed.
    pub fn delete(&mut self, key: &K, path: &str) -> Result<Entry<K>, TreeError> {
        let root = self.root.as_mut().ok_or(TreeError::EmptyTree)?;

        let removed = root.delete(key, path).ok_or(TreeError::KeyNotFound)?;

        if root.is_empty() {
            self.root = match self.root.take() {
                Some(old) if !old.is_leaf() => (*old).into_only_child(),
                _ => None,
            };
            tracing::debug!(height = self.height(), "shrank root");
        }
        self.len -= 1;
        Ok(removed)
    }

    /// Does the tree contain an entry with exactly this key and path?
    pub fn search(&self, key: &K, path: &str) -> bool {
        match &self.root {
            Some(root) => root.search(key, path),
            None => false,
        }
    }

    /// Does the tree contain this key (with any path)?
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Get a path stored for this key.
    ///
    /// If several entries share the key, any one of their paths may be returned.
    pub fn get(&self, key: &K) -> Option<&str> {
        self.root.as_ref()?.find(key).map(Entry::path)
    }

    /// Return first key.
    pub fn first_key(&self) -> Option<&K> {
        self.root.as_ref()?.first_entry().map(Entry::key)
    }

    /// Return last key.
    pub fn last_key(&self) -> Option<&K> {
        self.root.as_ref()?.last_entry().map(Entry::key)
    }

    /// Return an iterator of entries.
    ///
    /// The iterator walks the tree lazily, so each call starts a fresh traversal.
    pub fn entries(&self, direction: Direction) -> Entries<'_, K> {
        Entries::new(self.root.as_deref(), self.len, direction)
    }

    /// Return an iterator of keys.
    pub fn keys(&self, direction: Direction) -> impl Iterator<Item = &K> + '_ {
        self.entries(direction).map(Entry::key)
    }

    /// Return an iterator of paths.
    pub fn paths(&self, direction: Direction) -> impl Iterator<Item = &str> + '_ {
        self.entries(direction).map(Entry::path)
    }

    /// Keys of every node, grouped by node and then by level, root first.
    pub fn levels(&self) -> Vec<Vec<Vec<&K>>> {
        let mut levels = vec![];
        let mut current: Vec<&Node<K>> = self.root.as_deref().into_iter().collect();
        while !current.is_empty() {
            levels.push(
                current
                    .iter()
                    .copied()
                    .map(|node| node.entries().iter().map(Entry::key).collect::<Vec<&K>>())
                    .collect(),
            );
            current = current
                .iter()
                .copied()
                .flat_map(Node::children)
                .map(|child| &**child)
                .collect();
        }
        levels
    }

    /// Format the tree level by level, one line per level.
    ///
    /// Each node is rendered as its keys in parentheses, e.g. `(10)` above `(5,6)    (12,17)`.
    /// An empty tree renders as an empty string.
    pub fn print_levels(&self) -> String {
        self.levels()
            .iter()
            .map(|level| {
                level
                    .iter()
                    .map(|node| {
                        let keys = node
                            .iter()
                            .map(|key| key.to_string())
                            .collect::<Vec<String>>()
                            .join(",");
                        format!("({keys})")
                    })
                    .collect::<Vec<String>>()
                    .join("    ")
            })
            .collect::<Vec<String>>()
            .join("\n")
    }

    /// Print to stdout all the keys in the tree.
    pub fn print_keys(&self, direction: Direction) {
        let mut sep = "";
        for key in self.keys(direction) {
            print!("{sep}{key}");
            sep = ", ";
        }
        println!();
    }

    /// Print to stdout all the keys and paths in the tree.
    pub fn print_entries(&self, direction: Direction) {
        let mut sep = "";
        for entry in self.entries(direction) {
            print!("{sep}{entry}");
            sep = ", ";
        }
        println!();
    }

    /// Return node utilization.
    pub fn utilization(&self) -> f64 {
        let capacity = self.node_count() * (2 * self.degree - 1);
        if capacity == 0 {
            return 0.0;
        }
        self.len as f64 / capacity as f64
    }

    /// Log basic information about our B-Tree.
    pub fn info(&self) {
        tracing::info!(
            degree = self.degree,
            entries = self.len,
            nodes = self.node_count(),
            height = self.height(),
            "B-Tree"
        );
    }

    /// Verify all the nodes in the tree.
    pub fn verify(&self) -> Result<()> {
        if let Some(root) = &self.root {
            root.verify(true, None, None)?;
        }
        let counted = self.entries(Direction::Ascending).count();
        if counted != self.len {
            return Err(TreeError::Invariant(format!(
                "tree records {} entries but holds {counted}",
                self.len
            ))
            .into());
        }
        Ok(())
    }
}

impl<K> Display for BTree<K>
where
    K: TreeKey,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.print_levels())
    }
}
