#![warn(missing_docs)]
//! pathdex B-Tree
//!
//! # Implementation Details
//!
//! Provides a simple in-memory B-Tree which indexes file paths by an arbitrary precision integer
//! key.
//!
//! The tree is parameterised by a minimum degree `t`. Every node other than the root holds
//! between `t - 1` and `2t - 1` entries, and every internal node holds one more child than it
//! has entries.
//!
//! (If you aren't sure what that means, you can read more about B-Trees here: <https://en.wikipedia.org/wiki/B-tree>.)
//!
//! A node is either:
//!  - Leaf node, contains entries only
//!  - Internal node, contains entries and exclusively owned child nodes
//!
//! Each entry is a `(key, path)` pair. Entries are ordered by key alone, but a search only
//! succeeds when both the key and the path match. Entries which share a key sit side by side,
//! so a key may index several paths.
//!
//! Inserting splits full nodes on the way down, so a single pass from the root is always
//! enough. Deleting tops up minimal nodes on the way down (borrowing from a neighbour or merging
//! with it), so a removal never leaves a node below the minimum.
//!
//! ```
//! use pathdex::btree::{BTree, PathKey};
//!
//! let mut tree = BTree::<PathKey>::new();
//! tree.insert(PathKey::from(42u32), "/tmp/answer");
//! assert!(tree.search(&PathKey::from(42u32), "/tmp/answer"));
//! assert!(!tree.search(&PathKey::from(42u32), "/tmp/question"));
//! ```
//!

pub mod btree;
