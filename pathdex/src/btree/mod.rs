//! B-Tree implementation
//!

// Re-export
pub use self::iter::Entries;
pub use self::node::Entry;
pub use self::tree::BTree;
pub use self::tree::Direction;
pub use self::tree::PathKey;
pub use self::tree::TreeError;
pub use self::tree::TreeKey;
pub use self::tree::DEFAULT_DEGREE;

mod iter;
mod node;
pub mod tree;
