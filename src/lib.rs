//! In-memory sorted index backed by an order-statistics red-black tree.
//!
//! [Osrb] keeps `{key, value}` entries in comparator order and maintains a
//! subtree-size augmentation on every node, so ranked access via
//! [`get_by_rank`][Osrb::get_by_rank] and [`rank_of`][Osrb::rank_of] costs
//! O(log n) instead of a full scan. Nodes carry no parent pointers;
//! mutating operations record the ancestor path on the way down and
//! rebalance by indexing backward through it.
//!
//! Structural mutations bump a version counter which in-flight [Cursor]
//! instances check on every advance, failing fast instead of yielding
//! entries from a tree that changed underneath them.

mod depth;
mod empty;
mod error;
mod osrb;

pub use crate::depth::Depth;
pub use crate::empty::Empty;
pub use crate::error::Error;
pub use crate::osrb::{Cursor, Iter, Osrb, Range, Reverse, Stats};

#[cfg(test)]
mod osrb_test;
