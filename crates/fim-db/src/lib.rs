//! The hierarchical, paged on-disk database mirroring filesystem
//! structure and storing serialized property records (spec.md §4.6).

pub mod block;
pub mod database;
pub mod iterator;

pub use block::{BlockIndex, NodeRec, Slot, ROOT};
pub use database::Database;
pub use iterator::DatabaseIterator;
