//! The data-source iterator abstraction and the live filesystem
//! implementation of it (spec.md §4.4).

pub mod collaborator;
pub mod fs_iterator;
pub mod iterator;

pub use collaborator::{ContentReader, FsCollaborator, StatInfo};
pub use fs_iterator::FilesystemIterator;
pub use iterator::{DataSourceIterator, IterFlags, SharedErrorBucket};
