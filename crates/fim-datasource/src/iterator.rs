//! The data-source iterator contract: a uniform cursor over either the
//! live filesystem or the database (spec.md §4.4).

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use bitflags::bitflags;
use fim_error::{ErrorBucket, Result};
use fim_fco::Fco;
use fim_name::Name;

bitflags! {
    /// Flags controlling iterator behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IterFlags: u32 {
        /// Forbid any side effect on the underlying system (e.g.
        /// bumping access times). Must be respected by the filesystem
        /// variant (spec.md §4.4).
        const DO_NOT_MODIFY_OBJECTS = 0b0000_0001;
    }
}

/// A shared sink for errors encountered during iteration: "reported,
/// not thrown" (spec.md §4.4).
pub type SharedErrorBucket = Rc<RefCell<ErrorBucket>>;

/// A cursor into a named tree, either the live filesystem or the
/// persistent database (spec.md §4.4). Implementors are not required to
/// be object-safe; the pipeline is generic over the concrete iterator
/// type, mirroring how the teacher crate is generic over its VFS trait.
pub trait DataSourceIterator {
    /// Position the cursor at `name`, or mark it done if `name` does
    /// not exist.
    fn seek_to(&mut self, name: &Name);

    /// True iff there is no current element.
    fn done(&self) -> bool;

    /// Advance to the next sibling, preserving the parent.
    fn next(&mut self);

    /// Whether the current element has a child level to descend into.
    fn can_descend(&self) -> bool;

    /// Enter the current element's child level. Positions at the first
    /// child, or marks done if the level is empty.
    fn descend(&mut self);

    /// Leave the current child level, returning to the parent
    /// position. Returns `false` (a logic error) if already at root.
    fn ascend(&mut self) -> bool;

    /// True iff there is no enclosing level to ascend to.
    fn at_root(&self) -> bool;

    /// The full name of the current element, or `None` if done.
    fn get_name(&self) -> Option<Name>;

    /// The name of the current directory level (the parent of whatever
    /// `get_name` would return).
    fn get_parent_name(&self) -> Name;

    /// The last path component of the current element.
    fn get_short_name(&self) -> Option<Vec<u8>>;

    /// Materialize an FCO for the current element with whatever
    /// properties this data source can provide for free. Idempotent.
    fn create_fco(&self) -> Result<Fco>;

    /// Install the sink errors encountered during iteration are routed
    /// to.
    fn set_error_bucket(&mut self, bucket: SharedErrorBucket);

    /// Ordering between `self` and `other`'s current short names.
    /// Defined only when both cursors share the same parent; used by
    /// the merge-walk primitive (spec.md §4.9).
    fn relationship(&self, other: &Self) -> Ordering
    where
        Self: Sized;
}
