//! The property model: property vector, property value, property set,
//! and the FCO record (spec.md §3, §4.1-4.2).

pub mod fco;
pub mod schema;
pub mod set;
pub mod value;
pub mod vector;

pub use fco::{Capabilities, Fco};
pub use schema::{fs_prop, fs_schema, Backing, PropSlot, ValueKind};
pub use set::{PropertySet, WrongGenre};
pub use value::{Compare, FileType, PropertyValue};
pub use vector::PropertyVector;
