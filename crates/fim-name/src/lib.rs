//! Name identity, ordering, and the three external renderings (spec.md §3, §4.3).

mod name;
mod translator;

pub use name::{Name, NameIter, Relationship};
pub use translator::{display_to_name, to_api, to_raw, to_string_display};
