//! The policy AST: rules, stop policy, spec lists, attribute inheritance,
//! and the property-expression compiler (spec.md §3, §4.7).

pub mod attrs;
pub mod propexpr;
pub mod rule;
pub mod spec_list;

pub use attrs::merge_attributes;
pub use propexpr::compile_property_expression;
pub use rule::{Rule, StopPolicy};
pub use spec_list::SpecList;
