//! Typed serializer registry and the signed archive envelope every
//! persistent file is wrapped in (spec.md §4.10-4.11).

pub mod envelope;
pub mod registry;
pub mod type_id;

pub use envelope::{Encoding, Envelope, HeaderId, HEADER_VERSION};
pub use registry::{Registry, Serializable};
pub use type_id::type_id_of;
