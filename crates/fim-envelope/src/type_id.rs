//! Stable 32-bit type identifiers: the CRC32 of a type's canonical name
//! (spec.md §4.10).

use crc32fast::Hasher;

/// A stable identifier derived from a type's canonical name.
#[must_use]
pub fn type_id_of(canonical_name: &str) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(canonical_name.as_bytes());
    hasher.finalize()
}
