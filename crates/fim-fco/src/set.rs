//! The property set: a sparse, typed map from property index to value,
//! with the valid/undefined distinction of spec.md §3.

use fim_types::Genre;

use crate::schema::{fs_schema, PropSlot};
use crate::value::PropertyValue;
use crate::vector::PropertyVector;

/// Properties are compared/copied only within the same genre; mixing
/// genres is a programmer error the caller must avoid, reported here
/// rather than panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrongGenre;

/// A sparse, typed record of per-object attributes.
///
/// Invariant: `undefined ⊆ valid`. A property is *readable* only if it
/// is in `valid \ undefined`.
#[derive(Debug, Clone)]
pub struct PropertySet {
    genre: Genre,
    valid: PropertyVector,
    undefined: PropertyVector,
    values: Vec<PropertyValue>,
}

fn schema_for(genre: Genre) -> &'static [PropSlot] {
    match genre {
        Genre::Fs => fs_schema(),
        // NTFS/NTREG carry no live calculator/adapter in this workspace
        // (spec.md §1's scope is FS); their schema is empty so the
        // genre value still round-trips through PropertySet machinery.
        Genre::Ntfs | Genre::Ntreg => &[],
    }
}

impl PropertySet {
    #[must_use]
    pub fn new(genre: Genre) -> Self {
        let schema = schema_for(genre);
        let values = schema.iter().map(|s| s.kind.default_value()).collect();
        Self {
            genre,
            valid: PropertyVector::with_capacity(schema.len().max(32)),
            undefined: PropertyVector::with_capacity(schema.len().max(32)),
            values,
        }
    }

    #[must_use]
    pub fn genre(&self) -> Genre {
        self.genre
    }

    #[must_use]
    pub fn valid(&self) -> &PropertyVector {
        &self.valid
    }

    #[must_use]
    pub fn undefined(&self) -> &PropertyVector {
        &self.undefined
    }

    /// Properties that are valid and not undefined: safe to read.
    #[must_use]
    pub fn readable(&self) -> PropertyVector {
        self.valid.difference(&self.undefined)
    }

    #[must_use]
    pub fn is_readable(&self, index: usize) -> bool {
        self.valid.contains(index) && !self.undefined.contains(index)
    }

    /// Read a property. Returns `None` if not readable (never measured,
    /// or measured-but-failed).
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PropertyValue> {
        if self.is_readable(index) {
            self.values.get(index)
        } else {
            None
        }
    }

    /// Set a property's value and mark it valid (clearing "undefined").
    pub fn set(&mut self, index: usize, value: PropertyValue) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value;
        }
        self.valid.add_and_grow(index);
        self.undefined.remove(index);
    }

    /// Mark a property as requested-but-measurement-failed: valid (the
    /// slot has been processed) but not readable.
    pub fn set_undefined(&mut self, index: usize) {
        self.valid.add_and_grow(index);
        self.undefined.add_and_grow(index);
    }

    /// Invalidate a single property: remove it from both `valid` and
    /// `undefined`, as if it had never been measured.
    pub fn invalidate(&mut self, index: usize) {
        self.valid.remove(index);
        self.undefined.remove(index);
    }

    /// Invalidate every property in `mask`.
    pub fn invalidate_vector(&mut self, mask: &PropertyVector) {
        for i in mask.iter() {
            self.invalidate(i);
        }
    }

    /// Invalidate every property.
    pub fn invalidate_all(&mut self) {
        self.valid.clear();
        self.undefined.clear();
    }

    /// Serialize as: valid-vector, undefined-vector, then each valid
    /// property's tagged value in ascending index order (spec.md §4.2).
    /// Opaque to callers other than this type -- the database stores the
    /// result as an uninterpreted blob.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.valid.serialize();
        out.extend(self.undefined.serialize());
        for i in self.valid.iter() {
            if let Some(v) = self.values.get(i) {
                out.extend(v.serialize());
            }
        }
        out
    }

    /// Inverse of [`Self::serialize`] for a property set of the given
    /// genre. Returns `None` on truncated/malformed input.
    #[must_use]
    pub fn deserialize(genre: Genre, buf: &[u8]) -> Option<Self> {
        let (valid, rest) = PropertyVector::deserialize(buf)?;
        let (undefined, mut rest) = PropertyVector::deserialize(rest)?;
        let mut set = Self::new(genre);
        for i in valid.iter() {
            if undefined.contains(i) {
                set.set_undefined(i);
                continue;
            }
            let (value, next) = PropertyValue::deserialize(rest)?;
            if let Some(slot) = set.values.get_mut(i) {
                *slot = value;
            }
            set.valid.add_and_grow(i);
            rest = next;
        }
        Some(set)
    }

    /// Copy exactly the properties in `mask` from `src` into `self`.
    /// The caller guarantees they are valid in `src`. Fails with
    /// [`WrongGenre`] if the two sets are different genres.
    pub fn copy_props(&mut self, src: &Self, mask: &PropertyVector) -> Result<(), WrongGenre> {
        if self.genre != src.genre {
            return Err(WrongGenre);
        }
        for i in mask.iter() {
            if src.undefined.contains(i) {
                self.set_undefined(i);
            } else if let Some(v) = src.values.get(i) {
                self.set(i, v.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fs_prop;
    use crate::value::PropertyValue;

    #[test]
    fn undefined_implies_valid() {
        let mut set = PropertySet::new(Genre::Fs);
        set.set_undefined(fs_prop::MD5);
        assert!(set.valid().contains(fs_prop::MD5));
        assert!(set.undefined().contains(fs_prop::MD5));
        assert!(!set.is_readable(fs_prop::MD5));
    }

    #[test]
    fn set_clears_undefined() {
        let mut set = PropertySet::new(Genre::Fs);
        set.set_undefined(fs_prop::SIZE);
        set.set(fs_prop::SIZE, PropertyValue::Long(10));
        assert!(set.is_readable(fs_prop::SIZE));
        assert_eq!(set.get(fs_prop::SIZE), Some(&PropertyValue::Long(10)));
    }

    #[test]
    fn copy_props_copies_only_mask() {
        let mut src = PropertySet::new(Genre::Fs);
        src.set(fs_prop::SIZE, PropertyValue::Long(5));
        src.set(fs_prop::MD5, PropertyValue::Bytes(vec![1, 2]));

        let mut dst = PropertySet::new(Genre::Fs);
        let mask: PropertyVector = [fs_prop::SIZE].into_iter().collect();
        dst.copy_props(&src, &mask).unwrap();

        assert!(dst.is_readable(fs_prop::SIZE));
        assert!(!dst.is_readable(fs_prop::MD5));
    }

    #[test]
    fn copy_props_wrong_genre_fails() {
        let src = PropertySet::new(Genre::Fs);
        let mut dst = PropertySet::new(Genre::Ntfs);
        let mask = PropertyVector::new();
        assert!(dst.copy_props(&src, &mask).is_err());
    }

    #[test]
    fn serialize_round_trips_valid_and_undefined() {
        let mut set = PropertySet::new(Genre::Fs);
        set.set(fs_prop::SIZE, PropertyValue::Long(42));
        set.set(fs_prop::MODE, PropertyValue::Int(0o644));
        set.set_undefined(fs_prop::MD5);

        let bytes = set.serialize();
        let back = PropertySet::deserialize(Genre::Fs, &bytes).unwrap();

        assert_eq!(back.get(fs_prop::SIZE), Some(&PropertyValue::Long(42)));
        assert_eq!(back.get(fs_prop::MODE), Some(&PropertyValue::Int(0o644)));
        assert!(!back.is_readable(fs_prop::MD5));
        assert!(back.valid().contains(fs_prop::MD5));
    }

    #[test]
    fn invalidate_removes_from_both_vectors() {
        let mut set = PropertySet::new(Genre::Fs);
        set.set_undefined(fs_prop::MD5);
        set.invalidate(fs_prop::MD5);
        assert!(!set.valid().contains(fs_prop::MD5));
        assert!(!set.undefined().contains(fs_prop::MD5));
    }
}
