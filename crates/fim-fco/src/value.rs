//! Tagged property values and the compare/copy operations they support.

use std::fmt;

/// The discriminant of a filesystem object, as observed by `stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    RegularFile,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
    Unknown,
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileType::RegularFile => "file",
            FileType::Directory => "dir",
            FileType::Symlink => "symlink",
            FileType::BlockDevice => "block-device",
            FileType::CharDevice => "char-device",
            FileType::Fifo => "fifo",
            FileType::Socket => "socket",
            FileType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FileType {
    #[must_use]
    pub fn to_tag(self) -> u8 {
        match self {
            FileType::RegularFile => 0,
            FileType::Directory => 1,
            FileType::Symlink => 2,
            FileType::BlockDevice => 3,
            FileType::CharDevice => 4,
            FileType::Fifo => 5,
            FileType::Socket => 6,
            FileType::Unknown => 7,
        }
    }

    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => FileType::RegularFile,
            1 => FileType::Directory,
            2 => FileType::Symlink,
            3 => FileType::BlockDevice,
            4 => FileType::CharDevice,
            5 => FileType::Fifo,
            6 => FileType::Socket,
            7 => FileType::Unknown,
            _ => return None,
        })
    }
}

/// The outcome of comparing two [`PropertyValue`]s for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    True,
    False,
    WrongType,
    Unsupported,
}

/// A tagged property value: integer, long integer, file-type enum, byte
/// string (hash digest), or string (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Int(i32),
    Long(i64),
    FileType(FileType),
    Bytes(Vec<u8>),
    Str(String),
}

impl PropertyValue {
    /// A one-line, printable rendering used by report output.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            PropertyValue::Int(v) => v.to_string(),
            PropertyValue::Long(v) => v.to_string(),
            PropertyValue::FileType(v) => v.to_string(),
            PropertyValue::Bytes(b) => b.iter().map(|byte| format!("{byte:02x}")).collect(),
            PropertyValue::Str(s) => s.clone(),
        }
    }

    /// Compare this value against another for equality. Mismatched
    /// variants yield `WrongType` rather than `False`, so callers can
    /// distinguish "different value" from "incomparable".
    #[must_use]
    pub fn compare(&self, other: &Self) -> Compare {
        match (self, other) {
            (PropertyValue::Int(a), PropertyValue::Int(b)) => bool_to_compare(a == b),
            (PropertyValue::Long(a), PropertyValue::Long(b)) => bool_to_compare(a == b),
            (PropertyValue::FileType(a), PropertyValue::FileType(b)) => bool_to_compare(a == b),
            (PropertyValue::Bytes(a), PropertyValue::Bytes(b)) => bool_to_compare(a == b),
            (PropertyValue::Str(a), PropertyValue::Str(b)) => bool_to_compare(a == b),
            _ => Compare::WrongType,
        }
    }

    /// Copy `src` into `self` in place, failing if the variants differ.
    pub fn copy_from(&mut self, src: &Self) -> Result<(), ()> {
        match (self, src) {
            (PropertyValue::Int(dst), PropertyValue::Int(s)) => {
                *dst = *s;
                Ok(())
            }
            (PropertyValue::Long(dst), PropertyValue::Long(s)) => {
                *dst = *s;
                Ok(())
            }
            (PropertyValue::FileType(dst), PropertyValue::FileType(s)) => {
                *dst = *s;
                Ok(())
            }
            (PropertyValue::Bytes(dst), PropertyValue::Bytes(s)) => {
                dst.clone_from(s);
                Ok(())
            }
            (PropertyValue::Str(dst), PropertyValue::Str(s)) => {
                dst.clone_from(s);
                Ok(())
            }
            _ => Err(()),
        }
    }
}

fn bool_to_compare(b: bool) -> Compare {
    if b {
        Compare::True
    } else {
        Compare::False
    }
}

/// Tag byte a serialized [`PropertyValue`] leads with, so the reader can
/// build the matching variant without outside knowledge of the schema
/// (spec.md §4.2: "each tagged by a type discriminator").
const TAG_INT: u8 = 0;
const TAG_LONG: u8 = 1;
const TAG_FILE_TYPE: u8 = 2;
const TAG_BYTES: u8 = 3;
const TAG_STR: u8 = 4;

impl PropertyValue {
    /// Tag byte followed by the value's own encoding.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            PropertyValue::Int(v) => {
                out.push(TAG_INT);
                out.extend_from_slice(&v.to_le_bytes());
            }
            PropertyValue::Long(v) => {
                out.push(TAG_LONG);
                out.extend_from_slice(&v.to_le_bytes());
            }
            PropertyValue::FileType(v) => {
                out.push(TAG_FILE_TYPE);
                out.push(v.to_tag());
            }
            PropertyValue::Bytes(b) => {
                out.push(TAG_BYTES);
                out.extend_from_slice(&(b.len() as u32).to_le_bytes());
                out.extend_from_slice(b);
            }
            PropertyValue::Str(s) => {
                out.push(TAG_STR);
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
        }
        out
    }

    /// Inverse of [`Self::serialize`]. Returns the value and the
    /// remaining unconsumed bytes, or `None` on truncated/malformed input.
    #[must_use]
    pub fn deserialize(buf: &[u8]) -> Option<(Self, &[u8])> {
        let (&tag, rest) = buf.split_first()?;
        match tag {
            TAG_INT => {
                let (b, rest) = take(rest, 4)?;
                Some((PropertyValue::Int(i32::from_le_bytes(b.try_into().ok()?)), rest))
            }
            TAG_LONG => {
                let (b, rest) = take(rest, 8)?;
                Some((PropertyValue::Long(i64::from_le_bytes(b.try_into().ok()?)), rest))
            }
            TAG_FILE_TYPE => {
                let (&t, rest) = rest.split_first()?;
                Some((PropertyValue::FileType(FileType::from_tag(t)?), rest))
            }
            TAG_BYTES => {
                let (len_b, rest) = take(rest, 4)?;
                let len = u32::from_le_bytes(len_b.try_into().ok()?) as usize;
                let (b, rest) = take(rest, len)?;
                Some((PropertyValue::Bytes(b.to_vec()), rest))
            }
            TAG_STR => {
                let (len_b, rest) = take(rest, 4)?;
                let len = u32::from_le_bytes(len_b.try_into().ok()?) as usize;
                let (b, rest) = take(rest, len)?;
                Some((PropertyValue::Str(String::from_utf8(b.to_vec()).ok()?), rest))
            }
            _ => None,
        }
    }
}

/// Split `buf` at `n`, or `None` if `buf` is shorter than `n`.
fn take(buf: &[u8], n: usize) -> Option<(&[u8], &[u8])> {
    if buf.len() < n {
        None
    } else {
        Some(buf.split_at(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_equal_values() {
        assert_eq!(
            PropertyValue::Int(5).compare(&PropertyValue::Int(5)),
            Compare::True
        );
        assert_eq!(
            PropertyValue::Int(5).compare(&PropertyValue::Int(6)),
            Compare::False
        );
    }

    #[test]
    fn compare_mismatched_variant_is_wrong_type() {
        assert_eq!(
            PropertyValue::Int(5).compare(&PropertyValue::Long(5)),
            Compare::WrongType
        );
    }

    #[test]
    fn copy_from_same_type_succeeds() {
        let mut a = PropertyValue::Bytes(vec![1, 2, 3]);
        let b = PropertyValue::Bytes(vec![9, 9]);
        a.copy_from(&b).unwrap();
        assert_eq!(a, PropertyValue::Bytes(vec![9, 9]));
    }

    #[test]
    fn copy_from_different_type_fails() {
        let mut a = PropertyValue::Int(1);
        let b = PropertyValue::Str("x".into());
        assert!(a.copy_from(&b).is_err());
    }

    #[test]
    fn serialize_round_trips_every_variant() {
        let values = vec![
            PropertyValue::Int(-5),
            PropertyValue::Long(1 << 40),
            PropertyValue::FileType(FileType::Symlink),
            PropertyValue::Bytes(vec![1, 2, 3, 4]),
            PropertyValue::Str("hello".into()),
        ];
        for v in values {
            let bytes = v.serialize();
            let (back, rest) = PropertyValue::deserialize(&bytes).unwrap();
            assert!(rest.is_empty());
            assert_eq!(v, back);
        }
    }
}
