//! Raw / API / display renderings of a [`Name`], and the display-to-name
//! parser that inverts the display renderer (spec.md §4.3).

use crate::name::Name;
use fim_types::Genre;

/// Render `component` escaping the set `{ delimiter, backslash,
/// double-quote, any byte < 0x20 or > 0x7E }` as `\xHH` or `\\` / `\"`.
fn escape_component(component: &[u8], delimiter: u8) -> String {
    let mut out = String::with_capacity(component.len());
    for &b in component {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            _ if b == delimiter || b < 0x20 || b > 0x7E => {
                out.push_str(&format!("\\x{b:02X}"));
            }
            _ => out.push(b as char),
        }
    }
    out
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Inverse of [`escape_component`]. Returns `None` on malformed escapes.
fn unescape_component(s: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        if s[i] == b'\\' {
            match s.get(i + 1) {
                Some(b'\\') => {
                    out.push(b'\\');
                    i += 2;
                }
                Some(b'"') => {
                    out.push(b'"');
                    i += 2;
                }
                Some(b'x') => {
                    let hi = hex_val(*s.get(i + 2)?)?;
                    let lo = hex_val(*s.get(i + 3)?)?;
                    out.push((hi << 4) | lo);
                    i += 4;
                }
                _ => return None,
            }
        } else {
            out.push(s[i]);
            i += 1;
        }
    }
    Some(out)
}

/// Render a name as a printable, round-trippable display string.
#[must_use]
pub fn to_string_display(name: &Name) -> String {
    let delim = name.genre().delimiter() as char;
    let mut out = String::new();
    if name.is_absolute() {
        out.push(delim);
    }
    for (i, component) in name.components().iter().enumerate() {
        if i > 0 {
            out.push(delim);
        }
        out.push_str(&escape_component(component, name.genre().delimiter()));
    }
    out
}

/// Parse a display string produced by [`to_string_display`] back into a
/// [`Name`]. This is required to be the exact inverse for every name the
/// core can produce (spec.md §8 invariant 2): the delimiter byte never
/// appears unescaped except as a separator, so splitting on the raw
/// delimiter character is safe.
#[must_use]
pub fn display_to_name(genre: Genre, display: &str) -> Option<Name> {
    let delim = genre.delimiter();
    let bytes = display.as_bytes();
    let absolute = bytes.first() == Some(&delim);
    let body = if absolute { &bytes[1..] } else { bytes };

    let mut components = Vec::new();
    if !body.is_empty() {
        for part in body.split(|&b| b == delim) {
            if part.is_empty() {
                continue;
            }
            components.push(unescape_component(part)?);
        }
    }

    let mut name = if absolute {
        Name::root(genre)
    } else {
        Name::from_raw(genre, b"")
    };
    for c in components {
        name = name.pushed(&c);
    }
    Some(name)
}

/// Canonical raw bytes used for hashing / content-addressing.
#[must_use]
pub fn to_raw(name: &Name) -> Vec<u8> {
    let delim = name.genre().delimiter();
    let mut out = Vec::new();
    if name.is_absolute() {
        out.push(delim);
    }
    for (i, c) in name.components().iter().enumerate() {
        if i > 0 {
            out.push(delim);
        }
        out.extend_from_slice(c);
    }
    out
}

/// Bytes passed to the OS. For the FS genre on this workspace's native
/// adapter this is identical to [`to_raw`]; kept distinct so NTFS/NTREG
/// genres can diverge without touching call sites.
#[must_use]
pub fn to_api(name: &Name) -> Vec<u8> {
    to_raw(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn n(path: &str) -> Name {
        Name::from_raw(Genre::Fs, path.as_bytes())
    }

    #[test]
    fn simple_round_trip() {
        let name = n("/usr/local/bin");
        let display = to_string_display(&name);
        assert_eq!(display_to_name(Genre::Fs, &display), Some(name));
    }

    #[test]
    fn escapes_control_and_delimiter_bytes() {
        let name = Name::from_raw(Genre::Fs, b"").pushed(b"a\x01b/c\\d\"e");
        let display = to_string_display(&name);
        assert!(display.contains("\\x01"));
        assert!(display.contains("\\x2F")); // escaped '/'
        assert!(display.contains("\\\\"));
        assert!(display.contains("\\\""));
        assert_eq!(display_to_name(Genre::Fs, &display), Some(name));
    }

    proptest! {
        #[test]
        fn display_round_trip_holds_for_arbitrary_bytes(
            parts in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..12), 0..6),
            absolute in any::<bool>(),
        ) {
            let mut name = if absolute { Name::root(Genre::Fs) } else { Name::from_raw(Genre::Fs, b"") };
            for p in &parts {
                if !p.is_empty() {
                    name = name.pushed(p);
                }
            }
            let display = to_string_display(&name);
            let back = display_to_name(Genre::Fs, &display);
            prop_assert_eq!(back, Some(name));
        }
    }
}
