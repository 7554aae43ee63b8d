//! The file-change object: a named observation record (spec.md §3).

use bitflags::bitflags;
use fim_name::Name;

use crate::set::PropertySet;

bitflags! {
    /// Capabilities an FCO exposes. Currently a single bit, used by the
    /// integrity checker to decide which properties to mask off in
    /// loose-directory mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const CAN_HAVE_CHILDREN = 0b0000_0001;
    }
}

/// `{ name, caps, props }` -- a named, capability-tagged property set.
#[derive(Debug, Clone)]
pub struct Fco {
    pub name: Name,
    pub caps: Capabilities,
    pub props: PropertySet,
}

impl Fco {
    #[must_use]
    pub fn new(name: Name, caps: Capabilities, props: PropertySet) -> Self {
        Self { name, caps, props }
    }

    #[must_use]
    pub fn can_have_children(&self) -> bool {
        self.caps.contains(Capabilities::CAN_HAVE_CHILDREN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fim_types::Genre;

    #[test]
    fn capabilities_roundtrip() {
        let fco = Fco::new(
            Name::root(Genre::Fs),
            Capabilities::CAN_HAVE_CHILDREN,
            PropertySet::new(Genre::Fs),
        );
        assert!(fco.can_have_children());
    }
}
