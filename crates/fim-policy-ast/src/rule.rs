//! A single rule: start-point, stop policy, property mask, attributes
//! (spec.md §3, §4.7).

use std::collections::HashMap;

use fim_fco::PropertyVector;
use fim_name::{Name, Relationship};

/// How a rule bounds its own descent (spec.md §3's `StopPolicy`).
#[derive(Debug, Clone)]
pub enum StopPolicy {
    /// Descend freely, halting at any name equal to a stop-point, or
    /// once `max_depth` components below `start` have been consumed
    /// (`None` means unbounded).
    StopPoints {
        stop_points: Vec<Name>,
        max_depth: Option<usize>,
    },
    /// Descend exactly one level below `start` and no further.
    NoChildren,
}

/// A parsed rule (spec.md §3's `Rule (spec)`).
#[derive(Debug, Clone)]
pub struct Rule {
    pub start: Name,
    pub stop_policy: StopPolicy,
    pub mask: PropertyVector,
    pub named_attrs: HashMap<String, String>,
    pub severity: u32,
    pub email_targets: Vec<String>,
}

impl Rule {
    #[must_use]
    pub fn new(start: Name, stop_policy: StopPolicy, mask: PropertyVector) -> Self {
        Self {
            start,
            stop_policy,
            mask,
            named_attrs: HashMap::new(),
            severity: 0,
            email_targets: Vec::new(),
        }
    }

    fn depth_below_start(&self, name: &Name) -> Option<usize> {
        if !self.start.is_at_or_above(name) {
            return None;
        }
        Some(name.components().len() - self.start.components().len())
    }

    /// True iff `name` is at or below `start` and not at or below any
    /// stop-point (spec.md §3's containment definition).
    #[must_use]
    pub fn contains(&self, name: &Name) -> bool {
        let Some(depth) = self.depth_below_start(name) else {
            return false;
        };
        match &self.stop_policy {
            StopPolicy::NoChildren => depth == 0,
            StopPolicy::StopPoints {
                stop_points,
                max_depth,
            } => {
                if let Some(max) = max_depth {
                    if depth > *max {
                        return false;
                    }
                }
                !stop_points
                    .iter()
                    .any(|sp| sp.is_at_or_above(name))
            }
        }
    }

    /// True iff descent should halt *at* `name` -- no strict descendant
    /// of `name` is contained by this rule (spec.md §8 invariant 4's
    /// second clause).
    #[must_use]
    pub fn should_stop_descent(&self, name: &Name) -> bool {
        let Some(depth) = self.depth_below_start(name) else {
            return false;
        };
        match &self.stop_policy {
            StopPolicy::NoChildren => depth >= 1,
            StopPolicy::StopPoints {
                stop_points,
                max_depth,
            } => {
                if let Some(max) = max_depth {
                    if depth >= *max {
                        return true;
                    }
                }
                stop_points
                    .iter()
                    .any(|sp| matches!(name.relationship(sp), Relationship::Equal | Relationship::Above))
            }
        }
    }

    /// The effective property vector for an object with capability mask
    /// `caps`: this rule's mask narrowed to what the object type can
    /// actually carry.
    #[must_use]
    pub fn prop_mask(&self, caps: &PropertyVector) -> PropertyVector {
        self.mask.intersection(caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fim_types::Genre;

    fn n(path: &str) -> Name {
        Name::from_raw(Genre::Fs, path.as_bytes())
    }

    fn stop_rule(start: &str, stops: &[&str]) -> Rule {
        Rule::new(
            n(start),
            StopPolicy::StopPoints {
                stop_points: stops.iter().map(|s| n(s)).collect(),
                max_depth: None,
            },
            PropertyVector::new(),
        )
    }

    #[test]
    fn contains_everything_below_start_when_no_stop_points() {
        let rule = stop_rule("/usr", &[]);
        assert!(rule.contains(&n("/usr")));
        assert!(rule.contains(&n("/usr/bin/ls")));
        assert!(!rule.contains(&n("/etc")));
    }

    #[test]
    fn stop_point_excludes_itself_and_descendants() {
        let rule = stop_rule("/usr", &["/usr/tmp"]);
        assert!(rule.contains(&n("/usr/bin")));
        assert!(!rule.contains(&n("/usr/tmp")));
        assert!(!rule.contains(&n("/usr/tmp/x")));
        assert!(rule.should_stop_descent(&n("/usr/tmp")));
        assert!(!rule.should_stop_descent(&n("/usr/bin")));
    }

    #[test]
    fn no_children_stops_one_level_down() {
        let rule = Rule::new(n("/etc"), StopPolicy::NoChildren, PropertyVector::new());
        assert!(rule.contains(&n("/etc")));
        assert!(!rule.contains(&n("/etc/passwd")));
        assert!(rule.should_stop_descent(&n("/etc")));
    }

    #[test]
    fn max_depth_bounds_descent() {
        let rule = Rule::new(
            n("/a"),
            StopPolicy::StopPoints {
                stop_points: Vec::new(),
                max_depth: Some(1),
            },
            PropertyVector::new(),
        );
        assert!(rule.contains(&n("/a")));
        assert!(rule.contains(&n("/a/b")));
        assert!(!rule.contains(&n("/a/b/c")));
    }

    #[test]
    fn prop_mask_is_narrowed_by_capabilities() {
        let mut mask = PropertyVector::new();
        mask.add_and_grow(0);
        mask.add_and_grow(1);
        let rule = Rule::new(n("/a"), StopPolicy::NoChildren, mask);
        let mut caps = PropertyVector::new();
        caps.add_and_grow(0);
        let effective = rule.prop_mask(&caps);
        assert!(effective.contains(0));
        assert!(!effective.contains(1));
    }
}
