//! The integrity-check report: added/removed/changed FCOs, the error
//! queue, and a scanned-object counter (spec.md §4.9, §7).

use fim_error::ErrorBucket;
use fim_fco::{Fco, PropertyVector};

/// One object whose properties differ between the database and the
/// live object, along with exactly which properties changed.
#[derive(Debug)]
pub struct ChangedEntry {
    pub old: Fco,
    pub new: Fco,
    pub changed_props: PropertyVector,
}

/// The accumulated outcome of a baseline, check, or policy-update pass.
#[derive(Debug, Default)]
pub struct Report {
    pub added: Vec<Fco>,
    pub removed: Vec<Fco>,
    pub changed: Vec<ChangedEntry>,
    pub errors: ErrorBucket,
    pub objects_scanned: usize,
}

impl Report {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any object differed, or any non-fatal error occurred.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty() && self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_report_is_clean() {
        assert!(Report::new().is_clean());
    }

    #[test]
    fn any_addition_is_not_clean() {
        let mut report = Report::new();
        report.errors.push("boom", None, false);
        assert!(!report.is_clean());
    }
}
