//! Attribute inheritance: global attributes, enclosing scope attributes,
//! rule attributes (spec.md §4.7).

use std::collections::HashMap;

/// Merge three attribute layers into a rule's effective attribute map.
///
/// Inner wins on conflict (`rule` beats `scope` beats `global`), except
/// that a global attribute fills any key absent from both `scope` and
/// `rule` (spec.md §4.7's "a global attribute only fills absent keys").
#[must_use]
pub fn merge_attributes(
    global: &HashMap<String, String>,
    scope: &HashMap<String, String>,
    rule: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = global.clone();
    for (k, v) in scope {
        merged.insert(k.clone(), v.clone());
    }
    for (k, v) in rule {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn rule_attribute_wins_over_scope_and_global() {
        let global = map(&[("severity", "1")]);
        let scope = map(&[("severity", "2")]);
        let rule = map(&[("severity", "3")]);
        let merged = merge_attributes(&global, &scope, &rule);
        assert_eq!(merged.get("severity"), Some(&"3".to_string()));
    }

    #[test]
    fn scope_attribute_wins_over_global_when_rule_is_silent() {
        let global = map(&[("severity", "1")]);
        let scope = map(&[("severity", "2")]);
        let rule = map(&[]);
        let merged = merge_attributes(&global, &scope, &rule);
        assert_eq!(merged.get("severity"), Some(&"2".to_string()));
    }

    #[test]
    fn global_attribute_fills_a_key_absent_elsewhere() {
        let global = map(&[("emailto", "admin@example.com")]);
        let scope = map(&[("severity", "2")]);
        let rule = map(&[]);
        let merged = merge_attributes(&global, &scope, &rule);
        assert_eq!(
            merged.get("emailto"),
            Some(&"admin@example.com".to_string())
        );
        assert_eq!(merged.get("severity"), Some(&"2".to_string()));
    }
}
