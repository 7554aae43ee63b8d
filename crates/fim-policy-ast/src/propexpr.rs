//! The property-expression grammar compiler (spec.md §4.7).
//!
//! An expression is a dense sequence of `(+|-)?LETTER` tokens; presets
//! are expanded to such a sequence by the parser layer (variable
//! substitution) before reaching this compiler. The final mask is the
//! symmetric composition of the tokens in left-to-right order.

use fim_error::{PolicyError, Result};
use fim_fco::{fs_schema, PropertyVector};

/// Compile a property expression into a mask, starting from `base`
/// (usually empty; non-empty when a rule's expression is layered on
/// top of a scope's).
pub fn compile_property_expression(expr: &str, base: &PropertyVector) -> Result<PropertyVector> {
    let mut mask = base.clone();
    let mut chars = expr.chars().peekable();
    while let Some(c) = chars.next() {
        let (exclude, letter) = match c {
            '+' => (false, chars.next()),
            '-' => (true, chars.next()),
            other => (false, Some(other)),
        };
        let Some(letter) = letter else {
            return Err(PolicyError::Parse {
                line: 0,
                message: "property expression ends with a dangling sign".into(),
            }
            .into());
        };
        if letter.is_whitespace() {
            continue;
        }
        let slot = fs_schema()
            .iter()
            .find(|s| s.letter == letter)
            .ok_or_else(|| PolicyError::Parse {
                line: 0,
                message: format!("unknown property letter '{letter}'"),
            })?;
        if exclude {
            mask.remove(slot.index);
        } else {
            mask.add_and_grow(slot.index);
        }
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fim_fco::fs_prop;

    #[test]
    fn plain_letters_default_to_include() {
        let mask = compile_property_expression("SM", &PropertyVector::new()).unwrap();
        assert!(mask.contains(fs_prop::SIZE));
        assert!(mask.contains(fs_prop::MODE));
    }

    #[test]
    fn exclude_removes_a_previously_included_property() {
        let mask = compile_property_expression("+SM-S", &PropertyVector::new()).unwrap();
        assert!(!mask.contains(fs_prop::SIZE));
        assert!(mask.contains(fs_prop::MODE));
    }

    #[test]
    fn left_to_right_composition_matters() {
        let a = compile_property_expression("-S+S", &PropertyVector::new()).unwrap();
        let b = compile_property_expression("+S-S", &PropertyVector::new()).unwrap();
        assert!(a.contains(fs_prop::SIZE));
        assert!(!b.contains(fs_prop::SIZE));
    }

    #[test]
    fn unknown_letter_is_rejected() {
        assert!(compile_property_expression("Q", &PropertyVector::new()).is_err());
    }
}
