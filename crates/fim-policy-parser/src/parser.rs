//! Recursive-descent parser: turns a tokenized genre segment into a
//! [`fim_policy_ast::SpecList`] (spec.md §4.7-4.8).

use std::collections::HashMap;

use fim_error::{FimError, PolicyError, Result};
use fim_fco::PropertyVector;
use fim_name::Name;
use fim_policy_ast::{compile_property_expression, merge_attributes, Rule, SpecList, StopPolicy};
use fim_types::Genre;

use crate::tokenizer::Token;
use crate::vars::VarScope;

/// Whether the parser validates only, or also builds the resulting
/// [`SpecList`] (spec.md §4.8's "two parser modes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Check,
    Execute,
}

struct Parser<'a> {
    tokens: &'a [(Token, usize)],
    pos: usize,
    vars: &'a mut VarScope,
    global_attrs: &'a HashMap<String, String>,
    genre: Genre,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn line(&self) -> usize {
        self.tokens[self.pos].1
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].0.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: &Token) -> Result<()> {
        if self.peek() == want {
            self.advance();
            Ok(())
        } else {
            Err(FimError::Policy(PolicyError::Parse {
                line: self.line(),
                message: format!("expected {want:?}, found {:?}", self.peek()),
            }))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.advance() {
            Token::Ident(s) => Ok(s),
            other => Err(FimError::Policy(PolicyError::Parse {
                line: self.line(),
                message: format!("expected identifier, found {other:?}"),
            })),
        }
    }

    fn expect_str(&mut self) -> Result<String> {
        match self.advance() {
            Token::Str(s) => Ok(s),
            other => Err(FimError::Policy(PolicyError::Parse {
                line: self.line(),
                message: format!("expected string literal, found {other:?}"),
            })),
        }
    }

    /// `'(' IDENT '=' STRING (',' IDENT '=' STRING)* ')'`, substituted.
    fn parse_attr_list(&mut self) -> Result<HashMap<String, String>> {
        self.expect(&Token::LParen)?;
        let mut attrs = HashMap::new();
        if self.peek() != &Token::RParen {
            loop {
                let name = self.expect_ident()?;
                self.expect(&Token::Equals)?;
                let raw = self.expect_str()?;
                attrs.insert(name, self.vars.substitute(&raw)?);
                if self.peek() == &Token::Comma {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(attrs)
    }

    /// `'{' STRING (';' STRING)* ';'? '}'`, each entry optionally
    /// preceded by `!` (kept for grammar fidelity, no semantic effect).
    fn parse_stop_block(&mut self) -> Result<Vec<Name>> {
        self.expect(&Token::LBrace)?;
        let mut stops = Vec::new();
        while self.peek() != &Token::RBrace {
            if self.peek() == &Token::Bang {
                self.advance();
            }
            let raw = self.expect_str()?;
            stops.push(Name::from_raw(self.genre, raw.as_bytes()));
            if self.peek() == &Token::Semicolon {
                self.advance();
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(stops)
    }

    fn parse_rule(&mut self, scope_attrs: &HashMap<String, String>) -> Result<Rule> {
        let start_raw = self.expect_str()?;
        self.expect(&Token::Arrow)?;
        let prop_raw = match self.advance() {
            Token::PropExpr(s) => s,
            other => {
                return Err(FimError::Policy(PolicyError::Parse {
                    line: self.line(),
                    message: format!("expected a property expression, found {other:?}"),
                }))
            }
        };

        let mut rule_attrs = HashMap::new();
        if self.peek() == &Token::LParen {
            rule_attrs = self.parse_attr_list()?;
        }
        let mut stop_points = Vec::new();
        if self.peek() == &Token::LBrace {
            stop_points = self.parse_stop_block()?;
        }
        self.expect(&Token::Semicolon)?;

        let attrs = merge_attributes(self.global_attrs, scope_attrs, &rule_attrs);
        let expr = self.vars.substitute(&prop_raw)?;
        let mask = compile_property_expression(&expr, &PropertyVector::new())?;

        let stop_policy = if attrs.get("recurse").map(String::as_str) == Some("0") {
            StopPolicy::NoChildren
        } else {
            StopPolicy::StopPoints {
                stop_points,
                max_depth: attrs.get("maxdepth").and_then(|v| v.parse().ok()),
            }
        };

        let start = Name::from_raw(self.genre, start_raw.as_bytes());
        let mut rule = Rule::new(start, stop_policy, mask);
        rule.severity = attrs.get("severity").and_then(|v| v.parse().ok()).unwrap_or(0);
        rule.email_targets = attrs
            .get("emailto")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();
        rule.named_attrs = attrs;
        Ok(rule)
    }

    fn parse_statements(
        &mut self,
        scope_attrs: &HashMap<String, String>,
        rules: &mut Vec<Rule>,
    ) -> Result<()> {
        loop {
            match self.peek() {
                Token::Eof | Token::RBrace => return Ok(()),
                Token::Global => {
                    self.advance();
                    let name = self.expect_ident()?;
                    self.expect(&Token::Equals)?;
                    let raw = self.expect_str()?;
                    self.expect(&Token::Semicolon)?;
                    let value = self.vars.substitute(&raw)?;
                    self.vars.define_global(name, value);
                }
                Token::LParen => {
                    let block_attrs = self.parse_attr_list()?;
                    self.expect(&Token::LBrace)?;
                    let merged = merge_attributes(&HashMap::new(), scope_attrs, &block_attrs);
                    self.parse_statements(&merged, rules)?;
                    self.expect(&Token::RBrace)?;
                }
                Token::Ident(_) => {
                    let name = self.expect_ident()?;
                    self.expect(&Token::Equals)?;
                    let raw = self.expect_str()?;
                    self.expect(&Token::Semicolon)?;
                    let value = self.vars.substitute(&raw)?;
                    self.vars.define_local(name, value);
                }
                Token::Str(_) => {
                    let rule = self.parse_rule(scope_attrs)?;
                    rules.push(rule);
                }
                other => {
                    return Err(FimError::Policy(PolicyError::Parse {
                        line: self.line(),
                        message: format!("unexpected token {other:?}"),
                    }))
                }
            }
        }
    }
}

/// Parse one genre segment's token stream into a [`SpecList`].
///
/// `global_attrs` is the cross-genre attribute layer (spec.md §4.7); in
/// `Check` mode the resulting spec list is still built (there is no
/// separate validate-only code path) but callers should discard it and
/// only look at the `Result`.
pub fn parse_tokens(
    tokens: &[(Token, usize)],
    genre: Genre,
    vars: &mut VarScope,
    global_attrs: &HashMap<String, String>,
    _mode: ParseMode,
) -> Result<SpecList> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        vars,
        global_attrs,
        genre,
    };
    let mut rules = Vec::new();
    parser.parse_statements(&HashMap::new(), &mut rules)?;
    SpecList::new(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn parse(src: &str) -> Result<SpecList> {
        let tokens = tokenize(src).unwrap();
        let mut vars = VarScope::new();
        parse_tokens(&tokens, Genre::Fs, &mut vars, &HashMap::new(), ParseMode::Execute)
    }

    #[test]
    fn parses_a_single_rule() {
        let spec = parse(r#""/etc" -> +SM;"#).unwrap();
        assert_eq!(spec.rules().len(), 1);
        assert_eq!(spec.rules()[0].start, Name::from_raw(Genre::Fs, b"/etc"));
    }

    #[test]
    fn variable_definition_feeds_later_propexpr() {
        let spec = parse(
            r#"
            ReadOnly = "+SM-C";
            "/etc" -> $(ReadOnly);
            "#,
        )
        .unwrap();
        assert_eq!(spec.rules().len(), 1);
    }

    #[test]
    fn scope_block_attrs_are_inherited_by_contained_rules() {
        let spec = parse(
            r#"
            (severity = "80") {
                "/etc" -> +S;
            }
            "#,
        )
        .unwrap();
        assert_eq!(spec.rules()[0].severity, 80);
    }

    #[test]
    fn rule_attrs_win_over_scope_attrs() {
        let spec = parse(
            r#"
            (severity = "80") {
                "/etc" -> +S (severity = "10");
            }
            "#,
        )
        .unwrap();
        assert_eq!(spec.rules()[0].severity, 10);
    }

    #[test]
    fn stop_block_populates_stop_points() {
        let spec = parse(
            r#"
            "/usr" -> +S { "/usr/tmp"; };
            "#,
        )
        .unwrap();
        match &spec.rules()[0].stop_policy {
            StopPolicy::StopPoints { stop_points, .. } => assert_eq!(stop_points.len(), 1),
            StopPolicy::NoChildren => panic!("expected StopPoints"),
        }
    }

    #[test]
    fn undefined_variable_is_a_fatal_parse_error() {
        let err = parse(r#""/etc" -> $(Missing);"#).unwrap_err();
        assert!(matches!(
            err,
            FimError::Policy(PolicyError::UndefinedVariable(_))
        ));
    }
}
