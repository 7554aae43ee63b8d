//! Lexer for a single genre segment of policy text, after preprocessing
//! (spec.md §4.8's token list, trimmed to what the parser actually
//! consumes).

use fim_error::{FimError, PolicyError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Comma,
    LParen,
    RParen,
    Semicolon,
    LBrace,
    RBrace,
    Equals,
    Arrow,
    Bang,
    Global,
    Ident(String),
    Str(String),
    /// Raw, not-yet-substituted text of a property expression, captured
    /// verbatim between `->` and the next `(`, `{`, or `;`.
    PropExpr(String),
    Eof,
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Unescape a quoted string body; mirrors `fim_name`'s display escape
/// scheme (spec.md §4.8: "escape processing ... mirrors the name
/// displayer").
fn unescape(body: &[u8], line: usize) -> Result<String> {
    let bad = |msg: &str| {
        FimError::Policy(PolicyError::Parse {
            line,
            message: msg.to_string(),
        })
    };
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        if body[i] == b'\\' {
            match body.get(i + 1) {
                Some(b'\\') => {
                    out.push(b'\\');
                    i += 2;
                }
                Some(b'"') => {
                    out.push(b'"');
                    i += 2;
                }
                Some(b'x') => {
                    let hi = *body.get(i + 2).ok_or_else(|| bad("truncated \\x escape"))?;
                    let lo = *body.get(i + 3).ok_or_else(|| bad("truncated \\x escape"))?;
                    let hi = hex_val(hi).ok_or_else(|| bad("bad hex digit in \\x escape"))?;
                    let lo = hex_val(lo).ok_or_else(|| bad("bad hex digit in \\x escape"))?;
                    out.push((hi << 4) | lo);
                    i += 4;
                }
                _ => return Err(bad("unknown escape sequence")),
            }
        } else {
            out.push(body[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| bad("string literal is not valid UTF-8"))
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || c == b'@' || c == b'-'
}

/// Tokenize `src`. `Arrow` switches the lexer into raw-capture mode for
/// the following property expression (spec.md §4.7's dense token run).
pub fn tokenize(src: &str) -> Result<Vec<(Token, usize)>> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0usize;
    let mut line = 1usize;
    let mut after_arrow = false;

    while i < bytes.len() {
        let c = bytes[i];
        if c == b'\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if after_arrow {
            let start = i;
            while i < bytes.len() && !matches!(bytes[i], b';' | b'(' | b'{') {
                if bytes[i] == b'\n' {
                    line += 1;
                }
                i += 1;
            }
            let raw = src[start..i].trim().to_string();
            out.push((Token::PropExpr(raw), line));
            after_arrow = false;
            continue;
        }

        match c {
            b',' => {
                out.push((Token::Comma, line));
                i += 1;
            }
            b'(' => {
                out.push((Token::LParen, line));
                i += 1;
            }
            b')' => {
                out.push((Token::RParen, line));
                i += 1;
            }
            b';' => {
                out.push((Token::Semicolon, line));
                i += 1;
            }
            b'{' => {
                out.push((Token::LBrace, line));
                i += 1;
            }
            b'}' => {
                out.push((Token::RBrace, line));
                i += 1;
            }
            b'!' => {
                out.push((Token::Bang, line));
                i += 1;
            }
            b'=' => {
                out.push((Token::Equals, line));
                i += 1;
            }
            b'-' if bytes.get(i + 1) == Some(&b'>') => {
                out.push((Token::Arrow, line));
                i += 2;
                after_arrow = true;
            }
            b'"' => {
                let start = i + 1;
                let mut j = start;
                loop {
                    if j >= bytes.len() {
                        return Err(FimError::Policy(PolicyError::Parse {
                            line,
                            message: "unterminated string literal".into(),
                        }));
                    }
                    if bytes[j] == b'\\' {
                        j += 2;
                        continue;
                    }
                    if bytes[j] == b'"' {
                        break;
                    }
                    j += 1;
                }
                let s = unescape(&bytes[start..j], line)?;
                out.push((Token::Str(s), line));
                i = j + 1;
            }
            _ if is_ident_char(c) => {
                let start = i;
                while i < bytes.len() && is_ident_char(bytes[i]) {
                    i += 1;
                }
                let word = &src[start..i];
                out.push((
                    if word == "global" {
                        Token::Global
                    } else {
                        Token::Ident(word.to_string())
                    },
                    line,
                ));
            }
            _ => {
                return Err(FimError::Policy(PolicyError::Parse {
                    line,
                    message: format!("unexpected character '{}'", c as char),
                }));
            }
        }
    }
    out.push((Token::Eof, line));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_simple_rule() {
        let toks = tokenize(r#""/etc" -> +SM (severity = 50);"#).unwrap();
        let kinds: Vec<_> = toks.into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Str("/etc".into()),
                Token::Arrow,
                Token::PropExpr("+SM".into()),
                Token::LParen,
                Token::Ident("severity".into()),
                Token::Equals,
                Token::Str("50".into()),
                Token::RParen,
                Token::Semicolon,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn unescapes_quoted_strings() {
        let toks = tokenize(r#""a\"b\\c\x41""#).unwrap();
        assert_eq!(toks[0].0, Token::Str("a\"b\\cA".into()));
    }

    #[test]
    fn global_keyword_is_its_own_token() {
        let toks = tokenize("global X").unwrap();
        assert_eq!(toks[0].0, Token::Global);
        assert_eq!(toks[1].0, Token::Ident("X".into()));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(tokenize(r#""unterminated"#).is_err());
    }
}
