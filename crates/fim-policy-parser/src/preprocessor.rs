//! Line-oriented preprocessor: comments, `#ifhost`/`#else`/`#endif`
//! frames, `#section`, `#echo`, `#error`, `#define`/`#undef` (spec.md
//! §4.8, supplemented per SPEC_FULL.md §C).

use std::collections::HashMap;

use fim_error::{FimError, PolicyError, Result};
use fim_types::Genre;

use crate::vars::VarScope;

struct Frame {
    parent_effective: bool,
    branch_taken: bool,
}

/// Run the preprocessor over raw policy text, returning the accepted
/// source for each genre encountered under a `#section` directive (the
/// whole text is attributed to [`Genre::Fs`] if no `#section` appears).
pub fn preprocess(source: &str, host: &str, vars: &mut VarScope) -> Result<HashMap<Genre, String>> {
    let mut frames: Vec<Frame> = Vec::new();
    let mut brace_depth = 0i32;
    let mut current_genre = Genre::Fs;
    let mut segments: HashMap<Genre, String> = HashMap::new();

    let effective_accept = |frames: &[Frame]| -> bool {
        frames
            .last()
            .map(|f| f.parent_effective && f.branch_taken)
            .unwrap_or(true)
    };

    for (line_no, raw_line) in source.lines().enumerate() {
        let line_no = line_no + 1;
        let trimmed = raw_line.trim_start();
        let accepting = effective_accept(&frames);

        if let Some(rest) = trimmed.strip_prefix('#') {
            let mut parts = rest.splitn(2, char::is_whitespace);
            let directive = parts.next().unwrap_or("").trim();
            let arg = parts.next().unwrap_or("").trim();

            match directive {
                "ifhost" => {
                    let host_match = arg.split("||").any(|h| h.trim() == host);
                    let parent_effective = effective_accept(&frames);
                    frames.push(Frame {
                        parent_effective,
                        branch_taken: host_match,
                    });
                }
                "else" => {
                    let f = frames.pop().ok_or_else(|| {
                        FimError::Policy(PolicyError::Parse {
                            line: line_no,
                            message: "#else without matching #ifhost".into(),
                        })
                    })?;
                    let branch_taken = if f.parent_effective {
                        !f.branch_taken
                    } else {
                        f.branch_taken
                    };
                    frames.push(Frame {
                        parent_effective: f.parent_effective,
                        branch_taken,
                    });
                }
                "endif" => {
                    frames.pop().ok_or_else(|| {
                        FimError::Policy(PolicyError::Parse {
                            line: line_no,
                            message: "#endif without matching #ifhost".into(),
                        })
                    })?;
                }
                "section" if accepting => {
                    if brace_depth != 0 {
                        return Err(FimError::Policy(PolicyError::SectionNotAtTopLevel));
                    }
                    current_genre = match arg.to_ascii_uppercase().as_str() {
                        "FS" => Genre::Fs,
                        "NTFS" => Genre::Ntfs,
                        "NTREG" => Genre::Ntreg,
                        other => {
                            return Err(FimError::Policy(PolicyError::Parse {
                                line: line_no,
                                message: format!("unknown #section genre: {other}"),
                            }))
                        }
                    };
                }
                "echo" if accepting => {
                    let msg = vars.substitute(arg.trim_matches('"'))?;
                    tracing::info!(target: "policy_echo", "{msg}");
                }
                "error" if accepting => {
                    let msg = vars.substitute(arg.trim_matches('"'))?;
                    return Err(FimError::Policy(PolicyError::UserError(msg)));
                }
                "define" if accepting => {
                    let mut it = arg.splitn(2, char::is_whitespace);
                    let name = it.next().unwrap_or("").trim();
                    let value = it.next().unwrap_or("").trim().trim_matches('"');
                    let value = vars.substitute(value)?;
                    vars.define_local(name, value);
                }
                "undef" if accepting => {
                    vars.undef_local(arg.trim());
                }
                _ => {}
            }
            continue;
        }

        if !accepting {
            continue;
        }

        let mut in_quote = false;
        let mut escaped = false;
        for c in raw_line.chars() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' if in_quote => escaped = true,
                '"' => in_quote = !in_quote,
                '{' if !in_quote => brace_depth += 1,
                '}' if !in_quote => brace_depth -= 1,
                _ => {}
            }
        }

        let buf = segments.entry(current_genre).or_default();
        buf.push_str(raw_line);
        buf.push('\n');
    }

    if !frames.is_empty() {
        return Err(FimError::Policy(PolicyError::Parse {
            line: source.lines().count(),
            message: "unterminated #ifhost block".into(),
        }));
    }

    Ok(segments)
}
