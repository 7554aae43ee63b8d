//! Policy-file preprocessing, tokenizing, and parsing (spec.md §4.8).

pub mod parser;
pub mod preprocessor;
pub mod tokenizer;
pub mod vars;

use std::collections::HashMap;

use fim_error::Result;
use fim_policy_ast::SpecList;
use fim_types::Genre;

pub use parser::ParseMode;
pub use vars::VarScope;

/// Preprocess, tokenize, and parse `source` for every genre segment it
/// contains, returning one [`SpecList`] per genre. `global_attrs` is the
/// cross-genre attribute layer (spec.md §4.7); `host` is the identity
/// `#ifhost` is evaluated against.
pub fn parse_policy(
    source: &str,
    host: &str,
    global_attrs: &HashMap<String, String>,
    mode: ParseMode,
) -> Result<HashMap<Genre, SpecList>> {
    let mut vars = VarScope::new();
    let segments = preprocessor::preprocess(source, host, &mut vars)?;

    let mut out = HashMap::new();
    for (genre, text) in segments {
        let tokens = tokenizer::tokenize(&text)?;
        let spec = parser::parse_tokens(&tokens, genre, &mut vars, global_attrs, mode)?;
        out.insert(genre, spec);
    }
    Ok(out)
}
