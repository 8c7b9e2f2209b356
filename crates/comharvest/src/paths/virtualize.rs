//! Replaces real paths inside harvested strings with symbolic tokens.

use super::index::PathTokenIndex;
use aho_corasick::{AhoCorasick, MatchKind};
use comreg::RegValue;
use tracing::{debug, warn};

/// Upper bound on substitution passes over one string.
pub const MAX_ROUNDS: usize = 8;

/// Case-insensitive, longest-match-first path substitution.
///
/// Built once from a finished [`PathTokenIndex`]; the borrow keeps the index
/// from being modified while values are virtualized.
pub struct Virtualizer {
    matcher: Option<AhoCorasick>,
    tokens: Vec<String>,
}

impl Virtualizer {
    pub fn new(index: &PathTokenIndex) -> Self {
        let pairs = index.substitutions();
        if pairs.is_empty() {
            return Virtualizer {
                matcher: None,
                tokens: Vec::new(),
            };
        }

        let keys: Vec<String> = pairs.iter().map(|(k, _)| k.to_lowercase()).collect();
        let matcher = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&keys);
        match matcher {
            Ok(matcher) => {
                debug!("virtualizer: {} substitutions", keys.len());
                Virtualizer {
                    matcher: Some(matcher),
                    tokens: pairs.iter().map(|(_, t)| t.to_string()).collect(),
                }
            }
            Err(e) => {
                warn!("virtualizer: failed to build matcher, values left as-is: {}", e);
                Virtualizer {
                    matcher: None,
                    tokens: Vec::new(),
                }
            }
        }
    }

    /// Substitute every registered path occurring in `value`.
    pub fn virtualize(&self, value: &str) -> String {
        let Some(matcher) = &self.matcher else {
            return value.to_string();
        };

        let mut current = value.to_string();
        for _ in 0..MAX_ROUNDS {
            match self.replace_round(matcher, &current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// One substitution pass over the lowercased value, mapped back onto the
    /// original text. `None` when nothing matched.
    fn replace_round(&self, matcher: &AhoCorasick, value: &str) -> Option<String> {
        let (folded, spans) = fold_case(value);
        let mut out = String::with_capacity(value.len());
        let mut last = 0;
        let mut matched = false;
        for m in matcher.find_iter(&folded) {
            let start = spans[m.start()].0;
            let end = spans[m.end() - 1].1;
            // Both ends inside one expanded character.
            if start < last {
                continue;
            }
            out.push_str(&value[last..start]);
            out.push_str(&self.tokens[m.pattern().as_usize()]);
            last = end;
            matched = true;
        }
        if !matched {
            return None;
        }
        out.push_str(&value[last..]);
        Some(out)
    }

    /// Virtualize a value; multi-string elements are handled independently.
    pub fn virtualize_value(&self, value: &RegValue) -> RegValue {
        value.map_strings(|s| self.virtualize(s))
    }

    pub fn virtualize_opt(&self, value: &mut Option<String>) {
        if let Some(v) = value.as_mut() {
            *v = self.virtualize(v);
        }
    }
}

/// Lowercase `value`. Each byte of the result maps to the byte range of the
/// source character it came from.
fn fold_case(value: &str) -> (String, Vec<(usize, usize)>) {
    let mut folded = String::with_capacity(value.len());
    let mut spans = Vec::with_capacity(value.len());
    for (start, c) in value.char_indices() {
        let end = start + c.len_utf8();
        for lower in c.to_lowercase() {
            folded.push(lower);
            spans.extend(std::iter::repeat((start, end)).take(lower.len_utf8()));
        }
    }
    (folded, spans)
}
