//! Regex trigger patterns.
//!
//! A script's `regex` line is trial-compiled when the script is compiled so a
//! bad pattern fails the whole script instead of failing at match time.
//!
//! Matching is case-insensitive unless the pattern contains an unescaped
//! uppercase letter outside a bracket expression ("smart case"), and `.`
//! matches newlines.

use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

use crate::script::name::Scope;
use crate::script::values::ValueMap;

/// Context-value stem that regex captures are written under.
pub const MATCH_STEM: &str = "match.";

/// Error returned when a pattern cannot be compiled.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("regex error: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("empty pattern")]
    Empty,
}

/// A compiled regex trigger.  Cloning shares the compiled automaton.
#[derive(Clone)]
pub struct Pattern {
    src: String,
    regex: Arc<Regex>,
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern").field("src", &self.src).finish()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.src == other.src
    }
}

impl Pattern {
    pub fn new(src: &str) -> Result<Self, PatternError> {
        if src.is_empty() {
            return Err(PatternError::Empty);
        }
        let regex = regex::RegexBuilder::new(src)
            .case_insensitive(!has_unescaped_upper(src))
            .dot_matches_new_line(true)
            .build()?;
        Ok(Self { src: src.to_owned(), regex: Arc::new(regex) })
    }

    /// The original source string.
    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Match `text` and, on success, write the captures into `values` as
    /// context values: `$match.0` is the whole match, `$match.N` the Nth
    /// group, `$match.<name>` each named group.  Groups that did not
    /// participate are written as empty.
    pub fn captures_into(&self, text: &str, values: &mut ValueMap) -> bool {
        let Some(caps) = self.regex.captures(text) else { return false };
        let stem = format!("{}{MATCH_STEM}", Scope::Context.prefix());
        for (i, group) in caps.iter().enumerate() {
            let s = group.map_or("", |m| m.as_str());
            values.set(format!("{stem}{i}"), s);
        }
        for name in self.regex.capture_names().flatten() {
            let s = caps.name(name).map_or("", |m| m.as_str());
            values.set(format!("{stem}{name}"), s);
        }
        true
    }
}

fn has_unescaped_upper(pattern: &str) -> bool {
    let mut escaped = false;
    let mut in_bracket = false;
    for ch in pattern.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if in_bracket {
            // [A-Z] is a class, not a literal uppercase letter.
            if ch == ']' {
                in_bracket = false;
            }
            continue;
        }
        if ch == '[' {
            in_bracket = true;
            continue;
        }
        if ch.is_uppercase() {
            return true;
        }
    }
    false
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_regex_is_rejected() {
        assert!(matches!(Pattern::new("(unclosed"), Err(PatternError::InvalidRegex(_))));
        assert!(matches!(Pattern::new(""), Err(PatternError::Empty)));
    }

    #[test]
    fn smart_case() {
        assert!(Pattern::new("hello").unwrap().matches("HeLLo there"));
        assert!(!Pattern::new("Hello").unwrap().matches("hello"));
        assert!(Pattern::new("[A-Z]+ing").unwrap().matches("sing"));
    }

    #[test]
    fn escaped_upper_keeps_case_insensitive() {
        assert!(Pattern::new(r"\Sfoo").unwrap().matches("XFOO"));
    }

    #[test]
    fn captures_written_as_context_values() {
        let p = Pattern::new(r"roll (\d+)d(?P<sides>\d+)").unwrap();
        let mut m = ValueMap::new();
        assert!(p.captures_into("please roll 2d6 now", &mut m));
        assert_eq!(m.peek("$match.0").unwrap().text(), "roll 2d6");
        assert_eq!(m.peek("$match.1").unwrap().number(), 2);
        assert_eq!(m.peek("$match.sides").unwrap().number(), 6);
    }

    #[test]
    fn no_match_writes_nothing() {
        let p = Pattern::new("xyz").unwrap();
        let mut m = ValueMap::new();
        assert!(!p.captures_into("abc", &mut m));
        assert!(m.is_empty());
    }
}
