//! Value arguments and the shared tail-grammar helpers.
//!
//! Wherever an instruction expects a value it accepts one of:
//!
//! - a scoped name (`!x`, `$sender`, `?who`, optionally `!data.*`),
//! - a single-word string constant written `"word`,
//! - a bare integer literal (`42`, `-3`).
//!
//! Names are resolved at execution time against the invocation's
//! [`ValueMap`]; constants are returned as-is.

use super::name::ValueName;
use super::validate::{Invalid, Validator};
use super::value::Value;
use super::values::ValueMap;

/// One parsed value argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueArg {
    Named(ValueName),
    Constant(Value),
}

impl ValueArg {
    /// Classify `token`.  Wildcards are accepted only when `allow_wildcard`.
    pub fn parse(token: &str, allow_wildcard: bool, v: &mut Validator) -> Result<Self, Invalid> {
        if let Some(word) = token.strip_prefix('"') {
            if word.is_empty() {
                return Err(v.fail("empty string constant"));
            }
            return Ok(ValueArg::Constant(Value::from_text(word)));
        }
        if let Ok(n) = token.parse::<i64>() {
            return Ok(ValueArg::Constant(Value::from_number(n)));
        }
        v.value_name(token, allow_wildcard).check()?;
        ValueName::parse(token).map(ValueArg::Named).ok_or(Invalid)
    }

    /// Resolve to a concrete value.  Named reads materialize defaults; a
    /// wildcard resolves to the empty value (use [`ValueArg::name`] to
    /// enumerate members instead).
    pub fn resolve(&self, values: &mut ValueMap) -> Value {
        match self {
            ValueArg::Named(name) if name.is_wildcard() => Value::empty(),
            ValueArg::Named(name) => values.get_or_default(name.key()).clone(),
            ValueArg::Constant(v) => v.clone(),
        }
    }

    pub fn name(&self) -> Option<&ValueName> {
        match self {
            ValueArg::Named(n) => Some(n),
            ValueArg::Constant(_) => None,
        }
    }
}

impl std::fmt::Display for ValueArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueArg::Named(n) => write!(f, "{n}"),
            ValueArg::Constant(v) if v.is_numeric() => write!(f, "{v}"),
            ValueArg::Constant(v) => write!(f, "\"{v}"),
        }
    }
}

// ── Tail helpers ──────────────────────────────────────────────────────────────

/// Whitespace-split words of `tail`.
pub fn words(tail: &str) -> Vec<&str> {
    tail.split_whitespace().collect()
}

/// Exactly one word; extras are warned about and ignored.
pub fn single_word<'a>(tail: &'a str, v: &mut Validator) -> Result<&'a str, Invalid> {
    let w = words(tail);
    v.arg_count(w.len(), 1, 1, false).check()?;
    Ok(w[0])
}

/// No arguments at all.
pub fn no_args(tail: &str, v: &mut Validator) -> Result<(), Invalid> {
    v.arg_count(words(tail).len(), 0, 0, false).check()
}

/// Free text: the tail with surrounding whitespace removed, required
/// non-empty.
pub fn text<'a>(tail: &'a str, what: &str, v: &mut Validator) -> Result<&'a str, Invalid> {
    let t = tail.trim();
    if t.is_empty() {
        return Err(v.fail(format!("expected {what}")));
    }
    Ok(t)
}

/// A single value argument.
pub fn value_arg(tail: &str, allow_wildcard: bool, v: &mut Validator) -> Result<ValueArg, Invalid> {
    let w = single_word(tail, v)?;
    ValueArg::parse(w, allow_wildcard, v)
}

/// Between `min` and `expected` value arguments (more if `more_expected`).
/// Every argument is parsed so all bad tokens are reported together.
pub fn value_args(
    tail: &str,
    min: usize,
    expected: usize,
    more_expected: bool,
    v: &mut Validator,
) -> Result<Vec<ValueArg>, Invalid> {
    let w = words(tail);
    v.arg_count(w.len(), min, expected, more_expected).check()?;
    let keep = if more_expected { w.len() } else { w.len().min(expected) };
    let parsed: Vec<Result<ValueArg, Invalid>> =
        w[..keep].iter().map(|t| ValueArg::parse(t, false, v)).collect();
    parsed.into_iter().collect()
}

/// A variable target (`!name`) as the first word, followed by the rest of
/// the tail.
pub fn target<'a>(tail: &'a str, allow_wildcard: bool, v: &mut Validator) -> Result<(ValueName, &'a str), Invalid> {
    let tail = tail.trim_start();
    let (first, rest) = tail.split_once(char::is_whitespace).unwrap_or((tail, ""));
    if first.is_empty() {
        return Err(v.fail("expected a target variable"));
    }
    v.variable_name(first, allow_wildcard).check()?;
    let name = ValueName::parse(first).ok_or(Invalid)?;
    Ok((name, rest))
}

/// A scoped name token, wildcards allowed when requested.
pub fn scoped_name(token: &str, allow_wildcard: bool, v: &mut Validator) -> Result<ValueName, Invalid> {
    v.value_name(token, allow_wildcard).check()?;
    ValueName::parse(token).ok_or(Invalid)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
