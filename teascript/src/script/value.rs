//! Runtime value type for TEAScript.
//!
//! Every value carries both a text and a number.  Building a value from text
//! attempts an integer parse (falling back to 0); building one from a number
//! derives the text by decimal formatting.  Statements pick whichever half
//! they need, so there is no coercion step at the use site.

use std::cmp::Ordering;
use std::fmt;

/// A TEAScript scalar: an immutable `(text, number)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Value {
    text: String,
    number: i64,
}

impl Value {
    /// The empty value (`""`, `0`) that unset names resolve to.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from text; the numeric half is the trimmed text parsed as an
    /// integer, or 0.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let number = text.trim().parse().unwrap_or(0);
        Self { text, number }
    }

    /// Build from a number; the text half is its decimal form.
    pub fn from_number(number: i64) -> Self {
        Self { text: number.to_string(), number }
    }

    /// `1` for true, `0` for false.
    pub fn from_bool(b: bool) -> Self {
        Self::from_number(i64::from(b))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn number(&self) -> i64 {
        self.number
    }

    /// Numeric truthiness: anything but 0 is true.
    pub fn as_bool(&self) -> bool {
        self.number != 0
    }

    /// `true` for the value unset names resolve to.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// `true` if the text half is a well-formed integer, i.e. the number was
    /// parsed rather than defaulted.
    pub fn is_numeric(&self) -> bool {
        self.text.trim().parse::<i64>().is_ok()
    }

    /// Ordering used by list sorting: numeric when both sides are integers,
    /// otherwise case-insensitive text.
    pub fn sort_cmp(&self, rhs: &Value) -> Ordering {
        if self.is_numeric() && rhs.is_numeric() {
            self.number.cmp(&rhs.number)
        } else {
            self.text.to_lowercase().cmp(&rhs.text.to_lowercase())
        }
    }

    /// Case-insensitive text comparison used by `match` and list filters.
    pub fn text_eq_ignore_case(&self, rhs: &str) -> bool {
        self.text.to_lowercase() == rhs.to_lowercase()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::from_number(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::from_text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::from_text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::from_bool(b)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_parses_number() {
        let v = Value::from_text("42");
        assert_eq!(v.text(), "42");
        assert_eq!(v.number(), 42);
    }

    #[test]
    fn non_numeric_text_is_zero() {
        let v = Value::from_text("hello");
        assert_eq!(v.number(), 0);
        assert!(!v.as_bool());
    }

    #[test]
    fn padded_text_still_parses() {
        assert_eq!(Value::from_text(" -7 ").number(), -7);
    }

    #[test]
    fn number_formats_text() {
        let v = Value::from_number(-13);
        assert_eq!(v.text(), "-13");
        assert_eq!(v.to_string(), "-13");
    }

    #[test]
    fn equality_uses_both_halves() {
        assert_eq!(Value::from_text("7"), Value::from_number(7));
        assert_ne!(Value::from_text("07"), Value::from_number(7));
    }

    #[test]
    fn empty_is_default() {
        let v = Value::empty();
        assert_eq!(v.text(), "");
        assert_eq!(v.number(), 0);
        assert!(v.is_empty());
    }

    #[test]
    fn sort_cmp_numeric_vs_text() {
        assert_eq!(Value::from_number(9).sort_cmp(&Value::from_number(10)), Ordering::Less);
        assert_eq!(Value::from_text("b").sort_cmp(&Value::from_text("A")), Ordering::Greater);
    }

    #[test]
    fn from_bool() {
        assert_eq!(Value::from(true).number(), 1);
        assert_eq!(Value::from(false).text(), "0");
    }
}
