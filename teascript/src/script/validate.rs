//! Compile-time checks on names, argument counts and trigger commands.
//!
//! The free functions are pure predicates.  [`Validator`] wraps them for the
//! parser: each check records an error or warning message and returns the
//! validator so calls chain, and the overall result is the AND of every
//! check made.
//!
//! ```rust
//! use teascript::script::validate::Validator;
//!
//! let mut v = Validator::new("greet:4");
//! v.variable_name("!count", false).label_name("@top");
//! assert!(v.is_valid());
//! ```

use crate::broadcast::{Broadcast, Level};

use super::name::{Scope, LABEL_PREFIX, WILDCARD};

// ── Predicates ────────────────────────────────────────────────────────────────

/// Non-empty, alphanumeric or `.` only.
pub fn is_unprefixed_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '.')
}

/// A `$`, `?` or `!` prefix followed by an unprefixed name.  A trailing `*`
/// is accepted only when `allow_wildcard` is set.
pub fn is_value_name(name: &str, allow_wildcard: bool) -> bool {
    scoped(name, allow_wildcard, |c| Scope::from_prefix(c).is_some())
}

/// Like [`is_value_name`] but restricted to the `!` scope.
pub fn is_variable_name(name: &str, allow_wildcard: bool) -> bool {
    scoped(name, allow_wildcard, |c| c == Scope::Variable.prefix())
}

/// `@` followed by an unprefixed name.
pub fn is_label_name(name: &str) -> bool {
    name.strip_prefix(LABEL_PREFIX).is_some_and(is_unprefixed_name)
}

/// Non-empty, alphanumeric only.
pub fn is_command_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(char::is_alphanumeric)
}

fn scoped(name: &str, allow_wildcard: bool, prefix_ok: impl Fn(char) -> bool) -> bool {
    let mut chars = name.chars();
    let Some(prefix) = chars.next() else { return false };
    if !prefix_ok(prefix) {
        return false;
    }
    let rest = chars.as_str();
    let rest = match rest.strip_suffix(WILDCARD) {
        Some(stripped) if allow_wildcard => stripped,
        Some(_) => return false,
        None => rest,
    };
    // `!*` on its own would match every variable; require a stem.
    is_unprefixed_name(rest)
}

// ── Validator ─────────────────────────────────────────────────────────────────

/// Marker returned by failed parse steps.  The reason has already been
/// recorded on the [`Validator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invalid;

/// Accumulates check results and diagnostics for one context (a line).
#[derive(Debug)]
pub struct Validator {
    context: String,
    valid: bool,
    messages: Vec<Broadcast>,
}

impl Validator {
    pub fn new(context: impl Into<String>) -> Self {
        Self { context: context.into(), valid: true, messages: Vec::new() }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// `Err(Invalid)` once any check has failed.
    pub fn check(&self) -> Result<(), Invalid> {
        if self.valid { Ok(()) } else { Err(Invalid) }
    }

    /// Diagnostics recorded so far, in order.
    pub fn messages(&self) -> &[Broadcast] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Broadcast> {
        self.messages
    }

    /// Record an error and return the failure marker.
    pub fn fail(&mut self, message: impl Into<String>) -> Invalid {
        self.error(message);
        Invalid
    }

    pub fn error(&mut self, message: impl Into<String>) -> &mut Self {
        self.valid = false;
        self.push(Level::Error, message.into())
    }

    pub fn warn(&mut self, message: impl Into<String>) -> &mut Self {
        self.push(Level::Warning, message.into())
    }

    fn push(&mut self, level: Level, message: String) -> &mut Self {
        self.messages.push(Broadcast::new(level, self.context.clone(), message));
        self
    }

    fn require(&mut self, ok: bool, message: impl FnOnce() -> String) -> &mut Self {
        if !ok {
            self.error(message());
        }
        self
    }

    pub fn unprefixed_name(&mut self, name: &str) -> &mut Self {
        self.require(is_unprefixed_name(name), || {
            format!("invalid name '{name}': expected letters, digits or '.'")
        })
    }

    pub fn value_name(&mut self, name: &str, allow_wildcard: bool) -> &mut Self {
        self.require(is_value_name(name, allow_wildcard), || {
            if allow_wildcard {
                format!("invalid value name '{name}': expected $, ? or ! prefix, optional trailing *")
            } else {
                format!("invalid value name '{name}': expected $, ? or ! prefix")
            }
        })
    }

    pub fn variable_name(&mut self, name: &str, allow_wildcard: bool) -> &mut Self {
        self.require(is_variable_name(name, allow_wildcard), || {
            format!("invalid variable name '{name}': expected ! prefix")
        })
    }

    pub fn label_name(&mut self, name: &str) -> &mut Self {
        self.require(is_label_name(name), || format!("invalid label '{name}': expected @ prefix"))
    }

    pub fn command_name(&mut self, name: &str) -> &mut Self {
        self.require(is_command_name(name), || {
            format!("invalid command '{name}': expected letters and digits only")
        })
    }

    /// Error below `min`; warn above `expected` unless `more_expected`.
    pub fn arg_count(&mut self, count: usize, min: usize, expected: usize, more_expected: bool) -> &mut Self {
        if count < min {
            self.error(format!("expected at least {min} argument(s), found {count}"));
        } else if count > expected && !more_expected {
            self.warn(format!("expected {expected} argument(s), found {count}; extras ignored"));
        }
        self
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_names() {
        assert!(is_value_name("!foo.bar", false));
        assert!(is_value_name("$sender", false));
        assert!(is_value_name("?who", false));
        assert!(!is_value_name("foo", false));
        assert!(!is_value_name("!", false));
        assert!(!is_value_name("!foo bar", false));
    }

    #[test]
    fn wildcard_only_when_allowed() {
        assert!(is_value_name("!foo*", true));
        assert!(!is_value_name("!foo*", false));
        assert!(!is_value_name("!*", true));
    }

    #[test]
    fn variable_scope_only() {
        assert!(is_variable_name("!x", false));
        assert!(!is_variable_name("$x", false));
        assert!(!is_variable_name("?x", false));
    }

    #[test]
    fn labels_and_commands() {
        assert!(is_label_name("@start"));
        assert!(!is_label_name("start"));
        assert!(!is_label_name("@"));
        assert!(is_command_name("hello2"));
        assert!(!is_command_name("hel.lo"));
        assert!(!is_command_name(""));
    }

    #[test]
    fn chained_checks_and_together() {
        let mut v = Validator::new("t");
        v.value_name("!ok", false).label_name("nope").command_name("fine");
        assert!(!v.is_valid());
        assert_eq!(v.messages().len(), 1);
        assert_eq!(v.messages()[0].level, Level::Error);
        assert_eq!(v.check(), Err(Invalid));
    }

    #[test]
    fn arg_count_errors_and_warnings() {
        let mut v = Validator::new("t");
        v.arg_count(3, 1, 2, false);
        assert!(v.is_valid());
        assert_eq!(v.messages()[0].level, Level::Warning);

        let mut v = Validator::new("t");
        v.arg_count(3, 1, 2, true);
        assert!(v.messages().is_empty());

        let mut v = Validator::new("t");
        v.arg_count(0, 1, 1, false);
        assert!(!v.is_valid());
    }
}
