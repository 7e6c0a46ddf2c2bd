//! Scoped value names.
//!
//! | Prefix | Scope | Supplied by |
//! |--------|-------|-------------|
//! | `$` | [`Scope::Context`]  | the host (`$sender`, `$channel`, …) |
//! | `?` | [`Scope::Argument`] | the argument binder |
//! | `!` | [`Scope::Variable`] | the script itself |
//!
//! A trailing `*` turns a name into a wildcard reference covering every key
//! that starts with the rest of the name (`!data.*` covers `!data.id`).

use std::fmt;

/// Prefix marking a jump label.
pub const LABEL_PREFIX: char = '@';

/// Prefix reserved for provider-supplied list names.
pub const RESERVED_LIST_PREFIX: char = '#';

/// Suffix marking a wildcard reference.
pub const WILDCARD: char = '*';

/// The lexical namespace a value name lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Context,
    Argument,
    Variable,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Context, Scope::Argument, Scope::Variable];

    pub fn prefix(self) -> char {
        match self {
            Scope::Context => '$',
            Scope::Argument => '?',
            Scope::Variable => '!',
        }
    }

    pub fn from_prefix(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.prefix() == c)
    }
}

/// A parsed scoped name, e.g. `!data.id` or `!data.*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueName {
    scope: Scope,
    /// Full key including the prefix, without the wildcard marker.
    key: String,
    wildcard: bool,
}

impl ValueName {
    /// Split `src` into scope, key and wildcard flag.
    ///
    /// This only checks the prefix; character-level validation lives in
    /// [`crate::script::validate`].
    pub fn parse(src: &str) -> Option<Self> {
        let scope = Scope::from_prefix(src.chars().next()?)?;
        let (key, wildcard) = match src.strip_suffix(WILDCARD) {
            Some(k) => (k, true),
            None => (src, false),
        };
        Some(Self { scope, key: key.to_owned(), wildcard })
    }

    /// Build a plain (non-wildcard) name in `scope`.
    pub fn new(scope: Scope, base: &str) -> Self {
        Self { scope, key: format!("{}{base}", scope.prefix()), wildcard: false }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Map key: prefix plus name, wildcard marker removed.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The name without its scope prefix (`data.id` for `!data.id`).
    pub fn base(&self) -> &str {
        &self.key[1..]
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// The key a wildcard member with `suffix` is stored under.
    pub fn member(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.key)
    }
}

impl fmt::Display for ValueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)?;
        if self.wildcard {
            write!(f, "{WILDCARD}")?;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
