//! The compiled script: descriptive metadata, trigger surface, parameter
//! specs, and the immutable statement array with its label map.
//!
//! A [`CompiledScript`] is built once by [`super::parser::compile`] and then
//! shared (usually behind an `Arc`) by every invocation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::pattern::Pattern;
use crate::special::SpecialSet;

use super::stmt::Statement;

// ── Parameters ────────────────────────────────────────────────────────────────

/// How a raw argument word is interpreted when bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamType {
    #[default]
    String,
    /// Must parse as an integer.
    Number,
    /// A user name; a leading `@` is stripped and the name lowercased.
    User,
    /// The rest of the invocation text, verbatim.  Only valid last.
    Tail,
}

impl ParamType {
    pub const ALL: [ParamType; 4] = [ParamType::String, ParamType::Number, ParamType::User, ParamType::Tail];

    pub fn name(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::User => "user",
            ParamType::Tail => "tail",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        let lower = s.to_ascii_lowercase();
        ParamType::ALL
            .into_iter()
            .find(|t| t.name() == lower)
            .ok_or_else(|| format!("unknown parameter type {s:?} (expected string, number, user or tail)"))
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    /// Name without scope prefix; the bound value lands in `?name`.
    pub name: String,
    pub required: bool,
    pub description: String,
    pub kind: ParamType,
    pub default: Option<String>,
    /// Declared as `!name`: the bound value is also seeded into `!name`.
    pub seed_variable: bool,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            required,
            description: String::new(),
            kind: ParamType::String,
            default: None,
            seed_variable: false,
        }
    }

    /// Usage fragment: `<name>` for required, `[name]` for optional.
    pub fn usage(&self) -> String {
        let dots = if self.kind == ParamType::Tail { "…" } else { "" };
        if self.required {
            format!("<{}{dots}>", self.name)
        } else {
            format!("[{}{dots}]", self.name)
        }
    }
}

// ── Triggers ──────────────────────────────────────────────────────────────────

/// Everything that can cause the host to run a script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Triggers {
    /// Command words, lowercase alphanumeric, in declaration order.
    pub commands: Vec<String>,
    pub regex: Option<Pattern>,
    /// Periodic interval in seconds; 0 disables.
    pub interval: u64,
    pub special: SpecialSet,
}

impl Triggers {
    /// If the first word of `text` is `prefix` followed by one of this
    /// script's commands (case-insensitive), return the remaining text.
    pub fn match_command<'t>(&self, text: &'t str, prefix: char) -> Option<&'t str> {
        let text = text.trim_start();
        let rest = text.strip_prefix(prefix)?;
        let (word, tail) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let word = word.to_lowercase();
        self.commands.iter().any(|c| *c == word).then(|| tail.trim_start())
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.regex.is_none() && self.interval == 0 && self.special.is_empty()
    }
}

// ── CompiledScript ────────────────────────────────────────────────────────────

/// An immutable, ready-to-run script.
#[derive(Debug, Clone)]
pub struct CompiledScript {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) triggers: Triggers,
    pub(crate) params: Vec<ParamSpec>,
    statements: Vec<Statement>,
    labels: HashMap<String, usize>,
}

impl CompiledScript {
    /// Seed a script with its statements and labels.  A non-empty statement
    /// array that does not already finish with `end` gets one appended.
    pub(crate) fn new(mut statements: Vec<Statement>, labels: HashMap<String, usize>) -> Self {
        if statements.last().is_some_and(|s| !s.is_end()) {
            statements.push(Statement::End);
        }
        Self {
            name: String::new(),
            description: String::new(),
            triggers: Triggers::default(),
            params: Vec::new(),
            statements,
            labels,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn triggers(&self) -> &Triggers {
        &self.triggers
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Statement index bound to `label` (including its `@`).
    pub fn label(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    pub fn labels(&self) -> impl Iterator<Item = (&str, usize)> {
        self.labels.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// One-line usage string, e.g. `!greet <who> [greeting…]`.
    pub fn usage(&self, prefix: char) -> String {
        let mut out = match self.triggers.commands.first() {
            Some(cmd) => format!("{prefix}{cmd}"),
            None => self.name.clone(),
        };
        for p in &self.params {
            out.push(' ');
            out.push_str(&p.usage());
        }
        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_appended_when_missing() {
        let s = CompiledScript::new(vec![Statement::Flush], HashMap::new());
        assert_eq!(s.statements().len(), 2);
        assert!(s.statements()[1].is_end());
    }

    #[test]
    fn end_not_duplicated() {
        let s = CompiledScript::new(vec![Statement::End], HashMap::new());
        assert_eq!(s.statements().len(), 1);
    }

    #[test]
    fn empty_script_stays_empty() {
        let s = CompiledScript::new(Vec::new(), HashMap::new());
        assert!(s.statements().is_empty());
    }

    #[test]
    fn param_type_parse() {
        assert_eq!("Number".parse::<ParamType>().unwrap(), ParamType::Number);
        assert!("float".parse::<ParamType>().is_err());
    }

    #[test]
    fn match_command_returns_tail() {
        let t = Triggers { commands: vec!["hello".into()], ..Triggers::default() };
        assert_eq!(t.match_command("!Hello   world  ", '!'), Some("world  "));
        assert_eq!(t.match_command("!hello", '!'), Some(""));
        assert_eq!(t.match_command("!hellothere", '!'), None);
        assert_eq!(t.match_command("hello", '!'), None);
    }

    #[test]
    fn usage_string() {
        let mut s = CompiledScript::new(vec![Statement::End], HashMap::new());
        s.triggers.commands.push("greet".into());
        s.params.push(ParamSpec::new("who", true));
        let mut tail = ParamSpec::new("msg", false);
        tail.kind = ParamType::Tail;
        s.params.push(tail);
        assert_eq!(s.usage('!'), "!greet <who> [msg…]");
    }
}
