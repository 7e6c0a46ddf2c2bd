//! Metadata instructions.
//!
//! These never execute.  Once every line has been parsed, each metadata
//! line is applied in file order to the [`CompiledScript`] being
//! built.  `description`, `type` and `default` attach to the most recently
//! declared parameter; a `description` before any parameter describes the
//! script itself.

use crate::pattern::Pattern;
use crate::special::Special;

use super::args;
use super::bind::convert;
use super::compiled::{CompiledScript, ParamSpec, ParamType};
use super::name::Scope;
use super::validate::{Invalid, Validator};

/// A parsed metadata line.
#[derive(Debug, Clone, PartialEq)]
pub enum Metadata {
    /// `script <name>`
    Script(String),
    /// `description <text>`
    Description(String),
    /// `command <word>` (stored lowercase)
    Command(String),
    /// `regex <pattern>`
    Regex(Pattern),
    /// `periodic <seconds>`
    Periodic(u64),
    /// `required <name>` / `optional <name>`
    Parameter { name: String, required: bool, seed_variable: bool },
    /// `type <string|number|user|tail>`
    Type(ParamType),
    /// `default <text>`
    Default(String),
    /// `special <trigger>`
    Special(Special),
}

type Parsed = Result<Metadata, Invalid>;

impl Metadata {
    pub fn parse_script(tail: &str, v: &mut Validator) -> Parsed {
        let name = args::single_word(tail, v)?;
        v.unprefixed_name(name).check()?;
        Ok(Metadata::Script(name.to_owned()))
    }

    pub fn parse_description(tail: &str, v: &mut Validator) -> Parsed {
        Ok(Metadata::Description(args::text(tail, "a description", v)?.to_owned()))
    }

    pub fn parse_command(tail: &str, v: &mut Validator) -> Parsed {
        let word = args::single_word(tail, v)?;
        v.command_name(word).check()?;
        Ok(Metadata::Command(word.to_lowercase()))
    }

    /// The pattern is trial-compiled here so a bad regex fails the script.
    pub fn parse_regex(tail: &str, v: &mut Validator) -> Parsed {
        let src = args::text(tail, "a regex pattern", v)?;
        Pattern::new(src).map(Metadata::Regex).map_err(|e| v.fail(e.to_string()))
    }

    pub fn parse_periodic(tail: &str, v: &mut Validator) -> Parsed {
        let word = args::single_word(tail, v)?;
        word.parse::<u64>()
            .map(Metadata::Periodic)
            .map_err(|_| v.fail(format!("expected a number of seconds, found '{word}'")))
    }

    pub fn parse_parameter(required: bool) -> impl Fn(&str, &mut Validator) -> Parsed {
        move |tail: &str, v: &mut Validator| {
            let word = args::single_word(tail, v)?;
            let (base, seed_variable) = match word.chars().next().and_then(Scope::from_prefix) {
                Some(Scope::Argument) => (&word[1..], false),
                Some(Scope::Variable) => (&word[1..], true),
                Some(Scope::Context) => {
                    return Err(v.fail(format!("parameter '{word}' cannot be a context value")))
                }
                None => (word, false),
            };
            v.unprefixed_name(base).check()?;
            Ok(Metadata::Parameter { name: base.to_owned(), required, seed_variable })
        }
    }

    pub fn parse_type(tail: &str, v: &mut Validator) -> Parsed {
        let word = args::single_word(tail, v)?;
        word.parse::<ParamType>().map(Metadata::Type).map_err(|e| v.fail(e))
    }

    /// Defaults keep their text verbatim apart from surrounding whitespace.
    pub fn parse_default(tail: &str, v: &mut Validator) -> Parsed {
        Ok(Metadata::Default(args::text(tail, "a default value", v)?.to_owned()))
    }

    pub fn parse_special(tail: &str, v: &mut Validator) -> Parsed {
        let word = args::single_word(tail, v)?;
        word.parse::<Special>().map(Metadata::Special).map_err(|e| v.fail(e))
    }

    /// Mutate `script` according to this line.
    pub fn apply(&self, script: &mut CompiledScript, v: &mut Validator) -> Result<(), Invalid> {
        match self {
            Metadata::Script(name) => {
                if !script.name.is_empty() && script.name != *name {
                    v.warn(format!("script renamed from '{}' to '{name}'", script.name));
                }
                script.name = name.clone();
            }
            Metadata::Description(text) => match script.params.last_mut() {
                Some(p) => p.description = text.clone(),
                None => script.description = text.clone(),
            },
            Metadata::Command(cmd) => {
                if script.triggers.commands.contains(cmd) {
                    v.warn(format!("command '{cmd}' declared twice"));
                } else {
                    script.triggers.commands.push(cmd.clone());
                }
            }
            Metadata::Regex(p) => {
                if script.triggers.regex.is_some() {
                    v.warn("regex declared twice; the last one wins");
                }
                script.triggers.regex = Some(p.clone());
            }
            Metadata::Periodic(secs) => script.triggers.interval = *secs,
            Metadata::Parameter { name, required, seed_variable } => {
                if script.params.iter().any(|p| p.name == *name) {
                    return Err(v.fail(format!("parameter '{name}' declared twice")));
                }
                let mut p = ParamSpec::new(name.clone(), *required);
                p.seed_variable = *seed_variable;
                script.params.push(p);
            }
            Metadata::Type(kind) => last_param(script, "type", v)?.kind = *kind,
            Metadata::Default(text) => last_param(script, "default", v)?.default = Some(text.clone()),
            Metadata::Special(t) => script.triggers.special.insert(*t),
        }
        Ok(())
    }
}

fn last_param<'a>(script: &'a mut CompiledScript, keyword: &str, v: &mut Validator) -> Result<&'a mut ParamSpec, Invalid> {
    script
        .params
        .last_mut()
        .ok_or_else(|| v.fail(format!("'{keyword}' must follow a required or optional parameter")))
}

/// Whole-script parameter rules, checked after every line has been applied:
/// a `tail` parameter must be last, no required parameter may follow an
/// optional one, and a default must convert to the parameter's type.
/// Returns `(parameter index, message)` for each violation.
pub fn check_params(params: &[ParamSpec]) -> Vec<(usize, String)> {
    let mut problems = Vec::new();
    let last = params.len().saturating_sub(1);
    let first_optional = params.iter().position(|p| !p.required);
    for (i, p) in params.iter().enumerate() {
        if p.kind == ParamType::Tail && i != last {
            problems.push((i, format!("parameter '{}' has type tail but is not the last parameter", p.name)));
        }
        if let Some(opt) = first_optional.filter(|&opt| p.required && i > opt) {
            problems.push((i, format!("required parameter '{}' follows optional '{}'", p.name, params[opt].name)));
        }
        if let Some(default) = &p.default {
            if let Err(e) = convert(p, default) {
                problems.push((i, format!("bad default: {e}")));
            }
        }
    }
    problems
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::stmt::Statement;
    use std::collections::HashMap;

    fn v() -> Validator {
        Validator::new("test")
    }

    fn blank() -> CompiledScript {
        CompiledScript::new(vec![Statement::End], HashMap::new())
    }

    #[test]
    fn command_lowercased_and_validated() {
        assert_eq!(Metadata::parse_command("Hello", &mut v()), Ok(Metadata::Command("hello".into())));
        assert!(Metadata::parse_command("he-llo", &mut v()).is_err());
    }

    #[test]
    fn regex_trial_compiled() {
        assert!(Metadata::parse_regex("^hi (\\w+)$", &mut v()).is_ok());
        let mut val = v();
        assert!(Metadata::parse_regex("(oops", &mut val).is_err());
        assert!(!val.is_valid());
    }

    #[test]
    fn parameter_prefixes() {
        let parse = Metadata::parse_parameter(true);
        assert_eq!(
            parse("!name", &mut v()),
            Ok(Metadata::Parameter { name: "name".into(), required: true, seed_variable: true })
        );
        assert_eq!(
            parse("?name", &mut v()),
            Ok(Metadata::Parameter { name: "name".into(), required: true, seed_variable: false })
        );
        assert!(parse("$name", &mut v()).is_err());
    }

    #[test]
    fn description_targets_last_parameter() {
        let mut s = blank();
        let mut val = v();
        Metadata::Description("script text".into()).apply(&mut s, &mut val).unwrap();
        Metadata::Parameter { name: "a".into(), required: true, seed_variable: false }
            .apply(&mut s, &mut val)
            .unwrap();
        Metadata::Description("param text".into()).apply(&mut s, &mut val).unwrap();
        assert_eq!(s.description(), "script text");
        assert_eq!(s.params()[0].description, "param text");
    }

    #[test]
    fn type_without_parameter_fails() {
        let mut s = blank();
        let mut val = v();
        assert!(Metadata::Type(ParamType::Number).apply(&mut s, &mut val).is_err());
        assert!(!val.is_valid());
    }

    #[test]
    fn duplicate_parameter_fails() {
        let mut s = blank();
        let mut val = v();
        let p = Metadata::Parameter { name: "a".into(), required: true, seed_variable: false };
        p.apply(&mut s, &mut val).unwrap();
        assert!(p.apply(&mut s, &mut val).is_err());
    }

    #[test]
    fn tail_must_be_last() {
        let mut a = ParamSpec::new("a", true);
        a.kind = ParamType::Tail;
        let b = ParamSpec::new("b", true);
        let problems = check_params(&[a, b]);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].0, 0);
    }

    #[test]
    fn required_after_optional_fails() {
        let problems = check_params(&[ParamSpec::new("a", false), ParamSpec::new("b", true)]);
        assert_eq!(problems, vec![(1, "required parameter 'b' follows optional 'a'".to_owned())]);
        assert!(check_params(&[ParamSpec::new("a", true), ParamSpec::new("b", false)]).is_empty());
    }

    #[test]
    fn defaults_must_convert() {
        let mut n = ParamSpec::new("n", false);
        n.kind = ParamType::Number;
        n.default = Some("12".into());
        assert!(check_params(std::slice::from_ref(&n)).is_empty());
        n.default = Some("twelve".into());
        let problems = check_params(&[n]);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].1.starts_with("bad default:"));
    }
}
