//! Positional argument binding.
//!
//! The raw invocation text is consumed one whitespace-delimited word per
//! parameter, in declaration order.  A `tail` parameter takes whatever is
//! left.  Each bound value lands in `?name` (and in `!name` too when the
//! parameter was declared with a `!` prefix).

use thiserror::Error;

use super::compiled::{ParamSpec, ParamType};
use super::name::Scope;
use super::value::Value;
use super::values::ValueMap;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("missing required argument '{0}'")]
    MissingRequired(String),
    #[error("argument '{name}' must be a whole number, got '{value}'")]
    NotANumber { name: String, value: String },
    #[error("argument '{name}' is not a valid user name: '{value}'")]
    InvalidUser { name: String, value: String },
}

/// Bind `raw` against `params`, writing into `values`.  Returns the words
/// left over after the last parameter (never any when the last one is a
/// `tail`).
pub fn bind(params: &[ParamSpec], raw: &str, values: &mut ValueMap) -> Result<Vec<String>, BindError> {
    let mut rest = raw.trim_start();

    for p in params {
        let word = if p.kind == ParamType::Tail {
            std::mem::take(&mut rest)
        } else {
            let (w, r) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            rest = r.trim_start();
            w
        };

        let supplied = if word.is_empty() { p.default.as_deref() } else { Some(word) };
        let Some(text) = supplied else {
            if p.required {
                return Err(BindError::MissingRequired(p.name.clone()));
            }
            continue;
        };

        let value = convert(p, text)?;
        if p.seed_variable {
            values.set(format!("{}{}", Scope::Variable.prefix(), p.name), value.clone());
        }
        values.set(format!("{}{}", Scope::Argument.prefix(), p.name), value);
    }

    Ok(rest.split_whitespace().map(str::to_owned).collect())
}

/// Convert `text` to `p`'s type.
pub(crate) fn convert(p: &ParamSpec, text: &str) -> Result<Value, BindError> {
    match p.kind {
        ParamType::String | ParamType::Tail => Ok(Value::from_text(text)),
        ParamType::Number => text
            .trim()
            .parse::<i64>()
            .map(Value::from_number)
            .map_err(|_| BindError::NotANumber { name: p.name.clone(), value: text.to_owned() }),
        ParamType::User => {
            let user = text.strip_prefix('@').unwrap_or(text).to_lowercase();
            let valid = !user.is_empty() && user.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
            if valid {
                Ok(Value::from_text(user))
            } else {
                Err(BindError::InvalidUser { name: p.name.clone(), value: text.to_owned() })
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, required: bool, kind: ParamType, default: Option<&str>) -> ParamSpec {
        let mut p = ParamSpec::new(name, required);
        p.kind = kind;
        p.default = default.map(str::to_owned);
        p
    }

    fn text(values: &ValueMap, key: &str) -> Option<String> {
        values.peek(key).map(|v| v.text().to_owned())
    }

    #[test]
    fn required_then_defaulted_optional() {
        let params = [
            param("a", true, ParamType::String, None),
            param("b", false, ParamType::String, Some("X")),
        ];
        let mut v = ValueMap::new();
        bind(&params, "onlyA", &mut v).unwrap();
        assert_eq!(text(&v, "?a").as_deref(), Some("onlyA"));
        assert_eq!(text(&v, "?b").as_deref(), Some("X"));

        let mut v = ValueMap::new();
        assert_eq!(bind(&params, "", &mut v), Err(BindError::MissingRequired("a".into())));
    }

    #[test]
    fn optional_without_default_stays_unset() {
        let params = [param("a", false, ParamType::String, None)];
        let mut v = ValueMap::new();
        bind(&params, "   ", &mut v).unwrap();
        assert!(v.peek("?a").is_none());
    }

    #[test]
    fn tail_takes_the_rest() {
        let params = [param("who", true, ParamType::User, None), param("msg", false, ParamType::Tail, None)];
        let mut v = ValueMap::new();
        let extra = bind(&params, "  @Bob_1   hello   there ", &mut v).unwrap();
        assert!(extra.is_empty());
        assert_eq!(text(&v, "?who").as_deref(), Some("bob_1"));
        assert_eq!(text(&v, "?msg").as_deref(), Some("hello   there "));
    }

    #[test]
    fn numbers_are_checked() {
        let params = [param("n", true, ParamType::Number, None)];
        let mut v = ValueMap::new();
        bind(&params, "42", &mut v).unwrap();
        assert_eq!(v.peek("?n").unwrap().number(), 42);
        assert!(matches!(bind(&params, "4x", &mut v), Err(BindError::NotANumber { .. })));
    }

    #[test]
    fn bad_user_rejected() {
        let params = [param("u", true, ParamType::User, None)];
        let mut v = ValueMap::new();
        assert!(matches!(bind(&params, "@", &mut v), Err(BindError::InvalidUser { .. })));
        assert!(matches!(bind(&params, "no-dash", &mut v), Err(BindError::InvalidUser { .. })));
    }

    #[test]
    fn seed_variable_and_surplus() {
        let mut p = param("name", true, ParamType::String, None);
        p.seed_variable = true;
        let mut v = ValueMap::new();
        let extra = bind(&[p], "Ann and more", &mut v).unwrap();
        assert_eq!(text(&v, "!name").as_deref(), Some("Ann"));
        assert_eq!(text(&v, "?name").as_deref(), Some("Ann"));
        assert_eq!(extra, vec!["and", "more"]);
    }
}
