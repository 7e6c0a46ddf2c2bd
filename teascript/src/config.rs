//! Engine settings file.
//!
//! | Line | Action |
//! |------|--------|
//! | `set <name>=<value>` or `set <name> <value>` | change a setting |
//! | Lines starting with `#` or `;` | comment, ignored |
//!
//! | Setting | Type | Default |
//! |---------|------|---------|
//! | `step_budget` | statements per invocation, `0`/`none` = unlimited | unlimited |
//! | `lock_timeout` | duration (`5`, `5s`, `250ms`, `2m`) | 5 s |
//! | `max_sleep` | duration | 1 h |
//! | `command_prefix` | one character | `!` |
//! | `self_name` | text | `tea` |
//! | `channel` | text | empty |
//!
//! Bad lines are reported and skipped; the rest of the file still applies.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// A non-fatal error encountered while loading a settings file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Engine-wide settings shared by every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Statements one invocation may execute before it is stopped.
    pub step_budget: Option<u64>,
    /// How long `storage:open` waits for the storage lock.
    pub lock_timeout: Duration,
    /// Longest single `sleep`; longer requests are clamped.
    pub max_sleep: Duration,
    pub command_prefix: char,
    /// Default `$self` for invocations.
    pub self_name: String,
    /// Default `$channel` for invocations.
    pub channel: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_budget: None,
            lock_timeout: Duration::from_secs(5),
            max_sleep: Duration::from_secs(3600),
            command_prefix: '!',
            self_name: "tea".into(),
            channel: String::new(),
        }
    }
}

impl EngineConfig {
    /// Parse a settings string.  Returns the settings and a list of any
    /// errors on individual lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = EngineConfig::default();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let (cmd, args_str) = line
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((line, ""));

            let result = if cmd.eq_ignore_ascii_case("set") {
                parse_set(&split_args(args_str.trim())).and_then(|(name, value)| config.apply(&name, &value))
            } else {
                Err(format!("unknown directive '{cmd}'"))
            };
            if let Err(message) = result {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse a settings file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// The per-user settings file, e.g. `~/.config/teascript/engine.conf`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "teascript").map(|d| d.config_dir().join("engine.conf"))
    }

    /// Change one setting by name.
    pub fn apply(&mut self, name: &str, value: &str) -> Result<(), String> {
        match name.to_ascii_lowercase().as_str() {
            "step_budget" => {
                self.step_budget = match value.to_ascii_lowercase().as_str() {
                    "none" | "0" => None,
                    v => Some(v.parse().map_err(|_| format!("step_budget: not a count: '{value}'"))?),
                }
            }
            "lock_timeout" => self.lock_timeout = parse_duration(value)?,
            "max_sleep" => self.max_sleep = parse_duration(value)?,
            "command_prefix" => {
                let mut chars = value.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !c.is_whitespace() => self.command_prefix = c,
                    _ => return Err(format!("command_prefix: expected one character, got '{value}'")),
                }
            }
            "self_name" => self.self_name = value.to_owned(),
            "channel" => self.channel = value.to_owned(),
            _ => return Err(format!("unknown setting '{name}'")),
        }
        Ok(())
    }
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Split `s` into whitespace-delimited tokens, honouring double-quoted strings
/// and `\"` escapes within them.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() || quoted {
                    args.push(std::mem::take(&mut cur));
                }
                quoted = false;
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() || quoted {
        args.push(cur);
    }
    args
}

// ── set ──────────────────────────────────────────────────────────────────────

/// Parse `set <name>=<value>` or `set <name> <value>`.
fn parse_set(tokens: &[String]) -> Result<(String, String), String> {
    let Some(first) = tokens.first() else {
        return Err("set: requires an argument".into());
    };

    let (name, value) = if let Some((n, v)) = first.split_once('=') {
        let mut value = v.to_owned();
        for t in &tokens[1..] {
            value.push(' ');
            value.push_str(t);
        }
        (n.to_owned(), value)
    } else if tokens.len() >= 2 {
        (first.clone(), tokens[1..].join(" "))
    } else {
        return Err(format!("set: missing value for '{first}'"));
    };

    if name.is_empty() {
        return Err("set: setting name cannot be empty".into());
    }
    Ok((name, value))
}

/// `5`, `5s`, `250ms`, `2m` or `1h`.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits.parse().map_err(|_| format!("not a duration: '{s}'"))?;
    match unit {
        "" | "s" => Ok(Duration::from_secs(n)),
        "ms" => Ok(Duration::from_millis(n)),
        "m" => Ok(Duration::from_secs(n.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(n.saturating_mul(3600))),
        _ => Err(format!("unknown duration unit '{unit}' in '{s}'")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn split_quoted_spaces() {
        assert_eq!(split_args(r##"channel "#my room" x"##), ["channel", "#my room", "x"]);
    }

    #[test]
    fn split_empty_quotes_is_a_token() {
        assert_eq!(split_args(r#"channel """#), ["channel", ""]);
    }

    #[test]
    fn defaults() {
        let (cfg, errs) = EngineConfig::load_str("");
        assert!(errs.is_empty());
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.step_budget, None);
        assert_eq!(cfg.command_prefix, '!');
    }

    #[test]
    fn both_set_forms() {
        let (cfg, errs) = EngineConfig::load_str(
            "# comment\n\
             ; also a comment\n\
             set step_budget=10000\n\
             set lock_timeout 250ms\n\
             set max_sleep=2m\n\
             set command_prefix ?\n\
             set self_name TeaBot\n\
             set channel \"#tea time\"\n",
        );
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.step_budget, Some(10_000));
        assert_eq!(cfg.lock_timeout, Duration::from_millis(250));
        assert_eq!(cfg.max_sleep, Duration::from_secs(120));
        assert_eq!(cfg.command_prefix, '?');
        assert_eq!(cfg.self_name, "TeaBot");
        assert_eq!(cfg.channel, "#tea time");
    }

    #[test]
    fn bad_lines_reported_and_skipped() {
        let (cfg, errs) = EngineConfig::load_str(
            "set nosuch 1\n\
             set max_sleep forever\n\
             addworld x\n\
             set step_budget 7\n\
             set command_prefix !!\n",
        );
        assert_eq!(cfg.step_budget, Some(7));
        let lines: Vec<usize> = errs.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 5]);
        assert!(errs[0].to_string().starts_with("line 1:"));
    }

    #[test]
    fn step_budget_none() {
        let (cfg, _) = EngineConfig::load_str("set step_budget 5\nset step_budget none");
        assert_eq!(cfg.step_budget, None);
    }

    #[test]
    fn load_file_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "set self_name=disk").unwrap();
        let (cfg, errs) = EngineConfig::load_file(f.path()).unwrap();
        assert!(errs.is_empty());
        assert_eq!(cfg.self_name, "disk");
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(EngineConfig::load_file(Path::new("/nonexistent/engine.conf")).is_err());
    }
}
