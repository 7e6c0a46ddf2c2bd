//! Command-line argument parsing.
//!
//! Usage:
//!   tea [-f[<file>]] [-s<sender>] [-c<channel>] [-a<args>] [-kpd] <script>...

use std::path::PathBuf;

use thiserror::Error;

use crate::config::EngineConfig;

pub const USAGE: &str = "Usage: tea [-f[<file>]] [-s<sender>] [-c<channel>] [-a<args>] [-kpd] <script>...";

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CliError {
    #[error("-{0} requires an argument")]
    MissingValue(char),
    #[error("unknown option: -{0}")]
    UnknownOption(char),
    #[error("no script files given")]
    NoScripts,
}

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Which settings file to load.
    pub config: ConfigFile,
    /// `$sender` for the run (`-s<sender>`).
    pub sender: Option<String>,
    /// `$channel` override (`-c<channel>`).
    pub channel: Option<String>,
    /// Raw argument text bound to the first script (`-a<args>`).
    pub args: String,
    /// Compile only (`-k`).
    pub check_only: bool,
    /// Keep running periodic scripts until interrupted (`-p`).
    pub periodic: bool,
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Script files, in order; the first is the one invoked.
    pub scripts: Vec<PathBuf>,
}

/// How to choose the settings file.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum ConfigFile {
    /// Use the per-user settings file if it exists (default).
    #[default]
    Search,
    /// `-f` with no file argument: built-in defaults only.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()`.
pub fn parse_args() -> Result<CliArgs, CliError> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, CliError> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            args.scripts.extend(argv[i + 1..].iter().map(PathBuf::from));
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            args.scripts.push(PathBuf::from(arg));
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'k' => args.check_only = true,
                'p' => args.periodic = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') && argv[i + 1].ends_with(".conf") {
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                flag @ ('s' | 'c' | 'a') => {
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err(CliError::MissingValue(flag));
                    };
                    match flag {
                        's' => args.sender = Some(value),
                        'c' => args.channel = Some(value),
                        _ => args.args = value,
                    }
                }

                c => return Err(CliError::UnknownOption(c)),
            }
            j += 1;
        }
        i += 1;
    }

    if args.scripts.is_empty() {
        return Err(CliError::NoScripts);
    }
    Ok(args)
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// The settings file to load, if any.
pub fn resolve_config(choice: &ConfigFile) -> Option<PathBuf> {
    match choice {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(p) => Some(p.clone()),
        ConfigFile::Search => EngineConfig::default_path().filter(|p| p.exists()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
