//! Line-oriented script parser.
//!
//! Grammar, one instruction per line:
//!
//! ```text
//! # comment
//! @label
//! <keyword> <rest of line>
//! ```
//!
//! Blank lines and `#` comments are skipped.  `@label` binds the label to
//! the index the next statement will occupy.  Anything else is split at the
//! first whitespace into keyword and tail; the keyword selects a factory
//! from [`super::registry`], which parses the tail.
//!
//! A failing line does not stop the parse: every line is checked so all
//! errors surface in one pass, and then compilation fails as a whole.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::broadcast::{Broadcast, Broadcaster, Level};

use super::compiled::CompiledScript;
use super::meta::{check_params, Metadata};
use super::name::LABEL_PREFIX;
use super::registry::{self, Instruction};
use super::stmt::Statement;
use super::validate::Validator;

/// Name given to scripts that declare none and have no file name.
pub const UNNAMED: &str = "unnamed";

/// One failed line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct LineError {
    pub line: usize,
    pub message: String,
}

/// Why a script failed to compile.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{name}: {} error(s), first at {}", .errors.len(), first_error(.errors))]
    Invalid { name: String, errors: Vec<LineError> },
}

fn first_error(errors: &[LineError]) -> String {
    errors.first().map_or_else(String::new, ToString::to_string)
}

impl CompileError {
    /// Per-line errors (empty for I/O failures).
    pub fn line_errors(&self) -> &[LineError] {
        match self {
            CompileError::Io { .. } => &[],
            CompileError::Invalid { errors, .. } => errors,
        }
    }
}

/// Compile `src`.  `fallback_name` names the script if it has no `script`
/// line and prefixes diagnostic contexts (`name:line`).  Every diagnostic,
/// warnings included, is broadcast to `sink`.
pub fn compile(src: &str, fallback_name: &str, sink: &dyn Broadcaster) -> Result<CompiledScript, CompileError> {
    let mut statements: Vec<Statement> = Vec::new();
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut metadata: Vec<(usize, Metadata)> = Vec::new();
    let mut errors: Vec<LineError> = Vec::new();

    for (i, raw) in src.lines().enumerate() {
        let lineno = i + 1;
        let line = raw.trim_start();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut v = Validator::new(format!("{fallback_name}:{lineno}"));

        if line.starts_with(LABEL_PREFIX) {
            let label = line.trim_end();
            if v.label_name(label).is_valid() && labels.contains_key(label) {
                v.error(format!("label '{label}' declared twice"));
            }
            if v.is_valid() {
                labels.insert(label.to_owned(), statements.len());
            }
        } else {
            let (keyword, tail) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            match registry::lookup(keyword) {
                None => {
                    v.error(format!("unknown instruction '{keyword}'"));
                }
                Some(factory) => match factory(tail, &mut v) {
                    Ok(_) if !v.is_valid() => {}
                    Ok(Instruction::Stmt(s)) => statements.push(s),
                    Ok(Instruction::Meta(m)) => metadata.push((lineno, m)),
                    // A factory may bail without recording why.
                    Err(_) if v.is_valid() => {
                        v.error(format!("invalid arguments for '{keyword}'"));
                    }
                    Err(_) => {}
                },
            }
        }

        report(v, lineno, sink, &mut errors);
    }

    // A label on the last line needs a statement to land on.
    if labels.values().any(|&ix| ix == statements.len()) {
        statements.push(Statement::End);
    }

    // Applied even when statement lines failed.
    let mut script = CompiledScript::new(statements, labels);
    let mut param_lines = Vec::new();
    for (lineno, m) in &metadata {
        let mut v = Validator::new(format!("{fallback_name}:{lineno}"));
        let declared = script.params().len();
        // Failures are recorded on `v`.
        let _ = m.apply(&mut script, &mut v);
        if script.params().len() > declared {
            param_lines.push(*lineno);
        }
        report(v, *lineno, sink, &mut errors);
    }
    for (ix, message) in check_params(script.params()) {
        let lineno = param_lines.get(ix).copied().unwrap_or(0);
        let mut v = Validator::new(format!("{fallback_name}:{lineno}"));
        v.error(message);
        report(v, lineno, sink, &mut errors);
    }

    if !errors.is_empty() {
        errors.sort_by_key(|e| e.line);
        return Err(invalid(fallback_name, errors));
    }

    if script.name.is_empty() {
        script.name = fallback_name.to_owned();
    }
    tracing::debug!(
        script = %script.name,
        statements = script.statements().len(),
        labels = script.labels().count(),
        params = script.params().len(),
        "compiled"
    );
    Ok(script)
}

/// Read and compile a script file.  The file stem is the fallback name.
pub fn compile_file(path: &Path, sink: &dyn Broadcaster) -> Result<CompiledScript, CompileError> {
    let src = std::fs::read_to_string(path)
        .map_err(|source| CompileError::Io { path: path.to_owned(), source })?;
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(UNNAMED);
    compile(&src, stem, sink)
}

/// Broadcast a validator's messages and collect its errors.
fn report(v: Validator, lineno: usize, sink: &dyn Broadcaster, errors: &mut Vec<LineError>) {
    for msg in v.into_messages() {
        if msg.level == Level::Error {
            errors.push(LineError { line: lineno, message: msg.message.clone() });
        }
        sink.broadcast(msg);
    }
}

fn invalid(name: &str, errors: Vec<LineError>) -> CompileError {
    tracing::debug!(script = name, errors = errors.len(), "compile failed");
    CompileError::Invalid { name: name.to_owned(), errors }
}

/// Broadcast a one-line summary of a compile failure.
pub fn report_failure(err: &CompileError, sink: &dyn Broadcaster) {
    let context = match err {
        CompileError::Io { path, .. } => path.display().to_string(),
        CompileError::Invalid { name, .. } => name.clone(),
    };
    sink.broadcast(Broadcast::new(Level::Error, context, err.to_string()));
}

// ── Tests ─────────────────────────────────────────────────────────────────────
