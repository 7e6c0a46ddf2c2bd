//! Runtime statements and their tail grammars.
//!
//! Each statement owns the data its keyword's tail parsed into.  Parsing
//! lives here; execution lives in [`super::exec`].

use chrono::format::{Item, StrftimeItems};

use super::args::{self, ValueArg};
use super::name::ValueName;
use super::validate::{Invalid, Validator};

/// Format used by `timestamp` with no argument.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Operators that fold operands into a target variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOp {
    Set,
    Add,
    Subtract,
    Multiply,
    Divide,
    And,
    Or,
    Equal,
    Concat,
}

impl FoldOp {
    pub fn keyword(self) -> &'static str {
        match self {
            FoldOp::Set => "set",
            FoldOp::Add => "add",
            FoldOp::Subtract => "subtract",
            FoldOp::Multiply => "multiply",
            FoldOp::Divide => "divide",
            FoldOp::And => "and",
            FoldOp::Or => "or",
            FoldOp::Equal => "equal",
            FoldOp::Concat => "concat",
        }
    }
}

/// A parsed, executable statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `add !t v…`, `set !t v`, …  With one operand the target is the left
    /// operand; with more, the fold runs over the operands only.
    Fold { op: FoldOp, target: ValueName, operands: Vec<ValueArg> },
    /// `not !t [v]`
    Not { target: ValueName, operand: Option<ValueArg> },
    /// `jump @label [v]`: taken when `v` is non-zero (always if absent).
    Jump { label: String, condition: Option<ValueArg> },
    /// `leap @a @b …`: jump to one label chosen uniformly at random.
    Leap { labels: Vec<String> },
    /// `sleep v`
    Sleep { seconds: ValueArg },
    /// `end`
    End,
    /// `flush`
    Flush,
    /// `has !t name[*]`
    Has { target: ValueName, name: ValueName },
    /// `write text…` (verbatim)
    Write { text: String },
    /// `print v`
    Print { value: ValueArg },
    /// `stash !t`
    Stash { target: ValueName },
    /// `randomize !t a b`
    Randomize { target: ValueName, a: ValueArg, b: ValueArg },
    /// `range !t a b`
    Range { target: ValueName, a: ValueArg, b: ValueArg },
    /// `timestamp [format]`
    Timestamp { format: String },
    /// `drop name[*]`
    Drop { name: ValueName },
    /// `match !t v literal…`
    Match { target: ValueName, value: ValueArg, literal: String },
    /// `hurl v[*]`
    Hurl { value: ValueArg },
    List(ListStmt),
    Storage(StorageStmt),
}

/// `list:*` statements.
#[derive(Debug, Clone, PartialEq)]
pub enum ListStmt {
    Load { name: ValueArg },
    Get { target: ValueName, index: ValueArg },
    First { target: ValueName },
    Last { target: ValueName },
    Next { target: ValueName },
    Previous { target: ValueName },
    Random { target: ValueName },
    Add { source: ValueName },
    Remove { index: Option<ValueArg> },
    Clear,
    Filter { key: String, value: ValueArg },
    Unique { key: String },
    Sort { key: String, descending: bool },
    Shuffle,
    Limit { count: ValueArg, keep_tail: bool },
}

/// `storage:*` statements.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageStmt {
    Open { name: ValueArg },
    Close,
    Clear,
    Save,
    Get { target: ValueName, key: ValueArg },
    Set { key: ValueArg, value: ValueArg },
    Has { target: ValueName, key: ValueArg },
    Remove { key: ValueArg },
    List { name: ValueArg },
}

type Parsed = Result<Statement, Invalid>;

impl Statement {
    /// `true` for the terminal statement the parser appends when missing.
    pub fn is_end(&self) -> bool {
        matches!(self, Statement::End)
    }

    // ── Arithmetic / logic ────────────────────────────────────────────────

    pub fn parse_fold(op: FoldOp, tail: &str, v: &mut Validator) -> Parsed {
        let (target, rest) = args::target(tail, false, v)?;
        let max = if op == FoldOp::Set { 1 } else { 2 };
        let operands = args::value_args(rest, 1, max, op != FoldOp::Set, v)?;
        Ok(Statement::Fold { op, target, operands })
    }

    pub fn parse_not(tail: &str, v: &mut Validator) -> Parsed {
        let (target, rest) = args::target(tail, false, v)?;
        let operand = args::value_args(rest, 0, 1, false, v)?.into_iter().next();
        Ok(Statement::Not { target, operand })
    }

    // ── Control ───────────────────────────────────────────────────────────

    pub fn parse_jump(tail: &str, v: &mut Validator) -> Parsed {
        let words = args::words(tail);
        v.arg_count(words.len(), 1, 2, false).check()?;
        v.label_name(words[0]).check()?;
        let condition = match words.get(1) {
            Some(w) => Some(ValueArg::parse(w, false, v)?),
            None => None,
        };
        Ok(Statement::Jump { label: words[0].to_owned(), condition })
    }

    pub fn parse_leap(tail: &str, v: &mut Validator) -> Parsed {
        let words = args::words(tail);
        v.arg_count(words.len(), 1, 1, true);
        for w in &words {
            v.label_name(w);
        }
        v.check()?;
        Ok(Statement::Leap { labels: words.into_iter().map(str::to_owned).collect() })
    }

    pub fn parse_sleep(tail: &str, v: &mut Validator) -> Parsed {
        Ok(Statement::Sleep { seconds: args::value_arg(tail, false, v)? })
    }

    pub fn parse_end(tail: &str, v: &mut Validator) -> Parsed {
        args::no_args(tail, v)?;
        Ok(Statement::End)
    }

    pub fn parse_has(tail: &str, v: &mut Validator) -> Parsed {
        let (target, rest) = args::target(tail, false, v)?;
        let name = args::scoped_name(args::single_word(rest, v)?, true, v)?;
        Ok(Statement::Has { target, name })
    }

    // ── Output buffer ─────────────────────────────────────────────────────

    /// `write` keeps its tail byte-for-byte, trailing spaces included.
    pub fn parse_write(tail: &str, v: &mut Validator) -> Parsed {
        if tail.trim().is_empty() {
            return Err(v.fail("expected text to write"));
        }
        Ok(Statement::Write { text: tail.to_owned() })
    }

    pub fn parse_print(tail: &str, v: &mut Validator) -> Parsed {
        Ok(Statement::Print { value: args::value_arg(tail, false, v)? })
    }

    pub fn parse_stash(tail: &str, v: &mut Validator) -> Parsed {
        let w = args::single_word(tail, v)?;
        v.variable_name(w, false).check()?;
        Ok(Statement::Stash { target: args::scoped_name(w, false, v)? })
    }

    pub fn parse_flush(tail: &str, v: &mut Validator) -> Parsed {
        args::no_args(tail, v)?;
        Ok(Statement::Flush)
    }

    // ── Randomization ─────────────────────────────────────────────────────

    pub fn parse_randomize(tail: &str, v: &mut Validator) -> Parsed {
        let (target, a, b) = target_and_pair(tail, v)?;
        Ok(Statement::Randomize { target, a, b })
    }

    pub fn parse_range(tail: &str, v: &mut Validator) -> Parsed {
        let (target, a, b) = target_and_pair(tail, v)?;
        Ok(Statement::Range { target, a, b })
    }

    // ── Misc ──────────────────────────────────────────────────────────────

    /// Rejects formats chrono cannot render, so execution never has to.
    pub fn parse_timestamp(tail: &str, v: &mut Validator) -> Parsed {
        let format = match tail.trim() {
            "" => DEFAULT_TIMESTAMP_FORMAT,
            f => f,
        };
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(v.fail(format!("invalid timestamp format '{format}'")));
        }
        Ok(Statement::Timestamp { format: format.to_owned() })
    }

    pub fn parse_drop(tail: &str, v: &mut Validator) -> Parsed {
        let w = args::single_word(tail, v)?;
        Ok(Statement::Drop { name: args::scoped_name(w, true, v)? })
    }

    pub fn parse_match(tail: &str, v: &mut Validator) -> Parsed {
        let (target, rest) = args::target(tail, false, v)?;
        let rest = rest.trim_start();
        let (first, literal) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        if first.is_empty() {
            return Err(v.fail("expected a value to match"));
        }
        let value = ValueArg::parse(first, false, v)?;
        let literal = args::text(literal, "literal text to match against", v)?;
        Ok(Statement::Match { target, value, literal: literal.to_owned() })
    }

    pub fn parse_hurl(tail: &str, v: &mut Validator) -> Parsed {
        Ok(Statement::Hurl { value: args::value_arg(tail, true, v)? })
    }

    // ── list:* ────────────────────────────────────────────────────────────

    pub fn parse_list_load(tail: &str, v: &mut Validator) -> Parsed {
        Ok(ListStmt::Load { name: list_name(tail, v)? }.into())
    }

    pub fn parse_list_get(tail: &str, v: &mut Validator) -> Parsed {
        let (target, rest) = args::target(tail, true, v)?;
        let index = args::value_arg(rest, false, v)?;
        Ok(ListStmt::Get { target, index }.into())
    }

    pub fn parse_list_cursor(
        make: fn(ValueName) -> ListStmt,
    ) -> impl Fn(&str, &mut Validator) -> Parsed {
        move |tail: &str, v: &mut Validator| {
            let w = args::single_word(tail, v)?;
            v.variable_name(w, true).check()?;
            Ok(make(args::scoped_name(w, true, v)?).into())
        }
    }

    pub fn parse_list_add(tail: &str, v: &mut Validator) -> Parsed {
        let w = args::single_word(tail, v)?;
        Ok(ListStmt::Add { source: args::scoped_name(w, true, v)? }.into())
    }

    pub fn parse_list_remove(tail: &str, v: &mut Validator) -> Parsed {
        let index = args::value_args(tail, 0, 1, false, v)?.into_iter().next();
        Ok(ListStmt::Remove { index }.into())
    }

    pub fn parse_list_clear(tail: &str, v: &mut Validator) -> Parsed {
        args::no_args(tail, v)?;
        Ok(ListStmt::Clear.into())
    }

    pub fn parse_list_filter(tail: &str, v: &mut Validator) -> Parsed {
        let words = args::words(tail);
        v.arg_count(words.len(), 2, 2, false).check()?;
        v.unprefixed_name(words[0]).check()?;
        let value = ValueArg::parse(words[1], false, v)?;
        Ok(ListStmt::Filter { key: words[0].to_owned(), value }.into())
    }

    pub fn parse_list_unique(tail: &str, v: &mut Validator) -> Parsed {
        let key = args::single_word(tail, v)?;
        v.unprefixed_name(key).check()?;
        Ok(ListStmt::Unique { key: key.to_owned() }.into())
    }

    pub fn parse_list_sort(tail: &str, v: &mut Validator) -> Parsed {
        let words = args::words(tail);
        v.arg_count(words.len(), 1, 2, false).check()?;
        v.unprefixed_name(words[0]).check()?;
        let descending = match words.get(1).map(|w| w.to_ascii_lowercase()) {
            None => false,
            Some(w) if w == "asc" => false,
            Some(w) if w == "desc" => true,
            Some(w) => return Err(v.fail(format!("expected 'asc' or 'desc', found '{w}'"))),
        };
        Ok(ListStmt::Sort { key: words[0].to_owned(), descending }.into())
    }

    pub fn parse_list_shuffle(tail: &str, v: &mut Validator) -> Parsed {
        args::no_args(tail, v)?;
        Ok(ListStmt::Shuffle.into())
    }

    pub fn parse_list_limit(tail: &str, v: &mut Validator) -> Parsed {
        let words = args::words(tail);
        v.arg_count(words.len(), 1, 2, false).check()?;
        let count = ValueArg::parse(words[0], false, v)?;
        let keep_tail = match words.get(1).map(|w| w.to_ascii_lowercase()) {
            None => false,
            Some(w) if w == "head" => false,
            Some(w) if w == "tail" => true,
            Some(w) => return Err(v.fail(format!("expected 'head' or 'tail', found '{w}'"))),
        };
        Ok(ListStmt::Limit { count, keep_tail }.into())
    }

    // ── storage:* ─────────────────────────────────────────────────────────

    pub fn parse_storage_open(tail: &str, v: &mut Validator) -> Parsed {
        Ok(StorageStmt::Open { name: list_name(tail, v)? }.into())
    }

    pub fn parse_storage_bare(stmt: StorageStmt) -> impl Fn(&str, &mut Validator) -> Parsed {
        move |tail: &str, v: &mut Validator| {
            args::no_args(tail, v)?;
            Ok(stmt.clone().into())
        }
    }

    pub fn parse_storage_get(tail: &str, v: &mut Validator) -> Parsed {
        let (target, rest) = args::target(tail, false, v)?;
        let key = args::value_arg(rest, false, v)?;
        Ok(StorageStmt::Get { target, key }.into())
    }

    pub fn parse_storage_set(tail: &str, v: &mut Validator) -> Parsed {
        let mut a = args::value_args(tail, 2, 2, false, v)?.into_iter();
        match (a.next(), a.next()) {
            (Some(key), Some(value)) => Ok(StorageStmt::Set { key, value }.into()),
            _ => Err(Invalid),
        }
    }

    pub fn parse_storage_has(tail: &str, v: &mut Validator) -> Parsed {
        let (target, rest) = args::target(tail, false, v)?;
        let key = args::value_arg(rest, false, v)?;
        Ok(StorageStmt::Has { target, key }.into())
    }

    pub fn parse_storage_remove(tail: &str, v: &mut Validator) -> Parsed {
        Ok(StorageStmt::Remove { key: args::value_arg(tail, false, v)? }.into())
    }

    pub fn parse_storage_list(tail: &str, v: &mut Validator) -> Parsed {
        Ok(StorageStmt::List { name: list_name(tail, v)? }.into())
    }
}

impl From<ListStmt> for Statement {
    fn from(s: ListStmt) -> Self {
        Statement::List(s)
    }
}

impl From<StorageStmt> for Statement {
    fn from(s: StorageStmt) -> Self {
        Statement::Storage(s)
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn target_and_pair(tail: &str, v: &mut Validator) -> Result<(ValueName, ValueArg, ValueArg), Invalid> {
    let (target, rest) = args::target(tail, false, v)?;
    let mut pair = args::value_args(rest, 2, 2, false, v)?.into_iter();
    match (pair.next(), pair.next()) {
        (Some(a), Some(b)) => Ok((target, a, b)),
        _ => Err(Invalid),
    }
}

/// A list or store name: a value argument, or a bare word (which may carry
/// the reserved `#` prefix) taken as a constant.
fn list_name(tail: &str, v: &mut Validator) -> Result<ValueArg, Invalid> {
    let w = args::single_word(tail, v)?;
    let bare = w.strip_prefix(super::name::RESERVED_LIST_PREFIX).unwrap_or(w);
    if super::validate::is_unprefixed_name(bare) && bare.parse::<i64>().is_err() {
        return Ok(ValueArg::Constant(super::value::Value::from_text(w)));
    }
    ValueArg::parse(w, false, v)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
