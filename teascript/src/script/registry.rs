//! Keyword → instruction factory table.
//!
//! The table is assembled once, on first use, from an explicit list.  Every
//! instruction is registered under exactly one keyword; lookup is
//! case-insensitive.

use std::collections::HashMap;
use std::sync::OnceLock;

use super::meta::Metadata;
use super::stmt::{FoldOp, ListStmt, Statement, StorageStmt};
use super::validate::{Invalid, Validator};

/// One parsed line: either compile-time metadata or a runtime statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Meta(Metadata),
    Stmt(Statement),
}

impl From<Metadata> for Instruction {
    fn from(m: Metadata) -> Self {
        Instruction::Meta(m)
    }
}

impl From<Statement> for Instruction {
    fn from(s: Statement) -> Self {
        Instruction::Stmt(s)
    }
}

/// Parses a keyword's tail into an instruction.
pub type Factory = Box<dyn Fn(&str, &mut Validator) -> Result<Instruction, Invalid> + Send + Sync>;

/// Look up `keyword` (any case).
pub fn lookup(keyword: &str) -> Option<&'static Factory> {
    registry().get(keyword.to_ascii_lowercase().as_str())
}

/// Every registered keyword, sorted.
pub fn keywords() -> Vec<&'static str> {
    let mut k: Vec<&'static str> = registry().keys().copied().collect();
    k.sort_unstable();
    k
}

fn registry() -> &'static HashMap<&'static str, Factory> {
    static REGISTRY: OnceLock<HashMap<&'static str, Factory>> = OnceLock::new();
    REGISTRY.get_or_init(build)
}

fn meta<F>(f: F) -> Factory
where
    F: Fn(&str, &mut Validator) -> Result<Metadata, Invalid> + Send + Sync + 'static,
{
    Box::new(move |tail: &str, v: &mut Validator| f(tail, v).map(Instruction::Meta))
}

fn stmt<F>(f: F) -> Factory
where
    F: Fn(&str, &mut Validator) -> Result<Statement, Invalid> + Send + Sync + 'static,
{
    Box::new(move |tail: &str, v: &mut Validator| f(tail, v).map(Instruction::Stmt))
}

fn fold(op: FoldOp) -> Factory {
    stmt(move |tail: &str, v: &mut Validator| Statement::parse_fold(op, tail, v))
}

fn build() -> HashMap<&'static str, Factory> {
    let entries: Vec<(&'static str, Factory)> = vec![
        // ── Metadata ──────────────────────────────────────────────────────
        ("script", meta(Metadata::parse_script)),
        ("description", meta(Metadata::parse_description)),
        ("command", meta(Metadata::parse_command)),
        ("regex", meta(Metadata::parse_regex)),
        ("periodic", meta(Metadata::parse_periodic)),
        ("required", meta(Metadata::parse_parameter(true))),
        ("optional", meta(Metadata::parse_parameter(false))),
        ("type", meta(Metadata::parse_type)),
        ("default", meta(Metadata::parse_default)),
        ("special", meta(Metadata::parse_special)),
        // ── Arithmetic / logic ────────────────────────────────────────────
        ("set", fold(FoldOp::Set)),
        ("add", fold(FoldOp::Add)),
        ("subtract", fold(FoldOp::Subtract)),
        ("multiply", fold(FoldOp::Multiply)),
        ("divide", fold(FoldOp::Divide)),
        ("and", fold(FoldOp::And)),
        ("or", fold(FoldOp::Or)),
        ("equal", fold(FoldOp::Equal)),
        ("concat", fold(FoldOp::Concat)),
        ("not", stmt(Statement::parse_not)),
        // ── Control ───────────────────────────────────────────────────────
        ("jump", stmt(Statement::parse_jump)),
        ("leap", stmt(Statement::parse_leap)),
        ("sleep", stmt(Statement::parse_sleep)),
        ("end", stmt(Statement::parse_end)),
        ("has", stmt(Statement::parse_has)),
        // ── Output buffer ─────────────────────────────────────────────────
        ("write", stmt(Statement::parse_write)),
        ("print", stmt(Statement::parse_print)),
        ("stash", stmt(Statement::parse_stash)),
        ("flush", stmt(Statement::parse_flush)),
        // ── Randomization / misc ──────────────────────────────────────────
        ("randomize", stmt(Statement::parse_randomize)),
        ("range", stmt(Statement::parse_range)),
        ("timestamp", stmt(Statement::parse_timestamp)),
        ("drop", stmt(Statement::parse_drop)),
        ("match", stmt(Statement::parse_match)),
        ("hurl", stmt(Statement::parse_hurl)),
        // ── Lists ─────────────────────────────────────────────────────────
        ("list:load", stmt(Statement::parse_list_load)),
        ("list:get", stmt(Statement::parse_list_get)),
        ("list:first", stmt(Statement::parse_list_cursor(|target| ListStmt::First { target }))),
        ("list:last", stmt(Statement::parse_list_cursor(|target| ListStmt::Last { target }))),
        ("list:next", stmt(Statement::parse_list_cursor(|target| ListStmt::Next { target }))),
        ("list:previous", stmt(Statement::parse_list_cursor(|target| ListStmt::Previous { target }))),
        ("list:random", stmt(Statement::parse_list_cursor(|target| ListStmt::Random { target }))),
        ("list:add", stmt(Statement::parse_list_add)),
        ("list:remove", stmt(Statement::parse_list_remove)),
        ("list:clear", stmt(Statement::parse_list_clear)),
        ("list:filter", stmt(Statement::parse_list_filter)),
        ("list:unique", stmt(Statement::parse_list_unique)),
        ("list:sort", stmt(Statement::parse_list_sort)),
        ("list:shuffle", stmt(Statement::parse_list_shuffle)),
        ("list:limit", stmt(Statement::parse_list_limit)),
        // ── Storage ───────────────────────────────────────────────────────
        ("storage:open", stmt(Statement::parse_storage_open)),
        ("storage:close", stmt(Statement::parse_storage_bare(StorageStmt::Close))),
        ("storage:clear", stmt(Statement::parse_storage_bare(StorageStmt::Clear))),
        ("storage:save", stmt(Statement::parse_storage_bare(StorageStmt::Save))),
        ("storage:get", stmt(Statement::parse_storage_get)),
        ("storage:set", stmt(Statement::parse_storage_set)),
        ("storage:has", stmt(Statement::parse_storage_has)),
        ("storage:remove", stmt(Statement::parse_storage_remove)),
        ("storage:list", stmt(Statement::parse_storage_list)),
    ];

    let mut table = HashMap::with_capacity(entries.len());
    for (keyword, factory) in entries {
        let dup = table.insert(keyword, factory);
        debug_assert!(dup.is_none(), "keyword {keyword} registered twice");
    }
    table
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup("WRITE").is_some());
        assert!(lookup("List:Load").is_some());
        assert!(lookup("nosuch").is_none());
    }

    #[test]
    fn factories_produce_matching_kinds() {
        let mut v = Validator::new("t");
        let m = lookup("command").unwrap()("hello", &mut v).unwrap();
        assert!(matches!(m, Instruction::Meta(Metadata::Command(_))));
        let s = lookup("end").unwrap()("", &mut v).unwrap();
        assert_eq!(s, Instruction::Stmt(Statement::End));
    }

    #[test]
    fn keywords_are_lowercase_and_unique() {
        let k = keywords();
        assert!(k.iter().all(|w| w.chars().all(|c| !c.is_uppercase())));
        let mut dedup = k.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), k.len());
    }
}
