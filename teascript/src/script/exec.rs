//! Statement execution.
//!
//! Every statement runs against the invocation's [`Context`] and returns a
//! [`ControlFlow`].  Failures are broadcast at error level and execution
//! continues with the next statement; only the engine itself ends an
//! invocation early.

use std::fmt::Write as _;

use rand::seq::SliceRandom;
use rand::RngCore;

use crate::broadcast::Payload;

use super::args::ValueArg;
use super::interp::{ControlFlow, Context};
use super::list::{ListError, Record};
use super::name::ValueName;
use super::stmt::{FoldOp, ListStmt, Statement, StorageStmt};
use super::storage::StorageError;
use super::value::Value;

/// Context key written by `timestamp`.
pub const TIMESTAMP: &str = "$timestamp";

impl Statement {
    pub fn execute(&self, ctx: &mut Context) -> ControlFlow {
        match self {
            Statement::Fold { op, target, operands } => fold(*op, target, operands, ctx),
            Statement::Not { target, operand } => {
                let v = match operand {
                    Some(a) => a.resolve(&mut ctx.values),
                    None => ctx.values.get_or_default(target.key()).clone(),
                };
                ctx.values.set(target.key(), !v.as_bool());
            }
            Statement::Has { target, name } => {
                let set = ctx.values.has(name);
                ctx.values.set(target.key(), set);
            }

            Statement::Jump { label, condition } => {
                let taken = condition.as_ref().map_or(true, |c| c.resolve(&mut ctx.values).as_bool());
                if taken {
                    return ControlFlow::Jump(label.clone());
                }
            }
            Statement::Leap { labels } => {
                if let Some(label) = labels.choose(&mut rand::thread_rng()) {
                    return ControlFlow::Jump(label.clone());
                }
            }
            Statement::Sleep { seconds } => {
                let n = seconds.resolve(&mut ctx.values).number();
                if n > 0 {
                    return ControlFlow::Delay(n.unsigned_abs());
                }
            }
            Statement::End => return ControlFlow::Exit,

            Statement::Flush => ctx.flush(),
            Statement::Write { text } => ctx.buffer.push_str(text),
            Statement::Print { value } => {
                let v = value.resolve(&mut ctx.values);
                ctx.buffer.push_str(v.text());
            }
            Statement::Stash { target } => {
                let text = std::mem::take(&mut ctx.buffer);
                ctx.values.set(target.key(), text);
            }

            Statement::Randomize { target, a, b } => {
                let (lo, hi) = bounds(a, b, ctx);
                let n = uniform_inclusive(&mut rand::thread_rng(), lo, hi);
                ctx.values.set(target.key(), n);
            }
            Statement::Range { target, a, b } => {
                let (lo, hi) = bounds(a, b, ctx);
                let n = ctx.values.get_or_default(target.key()).number().clamp(lo, hi);
                ctx.values.set(target.key(), n);
            }

            Statement::Timestamp { format } => {
                let mut out = String::new();
                match write!(out, "{}", chrono::Local::now().format(format)) {
                    Ok(()) => ctx.values.set(TIMESTAMP, out),
                    Err(_) => ctx.error(format!("cannot format the time with '{format}'")),
                }
            }
            Statement::Drop { name } => {
                if name.is_wildcard() {
                    ctx.values.remove_matching(name.key());
                } else {
                    ctx.values.remove(name.key());
                }
            }
            Statement::Match { target, value, literal } => {
                let v = value.resolve(&mut ctx.values);
                ctx.values.set(target.key(), v.text_eq_ignore_case(literal));
            }
            Statement::Hurl { value } => hurl(value, ctx),

            Statement::List(stmt) => list(stmt, ctx),
            Statement::Storage(stmt) => {
                if let Err(e) = storage(stmt, ctx) {
                    ctx.error(format!("{}: {e}", storage_keyword(stmt)));
                }
            }
        }
        ControlFlow::Next
    }
}

// ── Arithmetic / logic ────────────────────────────────────────────────────────

fn fold(op: FoldOp, target: &ValueName, operands: &[ValueArg], ctx: &mut Context) {
    let mut vals: Vec<Value> = operands.iter().map(|a| a.resolve(&mut ctx.values)).collect();
    if vals.len() == 1 && op != FoldOp::Set {
        vals.insert(0, ctx.values.get_or_default(target.key()).clone());
    }
    let Some((first, rest)) = vals.split_first() else { return };

    let result = match op {
        FoldOp::Set => first.clone(),
        FoldOp::Add => Value::from_number(rest.iter().fold(first.number(), |acc, v| acc.saturating_add(v.number()))),
        FoldOp::Subtract => Value::from_number(rest.iter().fold(first.number(), |acc, v| acc.saturating_sub(v.number()))),
        FoldOp::Multiply => Value::from_number(rest.iter().fold(first.number(), |acc, v| acc.saturating_mul(v.number()))),
        FoldOp::Divide => {
            let mut acc = first.number();
            for v in rest {
                match acc.checked_div(v.number()) {
                    Some(q) => acc = q,
                    None => {
                        ctx.error(format!("divide: cannot divide {acc} by {}", v.number()));
                        return;
                    }
                }
            }
            Value::from_number(acc)
        }
        FoldOp::And => Value::from_bool(vals.iter().all(Value::as_bool)),
        FoldOp::Or => Value::from_bool(vals.iter().any(Value::as_bool)),
        FoldOp::Equal => Value::from_bool(rest.iter().all(|v| v == first)),
        FoldOp::Concat => Value::from_text(vals.iter().map(Value::text).collect::<String>()),
    };
    ctx.values.set(target.key(), result);
}

// ── Randomization ─────────────────────────────────────────────────────────────

fn bounds(a: &ValueArg, b: &ValueArg, ctx: &mut Context) -> (i64, i64) {
    let a = a.resolve(&mut ctx.values).number();
    let b = b.resolve(&mut ctx.values).number();
    (a.min(b), a.max(b))
}

/// Uniform integer in `[lo, hi]`.  Draws above the largest multiple of the
/// span are rejected, so no value is favoured by the modulo.
pub fn uniform_inclusive<R: RngCore + ?Sized>(rng: &mut R, lo: i64, hi: i64) -> i64 {
    debug_assert!(lo <= hi);
    let span = (i128::from(hi) - i128::from(lo)) as u64;
    let Some(n) = span.checked_add(1) else {
        // Full i64 range: every draw is fair.
        return rng.next_u64() as i64;
    };
    let zone = (u64::MAX / n) * n;
    loop {
        let x = rng.next_u64();
        if x < zone {
            return lo.wrapping_add((x % n) as i64);
        }
    }
}

// ── hurl ──────────────────────────────────────────────────────────────────────

fn hurl(value: &ValueArg, ctx: &mut Context) {
    let mut payload = Payload::new();
    match value {
        ValueArg::Named(name) if name.is_wildcard() => {
            for (suffix, v) in ctx.values.matching(name.key()) {
                payload.insert(suffix.to_owned(), v.clone());
            }
        }
        ValueArg::Named(name) => {
            let v = ctx.values.get_or_default(name.key()).clone();
            payload.insert(name.base().to_owned(), v);
        }
        ValueArg::Constant(v) => {
            payload.insert("value".to_owned(), v.clone());
        }
    }
    if payload.is_empty() {
        ctx.warn(format!("hurl: nothing is set under {value}"));
        return;
    }
    ctx.hurl(payload);
}

// ── list:* ────────────────────────────────────────────────────────────────────

fn list(stmt: &ListStmt, ctx: &mut Context) {
    let result = list_op(stmt, ctx);
    ctx.lists.publish(&mut ctx.values);
    if let Err(e) = result {
        ctx.error(format!("{}: {e}", list_keyword(stmt)));
    }
}

fn list_op(stmt: &ListStmt, ctx: &mut Context) -> Result<(), ListError> {
    match stmt {
        ListStmt::Load { name } => {
            let name = name.resolve(&mut ctx.values);
            ctx.lists.load(name.text())
        }
        ListStmt::Get { target, index } => {
            let ix = index.resolve(&mut ctx.values).number();
            let record = ctx.lists.get(ix)?;
            store_record(target, Some(record), ctx);
            Ok(())
        }
        ListStmt::First { target } => {
            let r = ctx.lists.first()?;
            store_record(target, r, ctx);
            Ok(())
        }
        ListStmt::Last { target } => {
            let r = ctx.lists.last()?;
            store_record(target, r, ctx);
            Ok(())
        }
        ListStmt::Next { target } => {
            let r = ctx.lists.next()?;
            store_record(target, r, ctx);
            Ok(())
        }
        ListStmt::Previous { target } => {
            let r = ctx.lists.previous()?;
            store_record(target, r, ctx);
            Ok(())
        }
        ListStmt::Random { target } => {
            let r = ctx.lists.random()?;
            store_record(target, r, ctx);
            Ok(())
        }
        ListStmt::Add { source } => {
            let record = build_record(source, ctx);
            if record.is_empty() {
                ctx.warn(format!("list:add: nothing is set under {source}"));
                return Ok(());
            }
            ctx.lists.add(record)
        }
        ListStmt::Remove { index } => {
            let ix = index.as_ref().map(|i| i.resolve(&mut ctx.values).number());
            ctx.lists.remove(ix).map(|_| ())
        }
        ListStmt::Clear => ctx.lists.clear(),
        ListStmt::Filter { key, value } => {
            let v = value.resolve(&mut ctx.values);
            ctx.lists.filter(key, &v)
        }
        ListStmt::Unique { key } => ctx.lists.unique(key),
        ListStmt::Sort { key, descending } => ctx.lists.sort(key, *descending),
        ListStmt::Shuffle => ctx.lists.shuffle(),
        ListStmt::Limit { count, keep_tail } => {
            let n = count.resolve(&mut ctx.values).number();
            ctx.lists.limit(n, *keep_tail)
        }
    }
}

/// One field from a plain name (keyed by the name without its prefix), or
/// every set member of a wildcard (keyed by suffix).
fn build_record(source: &ValueName, ctx: &mut Context) -> Record {
    if source.is_wildcard() {
        return ctx.values.matching(source.key()).map(|(k, v)| (k, v.clone())).collect();
    }
    let v = ctx.values.get_or_default(source.key()).clone();
    if v.is_empty() {
        return Record::new();
    }
    std::iter::once((source.base(), v)).collect()
}

/// Write a located record into `target`.  A plain target takes the first
/// field only.
fn store_record(target: &ValueName, record: Option<Record>, ctx: &mut Context) {
    let Some(record) = record else { return };
    if target.is_wildcard() {
        for (k, v) in record.fields() {
            ctx.values.set(target.member(k), v.clone());
        }
        return;
    }
    if record.len() > 1 {
        ctx.warn(format!("record has {} fields; only the first is stored in {target}", record.len()));
    }
    ctx.values.set(target.key(), record.first().cloned().unwrap_or_default());
}

fn list_keyword(stmt: &ListStmt) -> &'static str {
    match stmt {
        ListStmt::Load { .. } => "list:load",
        ListStmt::Get { .. } => "list:get",
        ListStmt::First { .. } => "list:first",
        ListStmt::Last { .. } => "list:last",
        ListStmt::Next { .. } => "list:next",
        ListStmt::Previous { .. } => "list:previous",
        ListStmt::Random { .. } => "list:random",
        ListStmt::Add { .. } => "list:add",
        ListStmt::Remove { .. } => "list:remove",
        ListStmt::Clear => "list:clear",
        ListStmt::Filter { .. } => "list:filter",
        ListStmt::Unique { .. } => "list:unique",
        ListStmt::Sort { .. } => "list:sort",
        ListStmt::Shuffle => "list:shuffle",
        ListStmt::Limit { .. } => "list:limit",
    }
}

// ── storage:* ─────────────────────────────────────────────────────────────────

fn storage(stmt: &StorageStmt, ctx: &mut Context) -> Result<(), StorageError> {
    let backend = ctx.storage.clone().ok_or(StorageError::Unavailable)?;
    match stmt {
        StorageStmt::Open { name } => {
            let name = name.resolve(&mut ctx.values);
            if ctx.lock.is_none() {
                let token = backend.acquire_lock(ctx.lock_wait)?;
                tracing::debug!(token = token.id(), store = name.text(), "storage lock acquired");
                ctx.lock = Some(token);
            }
            backend.open(ctx.token()?, name.text())
        }
        StorageStmt::Close => {
            backend.close(ctx.token()?)?;
            ctx.release_lock();
            Ok(())
        }
        StorageStmt::Clear => backend.clear(ctx.token()?),
        StorageStmt::Save => backend.save(ctx.token()?),
        StorageStmt::Get { target, key } => {
            let key = key.resolve(&mut ctx.values);
            let found = backend.get(ctx.token()?, key.text())?;
            if found.is_none() {
                ctx.warn(format!("storage:get: no value stored under '{key}'"));
            }
            ctx.values.set(target.key(), found.unwrap_or_default());
            Ok(())
        }
        StorageStmt::Set { key, value } => {
            let key = key.resolve(&mut ctx.values);
            let value = value.resolve(&mut ctx.values);
            backend.set(ctx.token()?, key.text(), value)
        }
        StorageStmt::Has { target, key } => {
            let key = key.resolve(&mut ctx.values);
            let has = backend.has(ctx.token()?, key.text())?;
            ctx.values.set(target.key(), has);
            Ok(())
        }
        StorageStmt::Remove { key } => {
            let key = key.resolve(&mut ctx.values);
            if !backend.remove(ctx.token()?, key.text())? {
                ctx.warn(format!("storage:remove: no value stored under '{key}'"));
            }
            Ok(())
        }
        StorageStmt::List { name } => {
            let name = name.resolve(&mut ctx.values);
            let list = backend.list(ctx.token()?, name.text())?;
            ctx.lists.open(list);
            ctx.lists.publish(&mut ctx.values);
            Ok(())
        }
    }
}

fn storage_keyword(stmt: &StorageStmt) -> &'static str {
    match stmt {
        StorageStmt::Open { .. } => "storage:open",
        StorageStmt::Close => "storage:close",
        StorageStmt::Clear => "storage:clear",
        StorageStmt::Save => "storage:save",
        StorageStmt::Get { .. } => "storage:get",
        StorageStmt::Set { .. } => "storage:set",
        StorageStmt::Has { .. } => "storage:has",
        StorageStmt::Remove { .. } => "storage:remove",
        StorageStmt::List { .. } => "storage:list",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
