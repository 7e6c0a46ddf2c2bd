//! Execution engine.
//!
//! An [`Invocation`] is one run of a [`CompiledScript`]: a fresh
//! [`Context`] (values, output buffer, open list, storage lock) plus a
//! statement cursor.  [`Invocation::run`] executes statements until the
//! script completes or reaches a `sleep`, in which case it hands back a
//! [`Suspension`] for the host to schedule:
//!
//! ```text
//!            run / resume
//!   Running ─────────────► Completed
//!      │  ▲
//! sleep│  │resume()
//!      ▼  │
//!   Suspended ──drop──► cancelled (storage lock released)
//! ```
//!
//! The engine never blocks on a timer itself; waiting is the host's job.

use std::sync::Arc;
use std::time::Duration;

use crate::broadcast::{Broadcast, Level, Payload, SharedBroadcaster, TracingBroadcaster};
use crate::config::EngineConfig;

use super::bind::{bind, BindError};
use super::compiled::CompiledScript;
use super::list::{ListManager, ListProvider};
use super::storage::{LockToken, Storage, StorageError};
use super::values::ValueMap;

// ── ControlFlow ───────────────────────────────────────────────────────────────

/// What the engine does after a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFlow {
    /// Advance to the following statement.
    Next,
    /// Flush the buffer and complete.
    Exit,
    /// Continue at the statement bound to this label.
    Jump(String),
    /// Advance, then suspend for this many seconds.
    Delay(u64),
}

// ── InvocationInputs ──────────────────────────────────────────────────────────

/// Everything the host supplies for one invocation.
#[derive(Clone)]
pub struct InvocationInputs {
    pub sender: String,
    pub channel: String,
    pub self_name: String,
    /// Extra context values, e.g. `$match.*` from a regex trigger.
    pub context: ValueMap,
    pub storage: Option<Arc<dyn Storage>>,
    pub lists: Option<Arc<dyn ListProvider>>,
    pub broadcaster: SharedBroadcaster,
    pub config: Arc<EngineConfig>,
}

impl Default for InvocationInputs {
    fn default() -> Self {
        Self::new(Arc::new(TracingBroadcaster))
    }
}

impl InvocationInputs {
    pub fn new(broadcaster: SharedBroadcaster) -> Self {
        Self::with_config(broadcaster, Arc::new(EngineConfig::default()))
    }

    pub fn with_config(broadcaster: SharedBroadcaster, config: Arc<EngineConfig>) -> Self {
        Self {
            sender: String::new(),
            channel: config.channel.clone(),
            self_name: config.self_name.clone(),
            context: ValueMap::new(),
            storage: None,
            lists: None,
            broadcaster,
            config,
        }
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn lists(mut self, lists: Arc<dyn ListProvider>) -> Self {
        self.lists = Some(lists);
        self
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Per-invocation execution state.  Never shared between invocations.
pub struct Context {
    pub(crate) values: ValueMap,
    pub(crate) buffer: String,
    pub(crate) lists: ListManager,
    pub(crate) storage: Option<Arc<dyn Storage>>,
    pub(crate) lock: Option<LockToken>,
    pub(crate) lock_wait: Duration,
    pub(crate) config: Arc<EngineConfig>,
    broadcaster: SharedBroadcaster,
    script: String,
}

impl Context {
    pub fn new(script: impl Into<String>, inputs: InvocationInputs) -> Self {
        let InvocationInputs { sender, channel, self_name, context, storage, lists, broadcaster, config } = inputs;
        let mut values = context;
        values.set("$sender", sender);
        values.set("$channel", channel);
        values.set("$self", self_name);
        Self {
            values,
            buffer: String::new(),
            lists: ListManager::new(lists),
            storage,
            lock: None,
            lock_wait: config.lock_timeout,
            config,
            broadcaster,
            script: script.into(),
        }
    }

    pub fn values(&self) -> &ValueMap {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut ValueMap {
        &mut self.values
    }

    /// Text written since the last flush or stash.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn holds_lock(&self) -> bool {
        self.lock.is_some()
    }

    /// How long `storage:open` waits for a lock held elsewhere.  Starts at
    /// the configured `lock_timeout`; zero reports a busy lock at once.
    pub fn set_lock_wait(&mut self, wait: Duration) {
        self.lock_wait = wait;
    }

    /// Emit the buffer as a flush broadcast unless it is blank, then clear it.
    pub fn flush(&mut self) {
        let text = std::mem::take(&mut self.buffer);
        if !text.trim().is_empty() {
            self.report(Level::Flush, text);
        }
    }

    pub fn report(&self, level: Level, message: impl Into<String>) {
        self.broadcaster.broadcast(Broadcast::new(level, self.script.as_str(), message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.report(Level::Error, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.report(Level::Warning, message);
    }

    pub fn hurl(&self, payload: Payload) {
        self.broadcaster.hurl(&self.script, payload);
    }

    /// The held lock token, or [`StorageError::NotLocked`].
    pub(crate) fn token(&self) -> Result<&LockToken, StorageError> {
        self.lock.as_ref().ok_or(StorageError::NotLocked)
    }

    /// Hand the storage lock back, if held.
    pub fn release_lock(&mut self) {
        let Some(token) = self.lock.take() else { return };
        let Some(storage) = &self.storage else { return };
        match storage.release_lock(&token) {
            Ok(()) => tracing::debug!(script = %self.script, token = token.id(), "storage lock released"),
            Err(e) => tracing::warn!(script = %self.script, token = token.id(), error = %e, "storage lock release failed"),
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.release_lock();
    }
}

// ── Outcome ───────────────────────────────────────────────────────────────────

/// Why an invocation stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// An `end` statement ran.
    End,
    /// The cursor ran past the last statement.
    FellOffEnd,
    /// A jump named a label the script does not declare.
    MissingLabel(String),
    /// The configured step budget ran out.
    StepBudget,
}

/// Result of [`Invocation::run`] or [`Suspension::resume`].
pub enum Outcome {
    Completed { termination: Termination, values: ValueMap },
    Suspended(Suspension),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Completed { termination, .. } => f.debug_tuple("Completed").field(termination).finish(),
            Outcome::Suspended(s) => f.debug_tuple("Suspended").field(&s.delay).finish(),
        }
    }
}

// ── Invocation ────────────────────────────────────────────────────────────────

/// One run of a compiled script.
pub struct Invocation {
    script: Arc<CompiledScript>,
    ctx: Context,
    cursor: usize,
    steps: u64,
}

impl Invocation {
    /// Bind `raw_args` and build a fresh context.  A binding failure is
    /// broadcast (with the script's usage line) and the script never runs.
    pub fn new(script: Arc<CompiledScript>, inputs: InvocationInputs, raw_args: &str) -> Result<Self, BindError> {
        let prefix = inputs.config.command_prefix;
        let mut ctx = Context::new(script.name(), inputs);
        match bind(script.params(), raw_args, &mut ctx.values) {
            Ok(surplus) => {
                if !surplus.is_empty() {
                    ctx.report(Level::Info, format!("ignoring extra arguments: {}", surplus.join(" ")));
                }
            }
            Err(e) => {
                ctx.error(format!("{e} (usage: {})", script.usage(prefix)));
                return Err(e);
            }
        }
        tracing::debug!(script = %script.name(), args = raw_args, "invocation bound");
        Ok(Self { script, ctx, cursor: 0, steps: 0 })
    }

    pub fn script(&self) -> &Arc<CompiledScript> {
        &self.script
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// Index of the next statement to execute.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Statements executed so far, across resumptions.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run until completion or the next `sleep`.
    pub fn run(mut self) -> Outcome {
        let script = Arc::clone(&self.script);
        let statements = script.statements();
        loop {
            let Some(stmt) = statements.get(self.cursor) else {
                self.ctx.error(format!("execution ran past the last statement (index {})", self.cursor));
                return self.finish(Termination::FellOffEnd);
            };
            if let Some(budget) = self.ctx.config.step_budget {
                if self.steps >= budget {
                    self.ctx.error(format!("stopped after {budget} statements"));
                    return self.finish(Termination::StepBudget);
                }
            }
            self.steps += 1;

            match stmt.execute(&mut self.ctx) {
                ControlFlow::Next => self.cursor += 1,
                ControlFlow::Exit => {
                    self.ctx.flush();
                    return self.finish(Termination::End);
                }
                ControlFlow::Jump(label) => match script.label(&label) {
                    Some(ix) => {
                        tracing::trace!(script = %script.name(), %label, target = ix, "jump");
                        self.cursor = ix;
                    }
                    None => {
                        self.ctx.error(format!("unknown label '{label}'"));
                        return self.finish(Termination::MissingLabel(label));
                    }
                },
                ControlFlow::Delay(seconds) => {
                    self.cursor += 1;
                    if seconds == 0 {
                        continue;
                    }
                    let max = self.ctx.config.max_sleep;
                    let mut delay = Duration::from_secs(seconds);
                    if delay > max {
                        self.ctx.warn(format!("sleep of {seconds}s shortened to {}s", max.as_secs()));
                        delay = max;
                    }
                    tracing::debug!(script = %script.name(), cursor = self.cursor, ?delay, "suspended");
                    return Outcome::Suspended(Suspension { inv: self, delay });
                }
            }
        }
    }

    fn finish(mut self, termination: Termination) -> Outcome {
        self.ctx.release_lock();
        tracing::debug!(script = %self.script.name(), steps = self.steps, ?termination, "completed");
        let values = std::mem::take(&mut self.ctx.values);
        Outcome::Completed { termination, values }
    }
}

// ── Suspension ────────────────────────────────────────────────────────────────

/// A paused invocation waiting out a `sleep`.  Dropping it cancels the
/// invocation and releases any storage lock it holds.
pub struct Suspension {
    inv: Invocation,
    delay: Duration,
}

impl Suspension {
    /// How long to wait before calling [`Suspension::resume`].
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Index of the statement execution continues at.
    pub fn cursor(&self) -> usize {
        self.inv.cursor
    }

    pub fn script(&self) -> &Arc<CompiledScript> {
        &self.inv.script
    }

    pub fn context(&self) -> &Context {
        &self.inv.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.inv.ctx
    }

    /// Continue from the statement after the `sleep`.
    pub fn resume(self) -> Outcome {
        tracing::trace!(script = %self.inv.script.name(), cursor = self.inv.cursor, "resumed");
        self.inv.run()
    }

    /// Abandon the invocation.  Side effects already emitted stay emitted.
    pub fn cancel(self) {
        tracing::debug!(script = %self.inv.script.name(), cursor = self.inv.cursor, "cancelled");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
