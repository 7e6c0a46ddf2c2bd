//! Diagnostic broadcasts and the host-facing output sinks.
//!
//! Everything a script does that the outside world can observe leaves the
//! engine through a [`Broadcaster`]:
//!
//! - leveled messages ([`Level::Info`], [`Level::Warning`], [`Level::Error`]),
//! - [`Level::Flush`] messages, whose text is exactly what should be
//!   delivered externally (e.g. as a chat line),
//! - `hurl` payloads, a flat name → value map for a secondary structured
//!   channel.
//!
//! Sinks are shared between concurrent invocations, so the trait takes
//! `&self` and implementations synchronise internally.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::script::value::Value;

/// Payload forwarded by `hurl`.
pub type Payload = BTreeMap<String, Value>;

// ── Level ─────────────────────────────────────────────────────────────────────

/// Severity of a [`Broadcast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warning,
    Error,
    /// Script output to deliver externally.
    Flush,
}

impl Level {
    pub fn name(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Flush => "flush",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Broadcast ─────────────────────────────────────────────────────────────────

/// One leveled message.  `context` is a free-form token naming the origin
/// (a script name, or `name:line` during compilation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    pub level: Level,
    pub context: String,
    pub message: String,
}

impl Broadcast {
    pub fn new(level: Level, context: impl Into<String>, message: impl Into<String>) -> Self {
        Self { level, context: context.into(), message: message.into() }
    }
}

impl fmt::Display for Broadcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.level, self.context, self.message)
    }
}

// ── Broadcaster ───────────────────────────────────────────────────────────────

/// Receiver for everything an invocation emits.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, msg: Broadcast);

    /// Receive a `hurl` payload.  The default drops it after logging.
    fn hurl(&self, context: &str, payload: Payload) {
        tracing::debug!(context, fields = payload.len(), "hurl payload dropped");
    }
}

/// Shared handle used throughout the engine.
pub type SharedBroadcaster = Arc<dyn Broadcaster>;

/// Forwards broadcasts to `tracing` at the matching level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBroadcaster;

impl Broadcaster for TracingBroadcaster {
    fn broadcast(&self, msg: Broadcast) {
        let Broadcast { level, context, message } = msg;
        match level {
            Level::Info => tracing::info!(%context, "{message}"),
            Level::Warning => tracing::warn!(%context, "{message}"),
            Level::Error => tracing::error!(%context, "{message}"),
            Level::Flush => tracing::info!(%context, flush = true, "{message}"),
        }
    }

    fn hurl(&self, context: &str, payload: Payload) {
        tracing::info!(context, ?payload, "hurl");
    }
}

/// An item recorded by [`Collector`] or sent by [`ChannelBroadcaster`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emitted {
    Broadcast(Broadcast),
    Hurl { context: String, payload: Payload },
}

/// Records everything in memory; used by tests and batch tools.
#[derive(Debug, Default)]
pub struct Collector {
    items: Mutex<Vec<Emitted>>,
}

impl Collector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Drain and return everything recorded so far.
    pub fn take(&self) -> Vec<Emitted> {
        std::mem::take(&mut *self.lock())
    }

    /// Text of every flush, in order.
    pub fn flushes(&self) -> Vec<String> {
        self.messages_at(Level::Flush)
    }

    /// Messages recorded at `level`, in order.
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                Emitted::Broadcast(b) if b.level == level => Some(b.message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every hurl payload, in order.
    pub fn hurls(&self) -> Vec<Payload> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                Emitted::Hurl { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Emitted>> {
        // A panic while holding the lock only loses test output.
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Broadcaster for Collector {
    fn broadcast(&self, msg: Broadcast) {
        self.lock().push(Emitted::Broadcast(msg));
    }

    fn hurl(&self, context: &str, payload: Payload) {
        self.lock().push(Emitted::Hurl { context: context.to_owned(), payload });
    }
}

/// Sends everything into an unbounded tokio channel, for hosts that drain
/// script output from their own event loop.
#[derive(Debug, Clone)]
pub struct ChannelBroadcaster {
    tx: mpsc::UnboundedSender<Emitted>,
}

impl ChannelBroadcaster {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Emitted>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn broadcast(&self, msg: Broadcast) {
        if self.tx.send(Emitted::Broadcast(msg)).is_err() {
            tracing::trace!("broadcast receiver gone");
        }
    }

    fn hurl(&self, context: &str, payload: Payload) {
        let item = Emitted::Hurl { context: context.to_owned(), payload };
        if self.tx.send(item).is_err() {
            tracing::trace!("hurl receiver gone");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_filters_by_level() {
        let c = Collector::new();
        c.broadcast(Broadcast::new(Level::Info, "s", "hello"));
        c.broadcast(Broadcast::new(Level::Flush, "s", "out"));
        c.broadcast(Broadcast::new(Level::Error, "s", "bad"));
        assert_eq!(c.flushes(), vec!["out"]);
        assert_eq!(c.messages_at(Level::Error), vec!["bad"]);
        assert_eq!(c.take().len(), 3);
        assert!(c.take().is_empty());
    }

    #[test]
    fn collector_records_hurls() {
        let c = Collector::new();
        let mut p = Payload::new();
        p.insert("id".into(), Value::from_number(1));
        c.hurl("s", p.clone());
        assert_eq!(c.hurls(), vec![p]);
    }

    #[test]
    fn broadcast_display() {
        let b = Broadcast::new(Level::Warning, "greet:3", "odd");
        assert_eq!(b.to_string(), "[warning] greet:3: odd");
    }

    #[tokio::test]
    async fn channel_broadcaster_delivers_in_order() {
        let (tx, mut rx) = ChannelBroadcaster::new();
        tx.broadcast(Broadcast::new(Level::Flush, "s", "one"));
        tx.hurl("s", Payload::new());
        assert!(matches!(rx.recv().await, Some(Emitted::Broadcast(b)) if b.message == "one"));
        assert!(matches!(rx.recv().await, Some(Emitted::Hurl { .. })));
    }
}
