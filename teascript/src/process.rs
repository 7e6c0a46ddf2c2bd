//! Host-side scheduling: suspended invocations and periodic scripts.
//!
//! [`Scheduler`] holds every pending [`Job`] and knows when the next one is
//! due (for use as a `tokio::time::sleep_until` deadline).  The host loop
//! calls [`Scheduler::run_ready`] each tick; it resumes sleeping
//! invocations, starts periodic scripts whose interval has elapsed, and
//! files any new suspensions back under their own id.
//!
//! Everything runs on the caller's thread, so a parked invocation holding
//! the storage lock cannot release it while another one waits for it.
//! Invocations driven here therefore never wait on the lock: `storage:open`
//! reports a busy lock and the script carries on.
//!
//! ```rust,ignore
//! # use teascript::process::Scheduler;
//! # use tokio::time::{sleep_until, Instant};
//! # let mut sched = Scheduler::new();
//! loop {
//!     let Some(deadline) = sched.next_wakeup() else { break };
//!     sleep_until(deadline).await;
//!     sched.run_ready(Instant::now());
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::script::{CompiledScript, Invocation, InvocationInputs, Outcome, Suspension};

// ── Job ───────────────────────────────────────────────────────────────────────

/// What a scheduled entry does when it fires.
pub enum Job {
    /// Continue an invocation paused by `sleep`.
    Resume(Suspension),
    /// Start a fresh invocation every `interval`.
    Periodic {
        script: Arc<CompiledScript>,
        inputs: InvocationInputs,
        interval: Duration,
    },
}

impl Job {
    pub fn script_name(&self) -> &str {
        match self {
            Job::Resume(s) => s.script().name(),
            Job::Periodic { script, .. } => script.name(),
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Resume(s) => f.debug_struct("Resume").field("script", &s.script().name()).field("cursor", &s.cursor()).finish(),
            Job::Periodic { script, interval, .. } => {
                f.debug_struct("Periodic").field("script", &script.name()).field("interval", interval).finish()
            }
        }
    }
}

/// A single scheduled job.
#[derive(Debug)]
pub struct Entry {
    /// Scheduler-assigned id, stable across resumptions.
    pub id: u32,
    pub job: Job,
    pub next_run: Instant,
}

// ── Scheduler ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Scheduler {
    entries: Vec<Entry>,
    next_id: u32,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self { entries: Vec::new(), next_id: 1 }
    }

    fn mint(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Park a suspension until its delay has elapsed from `now`.
    pub fn add_suspension(&mut self, suspension: Suspension, now: Instant) -> u32 {
        let id = self.mint();
        self.park(id, suspension, now);
        id
    }

    fn park(&mut self, id: u32, mut suspension: Suspension, now: Instant) {
        suspension.context_mut().set_lock_wait(Duration::ZERO);
        let next_run = now + suspension.delay();
        tracing::debug!(id, script = %suspension.script().name(), delay = ?suspension.delay(), "parked");
        self.entries.push(Entry { id, job: Job::Resume(suspension), next_run });
    }

    /// Register a periodic script.  Returns `None` if the script declares no
    /// interval.  The first run is one interval after `now`.
    pub fn add_periodic(&mut self, script: Arc<CompiledScript>, inputs: InvocationInputs, now: Instant) -> Option<u32> {
        let seconds = script.triggers().interval;
        if seconds == 0 {
            return None;
        }
        let interval = Duration::from_secs(seconds);
        let id = self.mint();
        tracing::debug!(id, script = %script.name(), ?interval, "periodic registered");
        self.entries.push(Entry { id, job: Job::Periodic { script, inputs, interval }, next_run: now + interval });
        Some(id)
    }

    /// Remove an entry by id.  A cancelled suspension releases any storage
    /// lock it holds.  Returns `true` if found.
    pub fn cancel(&mut self, id: u32) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = self.entries.remove(pos);
        if let Job::Resume(s) = entry.job {
            s.cancel();
        }
        true
    }

    /// Cancel everything.
    pub fn cancel_all(&mut self) {
        for entry in self.entries.drain(..) {
            if let Job::Resume(s) = entry.job {
                s.cancel();
            }
        }
    }

    /// The soonest `next_run`, or `None` if nothing is scheduled.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.next_run).min()
    }

    /// Remove and return all entries whose `next_run <= now`.
    pub fn take_ready(&mut self, now: Instant) -> Vec<Entry> {
        let (ready, pending): (Vec<Entry>, Vec<Entry>) = self.entries.drain(..).partition(|e| e.next_run <= now);
        self.entries = pending;
        ready
    }

    /// Run every due entry.  A resumed invocation that sleeps again keeps
    /// its id; a periodic run that sleeps gets a new one.  Returns the
    /// outcomes of invocations that completed.
    pub fn run_ready(&mut self, now: Instant) -> Vec<(u32, Outcome)> {
        let mut done = Vec::new();
        for Entry { id, job, next_run } in self.take_ready(now) {
            match job {
                Job::Resume(s) => match s.resume() {
                    Outcome::Suspended(again) => self.park(id, again, now),
                    completed => done.push((id, completed)),
                },
                Job::Periodic { script, inputs, interval } => {
                    // Counted from when this run was due, not from `now`.
                    let mut following = next_run + interval;
                    let mut skipped = 0u32;
                    while following <= now {
                        following += interval;
                        skipped += 1;
                    }
                    if skipped > 0 {
                        tracing::warn!(id, script = %script.name(), skipped, "periodic runs skipped");
                    }
                    if let Ok(mut inv) = Invocation::new(Arc::clone(&script), inputs.clone(), "") {
                        inv.context_mut().set_lock_wait(Duration::ZERO);
                        match inv.run() {
                            Outcome::Suspended(s) => {
                                self.add_suspension(s, now);
                            }
                            completed => done.push((id, completed)),
                        }
                    }
                    self.entries.push(Entry { id, job: Job::Periodic { script, inputs, interval }, next_run: following });
                }
            }
        }
        done
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{Collector, Level};
    use crate::config::EngineConfig;
    use crate::script::{compile, MemoryStorage, Storage};

    fn script(src: &str) -> Arc<CompiledScript> {
        Arc::new(compile(src, "t", &*Collector::new()).unwrap())
    }

    fn suspend(src: &str, inputs: InvocationInputs) -> Suspension {
        match Invocation::new(script(src), inputs, "").unwrap().run() {
            Outcome::Suspended(s) => s,
            other => panic!("expected suspension, got {other:?}"),
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn next_wakeup_none_when_empty() {
        assert!(Scheduler::new().next_wakeup().is_none());
    }

    #[test]
    fn suspension_due_after_delay() {
        let sink = Collector::new();
        let mut s = Scheduler::new();
        let now = Instant::now();
        s.add_suspension(suspend("sleep 5\nwrite later\nend", InvocationInputs::new(sink.clone())), now);
        assert_eq!(s.next_wakeup(), Some(now + secs(5)));
        assert!(s.run_ready(now + secs(4)).is_empty());
        assert!(sink.flushes().is_empty());

        let done = s.run_ready(now + secs(5));
        assert_eq!(done.len(), 1);
        assert!(done[0].1.is_completed());
        assert_eq!(sink.flushes(), vec!["later"]);
        assert!(s.is_empty());
    }

    #[test]
    fn resleeping_keeps_its_id() {
        let sink = Collector::new();
        let mut s = Scheduler::new();
        let now = Instant::now();
        let id = s.add_suspension(suspend("sleep 1\nsleep 2\nend", InvocationInputs::new(sink)), now);
        let later = now + secs(1);
        assert!(s.run_ready(later).is_empty());
        assert_eq!(s.iter().map(|e| e.id).collect::<Vec<_>>(), vec![id]);
        assert_eq!(s.next_wakeup(), Some(later + secs(2)));
    }

    #[test]
    fn periodic_requires_interval() {
        let mut s = Scheduler::new();
        assert!(s.add_periodic(script("end"), InvocationInputs::default(), Instant::now()).is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn periodic_reschedules_without_drift() {
        let sink = Collector::new();
        let mut s = Scheduler::new();
        let now = Instant::now();
        let id = s
            .add_periodic(script("periodic 60\nwrite tick\nend"), InvocationInputs::new(sink.clone()), now)
            .unwrap();
        // Fired late; the next run is still on the original cadence.
        let done = s.run_ready(now + secs(65));
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].0, id);
        assert_eq!(sink.flushes(), vec!["tick"]);
        assert_eq!(s.next_wakeup(), Some(now + secs(120)));
    }

    #[test]
    fn periodic_sleep_is_parked_separately() {
        let sink = Collector::new();
        let mut s = Scheduler::new();
        let now = Instant::now();
        s.add_periodic(script("periodic 10\nsleep 3\nwrite woke\nend"), InvocationInputs::new(sink.clone()), now);
        assert!(s.run_ready(now + secs(10)).is_empty());
        assert_eq!(s.len(), 2);
        s.run_ready(now + secs(13));
        assert_eq!(sink.flushes(), vec!["woke"]);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn cancel_releases_storage_lock() {
        let storage = MemoryStorage::new();
        let inputs = InvocationInputs::new(Collector::new()).storage(storage.clone());
        let mut s = Scheduler::new();
        let id = s.add_suspension(suspend("storage:open prefs\nsleep 30\nend", inputs), Instant::now());
        assert!(storage.acquire_lock(Duration::from_millis(10)).is_err());
        assert!(s.cancel(id));
        assert!(!s.cancel(id));
        let token = storage.acquire_lock(Duration::from_millis(10)).unwrap();
        storage.release_lock(&token).unwrap();
    }

    #[test]
    fn busy_lock_does_not_stall_the_loop() {
        let sink = Collector::new();
        let storage = MemoryStorage::new();
        let config = EngineConfig { lock_timeout: secs(5), ..EngineConfig::default() };
        let inputs = InvocationInputs::with_config(sink.clone(), Arc::new(config)).storage(storage.clone());
        let src = "periodic 1\nstorage:open \"db\nsleep 30\nstorage:close\nend";
        let mut s = Scheduler::new();
        let t0 = Instant::now();
        let periodic = s.add_periodic(script(src), inputs, t0).unwrap();

        s.run_ready(t0 + secs(1));
        let started = std::time::Instant::now();
        s.run_ready(t0 + secs(2));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(sink.messages_at(Level::Error), vec!["storage:open: the storage lock is busy"]);

        // The holder still finishes and hands the lock back.
        assert!(s.cancel(periodic));
        sink.take();
        s.run_ready(t0 + secs(31));
        assert!(sink.messages_at(Level::Error).iter().all(|e| !e.contains("storage:close")));
        let token = storage.acquire_lock(Duration::ZERO).unwrap();
        storage.release_lock(&token).unwrap();
    }

    #[test]
    fn periodic_skips_missed_ticks() {
        let sink = Collector::new();
        let mut s = Scheduler::new();
        let now = Instant::now();
        s.add_periodic(script("periodic 60\nwrite tick\nend"), InvocationInputs::new(sink.clone()), now);
        assert_eq!(s.run_ready(now + secs(350)).len(), 1);
        assert_eq!(s.next_wakeup(), Some(now + secs(360)));
        assert!(s.run_ready(now + secs(351)).is_empty());
        assert_eq!(sink.flushes(), vec!["tick"]);
    }

    #[test]
    fn cancel_all_clears_everything() {
        let mut s = Scheduler::new();
        let now = Instant::now();
        s.add_periodic(script("periodic 5\nend"), InvocationInputs::default(), now);
        s.add_suspension(suspend("sleep 5\nend", InvocationInputs::default()), now);
        assert_eq!(s.len(), 2);
        s.cancel_all();
        assert!(s.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drives_from_tokio_timers() {
        let sink = Collector::new();
        let mut s = Scheduler::new();
        s.add_suspension(suspend("sleep 2\nwrite done\nend", InvocationInputs::new(sink.clone())), Instant::now());
        while let Some(deadline) = s.next_wakeup() {
            tokio::time::sleep_until(deadline).await;
            s.run_ready(Instant::now());
        }
        assert_eq!(sink.flushes(), vec!["done"]);
    }
}
