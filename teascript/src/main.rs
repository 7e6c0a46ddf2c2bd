use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

use teascript::broadcast::{Broadcast, Broadcaster, Level, Payload, SharedBroadcaster, TracingBroadcaster};
use teascript::cli::{self, CliArgs};
use teascript::config::EngineConfig;
use teascript::process::Scheduler;
use teascript::script::parser::report_failure;
use teascript::script::{compile_file, Invocation, InvocationInputs, MemoryListProvider, MemoryStorage, Outcome};

/// Flushed text goes to stdout, hurl payloads to stderr, everything else
/// to the log.
struct Console;

impl Broadcaster for Console {
    fn broadcast(&self, msg: Broadcast) {
        if msg.level == Level::Flush {
            println!("{}", msg.message);
        } else {
            TracingBroadcaster.broadcast(msg);
        }
    }

    fn hurl(&self, context: &str, payload: Payload) {
        let fields: Vec<String> = payload.iter().map(|(k, v)| format!("{k}={v}")).collect();
        eprintln!("hurl {context}: {}", fields.join(" "));
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "warn,teascript=debug" } else { "warn,teascript=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

fn load_config(args: &CliArgs) -> EngineConfig {
    let Some(path) = cli::resolve_config(&args.config) else {
        return EngineConfig::default();
    };
    match EngineConfig::load_file(&path) {
        Ok((config, errors)) => {
            for e in errors {
                tracing::warn!(file = %path.display(), "{e}");
            }
            config
        }
        Err(e) => {
            tracing::warn!(file = %path.display(), "can't read settings: {e}");
            EngineConfig::default()
        }
    }
}

#[tokio::main]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("tea: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(2);
        }
    };
    init_logging(args.debug);

    let config = Arc::new(load_config(&args));
    let console: SharedBroadcaster = Arc::new(Console);

    // ── Compile every script ──────────────────────────────────────────────────
    let mut scripts = Vec::with_capacity(args.scripts.len());
    let mut failed = false;
    for path in &args.scripts {
        match compile_file(path, &*console) {
            Ok(s) => scripts.push(Arc::new(s)),
            Err(e) => {
                report_failure(&e, &*console);
                failed = true;
            }
        }
    }
    if failed {
        std::process::exit(1);
    }
    if args.check_only {
        for s in &scripts {
            println!("{}: ok ({} statements)", s.name(), s.statements().len());
        }
        return;
    }

    // ── Invoke the first script ───────────────────────────────────────────────
    let mut inputs = InvocationInputs::with_config(Arc::clone(&console), config)
        .storage(MemoryStorage::new())
        .lists(MemoryListProvider::new());
    if let Some(sender) = &args.sender {
        inputs = inputs.sender(sender.as_str());
    }
    if let Some(channel) = &args.channel {
        inputs = inputs.channel(channel.as_str());
    }

    let mut sched = Scheduler::new();
    let now = Instant::now();
    if let Some(first) = scripts.first() {
        match Invocation::new(Arc::clone(first), inputs.clone(), &args.args) {
            Ok(mut inv) => {
                // Same thread as the scheduler; never wait on the lock.
                inv.context_mut().set_lock_wait(Duration::ZERO);
                if let Outcome::Suspended(s) = inv.run() {
                    sched.add_suspension(s, now);
                }
            }
            Err(_) => std::process::exit(1),
        }
    }
    if args.periodic {
        for s in &scripts {
            sched.add_periodic(Arc::clone(s), inputs.clone(), now);
        }
    }

    // ── Wait out sleeps and periodic runs ─────────────────────────────────────
    while let Some(deadline) = sched.next_wakeup() {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                sched.run_ready(Instant::now());
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(pending = sched.len(), "interrupted");
                sched.cancel_all();
                break;
            }
        }
    }
}
