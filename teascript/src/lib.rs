//! TEAScript: a line-oriented scripting engine for chat automation.
//!
//! Scripts are compiled once by [`script::compile`] and run as many times as
//! needed through [`script::Invocation`]. The host owns scheduling
//! ([`process::Scheduler`]) and decides where diagnostics go
//! ([`broadcast::Broadcaster`]).

pub mod broadcast;
pub mod cli;
pub mod config;
pub mod pattern;
pub mod process;
pub mod script;
pub mod special;
