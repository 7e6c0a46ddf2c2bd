//! TEAScript: compile once, invoke many times.
//!
//! Scripts are line-oriented.  Each line is a keyword plus a tail whose
//! grammar the keyword defines; `@label` lines mark jump targets and `#`
//! lines are comments.  Metadata keywords (`script`, `command`, `required`,
//! …) shape the [`CompiledScript`]; every other keyword becomes a
//! [`Statement`] executed by the engine.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use teascript::broadcast::Collector;
//! use teascript::script::{compile, Invocation, InvocationInputs, Outcome};
//!
//! let sink = Collector::new();
//! let src = "command greet\nrequired !who\nwrite Hello, \nprint !who\nend";
//! let script = Arc::new(compile(src, "greet", &*sink).unwrap());
//!
//! let inv = Invocation::new(script, InvocationInputs::new(sink.clone()), "world").unwrap();
//! assert!(matches!(inv.run(), Outcome::Completed { .. }));
//! assert_eq!(sink.flushes(), vec!["Hello, world"]);
//! ```

pub mod args;
pub mod bind;
pub mod compiled;
pub mod exec;
pub mod interp;
pub mod list;
pub mod meta;
pub mod name;
pub mod parser;
pub mod registry;
pub mod stmt;
pub mod storage;
pub mod validate;
pub mod value;
pub mod values;

// Re-exports for convenience.
pub use bind::BindError;
pub use compiled::{CompiledScript, ParamSpec, ParamType, Triggers};
pub use interp::{Context, ControlFlow, Invocation, InvocationInputs, Outcome, Suspension, Termination};
pub use list::{ListProvider, MemoryListProvider, NamedList, Record};
pub use name::{Scope, ValueName};
pub use parser::{compile, compile_file, CompileError, LineError};
pub use stmt::Statement;
pub use storage::{LockToken, MemoryStorage, Storage, StorageError};
pub use value::Value;
pub use values::ValueMap;
