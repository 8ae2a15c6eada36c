//! Expression language: a small JavaScript-like interpreter used for
//! `{{ ... }}` placeholders and user-authored snippets.
//!
//! The evaluator is capability-scoped: code only sees the bindings it is
//! handed plus a fixed set of pure intrinsics (`JSON`, `Math`, `Object`, ...).
//! Execution is bounded by a step budget and a call-depth limit.

mod ast;
mod builtins;
mod compile;
mod error;
mod interpreter;
mod lexer;
mod parser;
mod sandbox;
mod value;

pub use compile::{compile, compile_object, compile_str};
pub(crate) use builtins::console_text;
pub use builtins::{console, install_globals, utils_object};
pub use error::ExprError;
pub use interpreter::{DEFAULT_STEP_BUDGET, Interpreter, MAX_CALL_DEPTH};
pub use sandbox::{CodeShape, UserCode};
pub use parser::MAX_NESTING_DEPTH;
pub use value::{Env, HostFn, MAX_VALUE_DEPTH, Object, Scope, Value};
