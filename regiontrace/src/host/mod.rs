//! Host execution environment
//!
//! The engine never inspects a running program itself; the host reports each
//! frame boundary as `(module, unit, event kind)`. This module provides the
//! call-script host the command-line tool runs. Native Rust code uses
//! [`traced!`](crate::traced) instead.

pub mod interpreter;
pub mod script;

pub use interpreter::Interpreter;
pub use script::{Function, Script, Stmt};
