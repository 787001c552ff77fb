//! # regiontrace - Call-Graph Instrumentation Layer
//!
//! regiontrace observes every call and return a running program makes, on
//! every registered thread, and reports each activation as a timed *region*
//! to a measurement backend. The backend reconstructs call trees and timings;
//! the instrumented program carries no measurement code of its own.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Host (running program)                      │
//! │         call script interpreter  /  traced!() in Rust           │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ (module, unit, call|return|line|...)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Event Hook Engine                          │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │  Dispatch    │──▶│    Tracer    │──▶│ Region Namer │         │
//! │  │ (per thread) │   │ (call/return)│   │ module:unit  │         │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘         │
//! └────────────────────────────┼────────────────────────────────────┘
//!                              │ region_begin / region_end
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          Backend (Chrome trace, recording, streaming)           │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ experiment directory
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │   Runner shutdown: scorep.fgp (one group per loaded module)     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`engine`]: the tracer context, per-thread dispatch, scoped activation
//! - [`backend`]: the [`backend::Backend`] trait and the shipped backends
//! - [`function_groups`]: writer for the function group filter file
//! - [`registry`]: the set of modules loaded by the host
//! - [`host`]: the call-script format and its interpreter
//! - [`runner`]: runs a script under the tracer and owns shutdown
//! - [`config`], [`cli`]: command-line configuration
//! - [`domain`]: errors and small shared types
//!
//! ## Guarantees
//!
//! - Begin/end pairs nest in stack order on each thread
//! - The hook is removed on every exit path of a scoped activation
//! - The tracer never instruments its own teardown
//! - The function group file is written once, in reverse lexicographic order
//!
//! ## Typical Usage
//!
//! ```bash
//! regiontrace app.json
//! RUST_LOG=debug regiontrace --print --experiment-dir out app.json
//! regiontrace --print regiontrace/examples/pipeline.json
//! ```
//!
//! `examples/pipeline.json` is a sample call script touching imports, worker
//! threads, handled exceptions, user regions and the recording switch.

pub mod backend;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod function_groups;
pub mod host;
pub mod registry;
pub mod runner;

pub use regiontrace_common::{name_of, EventKind, RegionId, SourceLocation};
