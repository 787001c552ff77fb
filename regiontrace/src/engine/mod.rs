//! Event hook engine
//!
//! - `tracer`: the hook context and its call/return state machine
//! - `dispatch`: per-thread slot, host entry points, thread propagation
//! - `state`: lifecycle of a tracer
//!
//! Native Rust code reports its own frames with [`traced!`](crate::traced):
//!
//! ```ignore
//! fn compute() -> Result<(), regiontrace::domain::BackendError> {
//!     let frame = regiontrace::traced!("compute")?;
//!     // ...
//!     frame.exit()
//! }
//! ```

pub mod dispatch;
pub mod state;
pub mod tracer;

pub use dispatch::{
    call, call_at, disable_recording, enable_recording, enter, enter_at, enter_module_path,
    enter_source, is_hooked, parameter, spawn, user_region, AttachGuard, FrameGuard, ThreadHook,
};
pub use state::TraceState;
pub use tracer::{
    ActiveFrame, FailurePolicy, Program, Tracer, TracerOptions, OWN_MODULE, UNREGISTER_UNIT,
};

/// Enter a frame named `$unit` in the calling Rust module, located at the
/// macro call site
#[macro_export]
macro_rules! traced {
    ($unit:expr) => {
        $crate::engine::enter_source(module_path!(), $unit, file!(), line!())
    };
}
