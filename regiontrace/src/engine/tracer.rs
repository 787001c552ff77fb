//! # Tracer
//!
//! The hook context. A [`Tracer`] decides, once per call event, whether a frame
//! is instrumented. Instrumented frames get an [`ActiveFrame`] that forwards
//! the matching `region_end` when the frame returns.
//!
//! ## Dispatch
//!
//! - **Call** → `global_trace`: skip when disabled, unhooked, or when the frame
//!   is the tracer's own teardown; otherwise `region_begin` and hand back an
//!   `ActiveFrame`
//! - **Return** on an `ActiveFrame` → `region_end`
//! - Everything else is ignored
//!
//! Pairs nest in LIFO order because the host reports calls and returns in
//! stack order.

use log::{debug, warn};
use regiontrace_common::{name_of, EventKind, RegionId, SourceLocation};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::dispatch;
use super::state::{StateCell, TraceState};
use crate::backend::Backend;
use crate::domain::{BackendError, ExecError, Namespace};
use crate::registry::ModuleRegistry;

/// Module the tracer reports its own frames under
pub const OWN_MODULE: &str = "regiontrace.engine";

/// Unit name of the tracer's teardown routine
pub const UNREGISTER_UNIT: &str = "unregister";

/// What to do when the backend fails a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FailurePolicy {
    /// Return the error to the instrumented program
    #[default]
    Abort,
    /// Log the error and keep going
    Skip,
}

#[derive(Debug, Clone, Copy)]
pub struct TracerOptions {
    /// When false the tracer never hooks anything
    pub enabled: bool,
    pub failure_policy: FailurePolicy,
}

impl Default for TracerOptions {
    fn default() -> Self {
        Self { enabled: true, failure_policy: FailurePolicy::Abort }
    }
}

/// A unit of target code run under [`Tracer::run_ctx`]
pub trait Program {
    fn exec(&self, globals: &mut Namespace, locals: &mut Namespace) -> Result<(), ExecError>;
}

struct Inner {
    backend: Arc<dyn Backend>,
    registry: ModuleRegistry,
    options: TracerOptions,
    state: StateCell,
    hooked: AtomicBool,
    generation: AtomicU64,
}

/// Hook context, cheap to clone
#[derive(Clone)]
pub struct Tracer {
    inner: Arc<Inner>,
}

impl Tracer {
    /// Create a tracer. Its own crate is recorded as a loaded module.
    pub fn new(backend: Arc<dyn Backend>, registry: ModuleRegistry, options: TracerOptions) -> Self {
        registry.insert(env!("CARGO_CRATE_NAME"));
        Self {
            inner: Arc::new(Inner {
                backend,
                registry,
                options,
                state: StateCell::new(),
                hooked: AtomicBool::new(false),
                generation: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    #[must_use]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn options(&self) -> TracerOptions {
        self.inner.options
    }

    #[must_use]
    pub fn state(&self) -> TraceState {
        self.inner.state.get()
    }

    #[must_use]
    pub fn is_hooked(&self) -> bool {
        self.inner.hooked.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same tracer
    pub(crate) fn same_as(&self, other: &Tracer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether a hook installed during `generation` still observes events
    pub(crate) fn is_live(&self, generation: u64) -> bool {
        self.is_hooked() && self.inner.generation.load(Ordering::Acquire) == generation
    }

    /// Install the hook on the calling thread
    ///
    /// Threads attached afterwards through [`dispatch::ThreadHook`] or
    /// [`dispatch::spawn`] share it. Not idempotent: a second call without
    /// `unregister` starts a new generation and detaches every other thread.
    pub fn register(&self) {
        if !self.inner.options.enabled {
            debug!("tracing disabled, not registering");
            return;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if self.inner.hooked.swap(true, Ordering::AcqRel) {
            warn!("tracer registered twice without unregister, starting generation {generation}");
        }
        self.inner.state.set(TraceState::Registered);
        dispatch::install(self.clone(), generation);
        debug!("tracer registered (generation {generation})");
    }

    /// Remove the hook from every thread
    ///
    /// Frames still open at this point never get their end event.
    pub fn unregister(&self) {
        if !self.inner.options.enabled {
            return;
        }

        // The teardown routine is a traced code unit like any other.
        let own = dispatch::call(Some(OWN_MODULE), UNREGISTER_UNIT);
        debug_assert!(matches!(own, Ok(None)));

        self.inner.hooked.store(false, Ordering::Release);
        dispatch::uninstall(self);
        self.inner.state.set(TraceState::Unregistered);
        debug!("tracer unregistered");
    }

    /// Run `program` with the hook installed, removing it on every exit path
    pub fn run_ctx<P: Program + ?Sized>(
        &self,
        program: &P,
        globals: &mut Namespace,
        locals: &mut Namespace,
    ) -> Result<(), ExecError> {
        let _activation = self.activate();
        program.exec(globals, locals)
    }

    /// Run a closure with the hook installed, removing it on every exit path
    pub fn run_fn<R>(&self, f: impl FnOnce() -> R) -> R {
        let _activation = self.activate();
        f()
    }

    fn activate(&self) -> Activation<'_> {
        self.register();
        Activation { tracer: self }
    }

    /// Handle a frame event on the top-level dispatcher
    ///
    /// Returns the frame's local handler when the frame is instrumented.
    pub fn global_trace(
        &self,
        module: Option<&str>,
        unit: &str,
        kind: EventKind,
    ) -> Result<Option<ActiveFrame>, BackendError> {
        self.global_trace_at(module, unit, kind, None)
    }

    /// [`Tracer::global_trace`] for a frame whose definition site is known
    pub fn global_trace_at(
        &self,
        module: Option<&str>,
        unit: &str,
        kind: EventKind,
        location: Option<&SourceLocation>,
    ) -> Result<Option<ActiveFrame>, BackendError> {
        if kind != EventKind::Call || !self.inner.options.enabled || !self.is_hooked() {
            return Ok(None);
        }
        if module == Some(OWN_MODULE) && unit == UNREGISTER_UNIT {
            return Ok(None);
        }

        let generation = self.inner.generation.load(Ordering::Acquire);
        let region = name_of(module, unit);
        let begun = match location {
            Some(location) => self.inner.backend.region_begin_at(&region, location),
            None => self.inner.backend.region_begin(&region),
        };
        if let Err(err) = begun {
            // A skipped begin gets no handler, so no unmatched end follows.
            return self.on_backend_error(err).map(|()| None);
        }
        self.inner.state.mark_active();

        Ok(Some(ActiveFrame { tracer: self.clone(), region, generation }))
    }

    fn local_trace(&self, frame: &ActiveFrame, kind: EventKind) -> Result<(), BackendError> {
        if kind != EventKind::Return || !self.is_live(frame.generation) {
            return Ok(());
        }
        self.inner
            .backend
            .region_end(&frame.region)
            .or_else(|err| self.on_backend_error(err))
    }

    pub(crate) fn on_backend_error(&self, err: BackendError) -> Result<(), BackendError> {
        match self.inner.options.failure_policy {
            FailurePolicy::Abort => Err(err),
            FailurePolicy::Skip => {
                warn!("ignoring backend failure: {err}");
                Ok(())
            }
        }
    }
}

/// Unregisters on drop
struct Activation<'a> {
    tracer: &'a Tracer,
}

impl Drop for Activation<'_> {
    fn drop(&mut self) {
        self.tracer.unregister();
    }
}

/// Local handler bound to one instrumented activation
pub struct ActiveFrame {
    tracer: Tracer,
    region: RegionId,
    generation: u64,
}

impl ActiveFrame {
    #[must_use]
    pub fn region(&self) -> &RegionId {
        &self.region
    }

    /// Deliver a frame event. Only `Return` reaches the backend.
    pub fn event(&self, kind: EventKind) -> Result<(), BackendError> {
        self.tracer.local_trace(self, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    fn tracer_with(backend: &Arc<RecordingBackend>, options: TracerOptions) -> Tracer {
        Tracer::new(backend.clone(), ModuleRegistry::new(), options)
    }

    #[test]
    fn test_lifecycle_states() {
        let backend = Arc::new(RecordingBackend::new("/tmp"));
        let tracer = tracer_with(&backend, TracerOptions::default());
        assert_eq!(tracer.state(), TraceState::Inactive);

        tracer.register();
        assert_eq!(tracer.state(), TraceState::Registered);

        let frame = tracer.global_trace(Some("m"), "f", EventKind::Call).unwrap();
        assert_eq!(tracer.state(), TraceState::Active);
        frame.unwrap().event(EventKind::Return).unwrap();

        tracer.unregister();
        assert_eq!(tracer.state(), TraceState::Unregistered);
        assert!(!tracer.is_hooked());
    }

    #[test]
    fn test_only_call_events_open_frames() {
        let backend = Arc::new(RecordingBackend::new("/tmp"));
        let tracer = tracer_with(&backend, TracerOptions::default());
        tracer.register();
        for kind in [EventKind::Return, EventKind::Line, EventKind::Exception, EventKind::Other] {
            assert!(tracer.global_trace(Some("m"), "f", kind).unwrap().is_none());
        }
        tracer.unregister();
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_local_handler_ignores_non_return_events() {
        let backend = Arc::new(RecordingBackend::new("/tmp"));
        let tracer = tracer_with(&backend, TracerOptions::default());
        tracer.register();
        let frame = tracer.global_trace(Some("m"), "f", EventKind::Call).unwrap().unwrap();
        frame.event(EventKind::Line).unwrap();
        frame.event(EventKind::Exception).unwrap();
        frame.event(EventKind::Return).unwrap();
        tracer.unregister();
        assert_eq!(backend.trail(), vec!["+m:f", "-m:f"]);
    }

    #[test]
    fn test_own_teardown_is_declined() {
        let backend = Arc::new(RecordingBackend::new("/tmp"));
        let tracer = tracer_with(&backend, TracerOptions::default());
        tracer.register();
        let own = tracer.global_trace(Some(OWN_MODULE), UNREGISTER_UNIT, EventKind::Call).unwrap();
        assert!(own.is_none());
        tracer.unregister();
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_disabled_tracer_never_hooks() {
        let backend = Arc::new(RecordingBackend::new("/tmp"));
        let tracer = tracer_with(&backend, TracerOptions { enabled: false, ..Default::default() });
        tracer.register();
        assert!(!tracer.is_hooked());
        assert!(tracer.global_trace(Some("m"), "f", EventKind::Call).unwrap().is_none());
        assert_eq!(tracer.state(), TraceState::Inactive);
    }

    #[test]
    fn test_abort_policy_propagates() {
        let backend = Arc::new(RecordingBackend::new("/tmp").failing_on("m:bad"));
        let tracer = tracer_with(&backend, TracerOptions::default());
        tracer.register();
        let err = tracer.global_trace(Some("m"), "bad", EventKind::Call).err();
        tracer.unregister();
        assert!(matches!(err, Some(BackendError::Rejected { .. })));
    }

    #[test]
    fn test_skip_policy_never_emits_unmatched_end() {
        let backend = Arc::new(RecordingBackend::new("/tmp").failing_on("m:bad"));
        let options = TracerOptions { failure_policy: FailurePolicy::Skip, ..Default::default() };
        let tracer = tracer_with(&backend, options);
        tracer.register();
        let frame = tracer.global_trace(Some("m"), "bad", EventKind::Call).unwrap();
        assert!(frame.is_none());
        tracer.unregister();
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_end_dropped_after_unregister() {
        let backend = Arc::new(RecordingBackend::new("/tmp"));
        let tracer = tracer_with(&backend, TracerOptions::default());
        tracer.register();
        let frame = tracer.global_trace(Some("m"), "f", EventKind::Call).unwrap().unwrap();
        tracer.unregister();
        frame.event(EventKind::Return).unwrap();
        assert_eq!(backend.trail(), vec!["+m:f"]);
    }

    #[test]
    fn test_new_registers_own_crate() {
        let registry = ModuleRegistry::new();
        let _tracer = Tracer::new(
            Arc::new(RecordingBackend::new("/tmp")),
            registry.clone(),
            TracerOptions::default(),
        );
        assert!(registry.contains("regiontrace"));
    }
}
