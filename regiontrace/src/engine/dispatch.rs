//! Per-thread dispatch
//!
//! Every thread has one slot holding the tracer it reports to. Hosts call
//! [`call`] (or [`enter`] for RAII frames) at each call boundary; the slot
//! turns inert by itself once its tracer is unregistered.

use log::error;
use regiontrace_common::{EventKind, ParamValue, SourceLocation, USER_MODULE};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::thread::JoinHandle;

use super::tracer::{ActiveFrame, Tracer};
use crate::domain::BackendError;

#[derive(Clone)]
pub(crate) struct Installed {
    tracer: Tracer,
    generation: u64,
}

impl Installed {
    fn is_live(&self) -> bool {
        self.tracer.is_live(self.generation)
    }
}

thread_local! {
    static SLOT: RefCell<Option<Installed>> = const { RefCell::new(None) };
}

/// Point the calling thread at `tracer`, returning what the slot held before
pub(crate) fn install(tracer: Tracer, generation: u64) -> Option<Installed> {
    SLOT.with(|slot| slot.borrow_mut().replace(Installed { tracer, generation }))
}

/// Clear the calling thread's slot if it belongs to `owner`
///
/// A slot taken over by another tracer is left alone.
pub(crate) fn uninstall(owner: &Tracer) {
    SLOT.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.as_ref().is_some_and(|installed| installed.tracer.same_as(owner)) {
            *slot = None;
        }
    });
}

fn restore(previous: Option<Installed>) {
    SLOT.with(|slot| *slot.borrow_mut() = previous);
}

/// Tracer the calling thread reports to, clearing a stale slot
fn current() -> Option<Tracer> {
    SLOT.with(|slot| {
        let mut slot = slot.borrow_mut();
        match slot.as_ref() {
            Some(installed) if installed.is_live() => Some(installed.tracer.clone()),
            Some(_) => {
                *slot = None;
                None
            }
            None => None,
        }
    })
}

/// Whether the calling thread is currently observed
#[must_use]
pub fn is_hooked() -> bool {
    current().is_some()
}

/// Report a call event for the calling thread
///
/// Returns the frame's local handler when the frame is instrumented; the host
/// delivers the frame's remaining events (at least its `Return`) to it.
pub fn call(module: Option<&str>, unit: &str) -> Result<Option<ActiveFrame>, BackendError> {
    call_at(module, unit, None)
}

/// [`call`] carrying the unit's definition site to the backend
pub fn call_at(
    module: Option<&str>,
    unit: &str,
    location: Option<&SourceLocation>,
) -> Result<Option<ActiveFrame>, BackendError> {
    match current() {
        Some(tracer) => tracer.global_trace_at(module, unit, EventKind::Call, location),
        None => Ok(None),
    }
}

/// RAII frame for native Rust code
///
/// Delivers `Return` on [`FrameGuard::exit`] or, failing that, on drop. Drop
/// cannot propagate a backend error, it only logs it.
#[must_use = "the frame returns as soon as the guard is dropped"]
pub struct FrameGuard {
    frame: Option<ActiveFrame>,
}

impl FrameGuard {
    #[must_use]
    pub fn is_instrumented(&self) -> bool {
        self.frame.is_some()
    }

    /// Deliver a non-terminal event (line, exception, ...) to the frame
    pub fn event(&self, kind: EventKind) -> Result<(), BackendError> {
        match &self.frame {
            Some(frame) => frame.event(kind),
            None => Ok(()),
        }
    }

    /// Return from the frame, surfacing backend errors
    pub fn exit(mut self) -> Result<(), BackendError> {
        match self.frame.take() {
            Some(frame) => frame.event(EventKind::Return),
            None => Ok(()),
        }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            if let Err(err) = frame.event(EventKind::Return) {
                error!("failed to close region {}: {err}", frame.region());
            }
        }
    }
}

/// Enter a frame of `unit` in `module`
///
/// The module is recorded as loaded, the same way an import would.
pub fn enter(module: Option<&str>, unit: &str) -> Result<FrameGuard, BackendError> {
    enter_at(module, unit, None)
}

/// [`enter`] with the unit's definition site
pub fn enter_at(
    module: Option<&str>,
    unit: &str,
    location: Option<&SourceLocation>,
) -> Result<FrameGuard, BackendError> {
    if let (Some(tracer), Some(module)) = (current(), module) {
        tracer.registry().insert(module);
    }
    Ok(FrameGuard { frame: call_at(module, unit, location)? })
}

/// [`enter`] with a Rust module path (`a::b` is reported as `a.b`)
pub fn enter_module_path(path: &str, unit: &str) -> Result<FrameGuard, BackendError> {
    enter_at(Some(&path.replace("::", ".")), unit, None)
}

/// [`enter_module_path`] for code at `file:line`, as used by [`traced!`](crate::traced)
pub fn enter_source(path: &str, unit: &str, file: &str, line: u32) -> Result<FrameGuard, BackendError> {
    enter_at(Some(&path.replace("::", ".")), unit, Some(&SourceLocation::new(file, line)))
}

/// Explicit user region, reported under the `user` module
pub fn user_region(name: &str) -> Result<FrameGuard, BackendError> {
    Ok(FrameGuard { frame: call(Some(USER_MODULE), name)? })
}

/// Resume recording in the backend of the calling thread's tracer
pub fn enable_recording() {
    if let Some(tracer) = current() {
        tracer.backend().enable_recording();
    }
}

/// Pause recording in the backend of the calling thread's tracer
pub fn disable_recording() {
    if let Some(tracer) = current() {
        tracer.backend().disable_recording();
    }
}

/// Attach a user parameter to the innermost open region
pub fn parameter(name: &str, value: &ParamValue) -> Result<(), BackendError> {
    match current() {
        Some(tracer) => tracer
            .backend()
            .parameter(name, value)
            .or_else(|err| tracer.on_backend_error(err)),
        None => Ok(()),
    }
}

/// Hook captured on one thread so another thread can join it
#[derive(Clone, Default)]
pub struct ThreadHook(Option<Installed>);

impl ThreadHook {
    /// The calling thread's hook, empty if it is not observed
    #[must_use]
    pub fn current() -> Self {
        SLOT.with(|slot| ThreadHook(slot.borrow().clone().filter(Installed::is_live)))
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.0.as_ref().is_some_and(Installed::is_live)
    }

    /// Install the captured hook on the calling thread until the guard drops
    ///
    /// The guard puts back whatever the thread reported to before, so
    /// attaching on an already hooked thread (a task run inline) keeps it
    /// hooked afterwards.
    pub fn attach(&self) -> AttachGuard {
        let previous = self
            .0
            .as_ref()
            .map(|installed| install(installed.tracer.clone(), installed.generation));
        AttachGuard { previous, _thread_bound: PhantomData }
    }
}

/// Restores the calling thread's previous slot on drop
#[must_use = "the thread is detached as soon as the guard is dropped"]
pub struct AttachGuard {
    /// `None` when nothing was attached
    previous: Option<Option<Installed>>,
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            restore(previous);
        }
    }
}

/// `std::thread::spawn` that carries the caller's hook into the new thread
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let hook = ThreadHook::current();
    std::thread::spawn(move || {
        let _attached = hook.attach();
        f()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::engine::TracerOptions;
    use crate::registry::ModuleRegistry;
    use std::sync::Arc;

    fn setup() -> (Arc<RecordingBackend>, Tracer) {
        let backend = Arc::new(RecordingBackend::new("/tmp"));
        let tracer = Tracer::new(backend.clone(), ModuleRegistry::new(), TracerOptions::default());
        (backend, tracer)
    }

    #[test]
    fn test_unhooked_thread_reports_nothing() {
        let (backend, _tracer) = setup();
        assert!(call(Some("m"), "f").unwrap().is_none());
        assert!(!is_hooked());
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_frame_guard_closes_on_drop() {
        let (backend, tracer) = setup();
        tracer.run_fn(|| {
            let _f = enter(Some("m"), "f").unwrap();
            let g = enter(Some("m"), "g").unwrap();
            g.exit().unwrap();
        });
        assert_eq!(backend.trail(), vec!["+m:f", "+m:g", "-m:g", "-m:f"]);
    }

    #[test]
    fn test_enter_records_module() {
        let (_backend, tracer) = setup();
        tracer.run_fn(|| {
            let _f = enter(Some("loaded_late"), "f").unwrap();
        });
        assert!(tracer.registry().contains("loaded_late"));
    }

    #[test]
    fn test_module_path_is_dotted() {
        let (backend, tracer) = setup();
        tracer.run_fn(|| {
            let _f = enter_module_path("app::io::disk", "read").unwrap();
        });
        assert_eq!(backend.trail(), vec!["+app.io.disk:read", "-app.io.disk:read"]);
    }

    #[test]
    fn test_user_region_and_parameters() {
        let (backend, tracer) = setup();
        tracer.run_fn(|| {
            let region = user_region("setup").unwrap();
            parameter("iterations", &ParamValue::Int(4)).unwrap();
            region.exit().unwrap();
        });
        assert_eq!(backend.trail(), vec!["+user:setup", "-user:setup"]);
        assert_eq!(backend.params(), vec![("iterations".to_string(), ParamValue::Int(4))]);
    }

    #[test]
    fn test_recording_switch_reaches_backend() {
        let (backend, tracer) = setup();
        tracer.run_fn(|| {
            disable_recording();
            let _hidden = enter(Some("m"), "hidden").unwrap().exit();
            enable_recording();
            let _shown = enter(Some("m"), "shown").unwrap().exit();
        });
        assert_eq!(backend.trail(), vec!["+m:shown", "-m:shown"]);
    }

    #[test]
    fn test_spawn_propagates_hook() {
        let (backend, tracer) = setup();
        tracer.run_fn(|| {
            spawn(|| {
                assert!(is_hooked());
                let _w = enter(Some("m"), "worker").unwrap();
            })
            .join()
            .unwrap();
        });
        assert_eq!(backend.trail(), vec!["+m:worker", "-m:worker"]);
    }

    #[test]
    fn test_spawn_outside_activation_is_unobserved() {
        let (backend, _tracer) = setup();
        spawn(|| {
            assert!(!is_hooked());
        })
        .join()
        .unwrap();
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_inline_attach_keeps_thread_hooked() {
        let (backend, tracer) = setup();
        tracer.run_fn(|| {
            {
                let _inline = ThreadHook::current().attach();
                enter(Some("m"), "inline").unwrap().exit().unwrap();
            }
            assert!(is_hooked());
            enter(Some("m"), "after").unwrap().exit().unwrap();
        });
        assert_eq!(backend.trail(), vec!["+m:inline", "-m:inline", "+m:after", "-m:after"]);
    }

    #[test]
    fn test_attach_restores_other_tracer() {
        let (backend_a, tracer_a) = setup();
        let (backend_b, tracer_b) = setup();
        tracer_a.register();
        let hook_a = ThreadHook::current();
        tracer_b.register();
        {
            let _a = hook_a.attach();
            enter(Some("m"), "for_a").unwrap().exit().unwrap();
        }
        enter(Some("m"), "for_b").unwrap().exit().unwrap();
        tracer_b.unregister();
        tracer_a.unregister();

        assert_eq!(backend_a.trail(), vec!["+m:for_a", "-m:for_a"]);
        assert_eq!(backend_b.trail(), vec!["+m:for_b", "-m:for_b"]);
    }

    #[test]
    fn test_unregister_leaves_other_tracer_slot() {
        let (backend_a, tracer_a) = setup();
        let (backend_b, tracer_b) = setup();
        tracer_a.register();
        tracer_b.register();
        tracer_a.unregister();

        assert!(tracer_b.is_hooked());
        assert!(is_hooked());
        enter(Some("m"), "f").unwrap().exit().unwrap();
        tracer_b.unregister();

        assert!(!is_hooked());
        assert!(backend_a.events().is_empty());
        assert_eq!(backend_b.trail(), vec!["+m:f", "-m:f"]);
    }

    #[test]
    fn test_unregister_detaches_other_threads() {
        let (backend, tracer) = setup();
        tracer.register();
        let hook = ThreadHook::current();
        assert!(hook.is_active());
        tracer.unregister();
        assert!(!hook.is_active());

        std::thread::spawn(move || {
            let _attached = hook.attach();
            assert!(!is_hooked());
        })
        .join()
        .unwrap();
        assert!(backend.events().is_empty());
    }
}
