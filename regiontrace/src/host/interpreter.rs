//! # Call-script interpreter
//!
//! Executes a [`Script`] and reports its frames through the engine's dispatch
//! entry points, the way a language runtime would:
//!
//! - every function call is a `Call`, every frame exit (normal or unwinding) a
//!   `Return`
//! - each statement delivers a `Line` to the current frame, `raise` an
//!   `Exception`
//! - the owning module of a frame is the `__name__` binding of the function's
//!   global namespace
//!
//! Calling a function loads its module into the registry.

use log::debug;
use regiontrace_common::EventKind;
use std::sync::atomic::{AtomicBool, Ordering};

use super::script::{Function, Script, Stmt};
use crate::domain::{ExecError, Namespace};
use crate::engine::{dispatch, ActiveFrame, Program, ThreadHook};
use crate::registry::ModuleRegistry;

/// Nesting limit before a call raises instead of recursing further
pub const MAX_DEPTH: usize = 128;

pub struct Interpreter<'a> {
    script: &'a Script,
    registry: &'a ModuleRegistry,
    stop: &'a AtomicBool,
}

/// Where a block executes
#[derive(Clone, Copy)]
struct Ctx<'f> {
    frame: Option<&'f ActiveFrame>,
    main_module: Option<&'f str>,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    /// `stop` is polled before every statement; once set, execution unwinds
    /// with [`ExecError::Interrupted`].
    #[must_use]
    pub fn new(script: &'a Script, registry: &'a ModuleRegistry, stop: &'a AtomicBool) -> Self {
        Self { script, registry, stop }
    }

    fn import(&self, module: &str) {
        if self.registry.insert(module) {
            debug!("imported {module}");
        }
    }

    fn exec_block(&self, body: &[Stmt], ctx: Ctx<'_>, locals: &mut Namespace) -> Result<(), ExecError> {
        for stmt in body {
            if self.stop.load(Ordering::Acquire) {
                return Err(ExecError::Interrupted);
            }
            if let Some(frame) = ctx.frame {
                frame.event(EventKind::Line)?;
            }

            match stmt {
                Stmt::Call(name) => self.call_function(name, ctx)?,
                Stmt::Import(module) => self.import(module),
                Stmt::Raise(message) => {
                    if let Some(frame) = ctx.frame {
                        frame.event(EventKind::Exception)?;
                    }
                    return Err(ExecError::Raised(message.clone()));
                }
                Stmt::Exit(code) => return Err(ExecError::Exit(*code)),
                Stmt::Try(block) => match self.exec_block(block, ctx, locals) {
                    Err(ExecError::Raised(message)) => debug!("handled exception: {message}"),
                    other => other?,
                },
                Stmt::Spawn(block) => self.spawn(block, ctx)?,
                Stmt::Assign { name, value } => locals.set(name.clone(), value.clone()),
                Stmt::Record(true) => dispatch::enable_recording(),
                Stmt::Record(false) => dispatch::disable_recording(),
                Stmt::Param { name, value } => dispatch::parameter(name, value)?,
                Stmt::Region { name, body } => {
                    let region = dispatch::user_region(name)?;
                    let result = self.exec_block(body, ctx, locals);
                    let closed = region.exit().map_err(ExecError::from);
                    result.and(closed)?;
                }
            }
        }
        Ok(())
    }

    fn call_function(&self, name: &str, ctx: Ctx<'_>) -> Result<(), ExecError> {
        let function = self
            .script
            .functions
            .get(name)
            .ok_or_else(|| ExecError::UnknownFunction(name.to_string()))?;
        if ctx.depth >= MAX_DEPTH {
            return Err(ExecError::Raised("maximum recursion depth exceeded".to_string()));
        }

        let globals = self.globals_of(function, ctx.main_module);
        let module = globals.module_name();
        if let Some(module) = module {
            self.import(module);
        }

        let frame = dispatch::call_at(module, name, function.location.as_ref())?;
        let inner = Ctx { frame: frame.as_ref(), main_module: ctx.main_module, depth: ctx.depth + 1 };
        let mut locals = Namespace::default();
        let result = self.exec_block(&function.body, inner, &mut locals);

        // The frame returns whether the body completed or is unwinding.
        let returned = match &frame {
            Some(frame) => frame.event(EventKind::Return).map_err(ExecError::from),
            None => Ok(()),
        };
        result.and(returned)
    }

    fn globals_of(&self, function: &Function, main_module: Option<&str>) -> Namespace {
        if function.anonymous {
            return Namespace::default();
        }
        match function.module.as_deref().or(main_module) {
            Some(module) => Namespace::module(module),
            None => Namespace::default(),
        }
    }

    fn spawn(&self, body: &[Stmt], ctx: Ctx<'_>) -> Result<(), ExecError> {
        let hook = ThreadHook::current();
        let main_module = ctx.main_module;
        std::thread::scope(|scope| {
            let worker = scope.spawn(move || {
                let _attached = hook.attach();
                let mut locals = Namespace::default();
                self.exec_block(body, Ctx { frame: None, main_module, depth: 0 }, &mut locals)
            });
            worker.join().map_err(|_| ExecError::WorkerPanicked)?
        })
    }
}

impl Program for Interpreter<'_> {
    fn exec(&self, globals: &mut Namespace, locals: &mut Namespace) -> Result<(), ExecError> {
        for module in &self.script.imports {
            self.import(module);
        }
        let main_module = globals.module_name().map(str::to_string);
        if let Some(main) = &main_module {
            self.import(main);
        }

        let ctx = Ctx { frame: None, main_module: main_module.as_deref(), depth: 0 };
        self.exec_block(&self.script.main, ctx, locals)
    }
}
