//! # Controlled execution
//!
//! [`Runner`] runs a call script under the tracer and owns the shutdown
//! sequence:
//!
//! 1. scope-activate the tracer around the script ([`Tracer::run_ctx`])
//! 2. swallow the "stop everything" signals (`exit`, interrupt) so the host
//!    can still exit cleanly
//! 3. flush the function group file and finalize the backend, exactly once,
//!    whatever happened in step 1
//!
//! Dropping a runner that never finished runs step 3 as well.

use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::{ExecError, Namespace};
use crate::engine::Tracer;
use crate::function_groups;
use crate::host::{Interpreter, Script};

/// How a script run ended, when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The script asked to exit with this status
    Exited(i32),
    /// The stop flag was raised while the script ran
    Interrupted,
}

pub struct Runner {
    tracer: Tracer,
    stop: Arc<AtomicBool>,
    finished: AtomicBool,
}

impl Runner {
    #[must_use]
    pub fn new(tracer: Tracer) -> Self {
        Self { tracer, stop: Arc::new(AtomicBool::new(false)), finished: AtomicBool::new(false) }
    }

    #[must_use]
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Flag that interrupts the running script once set
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run `script` as the main program
    ///
    /// Errors other than exit and interrupt propagate, after the shutdown
    /// sequence ran.
    pub fn run_script(&self, script: &Script, path: &Path, argv: &[String]) -> Result<Outcome, ExecError> {
        let interpreter = Interpreter::new(script, self.tracer.registry(), &self.stop);
        let mut globals = Namespace::main(path, argv);
        let mut locals = Namespace::default();

        let result = self.tracer.run_ctx(&interpreter, &mut globals, &mut locals);
        let outcome = match result {
            Ok(()) => Ok(Outcome::Completed),
            Err(ExecError::Exit(code)) => {
                info!("script requested exit with status {code}");
                Ok(Outcome::Exited(code))
            }
            Err(ExecError::Interrupted) => {
                info!("script interrupted");
                Ok(Outcome::Interrupted)
            }
            Err(err) => Err(err),
        };

        self.finish();
        outcome
    }

    /// Flush the function group file and finalize the backend
    ///
    /// Runs once; later calls return `None`. Failures are logged, never
    /// returned, so they cannot hold up the host's exit.
    pub fn finish(&self) -> Option<PathBuf> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return None;
        }

        let backend = self.tracer.backend();
        let written = match function_groups::flush(backend.as_ref(), self.tracer.registry()) {
            Ok(path) => path,
            Err(err) => {
                error!("function group file not written: {err}");
                None
            }
        };
        if let Err(err) = backend.finalize() {
            error!("backend finalization failed: {err}");
        }
        written
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::engine::TracerOptions;
    use crate::function_groups::FILE_NAME;
    use crate::registry::ModuleRegistry;

    fn runner_in(dir: &Path) -> (Arc<RecordingBackend>, Runner) {
        let backend = Arc::new(RecordingBackend::new(dir));
        let tracer = Tracer::new(backend.clone(), ModuleRegistry::new(), TracerOptions::default());
        (backend, Runner::new(tracer))
    }

    fn script(text: &str) -> Script {
        Script::parse(text).unwrap()
    }

    #[test]
    fn test_completed_run_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, runner) = runner_in(dir.path());
        let outcome = runner
            .run_script(&script(r#"{ "functions": { "f": {} }, "main": [{ "call": "f" }] }"#), Path::new("t.json"), &[])
            .unwrap();
        assert_eq!(outcome, Outcome::Completed);
        assert!(runner.is_finished());
        assert!(backend.is_finalized());
        let content = std::fs::read_to_string(dir.path().join(FILE_NAME)).unwrap();
        assert!(content.contains("BEGIN FUNCTION_GROUP __main__"));
        assert!(content.contains("BEGIN FUNCTION_GROUP regiontrace"));
    }

    #[test]
    fn test_exit_is_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, runner) = runner_in(dir.path());
        let outcome = runner
            .run_script(&script(r#"{ "functions": { "f": { "body": [{ "exit": 3 }] } }, "main": [{ "call": "f" }] }"#), Path::new("t.json"), &[])
            .unwrap();
        assert_eq!(outcome, Outcome::Exited(3));
        assert_eq!(backend.trail(), vec!["+__main__:f", "-__main__:f"]);
        assert!(dir.path().join(FILE_NAME).exists());
    }

    #[test]
    fn test_interrupt_is_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let (_backend, runner) = runner_in(dir.path());
        runner.stop_handle().store(true, Ordering::Release);
        let outcome = runner.run_script(&script(r#"{ "main": [{ "import": "m" }] }"#), Path::new("t.json"), &[]);
        assert_eq!(outcome.unwrap(), Outcome::Interrupted);
    }

    #[test]
    fn test_uncaught_exception_still_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let (_backend, runner) = runner_in(dir.path());
        let err = runner
            .run_script(&script(r#"{ "main": [{ "raise": "boom" }] }"#), Path::new("t.json"), &[])
            .unwrap_err();
        assert!(matches!(err, ExecError::Raised(_)));
        assert!(dir.path().join(FILE_NAME).exists());
        assert!(!runner.tracer().is_hooked());
    }

    #[test]
    fn test_finish_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let (_backend, runner) = runner_in(dir.path());
        assert_eq!(runner.finish(), Some(dir.path().join(FILE_NAME)));
        assert_eq!(runner.finish(), None);
    }

    #[test]
    fn test_drop_flushes_unfinished_runner() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, runner) = runner_in(dir.path());
        drop(runner);
        assert!(backend.is_finalized());
        assert!(dir.path().join(FILE_NAME).exists());
    }

    #[test]
    fn test_flush_failure_does_not_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, runner) = runner_in(&dir.path().join("missing"));
        let outcome = runner.run_script(&script(r#"{ "main": [] }"#), Path::new("t.json"), &[]);
        assert_eq!(outcome.unwrap(), Outcome::Completed);
        assert!(backend.is_finalized());
    }
}
