//! Run configuration
//!
//! Resolved from the command line (and its environment fallbacks) into the
//! pieces the library needs: a backend and tracer options.

use crossbeam_channel::Receiver;
use regiontrace_common::RegionEvent;
use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::{default_experiment_dir, mpi_rank, Backend, ChromeTraceBackend, StreamingBackend};
use crate::cli::Args;
use crate::domain::BackendError;
use crate::engine::{FailurePolicy, TracerOptions};

#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub experiment_dir: PathBuf,
    pub mpi: bool,
    pub enabled: bool,
    pub print_events: bool,
    pub failure_policy: FailurePolicy,
}

impl TraceConfig {
    #[must_use]
    pub fn from_args(args: &Args) -> Self {
        Self {
            experiment_dir: args.experiment_dir.clone().unwrap_or_else(default_experiment_dir),
            mpi: args.mpi,
            enabled: !args.no_trace,
            print_events: args.print,
            failure_policy: args.on_backend_error,
        }
    }

    #[must_use]
    pub fn tracer_options(&self) -> TracerOptions {
        TracerOptions { enabled: self.enabled, failure_policy: self.failure_policy }
    }

    /// Rank used by the MPI-aware backend; a run outside a launcher is rank 0
    #[must_use]
    pub fn rank(&self) -> Option<u32> {
        self.mpi.then(|| mpi_rank().unwrap_or(0))
    }

    /// Build the backend, plus the live event stream when printing is on
    pub fn build_backend(
        &self,
    ) -> Result<(Arc<dyn Backend>, Option<Receiver<RegionEvent>>), BackendError> {
        let chrome = ChromeTraceBackend::new(&self.experiment_dir, self.rank())?;
        if self.print_events {
            let (backend, rx) = StreamingBackend::new(chrome);
            Ok((Arc::new(backend), Some(rx)))
        } else {
            Ok((Arc::new(chrome), None))
        }
    }
}
