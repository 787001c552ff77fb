//! Measurement backends
//!
//! The engine only ever talks to a backend through [`Backend`]. Timer
//! implementation, trace storage and rank correlation live behind it.
//!
//! Shipped implementations:
//! - [`ChromeTraceBackend`]: default, writes Chrome Trace Event JSON
//! - [`RecordingBackend`]: keeps events in memory, for tests and embedding
//! - [`StreamingBackend`]: wraps another backend and publishes events live

pub mod chrome_trace;
pub mod recording;
pub mod stream;

pub use chrome_trace::ChromeTraceBackend;
pub use recording::RecordingBackend;
pub use stream::{spawn_printer, StreamingBackend};

use crate::domain::BackendError;
use regiontrace_common::{ParamValue, RegionId, SourceLocation};
use std::path::PathBuf;

/// Environment variables consulted, in order, for the MPI rank
pub const RANK_VARS: [&str; 4] = ["OMPI_COMM_WORLD_RANK", "PMI_RANK", "PMIX_RANK", "SLURM_PROCID"];

/// Capability set every measurement backend provides
///
/// `region_begin`/`region_end` are called from any registered thread and must
/// not block indefinitely. `experiment_dir_name` must name an existing,
/// writable directory by the time the function group file is flushed.
pub trait Backend: Send + Sync {
    fn region_begin(&self, region: &RegionId) -> Result<(), BackendError>;

    fn region_end(&self, region: &RegionId) -> Result<(), BackendError>;

    /// `region_begin` with the unit's definition site. Backends without
    /// source correlation drop the location.
    fn region_begin_at(&self, region: &RegionId, _location: &SourceLocation) -> Result<(), BackendError> {
        self.region_begin(region)
    }

    fn experiment_dir_name(&self) -> Result<PathBuf, BackendError>;

    /// MPI rank of this process, `None` for non-MPI backends
    fn rank(&self) -> Option<u32> {
        None
    }

    fn enable_recording(&self) {}

    fn disable_recording(&self) {}

    /// Attach a user parameter to the innermost open region
    fn parameter(&self, _name: &str, _value: &ParamValue) -> Result<(), BackendError> {
        Ok(())
    }

    /// Persist whatever the backend buffered. Called once at shutdown.
    fn finalize(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Rank of this process as announced by the MPI launcher
#[must_use]
pub fn mpi_rank() -> Option<u32> {
    RANK_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok())
        .and_then(|value| value.trim().parse().ok())
}

/// Experiment directory used when none was configured
#[must_use]
pub fn default_experiment_dir() -> PathBuf {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    PathBuf::from(format!("regiontrace-{secs}-{}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_experiment_dir_prefix() {
        let dir = default_experiment_dir();
        let name = dir.to_string_lossy();
        assert!(name.starts_with("regiontrace-"));
        assert!(name.ends_with(&std::process::id().to_string()));
    }
}
