//! Structured error types for regiontrace
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Backend rejected {op} for region {region}: {reason}")]
    Rejected { op: &'static str, region: String, reason: String },

    #[error("Experiment directory unavailable: {0}")]
    ExperimentDir(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Uncaught exception: {0}")]
    Raised(String),

    #[error("Exit requested with status {0}")]
    Exit(i32),

    #[error("Interrupted")]
    Interrupted,

    #[error("Name '{0}' is not defined")]
    UnknownFunction(String),

    #[error("Worker thread panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Error, Debug)]
pub enum FlushError {
    #[error("Failed to query experiment directory: {0}")]
    ExperimentDir(#[source] BackendError),

    #[error("Failed to write function group file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("{source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid call script: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
