//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::engine::FailurePolicy;

#[derive(Parser, Debug)]
#[command(
    name = "regiontrace",
    version,
    about = "Run a call script and report every call and return as a region",
    after_help = "\
EXAMPLES:
    regiontrace app.json                         Trace into regiontrace-<time>-<pid>/
    regiontrace --experiment-dir out app.json    Choose the experiment directory
    mpirun -n 4 regiontrace --mpi app.json       One trace file per rank"
)]
pub struct Args {
    /// Call script to run
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Arguments handed to the script
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub script_args: Vec<String>,

    /// Use the MPI-aware backend (rank-tagged trace files)
    #[arg(long)]
    pub mpi: bool,

    /// Directory receiving traces and the function group file
    #[arg(long, value_name = "DIR", env = "REGIONTRACE_EXPERIMENT_DIRECTORY")]
    pub experiment_dir: Option<PathBuf>,

    /// Run the script without instrumentation
    #[arg(long)]
    pub no_trace: bool,

    /// Print region events as they happen
    #[arg(long)]
    pub print: bool,

    /// What to do when the backend rejects a region
    #[arg(long, value_enum, default_value_t = FailurePolicy::Abort)]
    pub on_backend_error: FailurePolicy,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// `argv` as seen by the script: its own path followed by its arguments
    #[must_use]
    pub fn script_argv(&self) -> Vec<String> {
        std::iter::once(self.script.to_string_lossy().into_owned())
            .chain(self.script_args.iter().cloned())
            .collect()
    }
}
