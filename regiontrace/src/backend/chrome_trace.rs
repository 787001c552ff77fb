use log::{debug, info};
use regiontrace_common::{ParamValue, RegionId, SourceLocation};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use super::Backend;
use crate::domain::{BackendError, ThreadTag};

/// Chrome Trace Event format
/// Spec: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU/preview
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChromeTraceEvent {
    /// Event name (region identifier)
    name: String,
    /// Category for filtering/coloring
    cat: String,
    /// Phase: "B" = begin, "E" = end, "I" = instant, "M" = metadata
    ph: String,
    /// Timestamp in microseconds
    ts: f64,
    /// Process ID (MPI rank when rank-aware)
    pid: u32,
    /// Thread tag
    tid: u64,
    /// Optional arguments (metadata)
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<HashMap<String, JsonValue>>,
}

/// Chrome Trace Format container
#[derive(Debug, Serialize)]
struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    trace_events: Vec<ChromeTraceEvent>,
    #[serde(rename = "displayTimeUnit")]
    display_time_unit: String,
}

/// Backend that buffers regions and writes them as `traces.json`
///
/// The experiment directory is created on construction so it exists when the
/// function group file is flushed.
pub struct ChromeTraceBackend {
    experiment_dir: PathBuf,
    rank: Option<u32>,
    pid: u32,
    start: Instant,
    recording: AtomicBool,
    events: Mutex<Vec<ChromeTraceEvent>>,
}

impl ChromeTraceBackend {
    /// Create a backend writing into `experiment_dir`
    ///
    /// With a rank the trace file becomes `traces.<rank>.json` and the rank
    /// is used as the trace's process id.
    pub fn new(experiment_dir: impl Into<PathBuf>, rank: Option<u32>) -> Result<Self, BackendError> {
        let experiment_dir = experiment_dir.into();
        std::fs::create_dir_all(&experiment_dir).map_err(|e| {
            BackendError::ExperimentDir(format!("{}: {e}", experiment_dir.display()))
        })?;
        debug!("experiment directory: {}", experiment_dir.display());

        Ok(Self {
            experiment_dir,
            rank,
            pid: rank.unwrap_or_else(std::process::id),
            start: Instant::now(),
            recording: AtomicBool::new(true),
            events: Mutex::new(Vec::new()),
        })
    }

    /// File name of the trace inside the experiment directory
    #[must_use]
    pub fn trace_file_name(&self) -> String {
        match self.rank {
            Some(rank) => format!("traces.{rank}.json"),
            None => "traces.json".to_string(),
        }
    }

    fn push(&self, region: &RegionId, ph: &str, location: Option<&SourceLocation>) {
        if !self.recording.load(Ordering::Acquire) {
            return;
        }

        let mut args = HashMap::new();
        if ph == "B" {
            args.insert("module".to_string(), serde_json::json!(region.module()));
            args.insert("unit".to_string(), serde_json::json!(region.unit()));
        }
        if let Some(location) = location {
            args.insert("file".to_string(), serde_json::json!(location.file));
            args.insert("line".to_string(), serde_json::json!(location.line));
        }

        let event = ChromeTraceEvent {
            name: region.to_string(),
            cat: region.module().to_string(),
            ph: ph.to_string(),
            ts: self.start.elapsed().as_secs_f64() * 1_000_000.0,
            pid: self.pid,
            tid: ThreadTag::current().0,
            args: if args.is_empty() { None } else { Some(args) },
        };
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }

    /// Export the trace to any writer (file, stdout, buffer, etc.)
    pub fn export<W: Write>(&self, writer: W) -> Result<(), BackendError> {
        let mut all_events = self.events.lock().unwrap_or_else(PoisonError::into_inner).clone();

        // Generate thread name metadata events
        let threads: BTreeSet<u64> = all_events.iter().map(|e| e.tid).collect();
        for tid in threads {
            let mut args = HashMap::new();
            args.insert("name".to_string(), serde_json::json!(format!("Thread {tid}")));

            all_events.push(ChromeTraceEvent {
                name: "thread_name".to_string(),
                cat: String::new(),
                ph: "M".to_string(),
                ts: 0.0,
                pid: self.pid,
                tid,
                args: Some(args),
            });
        }

        let trace = ChromeTrace { trace_events: all_events, display_time_unit: "ms".to_string() };

        serde_json::to_writer_pretty(writer, &trace)?;
        Ok(())
    }

    /// Get the number of events collected
    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Backend for ChromeTraceBackend {
    fn region_begin(&self, region: &RegionId) -> Result<(), BackendError> {
        self.push(region, "B", None);
        Ok(())
    }

    fn region_begin_at(&self, region: &RegionId, location: &SourceLocation) -> Result<(), BackendError> {
        self.push(region, "B", Some(location));
        Ok(())
    }

    fn region_end(&self, region: &RegionId) -> Result<(), BackendError> {
        self.push(region, "E", None);
        Ok(())
    }

    fn experiment_dir_name(&self) -> Result<PathBuf, BackendError> {
        Ok(self.experiment_dir.clone())
    }

    fn rank(&self) -> Option<u32> {
        self.rank
    }

    fn enable_recording(&self) {
        self.recording.store(true, Ordering::Release);
    }

    fn disable_recording(&self) {
        self.recording.store(false, Ordering::Release);
    }

    fn parameter(&self, name: &str, value: &ParamValue) -> Result<(), BackendError> {
        if !self.recording.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut args = HashMap::new();
        args.insert(name.to_string(), serde_json::to_value(value)?);

        let event = ChromeTraceEvent {
            name: format!("parameter {name}"),
            cat: "parameter".to_string(),
            ph: "I".to_string(),
            ts: self.start.elapsed().as_secs_f64() * 1_000_000.0,
            pid: self.pid,
            tid: ThreadTag::current().0,
            args: Some(args),
        };
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
        Ok(())
    }

    fn finalize(&self) -> Result<(), BackendError> {
        let path = self.experiment_dir.join(self.trace_file_name());
        let mut writer = BufWriter::new(File::create(&path)?);
        self.export(&mut writer)?;
        writer.flush()?;
        info!("wrote {} trace events to {}", self.event_count(), path.display());
        Ok(())
    }
}
