//! In-memory backend
//!
//! Keeps every forwarded event so callers can inspect the exact sequence the
//! engine produced.

use super::Backend;
use crate::domain::{BackendError, ThreadTag};
use regiontrace_common::{ParamValue, RegionEvent, RegionEventKind, RegionId};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
pub struct RecordingBackend {
    experiment_dir: PathBuf,
    events: Mutex<Vec<RegionEvent>>,
    params: Mutex<Vec<(String, ParamValue)>>,
    recording: AtomicBool,
    /// Region whose begin calls are rejected
    fail_begin: Option<String>,
    /// Region whose end calls are rejected
    fail_end: Option<String>,
    finalized: AtomicBool,
}

impl RecordingBackend {
    pub fn new(experiment_dir: impl Into<PathBuf>) -> Self {
        Self {
            experiment_dir: experiment_dir.into(),
            events: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
            recording: AtomicBool::new(true),
            fail_begin: None,
            fail_end: None,
            finalized: AtomicBool::new(false),
        }
    }

    /// Reject begin/end calls for `region`
    #[must_use]
    pub fn failing_on(mut self, region: &str) -> Self {
        self.fail_begin = Some(region.to_string());
        self.fail_end = Some(region.to_string());
        self
    }

    /// Accept begins of `region` but reject its ends
    #[must_use]
    pub fn failing_end_on(mut self, region: &str) -> Self {
        self.fail_end = Some(region.to_string());
        self
    }

    #[must_use]
    pub fn events(&self) -> Vec<RegionEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Events rendered as `+region` / `-region`, handy for order assertions
    #[must_use]
    pub fn trail(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|e| match e.kind {
                RegionEventKind::Begin => format!("+{}", e.region),
                RegionEventKind::End => format!("-{}", e.region),
            })
            .collect()
    }

    #[must_use]
    pub fn params(&self) -> Vec<(String, ParamValue)> {
        self.params.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    fn record(&self, op: &'static str, event: RegionEvent) -> Result<(), BackendError> {
        let fail_on = match event.kind {
            RegionEventKind::Begin => &self.fail_begin,
            RegionEventKind::End => &self.fail_end,
        };
        if fail_on.as_deref() == Some(event.region.as_str()) {
            return Err(BackendError::Rejected {
                op,
                region: event.region.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        if self.recording.load(Ordering::Acquire) {
            self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
        }
        Ok(())
    }
}

impl Backend for RecordingBackend {
    fn region_begin(&self, region: &RegionId) -> Result<(), BackendError> {
        self.record("region_begin", RegionEvent::begin(region.clone(), ThreadTag::current().0))
    }

    fn region_end(&self, region: &RegionId) -> Result<(), BackendError> {
        self.record("region_end", RegionEvent::end(region.clone(), ThreadTag::current().0))
    }

    fn experiment_dir_name(&self) -> Result<PathBuf, BackendError> {
        Ok(self.experiment_dir.clone())
    }

    fn enable_recording(&self) {
        self.recording.store(true, Ordering::Release);
    }

    fn disable_recording(&self) {
        self.recording.store(false, Ordering::Release);
    }

    fn parameter(&self, name: &str, value: &ParamValue) -> Result<(), BackendError> {
        self.params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), value.clone()));
        Ok(())
    }

    fn finalize(&self) -> Result<(), BackendError> {
        self.finalized.store(true, Ordering::Release);
        Ok(())
    }
}
