//! Live event stream
//!
//! [`StreamingBackend`] forwards every call to an inner backend and, once the
//! inner backend accepted it, publishes the event on a bounded channel. The
//! stream is for display only: a full channel drops the event instead of
//! stalling the instrumented thread.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::debug;
use regiontrace_common::{ParamValue, RegionEvent, RegionEventKind, RegionId, SourceLocation};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;

use super::Backend;
use crate::domain::{BackendError, ThreadTag};

/// Capacity of the display channel
pub const STREAM_CAPACITY: usize = 1000;

pub struct StreamingBackend<B> {
    inner: B,
    /// Taken on finalize so the consumer sees the channel close
    tx: Mutex<Option<Sender<RegionEvent>>>,
    dropped: AtomicU64,
}

impl<B: Backend> StreamingBackend<B> {
    /// Wrap `inner`, returning the backend and the receiving end of the stream
    pub fn new(inner: B) -> (Self, Receiver<RegionEvent>) {
        let (tx, rx) = bounded(STREAM_CAPACITY);
        let backend = Self { inner, tx: Mutex::new(Some(tx)), dropped: AtomicU64::new(0) };
        (backend, rx)
    }

    #[must_use]
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Events that did not fit into the channel
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn publish(&self, event: RegionEvent) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = tx.as_ref() {
            // Non-blocking send (drop if the consumer is slow)
            if let Err(TrySendError::Full(_)) = tx.try_send(event) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl<B: Backend> Backend for StreamingBackend<B> {
    fn region_begin(&self, region: &RegionId) -> Result<(), BackendError> {
        self.inner.region_begin(region)?;
        self.publish(RegionEvent::begin(region.clone(), ThreadTag::current().0));
        Ok(())
    }

    fn region_begin_at(&self, region: &RegionId, location: &SourceLocation) -> Result<(), BackendError> {
        self.inner.region_begin_at(region, location)?;
        self.publish(RegionEvent::begin(region.clone(), ThreadTag::current().0));
        Ok(())
    }

    fn region_end(&self, region: &RegionId) -> Result<(), BackendError> {
        self.inner.region_end(region)?;
        self.publish(RegionEvent::end(region.clone(), ThreadTag::current().0));
        Ok(())
    }

    fn experiment_dir_name(&self) -> Result<PathBuf, BackendError> {
        self.inner.experiment_dir_name()
    }

    fn rank(&self) -> Option<u32> {
        self.inner.rank()
    }

    fn enable_recording(&self) {
        self.inner.enable_recording();
    }

    fn disable_recording(&self) {
        self.inner.disable_recording();
    }

    fn parameter(&self, name: &str, value: &ParamValue) -> Result<(), BackendError> {
        self.inner.parameter(name, value)
    }

    fn finalize(&self) -> Result<(), BackendError> {
        let result = self.inner.finalize();
        if self.tx.lock().unwrap_or_else(PoisonError::into_inner).take().is_some() {
            debug!("event stream closed ({} dropped)", self.dropped());
        }
        result
    }
}

/// Render one event as a line indented by the thread's current depth
///
/// `depths` tracks the open regions per thread across calls.
pub fn format_event(event: &RegionEvent, depths: &mut HashMap<u64, usize>) -> String {
    let depth = depths.entry(event.thread).or_insert(0);
    match event.kind {
        RegionEventKind::Begin => {
            let line = format!("[T#{}] {}-> {}", event.thread, "  ".repeat(*depth), event.region);
            *depth += 1;
            line
        }
        RegionEventKind::End => {
            *depth = depth.saturating_sub(1);
            format!("[T#{}] {}<- {}", event.thread, "  ".repeat(*depth), event.region)
        }
    }
}

/// Print the stream to `out` until it closes. Returns the number of lines.
pub fn spawn_printer<W: Write + Send + 'static>(
    rx: Receiver<RegionEvent>,
    mut out: W,
) -> JoinHandle<usize> {
    std::thread::spawn(move || {
        let mut depths = HashMap::new();
        let mut printed = 0;
        for event in rx {
            if writeln!(out, "{}", format_event(&event, &mut depths)).is_err() {
                break;
            }
            printed += 1;
        }
        printed
    })
}
