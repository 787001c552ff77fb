//! # Shared Data Structures (engine ↔ backends)
//!
//! Value types shared between the hook engine, measurement backends and any
//! consumer of the live event stream.
//!
//! ## Key Types
//!
//! - [`RegionId`] - Canonical `<module>:<unit>` identifier of a code unit
//! - [`EventKind`] - Lifecycle notification delivered by the host for a frame
//! - [`RegionEvent`] - A forwarded begin/end, as published to live consumers
//! - [`ParamValue`] - Value of a user parameter attached to the current region
//! - [`SourceLocation`] - File and line a code unit is defined at

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Region Naming
// ============================================================================

/// Separator between the module and unit parts of a [`RegionId`]
pub const SEPARATOR: char = ':';

/// Module part rendered when the owning module of a frame is unknown
pub const UNKNOWN_MODULE: &str = "None";

/// Module part used for explicit user regions
pub const USER_MODULE: &str = "user";

/// Canonical identifier of a code unit, `"<module>:<unit-name>"`
///
/// Stable for identical inputs, which is what the backend pairs begin/end
/// calls on. Not unique across recursive or overloaded definitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(String);

impl RegionId {
    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Module part (everything before the first separator)
    #[must_use]
    pub fn module(&self) -> &str {
        self.0.split_once(SEPARATOR).map_or(self.0.as_str(), |(module, _)| module)
    }

    /// Unit part (everything after the first separator)
    #[must_use]
    pub fn unit(&self) -> &str {
        self.0.split_once(SEPARATOR).map_or("", |(_, unit)| unit)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RegionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the region identifier for a unit executing in `module`
///
/// An absent module renders as [`UNKNOWN_MODULE`] so identifiers always keep
/// two parts. Module names are assumed free of [`SEPARATOR`]; any occurrence is
/// rewritten to `.` so the first separator always ends the module part.
#[must_use]
pub fn name_of(module: Option<&str>, unit: &str) -> RegionId {
    let module = module.unwrap_or(UNKNOWN_MODULE);
    let mut id = String::with_capacity(module.len() + unit.len() + 1);
    if module.contains(SEPARATOR) {
        id.extend(module.chars().map(|c| if c == SEPARATOR { '.' } else { c }));
    } else {
        id.push_str(module);
    }
    id.push(SEPARATOR);
    id.push_str(unit);
    RegionId(id)
}

// ============================================================================
// Host Events
// ============================================================================

/// Notification kind the host delivers for a frame
///
/// Only `Call` and `Return` are acted upon; the rest exist so hosts can
/// forward their full event stream without filtering it first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new activation of a code unit starts
    Call,
    /// The activation finishes, normally or while unwinding
    Return,
    /// An exception is raised inside the activation
    Exception,
    /// A new line/statement starts executing
    Line,
    /// Anything else the host reports
    Other,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Call => "call",
            EventKind::Return => "return",
            EventKind::Exception => "exception",
            EventKind::Line => "line",
            EventKind::Other => "other",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Forwarded Events
// ============================================================================

/// Whether a region was entered or left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionEventKind {
    /// `region_begin` was accepted by the backend
    Begin,
    /// `region_end` was accepted by the backend
    End,
}

/// A begin/end call as seen by a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionEvent {
    pub kind: RegionEventKind,
    pub region: RegionId,
    /// Process-local tag of the thread that produced the event
    pub thread: u64,
}

impl RegionEvent {
    /// Entry into `region` on `thread`
    #[must_use]
    pub fn begin(region: RegionId, thread: u64) -> Self {
        Self { kind: RegionEventKind::Begin, region, thread }
    }

    /// Exit from `region` on `thread`
    #[must_use]
    pub fn end(region: RegionId, thread: u64) -> Self {
        Self { kind: RegionEventKind::End, region, thread }
    }
}

/// Definition site of a code unit, when the host knows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    #[must_use]
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self { file: file.into(), line }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Value of a user parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Uint(u64),
    Str(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Uint(v) => write!(f, "{v}"),
            ParamValue::Str(v) => f.write_str(v),
        }
    }
}
