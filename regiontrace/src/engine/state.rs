//! Trace state lifecycle

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where a tracer is in its lifecycle
///
/// `Inactive → Registered → Active → Unregistered`. Registering again from
/// `Unregistered` goes back to `Registered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TraceState {
    /// Created, never hooked
    Inactive = 0,
    /// Hooked into the event stream, no region forwarded yet
    Registered = 1,
    /// Hooked and forwarding regions
    Active = 2,
    /// Hook removed
    Unregistered = 3,
}

impl TraceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TraceState::Registered,
            2 => TraceState::Active,
            3 => TraceState::Unregistered,
            _ => TraceState::Inactive,
        }
    }
}

impl fmt::Display for TraceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraceState::Inactive => "inactive",
            TraceState::Registered => "registered",
            TraceState::Active => "active",
            TraceState::Unregistered => "unregistered",
        };
        f.write_str(name)
    }
}

/// Atomic holder for a [`TraceState`]
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(TraceState::Inactive as u8))
    }

    pub(crate) fn get(&self) -> TraceState {
        TraceState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: TraceState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// First forwarded region moves `Registered` to `Active`
    pub(crate) fn mark_active(&self) {
        let _ = self.0.compare_exchange(
            TraceState::Registered as u8,
            TraceState::Active as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_active_only_from_registered() {
        let cell = StateCell::new();
        cell.mark_active();
        assert_eq!(cell.get(), TraceState::Inactive);

        cell.set(TraceState::Registered);
        cell.mark_active();
        assert_eq!(cell.get(), TraceState::Active);

        cell.set(TraceState::Unregistered);
        cell.mark_active();
        assert_eq!(cell.get(), TraceState::Unregistered);
    }
}
