//! The shared, thread-safe coordination plane between subsystems.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::control::{ControlState, ControlValue};
use crate::metrics::MetricsSnapshot;
use crate::subsystem::SubsystemId;

struct Inner {
    state: HashMap<SubsystemId, (u64, MetricsSnapshot)>,
    controls: ControlState,
}

/// Stores the latest `(tick, metrics)` snapshot for every subsystem, plus
/// the current [`ControlState`], behind a single mutex.
///
/// A single lock is sufficient because the kernel never calls back into
/// subsystem or caller code while holding it: every operation here takes
/// the lock, copies data in or out, and releases before returning. That
/// discipline is what lets this type use a plain, non-reentrant `Mutex`
/// even though a subsystem may read its own previous metrics and a peer's
/// metrics in the same tick — those are two separate, short-held lock
/// acquisitions, never a nested one.
pub struct Context {
    inner: Mutex<Inner>,
}

impl Context {
    /// Create an empty context with default controls.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: HashMap::new(),
                controls: ControlState::default(),
            }),
        }
    }

    /// Record a subsystem's metrics snapshot for the given tick.
    ///
    /// Overwrites any previous entry for `subsystem`; only the latest
    /// snapshot is retained here (history buffering, if any, is the
    /// caller's concern).
    pub fn update(&self, subsystem: SubsystemId, tick: u64, metrics: MetricsSnapshot) {
        let mut inner = self.inner.lock().expect("Context mutex poisoned");
        inner.state.insert(subsystem, (tick, metrics));
    }

    /// Retrieve the latest `(tick, metrics)` pair reported by `subsystem`,
    /// or `None` if it has never reported.
    pub fn get_latest(&self, subsystem: &SubsystemId) -> Option<(u64, MetricsSnapshot)> {
        let inner = self.inner.lock().expect("Context mutex poisoned");
        inner.state.get(subsystem).cloned()
    }

    /// Return a shallow copy of every subsystem's latest metrics, keyed by
    /// subsystem id. Tick indices are discarded, matching the reference
    /// snapshot shape used for dashboards and reporting.
    pub fn snapshot(&self) -> HashMap<SubsystemId, MetricsSnapshot> {
        let inner = self.inner.lock().expect("Context mutex poisoned");
        inner
            .state
            .iter()
            .map(|(id, (_, metrics))| (id.clone(), metrics.clone()))
            .collect()
    }

    /// Replace the entire control state at once.
    pub fn set_control_state(&self, controls: ControlState) {
        let mut inner = self.inner.lock().expect("Context mutex poisoned");
        inner.controls = controls;
    }

    /// Return a copy of the current control state.
    pub fn control_state(&self) -> ControlState {
        let inner = self.inner.lock().expect("Context mutex poisoned");
        inner.controls
    }

    /// Clear every stored subsystem snapshot and restore default controls.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("Context mutex poisoned");
        inner.state.clear();
        inner.controls = ControlState::default();
    }

    /// Read a single named control value, falling back to `default` if the
    /// key is not a recognized [`ControlState`] field.
    pub fn get_control(&self, key: &str, default: ControlValue) -> ControlValue {
        let inner = self.inner.lock().expect("Context mutex poisoned");
        let controls = inner.controls;
        for (field, value) in controls.to_pairs() {
            if field == key {
                return value;
            }
        }
        default
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
