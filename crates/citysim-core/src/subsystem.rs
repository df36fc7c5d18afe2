//! The subsystem identity type and the template-method worker trait.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::control::ControlValue;
use crate::metrics::MetricsSnapshot;

/// A cheaply-clonable, interned subsystem identifier.
///
/// Backed by `Arc<str>` rather than `String` so that publishing metrics
/// every tick (which moves a `SubsystemId` into a channel payload) never
/// allocates beyond the initial interning at registration.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct SubsystemId(Arc<str>);

impl SubsystemId {
    /// Intern a new subsystem id.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Borrow the id as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubsystemId({:?})", self.0)
    }
}

impl From<&str> for SubsystemId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The view of the shared [`Context`] exposed to a running subsystem.
///
/// A thin, ergonomic wrapper over `Context` scoped to the calling
/// subsystem's own id, used for peer-metric lookups and control reads
/// inside `execute_tick` and friends.
pub struct SubsystemContext<'a> {
    context: &'a Context,
    id: SubsystemId,
}

impl<'a> SubsystemContext<'a> {
    /// Build a context scoped to `id` over the given shared `context`.
    ///
    /// Used internally by the kernel to hand each worker thread its own
    /// view, and directly by tests exercising a [`Subsystem`] in
    /// isolation without a running kernel.
    pub fn new(context: &'a Context, id: SubsystemId) -> Self {
        Self { context, id }
    }

    /// This subsystem's own id.
    pub fn id(&self) -> &SubsystemId {
        &self.id
    }

    /// Look up a single metric reported by `other` on its most recent
    /// completed tick, falling back to `default` if `other` has not
    /// reported yet or never reported that key.
    ///
    /// Because subsystems run concurrently and synchronize only at tick
    /// boundaries, this always observes the *previous* tick's value for
    /// any subsystem other than the caller, never the current one.
    pub fn get_metric(&self, other: &SubsystemId, key: &str, default: f64) -> f64 {
        let Some((_, metrics)) = self.context.get_latest(other) else {
            return default;
        };
        match metrics.get(key) {
            Some(crate::MetricValue::Real(v)) => *v,
            Some(crate::MetricValue::Int(v)) => *v as f64,
            Some(crate::MetricValue::Bool(v)) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
            None => default,
        }
    }

    /// Read a named control value, falling back to `default` if unknown.
    pub fn get_control(&self, key: &str, default: ControlValue) -> ControlValue {
        self.context.get_control(key, default)
    }
}

/// The template-method lifecycle a subsystem worker implements.
///
/// `execute_tick` is the only required method; every other hook has a
/// no-op default. Implementations are stored as `Box<dyn Subsystem>` by
/// the kernel, one per worker thread.
pub trait Subsystem: Send {
    /// One-time initialization hook, run on the worker's own thread before
    /// the tick loop begins.
    fn on_start(&mut self, _ctx: &SubsystemContext<'_>) {}

    /// Hook run immediately before `execute_tick` on every tick.
    fn before_tick(&mut self, _ctx: &SubsystemContext<'_>) {}

    /// Perform this subsystem's work for the current tick. The only
    /// required hook.
    fn execute_tick(&mut self, ctx: &SubsystemContext<'_>);

    /// Hook run immediately after `execute_tick`, before the tick is
    /// signaled complete.
    fn after_tick(&mut self, _ctx: &SubsystemContext<'_>) {}

    /// Collect this tick's metrics, if any. Returning `None` is legal and
    /// still counts as having participated in the tick.
    fn collect_metrics(&mut self, _ctx: &SubsystemContext<'_>) -> Option<MetricsSnapshot> {
        None
    }

    /// Cleanup hook, always run once when the worker's loop exits — even
    /// if a prior hook panicked.
    fn on_stop(&mut self, _ctx: &SubsystemContext<'_>) {}
}
