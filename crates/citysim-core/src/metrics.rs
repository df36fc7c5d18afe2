//! Metrics snapshots and the bounded event stream that carries them.

use indexmap::IndexMap;

use crate::subsystem::SubsystemId;

/// A single scalar metric value.
///
/// Deliberately a closed three-variant enum rather than an open JSON value:
/// metrics reported by a subsystem never nest, so the type itself rules
/// that out instead of relying on convention.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// An integer-valued metric (e.g. a count).
    Int(i64),
    /// A floating-point metric (e.g. an average or ratio).
    Real(f64),
    /// A boolean-valued metric (e.g. a flag).
    Bool(bool),
}

/// A flat map of metric name to value, reported once per tick by a
/// subsystem.
///
/// `IndexMap` is used only so that equality assertions in tests print
/// deterministically; iteration order carries no meaning. An empty
/// snapshot is legal and means "nothing to report this tick."
pub type MetricsSnapshot = IndexMap<String, MetricValue>;

/// The kind of event carried on the kernel's metrics stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricsEventKind {
    /// A subsystem reported metrics for a completed tick.
    Metrics,
    /// The kernel's metrics stream has closed; no further events follow.
    Shutdown,
}

/// An event on the kernel's bounded metrics stream.
///
/// Producers (subsystem worker threads, via the kernel) never block on
/// publish: if the channel is full the event is dropped and a debug-level
/// log is emitted. Consumers read with `metrics_stream`, which blocks with
/// a timeout.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricsEvent {
    /// Whether this is a metrics report or the terminal shutdown sentinel.
    pub kind: MetricsEventKind,
    /// The tick index the metrics were collected for.
    pub tick: u64,
    /// The subsystem that reported, or an empty id for [`MetricsEventKind::Shutdown`].
    pub subsystem: SubsystemId,
    /// The reported metric values, empty for [`MetricsEventKind::Shutdown`].
    pub metrics: MetricsSnapshot,
}

impl MetricsEvent {
    /// Construct a metrics-report event.
    pub fn metrics(tick: u64, subsystem: SubsystemId, metrics: MetricsSnapshot) -> Self {
        Self {
            kind: MetricsEventKind::Metrics,
            tick,
            subsystem,
            metrics,
        }
    }

    /// Construct the terminal shutdown sentinel event.
    pub fn shutdown() -> Self {
        Self {
            kind: MetricsEventKind::Shutdown,
            tick: 0,
            subsystem: SubsystemId::new(""),
            metrics: MetricsSnapshot::new(),
        }
    }
}
