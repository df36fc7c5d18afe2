//! Shared subsystem test doubles for exercising the scheduling kernel
//! without depending on any concrete subsystem model.
#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use citysim_core::{MetricValue, MetricsSnapshot, Subsystem, SubsystemContext};

/// A subsystem that reports a fixed metric snapshot every tick and counts
/// how many ticks it has executed.
pub struct EchoSubsystem {
    metric_key: &'static str,
    metric_value: i64,
    ticks_executed: Arc<AtomicUsize>,
}

impl EchoSubsystem {
    /// Create an echo subsystem reporting `metric_key: metric_value` every
    /// tick, sharing its tick counter with the caller via `ticks_executed`.
    pub fn new(metric_key: &'static str, metric_value: i64, ticks_executed: Arc<AtomicUsize>) -> Self {
        Self {
            metric_key,
            metric_value,
            ticks_executed,
        }
    }
}

impl Subsystem for EchoSubsystem {
    fn execute_tick(&mut self, _ctx: &SubsystemContext<'_>) {
        self.ticks_executed.fetch_add(1, Ordering::SeqCst);
    }

    fn collect_metrics(&mut self, _ctx: &SubsystemContext<'_>) -> Option<MetricsSnapshot> {
        let mut snapshot = MetricsSnapshot::new();
        snapshot.insert(self.metric_key.to_string(), MetricValue::Int(self.metric_value));
        Some(snapshot)
    }
}

/// A subsystem that reads a named metric from a peer subsystem each tick
/// and republishes it under its own key, used to assert peer-visibility
/// ordering (a subsystem only ever observes a peer's *previous* tick).
pub struct RelaySubsystem {
    peer: citysim_core::SubsystemId,
    peer_key: &'static str,
    own_key: &'static str,
    default: f64,
}

impl RelaySubsystem {
    /// Create a relay that copies `peer_key` from `peer` into `own_key`,
    /// falling back to `-1.0` (the reference scenario's "absent" sentinel)
    /// when the peer has not reported yet.
    pub fn new(peer: citysim_core::SubsystemId, peer_key: &'static str, own_key: &'static str) -> Self {
        Self::with_default(peer, peer_key, own_key, -1.0)
    }

    /// Create a relay with an explicit fallback default instead of `-1.0`.
    pub fn with_default(
        peer: citysim_core::SubsystemId,
        peer_key: &'static str,
        own_key: &'static str,
        default: f64,
    ) -> Self {
        Self {
            peer,
            peer_key,
            own_key,
            default,
        }
    }
}

impl Subsystem for RelaySubsystem {
    fn execute_tick(&mut self, _ctx: &SubsystemContext<'_>) {}

    fn collect_metrics(&mut self, ctx: &SubsystemContext<'_>) -> Option<MetricsSnapshot> {
        let observed = ctx.get_metric(&self.peer, self.peer_key, self.default);
        let mut snapshot = MetricsSnapshot::new();
        snapshot.insert(self.own_key.to_string(), MetricValue::Real(observed));
        Some(snapshot)
    }
}

/// A subsystem that panics on its `trigger_after`-th tick, used to verify
/// that a subsystem failure breaks the tick barrier and is observed by the
/// kernel rather than hanging the run.
pub struct FailingSubsystem {
    trigger_after: usize,
    ticks_seen: usize,
}

impl FailingSubsystem {
    /// Create a subsystem that panics during `execute_tick` on its
    /// `trigger_after`-th invocation (1-indexed).
    pub fn new(trigger_after: usize) -> Self {
        Self {
            trigger_after,
            ticks_seen: 0,
        }
    }
}

impl Subsystem for FailingSubsystem {
    fn execute_tick(&mut self, _ctx: &SubsystemContext<'_>) {
        self.ticks_seen += 1;
        if self.ticks_seen == self.trigger_after {
            panic!("FailingSubsystem intentionally failing on tick {}", self.ticks_seen);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citysim_core::Context;

    #[test]
    fn echo_subsystem_reports_fixed_value() {
        let ctx = Context::new();
        let sub_ctx = SubsystemContext::new(&ctx, citysim_core::SubsystemId::new("echo"));
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut echo = EchoSubsystem::new("value", 7, Arc::clone(&ticks));
        echo.execute_tick(&sub_ctx);
        let metrics = echo.collect_metrics(&sub_ctx).unwrap();
        assert_eq!(metrics.get("value"), Some(&MetricValue::Int(7)));
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn relay_subsystem_reads_peer_metric() {
        let ctx = Context::new();
        let peer_id = citysim_core::SubsystemId::new("peer");
        let mut peer_snapshot = MetricsSnapshot::new();
        peer_snapshot.insert("value".to_string(), MetricValue::Real(3.5));
        ctx.update(peer_id.clone(), 1, peer_snapshot);

        let sub_ctx = SubsystemContext::new(&ctx, citysim_core::SubsystemId::new("relay"));
        let mut relay = RelaySubsystem::new(peer_id, "value", "relayed_value");
        relay.execute_tick(&sub_ctx);
        let metrics = relay.collect_metrics(&sub_ctx).unwrap();
        assert_eq!(metrics.get("relayed_value"), Some(&MetricValue::Real(3.5)));
    }

    #[test]
    #[should_panic(expected = "intentionally failing")]
    fn failing_subsystem_panics_on_schedule() {
        let ctx = Context::new();
        let sub_ctx = SubsystemContext::new(&ctx, citysim_core::SubsystemId::new("failing"));
        let mut sub = FailingSubsystem::new(2);
        sub.execute_tick(&sub_ctx);
        sub.execute_tick(&sub_ctx);
    }
}
