//! Incident generation, unit dispatch, and response-time modeling.

use citysim_core::{
    ControlValue, MetricValue, MetricsSnapshot, Subsystem, SubsystemConfig, SubsystemContext,
    SubsystemId,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::params::{f64_param, u64_param};

/// Generates incidents from road and grid conditions, dispatches
/// available response units against them, and tracks resolution.
///
/// Reads `traffic.congestion_index`, `traffic.avg_speed_kmh`,
/// `energy.blackout_risk` and `waste.pending_requests` from the previous
/// tick.
pub struct EmergencySubsystem {
    traffic_id: SubsystemId,
    energy_id: SubsystemId,
    waste_id: SubsystemId,

    priority_threshold: f64,
    rng: ChaCha8Rng,
    open_incidents: u64,
    resolved_total: u64,

    resolved_this_tick: u64,
    active_units: u32,
    avg_response_min: f64,
    grid_demand_mwh: f64,
}

impl EmergencySubsystem {
    /// Build an emergency subsystem from its configuration parameters.
    ///
    /// Recognized params: `seed` (u64, default 0), `priority_threshold`
    /// (f64, default 0.6). The live unit count comes from the
    /// `emergency_staff` control rather than configuration.
    pub fn from_config(config: &SubsystemConfig) -> Self {
        let seed = u64_param(&config.params, "seed", 0);
        Self {
            traffic_id: SubsystemId::new("traffic"),
            energy_id: SubsystemId::new("energy"),
            waste_id: SubsystemId::new("waste"),
            priority_threshold: f64_param(&config.params, "priority_threshold", 0.6),
            rng: ChaCha8Rng::seed_from_u64(seed),
            open_incidents: 0,
            resolved_total: 0,
            resolved_this_tick: 0,
            active_units: 0,
            avg_response_min: 6.0,
            grid_demand_mwh: 0.0,
        }
    }
}

fn control_u32(ctx: &SubsystemContext<'_>, key: &str, default: u32) -> u32 {
    match ctx.get_control(key, ControlValue::Int(default as i64)) {
        ControlValue::Int(v) => v.max(0) as u32,
        ControlValue::Real(v) => v.max(0.0) as u32,
        ControlValue::Bool(v) => v as u32,
    }
}

fn control_bool(ctx: &SubsystemContext<'_>, key: &str, default: bool) -> bool {
    match ctx.get_control(key, ControlValue::Bool(default)) {
        ControlValue::Bool(v) => v,
        ControlValue::Int(v) => v != 0,
        ControlValue::Real(v) => v != 0.0,
    }
}

impl Subsystem for EmergencySubsystem {
    fn execute_tick(&mut self, ctx: &SubsystemContext<'_>) {
        let units_available = control_u32(ctx, "emergency_staff", 8).max(1);
        let override_active = control_bool(ctx, "emergency_override", false);

        let congestion = ctx.get_metric(&self.traffic_id, "congestion_index", 0.5);
        let avg_speed = ctx.get_metric(&self.traffic_id, "avg_speed_kmh", 35.0);
        let blackout_risk = ctx.get_metric(&self.energy_id, "blackout_risk", 0.2);
        let waste_backlog = ctx.get_metric(&self.waste_id, "pending_requests", 0.0);

        let mut incident_pressure =
            0.4 + congestion * 1.6 + blackout_risk * 2.0 + waste_backlog * 0.03;
        incident_pressure *= self.rng.gen_range(0.7..1.3);
        let expected_incidents = incident_pressure.max(0.0);
        let mut new_incidents = expected_incidents as u64;
        if self.rng.gen::<f64>() < (expected_incidents - new_incidents as f64) {
            new_incidents += 1;
        }
        if override_active {
            new_incidents += self.rng.gen_range(1..=2);
        }

        if new_incidents > 0 {
            self.open_incidents += new_incidents;
            tracing::debug!(new_incidents, "emergency tick registered new incidents");
        }

        if self.open_incidents > 0 {
            let congestion_penalty = 1.0 + (congestion - 0.8).max(0.0) * 0.8;
            let speed_factor = (avg_speed / 45.0).max(0.4);
            let dispatch_capacity =
                (((units_available as f64 * speed_factor) / congestion_penalty) as u32).max(1);
            self.active_units = dispatch_capacity.min(units_available);

            let resolution_rate = self.priority_threshold + self.rng.gen_range(-0.15..0.25);
            let max_resolvable = ((self.active_units as f64 * resolution_rate).max(0.0)) as u64;
            self.resolved_this_tick = self.open_incidents.min(max_resolvable);
            self.open_incidents -= self.resolved_this_tick;
            self.resolved_total += self.resolved_this_tick;

            self.avg_response_min =
                (4.5 + congestion * 6.0 + blackout_risk * 5.0 - avg_speed * 0.05).max(5.0);
            self.grid_demand_mwh = self.active_units as f64 * 0.04;

            if self.resolved_this_tick > 0 {
                tracing::debug!(
                    resolved = self.resolved_this_tick,
                    open = self.open_incidents,
                    "emergency tick resolved incidents",
                );
            }
        } else {
            self.resolved_this_tick = 0;
            self.active_units = 0;
            self.grid_demand_mwh = 0.0;
        }
    }

    fn collect_metrics(&mut self, _ctx: &SubsystemContext<'_>) -> Option<MetricsSnapshot> {
        let severity_index =
            (self.open_incidents as f64 / (self.active_units.max(1) as f64 * 2.0)).min(1.0);

        let mut metrics = MetricsSnapshot::new();
        metrics.insert(
            "open_incidents".to_string(),
            MetricValue::Int(self.open_incidents as i64),
        );
        metrics.insert("resolved_total".to_string(), MetricValue::Int(self.resolved_total as i64));
        metrics.insert(
            "resolved_this_tick".to_string(),
            MetricValue::Int(self.resolved_this_tick as i64),
        );
        metrics.insert("active_units".to_string(), MetricValue::Int(self.active_units as i64));
        metrics.insert(
            "avg_response_min".to_string(),
            MetricValue::Real(self.avg_response_min),
        );
        metrics.insert("severity_index".to_string(), MetricValue::Real(severity_index));
        metrics.insert("grid_demand_mwh".to_string(), MetricValue::Real(self.grid_demand_mwh));
        Some(metrics)
    }
}
