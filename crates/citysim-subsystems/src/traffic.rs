//! Vehicle inflow, signal timing, congestion and incident dynamics.

use std::collections::VecDeque;

use citysim_core::{
    ControlValue, MetricValue, MetricsSnapshot, Subsystem, SubsystemConfig, SubsystemContext,
    SubsystemId,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::params::{f64_param, u32_param, u64_param};

const CONGESTION_WINDOW: usize = 20;

/// Models junction throughput, congestion, and incident occurrence for the
/// road network.
///
/// Reads `energy.surplus_mw` (cheap grid headroom modestly improves signal
/// reliability) and `emergency.active_units` (active dispatches add load to
/// nearby junctions) from the previous tick.
pub struct TrafficSubsystem {
    energy_id: SubsystemId,
    emergency_id: SubsystemId,
    junctions: u32,
    base_vehicles_per_tick: f64,
    rng: ChaCha8Rng,
    congestion_window: VecDeque<f64>,
    total_incidents: u64,
    total_vehicles: u64,

    vehicles: f64,
    avg_speed_kmh: f64,
    avg_wait_min: f64,
    congestion_index: f64,
    incidents_this_tick: u64,
    signal_efficiency: f64,
    ev_charging_demand_mwh: f64,
}

impl TrafficSubsystem {
    /// Build a traffic subsystem from its configuration parameters.
    ///
    /// Recognized params: `seed` (u64, default 0), `junctions` (u32, default
    /// 12), `vehicles_per_tick` (f64, default 40.0).
    pub fn from_config(config: &SubsystemConfig) -> Self {
        let seed = u64_param(&config.params, "seed", 0);
        Self {
            energy_id: SubsystemId::new("energy"),
            emergency_id: SubsystemId::new("emergency"),
            junctions: u32_param(&config.params, "junctions", 12),
            base_vehicles_per_tick: f64_param(&config.params, "vehicles_per_tick", 40.0),
            rng: ChaCha8Rng::seed_from_u64(seed),
            congestion_window: VecDeque::with_capacity(CONGESTION_WINDOW),
            total_incidents: 0,
            total_vehicles: 0,
            vehicles: 0.0,
            avg_speed_kmh: 0.0,
            avg_wait_min: 0.0,
            congestion_index: 0.0,
            incidents_this_tick: 0,
            signal_efficiency: 1.0,
            ev_charging_demand_mwh: 0.0,
        }
    }

    fn push_congestion(&mut self, value: f64) -> f64 {
        if self.congestion_window.len() == CONGESTION_WINDOW {
            self.congestion_window.pop_front();
        }
        self.congestion_window.push_back(value);
        self.congestion_window.iter().sum::<f64>() / self.congestion_window.len() as f64
    }
}

fn control_f64(ctx: &SubsystemContext<'_>, key: &str, default: f64) -> f64 {
    match ctx.get_control(key, ControlValue::Real(default)) {
        ControlValue::Real(v) => v,
        ControlValue::Int(v) => v as f64,
        ControlValue::Bool(v) => {
            if v {
                1.0
            } else {
                0.0
            }
        }
    }
}

impl Subsystem for TrafficSubsystem {
    fn execute_tick(&mut self, ctx: &SubsystemContext<'_>) {
        let inflow_mult = control_f64(ctx, "traffic_inflow", 1.0).max(0.0);
        let signal_bias = control_f64(ctx, "traffic_signal_bias", 1.0).clamp(0.0, 2.0);

        let surplus_mw = ctx.get_metric(&self.energy_id, "surplus_mw", 0.0);
        let active_emergency_units = ctx.get_metric(&self.emergency_id, "active_units", 0.0);

        let vehicles = (self.base_vehicles_per_tick * inflow_mult).max(0.0);
        self.total_vehicles += vehicles.round() as u64;

        let base_efficiency = 0.55 + 0.35 * (signal_bias / 2.0);
        let grid_bonus = (surplus_mw / 50.0).clamp(0.0, 0.1);
        self.signal_efficiency = (base_efficiency + grid_bonus).clamp(0.1, 1.0);

        let raw_congestion = (vehicles / (self.junctions as f64 * 25.0))
            * (1.0 + active_emergency_units * 0.05);
        self.congestion_index = self.push_congestion(raw_congestion.clamp(0.0, 1.0));

        self.avg_speed_kmh = (60.0 * (1.0 - self.congestion_index * 0.8)).max(5.0);
        self.avg_wait_min = 0.5 + self.congestion_index * 8.0;

        let incident_probability = (self.congestion_index * 0.08).clamp(0.0, 0.3);
        self.incidents_this_tick = if self.rng.gen::<f64>() < incident_probability {
            1
        } else {
            0
        };
        self.total_incidents += self.incidents_this_tick;

        self.ev_charging_demand_mwh = vehicles * 0.015 * self.signal_efficiency;
        self.vehicles = vehicles;
    }

    fn collect_metrics(&mut self, _ctx: &SubsystemContext<'_>) -> Option<MetricsSnapshot> {
        let mut metrics = MetricsSnapshot::new();
        metrics.insert("vehicles".to_string(), MetricValue::Int(self.vehicles.round() as i64));
        metrics.insert("avg_speed_kmh".to_string(), MetricValue::Real(self.avg_speed_kmh));
        metrics.insert("avg_wait_min".to_string(), MetricValue::Real(self.avg_wait_min));
        metrics.insert(
            "congestion_index".to_string(),
            MetricValue::Real(self.congestion_index),
        );
        metrics.insert(
            "incidents".to_string(),
            MetricValue::Int(self.incidents_this_tick as i64),
        );
        metrics.insert(
            "total_incidents".to_string(),
            MetricValue::Int(self.total_incidents as i64),
        );
        metrics.insert(
            "signal_efficiency".to_string(),
            MetricValue::Real(self.signal_efficiency),
        );
        metrics.insert(
            "ev_charging_demand_mwh".to_string(),
            MetricValue::Real(self.ev_charging_demand_mwh),
        );
        Some(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citysim_core::Context;
    use std::collections::HashMap;

    fn config(params: HashMap<String, ControlValue>) -> SubsystemConfig {
        SubsystemConfig {
            type_tag: "traffic".to_string(),
            thread_name: "traffic".to_string(),
            params,
        }
    }

    #[test]
    fn reports_zero_vehicles_with_zero_inflow() {
        let context = Context::new();
        let mut controls = citysim_core::ControlState::default();
        controls.traffic_inflow = 0.0;
        context.set_control_state(controls);
        let sub_ctx = SubsystemContext::new(&context, SubsystemId::new("traffic"));

        let mut traffic = TrafficSubsystem::from_config(&config(HashMap::new()));
        traffic.execute_tick(&sub_ctx);
        let metrics = traffic.collect_metrics(&sub_ctx).unwrap();
        assert_eq!(metrics.get("vehicles"), Some(&MetricValue::Int(0)));
    }

    #[test]
    fn higher_inflow_increases_congestion_index() {
        let context = Context::new();
        let sub_ctx = SubsystemContext::new(&context, SubsystemId::new("traffic"));

        let mut params = HashMap::new();
        params.insert("seed".to_string(), ControlValue::Int(7));
        params.insert("junctions".to_string(), ControlValue::Int(2));
        params.insert("vehicles_per_tick".to_string(), ControlValue::Real(200.0));
        let mut heavy = TrafficSubsystem::from_config(&config(params));
        heavy.execute_tick(&sub_ctx);
        let heavy_metrics = heavy.collect_metrics(&sub_ctx).unwrap();

        let mut light = TrafficSubsystem::from_config(&config(HashMap::new()));
        light.execute_tick(&sub_ctx);
        let light_metrics = light.collect_metrics(&sub_ctx).unwrap();

        let MetricValue::Real(heavy_congestion) = heavy_metrics["congestion_index"] else {
            panic!("expected real congestion_index");
        };
        let MetricValue::Real(light_congestion) = light_metrics["congestion_index"] else {
            panic!("expected real congestion_index");
        };
        assert!(heavy_congestion > light_congestion);
    }

    #[test]
    fn seeded_runs_are_deterministic() {
        let context = Context::new();
        let sub_ctx = SubsystemContext::new(&context, SubsystemId::new("traffic"));

        let mut params = HashMap::new();
        params.insert("seed".to_string(), ControlValue::Int(99));
        let mut a = TrafficSubsystem::from_config(&config(params.clone()));
        let mut b = TrafficSubsystem::from_config(&config(params));

        for _ in 0..5 {
            a.execute_tick(&sub_ctx);
            b.execute_tick(&sub_ctx);
        }
        assert_eq!(
            a.collect_metrics(&sub_ctx).unwrap()["total_incidents"],
            b.collect_metrics(&sub_ctx).unwrap()["total_incidents"]
        );
    }
}
