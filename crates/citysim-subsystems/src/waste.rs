//! Collection-request arrivals, fleet dispatch, and route economics.

use std::collections::VecDeque;

use citysim_core::{
    ControlValue, MetricValue, MetricsSnapshot, Subsystem, SubsystemConfig, SubsystemContext,
    SubsystemId,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::params::{f64_param, u32_param, u64_param};

/// Models waste collection request arrivals and fleet dispatch against
/// road conditions and grid pricing.
///
/// Reads `traffic.congestion_index`, `traffic.avg_speed_kmh` and
/// `energy.price_index` from the previous tick.
pub struct WasteSubsystem {
    traffic_id: SubsystemId,
    energy_id: SubsystemId,

    base_requests_per_tick: f64,
    rng: ChaCha8Rng,
    pending_requests: VecDeque<u32>,
    served_total: u64,

    served_this_tick: u32,
    avg_route_km: f64,
    fuel_liters: f64,
    recycling_ratio: f64,
    fleet_energy_mwh: f64,
}

impl WasteSubsystem {
    /// Build a waste subsystem from its configuration parameters.
    ///
    /// Recognized params: `seed` (u64, default 0), `requests_per_tick`
    /// (f64, default 5.0). The default fleet size comes from the
    /// `waste_fleet_size` control rather than configuration, matching
    /// the live-tunable fleet the reference scheduler exposes.
    pub fn from_config(config: &SubsystemConfig) -> Self {
        let seed = u64_param(&config.params, "seed", 0);
        Self {
            traffic_id: SubsystemId::new("traffic"),
            energy_id: SubsystemId::new("energy"),
            base_requests_per_tick: f64_param(&config.params, "requests_per_tick", 5.0),
            rng: ChaCha8Rng::seed_from_u64(seed),
            pending_requests: VecDeque::new(),
            served_total: 0,
            served_this_tick: 0,
            avg_route_km: 0.0,
            fuel_liters: 0.0,
            recycling_ratio: 0.4,
            fleet_energy_mwh: 0.0,
        }
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

fn control_u32(ctx: &SubsystemContext<'_>, key: &str, default: u32) -> u32 {
    match ctx.get_control(key, ControlValue::Int(default as i64)) {
        ControlValue::Int(v) => v.max(0) as u32,
        ControlValue::Real(v) => v.max(0.0) as u32,
        ControlValue::Bool(v) => v as u32,
    }
}

impl Subsystem for WasteSubsystem {
    fn execute_tick(&mut self, ctx: &SubsystemContext<'_>) {
        let request_rate_mult = control_f64(ctx, "waste_request_rate", 1.0).max(0.0);
        let fleet_size = control_u32(ctx, "waste_fleet_size", 6).max(1);

        let congestion = ctx.get_metric(&self.traffic_id, "congestion_index", 0.5);
        let avg_speed = ctx.get_metric(&self.traffic_id, "avg_speed_kmh", 35.0);
        let energy_price = ctx.get_metric(&self.energy_id, "price_index", 1.0);

        let seasonal_variation = self.rng.gen_range(-1.0..2.0);
        let new_requests = ((self.base_requests_per_tick * request_rate_mult)
            + seasonal_variation
            + congestion * 4.0)
            .max(0.0) as u32;
        for _ in 0..new_requests {
            self.pending_requests.push_back(self.rng.gen_range(1..=1000));
        }

        let congestion_penalty = 1.0 - congestion.min(1.2) * 0.4;
        let effective_speed = (avg_speed * congestion_penalty).max(12.0);
        let service_capacity =
            (((effective_speed / 25.0) * fleet_size as f64) as u32).max(1);

        let active_fleet = fleet_size
            .min(self.pending_requests.len() as u32)
            .min(service_capacity);
        self.served_this_tick = 0;
        for _ in 0..active_fleet {
            self.pending_requests.pop_front();
            self.served_total += 1;
            self.served_this_tick += 1;
        }

        let route_variation = self.rng.gen_range(6.0..12.0);
        self.avg_route_km =
            route_variation * active_fleet.max(1) as f64 * (1.2 - congestion_penalty).max(1.0);
        let diesel_mix = 1.0 - (energy_price / 3.0).min(0.6);
        self.fuel_liters = self.avg_route_km * (0.3 + 0.6 * diesel_mix);
        self.fleet_energy_mwh = self.avg_route_km * (1.0 - diesel_mix) * 0.015;

        let recycling_base = 0.35 + self.rng.gen_range(-0.05..0.07);
        let congestion_penalty_recycle = 0.05 * (congestion - 0.7).max(0.0);
        self.recycling_ratio = (recycling_base - congestion_penalty_recycle).clamp(0.2, 0.75);

        tracing::debug!(
            new_requests,
            served = self.served_this_tick,
            backlog = self.pending_requests.len(),
            routes_km = self.avg_route_km,
            "waste tick settled",
        );
    }

    fn collect_metrics(&mut self, _ctx: &SubsystemContext<'_>) -> Option<MetricsSnapshot> {
        let mut metrics = MetricsSnapshot::new();
        metrics.insert(
            "pending_requests".to_string(),
            MetricValue::Int(self.pending_requests.len() as i64),
        );
        metrics.insert(
            "served_this_tick".to_string(),
            MetricValue::Int(self.served_this_tick as i64),
        );
        metrics.insert("served_total".to_string(), MetricValue::Int(self.served_total as i64));
        metrics.insert("avg_route_km".to_string(), MetricValue::Real(self.avg_route_km));
        metrics.insert("fuel_liters".to_string(), MetricValue::Real(self.fuel_liters));
        metrics.insert(
            "recycling_ratio".to_string(),
            MetricValue::Real(self.recycling_ratio),
        );
        metrics.insert(
            "fleet_energy_mwh".to_string(),
            MetricValue::Real(self.fleet_energy_mwh),
        );
        Some(metrics)
    }
}
