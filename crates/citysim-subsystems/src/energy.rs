//! Zone-level electrical load, generation mix, and storage dynamics.

use citysim_core::{
    ControlValue, MetricValue, MetricsSnapshot, Subsystem, SubsystemConfig, SubsystemContext,
    SubsystemId,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::params::{f64_param, u32_param, u64_param};

/// Balances per-zone electrical load against generation and battery
/// storage, absorbing extra demand reported by traffic, waste, and
/// emergency.
///
/// Reads `traffic.ev_charging_demand_mwh`, `waste.fleet_energy_mwh` and
/// `emergency.grid_demand_mwh` from the previous tick.
pub struct EnergySubsystem {
    traffic_id: SubsystemId,
    waste_id: SubsystemId,
    emergency_id: SubsystemId,

    zone_loads: Vec<f64>,
    base_load: f64,
    storage_capacity: f64,
    storage_level: f64,
    rng: ChaCha8Rng,

    generation_mw: f64,
    consumption_mw: f64,
    surplus_mw: f64,
    renewables_mw: f64,
    grid_losses_mw: f64,
    price_index: f64,
    demand_response_active: bool,
}

impl EnergySubsystem {
    /// Build an energy subsystem from its configuration parameters.
    ///
    /// Recognized params: `seed` (u64, default 0), `zones` (u32, default
    /// 3), `base_load_mw` (f64, default 100.0), `storage_capacity_mwh`
    /// (f64, default 250.0), `initial_storage_pct` (f64, default 0.45).
    pub fn from_config(config: &SubsystemConfig) -> Self {
        let zones = u32_param(&config.params, "zones", 3).max(1);
        let base_load = f64_param(&config.params, "base_load_mw", 100.0);
        let storage_capacity = f64_param(&config.params, "storage_capacity_mwh", 250.0);
        let initial_storage_pct = f64_param(&config.params, "initial_storage_pct", 0.45);
        let seed = u64_param(&config.params, "seed", 0);

        Self {
            traffic_id: SubsystemId::new("traffic"),
            waste_id: SubsystemId::new("waste"),
            emergency_id: SubsystemId::new("emergency"),
            zone_loads: vec![base_load / zones as f64; zones as usize],
            base_load,
            storage_capacity,
            storage_level: storage_capacity * initial_storage_pct,
            rng: ChaCha8Rng::seed_from_u64(seed),
            generation_mw: base_load,
            consumption_mw: base_load,
            surplus_mw: 0.0,
            renewables_mw: base_load * 0.35,
            grid_losses_mw: 0.0,
            price_index: 1.0,
            demand_response_active: false,
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

impl Subsystem for EnergySubsystem {
    fn execute_tick(&mut self, ctx: &SubsystemContext<'_>) {
        let base_load_mult = control_f64(ctx, "energy_base_load", 1.0).max(0.0);
        let renewable_boost = control_f64(ctx, "renewable_boost", 0.0);

        let traffic_ev = ctx.get_metric(&self.traffic_id, "ev_charging_demand_mwh", 0.0);
        let waste_energy = ctx.get_metric(&self.waste_id, "fleet_energy_mwh", 0.0);
        let emergency_energy = ctx.get_metric(&self.emergency_id, "grid_demand_mwh", 0.0);

        let distributed_additional = traffic_ev + waste_energy + emergency_energy;
        let per_zone_extra = distributed_additional / self.zone_loads.len() as f64;
        let target_base = self.base_load * base_load_mult / self.zone_loads.len() as f64;

        let mut total_consumption = 0.0;
        for load in &mut self.zone_loads {
            let fluctuation = self.rng.gen_range(-6.0..6.0);
            let drift = (target_base - *load) * 0.1;
            let new_load = (*load + fluctuation + per_zone_extra + drift).max(10.0);
            *load = new_load;
            total_consumption += new_load;
        }
        total_consumption += distributed_additional;

        let weather_factor = 0.8 + self.rng.gen_range(-0.18..0.22);
        self.renewables_mw =
            (self.base_load * base_load_mult * weather_factor * 0.4 * (1.0 + renewable_boost))
                .max(0.0);
        let thermal_generation =
            (self.base_load * base_load_mult * 0.6 + self.rng.gen_range(-8.0..12.0)).max(20.0);
        self.generation_mw = self.renewables_mw + thermal_generation;

        self.grid_losses_mw = total_consumption * 0.05;
        let net_balance = self.generation_mw - (total_consumption + self.grid_losses_mw);
        self.surplus_mw = net_balance;

        if net_balance >= 0.0 {
            let energy_to_store = net_balance.min(self.storage_capacity - self.storage_level);
            self.storage_level += energy_to_store;
            self.surplus_mw -= energy_to_store;
        } else {
            let discharge = (-net_balance).min(self.storage_level);
            self.storage_level -= discharge;
            self.surplus_mw += discharge;
        }

        let utilisation_ratio = total_consumption / self.generation_mw.max(1.0);
        self.price_index = 0.9 + utilisation_ratio * 0.6;
        self.demand_response_active = utilisation_ratio > 0.92;
        self.consumption_mw = total_consumption;

        tracing::debug!(
            generation_mw = self.generation_mw,
            consumption_mw = self.consumption_mw,
            surplus_mw = self.surplus_mw,
            storage_mwh = self.storage_level,
            "energy tick settled",
        );
    }

    fn collect_metrics(&mut self, _ctx: &SubsystemContext<'_>) -> Option<MetricsSnapshot> {
        let renewable_share = self.renewables_mw / self.generation_mw.max(1.0);
        let blackout_risk = (1.0
            - (self.storage_level / self.storage_capacity.max(1.0) + self.surplus_mw / 50.0))
            .clamp(0.0, 1.0);

        let mut metrics = MetricsSnapshot::new();
        metrics.insert("generation_mw".to_string(), MetricValue::Real(self.generation_mw));
        metrics.insert("consumption_mw".to_string(), MetricValue::Real(self.consumption_mw));
        metrics.insert("surplus_mw".to_string(), MetricValue::Real(self.surplus_mw));
        metrics.insert("renewable_ratio".to_string(), MetricValue::Real(renewable_share));
        metrics.insert("storage_mwh".to_string(), MetricValue::Real(self.storage_level));
        metrics.insert(
            "demand_response".to_string(),
            MetricValue::Bool(self.demand_response_active),
        );
        metrics.insert("losses_mw".to_string(), MetricValue::Real(self.grid_losses_mw));
        metrics.insert("price_index".to_string(), MetricValue::Real(self.price_index));
        metrics.insert("blackout_risk".to_string(), MetricValue::Real(blackout_risk));
        Some(metrics)
    }
}
