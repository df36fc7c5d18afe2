//! Concrete subsystem models plugged into the `citysim-core` kernel.
//!
//! This crate knows nothing about scheduling or synchronization — it only
//! implements [`citysim_core::Subsystem`] for traffic, energy, waste, and
//! emergency response, and registers constructors for each with a
//! [`citysim_core::SubsystemFactory`] via [`register_all`].
#![forbid(unsafe_code)]

mod emergency;
mod energy;
mod params;
mod traffic;
mod waste;

pub use emergency::EmergencySubsystem;
pub use energy::EnergySubsystem;
pub use traffic::TrafficSubsystem;
pub use waste::WasteSubsystem;

use citysim_core::SubsystemFactory;

/// Register the four reference subsystem types (`"traffic"`, `"energy"`,
/// `"waste"`, `"emergency"`) with `factory`.
///
/// Mirrors the reference scheduler's static `SUBSYSTEM_REGISTRY` mapping a
/// type tag to a constructor; any `SubsystemConfig::type_tag` outside this
/// set is left unregistered and will surface as
/// [`citysim_core::ConfigError::UnknownSubsystemType`] at bootstrap.
pub fn register_all(factory: &mut SubsystemFactory) {
    factory.register("traffic", |cfg| Box::new(TrafficSubsystem::from_config(cfg)));
    factory.register("energy", |cfg| Box::new(EnergySubsystem::from_config(cfg)));
    factory.register("waste", |cfg| Box::new(WasteSubsystem::from_config(cfg)));
    factory.register("emergency", |cfg| {
        Box::new(EmergencySubsystem::from_config(cfg))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use citysim_core::SubsystemConfig;
    use std::collections::HashMap;

    #[test]
    fn register_all_covers_the_four_reference_types() {
        let mut factory = SubsystemFactory::new();
        register_all(&mut factory);
        for type_tag in ["traffic", "energy", "waste", "emergency"] {
            assert!(factory.contains(type_tag), "missing registration for {type_tag}");
        }
    }

    #[test]
    fn unknown_type_tag_is_not_registered() {
        let mut factory = SubsystemFactory::new();
        register_all(&mut factory);
        assert!(!factory.contains("nonexistent"));
        let config = SubsystemConfig {
            type_tag: "nonexistent".to_string(),
            thread_name: "nonexistent".to_string(),
            params: HashMap::new(),
        };
        assert!(factory.build(&config).is_err());
    }
}
