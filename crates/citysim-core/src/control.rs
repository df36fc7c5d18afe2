//! The typed control-plane record shared with every subsystem.

use crate::error::ControllerError;

/// A dynamically-typed control value, used at the string-keyed
/// [`crate::Controller::set_control`] boundary before being applied to the
/// typed [`ControlState`] fields.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlValue {
    /// A floating-point control value.
    Real(f64),
    /// An integer control value.
    Int(i64),
    /// A boolean control value.
    Bool(bool),
}

impl ControlValue {
    fn as_f64(self) -> f64 {
        match self {
            Self::Real(v) => v,
            Self::Int(v) => v as f64,
            Self::Bool(v) => v as i64 as f64,
        }
    }

    fn as_u32(self) -> u32 {
        match self {
            Self::Real(v) => v as u32,
            Self::Int(v) => v as u32,
            Self::Bool(v) => v as u32,
        }
    }

    fn as_bool(self) -> bool {
        match self {
            Self::Real(v) => v != 0.0,
            Self::Int(v) => v != 0,
            Self::Bool(v) => v,
        }
    }
}

/// Mutable simulation controls shared across subsystems via the [`crate::Context`].
///
/// Every field here is a fixed, named knob — there is no open-ended
/// key/value bag at this layer. The dynamic, string-keyed form used by
/// [`crate::Controller::set_control`] is [`ControlValue`]; this struct is
/// the typed record it's merged into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlState {
    /// Multiplier applied to the baseline vehicle inflow rate.
    pub traffic_inflow: f64,
    /// Bias applied to traffic signal timing decisions.
    pub traffic_signal_bias: f64,
    /// Multiplier applied to the baseline energy load.
    pub energy_base_load: f64,
    /// Additional renewable generation boost.
    pub renewable_boost: f64,
    /// Multiplier applied to the baseline waste collection request rate.
    pub waste_request_rate: f64,
    /// Number of vehicles in the waste collection fleet.
    pub waste_fleet_size: u32,
    /// Whether emergency override dispatch is currently active.
    pub emergency_override: bool,
    /// Number of emergency response staff available.
    pub emergency_staff: u32,
    /// Whether the simulation is currently paused.
    pub paused: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            traffic_inflow: 1.0,
            traffic_signal_bias: 1.0,
            energy_base_load: 1.0,
            renewable_boost: 0.0,
            waste_request_rate: 1.0,
            waste_fleet_size: 6,
            emergency_override: false,
            emergency_staff: 8,
            paused: false,
        }
    }
}

impl ControlState {
    /// Apply a single named control update, by field name.
    ///
    /// Returns [`ControllerError::UnknownControl`] if `key` does not name
    /// one of this struct's fields.
    pub fn set(&mut self, key: &str, value: ControlValue) -> Result<(), ControllerError> {
        match key {
            "traffic_inflow" => self.traffic_inflow = value.as_f64(),
            "traffic_signal_bias" => self.traffic_signal_bias = value.as_f64(),
            "energy_base_load" => self.energy_base_load = value.as_f64(),
            "renewable_boost" => self.renewable_boost = value.as_f64(),
            "waste_request_rate" => self.waste_request_rate = value.as_f64(),
            "waste_fleet_size" => self.waste_fleet_size = value.as_u32(),
            "emergency_override" => self.emergency_override = value.as_bool(),
            "emergency_staff" => self.emergency_staff = value.as_u32(),
            "paused" => self.paused = value.as_bool(),
            other => {
                return Err(ControllerError::UnknownControl {
                    key: other.to_string(),
                })
            }
        }
        Ok(())
    }

    /// Render this state as a `(key, value)` list, suitable for publishing
    /// into the shared [`crate::Context`].
    pub fn to_pairs(self) -> Vec<(&'static str, ControlValue)> {
        vec![
            ("traffic_inflow", ControlValue::Real(self.traffic_inflow)),
            (
                "traffic_signal_bias",
                ControlValue::Real(self.traffic_signal_bias),
            ),
            (
                "energy_base_load",
                ControlValue::Real(self.energy_base_load),
            ),
            ("renewable_boost", ControlValue::Real(self.renewable_boost)),
            (
                "waste_request_rate",
                ControlValue::Real(self.waste_request_rate),
            ),
            (
                "waste_fleet_size",
                ControlValue::Int(self.waste_fleet_size as i64),
            ),
            (
                "emergency_override",
                ControlValue::Bool(self.emergency_override),
            ),
            (
                "emergency_staff",
                ControlValue::Int(self.emergency_staff as i64),
            ),
            ("paused", ControlValue::Bool(self.paused)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let controls = ControlState::default();
        assert_eq!(controls.traffic_inflow, 1.0);
        assert_eq!(controls.waste_fleet_size, 6);
        assert_eq!(controls.emergency_staff, 8);
        assert!(!controls.emergency_override);
        assert!(!controls.paused);
    }

    #[test]
    fn set_known_field_updates_value() {
        let mut controls = ControlState::default();
        controls.set("paused", ControlValue::Bool(true)).unwrap();
        assert!(controls.paused);
    }

    #[test]
    fn set_unknown_field_errors() {
        let mut controls = ControlState::default();
        let err = controls.set("not_a_real_field", ControlValue::Bool(true));
        assert_eq!(
            err,
            Err(ControllerError::UnknownControl {
                key: "not_a_real_field".to_string()
            })
        );
    }

    #[test]
    fn to_pairs_round_trips_through_set() {
        let controls = ControlState {
            waste_fleet_size: 12,
            emergency_staff: 3,
            ..ControlState::default()
        };
        let pairs = controls.to_pairs();
        let mut rebuilt = ControlState::default();
        for (key, value) in pairs {
            rebuilt.set(key, value).unwrap();
        }
        assert_eq!(rebuilt.waste_fleet_size, 12);
        assert_eq!(rebuilt.emergency_staff, 3);
    }
}

#[cfg(test)]
mod law_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_real_update() -> impl Strategy<Value = (&'static str, ControlValue)> {
        prop_oneof![
            Just("traffic_inflow"),
            Just("traffic_signal_bias"),
            Just("energy_base_load"),
            Just("renewable_boost"),
            Just("waste_request_rate"),
        ]
        .prop_flat_map(|key| (-10.0..10.0f64).prop_map(move |v| (key, ControlValue::Real(v))))
    }

    fn arb_int_update() -> impl Strategy<Value = (&'static str, ControlValue)> {
        prop_oneof![Just("waste_fleet_size"), Just("emergency_staff")]
            .prop_flat_map(|key| (0i64..100).prop_map(move |v| (key, ControlValue::Int(v))))
    }

    fn arb_bool_update() -> impl Strategy<Value = (&'static str, ControlValue)> {
        prop_oneof![Just("emergency_override"), Just("paused")]
            .prop_flat_map(|key| any::<bool>().prop_map(move |v| (key, ControlValue::Bool(v))))
    }

    fn arb_update() -> impl Strategy<Value = (&'static str, ControlValue)> {
        prop_oneof![arb_real_update(), arb_int_update(), arb_bool_update()]
    }

    proptest! {
        // set(k, v) followed by reading that same field back always
        // observes v: the typed-record round-trip law from the invariant
        // that `set` always overwrites exactly the named field.
        #[test]
        fn set_then_read_round_trips((key, value) in arb_update()) {
            let mut controls = ControlState::default();
            controls.set(key, value).unwrap();
            let (_, observed) = controls
                .to_pairs()
                .into_iter()
                .find(|(k, _)| *k == key)
                .unwrap();
            prop_assert_eq!(observed, value);
        }

        // Applying a sequence of updates is last-writer-wins per field:
        // the final state for each key equals the value from the last
        // update in the sequence that named it, matching the P1 ⨁ P2
        // control-overwrite law generalized to N updates.
        #[test]
        fn sequential_updates_are_last_writer_wins(updates in prop::collection::vec(arb_update(), 0..20)) {
            let mut controls = ControlState::default();
            let mut expected: std::collections::HashMap<&'static str, ControlValue> = std::collections::HashMap::new();
            for (key, value) in &updates {
                controls.set(key, *value).unwrap();
                expected.insert(key, *value);
            }
            for (key, value) in controls.to_pairs() {
                if let Some(want) = expected.get(key) {
                    prop_assert_eq!(value, *want);
                }
            }
        }
    }
}
