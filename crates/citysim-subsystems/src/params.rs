//! Helpers for pulling typed values out of a subsystem's opaque
//! configuration parameter bag, with a default when a key is absent.

use std::collections::HashMap;

use citysim_core::ControlValue;

pub(crate) fn f64_param(params: &HashMap<String, ControlValue>, key: &str, default: f64) -> f64 {
    match params.get(key) {
        Some(ControlValue::Real(v)) => *v,
        Some(ControlValue::Int(v)) => *v as f64,
        Some(ControlValue::Bool(v)) => {
            if *v {
                1.0
            } else {
                0.0
            }
        }
        None => default,
    }
}

pub(crate) fn u32_param(params: &HashMap<String, ControlValue>, key: &str, default: u32) -> u32 {
    match params.get(key) {
        Some(ControlValue::Real(v)) => *v as u32,
        Some(ControlValue::Int(v)) => *v as u32,
        Some(ControlValue::Bool(v)) => *v as u32,
        None => default,
    }
}

pub(crate) fn u64_param(params: &HashMap<String, ControlValue>, key: &str, default: u64) -> u64 {
    match params.get(key) {
        Some(ControlValue::Real(v)) => *v as u64,
        Some(ControlValue::Int(v)) => *v as u64,
        Some(ControlValue::Bool(v)) => *v as u64,
        None => default,
    }
}
