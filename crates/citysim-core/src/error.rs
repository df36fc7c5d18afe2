//! Error types for the scheduling kernel.
//!
//! Organized by boundary: configuration validation, kernel lifecycle, and
//! controller control-plane operations.

use std::error::Error;
use std::fmt;

/// Errors raised while validating a [`crate::KernelConfig`] before bootstrap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration registers zero subsystems.
    NoSubsystems,
    /// A subsystem config names a `type` with no registered constructor.
    UnknownSubsystemType {
        /// The unrecognized type tag.
        type_tag: String,
    },
    /// `tick_duration` is zero or otherwise unusable for pacing.
    InvalidTickDuration,
    /// `metrics_buffer` is zero, which would make the channel permanently full.
    ZeroMetricsBuffer,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSubsystems => write!(f, "no subsystems registered for the simulation"),
            Self::UnknownSubsystemType { type_tag } => {
                write!(f, "unknown subsystem type: {type_tag}")
            }
            Self::InvalidTickDuration => write!(f, "tick_duration must be greater than zero"),
            Self::ZeroMetricsBuffer => write!(f, "metrics_buffer must be at least 1"),
        }
    }
}

impl Error for ConfigError {}

/// Errors raised by kernel lifecycle operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KernelError {
    /// `run()` was called before `bootstrap()`.
    NotBootstrapped,
    /// `register_subsystems()` was called after `bootstrap()` already ran.
    AlreadyRegistered,
    /// `run()` was called while the kernel is already running.
    AlreadyRunning,
    /// Bootstrap found no subsystems to schedule.
    Config(ConfigError),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotBootstrapped => write!(f, "kernel must be bootstrapped before running"),
            Self::AlreadyRegistered => write!(f, "cannot register subsystems after bootstrap"),
            Self::AlreadyRunning => write!(f, "kernel is already running"),
            Self::Config(inner) => write!(f, "configuration error: {inner}"),
        }
    }
}

impl Error for KernelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<ConfigError> for KernelError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Errors raised by [`crate::Controller`] control-plane operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControllerError {
    /// `set_control` was called with a key that does not name a [`crate::ControlState`] field.
    UnknownControl {
        /// The unrecognized control key.
        key: String,
    },
    /// `start()` was called while the controller is already running.
    AlreadyRunning,
    /// Bootstrapping the kernel failed when starting the simulation.
    Kernel(KernelError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownControl { key } => write!(f, "unknown control: {key}"),
            Self::AlreadyRunning => write!(f, "simulation already running"),
            Self::Kernel(inner) => write!(f, "kernel error: {inner}"),
        }
    }
}

impl Error for ControllerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Kernel(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<KernelError> for ControllerError {
    fn from(value: KernelError) -> Self {
        Self::Kernel(value)
    }
}
