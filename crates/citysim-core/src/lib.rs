//! Scheduling kernel for the city simulation.
//!
//! This crate owns the tick-synchronized scheduling machinery: the shared
//! [`Context`], the [`Subsystem`] worker template, the [`Kernel`] that
//! drives a barrier-synchronized tick loop across one thread per
//! subsystem, and the [`Controller`] that runs the kernel as a background
//! service. It knows nothing about what a subsystem actually computes —
//! concrete traffic, energy, waste and emergency models live in
//! `citysim-subsystems`.
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod barrier;
mod context;
mod control;
mod controller;
mod error;
mod factory;
mod kernel;
mod metrics;
mod subsystem;

pub use barrier::{BarrierWaitResult, TickBarrier};
pub use context::Context;
pub use control::{ControlState, ControlValue};
pub use controller::Controller;
pub use error::{ConfigError, ControllerError, KernelError};
pub use factory::SubsystemFactory;
pub use kernel::{Kernel, KernelConfig, SubsystemConfig};
pub use metrics::{MetricValue, MetricsEvent, MetricsEventKind, MetricsSnapshot};
pub use subsystem::{Subsystem, SubsystemContext, SubsystemId};
