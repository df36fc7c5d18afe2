//! Citysim Quickstart — a complete, minimal simulation from scratch.
//!
//! Demonstrates:
//!   1. Building a `KernelConfig` with the four reference subsystems
//!   2. Registering subsystem constructors with a `SubsystemFactory`
//!   3. Bootstrapping and running the kernel's tick loop
//!   4. Draining the bounded metrics stream while the run is in flight
//!   5. Pausing, resuming, and resetting via `set_control_state`
//!
//! Run with:
//!   cargo run -p citysim-quickstart

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use citysim_core::{ControlState, Kernel, KernelConfig, SubsystemConfig, SubsystemFactory, SubsystemId};

fn subsystem_config(type_tag: &str) -> SubsystemConfig {
    SubsystemConfig {
        type_tag: type_tag.to_string(),
        thread_name: type_tag.to_string(),
        params: HashMap::new(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("=== Citysim Quickstart ===\n");

    // 1. Build kernel configuration: four subsystems, short ticks for a
    //    snappy demo, a generous metrics buffer.
    let config = KernelConfig {
        tick_duration: Duration::from_millis(50),
        metrics_buffer: 256,
        subsystems: vec![
            (SubsystemId::new("traffic"), subsystem_config("traffic")),
            (SubsystemId::new("energy"), subsystem_config("energy")),
            (SubsystemId::new("waste"), subsystem_config("waste")),
            (SubsystemId::new("emergency"), subsystem_config("emergency")),
        ],
    };

    let kernel = Kernel::new(config, Some(20))?;
    tracing::info!(subsystems = 4, max_ticks = 20, "kernel configured");

    // 2. Register the reference subsystem constructors.
    let mut factory = SubsystemFactory::new();
    citysim_subsystems::register_all(&mut factory);

    // 3. Bootstrap and launch the tick loop on a background thread.
    kernel.bootstrap(&factory)?;
    let kernel_for_run = Arc::clone(&kernel);
    let run_handle = thread::spawn(move || kernel_for_run.run());

    // 4. Drain the metrics stream on the calling thread until shutdown.
    println!("Running 20 ticks across traffic/energy/waste/emergency...\n");
    loop {
        match kernel.metrics_stream(Duration::from_secs(1)) {
            Some(event) if event.kind == citysim_core::MetricsEventKind::Shutdown => {
                tracing::info!("metrics stream closed");
                break;
            }
            Some(event) => {
                tracing::debug!(tick = event.tick, subsystem = %event.subsystem, "metrics event received");
                if event.tick % 5 == 0 {
                    println!("  tick {:>3} [{}]: {:?}", event.tick, event.subsystem, event.metrics);
                }
            }
            None => break,
        }
    }

    run_handle.join().expect("kernel thread panicked")?;
    kernel.shutdown();

    // 5. Demonstrate pause/resume via a fresh short run.
    println!("\nDemonstrating pause/resume on a fresh run...");
    kernel.reset();
    kernel.bootstrap(&factory)?;
    let mut paused = ControlState::default();
    paused.paused = true;
    kernel.set_control_state(paused);

    let kernel_for_pause_run = Arc::clone(&kernel);
    let pause_handle = thread::spawn(move || kernel_for_pause_run.run());
    thread::sleep(Duration::from_millis(200));
    tracing::info!(tick = kernel.current_tick(), "paused");
    println!("  tick counter while paused: {}", kernel.current_tick());

    kernel.set_control_state(ControlState::default());
    thread::sleep(Duration::from_millis(200));
    kernel.shutdown();
    pause_handle.join().expect("kernel thread panicked")?;
    tracing::info!(tick = kernel.current_tick(), "resumed and shut down");
    println!("  tick counter after resume + shutdown: {}", kernel.current_tick());

    println!("\nDone.");
    Ok(())
}
