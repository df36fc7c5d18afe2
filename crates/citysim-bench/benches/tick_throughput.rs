//! Benchmarks the scheduling kernel's tick throughput with the four
//! reference subsystems wired in, isolating scheduler overhead from any
//! particular subsystem's arithmetic cost.

use std::collections::HashMap;
use std::time::Duration;

use citysim_core::{Kernel, KernelConfig, SubsystemConfig, SubsystemFactory, SubsystemId};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

const TICKS: u64 = 200;

fn subsystem_config(type_tag: &str) -> SubsystemConfig {
    SubsystemConfig {
        type_tag: type_tag.to_string(),
        thread_name: type_tag.to_string(),
        params: HashMap::new(),
    }
}

fn reference_config() -> KernelConfig {
    KernelConfig {
        tick_duration: Duration::from_millis(0),
        metrics_buffer: 1024,
        subsystems: vec![
            (SubsystemId::new("traffic"), subsystem_config("traffic")),
            (SubsystemId::new("energy"), subsystem_config("energy")),
            (SubsystemId::new("waste"), subsystem_config("waste")),
            (SubsystemId::new("emergency"), subsystem_config("emergency")),
        ],
    }
}

fn four_subsystem_run(c: &mut Criterion) {
    let mut factory = SubsystemFactory::new();
    citysim_subsystems::register_all(&mut factory);

    c.bench_function("four_subsystems_200_ticks", |b| {
        b.iter_batched(
            || {
                let kernel = Kernel::new(reference_config(), Some(TICKS)).unwrap();
                kernel.bootstrap(&factory).unwrap();
                kernel
            },
            |kernel| {
                kernel.run().unwrap();
                kernel.shutdown();
            },
            BatchSize::SmallInput,
        );
    });
}

fn single_subsystem_run(c: &mut Criterion) {
    let mut factory = SubsystemFactory::new();
    citysim_subsystems::register_all(&mut factory);

    c.bench_function("single_subsystem_200_ticks", |b| {
        b.iter_batched(
            || {
                let config = KernelConfig {
                    tick_duration: Duration::from_millis(0),
                    metrics_buffer: 1024,
                    subsystems: vec![(SubsystemId::new("traffic"), subsystem_config("traffic"))],
                };
                let kernel = Kernel::new(config, Some(TICKS)).unwrap();
                kernel.bootstrap(&factory).unwrap();
                kernel
            },
            |kernel| {
                kernel.run().unwrap();
                kernel.shutdown();
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, four_subsystem_run, single_subsystem_run);
criterion_main!(benches);
