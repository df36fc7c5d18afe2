//! The tick-synchronized scheduler: barrier, state machine, metrics queue.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::control::{ControlState, ControlValue};
use crate::context::Context;
use crate::error::{ConfigError, KernelError};
use crate::factory::SubsystemFactory;
use crate::metrics::{MetricsEvent, MetricsSnapshot};
use crate::subsystem::{Subsystem, SubsystemContext, SubsystemId};
use crate::{BarrierWaitResult, TickBarrier};

const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Per-subsystem configuration: which concrete type to build, what to name
/// its thread, and an opaque, scenario-specific parameter bag.
#[derive(Clone, Debug)]
pub struct SubsystemConfig {
    /// The registry key consulted by [`SubsystemFactory::build`].
    pub type_tag: String,
    /// The OS thread name the worker will run under.
    pub thread_name: String,
    /// Scenario-specific construction parameters, opaque to the kernel.
    pub params: HashMap<String, ControlValue>,
}

/// Configuration consumed by [`Kernel::new`].
#[derive(Clone, Debug)]
pub struct KernelConfig {
    /// Target wall-clock duration of a tick; the kernel sleeps out the
    /// remainder after each tick's work completes.
    pub tick_duration: Duration,
    /// Capacity of the bounded metrics event channel.
    pub metrics_buffer: usize,
    /// The subsystems to build at bootstrap time, keyed by id.
    pub subsystems: Vec<(SubsystemId, SubsystemConfig)>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            tick_duration: Duration::from_millis(500),
            metrics_buffer: 256,
            subsystems: Vec::new(),
        }
    }
}

impl KernelConfig {
    /// Validate structural invariants before bootstrap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subsystems.is_empty() {
            return Err(ConfigError::NoSubsystems);
        }
        if self.tick_duration.is_zero() {
            return Err(ConfigError::InvalidTickDuration);
        }
        if self.metrics_buffer == 0 {
            return Err(ConfigError::ZeroMetricsBuffer);
        }
        Ok(())
    }
}

/// A manual-reset event: once `set`, every waiter wakes and stays woken
/// until `clear` is called again.
struct ManualResetEvent {
    flag: Mutex<bool>,
    condvar: Condvar,
}

impl ManualResetEvent {
    fn new(initial: bool) -> Self {
        Self {
            flag: Mutex::new(initial),
            condvar: Condvar::new(),
        }
    }

    fn set(&self) {
        *self.flag.lock().expect("event mutex poisoned") = true;
        self.condvar.notify_all();
    }

    fn clear(&self) {
        *self.flag.lock().expect("event mutex poisoned") = false;
    }

    fn is_set(&self) -> bool {
        *self.flag.lock().expect("event mutex poisoned")
    }
}

struct WorkerSpec {
    id: SubsystemId,
    thread_name: String,
    subsystem: Box<dyn Subsystem>,
}

/// Coordinates lifecycle and barrier synchronization of subsystem worker
/// threads.
///
/// A `Kernel` is always used behind an `Arc`: `run()` spawns one OS thread
/// per subsystem, each holding its own clone of the `Arc<Kernel>` to call
/// back into `publish_metrics` and to share the tick barrier.
pub struct Kernel {
    config: KernelConfig,
    max_ticks: Option<u64>,
    context: Context,
    pending_workers: Mutex<Vec<WorkerSpec>>,
    bootstrapped: AtomicBool,
    barrier: Mutex<Option<Arc<TickBarrier>>>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    tick_index: AtomicU64,
    running: ManualResetEvent,
    metrics_tx: Sender<MetricsEvent>,
    metrics_rx: Receiver<MetricsEvent>,
}

impl Kernel {
    /// Validate `config` and construct a kernel ready for
    /// [`register_subsystems`](Kernel::register_subsystems) and
    /// [`bootstrap`](Kernel::bootstrap).
    ///
    /// `max_ticks` bounds the number of ticks `run()` will execute;
    /// `None` means unlimited, matching the reference scheduler. Unlike
    /// the reference, `Some(0)` means `run()` returns immediately without
    /// starting any worker threads — an explicit zero should do what it
    /// says for a typed API.
    pub fn new(config: KernelConfig, max_ticks: Option<u64>) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let (metrics_tx, metrics_rx) = bounded(config.metrics_buffer);
        Ok(Arc::new(Self {
            config,
            max_ticks,
            context: Context::new(),
            pending_workers: Mutex::new(Vec::new()),
            bootstrapped: AtomicBool::new(false),
            barrier: Mutex::new(None),
            worker_handles: Mutex::new(Vec::new()),
            tick_index: AtomicU64::new(0),
            running: ManualResetEvent::new(false),
            metrics_tx,
            metrics_rx,
        }))
    }

    /// Register pre-built subsystem workers before bootstrapping.
    ///
    /// Returns [`KernelError::AlreadyRegistered`] once [`bootstrap`](Kernel::bootstrap)
    /// has already run.
    pub fn register_subsystems(
        &self,
        subsystems: Vec<(SubsystemId, String, Box<dyn Subsystem>)>,
    ) -> Result<(), KernelError> {
        if self.bootstrapped.load(Ordering::Acquire) {
            return Err(KernelError::AlreadyRegistered);
        }
        let mut pending = self.pending_workers.lock().expect("pending_workers poisoned");
        pending.extend(
            subsystems
                .into_iter()
                .map(|(id, thread_name, subsystem)| WorkerSpec {
                    id,
                    thread_name,
                    subsystem,
                }),
        );
        Ok(())
    }

    /// Build any not-yet-registered subsystems from configuration via
    /// `factory`, then size the tick barrier.
    ///
    /// If subsystems were already supplied via
    /// [`register_subsystems`](Kernel::register_subsystems), those are
    /// used as-is and `factory` is not consulted.
    pub fn bootstrap(&self, factory: &SubsystemFactory) -> Result<(), KernelError> {
        let mut pending = self.pending_workers.lock().expect("pending_workers poisoned");
        if pending.is_empty() {
            for (id, subsystem_config) in &self.config.subsystems {
                let subsystem = factory.build(subsystem_config)?;
                pending.push(WorkerSpec {
                    id: id.clone(),
                    thread_name: subsystem_config.thread_name.clone(),
                    subsystem,
                });
            }
        }
        if pending.is_empty() {
            return Err(ConfigError::NoSubsystems.into());
        }
        *self.barrier.lock().expect("barrier mutex poisoned") =
            Some(Arc::new(TickBarrier::new(pending.len() + 1)));
        self.bootstrapped.store(true, Ordering::Release);
        Ok(())
    }

    /// Run the tick loop on the calling thread, spawning one worker thread
    /// per bootstrapped subsystem.
    ///
    /// Blocks until `max_ticks` is reached (if set) or [`shutdown`](Kernel::shutdown)
    /// aborts the barrier from another thread. Returns
    /// [`KernelError::NotBootstrapped`] if called before `bootstrap()`, or
    /// [`KernelError::AlreadyRunning`] if called while already running.
    pub fn run(self: &Arc<Self>) -> Result<(), KernelError> {
        if self.running.is_set() {
            return Err(KernelError::AlreadyRunning);
        }
        if !self.bootstrapped.load(Ordering::Acquire) {
            return Err(KernelError::NotBootstrapped);
        }

        let barrier = self
            .barrier
            .lock()
            .expect("barrier mutex poisoned")
            .clone()
            .ok_or(KernelError::NotBootstrapped)?;
        let workers = std::mem::take(
            &mut *self.pending_workers.lock().expect("pending_workers poisoned"),
        );
        if workers.is_empty() {
            return Err(KernelError::NotBootstrapped);
        }

        self.running.set();

        let mut handles = Vec::with_capacity(workers.len());
        for WorkerSpec {
            id,
            thread_name,
            subsystem,
        } in workers
        {
            let kernel = Arc::clone(self);
            let worker_barrier = Arc::clone(&barrier);
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || kernel.run_worker(id, worker_barrier, subsystem))
                .expect("failed to spawn subsystem worker thread");
            handles.push(handle);
        }
        *self.worker_handles.lock().expect("worker_handles poisoned") = handles;

        self.run_tick_loop(&barrier);
        self.running.clear();
        Ok(())
    }

    fn run_tick_loop(&self, barrier: &TickBarrier) {
        let mut tick: u64 = 0;
        loop {
            if !self.should_continue(tick) {
                break;
            }

            while self.running.is_set() && self.context.control_state().paused {
                thread::sleep(PAUSE_POLL_INTERVAL);
            }
            if !self.running.is_set() {
                break;
            }

            let tick_start = Instant::now();
            match barrier.wait() {
                BarrierWaitResult::Aborted => break,
                BarrierWaitResult::Proceed => {}
            }

            tick += 1;
            self.tick_index.store(tick, Ordering::Release);

            let elapsed = tick_start.elapsed();
            if elapsed < self.config.tick_duration {
                thread::sleep(self.config.tick_duration - elapsed);
            }
        }
        barrier.abort();
    }

    fn should_continue(&self, ticks_completed: u64) -> bool {
        if !self.running.is_set() {
            return false;
        }
        match self.max_ticks {
            None => true,
            Some(max_ticks) => ticks_completed < max_ticks,
        }
    }

    fn run_worker(
        self: Arc<Self>,
        id: SubsystemId,
        barrier: Arc<TickBarrier>,
        mut subsystem: Box<dyn Subsystem>,
    ) {
        let sub_ctx = SubsystemContext::new(&self.context, id.clone());

        if catch_unwind(AssertUnwindSafe(|| subsystem.on_start(&sub_ctx))).is_err() {
            tracing::error!(subsystem = %id, "on_start panicked");
        }

        let mut tick: u64 = 0;
        loop {
            match barrier.wait() {
                BarrierWaitResult::Aborted => break,
                BarrierWaitResult::Proceed => {}
            }

            let result = catch_unwind(AssertUnwindSafe(|| {
                subsystem.before_tick(&sub_ctx);
                subsystem.execute_tick(&sub_ctx);
                subsystem.after_tick(&sub_ctx);
                subsystem.collect_metrics(&sub_ctx)
            }));

            match result {
                Ok(metrics) => {
                    if let Some(metrics) = metrics {
                        self.publish_metrics(id.clone(), tick, metrics);
                    }
                }
                Err(_) => {
                    tracing::error!(subsystem = %id, tick, "subsystem panicked during tick");
                    break;
                }
            }
            tick += 1;
        }

        if catch_unwind(AssertUnwindSafe(|| subsystem.on_stop(&sub_ctx))).is_err() {
            tracing::error!(subsystem = %id, "on_stop panicked");
        }
    }

    /// Record `metrics` in the shared context and enqueue a
    /// [`MetricsEvent`]; never blocks. If the metrics channel is full the
    /// event is dropped and noted at debug level.
    pub fn publish_metrics(&self, subsystem: SubsystemId, tick: u64, metrics: MetricsSnapshot) {
        self.context.update(subsystem.clone(), tick, metrics.clone());
        match self
            .metrics_tx
            .try_send(MetricsEvent::metrics(tick, subsystem.clone(), metrics))
        {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!(subsystem = %subsystem, tick, "metrics event dropped: channel full");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Block for up to `timeout` waiting for the next metrics event.
    pub fn metrics_stream(&self, timeout: Duration) -> Option<MetricsEvent> {
        self.metrics_rx.recv_timeout(timeout).ok()
    }

    /// Replace the shared control state.
    pub fn set_control_state(&self, controls: ControlState) {
        self.context.set_control_state(controls);
    }

    /// The tick index most recently completed by the kernel loop.
    pub fn current_tick(&self) -> u64 {
        self.tick_index.load(Ordering::Acquire)
    }

    /// Whether the kernel's tick loop is currently running.
    pub fn is_running(&self) -> bool {
        self.running.is_set()
    }

    /// Access the shared context, e.g. for an external dashboard reading
    /// a full snapshot.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Signal every subsystem thread to stop and wait (bounded) for them
    /// to exit.
    ///
    /// Safe to call whether or not `run()` has returned: aborting an
    /// already-aborted barrier is a no-op, and an empty handle list joins
    /// instantly.
    pub fn shutdown(&self) {
        self.running.clear();
        if let Some(barrier) = self.barrier.lock().expect("barrier mutex poisoned").as_ref() {
            barrier.abort();
        }

        let handles = std::mem::take(&mut *self.worker_handles.lock().expect("worker_handles poisoned"));
        for handle in handles {
            let name = handle
                .thread()
                .name()
                .unwrap_or("subsystem")
                .to_string();
            let deadline = Instant::now() + SHUTDOWN_JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(SHUTDOWN_POLL_INTERVAL);
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                tracing::warn!(thread = %name, "subsystem did not terminate cleanly within shutdown timeout");
            }
        }

        let _ = self.metrics_tx.try_send(MetricsEvent::shutdown());
    }

    /// Return the kernel to its pre-bootstrap state: stop if running,
    /// clear the tick counter and shared context, and forget the current
    /// barrier so `bootstrap()` can be called again.
    pub fn reset(&self) {
        self.shutdown();
        self.tick_index.store(0, Ordering::Release);
        self.context.reset();
        self.pending_workers.lock().expect("pending_workers poisoned").clear();
        *self.barrier.lock().expect("barrier mutex poisoned") = None;
        self.bootstrapped.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystem::Subsystem;
    use std::sync::atomic::AtomicUsize;

    struct CountingSubsystem {
        id: SubsystemId,
        ticks: Arc<AtomicUsize>,
    }

    impl Subsystem for CountingSubsystem {
        fn execute_tick(&mut self, _ctx: &SubsystemContext<'_>) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }

        fn collect_metrics(&mut self, _ctx: &SubsystemContext<'_>) -> Option<MetricsSnapshot> {
            let mut snapshot = MetricsSnapshot::new();
            snapshot.insert(
                "ticks".to_string(),
                crate::MetricValue::Int(self.ticks.load(Ordering::SeqCst) as i64),
            );
            Some(snapshot)
        }
    }

    fn single_subsystem_config() -> KernelConfig {
        KernelConfig {
            tick_duration: Duration::from_millis(1),
            metrics_buffer: 16,
            subsystems: vec![(
                SubsystemId::new("counter"),
                SubsystemConfig {
                    type_tag: "counting".to_string(),
                    thread_name: "counter".to_string(),
                    params: HashMap::new(),
                },
            )],
        }
    }

    #[test]
    fn run_before_bootstrap_errors() {
        let kernel = Kernel::new(single_subsystem_config(), Some(1)).unwrap();
        assert_eq!(kernel.run(), Err(KernelError::NotBootstrapped));
    }

    #[test]
    fn fixed_horizon_run_stops_after_max_ticks() {
        let kernel = Kernel::new(single_subsystem_config(), Some(3)).unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));
        kernel
            .register_subsystems(vec![(
                SubsystemId::new("counter"),
                "counter".to_string(),
                Box::new(CountingSubsystem {
                    id: SubsystemId::new("counter"),
                    ticks: Arc::clone(&ticks),
                }),
            )])
            .unwrap();
        let mut factory = SubsystemFactory::new();
        factory.register("counting", |_cfg| {
            panic!("should not be invoked when pre-registered")
        });
        kernel.bootstrap(&factory).unwrap();
        kernel.run().unwrap();
        kernel.shutdown();
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(kernel.current_tick(), 3);
    }

    #[test]
    fn zero_max_ticks_runs_nothing_but_does_not_error() {
        let kernel = Kernel::new(single_subsystem_config(), Some(0)).unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));
        kernel
            .register_subsystems(vec![(
                SubsystemId::new("counter"),
                "counter".to_string(),
                Box::new(CountingSubsystem {
                    id: SubsystemId::new("counter"),
                    ticks: Arc::clone(&ticks),
                }),
            )])
            .unwrap();
        let mut factory = SubsystemFactory::new();
        factory.register("counting", |_cfg| unreachable!());
        kernel.bootstrap(&factory).unwrap();
        kernel.run().unwrap();
        kernel.shutdown();
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn pause_halts_tick_progress() {
        let kernel = Kernel::new(single_subsystem_config(), None).unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));
        kernel
            .register_subsystems(vec![(
                SubsystemId::new("counter"),
                "counter".to_string(),
                Box::new(CountingSubsystem {
                    id: SubsystemId::new("counter"),
                    ticks: Arc::clone(&ticks),
                }),
            )])
            .unwrap();
        let mut factory = SubsystemFactory::new();
        factory.register("counting", |_cfg| unreachable!());
        kernel.bootstrap(&factory).unwrap();

        let mut paused_controls = ControlState::default();
        paused_controls.paused = true;
        kernel.set_control_state(paused_controls);

        let kernel_for_thread = Arc::clone(&kernel);
        let handle = thread::spawn(move || kernel_for_thread.run());
        thread::sleep(Duration::from_millis(50));
        let observed_while_paused = ticks.load(Ordering::SeqCst);

        kernel.shutdown();
        handle.join().unwrap().unwrap();
        assert_eq!(observed_while_paused, 0);
    }

    #[test]
    fn reset_allows_a_fresh_bootstrap() {
        let kernel = Kernel::new(single_subsystem_config(), Some(1)).unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));
        kernel
            .register_subsystems(vec![(
                SubsystemId::new("counter"),
                "counter".to_string(),
                Box::new(CountingSubsystem {
                    id: SubsystemId::new("counter"),
                    ticks: Arc::clone(&ticks),
                }),
            )])
            .unwrap();
        let mut factory = SubsystemFactory::new();
        factory.register("counting", |_cfg| unreachable!());
        kernel.bootstrap(&factory).unwrap();
        kernel.run().unwrap();
        kernel.shutdown();
        assert_eq!(kernel.current_tick(), 1);

        kernel.reset();
        assert_eq!(kernel.current_tick(), 0);
        assert_eq!(
            kernel.register_subsystems(vec![(
                SubsystemId::new("counter"),
                "counter".to_string(),
                Box::new(CountingSubsystem {
                    id: SubsystemId::new("counter"),
                    ticks,
                }),
            )]),
            Ok(())
        );
    }

    #[test]
    fn register_after_bootstrap_errors() {
        let kernel = Kernel::new(single_subsystem_config(), Some(1)).unwrap();
        let mut factory = SubsystemFactory::new();
        factory.register("counting", |_cfg| {
            Box::new(CountingSubsystem {
                id: SubsystemId::new("counter"),
                ticks: Arc::new(AtomicUsize::new(0)),
            })
        });
        kernel.bootstrap(&factory).unwrap();
        let err = kernel.register_subsystems(vec![]);
        assert_eq!(err, Err(KernelError::AlreadyRegistered));
    }

    #[test]
    fn bootstrap_without_subsystems_errors() {
        let config = KernelConfig {
            tick_duration: Duration::from_millis(1),
            metrics_buffer: 4,
            subsystems: vec![],
        };
        assert_eq!(config.validate(), Err(ConfigError::NoSubsystems));
    }
}
