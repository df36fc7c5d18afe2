//! Background orchestrator that runs a [`Kernel`] as a service.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::control::{ControlState, ControlValue};
use crate::error::ControllerError;
use crate::factory::SubsystemFactory;
use crate::kernel::Kernel;
use crate::metrics::{MetricsEventKind, MetricsSnapshot};
use crate::subsystem::SubsystemId;

const HISTORY_LIMIT: usize = 300;
const METRICS_POLL_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_EMERGENCY_DURATION: Duration = Duration::from_secs(5);

type Listener = Box<dyn Fn(&ControlState) + Send + Sync>;

/// Runs a [`Kernel`] on a background thread and aggregates its metrics
/// stream into a bounded per-subsystem history, exposing a small
/// control-plane surface (`start`/`stop`/`reset`, pause, and named
/// control updates) for a driver such as a UI or CLI.
pub struct Controller {
    kernel: Arc<Kernel>,
    factory: Arc<SubsystemFactory>,
    controls: Arc<Mutex<ControlState>>,
    listeners: Arc<Mutex<Vec<Listener>>>,
    history: Arc<Mutex<HashMap<SubsystemId, VecDeque<(u64, MetricsSnapshot)>>>>,
    stop_flag: Arc<AtomicBool>,
    lifecycle_lock: Mutex<()>,
    kernel_thread: Mutex<Option<JoinHandle<()>>>,
    metrics_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Controller {
    /// Create a controller around `kernel`, using `factory` to build
    /// subsystems from configuration on each `start()`/`reset()`.
    pub fn new(kernel: Arc<Kernel>, factory: Arc<SubsystemFactory>) -> Self {
        Self {
            kernel,
            factory,
            controls: Arc::new(Mutex::new(ControlState::default())),
            listeners: Arc::new(Mutex::new(Vec::new())),
            history: Arc::new(Mutex::new(HashMap::new())),
            stop_flag: Arc::new(AtomicBool::new(true)),
            lifecycle_lock: Mutex::new(()),
            kernel_thread: Mutex::new(None),
            metrics_thread: Mutex::new(None),
        }
    }

    /// Bootstrap and start the kernel on a background thread, along with
    /// a metrics-aggregation thread.
    ///
    /// Returns [`ControllerError::AlreadyRunning`] if a previous run's
    /// kernel thread is still alive.
    pub fn start(&self) -> Result<(), ControllerError> {
        let _lifecycle = self.lifecycle_lock.lock().expect("lifecycle mutex poisoned");
        let mut kernel_thread_guard = self.kernel_thread.lock().expect("kernel_thread poisoned");
        if kernel_thread_guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(ControllerError::AlreadyRunning);
        }

        self.kernel.reset();
        self.kernel.bootstrap(&self.factory)?;

        let snapshot = *self.controls.lock().expect("controls mutex poisoned");
        self.kernel.set_control_state(snapshot);
        self.stop_flag.store(false, Ordering::SeqCst);

        let kernel_for_run = Arc::clone(&self.kernel);
        let stop_flag_for_run = Arc::clone(&self.stop_flag);
        *kernel_thread_guard = Some(
            thread::Builder::new()
                .name("citysim-kernel".to_string())
                .spawn(move || {
                    if let Err(err) = kernel_for_run.run() {
                        tracing::error!(error = %err, "kernel encountered an unrecoverable error");
                    }
                    stop_flag_for_run.store(true, Ordering::SeqCst);
                })
                .expect("failed to spawn kernel thread"),
        );
        drop(kernel_thread_guard);

        let kernel_for_metrics = Arc::clone(&self.kernel);
        let stop_flag_for_metrics = Arc::clone(&self.stop_flag);
        let history = Arc::clone(&self.history);
        let mut metrics_thread_guard =
            self.metrics_thread.lock().expect("metrics_thread poisoned");
        *metrics_thread_guard = Some(
            thread::Builder::new()
                .name("citysim-metrics".to_string())
                .spawn(move || {
                    Self::consume_metrics(kernel_for_metrics, stop_flag_for_metrics, history);
                })
                .expect("failed to spawn metrics thread"),
        );

        Ok(())
    }

    fn consume_metrics(
        kernel: Arc<Kernel>,
        stop_flag: Arc<AtomicBool>,
        history: Arc<Mutex<HashMap<SubsystemId, VecDeque<(u64, MetricsSnapshot)>>>>,
    ) {
        while !stop_flag.load(Ordering::SeqCst) {
            let Some(event) = kernel.metrics_stream(METRICS_POLL_TIMEOUT) else {
                continue;
            };
            match event.kind {
                MetricsEventKind::Shutdown => break,
                MetricsEventKind::Metrics => {
                    let mut guard = history.lock().expect("history mutex poisoned");
                    let bucket = guard.entry(event.subsystem).or_default();
                    bucket.push_back((event.tick, event.metrics));
                    while bucket.len() > HISTORY_LIMIT {
                        bucket.pop_front();
                    }
                }
            }
        }
    }

    /// Pause the simulation (equivalent to `set_control("paused", true)`).
    pub fn pause(&self) -> Result<(), ControllerError> {
        self.set_control("paused", ControlValue::Bool(true))
    }

    /// Resume the simulation (equivalent to `set_control("paused", false)`).
    pub fn resume(&self) -> Result<(), ControllerError> {
        self.set_control("paused", ControlValue::Bool(false))
    }

    /// Flip the current pause state.
    pub fn toggle_pause(&self) -> Result<(), ControllerError> {
        let currently_paused = self.controls.lock().expect("controls mutex poisoned").paused;
        self.set_control("paused", ControlValue::Bool(!currently_paused))
    }

    /// Stop the kernel and background threads, then reinitialize controls
    /// and history to their defaults so the next `start()` begins fresh.
    pub fn reset(&self) {
        let _lifecycle = self.lifecycle_lock.lock().expect("lifecycle mutex poisoned");
        self.stop_flag.store(true, Ordering::SeqCst);
        self.kernel.shutdown();
        self.join_background_threads();
        *self.controls.lock().expect("controls mutex poisoned") = ControlState::default();
        self.kernel.reset();
        self.history.lock().expect("history mutex poisoned").clear();
        self.kernel.set_control_state(ControlState::default());
    }

    /// Stop the kernel and background threads without resetting controls
    /// or history.
    pub fn stop(&self) {
        let _lifecycle = self.lifecycle_lock.lock().expect("lifecycle mutex poisoned");
        self.stop_flag.store(true, Ordering::SeqCst);
        self.kernel.shutdown();
        self.join_background_threads();
    }

    fn join_background_threads(&self) {
        if let Some(handle) = self.kernel_thread.lock().expect("kernel_thread poisoned").take() {
            let _ = handle.join();
        }
        if let Some(handle) = self
            .metrics_thread
            .lock()
            .expect("metrics_thread poisoned")
            .take()
        {
            let _ = handle.join();
        }
    }

    /// Apply a single named control update and notify registered
    /// listeners.
    pub fn set_control(&self, key: &str, value: ControlValue) -> Result<(), ControllerError> {
        let snapshot = {
            let mut controls = self.controls.lock().expect("controls mutex poisoned");
            controls.set(key, value)?;
            *controls
        };
        self.kernel.set_control_state(snapshot);
        self.notify_listeners(&snapshot);
        Ok(())
    }

    fn notify_listeners(&self, controls: &ControlState) {
        for listener in self.listeners.lock().expect("listeners mutex poisoned").iter() {
            listener(controls);
        }
    }

    /// Register a callback invoked with the new [`ControlState`] whenever
    /// `set_control` succeeds.
    pub fn register_control_listener(
        &self,
        listener: impl Fn(&ControlState) + Send + Sync + 'static,
    ) {
        self.listeners
            .lock()
            .expect("listeners mutex poisoned")
            .push(Box::new(listener));
    }

    /// Set `emergency_override` and schedule it to clear automatically
    /// after `duration` (default 5 seconds via [`Controller::trigger_emergency_default`]).
    pub fn trigger_emergency(&self, duration: Duration) -> Result<(), ControllerError> {
        self.set_control("emergency_override", ControlValue::Bool(true))?;

        let controls = Arc::clone(&self.controls);
        let kernel = Arc::clone(&self.kernel);
        let listeners = Arc::clone(&self.listeners);
        thread::spawn(move || {
            thread::sleep(duration);
            let snapshot = {
                let mut guard = controls.lock().expect("controls mutex poisoned");
                if let Err(err) = guard.set("emergency_override", ControlValue::Bool(false)) {
                    tracing::debug!(error = %err, "failed to clear emergency override");
                    return;
                }
                *guard
            };
            kernel.set_control_state(snapshot);
            for listener in listeners.lock().expect("listeners mutex poisoned").iter() {
                listener(&snapshot);
            }
        });
        Ok(())
    }

    /// Convenience wrapper for [`Controller::trigger_emergency`] using the
    /// reference scheduler's default 5-second duration.
    pub fn trigger_emergency_default(&self) -> Result<(), ControllerError> {
        self.trigger_emergency(DEFAULT_EMERGENCY_DURATION)
    }

    /// Whether the kernel is running and a `stop`/`reset` has not since
    /// been requested.
    pub fn is_running(&self) -> bool {
        self.kernel.is_running() && !self.stop_flag.load(Ordering::SeqCst)
    }

    /// Return a copy of the accumulated per-subsystem metrics history,
    /// each bucket capped at the last 300 entries.
    pub fn get_history(&self) -> HashMap<SubsystemId, Vec<(u64, MetricsSnapshot)>> {
        self.history
            .lock()
            .expect("history mutex poisoned")
            .iter()
            .map(|(id, entries)| (id.clone(), entries.iter().cloned().collect()))
            .collect()
    }

    /// Current control state.
    pub fn controls(&self) -> ControlState {
        *self.controls.lock().expect("controls mutex poisoned")
    }
}
