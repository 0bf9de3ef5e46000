//! The container trait: the lifecycle shell around a model, independent of
//! which parallelism schema actually schedules its ticks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::Notify;

use crate::identity::Identifier;
use crate::model::ModelHandle;
use crate::provider::Provider;
use crate::registry::ModelRegistry;

/// Default interval used by `track_performance`'s rolling-average estimate.
pub const PERFORMANCE_INTERVAL: Duration = Duration::from_secs(1);

/// The lifecycle shell around a model: start, pause, resume, kill, tune the
/// update rate, and report rolling performance — independent of whether the
/// model runs on a dedicated worker or a shared pool.
pub trait Container: Send + Sync {
    /// The model this container owns.
    fn model_id(&self) -> Identifier;

    /// Wakes the container if it is parked waiting for work. A no-op if it
    /// is already awake or scheduled.
    fn notify_work(&self);

    /// Pauses the container: its model stops accepting and processing new
    /// signals until `resume` is called.
    fn pause(&self);

    /// Resumes a paused container.
    fn resume(&self);

    /// Irreversibly stops the container. Idempotent: dispatches an `exit`
    /// signal through the registry so the model observes its own closure
    /// via ordinary signal plumbing, in addition to flipping the container's
    /// own running flag.
    fn kill(&self);

    /// Sets the minimum period between ticks (`0` means "as fast as work
    /// arrives").
    fn set_update_rate(&self, hz: f64);

    /// Whether this container is currently paused.
    fn is_paused(&self) -> bool;

    /// Whether the container's worker loop is still executing.
    fn is_alive(&self) -> bool;

    /// Whether the container has not yet been killed.
    fn is_running(&self) -> bool;

    /// The rolling average tick duration, in nanoseconds.
    fn approximate_loop_nanos(&self) -> u64;
}

/// Fields common to every parallelism schema's container implementation.
pub(crate) struct ContainerState {
    pub model: Arc<ModelHandle>,
    pub provider: Weak<Provider>,
    pub registry: Weak<ModelRegistry>,
    pub gate: Notify,
    pub gate_signaled: AtomicBool,
    pub running: AtomicBool,
    pub alive: AtomicBool,
    pub paused: AtomicBool,
    pub kill_dispatched: AtomicBool,
    pub pause_monitor: Mutex<()>,
    pub min_loop_period_nanos: AtomicU64,
    pub avg_loop_duration_nanos: AtomicU64,
}

impl ContainerState {
    pub fn new(model: Arc<ModelHandle>, provider: Weak<Provider>, registry: Weak<ModelRegistry>) -> Self {
        Self {
            model,
            provider,
            registry,
            gate: Notify::new(),
            gate_signaled: AtomicBool::new(false),
            running: AtomicBool::new(true),
            alive: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            kill_dispatched: AtomicBool::new(false),
            pause_monitor: Mutex::new(()),
            min_loop_period_nanos: AtomicU64::new(0),
            avg_loop_duration_nanos: AtomicU64::new(0),
        }
    }

    pub fn notify_work(&self) {
        self.gate_signaled.store(true, Ordering::Release);
        self.gate.notify_one();
    }

    /// Waits until work is signaled, returning immediately if a
    /// notification is already pending.
    pub async fn wait_for_gate(&self) {
        if self.gate_signaled.swap(false, Ordering::AcqRel) {
            return;
        }
        self.gate.notified().await;
        self.gate_signaled.store(false, Ordering::Release);
    }

    pub fn pause(&self) {
        let _guard = self.pause_monitor.lock().unwrap_or_else(|poison| poison.into_inner());
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        let _guard = self.pause_monitor.lock().unwrap_or_else(|poison| poison.into_inner());
        self.paused.store(false, Ordering::Release);
        self.notify_work();
    }

    pub fn kill(&self) {
        self.running.store(false, Ordering::Release);
        self.notify_work();
        if self.kill_dispatched.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.request_kill(self.model.id());
        }
    }

    pub fn set_update_rate(&self, hz: f64) {
        let nanos = if hz <= 0.0 { 0 } else { (1_000_000_000.0 / hz) as u64 };
        self.min_loop_period_nanos.store(nanos, Ordering::Relaxed);
    }

    pub fn min_loop_period(&self) -> Duration {
        Duration::from_nanos(self.min_loop_period_nanos.load(Ordering::Relaxed))
    }

    /// Updates the rolling average tick duration using an exponentially
    /// weighted estimate of how many ticks occur per `PERFORMANCE_INTERVAL`.
    pub fn track_performance(&self, elapsed: Duration) {
        let interval_nanos = PERFORMANCE_INTERVAL.as_nanos() as f64;
        let avg_nanos = self.avg_loop_duration_nanos.load(Ordering::Relaxed) as f64;
        let avg_for_calc = avg_nanos.max(1.0);
        let est_iters = interval_nanos / avg_for_calc;
        let new_avg = (avg_nanos * est_iters + elapsed.as_nanos() as f64) / (est_iters + 1.0);
        self.avg_loop_duration_nanos.store(new_avg as u64, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn provider_running(&self) -> bool {
        self.provider.upgrade().is_some_and(|p| p.is_running())
    }
}
