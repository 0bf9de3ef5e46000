//! The supervised pool schema: a shared, dynamically-sized worker pool that
//! containers enqueue themselves onto when they have work.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tracing::{debug, info};

use crate::container::{Container, ContainerState};
use crate::identity::Identifier;
use crate::model::ModelHandle;
use crate::provider::Provider;
use crate::registry::ModelRegistry;
use crate::router::Router;
use crate::schema::ParallelismSchema;

const QUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(30);
const SUPERVISOR_TICK: Duration = Duration::from_millis(250);

/// A container scheduled onto the shared pool rather than a dedicated task.
pub struct PoolContainer {
    state: ContainerState,
    /// Re-entry counter: `notify_work` only enqueues on the 0→1 transition,
    /// so a container already queued or running is never double-scheduled.
    reentry: AtomicI64,
    /// Set while a pool worker is actively running this container's tick, so
    /// `kill` never reports the container dead out from under an in-flight
    /// `process_tick`.
    in_flight: AtomicBool,
    self_weak: std::sync::OnceLock<Weak<PoolContainer>>,
    schema: Weak<PoolSchema>,
}

impl PoolContainer {
    fn min_loop_period(&self) -> Duration {
        self.state.min_loop_period()
    }

    fn track_performance(&self, elapsed: Duration) {
        self.state.track_performance(elapsed);
    }

    /// Marks the container dead once it is both stopped and not currently
    /// being ticked by a pool worker. Called both from `kill` (covers a
    /// container that is idle or merely queued) and from `pool_worker` right
    /// after a tick finishes (covers a container killed while in flight).
    fn try_finalize_dead(&self) {
        if !self.state.is_running() && !self.in_flight.load(Ordering::Acquire) {
            self.state.alive.store(false, Ordering::Release);
        }
    }
}

impl Container for PoolContainer {
    fn model_id(&self) -> Identifier {
        self.state.model.id()
    }

    fn notify_work(&self) {
        let previous = self.reentry.fetch_add(1, Ordering::AcqRel);
        if previous > 0 {
            self.reentry.fetch_sub(1, Ordering::AcqRel);
            return;
        }
        self.state.gate_signaled.store(true, Ordering::Release);
        if let (Some(schema), Some(weak_self)) = (self.schema.upgrade(), self.self_weak.get()) {
            if let Some(this) = weak_self.upgrade() {
                schema.enqueue(this);
            }
        }
    }

    fn pause(&self) {
        self.state.pause();
    }

    fn resume(&self) {
        self.state.resume();
        self.notify_work();
    }

    fn kill(&self) {
        self.state.kill();
        self.try_finalize_dead();
    }

    fn set_update_rate(&self, hz: f64) {
        self.state.set_update_rate(hz);
    }

    fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    fn is_running(&self) -> bool {
        self.state.is_running()
    }

    fn approximate_loop_nanos(&self) -> u64 {
        self.state.avg_loop_duration_nanos.load(Ordering::Relaxed)
    }
}

/// Supervised-pool parallelism: a bounded number of worker tasks pull
/// ready containers off a shared queue, sized by `target_pools` and
/// `target_density` (how many containers each pool slot is expected to
/// carry).
pub struct PoolSchema {
    target_pools: AtomicUsize,
    target_density: AtomicUsize,
    goal_tx: watch::Sender<usize>,
    queue_tx: mpsc::UnboundedSender<Arc<PoolContainer>>,
    queue_rx: AsyncMutex<mpsc::UnboundedReceiver<Arc<PoolContainer>>>,
    containers: DashMap<Identifier, Arc<PoolContainer>>,
    supervisor_started: AtomicBool,
    provider: std::sync::Mutex<Option<Weak<Provider>>>,
    self_weak: std::sync::OnceLock<Weak<PoolSchema>>,
}

impl PoolSchema {
    /// Builds a new pool schema. `target_pools` caps the number of worker
    /// tasks; `target_density` is the number of containers each pool slot
    /// is sized to carry (actual worker count is
    /// `min(target_pools, max(1, live_containers / target_density))`).
    #[must_use]
    pub fn new(target_pools: usize, target_density: usize) -> Arc<Self> {
        let (goal_tx, _goal_rx) = watch::channel(0usize);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new_cyclic(|weak_self| Self {
            target_pools: AtomicUsize::new(target_pools.max(1)),
            target_density: AtomicUsize::new(target_density.max(1)),
            goal_tx,
            queue_tx,
            queue_rx: AsyncMutex::new(queue_rx),
            containers: DashMap::new(),
            supervisor_started: AtomicBool::new(false),
            provider: std::sync::Mutex::new(None),
            self_weak: std::sync::OnceLock::from(weak_self.clone()),
        })
    }

    /// Builds a pool schema from a validated [`crate::config::PoolSchemaConfig`].
    #[must_use]
    pub fn from_config(config: &crate::config::PoolSchemaConfig) -> Arc<Self> {
        Self::new(config.target_pools.into_inner(), config.target_density.into_inner())
    }

    fn self_arc(&self) -> Arc<Self> {
        self.self_weak
            .get()
            .and_then(Weak::upgrade)
            .expect("PoolSchema is always constructed via Arc::new_cyclic")
    }

    /// Updates the pool's target worker count.
    pub fn set_target_pools(&self, target_pools: usize) {
        self.target_pools.store(target_pools.max(1), Ordering::Relaxed);
    }

    /// Updates the pool's target density (containers per worker).
    pub fn set_target_density(&self, target_density: usize) {
        self.target_density.store(target_density.max(1), Ordering::Relaxed);
    }

    fn enqueue(&self, container: Arc<PoolContainer>) {
        let _ = self.queue_tx.send(container);
    }

    fn desired_worker_count(&self) -> usize {
        let containers = self.containers.len().max(1);
        let density = self.target_density.load(Ordering::Relaxed);
        let target_pools = self.target_pools.load(Ordering::Relaxed);
        target_pools.min(containers.div_ceil(density).max(1))
    }

    fn ensure_supervisor(&self) {
        if self.supervisor_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let schema = self.self_arc();
        tokio::spawn(async move { schema.supervise().await });
    }

    async fn supervise(self: Arc<Self>) {
        loop {
            let provider_alive = self
                .provider
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .as_ref()
                .and_then(Weak::upgrade)
                .is_some_and(|p| p.is_running());
            if !provider_alive {
                break;
            }
            let goal = self.desired_worker_count();
            let current = *self.goal_tx.borrow();
            if goal != current {
                info!(from = current, to = goal, "pool schema resizing worker count");
                let _ = self.goal_tx.send(goal);
                for ordinal in current..goal {
                    let schema = self.clone();
                    tokio::spawn(pool_worker(schema, ordinal + 1));
                }
            }
            tokio::time::sleep(SUPERVISOR_TICK).await;
        }
    }
}

/// One pool worker. `ordinal` is this worker's 1-based slot; it re-checks
/// its ordinal against the live goal on every iteration (not only at
/// spawn), so shrinking `target_pools` always converges to the right
/// worker count instead of leaking workers that were spawned when the goal
/// was higher.
async fn pool_worker(schema: Arc<PoolSchema>, ordinal: usize) {
    let mut goal_rx = schema.goal_tx.subscribe();
    loop {
        if ordinal > *goal_rx.borrow() {
            debug!(ordinal, "pool worker retiring: above current goal");
            return;
        }
        let next = {
            let mut rx = schema.queue_rx.lock().await;
            tokio::select! {
                maybe = rx.recv() => maybe,
                () = tokio::time::sleep(QUEUE_POLL_TIMEOUT) => None,
                changed = goal_rx.changed() => {
                    if changed.is_err() { return; }
                    continue;
                }
            }
        };
        let Some(container) = next else { continue };
        let previous = container.reentry.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous >= 1, "pool container dequeued without a pending re-entry");
        std::sync::atomic::fence(Ordering::SeqCst);
        if !container.is_running() || container.is_paused() {
            container.try_finalize_dead();
            continue;
        }
        container.in_flight.store(true, Ordering::Release);
        let tick_start = Instant::now();
        container.state.model.process_tick().await;
        let elapsed = tick_start.elapsed();
        container.track_performance(elapsed);
        container.in_flight.store(false, Ordering::Release);
        container.try_finalize_dead();
        let min_period = container.min_loop_period();
        if min_period > Duration::ZERO {
            let container = container.clone();
            tokio::spawn(async move {
                tokio::time::sleep(min_period).await;
                container.notify_work();
            });
        }
    }
}

#[async_trait::async_trait]
impl ParallelismSchema for PoolSchema {
    async fn create_container(
        &self,
        model: Arc<ModelHandle>,
        provider: Weak<Provider>,
        registry: Weak<ModelRegistry>,
        router: Weak<Router>,
    ) -> Arc<dyn Container> {
        *self.provider.lock().unwrap_or_else(|p| p.into_inner()) = Some(provider.clone());
        let schema_weak = self
            .self_weak
            .get()
            .cloned()
            .expect("PoolSchema is always constructed via Arc::new_cyclic");
        let container = Arc::new_cyclic(|weak_self| PoolContainer {
            state: ContainerState::new(model.clone(), provider.clone(), registry),
            reentry: AtomicI64::new(0),
            in_flight: AtomicBool::new(false),
            self_weak: std::sync::OnceLock::from(weak_self.clone()),
            schema: schema_weak,
        });
        self.containers.insert(model.id(), container.clone());
        let weak_container: Weak<dyn Container> = Arc::downgrade(&container);
        model.bind(weak_container, router, provider);
        self.ensure_supervisor();
        container.state.alive.store(true, Ordering::Release);
        container
    }
}
