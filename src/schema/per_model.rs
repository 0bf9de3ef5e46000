//! The per-model schema: one dedicated worker task per model.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Instant;

use tokio::time::Duration;
use tracing::{debug, instrument};

use crate::container::{Container, ContainerState};
use crate::model::ModelHandle;
use crate::provider::Provider;
use crate::registry::ModelRegistry;
use crate::router::Router;
use crate::schema::ParallelismSchema;

const COMPACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// A container backed by its own dedicated `tokio::task`.
pub struct PerModelContainer {
    state: ContainerState,
}

impl PerModelContainer {
    #[instrument(name = "per_model_worker", skip_all, fields(model = %self.state.model.id()))]
    async fn run(self: Arc<Self>) {
        self.state.alive.store(true, Ordering::Release);
        loop {
            if !self.state.provider_running() || !self.state.is_running() {
                break;
            }
            let timed_out = tokio::select! {
                () = self.state.wait_for_gate() => false,
                () = tokio::time::sleep(COMPACTION_TIMEOUT) => true,
            };
            if timed_out {
                self.state.model.compact_inbox(Instant::now()).await;
                continue;
            }
            if !self.state.is_running() {
                break;
            }
            let tick_start = Instant::now();
            if self.state.model.blocking() {
                let model = self.state.model.clone();
                let _ = tokio::task::spawn_blocking(move || {
                    tokio::runtime::Handle::current().block_on(model.process_tick());
                })
                .await;
            } else {
                self.state.model.process_tick().await;
            }
            let elapsed = tick_start.elapsed();
            let min_period = self.state.min_loop_period();
            if min_period > Duration::ZERO {
                if let Some(remaining) = min_period.checked_sub(elapsed) {
                    if remaining > Duration::ZERO {
                        tokio::time::sleep(remaining).await;
                    }
                }
            }
            self.state.track_performance(elapsed);
        }
        self.state.alive.store(false, Ordering::Release);
        debug!(model = %self.state.model.id(), "per-model worker exiting");
    }
}

impl Container for PerModelContainer {
    fn model_id(&self) -> crate::identity::Identifier {
        self.state.model.id()
    }

    fn notify_work(&self) {
        self.state.notify_work();
    }

    fn pause(&self) {
        self.state.pause();
    }

    fn resume(&self) {
        self.state.resume();
    }

    fn kill(&self) {
        self.state.kill();
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

/// Dedicated-worker parallelism: every model gets its own `tokio::task` with
/// its own wake/sleep cycle. Matches the concurrency model's "logical
/// thread of control per model" guarantee literally.
#[derive(Default)]
pub struct PerModelSchema;

#[async_trait::async_trait]
impl ParallelismSchema for PerModelSchema {
    async fn create_container(
        &self,
        model: Arc<ModelHandle>,
        provider: Weak<Provider>,
        registry: Weak<ModelRegistry>,
        router: Weak<Router>,
    ) -> Arc<dyn Container> {
        let container = Arc::new(PerModelContainer {
            state: ContainerState::new(model.clone(), provider.clone(), registry),
        });
        let weak_container: Weak<dyn Container> = Arc::downgrade(&container);
        model.bind(weak_container, router, provider);
        tokio::spawn(container.clone().run());
        container
    }
}
