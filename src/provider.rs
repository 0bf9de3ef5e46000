//! The provider: the composition root wiring router, registry, schema, and
//! the privileged core model together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::config::ProviderConfig;
use crate::error::SignalMeshError;
use crate::identity::Identifier;
use crate::model::{ModelBehavior, ModelHandle, NoopBehavior};
use crate::registry::ModelRegistry;
use crate::router::{Router, RouterBuilder};
use crate::schema::ParallelismSchema;
use crate::signal::Signal;

/// A snapshot of live counts, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderStats {
    /// Number of models currently registered.
    pub live_models: usize,
    /// Number of those models whose container worker is still executing.
    pub live_threads: usize,
}

struct CoreBehavior;

#[async_trait::async_trait]
impl ModelBehavior for CoreBehavior {
    /// `exit` delivered to `Core` is the one provider-wide shutdown path:
    /// `Core` marks itself closing, then fans the same kill out to every
    /// other registered model before killing its own container last.
    async fn on_read_signal(&self, model: &ModelHandle, signal: &Signal) {
        if signal.name() == Some("exit") {
            signal.mark_handled();
            model.mark_closing();
            if let Some(provider) = model.provider() {
                let registry = provider.registry();
                for id in registry.list_ids() {
                    if id != model.id() {
                        registry.request_kill(id);
                    }
                }
                registry.request_kill(model.id());
            }
        }
    }
}

/// The composition root: owns the sealed router, the model registry, the
/// chosen parallelism schema, and the privileged `Core` model every
/// provider-wide shutdown flows through.
pub struct Provider {
    router: Arc<Router>,
    registry: Arc<ModelRegistry>,
    schema: Arc<dyn ParallelismSchema>,
    core_id: Identifier,
    running: AtomicBool,
    config: ProviderConfig,
    shutdown_tx: broadcast::Sender<()>,
    post_init_tx: broadcast::Sender<()>,
    post_shutdown_tx: broadcast::Sender<()>,
}

impl Provider {
    /// Builds and starts a provider: seals `router_builder`, binds the
    /// registry's back-reference, and spawns the `Core` model.
    ///
    /// # Errors
    /// Returns an error if `config` fails [`ProviderConfig::validate`], or
    /// propagates any error from spawning the core model.
    #[instrument(name = "provider_start", skip_all)]
    pub async fn start(
        router_builder: RouterBuilder,
        schema: Arc<dyn ParallelismSchema>,
        config: ProviderConfig,
    ) -> Result<Arc<Self>, SignalMeshError> {
        config.validate()?;
        let router = Arc::new(router_builder.build());
        let registry = ModelRegistry::new(Arc::downgrade(&router), config.max_models);
        let core_id = Identifier::from_name("core");
        let (shutdown_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (post_init_tx, _) = broadcast::channel(config.event_channel_capacity);
        let (post_shutdown_tx, _) = broadcast::channel(config.event_channel_capacity);

        let provider = Arc::new(Self {
            router: router.clone(),
            registry: registry.clone(),
            schema: schema.clone(),
            core_id,
            running: AtomicBool::new(true),
            config,
            shutdown_tx,
            post_init_tx,
            post_shutdown_tx,
        });

        router.bind_registry(Arc::downgrade(&registry));
        registry.bind_provider(Arc::downgrade(&provider));

        registry
            .spawn_model(core_id, Arc::new(CoreBehavior), &schema, Arc::downgrade(&router))
            .await?;

        info!("provider started");
        let _ = provider.post_init_tx.send(());
        Ok(provider)
    }

    /// A plain no-op model, used when a provider is started purely to host
    /// the router/registry/schema wiring (e.g. in tests).
    #[must_use]
    pub fn noop_behavior() -> Arc<dyn ModelBehavior> {
        Arc::new(NoopBehavior)
    }

    /// The sealed router.
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// The model registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// A weak reference to this provider's registry, for components that
    /// must not keep it alive.
    #[must_use]
    pub fn registry_weak(&self) -> Option<Weak<ModelRegistry>> {
        Some(Arc::downgrade(&self.registry))
    }

    /// Whether the provider has not yet been shut down.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Subscribes to the `Shutdown` broadcast, fired once `shutdown` begins.
    #[must_use]
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Subscribes to the `PostInitialization` broadcast, fired once after
    /// `start` completes.
    #[must_use]
    pub fn subscribe_post_initialization(&self) -> broadcast::Receiver<()> {
        self.post_init_tx.subscribe()
    }

    /// Subscribes to the `PostShutdown` broadcast, fired once `await_close`
    /// observes every container has gone quiet.
    #[must_use]
    pub fn subscribe_post_shutdown(&self) -> broadcast::Receiver<()> {
        self.post_shutdown_tx.subscribe()
    }

    /// Begins an irreversible shutdown: delivers `exit` to `Core` alone and
    /// flips `is_running` to `false`. `Core`'s own behavior is responsible
    /// for fanning the kill out to every other registered model.
    #[instrument(name = "provider_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.send(());
        let header = self
            .router
            .index_of("exit")
            .and_then(|index| crate::wire::encode_header(index, false))
            .unwrap_or(0);
        let signal = Signal::new(header, Some("exit".to_string()), None, self.core_id, None, None, None);
        let _ = self.registry.deliver(signal).await;
    }

    /// Blocks (with 1ms polling, matching the container's own compaction
    /// cadence) until every container reports not alive, or `timeout`
    /// elapses. Fires `PostShutdown` once that happens.
    pub async fn await_close(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let any_alive = self.registry.list_ids().into_iter().any(|id| {
                self.registry.container(id).is_some_and(|c| c.is_alive())
            });
            if !any_alive {
                let _ = self.post_shutdown_tx.send(());
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// A snapshot of live model/thread counts.
    #[must_use]
    pub fn stats(&self) -> ProviderStats {
        let ids = self.registry.list_ids();
        let live_threads = ids.iter().filter(|id| self.registry.container(**id).is_some_and(|c| c.is_alive())).count();
        ProviderStats { live_models: ids.len(), live_threads }
    }

    /// Reports a signal that no observer or router handler claimed.
    /// Overridable in spirit via `ModelBehavior::on_read_signal` hooks;
    /// this is the provider-wide fallback sink.
    pub fn notify_model_exception(&self, model: Identifier, error: &SignalMeshError) {
        error!(model = %model, %error, "unhandled signal");
    }

    /// This provider's configuration.
    #[must_use]
    pub const fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// The address of the privileged `Core` model.
    #[must_use]
    pub const fn core_id(&self) -> Identifier {
        self.core_id
    }

    /// The parallelism schema models are scheduled onto.
    #[must_use]
    pub fn schema(&self) -> &Arc<dyn ParallelismSchema> {
        &self.schema
    }
}
