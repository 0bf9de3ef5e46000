//! The model registry: the concurrent address book every send eventually
//! goes through.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::container::Container;
use crate::error::SignalMeshError;
use crate::identity::Identifier;
use crate::model::{ModelBehavior, ModelHandle};
use crate::provider::Provider;
use crate::router::Router;
use crate::schema::ParallelismSchema;
use crate::signal::Signal;

struct ModelEntry {
    model: Arc<ModelHandle>,
    container: Arc<dyn Container>,
}

/// The concurrent `Identifier -> model` map, plus the send primitives every
/// caller (handlers, the provider, external callers) uses to reach a model.
pub struct ModelRegistry {
    models: DashMap<Identifier, ModelEntry>,
    router: Weak<Router>,
    provider: std::sync::OnceLock<Weak<Provider>>,
    self_weak: std::sync::OnceLock<Weak<ModelRegistry>>,
    max_models: usize,
}

impl ModelRegistry {
    /// Builds a new, empty registry bound to `router`.
    #[must_use]
    pub fn new(router: Weak<Router>, max_models: usize) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            models: DashMap::new(),
            router,
            provider: std::sync::OnceLock::new(),
            self_weak: std::sync::OnceLock::from(weak_self.clone()),
            max_models,
        })
    }

    /// Binds the back-reference to the owning provider. Called once, by
    /// `Provider::start`.
    pub fn bind_provider(&self, provider: Weak<Provider>) {
        let _ = self.provider.set(provider);
    }

    /// Creates a model, hands it to `schema` to build a container, and
    /// registers the pair.
    ///
    /// # Errors
    /// Returns [`SignalMeshError::RegistryFull`] if the registry is already
    /// at `max_models`.
    pub async fn spawn_model(
        &self,
        id: Identifier,
        behavior: Arc<dyn ModelBehavior>,
        schema: &Arc<dyn ParallelismSchema>,
        router: Weak<Router>,
    ) -> Result<Arc<ModelHandle>, SignalMeshError> {
        if self.models.len() >= self.max_models {
            return Err(SignalMeshError::RegistryFull { max: u16::try_from(self.max_models).unwrap_or(u16::MAX) });
        }
        let model = Arc::new(ModelHandle::new(id, behavior));
        let provider = self.provider.get().cloned().unwrap_or_else(Weak::new);
        let registry_weak = self.self_weak.get().cloned().unwrap_or_else(Weak::new);
        let container = schema.create_container(model.clone(), provider, registry_weak, router).await;
        self.models.insert(id, ModelEntry { model: model.clone(), container });
        debug!(model = %id, "model registered");
        Ok(model)
    }

    /// Looks up a model by address.
    #[must_use]
    pub fn get(&self, id: Identifier) -> Option<Arc<ModelHandle>> {
        self.models.get(&id).map(|entry| entry.model.clone())
    }

    /// Looks up a model's container by address.
    #[must_use]
    pub fn container(&self, id: Identifier) -> Option<Arc<dyn Container>> {
        self.models.get(&id).map(|entry| entry.container.clone())
    }

    /// Removes a model from the registry. Does not kill its container.
    pub fn unregister(&self, id: Identifier) {
        self.models.remove(&id);
    }

    /// Addresses of every currently registered model.
    #[must_use]
    pub fn list_ids(&self) -> Vec<Identifier> {
        self.models.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of currently registered models.
    #[must_use]
    pub fn count(&self) -> usize {
        self.models.len()
    }

    /// Calls `kill` on the destination's container, if registered. Used by
    /// the router's default `exit` handler and by `Container::kill` itself.
    pub fn request_kill(&self, id: Identifier) {
        if let Some(entry) = self.models.get(&id) {
            entry.container.kill();
        } else {
            warn!(model = %id, "request_kill: model not found");
        }
    }

    /// Calls `pause` on the destination's container, if registered. Used by
    /// the router's default `suspend` handler.
    pub fn request_pause(&self, id: Identifier) {
        if let Some(entry) = self.models.get(&id) {
            entry.container.pause();
        } else {
            warn!(model = %id, "request_pause: model not found");
        }
    }

    /// Calls `resume` on the destination's container, if registered.
    pub fn request_resume(&self, id: Identifier) {
        if let Some(entry) = self.models.get(&id) {
            entry.container.resume();
        } else {
            warn!(model = %id, "request_resume: model not found");
        }
    }

    /// The bound provider's `Core` address, if a provider is bound and
    /// still alive. Used to resolve the "missing destination"/"missing
    /// sender defaults to Core" rule.
    fn core_id(&self) -> Option<Identifier> {
        self.provider.get().and_then(Weak::upgrade).map(|provider| provider.core_id())
    }

    /// Sends an already-built signal to its destination, fire-and-forget.
    /// A destination that isn't registered falls back to the provider's
    /// `Core` model rather than failing outright.
    ///
    /// # Errors
    /// Returns [`SignalMeshError::ModelNotFound`] if the destination is not
    /// registered and no `Core` is bound to fall back to either.
    pub async fn deliver(&self, signal: Signal) -> Result<bool, SignalMeshError> {
        let destination = signal.destination();
        let model = match self.get(destination) {
            Some(model) => model,
            None => self
                .core_id()
                .filter(|&core| core != destination)
                .and_then(|core| self.get(core))
                .ok_or(SignalMeshError::ModelNotFound { id: destination })?,
        };
        Ok(model.receive_message(signal).await)
    }

    /// Sends a typed, named signal and awaits its completion (observer
    /// handling, dispatch, or explicit reply), up to `timeout_duration`.
    /// A `None` destination or sender defaults to the provider's `Core`.
    ///
    /// # Errors
    /// Returns [`SignalMeshError::ModelNotFound`] if the destination is not
    /// registered and no `Core` is bound to fall back to either, or an
    /// unpacking error translated from the router if the name cannot be
    /// resolved.
    pub async fn send_and_await<T: Send + Sync + 'static>(
        &self,
        name: &str,
        sender: Option<Identifier>,
        destination: Option<Identifier>,
        payload: Option<T>,
        payload_type_name: Option<&'static str>,
        ttl: Option<Duration>,
        timeout_duration: Duration,
    ) -> Result<Signal, SignalMeshError> {
        let core = self.core_id();
        let fallback_id = Identifier::from_name("core");
        let destination = destination
            .or(core)
            .ok_or(SignalMeshError::ModelNotFound { id: fallback_id })?;
        let sender = sender.or(core);
        let router = self.router.upgrade().ok_or(SignalMeshError::ModelNotFound { id: destination })?;
        let header = router.index_of(name)? | (1 << 15);
        let boxed_payload = payload.map(|p| Box::new(p) as Box<dyn std::any::Any + Send + Sync>);
        let (signal, completer) = Signal::with_completer(
            header,
            Some(name.to_string()),
            sender,
            destination,
            boxed_payload,
            payload_type_name,
            ttl,
        );
        let model = match self.get(destination) {
            Some(model) => model,
            None => self
                .core_id()
                .filter(|&core| core != destination)
                .and_then(|core| self.get(core))
                .ok_or(SignalMeshError::ModelNotFound { id: destination })?,
        };
        if !model.receive_message(signal.clone()).await {
            return Ok(signal);
        }
        let _ = timeout(timeout_duration, completer).await;
        Ok(signal)
    }
}
