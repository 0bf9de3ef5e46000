//! Models: the addressable units of behavior that receive and process
//! signals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock as AsyncRwLock};
use tracing::{debug, warn};

use crate::container::Container;
use crate::error::SignalMeshError;
use crate::identity::Identifier;
use crate::provider::Provider;
use crate::router::Router;
use crate::signal::Signal;

/// User-supplied behavior a model runs against each signal it reads.
///
/// All three hooks default to no-ops; a model can override only the ones it
/// needs. `on_receive_signal` runs on the fast enqueue path (any task may be
/// calling concurrently); `on_read_signal` and `on_loop` run exclusively on
/// the model's own container tick.
#[async_trait::async_trait]
pub trait ModelBehavior: Send + Sync {
    /// Observes a signal as it arrives, before it is queued. Returning
    /// without marking the signal handled lets it proceed to the inbox.
    async fn on_receive_signal(&self, _model: &ModelHandle, _signal: &Signal) {}

    /// Observes a signal as the container reads it off the inbox, before
    /// router dispatch runs.
    async fn on_read_signal(&self, _model: &ModelHandle, _signal: &Signal) {}

    /// Runs once per container tick, after any signal read in that tick has
    /// been processed.
    async fn on_loop(&self, _model: &ModelHandle) {}

    /// Whether this model's tick should run via `spawn_blocking` rather than
    /// inline on the async worker. Default `false`.
    fn blocking(&self) -> bool {
        false
    }
}

/// A behavior that does nothing; useful as a placeholder or for models whose
/// only purpose is to be a named address.
pub struct NoopBehavior;

#[async_trait::async_trait]
impl ModelBehavior for NoopBehavior {}

struct Inbox {
    gate: AsyncRwLock<()>,
    sender: mpsc::UnboundedSender<Signal>,
    receiver: AsyncMutex<mpsc::UnboundedReceiver<Signal>>,
}

impl Inbox {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { gate: AsyncRwLock::new(()), sender, receiver: AsyncMutex::new(receiver) }
    }

    async fn enqueue(&self, signal: Signal) -> bool {
        let _guard = self.gate.read().await;
        self.sender.send(signal).is_ok()
    }

    async fn drain_one(&self) -> Option<Signal> {
        let mut rx = self.receiver.lock().await;
        rx.try_recv().ok()
    }

    /// Drops expired signals, holding the gate's write side so no enqueue
    /// races the compaction pass.
    async fn compact(&self, now: Instant) {
        let _guard = self.gate.write().await;
        let mut rx = self.receiver.lock().await;
        let mut kept = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            if !signal.is_expired_at(now) {
                kept.push(signal);
            }
        }
        drop(rx);
        for signal in kept {
            let _ = self.sender.send(signal);
        }
    }
}

/// An addressable model: an identifier, an inbox, a back-reference to its
/// container, and the behavior it runs signals against.
pub struct ModelHandle {
    id: Identifier,
    inbox: Inbox,
    closing: AtomicBool,
    behavior: Arc<dyn ModelBehavior>,
    container: std::sync::OnceLock<Weak<dyn Container>>,
    router: std::sync::OnceLock<Weak<Router>>,
    provider: std::sync::OnceLock<Weak<Provider>>,
}

impl ModelHandle {
    /// Builds a new model around the given behavior.
    #[must_use]
    pub fn new(id: Identifier, behavior: Arc<dyn ModelBehavior>) -> Self {
        Self {
            id,
            inbox: Inbox::new(),
            closing: AtomicBool::new(false),
            behavior,
            container: std::sync::OnceLock::new(),
            router: std::sync::OnceLock::new(),
            provider: std::sync::OnceLock::new(),
        }
    }

    /// Binds the back-references to this model's container, router, and
    /// provider. Called once, by the schema that creates the container.
    pub fn bind(&self, container: Weak<dyn Container>, router: Weak<Router>, provider: Weak<Provider>) {
        let _ = self.container.set(container);
        let _ = self.router.set(router);
        let _ = self.provider.set(provider);
    }

    /// This model's address.
    #[must_use]
    pub const fn id(&self) -> Identifier {
        self.id
    }

    /// Whether this model has begun an irreversible close.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Marks this model as closing. Idempotent.
    pub fn mark_closing(&self) {
        self.closing.store(true, Ordering::Release);
    }

    fn container(&self) -> Option<Arc<dyn Container>> {
        self.container.get().and_then(Weak::upgrade)
    }

    fn router(&self) -> Option<Arc<Router>> {
        self.router.get().and_then(Weak::upgrade)
    }

    /// The bound provider, if any and still alive. Used by privileged
    /// behaviors (e.g. `Core`'s own) that need to reach back into the
    /// registry rather than act only on themselves.
    pub(crate) fn provider(&self) -> Option<Arc<Provider>> {
        self.provider.get().and_then(Weak::upgrade)
    }

    /// Whether this model's container currently reports `blocking()`.
    #[must_use]
    pub fn blocking(&self) -> bool {
        self.behavior.blocking()
    }

    /// The fast path: observes, then (unless already handled) enqueues the
    /// signal. Rejects while the container reports paused, and drops
    /// already-expired signals. Returns whether the signal was accepted.
    pub async fn receive_message(&self, signal: Signal) -> bool {
        if signal.is_expired() {
            return false;
        }
        if let Some(container) = self.container() {
            if container.is_paused() {
                debug!(model = %self.id, "rejecting signal: model is paused");
                return false;
            }
        }
        self.behavior.on_receive_signal(self, &signal).await;
        if signal.handled() {
            return true;
        }
        let accepted = self.inbox.enqueue(signal).await;
        if accepted {
            if let Some(container) = self.container() {
                container.notify_work();
            }
        }
        accepted
    }

    /// Drains and processes every signal currently queued, then runs the
    /// loop hook once. Called by the owning container on each tick it is
    /// granted.
    pub async fn process_tick(&self) {
        while let Some(signal) = self.inbox.drain_one().await {
            self.process_one(&signal).await;
        }
        self.behavior.on_loop(self).await;
    }

    async fn process_one(&self, signal: &Signal) {
        if signal.is_expired() {
            signal.fulfill();
            return;
        }
        self.behavior.on_read_signal(self, signal).await;
        if !signal.handled() {
            if let Some(router) = self.router() {
                let ran = signal.with_payload_dyn(|payload| router.dispatch(self.id, signal, payload));
                if ran {
                    signal.mark_handled();
                }
            }
        }
        if !signal.handled() {
            let error = SignalMeshError::UnhandledSignal {
                name: signal.name().unwrap_or("<unknown>").to_string(),
                destination: self.id,
            };
            if let Some(provider) = self.provider() {
                provider.notify_model_exception(self.id, &error);
            } else {
                warn!(model = %self.id, %error, "signal unhandled and no provider bound to report it");
            }
        }
        signal.fulfill();
    }

    /// Drops expired signals from the inbox without processing them.
    pub async fn compact_inbox(&self, now: Instant) {
        self.inbox.compact(now).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unbound_model_enqueues_and_drains() {
        let model = ModelHandle::new(Identifier::from_name("m"), Arc::new(NoopBehavior));
        let signal = Signal::new(0, None, None, model.id(), None, None, None);
        assert!(model.receive_message(signal).await);
        model.process_tick().await;
    }

    #[tokio::test]
    async fn expired_signal_is_rejected_at_the_fast_path() {
        let model = ModelHandle::new(Identifier::from_name("m"), Arc::new(NoopBehavior));
        let signal = Signal::new(
            0,
            None,
            None,
            model.id(),
            None,
            None,
            Some(std::time::Duration::from_secs(0)),
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(!model.receive_message(signal).await);
    }
}
