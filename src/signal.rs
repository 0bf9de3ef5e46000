//! Signals: in-flight messages routed between models.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::identity::Identifier;

type AnyPayload = Box<dyn Any + Send + Sync>;

struct SignalInner {
    header: u16,
    name: Option<String>,
    sender: Option<Identifier>,
    destination: Identifier,
    handled: AtomicBool,
    expires_at: Option<Instant>,
    payload: Mutex<Option<AnyPayload>>,
    payload_type_name: Mutex<Option<&'static str>>,
    completer: Mutex<Option<oneshot::Sender<()>>>,
}

/// A single in-flight message, shared between the sender awaiting a reply
/// (if any) and the model processing it.
///
/// Cloning a `Signal` clones the handle, not the message: both clones
/// observe the same `handled` flag and payload slot.
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

impl Signal {
    /// Builds a fire-and-forget signal with no completer to await.
    #[must_use]
    pub fn new(
        header: u16,
        name: Option<String>,
        sender: Option<Identifier>,
        destination: Identifier,
        payload: Option<AnyPayload>,
        payload_type_name: Option<&'static str>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                header,
                name,
                sender,
                destination,
                handled: AtomicBool::new(false),
                expires_at: ttl.map(|d| Instant::now() + d),
                payload: Mutex::new(payload),
                payload_type_name: Mutex::new(payload_type_name),
                completer: Mutex::new(None),
            }),
        }
    }

    /// Builds a signal paired with a completer the caller can await for
    /// request/reply delivery.
    #[must_use]
    pub fn with_completer(
        header: u16,
        name: Option<String>,
        sender: Option<Identifier>,
        destination: Identifier,
        payload: Option<AnyPayload>,
        payload_type_name: Option<&'static str>,
        ttl: Option<Duration>,
    ) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let signal = Self {
            inner: Arc::new(SignalInner {
                header,
                name,
                sender,
                destination,
                handled: AtomicBool::new(false),
                expires_at: ttl.map(|d| Instant::now() + d),
                payload: Mutex::new(payload),
                payload_type_name: Mutex::new(payload_type_name),
                completer: Mutex::new(Some(tx)),
            }),
        };
        (signal, rx)
    }

    /// The signal's wire header.
    #[must_use]
    pub const fn header(&self) -> u16 {
        self.inner.header
    }

    /// The signal's resolved name, if the router could resolve one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// The model that sent this signal, if any (`None` for externally
    /// injected or system-originated signals).
    #[must_use]
    pub const fn sender(&self) -> Option<Identifier> {
        self.inner.sender
    }

    /// The model this signal is addressed to.
    #[must_use]
    pub const fn destination(&self) -> Identifier {
        self.inner.destination
    }

    /// Whether an observer or the router's dispatch already claimed this
    /// signal.
    #[must_use]
    pub fn handled(&self) -> bool {
        self.inner.handled.load(Ordering::Acquire)
    }

    /// Marks the signal as handled. Idempotent.
    pub fn mark_handled(&self) {
        self.inner.handled.store(true, Ordering::Release);
    }

    /// Whether this signal has outlived its time-to-live.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Whether this signal will have expired by the given instant.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.inner.expires_at.is_some_and(|at| now >= at)
    }

    /// Borrows the payload, downcast to `T`, and hands it to `f`.
    ///
    /// Returns `None` if there is no payload or it is not a `T`.
    pub fn with_payload<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.inner.payload.lock().unwrap_or_else(|poison| poison.into_inner());
        guard.as_ref().and_then(|boxed| boxed.downcast_ref::<T>()).map(f)
    }

    /// Takes the payload out, downcast to `T`.
    ///
    /// If the payload is present but not a `T`, it is put back untouched and
    /// `None` is returned.
    pub fn take_payload<T: Send + Sync + 'static>(&self) -> Option<T> {
        let mut guard = self.inner.payload.lock().unwrap_or_else(|poison| poison.into_inner());
        let boxed = guard.take()?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(boxed) => {
                *guard = Some(boxed);
                None
            }
        }
    }

    /// Hands the router's dispatch a type-erased view of the payload,
    /// without taking it out of the signal.
    pub fn with_payload_dyn<R>(&self, f: impl FnOnce(Option<&(dyn Any + Send + Sync)>) -> R) -> R {
        let guard = self.inner.payload.lock().unwrap_or_else(|poison| poison.into_inner());
        f(guard.as_deref())
    }

    /// The Rust type name of the payload, for diagnostics.
    #[must_use]
    pub fn payload_type_name(&self) -> Option<&'static str> {
        *self.inner.payload_type_name.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Replaces the payload, e.g. to stash a reply before the signal
    /// completes.
    pub fn set_payload<T: Send + Sync + 'static>(&self, value: T, type_name: &'static str) {
        let mut payload = self.inner.payload.lock().unwrap_or_else(|poison| poison.into_inner());
        *payload = Some(Box::new(value));
        let mut stored_name = self.inner.payload_type_name.lock().unwrap_or_else(|poison| poison.into_inner());
        *stored_name = Some(type_name);
    }

    /// Resolves the completer, waking whoever is awaiting this signal's
    /// reply. Idempotent; a second call is a no-op.
    pub fn fulfill(&self) {
        if let Some(tx) = self.inner.completer.lock().unwrap_or_else(|poison| poison.into_inner()).take() {
            let _ = tx.send(());
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("header", &self.header())
            .field("name", &self.name())
            .field("sender", &self.sender())
            .field("destination", &self.destination())
            .field("handled", &self.handled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_typed_payload() {
        let signal = Signal::new(
            0,
            Some("ping".to_string()),
            None,
            Identifier::from_name("dest"),
            Some(Box::new(42_i32)),
            Some("i32"),
            None,
        );
        assert_eq!(signal.with_payload::<i32, _>(|v| *v), Some(42));
    }

    #[test]
    fn mismatched_downcast_leaves_payload_intact() {
        let signal = Signal::new(
            0,
            None,
            None,
            Identifier::from_name("dest"),
            Some(Box::new(42_i32)),
            Some("i32"),
            None,
        );
        assert_eq!(signal.take_payload::<String>(), None);
        assert_eq!(signal.with_payload::<i32, _>(|v| *v), Some(42));
    }

    #[test]
    fn expiration_is_respected() {
        let signal = Signal::new(
            0,
            None,
            None,
            Identifier::from_name("dest"),
            None,
            None,
            Some(Duration::from_secs(0)),
        );
        std::thread::sleep(Duration::from_millis(5));
        assert!(signal.is_expired());
    }

    #[tokio::test]
    async fn completer_wakes_the_awaiting_side() {
        let (signal, rx) = Signal::with_completer(
            0,
            None,
            None,
            Identifier::from_name("dest"),
            None,
            None,
            None,
        );
        signal.set_payload(99_i32, "i32");
        signal.fulfill();
        rx.await.expect("completer should fire");
        assert_eq!(signal.with_payload::<i32, _>(|v| *v), Some(99));
    }
}
