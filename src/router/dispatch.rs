//! Signal handler storage and invocation.

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::identity::Identifier;
use crate::router::Router;
use crate::signal::Signal;

type AnyPayload = dyn Any + Send + Sync;

/// A registered handler: either untyped (receives only the signal) or typed
/// (receives the signal's payload narrowed to a declared Rust type).
#[derive(Clone)]
pub(crate) struct HandlerEntry {
    pub payload_type: Option<TypeId>,
    pub payload_type_name: Option<&'static str>,
    dispatch: Arc<dyn Fn(&Router, Identifier, &Signal, Option<&AnyPayload>) -> bool + Send + Sync>,
}

impl HandlerEntry {
    /// Wraps an untyped handler, which always runs regardless of payload.
    pub fn untyped(handler: impl Fn(&Router, Identifier, &Signal) + Send + Sync + 'static) -> Self {
        Self {
            payload_type: None,
            payload_type_name: None,
            dispatch: Arc::new(move |router, destination, signal, _payload| {
                handler(router, destination, signal);
                true
            }),
        }
    }

    /// Wraps a typed handler. Invocation narrows the signal's payload to `T`;
    /// if the payload is absent or of a different type, the handler does not
    /// run and dispatch reports the signal as unhandled.
    pub fn typed<T: Send + Sync + 'static>(
        payload_type_name: &'static str,
        handler: impl Fn(&Router, Identifier, &Signal, &T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            payload_type: Some(TypeId::of::<T>()),
            payload_type_name: Some(payload_type_name),
            dispatch: Arc::new(move |router, destination, signal, payload| {
                let Some(payload) = payload else { return false };
                let Some(typed) = payload.downcast_ref::<T>() else { return false };
                handler(router, destination, signal, typed);
                true
            }),
        }
    }

    /// Invokes the handler. `payload` is the signal's current payload,
    /// type-erased; returns whether the handler actually ran.
    pub fn invoke(
        &self,
        router: &Router,
        destination: Identifier,
        signal: &Signal,
        payload: Option<&AnyPayload>,
    ) -> bool {
        (self.dispatch)(router, destination, signal, payload)
    }
}
