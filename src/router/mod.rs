//! The router: the shared signal name table, codec registry, and dispatch
//! table every model and the registry consult to interpret traffic.

pub mod codec;
pub mod dispatch;

use std::any::Any;
use std::collections::HashMap;
use std::sync::{OnceLock, Weak};

use crate::content::{Content, PackedData};
use crate::error::SignalMeshError;
use crate::identity::Identifier;
use crate::registry::ModelRegistry;
use crate::signal::Signal;
use codec::CodecTable;
use dispatch::HandlerEntry;

/// Maximum number of signal table slots: the index occupies the low 15 bits
/// of the wire header.
pub const MAX_SIGNALS: usize = 0x7FFF;
const RESERVED_SLOTS: usize = 2;

/// A `{name, declared payload type, callable}` triple, translated into one
/// `register_typed_signal` call by [`Router::register_described`].
pub struct HandlerDescriptor<T> {
    /// The signal name to register the handler under.
    pub name: String,
    /// Human-readable name of the declared payload type, for diagnostics.
    pub payload_type_name: &'static str,
    /// The handler itself.
    pub handler: Box<dyn Fn(&Router, Identifier, &Signal, &T) + Send + Sync>,
}

/// Configures signal names, handlers, and codecs before sealing into a
/// read-only [`Router`].
pub struct RouterBuilder {
    names: Vec<String>,
    name_to_index: HashMap<String, u16>,
    handlers: Vec<Option<HandlerEntry>>,
    codecs: CodecTable,
    default_signals: bool,
    default_codecs: bool,
    generic_codec: bool,
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    /// Starts a new, empty router configuration.
    #[must_use]
    pub fn new() -> Self {
        let mut names = Vec::with_capacity(RESERVED_SLOTS);
        let mut handlers = Vec::with_capacity(RESERVED_SLOTS);
        for i in 0..RESERVED_SLOTS {
            names.push(format!("__reserved_{i}__"));
            handlers.push(None);
        }
        Self {
            names,
            name_to_index: HashMap::new(),
            handlers,
            codecs: CodecTable::default(),
            default_signals: true,
            default_codecs: true,
            generic_codec: false,
        }
    }

    /// Whether `_null`, `exit`, and `suspend` are registered automatically.
    /// Default `true`.
    #[must_use]
    pub fn with_default_signals(mut self, enabled: bool) -> Self {
        self.default_signals = enabled;
        self
    }

    /// Whether the UTF-8 string, fixed-width integer, and byte-passthrough
    /// codecs are registered automatically. Default `true`.
    #[must_use]
    pub fn with_default_codecs(mut self, enabled: bool) -> Self {
        self.default_codecs = enabled;
        self
    }

    /// Whether the generic JSON-over-`serde_json::Value` codec is
    /// registered. Default `false` (opt-in).
    #[must_use]
    pub fn with_generic_codec(mut self, enabled: bool) -> Self {
        self.generic_codec = enabled;
        self
    }

    /// Registers an untyped signal handler, run regardless of payload.
    ///
    /// # Errors
    /// Returns [`SignalMeshError::SignalAlreadyExists`] if `name` is already
    /// registered, or [`SignalMeshError::RegistryFull`] if the table is full.
    pub fn register_signal(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&Router, Identifier, &Signal) + Send + Sync + 'static,
    ) -> Result<u16, SignalMeshError> {
        self.insert(name.into(), HandlerEntry::untyped(handler))
    }

    /// Registers a typed signal handler, narrowed to payloads of type `T`.
    ///
    /// # Errors
    /// Returns [`SignalMeshError::SignalAlreadyExists`] if `name` is already
    /// registered, or [`SignalMeshError::RegistryFull`] if the table is full.
    pub fn register_typed_signal<T: Send + Sync + 'static>(
        &mut self,
        name: impl Into<String>,
        payload_type_name: &'static str,
        handler: impl Fn(&Router, Identifier, &Signal, &T) + Send + Sync + 'static,
    ) -> Result<u16, SignalMeshError> {
        self.insert(name.into(), HandlerEntry::typed(payload_type_name, handler))
    }

    /// Translates a handler descriptor into one `register_typed_signal` call.
    ///
    /// # Errors
    /// See [`RouterBuilder::register_typed_signal`].
    pub fn register_described<T: Send + Sync + 'static>(
        &mut self,
        descriptor: HandlerDescriptor<T>,
    ) -> Result<u16, SignalMeshError> {
        let HandlerDescriptor { name, payload_type_name, handler } = descriptor;
        self.insert(
            name,
            HandlerEntry::typed(payload_type_name, move |router, dest, signal, payload| {
                handler(router, dest, signal, payload);
            }),
        )
    }

    /// Registers an encoder for `T`.
    pub fn register_encoder<T: Send + Sync + 'static>(
        &mut self,
        type_name: &'static str,
        encode: impl Fn(&T) -> Result<PackedData, SignalMeshError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.codecs.register_encoder(type_name, encode);
        self
    }

    /// Registers a decoder for `T`.
    pub fn register_decoder<T: Send + Sync + 'static>(
        &mut self,
        type_name: &'static str,
        decode: impl Fn(&PackedData) -> Result<T, SignalMeshError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.codecs.register_decoder(type_name, decode);
        self
    }

    fn insert(&mut self, name: String, entry: HandlerEntry) -> Result<u16, SignalMeshError> {
        let key = name.to_ascii_lowercase();
        if self.name_to_index.contains_key(&key) {
            return Err(SignalMeshError::SignalAlreadyExists { name });
        }
        if self.names.len() >= MAX_SIGNALS {
            return Err(SignalMeshError::RegistryFull { max: MAX_SIGNALS as u16 });
        }
        let index = u16::try_from(self.names.len()).expect("index bounded by MAX_SIGNALS");
        self.names.push(name);
        self.handlers.push(Some(entry));
        self.name_to_index.insert(key, index);
        Ok(index)
    }

    /// Seals the configuration into a [`Router`]. No further registration is
    /// possible afterward; the builder is consumed.
    #[must_use]
    pub fn build(mut self) -> Router {
        if self.default_codecs {
            self.codecs.register_defaults();
        }
        if self.generic_codec {
            self.codecs.register_generic();
        }
        if self.default_signals {
            let _ = self.insert("_null".to_string(), HandlerEntry::untyped(|_, _, _| {}));
            let _ = self.insert(
                "exit".to_string(),
                HandlerEntry::untyped(|router, destination, _signal| {
                    if let Some(registry) = router.registry() {
                        registry.request_kill(destination);
                    }
                }),
            );
            let _ = self.insert(
                "suspend".to_string(),
                HandlerEntry::untyped(|router, destination, _signal| {
                    if let Some(registry) = router.registry() {
                        registry.request_pause(destination);
                    }
                }),
            );
        }
        Router {
            names: self.names,
            name_to_index: self.name_to_index,
            handlers: self.handlers,
            codecs: self.codecs,
            registry: OnceLock::new(),
        }
    }
}

/// The sealed, read-only signal table, codec registry, and dispatch table.
///
/// Once built, a `Router` exposes only read APIs: there is no path back to a
/// mutable `RouterBuilder`, so concurrent reads never race a configuration
/// change.
pub struct Router {
    names: Vec<String>,
    name_to_index: HashMap<String, u16>,
    handlers: Vec<Option<HandlerEntry>>,
    codecs: CodecTable,
    registry: OnceLock<Weak<ModelRegistry>>,
}

impl Router {
    /// Binds the back-reference to the model registry used by the default
    /// `exit`/`suspend` handlers. Called once, by `Provider::start`.
    pub fn bind_registry(&self, registry: Weak<ModelRegistry>) {
        let _ = self.registry.set(registry);
    }

    /// The bound model registry, if any and still alive.
    #[must_use]
    pub fn registry(&self) -> Option<std::sync::Arc<ModelRegistry>> {
        self.registry.get().and_then(Weak::upgrade)
    }

    /// Resolves a signal name to its table index (case-insensitive).
    ///
    /// # Errors
    /// Returns [`SignalMeshError::UnknownSignal`] if `name` is not registered.
    pub fn index_of(&self, name: &str) -> Result<u16, SignalMeshError> {
        self.name_to_index
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| SignalMeshError::UnknownSignal { name: name.to_string() })
    }

    /// Resolves a table index back to its registered name.
    #[must_use]
    pub fn name_of(&self, index: u16) -> Option<&str> {
        self.names.get(index as usize).map(String::as_str)
    }

    /// All registered signal names, in registration order (reserved
    /// placeholder slots excluded).
    pub fn signal_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().skip(RESERVED_SLOTS).map(String::as_str)
    }

    /// Always `true`: a `Router` only exists in its sealed form.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        true
    }

    /// Packs a typed value into a `Content<PackedData>` addressed by signal
    /// name.
    ///
    /// # Errors
    /// Returns [`SignalMeshError::UnknownSignal`] if `name` is not
    /// registered, or a packing error if `T` has no registered encoder.
    pub fn pack<T: Send + Sync + 'static>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<Content<PackedData>, SignalMeshError> {
        let index = self.index_of(name)?;
        let packed = self.codecs.pack(value)?;
        Ok(Content::new(index | (1 << 15), Some(packed)))
    }

    /// Unpacks a `PackedData` payload into `T`.
    ///
    /// # Errors
    /// Returns an unpacking error if `T` has no registered decoder or the
    /// bytes do not parse.
    pub fn unpack<T: Send + Sync + 'static>(&self, packed: &PackedData) -> Result<T, SignalMeshError> {
        self.codecs.unpack(packed)
    }

    /// Dispatches a read signal to its registered handler, if any.
    ///
    /// `payload` is the signal's current type-erased payload. Returns
    /// whether a handler ran (callers use this to decide whether to raise
    /// [`SignalMeshError::UnhandledSignal`]).
    pub fn dispatch(
        &self,
        destination: Identifier,
        signal: &Signal,
        payload: Option<&(dyn Any + Send + Sync)>,
    ) -> bool {
        let (index, _typed) = crate::wire::decode_header(signal.header());
        let Some(Some(entry)) = self.handlers.get(index as usize) else { return false };
        entry.invoke(self, destination, signal, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_signals_are_registered() {
        let router = RouterBuilder::new().build();
        assert!(router.index_of("exit").is_ok());
        assert!(router.index_of("SUSPEND").is_ok());
        assert!(router.index_of("_null").is_ok());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut builder = RouterBuilder::new().with_default_signals(false);
        builder.register_signal("ping", |_, _, _| {}).unwrap();
        assert!(matches!(
            builder.register_signal("PING", |_, _, _| {}),
            Err(SignalMeshError::SignalAlreadyExists { .. })
        ));
    }

    #[test]
    fn name_lookup_is_case_insensitive() {
        let mut builder = RouterBuilder::new().with_default_signals(false);
        let idx = builder.register_signal("Ping", |_, _, _| {}).unwrap();
        let router = builder.build();
        assert_eq!(router.index_of("ping").unwrap(), idx);
    }

    #[test]
    fn pack_unpack_round_trips_through_the_router() {
        let mut builder = RouterBuilder::new().with_default_signals(false);
        builder.register_signal("greet", |_, _, _| {}).unwrap();
        let router = builder.build();
        let content = router.pack("greet", &"hi".to_string()).unwrap();
        let packed = content.data().unwrap();
        let back: String = router.unpack(packed).unwrap();
        assert_eq!(back, "hi");
    }

    #[test]
    fn generic_codec_defaults_to_disabled() {
        let router = RouterBuilder::new().with_default_signals(false).build();
        assert!(router.pack("exit", &serde_json::json!({})).is_err());
    }
}
