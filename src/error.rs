//! Error taxonomy for signalmesh.
//!
//! One flat enum carries every failure mode the router, model, registry,
//! container, and provider layers can raise, following the teacher's
//! convention of a single `thiserror` enum per subsystem rather than a tree
//! of nested error types.

use std::any::TypeId;

use thiserror::Error;

use crate::identity::Identifier;

/// Errors produced by router configuration, packing/unpacking, dispatch,
/// and the surrounding model/container/provider machinery.
#[derive(Debug, Error)]
pub enum SignalMeshError {
    /// More than 32,767 signals have been registered.
    #[error("signal registry is full (max {max} signals)")]
    RegistryFull {
        /// The configured maximum (always 32,767 for the 15-bit index).
        max: u16,
    },

    /// The router has already been sealed via `build()`.
    #[error("router has already been built; no further registration is allowed")]
    RouterAlreadyBuilt,

    /// A signal name was looked up but is not present in the name table.
    #[error("unknown signal: {name}")]
    UnknownSignal {
        /// The name that failed to resolve.
        name: String,
    },

    /// A signal name was registered twice before the router was sealed.
    #[error("signal already exists: {name}")]
    SignalAlreadyExists {
        /// The duplicate name.
        name: String,
    },

    /// Packing failed because no encoder is registered for the type.
    #[error("no encoder registered for type `{type_name}`")]
    PackingNoEncoder {
        /// The Rust type name that needed an encoder.
        type_name: &'static str,
    },

    /// Packing failed because the registered encoder could not be invoked
    /// with the expected signature.
    #[error("invalid encoder for type `{type_name}`")]
    PackingInvalidEncoder {
        /// The Rust type name whose encoder was invalid.
        type_name: &'static str,
    },

    /// The encoder callback itself returned an error.
    #[error("encoder callback failed for type `{type_name}`: {reason}")]
    PackingEncoderCallback {
        /// The Rust type name being encoded.
        type_name: &'static str,
        /// The encoder's own error message.
        reason: String,
    },

    /// Unpacking failed because no decoder is registered for the type.
    #[error("no decoder registered for type `{type_name}`")]
    UnpackingNoDecoder {
        /// The Rust type name that needed a decoder.
        type_name: &'static str,
    },

    /// Unpacking failed because the registered decoder could not be invoked
    /// with the expected signature.
    #[error("invalid decoder for type `{type_name}`")]
    UnpackingInvalidDecoder {
        /// The Rust type name whose decoder was invalid.
        type_name: &'static str,
    },

    /// The decoder callback itself returned an error.
    #[error("decoder callback failed for type `{type_name}`: {reason}")]
    UnpackingDecoderCallback {
        /// The Rust type name being decoded.
        type_name: &'static str,
        /// The decoder's own error message.
        reason: String,
    },

    /// The wire serializer could not resolve a type header or length.
    #[error("invalid wire data: {reason}")]
    InvalidData {
        /// Description of what could not be parsed.
        reason: String,
    },

    /// A programmer error at a `Content`/`Signal` API boundary.
    #[error("argument error: {reason}")]
    Argument {
        /// Description of the invalid argument.
        reason: String,
    },

    /// An index used to reach into a router table was out of range.
    #[error("index out of range: {index} (len {len})")]
    Index {
        /// The offending index.
        index: usize,
        /// The table length at the time of the lookup.
        len: usize,
    },

    /// The payload stored in a `Content`/`Signal` did not match the type
    /// requested by the caller.
    #[error("type mismatch: payload does not hold the requested type")]
    TypeMismatch {
        /// The `TypeId` the caller asked for.
        expected: TypeId,
    },

    /// No event observer and no router handler claimed a signal.
    #[error("signal `{name}` delivered to {destination} was not handled by any observer or handler")]
    UnhandledSignal {
        /// The signal's resolved name, if known.
        name: String,
        /// The model the signal was delivered to.
        destination: Identifier,
    },

    /// A destination or sender identifier did not resolve to a live model.
    #[error("model not found: {id}")]
    ModelNotFound {
        /// The identifier that failed to resolve.
        id: Identifier,
    },
}
