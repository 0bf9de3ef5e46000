//! Encoder/decoder tables keyed by Rust type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::content::{ContentFlags, PackedData};
use crate::error::SignalMeshError;

type AnyPayload = dyn Any + Send + Sync;

/// An encoder converts a typed value into a [`PackedData`] byte blob.
pub type EncodeFn = Arc<dyn Fn(&AnyPayload) -> Result<PackedData, SignalMeshError> + Send + Sync>;
/// A decoder converts a [`PackedData`] byte blob back into a typed value.
pub type DecodeFn =
    Arc<dyn Fn(&PackedData) -> Result<Box<AnyPayload>, SignalMeshError> + Send + Sync>;

struct EncoderEntry {
    type_name: &'static str,
    encode: EncodeFn,
}

struct DecoderEntry {
    type_name: &'static str,
    decode: DecodeFn,
}

/// Registered encoders, indexed both by `TypeId` (for packing) and by a
/// stable position (for the decoder-index hint stored in `PackedData`).
#[derive(Default)]
pub struct CodecTable {
    encoders: Vec<EncoderEntry>,
    encoder_index: HashMap<TypeId, usize>,
    decoders: Vec<DecoderEntry>,
    decoder_index: HashMap<TypeId, usize>,
}

impl CodecTable {
    /// Registers an encoder for `T`, overwriting any previous one.
    pub fn register_encoder<T: Send + Sync + 'static>(
        &mut self,
        type_name: &'static str,
        encode: impl Fn(&T) -> Result<PackedData, SignalMeshError> + Send + Sync + 'static,
    ) {
        let wrapped: EncodeFn = Arc::new(move |value: &AnyPayload| {
            let typed = value.downcast_ref::<T>().ok_or(SignalMeshError::PackingInvalidEncoder { type_name })?;
            encode(typed)
        });
        let idx = self.encoders.len();
        self.encoders.push(EncoderEntry { type_name, encode: wrapped });
        self.encoder_index.insert(TypeId::of::<T>(), idx);
    }

    /// Registers a decoder for `T`, overwriting any previous one.
    pub fn register_decoder<T: Send + Sync + 'static>(
        &mut self,
        type_name: &'static str,
        decode: impl Fn(&PackedData) -> Result<T, SignalMeshError> + Send + Sync + 'static,
    ) {
        let wrapped: DecodeFn = Arc::new(move |packed: &PackedData| {
            let value = decode(packed)?;
            Ok(Box::new(value) as Box<AnyPayload>)
        });
        let idx = self.decoders.len();
        self.decoders.push(DecoderEntry { type_name, decode: wrapped });
        self.decoder_index.insert(TypeId::of::<T>(), idx);
    }

    /// Packs a value of type `T` into a `PackedData`, filling in the
    /// decoder-index hint if a matching decoder is registered.
    pub fn pack<T: Send + Sync + 'static>(&self, value: &T) -> Result<PackedData, SignalMeshError> {
        let type_name = std::any::type_name::<T>();
        let type_id = TypeId::of::<T>();
        let idx = self
            .encoder_index
            .get(&type_id)
            .copied()
            .ok_or(SignalMeshError::PackingNoEncoder { type_name })?;
        let entry = &self.encoders[idx];
        let mut packed = (entry.encode)(value)?;
        packed.decoder_index = self
            .decoder_index
            .get(&type_id)
            .map_or(-1, |i| i32::try_from(*i).unwrap_or(-1));
        Ok(packed)
    }

    /// Unpacks a `PackedData` into a boxed `T` using its decoder-index hint,
    /// falling back to a `TypeId` lookup if the hint is stale.
    pub fn unpack<T: Send + Sync + 'static>(
        &self,
        packed: &PackedData,
    ) -> Result<T, SignalMeshError> {
        let type_name = std::any::type_name::<T>();
        let entry = if packed.decoder_index >= 0 {
            usize::try_from(packed.decoder_index).ok().and_then(|i| self.decoders.get(i))
        } else {
            None
        }
        .or_else(|| self.decoder_index.get(&TypeId::of::<T>()).and_then(|i| self.decoders.get(*i)))
        .ok_or(SignalMeshError::UnpackingNoDecoder { type_name })?;
        let boxed = (entry.decode)(packed)?;
        boxed
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| SignalMeshError::UnpackingInvalidDecoder { type_name })
    }

    /// Registers the UTF-8 string, byte-passthrough, and fixed-width
    /// integer/float family default codecs. Only `i32` gets the wire
    /// format's dedicated `INT` fast path; every other numeric width is
    /// `GENERIC` and resolved through the decoder-index table instead.
    pub fn register_defaults(&mut self) {
        self.register_encoder::<String>("alloc::string::String", |value: &String| {
            Ok(PackedData {
                flags: ContentFlags::STRING,
                decoder_index: -1,
                type_name: "alloc::string::String",
                bytes: Bytes::copy_from_slice(value.as_bytes()),
            })
        });
        self.register_decoder::<String>("alloc::string::String", |packed: &PackedData| {
            String::from_utf8(packed.bytes.to_vec()).map_err(|e| SignalMeshError::UnpackingDecoderCallback {
                type_name: "alloc::string::String",
                reason: e.to_string(),
            })
        });

        self.register_encoder::<i32>("i32", |value: &i32| {
            Ok(PackedData {
                flags: ContentFlags::INT,
                decoder_index: -1,
                type_name: "i32",
                bytes: Bytes::copy_from_slice(&value.to_le_bytes()),
            })
        });
        self.register_decoder::<i32>("i32", |packed: &PackedData| {
            let bytes: [u8; 4] =
                packed.bytes[..4.min(packed.bytes.len())]
                    .try_into()
                    .map_err(|_| SignalMeshError::InvalidData {
                        reason: "i32 payload is not 4 bytes".to_string(),
                    })?;
            Ok(i32::from_le_bytes(bytes))
        });

        self.register_encoder::<Bytes>("bytes::Bytes", |value: &Bytes| {
            Ok(PackedData {
                flags: ContentFlags::BYTE,
                decoder_index: -1,
                type_name: "bytes::Bytes",
                bytes: value.clone(),
            })
        });
        self.register_decoder::<Bytes>("bytes::Bytes", |packed: &PackedData| Ok(packed.bytes.clone()));

        register_fixed_width::<i8, 1>(self, "i8", i8::to_le_bytes, i8::from_le_bytes);
        register_fixed_width::<i16, 2>(self, "i16", i16::to_le_bytes, i16::from_le_bytes);
        register_fixed_width::<i64, 8>(self, "i64", i64::to_le_bytes, i64::from_le_bytes);
        register_fixed_width::<i128, 16>(self, "i128", i128::to_le_bytes, i128::from_le_bytes);
        register_fixed_width::<u8, 1>(self, "u8", u8::to_le_bytes, u8::from_le_bytes);
        register_fixed_width::<u16, 2>(self, "u16", u16::to_le_bytes, u16::from_le_bytes);
        register_fixed_width::<u32, 4>(self, "u32", u32::to_le_bytes, u32::from_le_bytes);
        register_fixed_width::<u64, 8>(self, "u64", u64::to_le_bytes, u64::from_le_bytes);
        register_fixed_width::<f32, 4>(self, "f32", f32::to_le_bytes, f32::from_le_bytes);
        register_fixed_width::<f64, 8>(self, "f64", f64::to_le_bytes, f64::from_le_bytes);
    }

    /// Registers the opt-in generic JSON-over-`serde_json::Value` codec.
    pub fn register_generic(&mut self) {
        self.register_encoder::<serde_json::Value>("serde_json::Value", |value: &serde_json::Value| {
            let bytes = serde_json::to_vec(value).map_err(|e| SignalMeshError::PackingEncoderCallback {
                type_name: "serde_json::Value",
                reason: e.to_string(),
            })?;
            Ok(PackedData {
                flags: ContentFlags::GENERIC,
                decoder_index: -1,
                type_name: "serde_json::Value",
                bytes: Bytes::from(bytes),
            })
        });
        self.register_decoder::<serde_json::Value>("serde_json::Value", |packed: &PackedData| {
            serde_json::from_slice(&packed.bytes).map_err(|e| SignalMeshError::UnpackingDecoderCallback {
                type_name: "serde_json::Value",
                reason: e.to_string(),
            })
        });
    }
}

/// Registers a fixed-width numeric default codec under the `GENERIC` flag
/// (every width but `i32` routes through the decoder-index table rather
/// than the wire format's dedicated `INT` fast path).
fn register_fixed_width<T, const N: usize>(
    table: &mut CodecTable,
    type_name: &'static str,
    to_le_bytes: fn(T) -> [u8; N],
    from_le_bytes: fn([u8; N]) -> T,
) where
    T: Send + Sync + Copy + 'static,
{
    table.register_encoder::<T>(type_name, move |value: &T| {
        Ok(PackedData {
            flags: ContentFlags::GENERIC,
            decoder_index: -1,
            type_name,
            bytes: Bytes::copy_from_slice(&to_le_bytes(*value)),
        })
    });
    table.register_decoder::<T>(type_name, move |packed: &PackedData| {
        let bytes: [u8; N] = packed.bytes[..N.min(packed.bytes.len())]
            .try_into()
            .map_err(|_| SignalMeshError::InvalidData {
                reason: format!("{type_name} payload is not {N} bytes"),
            })?;
        Ok(from_le_bytes(bytes))
    });
}
