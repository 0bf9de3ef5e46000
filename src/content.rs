//! Content packets: the header-plus-payload envelope carried by signals.

use bytes::Bytes;

use crate::error::SignalMeshError;

/// Bit flags describing how a packed payload's bytes should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentFlags(u8);

impl ContentFlags {
    /// No payload is present.
    pub const NONE: Self = Self(0);
    /// Payload is resolved through the router's decoder-index table rather
    /// than one of the three fixed wire shapes below: every registered type
    /// beyond the `i32`/`String`/`Bytes` fast paths (the other fixed-width
    /// integer and float families, and the opt-in JSON-over-object codec).
    pub const GENERIC: Self = Self(1 << 0);
    /// Payload is a 4-byte little-endian `i32` — the wire format's only
    /// fixed integer fast path; every other numeric width goes through
    /// `GENERIC`'s decoder-index lookup instead.
    pub const INT: Self = Self(1 << 1);
    /// Payload is a UTF-8 string.
    pub const STRING: Self = Self(1 << 2);
    /// Payload is an opaque byte sequence passed through unchanged.
    pub const BYTE: Self = Self(1 << 3);

    /// Raw bit value, for wire encoding.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Reconstructs flags from their raw wire value.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Whether `self` carries every bit set in `other`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ContentFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A type-erased, already-packed payload produced by the router's pack step.
///
/// `decoder_index` is `-1` when no decoder claimed the payload's type at
/// pack time (the payload can still be carried and later unpacked once a
/// matching decoder is registered, or dropped as an opaque byte blob).
#[derive(Debug, Clone)]
pub struct PackedData {
    /// Flags describing the byte encoding.
    pub flags: ContentFlags,
    /// Index into the router's decoder table, or `-1` if unresolved.
    pub decoder_index: i32,
    /// Name of the Rust type the bytes were packed from.
    pub type_name: &'static str,
    /// The packed bytes.
    pub bytes: Bytes,
}

/// A marker payload type for packets that carry no data.
///
/// `Content<Empty>` rejects `set_data` unconditionally, matching the
/// specification's "EmptyContent rejects SetData with an argument error."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Empty;

/// Header-plus-payload envelope. `T` is the payload's Rust type on the typed
/// path; the router uses `Content<PackedData>` once a payload has been
/// packed to bytes for transport between differently-typed handlers.
#[derive(Debug, Clone)]
pub struct Content<T> {
    header: u16,
    data: Option<T>,
}

impl<T> Content<T> {
    /// Builds a content packet from a header and optional payload.
    #[must_use]
    pub const fn new(header: u16, data: Option<T>) -> Self {
        Self { header, data }
    }

    /// The packet's header: signal table index plus the typed-payload bit.
    #[must_use]
    pub const fn header(&self) -> u16 {
        self.header
    }

    /// Borrowed access to the payload, if any.
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Consumes the packet, returning its payload.
    #[must_use]
    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// Replaces the payload. `None` clears it.
    pub fn set_data(&mut self, data: Option<T>) {
        self.data = data;
    }
}

impl Content<Empty> {
    /// Always fails: an empty content packet carries no payload slot to
    /// write into.
    pub fn try_set_data(&mut self, _data: Option<Empty>) -> Result<(), SignalMeshError> {
        Err(SignalMeshError::Argument {
            reason: "cannot set data on an empty content packet".to_string(),
        })
    }
}
