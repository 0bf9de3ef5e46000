//! On-the-wire encoding for signal headers and packed payloads.
//!
//! Layout: a `u16` little-endian header (bit 15 = typed-payload flag, bits
//! 0-14 = signal table index), followed — only when the typed-payload bit is
//! set — by a `u8` flags byte and the flag-specific payload encoding:
//!
//! - `STRING`: `i32`-length-prefixed UTF-8 bytes.
//! - `INT`: a fixed 4-byte little-endian `i32`.
//! - `BYTE`: `i32` length, then that many raw bytes.
//! - anything else (`GENERIC` and every other registered type): an `i16`
//!   decoder-index, a length-prefixed type name when that index is negative
//!   (resolved by name instead), then an `i32`-length-prefixed payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::content::{ContentFlags, PackedData};
use crate::error::SignalMeshError;

const INT_PAYLOAD_LEN: usize = 4;

const TYPED_PAYLOAD_BIT: u16 = 1 << 15;
const SIGNAL_INDEX_MASK: u16 = 0x7FFF;

/// Splits a wire header into its signal-index and typed-payload parts.
#[must_use]
pub const fn decode_header(header: u16) -> (u16, bool) {
    (header & SIGNAL_INDEX_MASK, header & TYPED_PAYLOAD_BIT != 0)
}

/// Builds a wire header from a signal index and whether a payload follows.
///
/// # Errors
/// Returns [`SignalMeshError::Argument`] if `signal_index` does not fit in
/// 15 bits.
pub fn encode_header(signal_index: u16, has_payload: bool) -> Result<u16, SignalMeshError> {
    if signal_index & TYPED_PAYLOAD_BIT != 0 {
        return Err(SignalMeshError::Argument {
            reason: format!("signal index {signal_index} does not fit in 15 bits"),
        });
    }
    Ok(signal_index | if has_payload { TYPED_PAYLOAD_BIT } else { 0 })
}

/// A packed payload decoded off the wire. `type_name` is only populated for
/// the generic branch when `decoder_index` is negative — STRING/INT/BYTE
/// never carry one, and a resolvable index doesn't need one either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    /// The flags byte the payload was tagged with.
    pub flags: ContentFlags,
    /// Decoder-table index hint, or `-1`/absent on the fast paths.
    pub decoder_index: i32,
    /// Type name to resolve by lookup when `decoder_index` is negative.
    pub type_name: Option<String>,
    /// The payload bytes themselves (already stripped of any length prefix).
    pub bytes: Bytes,
}

/// Appends a packed payload's wire encoding onto `out`.
pub fn encode_packed_data(out: &mut BytesMut, packed: &PackedData) {
    out.put_u8(packed.flags.bits());
    if packed.flags.contains(ContentFlags::STRING) || packed.flags.contains(ContentFlags::BYTE) {
        out.put_i32_le(i32::try_from(packed.bytes.len()).unwrap_or(i32::MAX));
        out.put_slice(&packed.bytes);
    } else if packed.flags.contains(ContentFlags::INT) {
        let mut buf = [0u8; INT_PAYLOAD_LEN];
        let len = packed.bytes.len().min(INT_PAYLOAD_LEN);
        buf[..len].copy_from_slice(&packed.bytes[..len]);
        out.put_slice(&buf);
    } else {
        out.put_i16_le(i16::try_from(packed.decoder_index).unwrap_or(-1));
        if packed.decoder_index < 0 {
            let name_bytes = packed.type_name.as_bytes();
            out.put_i32_le(i32::try_from(name_bytes.len()).unwrap_or(i32::MAX));
            out.put_slice(name_bytes);
        }
        out.put_i32_le(i32::try_from(packed.bytes.len()).unwrap_or(i32::MAX));
        out.put_slice(&packed.bytes);
    }
}

/// Parses a packed payload previously written by [`encode_packed_data`].
///
/// # Errors
/// Returns [`SignalMeshError::InvalidData`] if `buf` is truncated.
pub fn decode_packed_data(buf: &mut Bytes) -> Result<DecodedPayload, SignalMeshError> {
    if buf.remaining() < 1 {
        return Err(SignalMeshError::InvalidData {
            reason: "buffer too short for a flags byte".to_string(),
        });
    }
    let flags = ContentFlags::from_bits(buf.get_u8());
    if flags.contains(ContentFlags::STRING) || flags.contains(ContentFlags::BYTE) {
        let bytes = read_length_prefixed(buf, "a payload")?;
        Ok(DecodedPayload { flags, decoder_index: -1, type_name: None, bytes })
    } else if flags.contains(ContentFlags::INT) {
        if buf.remaining() < INT_PAYLOAD_LEN {
            return Err(SignalMeshError::InvalidData {
                reason: "buffer too short for a 4-byte integer payload".to_string(),
            });
        }
        Ok(DecodedPayload {
            flags,
            decoder_index: -1,
            type_name: None,
            bytes: buf.copy_to_bytes(INT_PAYLOAD_LEN),
        })
    } else {
        if buf.remaining() < 2 {
            return Err(SignalMeshError::InvalidData {
                reason: "buffer too short for a decoder index".to_string(),
            });
        }
        let decoder_index = i32::from(buf.get_i16_le());
        let type_name = if decoder_index < 0 {
            let name_bytes = read_length_prefixed(buf, "a type name")?;
            Some(String::from_utf8(name_bytes.to_vec()).map_err(|e| SignalMeshError::InvalidData {
                reason: format!("type name is not valid UTF-8: {e}"),
            })?)
        } else {
            None
        };
        let bytes = read_length_prefixed(buf, "a payload")?;
        Ok(DecodedPayload { flags, decoder_index, type_name, bytes })
    }
}

/// Reads an `i32`-length-prefixed byte run, used by every wire shape except
/// the fixed-width `INT` fast path.
fn read_length_prefixed(buf: &mut Bytes, what: &str) -> Result<Bytes, SignalMeshError> {
    if buf.remaining() < 4 {
        return Err(SignalMeshError::InvalidData {
            reason: format!("buffer too short for a length prefix before {what}"),
        });
    }
    let len = buf.get_i32_le();
    let len = usize::try_from(len).map_err(|_| SignalMeshError::InvalidData {
        reason: format!("negative length prefix before {what}"),
    })?;
    if buf.remaining() < len {
        return Err(SignalMeshError::InvalidData {
            reason: format!("buffer too short for a {len}-byte {what}"),
        });
    }
    Ok(buf.copy_to_bytes(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_index_and_flag() {
        let header = encode_header(1234, true).unwrap();
        assert_eq!(decode_header(header), (1234, true));
    }

    #[test]
    fn header_without_payload_clears_typed_bit() {
        let header = encode_header(5, false).unwrap();
        assert_eq!(decode_header(header), (5, false));
    }

    #[test]
    fn oversized_index_is_rejected() {
        assert!(encode_header(0x8000, false).is_err());
    }

    #[test]
    fn packed_string_round_trips() {
        let packed = PackedData {
            flags: ContentFlags::STRING,
            decoder_index: 3,
            type_name: "alloc::string::String",
            bytes: Bytes::from_static(b"hello"),
        };
        let mut out = BytesMut::new();
        encode_packed_data(&mut out, &packed);
        let mut frozen = out.freeze();
        let decoded = decode_packed_data(&mut frozen).unwrap();
        assert_eq!(decoded.flags, ContentFlags::STRING);
        assert_eq!(&decoded.bytes[..], b"hello");
    }

    #[test]
    fn packed_int_round_trips_as_four_bytes() {
        let packed = PackedData {
            flags: ContentFlags::INT,
            decoder_index: -1,
            type_name: "i32",
            bytes: Bytes::copy_from_slice(&42_i32.to_le_bytes()),
        };
        let mut out = BytesMut::new();
        encode_packed_data(&mut out, &packed);
        assert_eq!(out.len(), 1 + 4);
        let mut frozen = out.freeze();
        let decoded = decode_packed_data(&mut frozen).unwrap();
        assert_eq!(decoded.flags, ContentFlags::INT);
        assert_eq!(i32::from_le_bytes(decoded.bytes[..].try_into().unwrap()), 42);
    }

    #[test]
    fn packed_generic_round_trips_with_resolvable_index() {
        let packed = PackedData {
            flags: ContentFlags::GENERIC,
            decoder_index: 7,
            type_name: "i64",
            bytes: Bytes::copy_from_slice(&9_i64.to_le_bytes()),
        };
        let mut out = BytesMut::new();
        encode_packed_data(&mut out, &packed);
        let mut frozen = out.freeze();
        let decoded = decode_packed_data(&mut frozen).unwrap();
        assert_eq!(decoded.decoder_index, 7);
        assert_eq!(decoded.type_name, None);
        assert_eq!(i64::from_le_bytes(decoded.bytes[..].try_into().unwrap()), 9);
    }

    #[test]
    fn packed_generic_carries_type_name_when_index_unresolved() {
        let packed = PackedData {
            flags: ContentFlags::GENERIC,
            decoder_index: -1,
            type_name: "f64",
            bytes: Bytes::copy_from_slice(&1.5_f64.to_le_bytes()),
        };
        let mut out = BytesMut::new();
        encode_packed_data(&mut out, &packed);
        let mut frozen = out.freeze();
        let decoded = decode_packed_data(&mut frozen).unwrap();
        assert_eq!(decoded.decoder_index, -1);
        assert_eq!(decoded.type_name.as_deref(), Some("f64"));
        assert_eq!(f64::from_le_bytes(decoded.bytes[..].try_into().unwrap()), 1.5);
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let mut buf = Bytes::from_static(&[ContentFlags::STRING.bits()]);
        assert!(decode_packed_data(&mut buf).is_err());
    }
}
