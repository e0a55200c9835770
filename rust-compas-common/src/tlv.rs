//! TLV (Type‑Length‑Value) encoding and decoding utilities.
//!
//! Every field on the wire is preceded by a one-byte type and a
//! variable-width length. Decoders in this module never consume a field
//! they cannot fully read: on error the input buffer is left where it was.

use crate::error::Error;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/* ---------------------------------------------------------------- *
 * TLV type constants (single‑byte)
 * ---------------------------------------------------------------- */

pub const TLV_INTEREST: u8          = 0x05;
pub const TLV_DATA: u8              = 0x06;
pub const TLV_NAME: u8              = 0x07;
pub const TLV_COMPONENT: u8         = 0x08;
pub const TLV_NONCE: u8             = 0x0A;
pub const TLV_INTEREST_LIFETIME: u8 = 0x0C;
pub const TLV_MUST_BE_FRESH: u8     = 0x12;
pub const TLV_META_INFO: u8         = 0x14;
pub const TLV_CONTENT: u8           = 0x15;
pub const TLV_FRESHNESS_PERIOD: u8  = 0x19;
pub const TLV_CAN_BE_PREFIX: u8     = 0x21;

/* ---------------------------------------------------------------- *
 * Encoding helpers
 * ---------------------------------------------------------------- */

/// Encode the 1‑byte TLV *type* field.
pub fn encode_tlv_type(tlv_type: u8, buf: &mut BytesMut) {
    buf.put_u8(tlv_type);
}

/// Encode the variable‑width TLV *length* field.
///
/// * `< 253`  → 1 byte
/// * `≤ 65 535`  → marker 253 + 2‑byte length
/// * otherwise → marker 254 + 4‑byte length
pub fn encode_tlv_length(length: usize, buf: &mut BytesMut) {
    if length < 253 {
        buf.put_u8(length as u8);
    } else if length <= 65_535 {
        buf.put_u8(253);
        buf.put_u16(length as u16);
    } else {
        buf.put_u8(254);
        buf.put_u32(length as u32);
    }
}

/// Encode a non-negative integer in the shortest of 1, 2, 4 or 8 bytes.
pub fn encode_nonneg_integer(value: u64, buf: &mut BytesMut) {
    if value <= u8::MAX as u64 {
        buf.put_u8(value as u8);
    } else if value <= u16::MAX as u64 {
        buf.put_u16(value as u16);
    } else if value <= u32::MAX as u64 {
        buf.put_u32(value as u32);
    } else {
        buf.put_u64(value);
    }
}

/// Encode a complete element holding a non-negative integer.
pub fn encode_nonneg_element(tlv_type: u8, value: u64, buf: &mut BytesMut) {
    let mut inner = BytesMut::with_capacity(8);
    encode_nonneg_integer(value, &mut inner);
    TlvElement::new(tlv_type, inner.freeze()).encode(buf);
}

/* ---------------------------------------------------------------- *
 * Decoding helpers
 * ---------------------------------------------------------------- */

/// Decode the TLV *type* field (single byte).
pub fn decode_tlv_type(buf: &mut impl Buf) -> Result<u8, Error> {
    if !buf.has_remaining() {
        return Err(Error::Tlv("Buffer underflow when decoding TLV type".into()));
    }
    Ok(buf.get_u8())
}

/// Decode the TLV *length* field using the variable‑length rules.
pub fn decode_tlv_length(buf: &mut impl Buf) -> Result<usize, Error> {
    if !buf.has_remaining() {
        return Err(Error::Tlv("Buffer underflow when decoding TLV length".into()));
    }

    let first_byte = buf.get_u8();
    match first_byte {
        0..=252 => Ok(first_byte as usize),
        253 => {
            if buf.remaining() < 2 {
                return Err(Error::Tlv("Buffer underflow when decoding 16‑bit TLV length".into()));
            }
            Ok(buf.get_u16() as usize)
        }
        254 => {
            if buf.remaining() < 4 {
                return Err(Error::Tlv("Buffer underflow when decoding 32‑bit TLV length".into()));
            }
            Ok(buf.get_u32() as usize)
        }
        255 => Err(Error::Tlv("64‑bit TLV lengths not supported".into())),
    }
}

/// Strip a TLV header from the front of `buf`.
///
/// Returns the type and the value length. The header is only consumed when
/// the whole value is present; a malformed or truncated field leaves `buf`
/// untouched.
pub fn dehead(buf: &mut Bytes) -> Result<(u8, usize), Error> {
    let mut probe = buf.clone();
    let tlv_type = decode_tlv_type(&mut probe)?;
    let length = decode_tlv_length(&mut probe)?;

    if probe.remaining() < length {
        return Err(Error::Tlv(format!(
            "TLV type 0x{:02x} announces {} bytes but only {} available",
            tlv_type,
            length,
            probe.remaining()
        )));
    }

    *buf = probe;
    Ok((tlv_type, length))
}

/// Decode a non-negative integer value of 1, 2, 4 or 8 bytes.
pub fn decode_nonneg_integer(value: &[u8]) -> Result<u64, Error> {
    let mut v = value;
    match value.len() {
        1 => Ok(v.get_u8() as u64),
        2 => Ok(v.get_u16() as u64),
        4 => Ok(v.get_u32() as u64),
        8 => Ok(v.get_u64()),
        n => Err(Error::Tlv(format!("invalid non-negative integer width {}", n))),
    }
}

/* ---------------------------------------------------------------- *
 * TLV element wrapper
 * ---------------------------------------------------------------- */

/// A generic TLV element consisting of *type*, *length* and *value*.
#[derive(Debug, Clone, PartialEq)]
pub struct TlvElement {
    pub tlv_type: u8,
    pub value: Bytes,
}

impl TlvElement {
    /// Create a new wrapper from raw parts.
    pub fn new(tlv_type: u8, value: impl Into<Bytes>) -> Self {
        Self {
            tlv_type,
            value: value.into(),
        }
    }

    /// Total number of bytes when this element is encoded.
    pub fn len(&self) -> usize {
        let vlen = self.value.len();
        1            // type
        + tlv_length_size(vlen)
        + vlen       // value
    }

    /// True when the value is empty (the encoding still carries a header).
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Encode this element into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_tlv_type(self.tlv_type, buf);
        encode_tlv_length(self.value.len(), buf);
        buf.extend_from_slice(&self.value);
    }

    /// Decode a single element from the front of `buf`.
    ///
    /// On error `buf` is not advanced.
    pub fn decode(buf: &mut Bytes) -> Result<Self, Error> {
        let (tlv_type, length) = dehead(buf)?;
        // zero‑copy slice of the shared buffer
        let value = buf.split_to(length);
        Ok(Self { tlv_type, value })
    }
}

/* ---------------------------------------------------------------- *
 * Helper
 * ---------------------------------------------------------------- */

/// Number of bytes required to encode `length` with the variable‑width scheme.
fn tlv_length_size(length: usize) -> usize {
    if length < 253 {
        1
    } else if length <= 65_535 {
        3
    } else {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_widths() {
        let mut buf = BytesMut::new();
        encode_tlv_length(100, &mut buf);
        assert_eq!(&buf[..], &[100]);

        buf.clear();
        encode_tlv_length(1000, &mut buf);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf[0], 253);

        buf.clear();
        encode_tlv_length(100_000, &mut buf);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf[0], 254);

        let mut wire = buf.freeze();
        assert_eq!(decode_tlv_length(&mut wire).unwrap(), 100_000);
    }

    #[test]
    fn test_element_encoding() {
        let mut buf = BytesMut::new();
        TlvElement::new(1, &b"abc"[..]).encode(&mut buf);
        assert_eq!(&buf[..], &[1, 3, b'a', b'b', b'c']);

        let mut wire = buf.freeze();
        let element = TlvElement::decode(&mut wire).unwrap();
        assert_eq!(element.tlv_type, 1);
        assert_eq!(&element.value[..], b"abc");
        assert!(wire.is_empty());
    }

    #[test]
    fn test_dehead_truncated_does_not_advance() {
        // announces 10 bytes, carries 2
        let mut wire = Bytes::from_static(&[0x07, 0x0A, 0x01, 0x02]);
        let err = dehead(&mut wire).unwrap_err();
        assert!(matches!(err, Error::Tlv(_)));
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0], 0x07);
    }

    #[test]
    fn test_dehead_reserved_length_marker() {
        let mut wire = Bytes::from_static(&[0x07, 0xFF, 0, 0, 0, 0, 0, 0, 0, 1]);
        assert!(dehead(&mut wire).is_err());
        assert_eq!(wire.len(), 10);
    }

    #[test]
    fn test_nonneg_integer_widths() {
        for value in [0u64, 200, 4000, 70_000, 5_000_000_000] {
            let mut buf = BytesMut::new();
            encode_nonneg_integer(value, &mut buf);
            assert_eq!(decode_nonneg_integer(&buf).unwrap(), value);
        }
        assert!(decode_nonneg_integer(&[1, 2, 3]).is_err());
    }
}
