// ABOUTME: Endianness-aware serialization of MinBiT primitives and composite values
// ABOUTME: Pure encode/decode functions over byte slices; no buffering or framing state lives here

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{MinBitError, MinBitResult};

/// Byte order used for all multi-byte primitives on the wire.
///
/// A per-engine setting, not negotiated with the peer: both sides must agree
/// out of band. Mismatched endianness is silent corruption, not a detectable
/// protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

/// A 3-component vector of `f32`, wire order x, y, z.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// A quaternion reconstructed in memory as `(w, x, y, z)`.
///
/// The wire coefficient order is `(x, y, z, w)` regardless of endianness;
/// only the byte order within each `f32` changes. This mirrors the
/// coefficient convention of common quaternion libraries, which store the
/// scalar component last.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quat {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Encodes a `u8` (endianness never applies to a single byte).
pub fn encode_u8(buf: &mut BytesMut, value: u8) {
    buf.put_u8(value);
}

/// Decodes a `u8` from the front of `buf`.
pub fn decode_u8(buf: &[u8]) -> MinBitResult<u8> {
    require_len(buf, 1)?;
    Ok(buf[0])
}

/// Encodes an `i16` using `endianness`.
pub fn encode_i16(buf: &mut BytesMut, value: i16, endianness: Endianness) {
    match endianness {
        Endianness::Big => buf.put_i16(value),
        Endianness::Little => buf.put_i16_le(value),
    }
}

/// Decodes an `i16` using `endianness`.
pub fn decode_i16(buf: &[u8], endianness: Endianness) -> MinBitResult<i16> {
    require_len(buf, 2)?;
    let mut cursor = buf;
    Ok(match endianness {
        Endianness::Big => cursor.get_i16(),
        Endianness::Little => cursor.get_i16_le(),
    })
}

/// Encodes an `f32` by reinterpreting its bits as `u32` and byte-swapping per `endianness`.
pub fn encode_f32(buf: &mut BytesMut, value: f32, endianness: Endianness) {
    let bits = value.to_bits();
    match endianness {
        Endianness::Big => buf.put_u32(bits),
        Endianness::Little => buf.put_u32_le(bits),
    }
}

/// Decodes an `f32`, reversing [`encode_f32`].
pub fn decode_f32(buf: &[u8], endianness: Endianness) -> MinBitResult<f32> {
    require_len(buf, 4)?;
    let mut cursor = buf;
    let bits = match endianness {
        Endianness::Big => cursor.get_u32(),
        Endianness::Little => cursor.get_u32_le(),
    };
    Ok(f32::from_bits(bits))
}

/// Encodes a `u64` using `endianness`.
pub fn encode_u64(buf: &mut BytesMut, value: u64, endianness: Endianness) {
    match endianness {
        Endianness::Big => buf.put_u64(value),
        Endianness::Little => buf.put_u64_le(value),
    }
}

/// Decodes a `u64` using `endianness`.
pub fn decode_u64(buf: &[u8], endianness: Endianness) -> MinBitResult<u64> {
    require_len(buf, 8)?;
    let mut cursor = buf;
    Ok(match endianness {
        Endianness::Big => cursor.get_u64(),
        Endianness::Little => cursor.get_u64_le(),
    })
}

/// Encodes a [`Vec3`] as three consecutive `f32`s, wire order x, y, z.
pub fn encode_vec3(buf: &mut BytesMut, value: Vec3, endianness: Endianness) {
    encode_f32(buf, value.x, endianness);
    encode_f32(buf, value.y, endianness);
    encode_f32(buf, value.z, endianness);
}

/// Decodes a [`Vec3`] from 12 bytes, wire order x, y, z.
pub fn decode_vec3(buf: &[u8], endianness: Endianness) -> MinBitResult<Vec3> {
    require_len(buf, 12)?;
    Ok(Vec3 {
        x: decode_f32(&buf[0..4], endianness)?,
        y: decode_f32(&buf[4..8], endianness)?,
        z: decode_f32(&buf[8..12], endianness)?,
    })
}

/// Encodes a [`Quat`] as four consecutive `f32`s in coefficient order x, y, z, w.
///
/// Note the in-memory struct stores `w` first; only the wire order is x, y, z, w.
pub fn encode_quat(buf: &mut BytesMut, value: Quat, endianness: Endianness) {
    encode_f32(buf, value.x, endianness);
    encode_f32(buf, value.y, endianness);
    encode_f32(buf, value.z, endianness);
    encode_f32(buf, value.w, endianness);
}

/// Decodes a [`Quat`] from 16 bytes in wire coefficient order x, y, z, w,
/// reconstructing it in memory as `(w, x, y, z)`.
pub fn decode_quat(buf: &[u8], endianness: Endianness) -> MinBitResult<Quat> {
    require_len(buf, 16)?;
    let x = decode_f32(&buf[0..4], endianness)?;
    let y = decode_f32(&buf[4..8], endianness)?;
    let z = decode_f32(&buf[8..12], endianness)?;
    let w = decode_f32(&buf[12..16], endianness)?;
    Ok(Quat { w, x, y, z })
}

fn require_len(buf: &[u8], needed: usize) -> MinBitResult<()> {
    if buf.len() < needed {
        return Err(MinBitError::BufferUnderflow {
            requested: needed,
            available: buf.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_round_trip() {
        let mut buf = BytesMut::new();
        encode_u8(&mut buf, 0xAB);
        assert_eq!(decode_u8(&buf).unwrap(), 0xAB);
    }

    #[test]
    fn i16_round_trip_big_endian() {
        let mut buf = BytesMut::new();
        encode_i16(&mut buf, -1234, Endianness::Big);
        assert_eq!(buf.as_ref(), &(-1234i16).to_be_bytes());
        assert_eq!(decode_i16(&buf, Endianness::Big).unwrap(), -1234);
    }

    #[test]
    fn i16_round_trip_little_endian() {
        let mut buf = BytesMut::new();
        encode_i16(&mut buf, -1234, Endianness::Little);
        assert_eq!(decode_i16(&buf, Endianness::Little).unwrap(), -1234);
    }

    #[test]
    fn f32_round_trip_both_endiannesses() {
        for endianness in [Endianness::Big, Endianness::Little] {
            let mut buf = BytesMut::new();
            encode_f32(&mut buf, 1.0, endianness);
            assert_eq!(decode_f32(&buf, endianness).unwrap(), 1.0);
        }
    }

    #[test]
    fn u64_round_trip() {
        let mut buf = BytesMut::new();
        encode_u64(&mut buf, 1_000_000, Endianness::Big);
        assert_eq!(decode_u64(&buf, Endianness::Big).unwrap(), 1_000_000);
    }

    #[test]
    fn vec3_round_trip() {
        let v = Vec3 {
            x: 1.5,
            y: -2.5,
            z: 3.0,
        };
        let mut buf = BytesMut::new();
        encode_vec3(&mut buf, v, Endianness::Big);
        assert_eq!(decode_vec3(&buf, Endianness::Big).unwrap(), v);
    }

    #[test]
    fn quat_wire_order_is_xyzw_memory_order_is_wxyz() {
        let q = Quat {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        };
        let mut buf = BytesMut::new();
        encode_quat(&mut buf, q, Endianness::Big);

        // wire bytes: x, y, z, w -- so the last 4 bytes are w's bit pattern.
        assert_eq!(&buf[0..4], 0.0f32.to_bits().to_be_bytes());
        assert_eq!(&buf[12..16], 1.0f32.to_bits().to_be_bytes());

        assert_eq!(decode_quat(&buf, Endianness::Big).unwrap(), q);
    }

    #[test]
    fn decode_rejects_short_buffers() {
        let err = decode_u64(&[0u8; 4], Endianness::Big).unwrap_err();
        assert!(matches!(err, MinBitError::BufferUnderflow { .. }));
    }
}
