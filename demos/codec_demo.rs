// Example demonstrating the MinBiT wire codec in isolation, no socket required.
//
// Shows how fixed-width primitives and the two composite types (Vec3, Quat)
// round-trip through encode/decode, and how endianness and the
// variable-length marker affect payload layout.

use minbit::codec::{self, Endianness, Quat, Vec3};
use minbit::schema::VARIABLE_LENGTH;
use bytes::BytesMut;

fn main() {
    println!("MinBiT Codec Demo");
    println!("==================");

    let mut buf = BytesMut::new();
    codec::encode_u8(&mut buf, 0x02);
    codec::encode_quat(
        &mut buf,
        Quat {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        },
        Endianness::Big,
    );
    println!("\nEncoded IMU_QUAT packet ({} bytes): {:02x?}", buf.len(), &buf[..]);

    let header = codec::decode_u8(&buf[0..1]).unwrap();
    let quat = codec::decode_quat(&buf[1..17], Endianness::Big).unwrap();
    println!("Decoded header=0x{header:02x}, quat={quat:?}");

    // Same packet, little-endian wire order: the bytes differ but the value doesn't.
    let mut le_buf = BytesMut::new();
    codec::encode_quat(&mut le_buf, quat, Endianness::Little);
    println!("\nSame quaternion, little-endian bytes: {:02x?}", &le_buf[..]);
    assert_eq!(
        codec::decode_quat(&le_buf, Endianness::Little).unwrap(),
        quat
    );

    let v = Vec3 {
        x: 1.5,
        y: -2.5,
        z: 3.0,
    };
    let mut vec_buf = BytesMut::new();
    codec::encode_vec3(&mut vec_buf, v, Endianness::Big);
    println!("\nEncoded Vec3 {v:?} -> {:02x?}", &vec_buf[..]);

    // Variable-length payloads carry an explicit length byte after the
    // header; VARIABLE_LENGTH (-1) in a schema table is the marker that
    // tells the engine to read that byte instead of trusting a fixed size.
    println!(
        "\nSchema marker for variable-length payloads: {VARIABLE_LENGTH}"
    );

    println!("\nError handling demo: decoding a short buffer");
    match codec::decode_u64(&[0u8; 4], Endianness::Big) {
        Err(e) => println!("  got expected error: {e}"),
        Ok(_) => unreachable!("4 bytes is not enough for a u64"),
    }
}
