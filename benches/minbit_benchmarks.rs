// ABOUTME: Throughput benchmarks for FramingEngine characterization and the codec primitives
// ABOUTME: Mirrors the reference driver's concern that packet parsing not become the bottleneck

use std::hint::black_box;
use std::time::Duration;

use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

use minbit::codec::{self, Endianness, Quat};
use minbit::config::EngineConfig;
use minbit::schema::PacketSchema;
use minbit::stream::LoopbackByteStream;
use minbit::FramingEngine;

fn runtime() -> Runtime {
    Runtime::new().expect("failed to build benchmark runtime")
}

fn bench_fixed_length_characterization(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("characterize_packet");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("ping_0_byte_payload", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (a, _peer) = LoopbackByteStream::pair();
                let engine = FramingEngine::new(
                    a,
                    PacketSchema::new().with_incoming_by_request(0x01, 0),
                    EngineConfig::new(),
                );
                black_box(engine.on_bytes_received(&[0x01]).await);
            })
        })
    });

    group.bench_function("imu_quat_16_byte_payload", |b| {
        let mut packet = vec![0x02];
        packet.extend_from_slice(&[0u8; 16]);
        b.iter(|| {
            rt.block_on(async {
                let (a, _peer) = LoopbackByteStream::pair();
                let engine = FramingEngine::new(
                    a,
                    PacketSchema::new().with_incoming_by_request(0x02, 16),
                    EngineConfig::new(),
                );
                black_box(engine.on_bytes_received(&packet).await);
            })
        })
    });

    group.finish();
}

fn bench_variable_length_characterization(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("characterize_packet_variable_length");
    group.measurement_time(Duration::from_secs(10));

    for payload_len in [8usize, 64, 255] {
        let mut packet = vec![0x10, payload_len as u8];
        packet.extend(std::iter::repeat(0xAA).take(payload_len));

        group.bench_function(format!("payload_{payload_len}_bytes"), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let (a, _peer) = LoopbackByteStream::pair();
                    let engine = FramingEngine::new(
                        a,
                        PacketSchema::new().with_incoming_by_request(0x10, -1),
                        EngineConfig::new(),
                    );
                    black_box(engine.on_bytes_received(&packet).await);
                })
            })
        });
    }

    group.finish();
}

fn bench_codec_primitives(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    group.bench_function("encode_quat", |b| {
        let quat = Quat {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        };
        b.iter(|| {
            let mut buf = BytesMut::new();
            codec::encode_quat(&mut buf, black_box(quat), Endianness::Big);
            black_box(buf);
        })
    });

    group.bench_function("decode_quat", |b| {
        let mut buf = BytesMut::new();
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
        let frozen = buf.freeze();
        b.iter(|| black_box(codec::decode_quat(&frozen, Endianness::Big).unwrap()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_fixed_length_characterization,
    bench_variable_length_characterization,
    bench_codec_primitives
);
criterion_main!(benches);
