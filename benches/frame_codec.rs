//! Frame codec benchmark suite.
//!
//! Benchmarks client frame encoding and server frame decoding across the
//! three length classes:
//! - 7-bit: 64 bytes
//! - 16-bit: 4 KiB
//! - 64-bit: 128 KiB
//!
//! Run with: cargo bench --bench frame_codec
//! Results saved to: target/criterion/

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use socketio_legacy::{FrameCodec, Opcode, Packet};
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PAYLOAD_SIZES: &[usize] = &[64, 4 * 1024, 128 * 1024];

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let codec = FrameCodec::new();

    let mut group = c.benchmark_group("encode");
    for &size in PAYLOAD_SIZES {
        let payload = vec![b'x'; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("masked", size), &payload, |b, payload| {
            b.iter(|| codec.encode(payload, Opcode::Text, true));
        });
        group.bench_with_input(BenchmarkId::new("unmasked", size), &payload, |b, payload| {
            b.iter(|| codec.encode(payload, Opcode::Text, false));
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let codec = FrameCodec::new().with_large_frames(true);

    let mut group = c.benchmark_group("decode");
    for &size in PAYLOAD_SIZES {
        let frame = codec.encode(&vec![b'x'; size], Opcode::Text, false);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("server", size), &frame, |b, frame| {
            b.to_async(&rt).iter(|| async {
                let mut reader = frame.as_slice();
                codec.decode(&mut reader).await.unwrap()
            });
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark: Event Packet
// ============================================================================

fn bench_event_packet(c: &mut Criterion) {
    let codec = FrameCodec::new();

    c.bench_function("event_packet", |b| {
        b.iter(|| {
            let packet = Packet::event(
                "message",
                vec![serde_json::json!({"message": "hello", "room": 1})],
                Some("/chat"),
            )
            .unwrap();
            codec.encode(packet.to_string().as_bytes(), Opcode::Text, true)
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_event_packet);
criterion_main!(benches);
