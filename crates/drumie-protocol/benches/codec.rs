//! Codec benchmarks for drumie-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use drumie_protocol::{codec, Frame};
use serde_json::json;

fn bench_encode_text(c: &mut Criterion) {
    let frame = Frame::publish("customer", "x".repeat(64));

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("text_64B", |b| b.iter(|| codec::encode(black_box(&frame))));
    group.finish();
}

fn bench_decode_text(c: &mut Criterion) {
    let frame = Frame::message("customer", "user-2", "x".repeat(64));
    let encoded = codec::encode(&frame).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("text_64B", |b| {
        b.iter(|| codec::decode(black_box(&encoded)))
    });
    group.finish();
}

fn bench_roundtrip_json(c: &mut Criterion) {
    let frame = Frame::publish(
        "customer",
        json!({"message": "auto publish from client", "count": 42, "tags": ["a", "b"]}),
    );

    c.bench_function("roundtrip_json", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&frame)).unwrap();
            codec::decode(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode_text,
    bench_decode_text,
    bench_roundtrip_json
);
criterion_main!(benches);
