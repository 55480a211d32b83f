//! Codec benchmark suite.
//!
//! Measures encode and decode throughput for payloads of growing size:
//! - Object widths: 8, 64, 512 keys
//! - Frame kinds: plain JSON, base64-wrapped JSON
//!
//! Run with: cargo bench --bench codec
//! Results saved to: target/criterion/

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use webchannels::{Codec, Route, Value};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const WIDTHS: &[usize] = &[8, 64, 512];

fn payload(width: usize) -> Value {
    Value::object((0..width).map(|i| {
        let value = match i % 4 {
            0 => Value::from(i as i64),
            1 => Value::from(format!("value-{i}")),
            2 => Value::Number(f64::NAN),
            _ => Value::Array(vec![Value::Undefined, Value::from(true)]),
        };
        (format!("key{i}"), value)
    }))
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let codec = Codec::default();
    let route = Route::new("app");

    let mut group = c.benchmark_group("encode");
    for &width in WIDTHS {
        let payload = payload(width);
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &payload, |b, payload| {
            b.iter(|| codec.encode(&route, "update", black_box(payload)));
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let codec = Codec::default();
    let route = Route::new("app");

    let mut group = c.benchmark_group("decode");
    for &width in WIDTHS {
        let Ok(frame) = codec.encode(&route, "update", &payload(width)) else {
            continue;
        };
        let wrapped = format!("__b64__{}", STANDARD.encode(&frame));

        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new("json", width), &frame, |b, frame| {
            b.iter(|| codec.decode(black_box(frame)));
        });
        group.bench_with_input(BenchmarkId::new("base64", width), &wrapped, |b, frame| {
            b.iter(|| codec.decode(black_box(frame)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
