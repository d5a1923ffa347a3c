//! BufferArray benchmarks
//!
//! Measures append throughput across block sizes and positional reads that
//! cross block boundaries.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Write;
use weft::BufferArray;

const PAYLOAD: usize = 1 << 20;

fn payload() -> Vec<u8> {
    (0..PAYLOAD).map(|i| (i % 251) as u8).collect()
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.throughput(Throughput::Bytes(PAYLOAD as u64));
    let data = payload();

    for block_size in [512usize, 4096, weft::buffer::DEFAULT_BLOCK_SIZE].iter() {
        group.bench_with_input(BenchmarkId::new("1k_chunks", block_size), block_size, |b, &size| {
            b.iter(|| {
                let mut buffer = BufferArray::with_block_size(size);
                for chunk in data.chunks(1024) {
                    buffer.append(black_box(chunk));
                }
                buffer
            });
        });
    }

    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");
    let mut buffer = BufferArray::with_block_size(4096);
    buffer.append(&payload());

    for len in [64usize, 4096, 65536].iter() {
        group.throughput(Throughput::Bytes(*len as u64));
        group.bench_with_input(BenchmarkId::new("straddling", len), len, |b, &len| {
            let mut dst = vec![0u8; len];
            b.iter(|| buffer.read(black_box(4096 - 17), &mut dst));
        });
    }

    group.finish();
}

fn bench_gather(c: &mut Criterion) {
    let mut buffer = BufferArray::with_block_size(4096);
    buffer.append(&payload());

    c.bench_function("gather_write", |b| {
        let mut sink = Vec::with_capacity(PAYLOAD);
        b.iter(|| {
            sink.clear();
            for block in buffer.blocks() {
                sink.write_all(block).unwrap();
            }
            black_box(sink.len())
        });
    });
}

criterion_group!(benches, bench_append, bench_read, bench_gather);
criterion_main!(benches);
