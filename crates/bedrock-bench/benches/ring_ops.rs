//! Criterion micro-benchmarks for the double-mapped ring buffer.

use std::hint::black_box;

use bedrock_arena::{CircularBuffer, RingQueue};
use bedrock_bench::payload;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

fn bench_queue_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_queue_round_trip");
    for len in [64usize, 1024, 16 * 1024] {
        let message = payload(len, len as u64);
        let mut queue = RingQueue::new(64 * 1024).unwrap();
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_function(format!("{len}B"), |b| {
            b.iter(|| {
                assert!(queue.write(black_box(&message)));
                black_box(queue.read(len).unwrap());
            });
        });
    }
    group.finish();
}

fn bench_queue_burst(c: &mut Criterion) {
    let message = payload(100, 9);
    let mut queue = RingQueue::new(64 * 1024).unwrap();
    c.bench_function("ring_queue_burst_500x100B", |b| {
        b.iter(|| {
            for _ in 0..500 {
                assert!(queue.write(&message));
            }
            for _ in 0..500 {
                black_box(queue.read(100).unwrap());
            }
        });
    });
}

fn bench_buffer_create(c: &mut Criterion) {
    c.bench_function("circular_buffer_create_64KiB", |b| {
        b.iter(|| black_box(CircularBuffer::new(64 * 1024).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_queue_round_trip,
    bench_queue_burst,
    bench_buffer_create
);
criterion_main!(benches);
