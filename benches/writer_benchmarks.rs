//! Body Writer Benchmarks
//!
//! Measures the pass-through fast path against queueing behind a pending
//! flush, plus raw pool rental cost.
//!
//! Run with: cargo bench --bench writer_benchmarks

use armature_body::prelude::*;
use armature_body::{BufferQueue, PoolConfig};
use armature_pipe::testing::{NullSink, RecordingSink};
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tokio::runtime::Runtime;

// ============================================================================
// Buffer Pool Benchmarks
// ============================================================================

fn bench_pool_rent(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_pool");

    let pool = BufferPool::new(PoolConfig::default().preallocate(8));
    group.bench_function("rent_return_4kb", |b| {
        b.iter(|| {
            let mut block = pool.rent(black_box(0));
            block.extend_from_slice(b"x");
            black_box(block.len())
        })
    });

    group.bench_function("fresh_alloc_4kb", |b| {
        b.iter(|| {
            let block = BytesMut::with_capacity(black_box(4096));
            black_box(block.capacity())
        })
    });

    group.finish();
}

// ============================================================================
// Buffer Queue Benchmarks
// ============================================================================

fn bench_queue_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_queue");
    let chunk = [7u8; 256];
    group.throughput(Throughput::Bytes((chunk.len() * 64) as u64));

    let pool = BufferPool::with_defaults();
    group.bench_function("queue_and_replay_16kb", |b| {
        let mut sink = NullSink::new();
        b.iter(|| {
            let mut queue = BufferQueue::new(pool.clone());
            for _ in 0..64 {
                let mut view = queue.reserve(chunk.len());
                view.extend_from_slice(&chunk);
                queue.commit(view);
            }
            black_box(queue.drain_into(&mut sink))
        })
    });

    group.finish();
}

// ============================================================================
// Writer Benchmarks
// ============================================================================

fn bench_writer_paths(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent_writer");
    let payload = vec![b'a'; 1024];
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("fast_path_write_flush_1kb", |b| {
        let writer = ConcurrentBodyWriter::new(NullSink::new(), BufferPool::with_defaults());
        let (writer, payload) = (&writer, &payload);
        b.to_async(&rt).iter(move || async move {
            writer.write(black_box(payload)).unwrap();
            writer.flush().await.unwrap()
        })
    });

    let pool = BufferPool::with_defaults();
    group.throughput(Throughput::Bytes((payload.len() * 16) as u64));
    group.bench_function("queued_writes_16kb", |b| {
        b.iter_batched(
            || {
                // Park one flush so every following write goes to the queue
                let (sink, probe) = RecordingSink::new();
                let writer = ConcurrentBodyWriter::new(sink, pool.clone());
                writer.write(b"head").unwrap();
                let parked = rt.block_on(async { writer.flush() });
                (writer, probe, parked)
            },
            |(writer, probe, parked)| {
                for _ in 0..16 {
                    writer.write(black_box(&payload)).unwrap();
                }
                (writer, probe, parked)
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(
    writer_benches,
    bench_pool_rent,
    bench_queue_replay,
    bench_writer_paths,
);
criterion_main!(writer_benches);
