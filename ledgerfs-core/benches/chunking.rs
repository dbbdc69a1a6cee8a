//! Benchmarks for chunking, hashing and compression
//!
//! Run with: cargo bench --package ledgerfs-core --bench chunking

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ledgerfs_core::compression::{compress, decompress, DEFAULT_COMPRESSION_LEVEL};
use ledgerfs_core::hash::manifest_hash;
use ledgerfs_core::{split_into_chunks, ContentHash, DEFAULT_CHUNK_SIZE};

/// Generate test data of specified size
fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn format_size(size: usize) -> String {
    if size >= 1024 * 1024 {
        format!("{}MB", size / (1024 * 1024))
    } else {
        format!("{}KB", size / 1024)
    }
}

fn bench_blake2_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("blake2b256_hash");

    for size in [1024, 64 * 1024, 1024 * 1024, 10 * 1024 * 1024] {
        let data = generate_data(size);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(format_size(size)), &data, |b, data| {
            b.iter(|| ContentHash::compute(black_box(data)))
        });
    }

    group.finish();
}

/// Split + per-chunk identifiers + manifest hash, as done before declaring a file
fn bench_prepare_chunks(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepare_chunks");

    for size in [1024 * 1024, 10 * 1024 * 1024] {
        let data = Bytes::from(generate_data(size));

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(format_size(size)), &data, |b, data| {
            b.iter(|| {
                let chunks = split_into_chunks(black_box(data), DEFAULT_CHUNK_SIZE).unwrap();
                manifest_hash(chunks.iter().map(|c| &c.identifier))
            })
        });
    }

    group.finish();
}

fn bench_zstd(c: &mut Criterion) {
    let mut group = c.benchmark_group("zstd");
    let size = 4 * 1024 * 1024;
    let data = generate_data(size);
    let compressed = compress(&data, DEFAULT_COMPRESSION_LEVEL).unwrap();

    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("compress", |b| {
        b.iter(|| compress(black_box(&data), DEFAULT_COMPRESSION_LEVEL).unwrap())
    });
    group.bench_function("decompress", |b| {
        b.iter(|| decompress(black_box(&compressed)).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_blake2_hash, bench_prepare_chunks, bench_zstd);
criterion_main!(benches);
