//! Benchmarks for object tables and the ledger
//!
//! Run with: cargo bench --package ledgerfs-store --bench storage

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ledgerfs_core::{split_into_chunks, ChunkUpload, FileDeclaration, ObjectHandle};
use ledgerfs_store::{
    FeeSchedule, MemoryLedger, MemoryTable, ObjectTable, RemoteStore, SledTable,
};

/// Generate test data of specified size
fn generate_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{}B", bytes)
    }
}

const SIZES: [usize; 3] = [
    1024,       // 1 KB
    64 * 1024,  // 64 KB
    250 * 1000, // largest chunk
];

fn bench_table_put(c: &mut Criterion) {
    let memory = MemoryTable::new();
    let sled = SledTable::open_temporary().unwrap();
    let tables: [(&str, &dyn ObjectTable); 2] = [("memory", &memory), ("sled", &sled)];

    let mut group = c.benchmark_group("table_put");
    for size in SIZES {
        let data = Bytes::from(generate_data(size));
        group.throughput(Throughput::Bytes(size as u64));

        for (name, table) in tables {
            group.bench_with_input(BenchmarkId::new(name, format_size(size)), &data, |b, data| {
                b.iter(|| {
                    table
                        .put(ObjectHandle::random(), black_box(data.clone()))
                        .unwrap()
                })
            });
        }
    }
    group.finish();
}

fn bench_table_get(c: &mut Criterion) {
    let memory = MemoryTable::new();
    let sled = SledTable::open_temporary().unwrap();
    let tables: [(&str, &dyn ObjectTable); 2] = [("memory", &memory), ("sled", &sled)];

    let mut group = c.benchmark_group("table_get");
    for size in SIZES {
        let handle = ObjectHandle::random();
        let data = Bytes::from(generate_data(size));
        group.throughput(Throughput::Bytes(size as u64));

        for (name, table) in tables {
            table.put(handle, data.clone()).unwrap();
            group.bench_with_input(BenchmarkId::new(name, format_size(size)), &handle, |b, handle| {
                b.iter(|| table.get(black_box(handle)).unwrap())
            });
        }
    }
    group.finish();
}

/// Declare and create one chunk per iteration, including payload decoding
/// and hash checks
fn bench_ledger_create_chunk(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("ledger_create_chunk");
    group.sample_size(20);

    for size in SIZES {
        let data = Bytes::from(generate_data(size));
        let chunks = split_into_chunks(&data, size).unwrap();
        let upload = ChunkUpload::from_chunk(&chunks[0]);
        let declaration = FileDeclaration::from_chunks(
            &chunks,
            size as u32,
            "application/octet-stream",
            &data,
            None,
        );

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(BenchmarkId::from_parameter(format_size(size)), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let ledger = MemoryLedger::in_memory("bench").with_fees(FeeSchedule::free());
                    let credit = ledger.mint_credit(1).await.unwrap();
                    let declared = ledger
                        .declare_file(&declaration, credit.handle)
                        .await
                        .unwrap();
                    ledger
                        .create_chunk(declared.declarations[0].handle, &upload, credit.handle)
                        .await
                        .unwrap()
                })
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_table_put,
    bench_table_get,
    bench_ledger_create_chunk,
);

criterion_main!(benches);
