//! Performance benchmarks for extraction and accounting
//!
//! Run with: cargo bench

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ovpn_usage::engine::fold;
use ovpn_usage::extractor::SnapshotExtractor;
use ovpn_usage::RecordSet;

/// Generate a status-version 2 file with `clients` rows
fn generate_status(clients: usize, tick: u64) -> String {
    let mut lines = vec!["TITLE,OpenVPN 2.6.8 x86_64-pc-linux-gnu".to_string()];

    for i in 0..clients {
        lines.push(format!(
            "CLIENT_LIST,client-{:05},198.51.100.{}:{},10.8.{}.{},,{},{},2024-01-15 10:30:00,1705314600,UNDEF,{},0,AES-256-GCM",
            i,
            i % 250,
            40000 + i,
            i / 250,
            i % 250,
            1000 * tick + i as u64,
            2000 * tick + i as u64,
            i,
        ));
    }

    lines.push("END".to_string());
    lines.join("\n")
}

fn benchmark_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    let extractor = SnapshotExtractor::new();

    for size in [10, 100, 1000, 10000].iter() {
        let status = generate_status(*size, 1);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| extractor.extract(black_box(&status), Utc::now()));
        });
    }

    group.finish();
}

fn benchmark_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold");
    let extractor = SnapshotExtractor::new();

    for size in [10, 100, 1000, 10000].iter() {
        let first = extractor.extract(&generate_status(*size, 1), Utc::now());
        let second = extractor.extract(&generate_status(*size, 2), Utc::now());
        let records = fold(RecordSet::new(), &first);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| fold(black_box(records.clone()), black_box(&second)));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_extract, benchmark_fold);
criterion_main!(benches);
