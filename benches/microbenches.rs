//! Criterion microbenches for the hot conversion paths.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure:
//! - brush mask RLE decoding
//! - CoNLL tokenization
//! - labeling config parsing into a schema index

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

use lsconv::brush::{decode, encode, MaskGrid};
use lsconv::export::conll::tokenize;
use lsconv::SchemaIndex;

const CONFIG_FIXTURE: &str = include_str!("../tests/fixtures/config.xml");

const TEXT_FIXTURE: &str = "The quick brown fox jumps over the lazy dog, \
then circles back through downtown Springfield at 14:05 and naps. \
Officer Janet O'Leary files report #4521-B without further incident.";

/// Benchmark RLE decoding of a dense diagonal-stripe mask.
fn bench_rle_decode(c: &mut Criterion) {
    let (width, height) = (512u32, 512u32);
    let mut grid = MaskGrid::new(width, height);
    for y in 0..height {
        for x in 0..width {
            grid.set(x, y, (x + y) % 7 < 3);
        }
    }
    let rle = encode(&grid);

    let mut group = c.benchmark_group("rle_decode");
    group.throughput(Throughput::Elements(u64::from(width) * u64::from(height)));

    group.bench_function("decode_512x512", |b| {
        b.iter(|| {
            let mask = decode(black_box(&rle), width, height).unwrap();
            black_box(mask)
        })
    });

    group.finish();
}

/// Benchmark tokenization of a few sentences of running text.
fn bench_tokenize(c: &mut Criterion) {
    let mut group = c.benchmark_group("tokenize");
    group.throughput(Throughput::Bytes(TEXT_FIXTURE.len() as u64));

    group.bench_function("tokenize_paragraph", |b| {
        b.iter(|| {
            let tokens = tokenize(black_box(TEXT_FIXTURE));
            black_box(tokens)
        })
    });

    group.finish();
}

/// Benchmark labeling config parsing.
fn bench_schema_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("schema_build");
    group.throughput(Throughput::Bytes(CONFIG_FIXTURE.len() as u64));

    group.bench_function("build_index", |b| {
        b.iter(|| {
            let index = SchemaIndex::build(black_box(CONFIG_FIXTURE)).unwrap();
            black_box(index)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_rle_decode, bench_tokenize, bench_schema_build);
criterion_main!(benches);
