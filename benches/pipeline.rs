//! Benchmarks for parsing, aggregation and subscription rendering.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use proxagg::aggregator::aggregate;
use proxagg::fetcher::parse_items;
use proxagg::filter::FilterEngine;
use proxagg::subscription::{generate, Format};
use std::hint::black_box;

/// Mixed config items; every fourth one repeats an earlier endpoint
fn generate_items(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let host = format!("h{}.example", if i % 4 == 3 { i - 3 } else { i });
            match i % 4 {
                0 => format!(
                    "vless://11111111-1111-1111-1111-111111111111@{}:443?type=tcp&reality=yes&pbk=PK{}&sid=ab&sni=cover.example&remark=R{}",
                    host, i, i
                ),
                1 => format!("trojan://pw{}@{}:443?sni={}", i, host, host),
                2 => format!(
                    "vmess://{}",
                    STANDARD.encode(format!(
                        r#"{{"ps":"V{}","add":"{}","port":"8443","id":"u-{}","aid":"0"}}"#,
                        i, host, i
                    ))
                ),
                _ => format!("vless://u{}@{}:443?remark=dup{}", i, host, i),
            }
        })
        .collect()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for size in [100, 1000, 10000] {
        let items = generate_items(size);
        group.bench_with_input(BenchmarkId::new("mixed", size), &items, |b, items| {
            b.iter(|| parse_items(black_box(items), "bench"))
        });
    }

    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");

    for size in [1000, 10000] {
        let (records, _) = parse_items(&generate_items(size), "bench");
        group.bench_with_input(BenchmarkId::new("dedup", size), &records, |b, records| {
            b.iter(|| {
                aggregate(
                    black_box(records.clone()),
                    FilterEngine::new(Vec::new()),
                    5000,
                )
            })
        });
    }

    group.finish();
}

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    let (records, _) = parse_items(&generate_items(5000), "bench");
    let records = aggregate(records, FilterEngine::new(Vec::new()), 5000);

    for format in [Format::Clash, Format::Singbox, Format::Raw] {
        group.bench_with_input(
            BenchmarkId::new(format.as_str(), records.len()),
            &records,
            |b, records| b.iter(|| generate(black_box(records), format)),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_aggregate, bench_generate);
criterion_main!(benches);
