use std::collections::HashMap;
use std::hint::black_box;
use std::io::{Cursor, Write};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use taxatsv::taxonomy::TaxNode;
use taxatsv::{ParseOptions, ResolverConfig, Taxonomy, TsvParser};

fn sample_tsv(rows: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(rows * 64);
    for r in 0..rows {
        writeln!(
            out,
            "BOLD:{r:08}\t{}\tCOI-5P\tACGTACGTACGTACGTACGT\t{}",
            r % 5000 + 1,
            r % 7
        )
        .unwrap();
    }
    out
}

fn bench_parse_workers(c: &mut Criterion) {
    let input = sample_tsv(200_000);
    let mut group = c.benchmark_group("parse_workers");
    group.throughput(Throughput::Bytes(input.len() as u64));
    group.sample_size(20);

    for workers in [1, 2, 4, 8] {
        let parser = TsvParser::new(ParseOptions::default().with_workers(workers));
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| {
                let mut fields = 0usize;
                parser
                    .parse(Cursor::new(input.as_slice()), |row| {
                        fields += row.len();
                        Ok(())
                    })
                    .unwrap();
                black_box(fields)
            });
        });
    }
    group.finish();
}

fn bench_parse_unordered(c: &mut Criterion) {
    let input = sample_tsv(200_000);
    let parser = TsvParser::new(ParseOptions::default().with_preserve_order(false));
    c.bench_function("parse_unordered", |b| {
        b.iter(|| {
            parser
                .parse(Cursor::new(input.as_slice()), |row| {
                    black_box(row.field(0));
                    Ok(())
                })
                .unwrap()
        });
    });
}

fn chain_taxonomy(depth: i64) -> Taxonomy {
    let ranks = ["species", "genus", "family", "order", "class", "phylum", "kingdom"];
    let mut nodes = HashMap::new();
    nodes.insert(
        1,
        TaxNode {
            parent: 1,
            rank: "no rank".to_string(),
            name: Some("root".to_string()),
        },
    );
    for id in 2..=depth {
        nodes.insert(
            id,
            TaxNode {
                parent: id - 1,
                rank: ranks[(id as usize) % ranks.len()].to_string(),
                name: Some(format!("taxon{id}")),
            },
        );
    }
    Taxonomy::from_nodes(nodes, ResolverConfig::default())
}

fn bench_lineage(c: &mut Criterion) {
    c.bench_function("lineage_cold", |b| {
        b.iter_batched(
            || chain_taxonomy(40),
            |taxonomy| black_box(taxonomy.lineage(40)),
            criterion::BatchSize::SmallInput,
        );
    });

    let taxonomy = chain_taxonomy(40);
    taxonomy.lineage(40);
    c.bench_function("lineage_cached", |b| {
        b.iter(|| black_box(taxonomy.lineage(black_box(40))));
    });
}

criterion_group!(
    parse_benches,
    bench_parse_workers,
    bench_parse_unordered,
    bench_lineage
);
criterion_main!(parse_benches);
