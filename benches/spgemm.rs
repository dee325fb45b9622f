//! Benchmarks for the multiply engine and bulk ingestion.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use magma::algebra::plus_times;
use magma::{build_matrix_unique_par, from_triplets, mxm, Descriptor, Phase, SparseMatrix};

/// A deterministic banded test matrix with `band` nonzeroes per row.
fn banded(n: usize, band: usize) -> Vec<(usize, usize, f64)> {
    let mut coo = Vec::with_capacity(n * band);
    for i in 0..n {
        for d in 0..band {
            let j = (i + d * 31 + 1) % n;
            coo.push((i, j, 1.0 + (d as f64)));
        }
    }
    coo.sort_unstable_by_key(|&(r, c, _)| (r, c));
    coo.dedup_by_key(|&mut (r, c, _)| (r, c));
    coo
}

fn bench_spgemm(c: &mut Criterion) {
    let n = 1000;
    let coo = banded(n, 8);
    let a = from_triplets(n, n, &coo).unwrap();
    let b = from_triplets(n, n, &coo).unwrap();
    let ring = plus_times::<f64>();

    c.bench_function("spgemm_1000_band8", |bench| {
        bench.iter(|| {
            let mut out = SparseMatrix::<f64>::new(n, n).unwrap();
            mxm(&mut out, &a, &b, &ring, Descriptor::NO_OPERATION, Phase::Resize).unwrap();
            mxm(&mut out, &a, &b, &ring, Descriptor::NO_OPERATION, Phase::Execute).unwrap();
            black_box(out.nnz())
        })
    });
}

fn bench_ingest(c: &mut Criterion) {
    let n = 2000;
    let coo = banded(n, 16);
    let rows: Vec<usize> = coo.iter().map(|t| t.0).collect();
    let cols: Vec<usize> = coo.iter().map(|t| t.1).collect();
    let vals: Vec<f64> = coo.iter().map(|t| t.2).collect();

    c.bench_function("ingest_parallel_2000x16", |bench| {
        bench.iter(|| {
            let mut a = SparseMatrix::<f64>::new(n, n).unwrap();
            build_matrix_unique_par(&mut a, &rows, &cols, &vals).unwrap();
            black_box(a.nnz())
        })
    });

    c.bench_function("ingest_sequential_2000x16", |bench| {
        bench.iter(|| {
            let a = from_triplets(n, n, &coo).unwrap();
            black_box(a.nnz())
        })
    });
}

criterion_group!(benches, bench_spgemm, bench_ingest);
criterion_main!(benches);
