//! Property-based tests over randomly generated sparse structures.

use proptest::prelude::*;
use std::collections::BTreeMap;

use magma::algebra::{plus_times, Plus};
use magma::{
    build_matrix_unique_par, foldl_matrix, from_triplets, mxm, Descriptor, Phase, SparseMatrix,
};

/// Duplicate-free triples over an `m x n` grid with small integer
/// values, so floating-point sums stay exact.
fn coo_strategy(m: usize, n: usize) -> impl Strategy<Value = Vec<(usize, usize, f64)>> {
    proptest::collection::vec(((0..m, 0..n), 1i8..=9), 0..=(m * n).min(64)).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|((r, c), v)| ((r, c), v as f64))
            .collect::<BTreeMap<_, _>>()
            .into_iter()
            .map(|((r, c), v)| (r, c, v))
            .collect()
    })
}

proptest! {
    #[test]
    fn both_views_hold_the_same_triples(coo in coo_strategy(12, 9)) {
        let a = from_triplets(12, 9, &coo).unwrap();
        prop_assert_eq!(a.nnz(), coo.len());

        let mut from_rows: Vec<_> = a.iter().map(|((r, c), v)| (r, c, v as i64)).collect();
        from_rows.sort_unstable();
        let t = a.transpose().unwrap();
        let mut from_cols: Vec<_> = t.iter().map(|((c, r), v)| (r, c, v as i64)).collect();
        from_cols.sort_unstable();
        prop_assert_eq!(from_rows.clone(), from_cols);

        let mut expect: Vec<_> = coo.iter().map(|&(r, c, v)| (r, c, v as i64)).collect();
        expect.sort_unstable();
        prop_assert_eq!(from_rows, expect);
    }

    #[test]
    fn parallel_build_equals_sequential(coo in coo_strategy(23, 31)) {
        let seq = from_triplets(23, 31, &coo).unwrap();
        let rows: Vec<usize> = coo.iter().map(|t| t.0).collect();
        let cols: Vec<usize> = coo.iter().map(|t| t.1).collect();
        let vals: Vec<f64> = coo.iter().map(|t| t.2).collect();
        let mut par = SparseMatrix::<f64>::new(23, 31).unwrap();
        build_matrix_unique_par(&mut par, &rows, &cols, &vals).unwrap();

        let key = |m: &SparseMatrix<f64>| {
            let mut v: Vec<_> = m.iter().map(|((r, c), x)| (r, c, x as i64)).collect();
            v.sort_unstable();
            v
        };
        prop_assert_eq!(key(&seq), key(&par));
    }

    #[test]
    fn mxm_matches_sprs(
        a_coo in coo_strategy(10, 8),
        b_coo in coo_strategy(8, 7),
    ) {
        let a = from_triplets(10, 8, &a_coo).unwrap();
        let b = from_triplets(8, 7, &b_coo).unwrap();
        let mut c = SparseMatrix::<f64>::new(10, 7).unwrap();
        let ring = plus_times::<f64>();
        mxm(&mut c, &a, &b, &ring, Descriptor::NO_OPERATION, Phase::Resize).unwrap();
        mxm(&mut c, &a, &b, &ring, Descriptor::NO_OPERATION, Phase::Execute).unwrap();

        let reference = &magma::to_sprs_csr(&a) * &magma::to_sprs_csr(&b);
        // Positive inputs: no cancellation, so the patterns agree too.
        prop_assert_eq!(c.nnz(), reference.nnz());
        for ((i, j), v) in c.iter() {
            prop_assert_eq!(Some(&v), reference.get(i, j));
        }
    }

    #[test]
    fn resize_guarantees_execute(
        a_coo in coo_strategy(9, 9),
        b_coo in coo_strategy(9, 9),
    ) {
        let a = from_triplets(9, 9, &a_coo).unwrap();
        let b = from_triplets(9, 9, &b_coo).unwrap();
        let mut c = SparseMatrix::<f64>::with_capacity(9, 9, 1).unwrap();
        let ring = plus_times::<f64>();
        mxm(&mut c, &a, &b, &ring, Descriptor::NO_OPERATION, Phase::Resize).unwrap();
        prop_assert!(
            mxm(&mut c, &a, &b, &ring, Descriptor::NO_OPERATION, Phase::Execute).is_ok()
        );
    }

    #[test]
    fn fold_equals_plain_sum(coo in coo_strategy(15, 15)) {
        let a = from_triplets(15, 15, &coo).unwrap();
        let mut x = 0.0;
        foldl_matrix::<_, _, bool>(
            &mut x,
            &a,
            None,
            &Plus::<f64>::new(),
            Descriptor::NO_OPERATION,
        )
        .unwrap();
        let expect: f64 = coo.iter().map(|t| t.2).sum();
        prop_assert_eq!(x, expect);
    }
}
