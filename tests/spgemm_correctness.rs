//! The multiply engine against its laws: reference results, phases,
//! capacity failure isolation, transposition, and algebra swaps.

use magma::algebra::{min_plus, or_and, plus_times};
use magma::{from_triplets, mxm, Descriptor, Error, Phase, SparseMatrix};

fn dense(c: &SparseMatrix<f64>) -> Vec<Vec<f64>> {
    let mut out = vec![vec![0.0; c.ncols()]; c.nrows()];
    for ((i, j), v) in c.iter() {
        out[i][j] += v;
    }
    out
}

/// Surface kernel debug logs under `RUST_LOG=debug`.
fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The diagonal-times-antidiagonal scenario.
#[test]
fn two_by_two_product() {
    init_logs();
    let a = from_triplets(2, 2, &[(0, 0, 1.0), (1, 1, 2.0)]).unwrap();
    let b = from_triplets(2, 2, &[(0, 1, 3.0), (1, 0, 4.0)]).unwrap();
    let mut c = SparseMatrix::<f64>::new(2, 2).unwrap();
    mxm(&mut c, &a, &b, &plus_times::<f64>(), Descriptor::NO_OPERATION, Phase::Execute).unwrap();
    assert_eq!(c.nnz(), 2);
    assert_eq!(dense(&c), vec![vec![0.0, 3.0], vec![8.0, 0.0]]);
}

#[test]
fn matches_sprs_reference() {
    init_logs();
    let unique = |pairs: Vec<((usize, usize), f64)>| -> Vec<(usize, usize, f64)> {
        pairs
            .into_iter()
            .collect::<std::collections::BTreeMap<_, _>>()
            .into_iter()
            .map(|((r, c), v)| (r, c, v))
            .collect()
    };
    let a_coo = unique(
        (0..40usize)
            .map(|k| (((k * 7) % 13, (k * 5) % 11), (k % 5) as f64 + 1.0))
            .collect(),
    );
    let b_coo = unique(
        (0..40usize)
            .map(|k| (((k * 3) % 11, (k * 7 + 2) % 9), (k % 4) as f64 + 1.0))
            .collect(),
    );

    let a = from_triplets(13, 11, &a_coo).unwrap();
    let b = from_triplets(11, 9, &b_coo).unwrap();
    let mut c = SparseMatrix::<f64>::new(13, 9).unwrap();
    let ring = plus_times::<f64>();
    mxm(&mut c, &a, &b, &ring, Descriptor::NO_OPERATION, Phase::Resize).unwrap();
    mxm(&mut c, &a, &b, &ring, Descriptor::NO_OPERATION, Phase::Execute).unwrap();

    let reference = &magma::to_sprs_csr(&a) * &magma::to_sprs_csr(&b);
    assert_eq!(c.nnz(), reference.nnz());
    for ((i, j), v) in c.iter() {
        let r = reference.get(i, j).copied().unwrap_or(0.0);
        assert!((v - r).abs() < 1e-9, "({}, {}): {} vs {}", i, j, v, r);
    }
}

#[test]
fn multiplication_is_associative() {
    let a = from_triplets(3, 3, &[(0, 1, 2.0), (1, 2, 3.0), (2, 0, 4.0)]).unwrap();
    let b = from_triplets(3, 3, &[(0, 0, 1.0), (1, 1, 5.0), (2, 1, 6.0)]).unwrap();
    let c = from_triplets(3, 3, &[(0, 2, 7.0), (1, 0, 8.0), (2, 2, 9.0)]).unwrap();
    let ring = plus_times::<f64>();

    let mut ab = SparseMatrix::<f64>::new(3, 3).unwrap();
    mxm(&mut ab, &a, &b, &ring, Descriptor::NO_OPERATION, Phase::Resize).unwrap();
    mxm(&mut ab, &a, &b, &ring, Descriptor::NO_OPERATION, Phase::Execute).unwrap();
    let mut ab_c = SparseMatrix::<f64>::new(3, 3).unwrap();
    mxm(&mut ab_c, &ab, &c, &ring, Descriptor::NO_OPERATION, Phase::Resize).unwrap();
    mxm(&mut ab_c, &ab, &c, &ring, Descriptor::NO_OPERATION, Phase::Execute).unwrap();

    let mut bc = SparseMatrix::<f64>::new(3, 3).unwrap();
    mxm(&mut bc, &b, &c, &ring, Descriptor::NO_OPERATION, Phase::Resize).unwrap();
    mxm(&mut bc, &b, &c, &ring, Descriptor::NO_OPERATION, Phase::Execute).unwrap();
    let mut a_bc = SparseMatrix::<f64>::new(3, 3).unwrap();
    mxm(&mut a_bc, &a, &bc, &ring, Descriptor::NO_OPERATION, Phase::Resize).unwrap();
    mxm(&mut a_bc, &a, &bc, &ring, Descriptor::NO_OPERATION, Phase::Execute).unwrap();

    assert_eq!(dense(&ab_c), dense(&a_bc));
}

#[test]
fn transposition_is_involutive() {
    let a = from_triplets(3, 2, &[(0, 1, 2.0), (2, 0, 3.0)]).unwrap();
    let b = from_triplets(3, 2, &[(0, 0, 1.0), (1, 1, 4.0)]).unwrap();
    let ring = plus_times::<f64>();

    // A^T B via the descriptor...
    let mut c1 = SparseMatrix::<f64>::new(2, 2).unwrap();
    mxm(&mut c1, &a, &b, &ring, Descriptor::TRANSPOSE_LEFT, Phase::Resize).unwrap();
    mxm(&mut c1, &a, &b, &ring, Descriptor::TRANSPOSE_LEFT, Phase::Execute).unwrap();

    // ...equals (A^T)^T^T B via materialising the transpose twice.
    let att = a.transpose().unwrap().transpose().unwrap();
    let mut c2 = SparseMatrix::<f64>::new(2, 2).unwrap();
    mxm(&mut c2, &att, &b, &ring, Descriptor::TRANSPOSE_LEFT, Phase::Resize).unwrap();
    mxm(&mut c2, &att, &b, &ring, Descriptor::TRANSPOSE_LEFT, Phase::Execute).unwrap();

    assert_eq!(dense(&c1), dense(&c2));
}

/// The capacity-failure scenario: execute on a too-small output fails
/// cleanly, then resize-and-execute completes.
#[test]
fn capacity_failure_isolation() {
    let mut c = SparseMatrix::<f64>::with_capacity(3, 3, 1).unwrap();
    c.set_element(0, 0, 1.0, Phase::Execute).unwrap();
    let a = c.clone();
    let ring = plus_times::<f64>();

    // In-place execute needs room for the old entry plus the product.
    let err = mxm(&mut c, &a, &a, &ring, Descriptor::NO_OPERATION, Phase::Execute).unwrap_err();
    assert_eq!(err, Error::Failed);
    assert_eq!(c.nnz(), 0);
    assert_eq!(c.capacity(), 1);

    // The output was cleared, so resize-then-execute yields the square.
    mxm(&mut c, &a, &a, &ring, Descriptor::NO_OPERATION, Phase::Resize).unwrap();
    mxm(&mut c, &a, &a, &ring, Descriptor::NO_OPERATION, Phase::Execute).unwrap();
    assert_eq!(c.nnz(), 1);
    let entries: Vec<_> = c.iter().collect();
    assert_eq!(entries, vec![((0, 0), 1.0)]);
}

#[test]
fn exact_capacity_suffices() {
    let a = from_triplets(2, 2, &[(0, 0, 1.0), (1, 1, 1.0)]).unwrap();
    let b = from_triplets(2, 2, &[(0, 0, 2.0), (1, 0, 3.0)]).unwrap();
    let mut c = SparseMatrix::<f64>::with_capacity(2, 2, 2).unwrap();
    mxm(&mut c, &a, &b, &plus_times::<f64>(), Descriptor::NO_OPERATION, Phase::Execute).unwrap();
    assert_eq!(c.nnz(), 2);
}

#[test]
fn boolean_reachability_squares() {
    // 0 -> 1 -> 2: two-hop reachability over (||, &&).
    let g = from_triplets(3, 3, &[(0, 1, true), (1, 2, true)]).unwrap();
    let mut two = SparseMatrix::<bool>::new(3, 3).unwrap();
    let ring = or_and();
    mxm(&mut two, &g, &g, &ring, Descriptor::NO_OPERATION, Phase::Resize).unwrap();
    mxm(&mut two, &g, &g, &ring, Descriptor::NO_OPERATION, Phase::Execute).unwrap();
    let entries: Vec<_> = two.iter().collect();
    assert_eq!(entries, vec![((0, 2), true)]);
}

#[test]
fn tropical_two_hop_distances() {
    let g = from_triplets(3, 3, &[(0, 1, 1.5), (1, 2, 2.5), (0, 2, 10.0)]).unwrap();
    let mut d2 = SparseMatrix::<f64>::new(3, 3).unwrap();
    let ring = min_plus::<f64>();
    mxm(&mut d2, &g, &g, &ring, Descriptor::NO_OPERATION, Phase::Resize).unwrap();
    mxm(&mut d2, &g, &g, &ring, Descriptor::NO_OPERATION, Phase::Execute).unwrap();
    // The only two-hop path is 0 -> 1 -> 2 of length 4.
    let entries: Vec<_> = d2.iter().collect();
    assert_eq!(entries, vec![((0, 2), 4.0)]);
}

#[test]
fn larger_in_place_update_keeps_all_entries() {
    // C starts with a diagonal; A*B adds off-diagonal products.
    let a = from_triplets(4, 4, &[(0, 1, 1.0), (1, 2, 1.0), (2, 3, 1.0)]).unwrap();
    let b = from_triplets(4, 4, &[(1, 0, 2.0), (2, 1, 3.0), (3, 2, 4.0)]).unwrap();
    let mut c = from_triplets(4, 4, &[(0, 0, 9.0), (3, 3, 9.0)]).unwrap();
    let ring = plus_times::<f64>();
    mxm(&mut c, &a, &b, &ring, Descriptor::NO_OPERATION, Phase::Resize).unwrap();
    mxm(&mut c, &a, &b, &ring, Descriptor::NO_OPERATION, Phase::Execute).unwrap();
    // Products: (0,0)=2, (1,1)=3, (2,2)=4 fold into the old diagonal.
    assert_eq!(dense(&c)[0][0], 11.0);
    assert_eq!(dense(&c)[1][1], 3.0);
    assert_eq!(dense(&c)[2][2], 4.0);
    assert_eq!(dense(&c)[3][3], 9.0);
    assert_eq!(c.nnz(), 4);
}
