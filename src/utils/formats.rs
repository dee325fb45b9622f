//! Utilities for converting between our matrix format and external libraries

use num_traits::Num;
use sprs::{CsMat, TriMat};

use crate::error::Result;
use crate::ingest::from_triplets;
use crate::matrix::SparseMatrix;

/// Converts a [`SparseMatrix`] to a sprs `CsMat` in CSR format.
///
/// Row entries are emitted in the stored (possibly unsorted) order and
/// normalised by the triplet assembly. Pattern matrices convert with
/// every value equal to `T::one()`.
pub fn to_sprs_csr<T>(matrix: &SparseMatrix<T>) -> CsMat<T>
where
    T: Copy + Default + Num,
{
    let mut tri = TriMat::with_capacity((matrix.nrows(), matrix.ncols()), matrix.nnz());
    let substitute = T::one();
    for ((r, c), v) in matrix.iter() {
        if matrix.is_pattern() {
            tri.add_triplet(r, c, substitute);
        } else {
            tri.add_triplet(r, c, v);
        }
    }
    tri.to_csr()
}

/// Converts a sprs `CsMat` into a [`SparseMatrix`].
///
/// Accepts either storage order; the result carries both compressed
/// views as usual.
pub fn from_sprs_csr<T>(matrix: &CsMat<T>) -> Result<SparseMatrix<T>>
where
    T: Copy + Default + Num,
{
    let (m, n) = matrix.shape();
    let triples: Vec<(usize, usize, T)> = matrix
        .iter()
        .map(|(&value, (row, col))| (row, col, value))
        .collect();
    from_triplets(m, n, &triples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Phase;

    #[test]
    fn roundtrip_through_sprs() {
        let mut a = SparseMatrix::<f64>::with_capacity(3, 3, 4).unwrap();
        a.set_element(0, 0, 1.0, Phase::Execute).unwrap();
        a.set_element(1, 2, 2.0, Phase::Execute).unwrap();
        a.set_element(2, 1, 3.0, Phase::Execute).unwrap();

        let cs = to_sprs_csr(&a);
        assert_eq!(cs.nnz(), 3);
        let back = from_sprs_csr(&cs).unwrap();
        assert_eq!(back.nnz(), 3);

        let mut ours: Vec<_> = back.iter().collect();
        ours.sort_by_key(|&((r, c), _)| (r, c));
        assert_eq!(ours, vec![((0, 0), 1.0), ((1, 2), 2.0), ((2, 1), 3.0)]);
    }

    #[test]
    fn pattern_converts_to_ones() {
        let mut a = SparseMatrix::<f64>::pattern(2, 2).unwrap();
        a.set_element(0, 1, 0.0, Phase::Execute).unwrap();
        let cs = to_sprs_csr(&a);
        assert_eq!(cs.get(0, 1), Some(&1.0));
    }
}
