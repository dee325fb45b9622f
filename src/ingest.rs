//! Bulk ingestion of nonzeroes
//!
//! Matrices are built from coordinate triples the caller guarantees to
//! be duplicate-free. Two assembly paths exist:
//!
//! - a sequential two-pass counting sort for arbitrary (cloneable)
//!   forward iterators, filling CRS and CCS in one fused scatter;
//! - a parallel bucketed counting sort for slice inputs, which
//!   partitions the column domain into buckets, accumulates a
//!   `threads x buckets` count matrix, prefix-sums it across threads and
//!   buckets, scatters in parallel, and finally sorts within buckets.
//!
//! The parallel path picks its bucket width from the size of the global
//! buffer pool: one column per bucket when a full `threads x columns`
//! count matrix fits (in which case the intra-bucket sort is skipped),
//! wider buckets otherwise.

use log::debug;
use rayon::prelude::*;

use crate::buffer;
use crate::config::MAX_NONZEROES;
use crate::error::{Error, Result};
use crate::matrix::SparseMatrix;
use crate::utils::exclusive_scan;
use crate::utils::shared::SharedSlice;
use crate::vector::SparseVector;

/// Build a matrix from an iterator of `(row, col, value)` triples with
/// no duplicate coordinates.
///
/// The iterator is traversed twice (count, then scatter), which is why
/// it must be cloneable; slices and ranges qualify. On success the
/// matrix holds exactly the given triples in both compressed views. Any
/// prior content is discarded; on failure the matrix is left cleared.
pub fn build_matrix_unique<T, I>(a: &mut SparseMatrix<T>, triples: I) -> Result<()>
where
    T: Copy + Default,
    I: IntoIterator<Item = (usize, usize, T)>,
    I::IntoIter: Clone,
{
    let first_pass = triples.into_iter();
    let second_pass = first_pass.clone();
    let (m, n) = (a.nrows(), a.ncols());
    a.clear();

    // Pass one: validate and count into the offset arrays.
    let mut nz = 0usize;
    {
        let parts = a.parts_mut();
        for (i, j, _) in first_pass {
            if i >= m || j >= n {
                parts.crs.clear();
                parts.ccs.clear();
                return Err(Error::Mismatch);
            }
            parts.crs.offsets[i] += 1;
            parts.ccs.offsets[j] += 1;
            nz += 1;
        }
        if nz > MAX_NONZEROES {
            parts.crs.clear();
            parts.ccs.clear();
            return Err(Error::Overflow);
        }
    }
    if let Err(e) = a.resize(nz) {
        a.clear();
        return Err(e);
    }

    // Turn counts into end positions.
    let parts = a.parts_mut();
    for i in 1..m {
        parts.crs.offsets[i] += parts.crs.offsets[i - 1];
    }
    if m > 0 {
        parts.crs.offsets[m] = parts.crs.offsets[m - 1];
    }
    for j in 1..n {
        parts.ccs.offsets[j] += parts.ccs.offsets[j - 1];
    }
    if n > 0 {
        parts.ccs.offsets[n] = parts.ccs.offsets[n - 1];
    }

    // Pass two: scatter with pre-decrement; offsets end up as start
    // positions.
    for (i, j, v) in second_pass {
        parts.crs.offsets[i] -= 1;
        let crs_pos = parts.crs.offsets[i];
        parts.crs.record_value(crs_pos, j, v);
        parts.ccs.offsets[j] -= 1;
        let ccs_pos = parts.ccs.offsets[j];
        parts.ccs.record_value(ccs_pos, i, v);
    }
    *parts.nz = nz;
    Ok(())
}

/// Build a matrix from parallel slices of row indices, column indices,
/// and values, using the bucketed parallel counting sort.
///
/// Slice inputs are the random-access iterator category: they support
/// O(1) slicing, which is what enables the parallel path. The user
/// guarantees the coordinates are duplicate-free.
pub fn build_matrix_unique_par<T>(
    a: &mut SparseMatrix<T>,
    rows: &[usize],
    cols: &[usize],
    values: &[T],
) -> Result<()>
where
    T: Copy + Default + Send + Sync,
{
    if rows.len() != cols.len() || (!a.is_pattern() && values.len() != rows.len()) {
        return Err(Error::Illegal);
    }
    let (m, n) = (a.nrows(), a.ncols());
    let nz = rows.len();
    if nz > MAX_NONZEROES {
        return Err(Error::Overflow);
    }
    if rows.par_iter().any(|&i| i >= m) || cols.par_iter().any(|&j| j >= n) {
        return Err(Error::Mismatch);
    }
    a.clear();
    if nz == 0 {
        return Ok(());
    }
    a.resize(nz)?;

    let manager = buffer::manager();
    let team = manager
        .params()
        .thread_count_for(nz)
        .min(nz)
        .max(1);

    // Bucket width selection: fully parallel mode wants a
    // `team x n` count matrix; when the pool cannot carry that, widen
    // the buckets until the count matrix fits.
    let pool_entries = (manager.capacity() / std::mem::size_of::<usize>()).max(team);
    let max_buckets = (pool_entries / team).max(1);
    let bucketlen = if n <= max_buckets { 1 } else { n.div_ceil(max_buckets) };
    let num_buckets = n.div_ceil(bucketlen).max(1);
    debug!(
        "parallel ingest: {} nonzeroes, {} threads, {} buckets of width {}",
        nz, team, num_buckets, bucketlen
    );

    // Phase 1 (count): per-thread, per-bucket counts.
    let chunk = nz.div_ceil(team);
    let mut counts: Vec<Vec<usize>> = (0..team)
        .into_par_iter()
        .map(|t| {
            let mut local = vec![0usize; num_buckets];
            let lo = (t * chunk).min(nz);
            let hi = ((t + 1) * chunk).min(nz);
            for &j in &cols[lo..hi] {
                local[j / bucketlen] += 1;
            }
            local
        })
        .collect();

    // Phase 2 (prefix over threads, per bucket) and phase 3 (prefix over
    // buckets): turns counts into per-thread starting offsets.
    let mut bucket_sizes = vec![0usize; num_buckets];
    for b in 0..num_buckets {
        let mut running = 0usize;
        for local in counts.iter_mut() {
            let c = local[b];
            local[b] = running;
            running += c;
        }
        bucket_sizes[b] = running;
    }
    let bucket_starts = exclusive_scan(&bucket_sizes);
    debug_assert_eq!(bucket_starts[num_buckets], nz);
    for local in counts.iter_mut() {
        for b in 0..num_buckets {
            local[b] += bucket_starts[b];
        }
    }

    // Phase 4 (scatter): place every triple at its per-thread, per-bucket
    // offset. An auxiliary column buffer stays aligned with the values.
    let mut aux_cols = vec![0usize; nz];
    {
        let parts = a.parts_mut();
        let ccs_rows = SharedSlice::new(&mut parts.ccs.indices[..nz]);
        let ccs_vals = parts.ccs.values.as_mut().map(|v| SharedSlice::new(&mut v[..nz]));
        let aux = SharedSlice::new(&mut aux_cols);
        counts.par_iter_mut().enumerate().for_each(|(t, cursors)| {
            let lo = (t * chunk).min(nz);
            let hi = ((t + 1) * chunk).min(nz);
            for k in lo..hi {
                let b = cols[k] / bucketlen;
                let pos = cursors[b];
                cursors[b] += 1;
                // Positions are disjoint across threads by the prefix
                // sums above.
                unsafe {
                    ccs_rows.write(pos, rows[k]);
                    aux.write(pos, cols[k]);
                    if let Some(vals) = &ccs_vals {
                        vals.write(pos, values[k]);
                    }
                }
            }
        });
    }

    // Phase 5 (sort within buckets): order each bucket by (column, row).
    // With one column per bucket the scatter output is already grouped.
    let parts = a.parts_mut();
    if bucketlen > 1 {
        let mut row_slices: Vec<&mut [usize]> = Vec::with_capacity(num_buckets);
        let mut col_slices: Vec<&mut [usize]> = Vec::with_capacity(num_buckets);
        let mut val_slices: Vec<Option<&mut [T]>> = Vec::with_capacity(num_buckets);
        let mut rest_rows = &mut parts.ccs.indices[..nz];
        let mut rest_cols = &mut aux_cols[..];
        let mut rest_vals = parts.ccs.values.as_mut().map(|v| &mut v[..nz]);
        for b in 0..num_buckets {
            let len = bucket_starts[b + 1] - bucket_starts[b];
            let (head, tail) = std::mem::take(&mut rest_rows).split_at_mut(len);
            row_slices.push(head);
            rest_rows = tail;
            let (head, tail) = std::mem::take(&mut rest_cols).split_at_mut(len);
            col_slices.push(head);
            rest_cols = tail;
            match rest_vals.take() {
                Some(v) => {
                    let (head, tail) = v.split_at_mut(len);
                    val_slices.push(Some(head));
                    rest_vals = Some(tail);
                }
                None => val_slices.push(None),
            }
        }
        row_slices
            .par_iter_mut()
            .zip(col_slices.par_iter_mut())
            .zip(val_slices.par_iter_mut())
            .for_each(|((rows_b, cols_b), vals_b)| {
                let len = rows_b.len();
                let mut perm: Vec<usize> = (0..len).collect();
                perm.sort_unstable_by_key(|&k| (cols_b[k], rows_b[k]));
                let sorted_rows: Vec<usize> = perm.iter().map(|&k| rows_b[k]).collect();
                let sorted_cols: Vec<usize> = perm.iter().map(|&k| cols_b[k]).collect();
                rows_b.copy_from_slice(&sorted_rows);
                cols_b.copy_from_slice(&sorted_cols);
                if let Some(vals_b) = vals_b {
                    let sorted_vals: Vec<T> = perm.iter().map(|&k| vals_b[k]).collect();
                    vals_b.copy_from_slice(&sorted_vals);
                }
            });
    }

    // Column offsets: count per column in parallel over the disjoint
    // per-bucket column ranges, then one prefix sum.
    parts.ccs.offsets.fill(0);
    parts.ccs.offsets[1..=n]
        .par_chunks_mut(bucketlen)
        .enumerate()
        .for_each(|(b, counts_b)| {
            let base = b * bucketlen;
            for &j in &aux_cols[bucket_starts[b]..bucket_starts[b + 1]] {
                counts_b[j - base] += 1;
            }
        });
    for j in 0..n {
        parts.ccs.offsets[j + 1] += parts.ccs.offsets[j];
    }
    debug_assert_eq!(parts.ccs.offsets[n], nz);

    // The row-compressed half comes from the column-sorted data by one
    // more counting sort.
    for i in 0..m {
        parts.crs.offsets[i] = 0;
    }
    for k in 0..nz {
        parts.crs.offsets[parts.ccs.indices[k]] += 1;
    }
    for i in 1..m {
        parts.crs.offsets[i] += parts.crs.offsets[i - 1];
    }
    parts.crs.offsets[m] = parts.crs.offsets[m - 1];
    for k in 0..nz {
        let i = parts.ccs.indices[k];
        parts.crs.offsets[i] -= 1;
        let pos = parts.crs.offsets[i];
        let value = parts.ccs.get_value(k, T::default());
        parts.crs.record_value(pos, aux_cols[k], value);
    }
    *parts.nz = nz;
    Ok(())
}

/// Build a fresh matrix from a slice of `(row, col, value)` triples.
pub fn from_triplets<T>(m: usize, n: usize, triples: &[(usize, usize, T)]) -> Result<SparseMatrix<T>>
where
    T: Copy + Default,
{
    let mut a = SparseMatrix::new(m, n)?;
    build_matrix_unique(&mut a, triples.iter().copied())?;
    Ok(a)
}

/// Build a vector from `(index, value)` pairs with no duplicate indices.
///
/// Any prior content is discarded. Indices at or beyond the vector
/// length report a mismatch, duplicates are illegal; in both cases the
/// vector is left cleared.
pub fn build_vector_unique<T, I>(v: &mut SparseVector<T>, entries: I) -> Result<()>
where
    T: Copy + Default,
    I: IntoIterator<Item = (usize, T)>,
{
    v.clear();
    let n = v.size();
    let (values, coords) = v.parts_mut();
    for (i, x) in entries {
        if i >= n {
            coords.clear();
            return Err(Error::Mismatch);
        }
        if coords.assign(i) {
            coords.clear();
            return Err(Error::Illegal);
        }
        values[i] = x;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_sorted<T: Copy + Default + std::fmt::Debug + PartialOrd>(
        a: &SparseMatrix<T>,
    ) -> Vec<((usize, usize), T)> {
        let mut entries: Vec<_> = a.iter().collect();
        entries.sort_by(|x, y| x.0.cmp(&y.0));
        entries
    }

    #[test]
    fn sequential_build_populates_both_views() {
        let triples = [(0usize, 0usize, 1.0f64), (1, 2, 2.0), (2, 1, 3.0), (2, 2, 4.0)];
        let mut a = SparseMatrix::<f64>::with_capacity(3, 3, 4).unwrap();
        build_matrix_unique(&mut a, triples.iter().copied()).unwrap();
        assert_eq!(a.nnz(), 4);
        assert_eq!(a.crs().offsets, vec![0, 1, 2, 4]);
        assert_eq!(a.ccs().offsets, vec![0, 1, 2, 4]);
        assert_eq!(
            collect_sorted(&a),
            vec![
                ((0, 0), 1.0),
                ((1, 2), 2.0),
                ((2, 1), 3.0),
                ((2, 2), 4.0)
            ]
        );
    }

    #[test]
    fn out_of_bounds_is_mismatch() {
        let mut a = SparseMatrix::<f64>::new(2, 2).unwrap();
        let err = build_matrix_unique(&mut a, [(0, 5, 1.0)].iter().copied()).unwrap_err();
        assert_eq!(err, Error::Mismatch);
        assert_eq!(a.nnz(), 0);
        let err = build_matrix_unique_par(&mut a, &[5], &[0], &[1.0]).unwrap_err();
        assert_eq!(err, Error::Mismatch);
    }

    #[test]
    fn build_grows_capacity() {
        let mut a = SparseMatrix::<f64>::with_capacity(4, 4, 1).unwrap();
        let triples: Vec<_> = (0..4).map(|i| (i, i, i as f64 + 1.0)).collect();
        build_matrix_unique(&mut a, triples.iter().copied()).unwrap();
        assert_eq!(a.nnz(), 4);
        assert!(a.capacity() >= 4);
    }

    #[test]
    fn parallel_build_matches_sequential() {
        // A fixed pseudo-random pattern, duplicate-free by construction.
        let m = 37;
        let n = 53;
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut vals = Vec::new();
        let mut state = 1u64;
        for i in 0..m {
            for j in 0..n {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                if state >> 60 < 3 {
                    rows.push(i);
                    cols.push(j);
                    vals.push((state >> 32) as f64);
                }
            }
        }

        let mut seq = SparseMatrix::<f64>::new(m, n).unwrap();
        build_matrix_unique(
            &mut seq,
            rows.iter()
                .zip(&cols)
                .zip(&vals)
                .map(|((&i, &j), &v)| (i, j, v)),
        )
        .unwrap();

        let mut par = SparseMatrix::<f64>::new(m, n).unwrap();
        build_matrix_unique_par(&mut par, &rows, &cols, &vals).unwrap();

        assert_eq!(seq.nnz(), par.nnz());
        assert_eq!(collect_sorted(&seq), collect_sorted(&par));
        assert_eq!(seq.crs().offsets, par.crs().offsets);
        assert_eq!(seq.ccs().offsets, par.ccs().offsets);
    }

    #[test]
    fn parallel_build_empty_input() {
        let mut a = SparseMatrix::<f64>::new(3, 3).unwrap();
        build_matrix_unique_par(&mut a, &[], &[], &[]).unwrap();
        assert_eq!(a.nnz(), 0);
    }

    #[test]
    fn pattern_build_stores_presence() {
        let mut a = SparseMatrix::<f64>::pattern(3, 3).unwrap();
        build_matrix_unique(&mut a, [(0, 1, 0.0), (2, 2, 0.0)].iter().copied()).unwrap();
        assert_eq!(a.nnz(), 2);
        assert!(a.is_pattern());
    }

    #[test]
    fn vector_build_detects_duplicates() {
        let mut v = SparseVector::<f64>::new(5).unwrap();
        build_vector_unique(&mut v, [(0, 1.0), (3, 2.0)].iter().copied()).unwrap();
        assert_eq!(v.nnz(), 2);
        assert_eq!(v.get(3), Some(2.0));

        let err = build_vector_unique(&mut v, [(1, 1.0), (1, 2.0)].iter().copied()).unwrap_err();
        assert_eq!(err, Error::Illegal);
        assert_eq!(v.nnz(), 0);

        let err = build_vector_unique(&mut v, [(9, 1.0)].iter().copied()).unwrap_err();
        assert_eq!(err, Error::Mismatch);
    }
}
