//! The sparse matrix container
//!
//! A [`SparseMatrix`] owns a row-compressed and a column-compressed view
//! of the same nonzero set, two sparse-accumulator scratch sets (one
//! sized to the row count, one to the column count), and a stable
//! process-unique identity. Shape is immutable; capacity may grow but
//! never shrinks below the current number of nonzeroes.

use aligned_vec::AVec;
use log::trace;

use crate::buffer;
use crate::config::{MAX_COLS, MAX_NONZEROES, MAX_ROWS};
use crate::coordinates::Coordinates;
use crate::descriptor::Phase;
use crate::error::{Error, Result};
use crate::storage::CompressedStorage;

/// A sparse accumulator scratch set: support tracking plus a dense value
/// buffer over the same index domain.
pub(crate) struct Spa<T> {
    pub coords: Coordinates,
    pub values: AVec<T>,
}

impl<T: Copy + Default> Spa<T> {
    pub(crate) fn new(n: usize) -> Self {
        Self {
            coords: Coordinates::new(n),
            values: AVec::from_iter(64, (0..n).map(|_| T::default())),
        }
    }
}

/// Mutable views into the pieces of a matrix a kernel needs at once.
///
/// Splitting the borrow here lets a kernel write the storages while using
/// the container's own scratch as thread 0's accumulator.
pub(crate) struct MatrixParts<'a, T> {
    pub crs: &'a mut CompressedStorage<T>,
    pub ccs: &'a mut CompressedStorage<T>,
    pub spa_cols: &'a mut Spa<T>,
    pub nz: &'a mut usize,
}

/// A sparse `m x n` matrix over element type `T`.
///
/// Both a row-compressed (CRS) and a column-compressed (CCS) storage are
/// maintained; together they are a bijective view of the matrix. A
/// pattern matrix stores no values and substitutes an algebra-provided
/// identity wherever a value is read.
pub struct SparseMatrix<T> {
    m: usize,
    n: usize,
    cap: usize,
    nz: usize,
    crs: CompressedStorage<T>,
    ccs: CompressedStorage<T>,
    spa_rows: Spa<T>,
    spa_cols: Spa<T>,
    id: u64,
}

impl<T: Copy + Default> SparseMatrix<T> {
    /// An empty `m x n` matrix with the default capacity `max(m, n)`.
    pub fn new(m: usize, n: usize) -> Result<Self> {
        let cap = if m == 0 || n == 0 { 0 } else { m.max(n) };
        Self::build(m, n, cap, false)
    }

    /// An empty `m x n` matrix with room for `cap` nonzeroes.
    pub fn with_capacity(m: usize, n: usize, cap: usize) -> Result<Self> {
        Self::build(m, n, cap, false)
    }

    /// An empty `m x n` pattern matrix: presence only, no values stored.
    pub fn pattern(m: usize, n: usize) -> Result<Self> {
        let cap = if m == 0 || n == 0 { 0 } else { m.max(n) };
        Self::build(m, n, cap, true)
    }

    /// An empty pattern matrix with room for `cap` nonzeroes.
    pub fn pattern_with_capacity(m: usize, n: usize, cap: usize) -> Result<Self> {
        Self::build(m, n, cap, true)
    }

    fn build(m: usize, n: usize, cap: usize, pattern: bool) -> Result<Self> {
        if m > MAX_ROWS || n > MAX_COLS {
            return Err(Error::Overflow);
        }
        if cap > MAX_NONZEROES {
            return Err(Error::Overflow);
        }
        Self::check_capacity(m, n, cap)?;
        buffer::manager().reserve_for_container(m, n, std::mem::size_of::<T>())?;
        trace!("new {}x{} matrix, capacity {}", m, n, cap);
        Ok(Self {
            m,
            n,
            cap,
            nz: 0,
            crs: CompressedStorage::new(m, cap, pattern),
            ccs: CompressedStorage::new(n, cap, pattern),
            spa_rows: Spa::new(m),
            spa_cols: Spa::new(n),
            id: buffer::next_container_id(),
        })
    }

    /// Whether `cap` is a feasible capacity for an `m x n` matrix.
    fn check_capacity(m: usize, n: usize, cap: usize) -> Result<()> {
        if (m == 0 || n == 0) && cap > 0 {
            return Err(Error::Illegal);
        }
        if m != 0 && n != 0 && cap > m * n {
            return Err(Error::Illegal);
        }
        Ok(())
    }

    /// The number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.m
    }

    /// The number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.n
    }

    /// The number of stored nonzeroes.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.nz
    }

    /// The number of nonzeroes the container can hold without resizing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Whether this matrix stores presence only.
    #[inline]
    pub fn is_pattern(&self) -> bool {
        self.crs.is_pattern()
    }

    /// The container identity: stable from construction to destruction
    /// and unique among live containers.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove all nonzeroes. Capacity is retained; O(m + n) work.
    ///
    /// Both scratch supports are reset too, so state left by a failed
    /// kernel cannot leak into the next primitive.
    pub fn clear(&mut self) {
        self.crs.clear();
        self.ccs.clear();
        self.spa_rows.coords.clear();
        self.spa_cols.coords.clear();
        self.nz = 0;
    }

    /// Grow the capacity to at least `new_cap` nonzeroes.
    ///
    /// Never shrinks. On allocation failure the prior capacity and
    /// contents are untouched.
    pub fn resize(&mut self, new_cap: usize) -> Result<()> {
        if new_cap <= self.cap {
            return Ok(());
        }
        if new_cap > MAX_NONZEROES {
            return Err(Error::Overflow);
        }
        Self::check_capacity(self.m, self.n, new_cap)?;
        self.crs.grow(new_cap)?;
        self.ccs.grow(new_cap)?;
        self.cap = new_cap;
        Ok(())
    }

    /// Set, or insert, the single element `(i, j)`.
    ///
    /// Under [`Phase::Resize`] only grows capacity so that the insert is
    /// guaranteed to succeed; under [`Phase::Execute`] performs it,
    /// clearing the matrix and reporting failure if capacity is
    /// insufficient for a structurally new element.
    pub fn set_element(&mut self, i: usize, j: usize, value: T, phase: Phase) -> Result<()> {
        if i >= self.m || j >= self.n {
            return Err(Error::Mismatch);
        }
        // Update in place when the position is already occupied.
        if let Some(k) = self.crs.range(i).find(|&k| self.crs.index(k) == j) {
            if phase != Phase::Execute {
                return match phase {
                    Phase::Resize => Ok(()),
                    Phase::Try => Err(Error::Unsupported),
                    Phase::Execute => unreachable!(),
                };
            }
            if let Some(v) = self.crs.values.as_mut() {
                v[k] = value;
            }
            if let Some(kc) = self.ccs.range(j).find(|&k| self.ccs.index(k) == i) {
                if let Some(v) = self.ccs.values.as_mut() {
                    v[kc] = value;
                }
            }
            return Ok(());
        }
        match phase {
            Phase::Resize => return self.resize(self.nz + 1),
            Phase::Try => return Err(Error::Unsupported),
            Phase::Execute => {}
        }
        if self.nz + 1 > MAX_NONZEROES {
            return Err(Error::Overflow);
        }
        if self.cap < self.nz + 1 {
            self.clear();
            return Err(Error::Failed);
        }
        // Open a slot at the end of row i and of column j.
        let pos = self.crs.offsets[i + 1];
        self.crs.indices.copy_within(pos..self.nz, pos + 1);
        if let Some(v) = self.crs.values.as_mut() {
            v.copy_within(pos..self.nz, pos + 1);
        }
        self.crs.record_value(pos, j, value);
        for off in self.crs.offsets[i + 1..].iter_mut() {
            *off += 1;
        }
        let pos = self.ccs.offsets[j + 1];
        self.ccs.indices.copy_within(pos..self.nz, pos + 1);
        if let Some(v) = self.ccs.values.as_mut() {
            v.copy_within(pos..self.nz, pos + 1);
        }
        self.ccs.record_value(pos, i, value);
        for off in self.ccs.offsets[j + 1..].iter_mut() {
            *off += 1;
        }
        self.nz += 1;
        Ok(())
    }

    /// The materialised transpose: an `n x m` matrix sharing no storage
    /// with `self`. The two compressed views simply swap roles.
    pub fn transpose(&self) -> Result<Self> {
        let mut out = Self::build(self.n, self.m, self.cap, self.is_pattern())?;
        out.crs = self.ccs.clone();
        out.ccs = self.crs.clone();
        out.nz = self.nz;
        Ok(out)
    }

    /// Iterate over all nonzeroes as `((row, col), value)` pairs, in
    /// unspecified order. Pattern matrices yield `T::default()` values.
    pub fn iter(&self) -> MatrixIter<'_, T> {
        MatrixIter {
            mat: self,
            row: 0,
            k: 0,
        }
    }

    /// The row-compressed half.
    #[inline]
    pub(crate) fn crs(&self) -> &CompressedStorage<T> {
        &self.crs
    }

    /// The column-compressed half.
    #[inline]
    pub(crate) fn ccs(&self) -> &CompressedStorage<T> {
        &self.ccs
    }

    /// Split the container into independently borrowed kernel parts.
    pub(crate) fn parts_mut(&mut self) -> MatrixParts<'_, T> {
        MatrixParts {
            crs: &mut self.crs,
            ccs: &mut self.ccs,
            spa_cols: &mut self.spa_cols,
            nz: &mut self.nz,
        }
    }

    pub(crate) fn set_nnz(&mut self, nz: usize) {
        debug_assert!(nz <= self.cap);
        self.nz = nz;
    }
}

impl<T: Copy + Default> Clone for SparseMatrix<T> {
    /// Duplicate contents; the copy receives a fresh identity.
    fn clone(&self) -> Self {
        Self {
            m: self.m,
            n: self.n,
            cap: self.cap,
            nz: self.nz,
            crs: self.crs.clone(),
            ccs: self.ccs.clone(),
            spa_rows: Spa::new(self.m),
            spa_cols: Spa::new(self.n),
            id: buffer::next_container_id(),
        }
    }
}

impl<T> Drop for SparseMatrix<T> {
    fn drop(&mut self) {
        buffer::release_container_id(self.id);
    }
}

impl<T: std::fmt::Debug + Copy + Default> std::fmt::Debug for SparseMatrix<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SparseMatrix {{")?;
        writeln!(f, "  dimensions: {} × {}", self.m, self.n)?;
        writeln!(f, "  nnz: {} (capacity {})", self.nz, self.cap)?;
        let max_rows_to_print = 5.min(self.m);
        if max_rows_to_print > 0 {
            writeln!(f, "  content sample:")?;
            for i in 0..max_rows_to_print {
                write!(f, "    row {}: ", i)?;
                let range = self.crs.range(i);
                if range.is_empty() {
                    writeln!(f, "(empty)")?;
                } else {
                    let max_elements = 5.min(range.len());
                    for k in range.start..range.start + max_elements {
                        write!(
                            f,
                            "({}, {:?}) ",
                            self.crs.index(k),
                            self.crs.get_value(k, T::default())
                        )?;
                    }
                    if range.len() > max_elements {
                        write!(f, "... ({} more)", range.len() - max_elements)?;
                    }
                    writeln!(f)?;
                }
            }
            if self.m > max_rows_to_print {
                writeln!(f, "    ... ({} more rows)", self.m - max_rows_to_print)?;
            }
        }
        write!(f, "}}")
    }
}

/// Iterator over the nonzeroes of a [`SparseMatrix`].
pub struct MatrixIter<'a, T> {
    mat: &'a SparseMatrix<T>,
    row: usize,
    k: usize,
}

impl<'a, T: Copy + Default> Iterator for MatrixIter<'a, T> {
    type Item = ((usize, usize), T);

    fn next(&mut self) -> Option<Self::Item> {
        while self.row < self.mat.m {
            if self.k < self.mat.crs.offsets[self.row + 1] {
                let k = self.k;
                self.k += 1;
                return Some((
                    (self.row, self.mat.crs.index(k)),
                    self.mat.crs.get_value(k, T::default()),
                ));
            }
            self.row += 1;
            if self.row < self.mat.m {
                self.k = self.mat.crs.offsets[self.row];
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_and_accessors() {
        let a = SparseMatrix::<f64>::new(3, 5).unwrap();
        assert_eq!(a.nrows(), 3);
        assert_eq!(a.ncols(), 5);
        assert_eq!(a.nnz(), 0);
        assert_eq!(a.capacity(), 5);
        assert!(!a.is_pattern());
    }

    #[test]
    fn capacity_feasibility() {
        assert_eq!(
            SparseMatrix::<f64>::with_capacity(2, 2, 5).unwrap_err(),
            Error::Illegal
        );
        assert_eq!(
            SparseMatrix::<f64>::with_capacity(0, 4, 1).unwrap_err(),
            Error::Illegal
        );
        // Empty matrices are legal.
        let e = SparseMatrix::<f64>::new(0, 4).unwrap();
        assert_eq!(e.capacity(), 0);
        // Capacity exactly m*n is fine.
        let full = SparseMatrix::<f64>::with_capacity(2, 2, 4).unwrap();
        assert_eq!(full.capacity(), 4);
    }

    #[test]
    fn resize_grows_only() {
        let mut a = SparseMatrix::<f64>::new(4, 4).unwrap();
        a.resize(10).unwrap();
        assert_eq!(a.capacity(), 10);
        a.resize(2).unwrap();
        assert_eq!(a.capacity(), 10);
        assert_eq!(a.resize(17).unwrap_err(), Error::Illegal);
        assert_eq!(a.capacity(), 10);
    }

    #[test]
    fn set_element_inserts_and_updates() {
        let mut a = SparseMatrix::<f64>::new(3, 3).unwrap();
        a.set_element(0, 1, 2.0, Phase::Execute).unwrap();
        a.set_element(2, 0, 3.0, Phase::Execute).unwrap();
        a.set_element(0, 1, 5.0, Phase::Execute).unwrap();
        assert_eq!(a.nnz(), 2);
        let mut entries: Vec<_> = a.iter().collect();
        entries.sort_by_key(|&((r, c), _)| (r, c));
        assert_eq!(entries, vec![((0, 1), 5.0), ((2, 0), 3.0)]);
        // CRS and CCS agree.
        assert_eq!(a.crs().nonzeroes(), a.ccs().nonzeroes());
    }

    #[test]
    fn set_element_capacity_discipline() {
        let mut a = SparseMatrix::<f64>::with_capacity(3, 3, 1).unwrap();
        a.set_element(0, 0, 1.0, Phase::Execute).unwrap();
        // The second structural insert exceeds the capacity.
        assert_eq!(
            a.set_element(1, 1, 2.0, Phase::Execute).unwrap_err(),
            Error::Failed
        );
        assert_eq!(a.nnz(), 0);
        assert_eq!(a.capacity(), 1);
        // The resize phase repairs the situation.
        a.set_element(0, 0, 1.0, Phase::Execute).unwrap();
        a.set_element(1, 1, 2.0, Phase::Resize).unwrap();
        a.set_element(1, 1, 2.0, Phase::Execute).unwrap();
        assert_eq!(a.nnz(), 2);
    }

    #[test]
    fn set_element_bounds() {
        let mut a = SparseMatrix::<f64>::new(2, 2).unwrap();
        assert_eq!(
            a.set_element(2, 0, 1.0, Phase::Execute).unwrap_err(),
            Error::Mismatch
        );
        assert_eq!(
            a.set_element(0, 7, 1.0, Phase::Execute).unwrap_err(),
            Error::Mismatch
        );
    }

    #[test]
    fn clear_retains_capacity() {
        let mut a = SparseMatrix::<f64>::new(3, 3).unwrap();
        a.set_element(1, 1, 4.0, Phase::Execute).unwrap();
        let cap = a.capacity();
        a.clear();
        assert_eq!(a.nnz(), 0);
        assert_eq!(a.capacity(), cap);
        assert_eq!(a.iter().count(), 0);
    }

    #[test]
    fn identities_are_stable_and_fresh_on_clone() {
        let a = SparseMatrix::<f64>::new(2, 2).unwrap();
        let b = SparseMatrix::<f64>::new(2, 2).unwrap();
        assert_ne!(a.id(), b.id());
        let c = a.clone();
        assert_ne!(a.id(), c.id());
        // Moving preserves the identity.
        let id = a.id();
        let moved = a;
        assert_eq!(moved.id(), id);
    }

    #[test]
    fn transpose_swaps_views() {
        let mut a = SparseMatrix::<f64>::new(2, 3).unwrap();
        a.set_element(0, 2, 7.0, Phase::Execute).unwrap();
        a.set_element(1, 0, 8.0, Phase::Execute).unwrap();
        let t = a.transpose().unwrap();
        assert_eq!(t.nrows(), 3);
        assert_eq!(t.ncols(), 2);
        let mut entries: Vec<_> = t.iter().collect();
        entries.sort_by_key(|&((r, c), _)| (r, c));
        assert_eq!(entries, vec![((0, 1), 8.0), ((2, 0), 7.0)]);
    }

    #[test]
    fn pattern_matrix_has_no_values() {
        let mut a = SparseMatrix::<f64>::pattern(2, 2).unwrap();
        assert!(a.is_pattern());
        a.set_element(0, 1, 123.0, Phase::Execute).unwrap();
        // The value is dropped; iteration substitutes the default.
        let entries: Vec<_> = a.iter().collect();
        assert_eq!(entries, vec![((0, 1), 0.0)]);
    }
}
