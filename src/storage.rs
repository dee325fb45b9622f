//! Compressed sparse storage
//!
//! A [`CompressedStorage`] is one half of a matrix: a triple of offsets,
//! minor indices, and values, keyed on either rows (CRS) or columns
//! (CCS). Matrices keep both halves in sync so that every primitive can
//! pick the traversal direction it needs.
//!
//! Pattern containers carry no value array at all; [`CompressedStorage::get_value`]
//! then returns a caller-injected identity. Within a major index the
//! minor indices may be unordered; primitives that need ordering sort in
//! place via [`CompressedStorage::sort_major`].

use crate::error::{Error, Result};

/// One compressed half (row- or column-oriented) of a sparse matrix.
///
/// Invariants: `offsets` has length `major + 1`, is monotone
/// non-decreasing, and `offsets[major]` equals the number of stored
/// nonzeroes; `indices` and the optional `values` have length equal to
/// the container capacity.
#[derive(Debug, Clone)]
pub struct CompressedStorage<T> {
    /// Offsets into `indices`/`values`, one per major index plus one.
    pub(crate) offsets: Vec<usize>,
    /// Minor indices of the stored nonzeroes.
    pub(crate) indices: Vec<usize>,
    /// Stored values; `None` for pattern storage.
    pub(crate) values: Option<Vec<T>>,
}

impl<T: Copy + Default> CompressedStorage<T> {
    /// Empty storage over `major` major indices with room for `cap`
    /// nonzeroes.
    pub(crate) fn new(major: usize, cap: usize, pattern: bool) -> Self {
        Self {
            offsets: vec![0; major + 1],
            indices: vec![0; cap],
            values: if pattern {
                None
            } else {
                Some(vec![T::default(); cap])
            },
        }
    }

    /// Whether this is pattern storage (no value array).
    #[inline]
    pub fn is_pattern(&self) -> bool {
        self.values.is_none()
    }

    /// The number of stored nonzeroes, per the final offset.
    #[inline]
    pub fn nonzeroes(&self) -> usize {
        *self.offsets.last().unwrap_or(&0)
    }

    /// The half-open slot range of major index `i`.
    #[inline]
    pub fn range(&self, i: usize) -> std::ops::Range<usize> {
        self.offsets[i]..self.offsets[i + 1]
    }

    /// The minor index stored in slot `k`.
    #[inline]
    pub fn index(&self, k: usize) -> usize {
        self.indices[k]
    }

    /// The value stored in slot `k`, or `identity` for pattern storage.
    #[inline]
    pub fn get_value(&self, k: usize, identity: T) -> T {
        match &self.values {
            Some(v) => v[k],
            None => identity,
        }
    }

    /// Store the nonzero `(minor, value)` into slot `k`.
    ///
    /// The value is dropped silently on pattern storage.
    #[inline]
    pub fn record_value(&mut self, k: usize, minor: usize, value: T) {
        self.indices[k] = minor;
        if let Some(v) = self.values.as_mut() {
            v[k] = value;
        }
    }

    /// Copy the slot range `src` of `other` into this storage starting at
    /// slot `dst`. Both storages must agree on pattern-ness.
    pub fn copy_from(&mut self, other: &Self, src: std::ops::Range<usize>, dst: usize) {
        let len = src.len();
        self.indices[dst..dst + len].copy_from_slice(&other.indices[src.clone()]);
        if let (Some(to), Some(from)) = (self.values.as_mut(), other.values.as_ref()) {
            to[dst..dst + len].copy_from_slice(&from[src]);
        }
    }

    /// Zero all offsets; the stored nonzeroes become unreachable.
    pub(crate) fn clear(&mut self) {
        self.offsets.fill(0);
    }

    /// Grow the index and value arrays to hold `cap` nonzeroes.
    ///
    /// Never shrinks. Reports allocation failure without touching the
    /// prior contents.
    pub(crate) fn grow(&mut self, cap: usize) -> Result<()> {
        if cap <= self.indices.len() {
            return Ok(());
        }
        let extra = cap - self.indices.len();
        self.indices
            .try_reserve_exact(extra)
            .map_err(|_| Error::OutOfMem)?;
        if let Some(v) = self.values.as_mut() {
            v.try_reserve_exact(extra).map_err(|_| Error::OutOfMem)?;
            v.resize(cap, T::default());
        }
        self.indices.resize(cap, 0);
        Ok(())
    }

    /// Sort the slots of major index `i` by minor index, in place.
    pub fn sort_major(&mut self, i: usize) {
        let range = self.range(i);
        match self.values.as_mut() {
            Some(values) => {
                let mut entries: Vec<(usize, T)> = self.indices[range.clone()]
                    .iter()
                    .copied()
                    .zip(values[range.clone()].iter().copied())
                    .collect();
                entries.sort_unstable_by_key(|&(minor, _)| minor);
                for (slot, (minor, value)) in range.clone().zip(entries) {
                    self.indices[slot] = minor;
                    values[slot] = value;
                }
            }
            None => {
                self.indices[range].sort_unstable();
            }
        }
    }

    /// The stored nonzeroes of major index `i` as `(minor, value)` pairs,
    /// substituting `identity` on pattern storage.
    pub fn major_iter(&self, i: usize, identity: T) -> impl Iterator<Item = (usize, T)> + '_ {
        self.range(i)
            .map(move |k| (self.indices[k], self.get_value(k, identity)))
    }
}

/// Rebuild a column-compressed half from a row-compressed one by a
/// counting-sort scatter.
///
/// The scatter walks rows in order, so within each column the row indices
/// come out sorted. Used by every primitive that assembles its output
/// row-wise and by the selection filter, which regenerates the
/// column view in one prefix-sum pass over a column counter.
pub(crate) fn rebuild_minor<T: Copy + Default>(
    crs: &CompressedStorage<T>,
    ccs: &mut CompressedStorage<T>,
    nrows: usize,
    ncols: usize,
) {
    ccs.offsets[..=ncols].fill(0);
    for i in 0..nrows {
        for k in crs.range(i) {
            ccs.offsets[crs.indices[k] + 1] += 1;
        }
    }
    for j in 0..ncols {
        ccs.offsets[j + 1] += ccs.offsets[j];
    }
    // Scatter with running per-column cursors; offsets are restored by
    // the final pass below.
    for i in 0..nrows {
        for k in crs.range(i) {
            let j = crs.indices[k];
            let slot = ccs.offsets[j];
            ccs.offsets[j] += 1;
            ccs.indices[slot] = i;
            if let (Some(to), Some(from)) = (ccs.values.as_mut(), crs.values.as_ref()) {
                to[slot] = from[k];
            }
        }
    }
    for j in (1..=ncols).rev() {
        ccs.offsets[j] = ccs.offsets[j - 1];
    }
    ccs.offsets[0] = 0;
}
