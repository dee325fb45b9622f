//! Sparse matrix-matrix multiplication under a semiring
//!
//! Computes `C <- C (+) (A (x) B)` in two phases. The symbolic phase
//! sizes the output: per output row it derives a slot bound from the
//! pre-existing row length plus the number of distinct product columns,
//! deduplicated through a sparse accumulator. The numeric phase then
//! preloads any pre-existing row content, folds products into the
//! accumulator, and writes each finished row compactly.
//!
//! When the output holds nonzeroes on entry the update is in place: the
//! old row data is first shifted into the new row layout, with the first
//! unused slot of every row holding a sentinel column index equal to the
//! column count, which is how the numeric phase knows where a preloaded
//! row ends without a separate boundary array.
//!
//! The symbolic phase runs on a thread team sized by the analytic model
//! and the global buffer pool; the column-compressed output half is
//! regenerated by a counting-sort scatter once the row half is final.

use log::debug;
use rayon::prelude::*;

use crate::algebra::{BinaryOperator, Monoid, Semiring};
use crate::buffer;
use crate::config::MAX_NONZEROES;
use crate::coordinates::MaskValue;
use crate::descriptor::{Descriptor, Phase};
use crate::error::{Error, Result};
use crate::matrix::SparseMatrix;
use crate::storage::rebuild_minor;

/// `C <- C (+) (A (x) B)` under a full semiring.
///
/// Pattern inputs are admitted: their values are read as the semiring's
/// multiplicative identities. Honours [`Descriptor::TRANSPOSE_LEFT`],
/// [`Descriptor::TRANSPOSE_RIGHT`], [`Descriptor::ADD_IDENTITY`], and
/// [`Descriptor::FORCE_ROW_MAJOR`].
pub fn mxm<AM, MO, T1, T2, TO>(
    c: &mut SparseMatrix<TO>,
    a: &SparseMatrix<T1>,
    b: &SparseMatrix<T2>,
    ring: &Semiring<AM, MO>,
    descr: Descriptor,
    phase: Phase,
) -> Result<()>
where
    AM: Monoid<Elem = TO> + Send + Sync,
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO> + Send + Sync,
    T1: Copy + Default + Send + Sync,
    T2: Copy + Default + Send + Sync,
    TO: Copy + Default + Send + Sync,
{
    mxm_generic::<AM, MO, bool, T1, T2, TO>(
        c,
        None,
        a,
        b,
        ring.additive(),
        ring.multiplicative(),
        ring.one_left(),
        ring.one_right(),
        true,
        descr,
        phase,
    )
}

/// `C <- C (+) (A (x) B)` gated by an output mask.
///
/// The mask admits output position `(i, j)` per its interpretation under
/// `descr` (structural, by value, or inverted). Only product insertions
/// are gated: pre-existing output nonzeroes survive regardless.
pub fn mxm_masked<AM, MO, MT, T1, T2, TO>(
    c: &mut SparseMatrix<TO>,
    mask: &SparseMatrix<MT>,
    a: &SparseMatrix<T1>,
    b: &SparseMatrix<T2>,
    ring: &Semiring<AM, MO>,
    descr: Descriptor,
    phase: Phase,
) -> Result<()>
where
    AM: Monoid<Elem = TO> + Send + Sync,
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO> + Send + Sync,
    MT: Copy + Default + MaskValue + Send + Sync,
    T1: Copy + Default + Send + Sync,
    T2: Copy + Default + Send + Sync,
    TO: Copy + Default + Send + Sync,
{
    mxm_generic::<AM, MO, MT, T1, T2, TO>(
        c,
        Some(mask),
        a,
        b,
        ring.additive(),
        ring.multiplicative(),
        ring.one_left(),
        ring.one_right(),
        true,
        descr,
        phase,
    )
}

/// `C <- C (+) (A (x) B)` from a monoid plus a multiplicative operator.
///
/// This form has no multiplicative identities to substitute, so pattern
/// inputs and [`Descriptor::ADD_IDENTITY`] are illegal.
pub fn mxm_with<AM, MO, T1, T2, TO>(
    c: &mut SparseMatrix<TO>,
    a: &SparseMatrix<T1>,
    b: &SparseMatrix<T2>,
    add: &AM,
    mul: &MO,
    descr: Descriptor,
    phase: Phase,
) -> Result<()>
where
    AM: Monoid<Elem = TO> + Send + Sync,
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO> + Send + Sync,
    T1: Copy + Default + Send + Sync,
    T2: Copy + Default + Send + Sync,
    TO: Copy + Default + Send + Sync,
{
    if a.is_pattern() || b.is_pattern() || descr.contains(Descriptor::ADD_IDENTITY) {
        return Err(Error::Illegal);
    }
    mxm_generic::<AM, MO, bool, T1, T2, TO>(
        c,
        None,
        a,
        b,
        add,
        mul,
        T1::default(),
        T2::default(),
        false,
        descr,
        phase,
    )
}

/// Per-row admission set derived from a mask matrix row.
fn build_mask_row<MT: Copy + Default + MaskValue>(
    spa: &mut crate::coordinates::Coordinates,
    mask: &SparseMatrix<MT>,
    descr: Descriptor,
    i: usize,
) {
    spa.clear();
    let structural = descr.contains(Descriptor::STRUCTURAL);
    for (j, v) in mask.crs().major_iter(i, MT::default()) {
        if structural || mask.is_pattern() || v.is_true() {
            spa.assign(j);
        }
    }
}

#[inline]
fn mask_admits(spa: &crate::coordinates::Coordinates, descr: Descriptor, j: usize) -> bool {
    spa.assigned(j) != descr.contains(Descriptor::INVERT_MASK)
}

#[allow(clippy::too_many_arguments)]
fn mxm_generic<AM, MO, MT, T1, T2, TO>(
    c: &mut SparseMatrix<TO>,
    mask: Option<&SparseMatrix<MT>>,
    a: &SparseMatrix<T1>,
    b: &SparseMatrix<T2>,
    add: &AM,
    mul: &MO,
    sub1: T1,
    sub2: T2,
    allow_pattern: bool,
    descr: Descriptor,
    phase: Phase,
) -> Result<()>
where
    AM: Monoid<Elem = TO> + Send + Sync,
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO> + Send + Sync,
    MT: Copy + Default + MaskValue + Send + Sync,
    T1: Copy + Default + Send + Sync,
    T2: Copy + Default + Send + Sync,
    TO: Copy + Default + Send + Sync,
{
    if phase == Phase::Try {
        return Err(Error::Unsupported);
    }
    if !allow_pattern && (a.is_pattern() || b.is_pattern()) {
        return Err(Error::Illegal);
    }
    let trans_left = descr.contains(Descriptor::TRANSPOSE_LEFT);
    let trans_right = descr.contains(Descriptor::TRANSPOSE_RIGHT);

    let m = c.nrows();
    let n = c.ncols();
    let (m_a, k_a) = if trans_left {
        (a.ncols(), a.nrows())
    } else {
        (a.nrows(), a.ncols())
    };
    let (k_b, n_b) = if trans_right {
        (b.ncols(), b.nrows())
    } else {
        (b.nrows(), b.ncols())
    };
    if m != m_a || k_a != k_b || n != n_b {
        return Err(Error::Mismatch);
    }
    if let Some(mask) = mask {
        if mask.nrows() != m || mask.ncols() != n {
            return Err(Error::Mismatch);
        }
    }
    if m == 0 || n == 0 {
        return Ok(());
    }

    let a_raw = if trans_left { a.ccs() } else { a.crs() };
    let b_raw = if trans_right { b.ccs() } else { b.crs() };
    let add_identity = descr.contains(Descriptor::ADD_IDENTITY);
    let in_place = c.nnz() > 0;
    debug!(
        "mxm: {}x{} <- {}x{} * {}x{}, phase {:?}, in-place {}",
        m, n, m_a, k_a, k_b, n_b, phase, in_place
    );

    // Symbolic phase: per-row slot bounds. The default counts distinct
    // product columns on top of the full pre-existing row; when that
    // bound cannot fit any capacity it falls back to exact union counts.
    let mut row_bounds = vec![0usize; m];
    symbolic_counts(
        &mut row_bounds,
        c,
        mask,
        a_raw,
        b_raw,
        descr,
        add_identity,
        in_place,
        false,
    )?;
    let mut required: usize = row_bounds.iter().sum();
    if required > m * n {
        symbolic_counts(
            &mut row_bounds,
            c,
            mask,
            a_raw,
            b_raw,
            descr,
            add_identity,
            in_place,
            true,
        )?;
        required = row_bounds.iter().sum();
    }
    if required > MAX_NONZEROES {
        return Err(Error::Overflow);
    }

    match phase {
        Phase::Resize => return c.resize(required),
        Phase::Execute => {
            if required > c.capacity() {
                c.clear();
                return Err(Error::Failed);
            }
        }
        Phase::Try => unreachable!(),
    }

    // Row layout for the numeric phase: prefix the slot bounds.
    let manager = buffer::manager();
    let mut layout = manager.lease_offsets(m + 1)?;
    layout[0] = 0;
    for i in 0..m {
        layout[i + 1] = layout[i] + row_bounds[i];
    }

    // In-place shift: relocate old row data into the new layout, padding
    // each row's tail with the sentinel column index `n`.
    let mut mask_spa = manager.lease_spa(n)?;
    {
        let parts = c.parts_mut();
        if in_place {
            let mut old_offsets = manager.lease_offsets(m + 1)?;
            old_offsets.copy_from_slice(&parts.crs.offsets);
            for i in (0..m).rev() {
                let old = old_offsets[i]..old_offsets[i + 1];
                let dst = layout[i];
                parts.crs.indices.copy_within(old.clone(), dst);
                if let Some(vals) = parts.crs.values.as_mut() {
                    vals.copy_within(old.clone(), dst);
                }
                for pad in dst + old.len()..layout[i + 1] {
                    parts.crs.indices[pad] = n;
                }
            }
            manager.return_offsets(old_offsets);
        }

        // Numeric phase, row by row: preload, multiply-accumulate, write
        // out compactly at the running final position.
        let spa = parts.spa_cols;
        let mut nzc = 0usize;
        parts.crs.offsets[0] = 0;
        for i in 0..m {
            spa.coords.clear();
            if in_place {
                for k in layout[i]..layout[i + 1] {
                    let j = parts.crs.indices[k];
                    if j == n {
                        break;
                    }
                    spa.coords.assign(j);
                    spa.values[j] = parts.crs.get_value(k, add.identity());
                }
            }
            if let Some(mask) = mask {
                build_mask_row(&mut mask_spa, mask, descr, i);
            }
            let a_entries = a_raw
                .major_iter(i, sub1)
                .chain((add_identity && i < k_a).then_some((i, sub1)));
            for (k_col, a_val) in a_entries {
                for (j, b_val) in b_raw.major_iter(k_col, sub2) {
                    if mask.is_some() && !mask_admits(&mask_spa, descr, j) {
                        continue;
                    }
                    let product = mul.apply(a_val, b_val);
                    if spa.coords.assign(j) {
                        add.fold(&mut spa.values[j], product);
                    } else {
                        spa.values[j] = product;
                    }
                }
            }
            for k in 0..spa.coords.nonzeroes() {
                let j = spa.coords.index(k);
                parts.crs.record_value(nzc, j, spa.values[j]);
                nzc += 1;
            }
            parts.crs.offsets[i + 1] = nzc;
            debug_assert!(nzc <= layout[i + 1]);
        }
        *parts.nz = nzc;

        // Regenerate the column-compressed half, unless the caller asked
        // for a row-major-only result.
        if descr.contains(Descriptor::FORCE_ROW_MAJOR) {
            parts.ccs.clear();
        } else {
            rebuild_minor(parts.crs, parts.ccs, m, n);
        }
    }
    manager.return_spa(mask_spa);
    manager.return_offsets(layout);
    Ok(())
}

/// Fill `row_bounds` with per-row slot counts for the symbolic phase.
///
/// With `exact` unset, a row's bound is its pre-existing length plus the
/// number of distinct admitted product columns; with `exact` set the
/// pre-existing columns join the accumulator first and the bound is the
/// exact union size.
#[allow(clippy::too_many_arguments)]
fn symbolic_counts<MT, T1, T2, TO>(
    row_bounds: &mut [usize],
    c: &SparseMatrix<TO>,
    mask: Option<&SparseMatrix<MT>>,
    a_raw: &crate::storage::CompressedStorage<T1>,
    b_raw: &crate::storage::CompressedStorage<T2>,
    descr: Descriptor,
    add_identity: bool,
    in_place: bool,
    exact: bool,
) -> Result<()>
where
    MT: Copy + Default + MaskValue + Send + Sync,
    T1: Copy + Default + Send + Sync,
    T2: Copy + Default + Send + Sync,
    TO: Copy + Default + Send + Sync,
{
    let m = c.nrows();
    let n = c.ncols();
    let k_a = a_raw.offsets.len() - 1;
    let manager = buffer::manager();
    let params = manager.params();
    let team = params
        .thread_count_for(a_raw.nonzeroes().max(c.nnz()))
        .min(manager.max_threads(n, std::mem::size_of::<TO>(), n + 1))
        .min(m)
        .max(1);

    let mut spas = Vec::with_capacity(team);
    let mut mask_spas = Vec::with_capacity(team);
    for _ in 0..team {
        spas.push(manager.lease_spa(n)?);
        mask_spas.push(manager.lease_spa(n)?);
    }

    let chunk = m.div_ceil(team);
    row_bounds
        .par_chunks_mut(chunk)
        .zip(spas.par_iter_mut().zip(mask_spas.par_iter_mut()))
        .enumerate()
        .for_each(|(t, (bounds, (spa, mask_spa)))| {
            let base = t * chunk;
            for (local, bound) in bounds.iter_mut().enumerate() {
                let i = base + local;
                spa.clear();
                let mut count = 0usize;
                if in_place {
                    if exact {
                        for k in c.crs().range(i) {
                            spa.assign(c.crs().index(k));
                        }
                        count = spa.nonzeroes();
                    } else {
                        count += c.crs().range(i).len();
                    }
                }
                if let Some(mask) = mask {
                    build_mask_row(mask_spa, mask, descr, i);
                }
                let a_row = a_raw
                    .range(i)
                    .map(|k| a_raw.index(k))
                    .chain((add_identity && i < k_a).then_some(i));
                for k_col in a_row {
                    for kb in b_raw.range(k_col) {
                        let j = b_raw.index(kb);
                        if mask.is_some() && !mask_admits(mask_spa, descr, j) {
                            continue;
                        }
                        if !spa.assign(j) {
                            count += 1;
                        }
                    }
                }
                *bound = count;
            }
        });

    for spa in spas {
        manager.return_spa(spa);
    }
    for spa in mask_spas {
        manager.return_spa(spa);
    }
    Ok(())
}
