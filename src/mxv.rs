//! Masked sparse matrix-vector multiplication under a semiring
//!
//! Computes `u <- u (+) (A v)`, with the matrix optionally transposed
//! and with optional masks on the output vector, the input vector, or
//! both. Each effective matrix row folds its admitted products into a
//! scalar accumulator; accumulators that remain at the additive identity
//! are skipped unless [`Descriptor::EXPLICIT_ZERO`] asks for them.
//!
//! Rows are independent, so the kernel parallelises over contiguous row
//! chunks. Each chunk owns its slice of the output value array and
//! records support insertions in a thread-local coordinates update; the
//! updates are merged once the team finishes.

use log::debug;
use rayon::prelude::*;

use crate::algebra::{BinaryOperator, IndexValue, Monoid, Semiring};
use crate::buffer;
use crate::coordinates::{Coordinates, MaskValue};
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};
use crate::matrix::SparseMatrix;
use crate::storage::CompressedStorage;
use crate::vector::SparseVector;

/// `u <- u (+) (A v)` under a full semiring, unmasked.
pub fn mxv<AM, MO, T1, T2, TO>(
    u: &mut SparseVector<TO>,
    a: &SparseMatrix<T1>,
    v: &SparseVector<T2>,
    ring: &Semiring<AM, MO>,
    descr: Descriptor,
) -> Result<()>
where
    AM: Monoid<Elem = TO> + Send + Sync,
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO> + Send + Sync,
    T1: Copy + Default + Send + Sync,
    T2: Copy + Default + IndexValue + Send + Sync,
    TO: Copy + Default + PartialEq + Send + Sync,
{
    mxv_masked::<AM, MO, bool, bool, T1, T2, TO>(u, None, a, v, None, ring, descr)
}

/// `u <- u (+) (A v)` with optional output and input masks.
///
/// The output mask gates which rows may be written; the input mask gates
/// which entries of `v` participate. Passing both gives the doubly
/// masked variant, passing neither the unmasked one.
pub fn mxv_masked<AM, MO, MU, MV, T1, T2, TO>(
    u: &mut SparseVector<TO>,
    u_mask: Option<&SparseVector<MU>>,
    a: &SparseMatrix<T1>,
    v: &SparseVector<T2>,
    v_mask: Option<&SparseVector<MV>>,
    ring: &Semiring<AM, MO>,
    descr: Descriptor,
) -> Result<()>
where
    AM: Monoid<Elem = TO> + Send + Sync,
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO> + Send + Sync,
    MU: Copy + Default + MaskValue + Send + Sync,
    MV: Copy + Default + MaskValue + Send + Sync,
    T1: Copy + Default + Send + Sync,
    T2: Copy + Default + IndexValue + Send + Sync,
    TO: Copy + Default + PartialEq + Send + Sync,
{
    mxv_generic(
        u,
        u_mask,
        a,
        v,
        v_mask,
        ring.additive(),
        ring.multiplicative(),
        ring.one_left(),
        descr,
        descr.contains(Descriptor::TRANSPOSE_MATRIX),
    )
}

/// `u <- u (+) (A v)` from a monoid plus an operator; pattern matrices
/// and [`Descriptor::ADD_IDENTITY`] are illegal in this form.
pub fn mxv_with<AM, MO, T1, T2, TO>(
    u: &mut SparseVector<TO>,
    a: &SparseMatrix<T1>,
    v: &SparseVector<T2>,
    add: &AM,
    mul: &MO,
    descr: Descriptor,
) -> Result<()>
where
    AM: Monoid<Elem = TO> + Send + Sync,
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO> + Send + Sync,
    T1: Copy + Default + Send + Sync,
    T2: Copy + Default + IndexValue + Send + Sync,
    TO: Copy + Default + PartialEq + Send + Sync,
{
    if a.is_pattern() || descr.contains(Descriptor::ADD_IDENTITY) {
        return Err(Error::Illegal);
    }
    mxv_generic::<AM, MO, bool, bool, T1, T2, TO>(
        u,
        None,
        a,
        v,
        None,
        add,
        mul,
        T1::default(),
        descr,
        descr.contains(Descriptor::TRANSPOSE_MATRIX),
    )
}

/// `u <- u (+) (v A)`: the row-vector form, i.e. `A` transposed.
pub fn vxm<AM, MO, T1, T2, TO>(
    u: &mut SparseVector<TO>,
    v: &SparseVector<T2>,
    a: &SparseMatrix<T1>,
    ring: &Semiring<AM, MO>,
    descr: Descriptor,
) -> Result<()>
where
    AM: Monoid<Elem = TO> + Send + Sync,
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO> + Send + Sync,
    T1: Copy + Default + Send + Sync,
    T2: Copy + Default + IndexValue + Send + Sync,
    TO: Copy + Default + PartialEq + Send + Sync,
{
    vxm_masked::<AM, MO, bool, bool, T1, T2, TO>(u, None, v, None, a, ring, descr)
}

/// `u <- u (+) (v A)` with optional output and input masks.
pub fn vxm_masked<AM, MO, MU, MV, T1, T2, TO>(
    u: &mut SparseVector<TO>,
    u_mask: Option<&SparseVector<MU>>,
    v: &SparseVector<T2>,
    v_mask: Option<&SparseVector<MV>>,
    a: &SparseMatrix<T1>,
    ring: &Semiring<AM, MO>,
    descr: Descriptor,
) -> Result<()>
where
    AM: Monoid<Elem = TO> + Send + Sync,
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO> + Send + Sync,
    MU: Copy + Default + MaskValue + Send + Sync,
    MV: Copy + Default + MaskValue + Send + Sync,
    T1: Copy + Default + Send + Sync,
    T2: Copy + Default + IndexValue + Send + Sync,
    TO: Copy + Default + PartialEq + Send + Sync,
{
    mxv_generic(
        u,
        u_mask,
        a,
        v,
        v_mask,
        ring.additive(),
        ring.multiplicative(),
        ring.one_left(),
        descr,
        !descr.contains(Descriptor::TRANSPOSE_MATRIX),
    )
}

/// Fold the admitted products of effective row `i` into an accumulator.
///
/// Returns the accumulator when it is to be written: either it moved off
/// the additive identity, or explicit zeroes were requested and at least
/// one product contributed.
#[allow(clippy::too_many_arguments)]
fn accumulate_row<AM, MO, MV, T1, T2, TO>(
    i: usize,
    a_raw: &CompressedStorage<T1>,
    v_values: &[T2],
    v_coords: &Coordinates,
    v_mask: Option<(&Coordinates, &[MV])>,
    add: &AM,
    mul: &MO,
    sub1: T1,
    descr: Descriptor,
    cols_eff: usize,
) -> Option<TO>
where
    AM: Monoid<Elem = TO>,
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO>,
    MV: Copy + Default + MaskValue,
    T1: Copy + Default,
    T2: Copy + Default + IndexValue,
    TO: Copy + Default + PartialEq,
{
    let use_index = descr.contains(Descriptor::USE_INDEX);
    let mut acc = add.identity();
    let mut contributed = false;
    for (j, a_val) in a_raw.major_iter(i, sub1) {
        if let Some((coords, values)) = v_mask {
            if !coords.mask(descr, j, Some(values)) {
                continue;
            }
        }
        if !v_coords.assigned(j) {
            continue;
        }
        let x = if use_index {
            T2::from_index(j)
        } else {
            v_values[j]
        };
        add.fold(&mut acc, mul.apply(a_val, x));
        contributed = true;
    }
    if descr.contains(Descriptor::ADD_IDENTITY) && i < cols_eff && v_coords.assigned(i) {
        let admitted = match v_mask {
            Some((coords, values)) => coords.mask(descr, i, Some(values)),
            None => true,
        };
        if admitted {
            let x = if use_index {
                T2::from_index(i)
            } else {
                v_values[i]
            };
            add.fold(&mut acc, mul.apply(sub1, x));
            contributed = true;
        }
    }
    if !contributed {
        return None;
    }
    if acc == add.identity() && !descr.contains(Descriptor::EXPLICIT_ZERO) {
        return None;
    }
    Some(acc)
}

#[allow(clippy::too_many_arguments)]
fn mxv_generic<AM, MO, MU, MV, T1, T2, TO>(
    u: &mut SparseVector<TO>,
    u_mask: Option<&SparseVector<MU>>,
    a: &SparseMatrix<T1>,
    v: &SparseVector<T2>,
    v_mask: Option<&SparseVector<MV>>,
    add: &AM,
    mul: &MO,
    sub1: T1,
    descr: Descriptor,
    transpose: bool,
) -> Result<()>
where
    AM: Monoid<Elem = TO> + Send + Sync,
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO> + Send + Sync,
    MU: Copy + Default + MaskValue + Send + Sync,
    MV: Copy + Default + MaskValue + Send + Sync,
    T1: Copy + Default + Send + Sync,
    T2: Copy + Default + IndexValue + Send + Sync,
    TO: Copy + Default + PartialEq + Send + Sync,
{
    let (rows_eff, cols_eff) = if transpose {
        (a.ncols(), a.nrows())
    } else {
        (a.nrows(), a.ncols())
    };
    if u.size() != rows_eff || v.size() != cols_eff {
        return Err(Error::Mismatch);
    }
    if let Some(mask) = u_mask {
        if mask.size() != rows_eff {
            return Err(Error::Mismatch);
        }
    }
    if let Some(mask) = v_mask {
        if mask.size() != cols_eff {
            return Err(Error::Mismatch);
        }
    }
    if rows_eff == 0 || cols_eff == 0 {
        return Ok(());
    }
    let a_raw = if transpose { a.ccs() } else { a.crs() };
    let v_mask_parts = v_mask.map(|m| (m.coords(), m.values()));
    let v_values = v.values();
    let v_coords = v.coords();

    let team = buffer::manager()
        .params()
        .thread_count_for(a.nnz())
        .min(rows_eff)
        .max(1);
    debug!(
        "mxv: {} effective rows, transpose {}, team {}",
        rows_eff, transpose, team
    );

    let (u_values, u_coords) = u.parts_mut();
    if team == 1 {
        for i in 0..rows_eff {
            if let Some(mask) = u_mask {
                if !mask.coords().mask(descr, i, Some(mask.values())) {
                    continue;
                }
            }
            if let Some(acc) = accumulate_row(
                i, a_raw, v_values, v_coords, v_mask_parts, add, mul, sub1, descr, cols_eff,
            ) {
                if u_coords.assign(i) {
                    add.fold(&mut u_values[i], acc);
                } else {
                    u_values[i] = acc;
                }
            }
        }
        return Ok(());
    }

    // Parallel: chunks own disjoint ranges of the output value array;
    // support insertions go through thread-local updates merged below.
    let chunk = rows_eff.div_ceil(team);
    let shared_coords: &Coordinates = u_coords;
    let mut updates: Vec<_> = u_values[..rows_eff]
        .par_chunks_mut(chunk)
        .enumerate()
        .map(|(t, values_chunk)| {
            let base = t * chunk;
            let mut update = shared_coords.make_update();
            for (local, slot) in values_chunk.iter_mut().enumerate() {
                let i = base + local;
                if let Some(mask) = u_mask {
                    if !mask.coords().mask(descr, i, Some(mask.values())) {
                        continue;
                    }
                }
                if let Some(acc) = accumulate_row(
                    i, a_raw, v_values, v_coords, v_mask_parts, add, mul, sub1, descr, cols_eff,
                ) {
                    if shared_coords.async_assign(i, &mut update) {
                        *slot = add.apply(*slot, acc);
                    } else {
                        *slot = acc;
                    }
                }
            }
            update
        })
        .collect();
    for update in updates.iter_mut() {
        u_coords.join_update(update);
    }
    Ok(())
}
