//! Element-wise primitives, selection, reductions, zip, and outer
//!
//! The element-wise matrix apply follows the two-phase discipline of the
//! multiply kernel: a symbolic count per output row, the capacity check
//! for the requested phase, then a numeric fill and a counting-sort
//! regeneration of the column-compressed half. The output pattern is the
//! union of the input patterns under a monoid and their intersection
//! under a plain operator.
//!
//! `zip` interprets three equally supported vectors as (row, column,
//! value) triples and assembles both compressed views in one fused
//! counting sort; `outer` builds an `m x 1` and a `1 x n` matrix from
//! its vector inputs and dispatches through the multiply engine.

use log::debug;
use num_traits::{Num, ToPrimitive};

use crate::algebra::{BinaryOperator, Monoid, Plus, Semiring};
use crate::buffer;
use crate::coordinates::MaskValue;
use crate::descriptor::{Descriptor, Phase};
use crate::error::{Error, Result};
use crate::ingest::build_matrix_unique;
use crate::matrix::SparseMatrix;
use crate::mxm::mxm_with;
use crate::storage::rebuild_minor;
use crate::vector::SparseVector;

/// `C <- A (+) B` element-wise under a monoid; the output pattern is the
/// union of the input patterns.
pub fn ewise_apply_monoid<M, T>(
    c: &mut SparseMatrix<T>,
    a: &SparseMatrix<T>,
    b: &SparseMatrix<T>,
    monoid: &M,
    descr: Descriptor,
    phase: Phase,
) -> Result<()>
where
    M: Monoid<Elem = T>,
    T: Copy + Default,
{
    ewise_union(c, a, b, &|x: T, y: T| monoid.apply(x, y), descr, phase)
}

/// `C <- A op B` element-wise under a plain operator; the output pattern
/// is the intersection of the input patterns.
pub fn ewise_apply_op<MO, T1, T2, TO>(
    c: &mut SparseMatrix<TO>,
    a: &SparseMatrix<T1>,
    b: &SparseMatrix<T2>,
    op: &MO,
    descr: Descriptor,
    phase: Phase,
) -> Result<()>
where
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO>,
    T1: Copy + Default,
    T2: Copy + Default,
    TO: Copy + Default,
{
    if a.is_pattern() || b.is_pattern() {
        return Err(Error::Illegal);
    }
    if c.nrows() != a.nrows()
        || c.ncols() != a.ncols()
        || a.nrows() != b.nrows()
        || a.ncols() != b.ncols()
    {
        return Err(Error::Mismatch);
    }
    if phase == Phase::Try {
        return Err(Error::Unsupported);
    }
    let (m, n) = (c.nrows(), c.ncols());
    c.clear();
    if m == 0 || n == 0 {
        return Ok(());
    }

    // Symbolic: per-row intersection sizes via the output's accumulator.
    let mut required = 0usize;
    {
        let parts = c.parts_mut();
        let spa = &mut parts.spa_cols.coords;
        for i in 0..m {
            spa.clear();
            for k in a.crs().range(i) {
                spa.assign(a.crs().index(k));
            }
            for k in b.crs().range(i) {
                if spa.assigned(b.crs().index(k)) {
                    required += 1;
                }
            }
        }
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

    // Numeric: mark A's row with values in local scratch, emit on hits
    // from B.
    let mut a_scratch = vec![T1::default(); n];
    let parts = c.parts_mut();
    let spa = &mut parts.spa_cols.coords;
    let mut nzc = 0usize;
    parts.crs.offsets[0] = 0;
    for i in 0..m {
        spa.clear();
        for (j, v) in a.crs().major_iter(i, T1::default()) {
            spa.assign(j);
            a_scratch[j] = v;
        }
        for (j, w) in b.crs().major_iter(i, T2::default()) {
            if spa.assigned(j) {
                parts.crs.record_value(nzc, j, op.apply(a_scratch[j], w));
                nzc += 1;
            }
        }
        parts.crs.offsets[i + 1] = nzc;
    }
    *parts.nz = nzc;
    finish_minor(parts, m, n, descr);
    Ok(())
}

/// Union-pattern kernel backing the monoid form.
fn ewise_union<T>(
    c: &mut SparseMatrix<T>,
    a: &SparseMatrix<T>,
    b: &SparseMatrix<T>,
    fold: &dyn Fn(T, T) -> T,
    descr: Descriptor,
    phase: Phase,
) -> Result<()>
where
    T: Copy + Default,
{
    if a.is_pattern() || b.is_pattern() {
        return Err(Error::Illegal);
    }
    if c.nrows() != a.nrows()
        || c.ncols() != a.ncols()
        || a.nrows() != b.nrows()
        || a.ncols() != b.ncols()
    {
        return Err(Error::Mismatch);
    }
    if phase == Phase::Try {
        return Err(Error::Unsupported);
    }
    let (m, n) = (c.nrows(), c.ncols());
    c.clear();
    if m == 0 || n == 0 {
        return Ok(());
    }
    debug!("ewise union: {}x{}, phase {:?}", m, n, phase);

    let mut required = 0usize;
    {
        let parts = c.parts_mut();
        let spa = &mut parts.spa_cols.coords;
        for i in 0..m {
            spa.clear();
            for k in a.crs().range(i) {
                spa.assign(a.crs().index(k));
            }
            for k in b.crs().range(i) {
                spa.assign(b.crs().index(k));
            }
            required += spa.nonzeroes();
        }
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

    let parts = c.parts_mut();
    let spa = &mut *parts.spa_cols;
    let mut nzc = 0usize;
    parts.crs.offsets[0] = 0;
    for i in 0..m {
        spa.coords.clear();
        for (j, v) in a.crs().major_iter(i, T::default()) {
            spa.coords.assign(j);
            spa.values[j] = v;
        }
        for (j, w) in b.crs().major_iter(i, T::default()) {
            if spa.coords.assign(j) {
                spa.values[j] = fold(spa.values[j], w);
            } else {
                spa.values[j] = w;
            }
        }
        for k in 0..spa.coords.nonzeroes() {
            let j = spa.coords.index(k);
            parts.crs.record_value(nzc, j, spa.values[j]);
            nzc += 1;
        }
        parts.crs.offsets[i + 1] = nzc;
    }
    *parts.nz = nzc;
    finish_minor(parts, m, n, descr);
    Ok(())
}

/// Regenerate or drop the column view per the storage directive.
fn finish_minor<T: Copy + Default>(
    parts: crate::matrix::MatrixParts<'_, T>,
    m: usize,
    n: usize,
    descr: Descriptor,
) {
    if descr.contains(Descriptor::FORCE_ROW_MAJOR) {
        parts.ccs.clear();
    } else {
        rebuild_minor(parts.crs, parts.ccs, m, n);
    }
}

/// `w <- a (+) b` element-wise on vectors; union pattern.
pub fn ewise_apply_vector_monoid<M, T>(
    w: &mut SparseVector<T>,
    a: &SparseVector<T>,
    b: &SparseVector<T>,
    monoid: &M,
) -> Result<()>
where
    M: Monoid<Elem = T>,
    T: Copy + Default,
{
    if w.size() != a.size() || a.size() != b.size() {
        return Err(Error::Mismatch);
    }
    w.clear();
    let (values, coords) = w.parts_mut();
    for (i, v) in a.iter() {
        values[i] = v;
        coords.assign(i);
    }
    for (i, v) in b.iter() {
        if coords.assign(i) {
            values[i] = monoid.apply(values[i], v);
        } else {
            values[i] = v;
        }
    }
    Ok(())
}

/// `w <- a op b` element-wise on vectors; intersection pattern.
pub fn ewise_apply_vector_op<MO, T1, T2, TO>(
    w: &mut SparseVector<TO>,
    a: &SparseVector<T1>,
    b: &SparseVector<T2>,
    op: &MO,
) -> Result<()>
where
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO>,
    T1: Copy + Default,
    T2: Copy + Default,
    TO: Copy + Default,
{
    if w.size() != a.size() || a.size() != b.size() {
        return Err(Error::Mismatch);
    }
    w.clear();
    let (values, coords) = w.parts_mut();
    for (i, x) in a.iter() {
        if let Some(y) = b.get(i) {
            values[i] = op.apply(x, y);
            coords.assign(i);
        }
    }
    Ok(())
}

/// Filter a matrix by a predicate over `(row, col, value)`.
///
/// Kept entries preserve the input's row-major layout; the column view
/// is regenerated in one prefix-sum pass. Pattern inputs present their
/// default value to the predicate.
pub fn select<T, F>(
    c: &mut SparseMatrix<T>,
    a: &SparseMatrix<T>,
    pred: F,
    descr: Descriptor,
    phase: Phase,
) -> Result<()>
where
    T: Copy + Default,
    F: Fn(usize, usize, &T) -> bool,
{
    if c.nrows() != a.nrows() || c.ncols() != a.ncols() {
        return Err(Error::Mismatch);
    }
    if phase == Phase::Try {
        return Err(Error::Unsupported);
    }
    let (m, n) = (c.nrows(), c.ncols());
    c.clear();
    if m == 0 || n == 0 {
        return Ok(());
    }

    let mut required = 0usize;
    for i in 0..m {
        for (j, v) in a.crs().major_iter(i, T::default()) {
            if pred(i, j, &v) {
                required += 1;
            }
        }
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

    let parts = c.parts_mut();
    let mut nzc = 0usize;
    parts.crs.offsets[0] = 0;
    for i in 0..m {
        for (j, v) in a.crs().major_iter(i, T::default()) {
            if pred(i, j, &v) {
                parts.crs.record_value(nzc, j, v);
                nzc += 1;
            }
        }
        parts.crs.offsets[i + 1] = nzc;
    }
    *parts.nz = nzc;
    finish_minor(parts, m, n, descr);
    Ok(())
}

/// Whether the mask admits position `(i, j)`, given the mask row marked
/// in `spa`.
fn fold_admits<MT>(
    mask: Option<&SparseMatrix<MT>>,
    spa: &crate::coordinates::Coordinates,
    descr: Descriptor,
    j: usize,
) -> bool
where
    MT: Copy + Default + MaskValue,
{
    match mask {
        None => true,
        Some(_) => spa.assigned(j) != descr.contains(Descriptor::INVERT_MASK),
    }
}

fn mark_mask_row<MT>(
    spa: &mut crate::coordinates::Coordinates,
    mask: &SparseMatrix<MT>,
    descr: Descriptor,
    i: usize,
) where
    MT: Copy + Default + MaskValue,
{
    spa.clear();
    let structural = descr.contains(Descriptor::STRUCTURAL);
    for (j, v) in mask.crs().major_iter(i, MT::default()) {
        if structural || mask.is_pattern() || v.is_true() {
            spa.assign(j);
        }
    }
}

/// Fold all (mask-admitted) nonzero values of a matrix into `x` from the
/// left: `x <- op(x, value)` per entry, in unspecified order.
pub fn foldl_matrix<M, T, MT>(
    x: &mut T,
    a: &SparseMatrix<T>,
    mask: Option<&SparseMatrix<MT>>,
    monoid: &M,
    descr: Descriptor,
) -> Result<()>
where
    M: Monoid<Elem = T>,
    T: Copy + Default,
    MT: Copy + Default + MaskValue,
{
    fold_matrix_generic(x, a, mask, &|acc: T, v: T| monoid.apply(acc, v), None, descr)
}

/// Fold all (mask-admitted) nonzero values of a matrix into `x` from the
/// right: `x <- op(value, x)` per entry.
pub fn foldr_matrix<M, T, MT>(
    x: &mut T,
    a: &SparseMatrix<T>,
    mask: Option<&SparseMatrix<MT>>,
    monoid: &M,
    descr: Descriptor,
) -> Result<()>
where
    M: Monoid<Elem = T>,
    T: Copy + Default,
    MT: Copy + Default + MaskValue,
{
    fold_matrix_generic(x, a, mask, &|acc: T, v: T| monoid.apply(v, acc), None, descr)
}

/// Fold under a semiring's additive monoid. Pattern matrices contribute
/// the multiplicative identity per nonzero, and
/// [`Descriptor::ADD_IDENTITY`] injects one `one` per admitted diagonal
/// index.
pub fn foldl_matrix_semiring<AM, MO, T, MT>(
    x: &mut T,
    a: &SparseMatrix<T>,
    mask: Option<&SparseMatrix<MT>>,
    ring: &Semiring<AM, MO>,
    descr: Descriptor,
) -> Result<()>
where
    AM: Monoid<Elem = T>,
    MO: BinaryOperator<Out = T>,
    T: Copy + Default,
    MT: Copy + Default + MaskValue,
{
    let add = *ring.additive();
    fold_matrix_generic(
        x,
        a,
        mask,
        &move |acc: T, v: T| add.apply(acc, v),
        Some(ring.one()),
        descr,
    )
}

fn fold_matrix_generic<T, MT>(
    x: &mut T,
    a: &SparseMatrix<T>,
    mask: Option<&SparseMatrix<MT>>,
    fold: &dyn Fn(T, T) -> T,
    identity_injection: Option<T>,
    descr: Descriptor,
) -> Result<()>
where
    T: Copy + Default,
    MT: Copy + Default + MaskValue,
{
    if let Some(mask) = mask {
        if mask.nrows() != a.nrows() || mask.ncols() != a.ncols() {
            return Err(Error::Mismatch);
        }
    }
    if a.is_pattern() && identity_injection.is_none() {
        return Err(Error::Illegal);
    }
    let (m, n) = (a.nrows(), a.ncols());
    if m == 0 || n == 0 {
        return Ok(());
    }
    let substitute = identity_injection.unwrap_or_default();
    let manager = buffer::manager();
    let mut spa = manager.lease_spa(n)?;
    let mut acc = *x;
    for i in 0..m {
        if let Some(mask) = mask {
            mark_mask_row(&mut spa, mask, descr, i);
        }
        for (j, v) in a.crs().major_iter(i, substitute) {
            if fold_admits(mask, &spa, descr, j) {
                acc = fold(acc, v);
            }
        }
        if descr.contains(Descriptor::ADD_IDENTITY) && i < n {
            if let Some(one) = identity_injection {
                if fold_admits(mask, &spa, descr, i) {
                    acc = fold(acc, one);
                }
            }
        }
    }
    *x = acc;
    manager.return_spa(spa);
    Ok(())
}

/// Fold the assigned values of a vector into `x` from the left.
pub fn foldl_vector<M, T>(x: &mut T, v: &SparseVector<T>, monoid: &M) -> Result<()>
where
    M: Monoid<Elem = T>,
    T: Copy + Default,
{
    for (_, value) in v.iter() {
        monoid.fold(x, value);
    }
    Ok(())
}

/// The semiring dot product: fold `u[i] (x) v[i]` over the intersection
/// of the supports into `x` under the additive monoid.
pub fn dot<AM, MO, T1, T2, TO>(
    x: &mut TO,
    u: &SparseVector<T1>,
    v: &SparseVector<T2>,
    ring: &Semiring<AM, MO>,
) -> Result<()>
where
    AM: Monoid<Elem = TO>,
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO>,
    T1: Copy + Default,
    T2: Copy + Default,
    TO: Copy + Default,
{
    if u.size() != v.size() {
        return Err(Error::Mismatch);
    }
    // Walk the smaller support, probe the other side.
    let mut acc = *x;
    if u.nnz() <= v.nnz() {
        for (i, a) in u.iter() {
            if let Some(b) = v.get(i) {
                ring.additive().fold(&mut acc, ring.mul(a, b));
            }
        }
    } else {
        for (i, b) in v.iter() {
            if let Some(a) = u.get(i) {
                ring.additive().fold(&mut acc, ring.mul(a, b));
            }
        }
    }
    *x = acc;
    Ok(())
}

/// Assemble a matrix from three equally supported vectors of row
/// indices, column indices, and values.
///
/// The supports must agree exactly; the assembly is one fused counting
/// sort filling both compressed views. Insufficient capacity clears the
/// output and fails.
pub fn zip<T, I, J>(
    a: &mut SparseMatrix<T>,
    x: &SparseVector<I>,
    y: &SparseVector<J>,
    z: &SparseVector<T>,
) -> Result<()>
where
    T: Copy + Default,
    I: Copy + Default + ToPrimitive,
    J: Copy + Default + ToPrimitive,
{
    if x.size() != y.size() || y.size() != z.size() {
        return Err(Error::Mismatch);
    }
    if x.nnz() != y.nnz() || y.nnz() != z.nnz() {
        return Err(Error::Illegal);
    }
    for (i, _) in x.iter() {
        if y.get(i).is_none() || z.get(i).is_none() {
            return Err(Error::Illegal);
        }
    }
    let (m, n) = (a.nrows(), a.ncols());
    let nz = x.nnz();
    a.clear();
    if nz == 0 {
        return Ok(());
    }

    // Resolve and validate the triples before any write.
    let mut triples = Vec::with_capacity(nz);
    for (i, row_val) in x.iter() {
        let row = row_val.to_usize().ok_or(Error::Mismatch)?;
        let col = y
            .get(i)
            .and_then(|c| c.to_usize())
            .ok_or(Error::Mismatch)?;
        if row >= m || col >= n {
            return Err(Error::Mismatch);
        }
        let value = z.get(i).ok_or(Error::Illegal)?;
        triples.push((row, col, value));
    }
    if nz > a.capacity() {
        return Err(Error::Failed);
    }

    // Counting sort, phase one: row and column counts.
    let parts = a.parts_mut();
    for &(row, col, _) in &triples {
        parts.crs.offsets[row] += 1;
        parts.ccs.offsets[col] += 1;
    }
    for i in 1..m {
        parts.crs.offsets[i] += parts.crs.offsets[i - 1];
    }
    parts.crs.offsets[m] = parts.crs.offsets[m - 1];
    for j in 1..n {
        parts.ccs.offsets[j] += parts.ccs.offsets[j - 1];
    }
    parts.ccs.offsets[n] = parts.ccs.offsets[n - 1];

    // Phase two: scatter with pre-decrement into both views.
    for &(row, col, value) in &triples {
        parts.crs.offsets[row] -= 1;
        let crs_pos = parts.crs.offsets[row];
        parts.crs.record_value(crs_pos, col, value);
        parts.ccs.offsets[col] -= 1;
        let ccs_pos = parts.ccs.offsets[col];
        parts.ccs.record_value(ccs_pos, row, value);
    }
    *parts.nz = nz;
    Ok(())
}

/// The outer product `C <- u (x) v^T` restricted to the supports of `u`
/// and `v`.
///
/// Forms an `m x 1` and a `1 x n` matrix and dispatches through the
/// multiply engine. The output is cleared first; products never collide,
/// so any additive monoid would do and the conventional one is used.
pub fn outer<MO, T1, T2, TO>(
    c: &mut SparseMatrix<TO>,
    u: &SparseVector<T1>,
    v: &SparseVector<T2>,
    mul: &MO,
    phase: Phase,
) -> Result<()>
where
    MO: BinaryOperator<Left = T1, Right = T2, Out = TO> + Send + Sync,
    T1: Copy + Default + Send + Sync,
    T2: Copy + Default + Send + Sync,
    TO: Copy + Default + Num + Send + Sync,
{
    if c.nrows() != u.size() || c.ncols() != v.size() {
        return Err(Error::Mismatch);
    }
    let m = u.size();
    let n = v.size();
    if m == 0 || n == 0 {
        return Ok(());
    }
    let mut left = SparseMatrix::<T1>::with_capacity(m, 1, u.nnz().min(m))?;
    build_matrix_unique(&mut left, u.iter().map(|(i, val)| (i, 0, val)))?;
    let mut right = SparseMatrix::<T2>::with_capacity(1, n, v.nnz().min(n))?;
    build_matrix_unique(&mut right, v.iter().map(|(j, val)| (0, j, val)))?;
    c.clear();
    mxm_with(
        c,
        &left,
        &right,
        &Plus::<TO>::new(),
        mul,
        Descriptor::NO_OPERATION,
        phase,
    )
}
