//! Sparse accumulator (SPA) support tracking
//!
//! [`Coordinates`] tracks the support of a length-`n` sparse object with
//! O(1) membership tests, O(1) insertion, and O(|support|) iteration and
//! reset, without ever scanning all `n` positions. It is the workhorse
//! scratch structure of every kernel in the crate: a bit-array provides
//! membership, a stack of assigned indices provides enumeration.
//!
//! The bit-array is stored as atomic words so that a parallel team may
//! record insertions concurrently through [`Coordinates::async_assign`];
//! the per-thread [`CoordinatesUpdate`] records are merged serially by
//! [`Coordinates::join_update`], which is the only synchronisation point.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::MAX_ASYNC_ASSIGNS;
use crate::descriptor::Descriptor;

const WORD_BITS: usize = 64;

/// Interpretation of container values when a container is used as a mask.
///
/// A mask entry admits an index when its value is "true-like"; structural
/// masks ignore values entirely.
pub trait MaskValue: Copy {
    /// Whether the value admits its index under a value-interpreted mask.
    fn is_true(&self) -> bool;
}

impl MaskValue for bool {
    #[inline]
    fn is_true(&self) -> bool {
        *self
    }
}

macro_rules! numeric_mask_value {
    ($($t:ty),*) => {
        $(
            impl MaskValue for $t {
                #[inline]
                fn is_true(&self) -> bool {
                    *self != (0 as $t)
                }
            }
        )*
    };
}

numeric_mask_value!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);

/// A bounded record of insertions made by one thread between two
/// synchronisation points.
///
/// Obtained from [`Coordinates::make_update`]; consumed by
/// [`Coordinates::join_update`].
#[derive(Debug, Default)]
pub struct CoordinatesUpdate {
    indices: Vec<usize>,
}

impl CoordinatesUpdate {
    /// The number of insertions recorded and not yet joined.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether no insertions are pending.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// The support of a length-`n` sparse object.
#[derive(Debug)]
pub struct Coordinates {
    n: usize,
    bits: Vec<AtomicU64>,
    stack: Vec<usize>,
}

impl Coordinates {
    /// An empty support over `0..n`.
    pub fn new(n: usize) -> Self {
        let words = n.div_ceil(WORD_BITS);
        let mut bits = Vec::with_capacity(words);
        bits.resize_with(words, || AtomicU64::new(0));
        Self {
            n,
            bits,
            stack: Vec::with_capacity(n),
        }
    }

    /// The length of the index domain.
    #[inline]
    pub fn size(&self) -> usize {
        self.n
    }

    /// The number of assigned indices.
    #[inline]
    pub fn nonzeroes(&self) -> usize {
        self.stack.len()
    }

    /// Whether no index is assigned.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// The `k`-th assigned index, in insertion order.
    #[inline]
    pub fn index(&self, k: usize) -> usize {
        self.stack[k]
    }

    /// Iterate over the assigned indices in insertion order.
    #[inline]
    pub fn iter(&self) -> std::iter::Copied<std::slice::Iter<'_, usize>> {
        self.stack.iter().copied()
    }

    /// Whether index `i` is assigned.
    #[inline]
    pub fn assigned(&self, i: usize) -> bool {
        debug_assert!(i < self.n);
        let word = self.bits[i / WORD_BITS].load(Ordering::Relaxed);
        word & (1u64 << (i % WORD_BITS)) != 0
    }

    /// Mark index `i` as assigned.
    ///
    /// Returns whether `i` was already assigned before the call.
    #[inline]
    pub fn assign(&mut self, i: usize) -> bool {
        debug_assert!(i < self.n);
        let word = self.bits[i / WORD_BITS].get_mut();
        let mask = 1u64 << (i % WORD_BITS);
        if *word & mask != 0 {
            true
        } else {
            *word |= mask;
            self.stack.push(i);
            false
        }
    }

    /// Reset the support to empty in O(|support|) work.
    pub fn clear(&mut self) {
        for k in 0..self.stack.len() {
            let i = self.stack[k];
            *self.bits[i / WORD_BITS].get_mut() &= !(1u64 << (i % WORD_BITS));
        }
        self.stack.clear();
    }

    /// Rebind this support to the domain `0..n`, clearing it.
    ///
    /// Lets the buffer manager recycle accumulators across primitives
    /// with differently sized index domains; the bit-array only grows.
    pub(crate) fn resize_domain(&mut self, n: usize) {
        self.clear();
        let words = n.div_ceil(WORD_BITS);
        if words > self.bits.len() {
            self.bits.resize_with(words, || AtomicU64::new(0));
        }
        self.n = n;
    }

    /// A fresh thread-local update record for use with
    /// [`Coordinates::async_assign`].
    pub fn make_update(&self) -> CoordinatesUpdate {
        CoordinatesUpdate {
            indices: Vec::with_capacity(MAX_ASYNC_ASSIGNS),
        }
    }

    /// Concurrently mark index `i` as assigned, recording the insertion
    /// in a thread-local update.
    ///
    /// Multiple threads may call this through a shared reference; the
    /// stack is only reconciled once each update is passed to
    /// [`Coordinates::join_update`]. Returns whether `i` was already
    /// assigned (by any thread) before the call.
    #[inline]
    pub fn async_assign(&self, i: usize, update: &mut CoordinatesUpdate) -> bool {
        debug_assert!(i < self.n);
        let mask = 1u64 << (i % WORD_BITS);
        let prev = self.bits[i / WORD_BITS].fetch_or(mask, Ordering::Relaxed);
        if prev & mask != 0 {
            true
        } else {
            update.indices.push(i);
            false
        }
    }

    /// Merge a thread-local update into the shared state, consuming its
    /// contents.
    ///
    /// Returns whether the support was structurally empty before the
    /// merge, which lets callers count structural insertions.
    pub fn join_update(&mut self, update: &mut CoordinatesUpdate) -> bool {
        let was_empty = self.stack.is_empty();
        self.stack.append(&mut update.indices);
        debug_assert!(self.stack.len() <= self.n);
        was_empty
    }

    /// Evaluate index `i` against this support interpreted as a mask.
    ///
    /// `values` carries the mask's value array when the mask is to be
    /// interpreted by value; pass `None` (or set
    /// [`Descriptor::STRUCTURAL`]) for presence-only interpretation.
    /// [`Descriptor::INVERT_MASK`] flips the verdict.
    #[inline]
    pub fn mask<T: MaskValue>(&self, descr: Descriptor, i: usize, values: Option<&[T]>) -> bool {
        let structural = descr.contains(Descriptor::STRUCTURAL) || values.is_none();
        let mut admit = self.assigned(i);
        if admit && !structural {
            // `values` is Some here by the structural check above.
            admit = values.map(|v| v[i].is_true()).unwrap_or(true);
        }
        if descr.contains(Descriptor::INVERT_MASK) {
            admit = !admit;
        }
        admit
    }
}

impl Clone for Coordinates {
    fn clone(&self) -> Self {
        let bits = self
            .bits
            .iter()
            .map(|w| AtomicU64::new(w.load(Ordering::Relaxed)))
            .collect();
        Self {
            n: self.n,
            bits,
            stack: self.stack.clone(),
        }
    }
}
