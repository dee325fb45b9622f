//! Shared mutable slices for disjoint parallel scatter
//!
//! Counting-sort scatter phases place entries at positions that are
//! disjoint across threads by construction of their prefix sums, but not
//! contiguous per thread, so the safe slice-splitting primitives do not
//! apply. [`SharedSlice`] provides unchecked concurrent writes for this
//! one pattern.

use std::marker::PhantomData;

/// A raw view of a mutable slice that may be written from several
/// threads at once.
///
/// Every write position must be claimed by exactly one thread per scatter
/// phase; the caller's prefix-sum layout is what establishes that.
pub(crate) struct SharedSlice<'a, T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a mut [T]>,
}

unsafe impl<T: Send> Send for SharedSlice<'_, T> {}
unsafe impl<T: Send> Sync for SharedSlice<'_, T> {}

impl<'a, T> SharedSlice<'a, T> {
    pub(crate) fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    /// Write `value` to position `i`.
    ///
    /// # Safety
    ///
    /// No other thread may read or write position `i` during the
    /// lifetime of this view, and `i` must be in bounds.
    #[inline]
    pub(crate) unsafe fn write(&self, i: usize, value: T) {
        debug_assert!(i < self.len);
        *self.ptr.add(i) = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn disjoint_parallel_writes() {
        let mut data = vec![0usize; 1024];
        {
            let shared = SharedSlice::new(&mut data);
            let shared = &shared;
            // Four threads write interleaved, disjoint positions.
            (0..4usize).into_par_iter().for_each(|t| {
                for i in (t..1024).step_by(4) {
                    unsafe { shared.write(i, i * 10) };
                }
            });
        }
        for (i, &x) in data.iter().enumerate() {
            assert_eq!(x, i * 10);
        }
    }
}
