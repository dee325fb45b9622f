//! The sparse vector container
//!
//! A [`SparseVector`] is a length-`n` dense value array paired with a
//! [`Coordinates`] support. Assignment writes the value array and marks
//! the support; clearing resets only the support, in O(|support|) work.
//! Vectors share the container identity contract of matrices.

use log::trace;

use crate::buffer;
use crate::config::MAX_COLS;
use crate::coordinates::{Coordinates, MaskValue};
use crate::descriptor::Descriptor;
use crate::error::{Error, Result};

/// A sparse vector of length `n` over element type `T`.
pub struct SparseVector<T> {
    values: Vec<T>,
    coords: Coordinates,
    id: u64,
}

impl<T: Copy + Default> SparseVector<T> {
    /// An empty vector of length `n`.
    pub fn new(n: usize) -> Result<Self> {
        if n > MAX_COLS {
            return Err(Error::Overflow);
        }
        buffer::manager().reserve_for_container(1, n, std::mem::size_of::<T>())?;
        trace!("new length-{} vector", n);
        Ok(Self {
            values: vec![T::default(); n],
            coords: Coordinates::new(n),
            id: buffer::next_container_id(),
        })
    }

    /// The length of the vector.
    #[inline]
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// The number of assigned entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.coords.nonzeroes()
    }

    /// The container identity: stable from construction to destruction
    /// and unique among live containers.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove all entries; O(|support|) work.
    pub fn clear(&mut self) {
        self.coords.clear();
    }

    /// Assign `value` to index `i`.
    pub fn set_element(&mut self, i: usize, value: T) -> Result<()> {
        if i >= self.size() {
            return Err(Error::Mismatch);
        }
        self.values[i] = value;
        self.coords.assign(i);
        Ok(())
    }

    /// The value at index `i`, if assigned.
    pub fn get(&self, i: usize) -> Option<T> {
        if i < self.size() && self.coords.assigned(i) {
            Some(self.values[i])
        } else {
            None
        }
    }

    /// Iterate over the assigned entries as `(index, value)` pairs, in
    /// unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, T)> + Clone + '_ {
        self.coords.iter().map(move |i| (i, self.values[i]))
    }

    /// The dense value backing. Entries outside the support hold stale
    /// or default data.
    #[inline]
    pub(crate) fn values(&self) -> &[T] {
        &self.values
    }

    /// The support of the vector.
    #[inline]
    pub(crate) fn coords(&self) -> &Coordinates {
        &self.coords
    }

    /// Split the container into independently borrowed kernel parts.
    pub(crate) fn parts_mut(&mut self) -> (&mut [T], &mut Coordinates) {
        (&mut self.values, &mut self.coords)
    }
}

/// Assign `value` to every index a mask admits.
///
/// The mask is interpreted per [`Coordinates::mask`]: structurally or by
/// value, optionally inverted. The operation is idempotent.
pub fn set_masked<T, M>(
    v: &mut SparseVector<T>,
    mask: &SparseVector<M>,
    value: T,
    descr: Descriptor,
) -> Result<()>
where
    T: Copy + Default,
    M: Copy + Default + MaskValue,
{
    if v.size() != mask.size() {
        return Err(Error::Mismatch);
    }
    let inverted = descr.contains(Descriptor::INVERT_MASK);
    let (values, coords) = v.parts_mut();
    if inverted {
        // The admitted set is a complement; scan the whole domain.
        for i in 0..values.len() {
            if mask.coords().mask(descr, i, Some(mask.values())) {
                values[i] = value;
                coords.assign(i);
            }
        }
    } else {
        for i in mask.coords().iter() {
            if mask.coords().mask(descr, i, Some(mask.values())) {
                values[i] = value;
                coords.assign(i);
            }
        }
    }
    Ok(())
}

impl<T: Copy + Default> Clone for SparseVector<T> {
    /// Duplicate contents; the copy receives a fresh identity.
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
            coords: self.coords.clone(),
            id: buffer::next_container_id(),
        }
    }
}

impl<T> Drop for SparseVector<T> {
    fn drop(&mut self) {
        buffer::release_container_id(self.id);
    }
}

impl<T: std::fmt::Debug + Copy + Default> std::fmt::Debug for SparseVector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SparseVector(n = {}, nnz = {}, [", self.size(), self.nnz())?;
        for (count, (i, v)) in self.iter().enumerate() {
            if count == 5 {
                write!(f, " ...")?;
                break;
            }
            write!(f, " {}: {:?}", i, v)?;
        }
        write!(f, " ])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_roundtrip() {
        let mut v = SparseVector::<f64>::new(10).unwrap();
        assert_eq!(v.nnz(), 0);
        v.set_element(3, 1.5).unwrap();
        v.set_element(7, 2.5).unwrap();
        assert_eq!(v.get(3), Some(1.5));
        assert_eq!(v.get(4), None);
        assert_eq!(v.nnz(), 2);
        assert_eq!(v.set_element(10, 0.0).unwrap_err(), Error::Mismatch);
    }

    #[test]
    fn clear_resets_support_only() {
        let mut v = SparseVector::<f64>::new(100).unwrap();
        v.set_element(42, 9.0).unwrap();
        v.clear();
        assert_eq!(v.nnz(), 0);
        assert_eq!(v.get(42), None);
        v.set_element(42, 1.0).unwrap();
        assert_eq!(v.get(42), Some(1.0));
    }

    #[test]
    fn masked_set_is_idempotent() {
        let mut mask = SparseVector::<bool>::new(5).unwrap();
        mask.set_element(1, true).unwrap();
        mask.set_element(3, true).unwrap();

        let mut v = SparseVector::<f64>::new(5).unwrap();
        set_masked(&mut v, &mask, 7.0, Descriptor::NO_OPERATION).unwrap();
        assert_eq!(v.nnz(), 2);
        assert_eq!(v.get(1), Some(7.0));
        assert_eq!(v.get(3), Some(7.0));
        assert_eq!(v.get(0), None);

        // A second identical call changes nothing.
        set_masked(&mut v, &mask, 7.0, Descriptor::NO_OPERATION).unwrap();
        assert_eq!(v.nnz(), 2);
        assert_eq!(v.get(1), Some(7.0));
    }

    #[test]
    fn masked_set_respects_value_and_inversion() {
        let mut mask = SparseVector::<i32>::new(4).unwrap();
        mask.set_element(0, 1).unwrap();
        mask.set_element(1, 0).unwrap(); // present but false-like

        let mut v = SparseVector::<f64>::new(4).unwrap();
        set_masked(&mut v, &mask, 1.0, Descriptor::NO_OPERATION).unwrap();
        assert_eq!(v.get(0), Some(1.0));
        assert_eq!(v.get(1), None);

        let mut w = SparseVector::<f64>::new(4).unwrap();
        set_masked(&mut w, &mask, 1.0, Descriptor::STRUCTURAL_COMPLEMENT).unwrap();
        assert_eq!(w.get(0), None);
        assert_eq!(w.get(1), None);
        assert_eq!(w.get(2), Some(1.0));
        assert_eq!(w.get(3), Some(1.0));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mask = SparseVector::<bool>::new(3).unwrap();
        let mut v = SparseVector::<f64>::new(4).unwrap();
        assert_eq!(
            set_masked(&mut v, &mask, 1.0, Descriptor::NO_OPERATION).unwrap_err(),
            Error::Mismatch
        );
    }

    #[test]
    fn clone_gets_fresh_identity() {
        let v = SparseVector::<f64>::new(3).unwrap();
        let w = v.clone();
        assert_ne!(v.id(), w.id());
    }
}
