//! # Magma: sparse linear algebra over arbitrary semirings
//!
//! Magma is a generalised sparse linear algebra engine in the GraphBLAS
//! tradition: sparse matrices and vectors parameterised over a
//! user-chosen algebraic structure, composed through BLAS-style
//! primitives with optional masking and descriptor-driven behaviour.
//!
//! ## Engine components
//!
//! 1. **Dual compressed storage**: every matrix maintains a
//!    row-compressed and a column-compressed view of the same nonzero
//!    set, so each primitive can traverse in the direction it wants.
//!
//! 2. **Algebra injection**: operators, monoids, and semirings are
//!    zero-sized value types whose methods inline into the kernels;
//!    swapping `(+, *)` for `(min, +)` changes the computed problem, not
//!    the code path.
//!
//! 3. **Two-phase kernels**: matrix-producing primitives first size
//!    their output symbolically, then fill it numerically. A resize-phase
//!    call grows capacity so that a subsequent execute-phase call with
//!    the same arguments is guaranteed to succeed; an execute-phase call
//!    with insufficient capacity fails cleanly, clearing its output.
//!
//! 4. **Pooled scratch**: sparse accumulators and offset buffers come
//!    from a process-wide, grow-only pool so that parallel kernels do
//!    not allocate per call.
//!
//! ## Usage
//!
//! Multiply two sparse matrices over the conventional semiring:
//!
//! ```
//! use magma::{algebra, mxm, Descriptor, Phase, SparseMatrix};
//! use magma::ingest::from_triplets;
//!
//! let a = from_triplets(2, 2, &[(0, 0, 1.0), (1, 1, 2.0)]).unwrap();
//! let b = from_triplets(2, 2, &[(0, 1, 3.0), (1, 0, 4.0)]).unwrap();
//! let mut c = SparseMatrix::<f64>::new(2, 2).unwrap();
//!
//! mxm(
//!     &mut c,
//!     &a,
//!     &b,
//!     &algebra::plus_times::<f64>(),
//!     Descriptor::NO_OPERATION,
//!     Phase::Execute,
//! )
//! .unwrap();
//!
//! assert_eq!(c.nnz(), 2);
//! ```
//!
//! The same multiply under `algebra::min_plus` relaxes shortest paths
//! instead.

pub mod algebra;
pub mod buffer;
pub mod config;
pub mod coordinates;
pub mod descriptor;
pub mod elementwise;
pub mod error;
pub mod ingest;
pub mod matrix;
pub mod mxm;
pub mod mxv;
pub mod storage;
pub mod utils;
pub mod vector;

// Re-export primary components
pub use algebra::{BinaryOperator, IndexValue, Monoid, Semiring};
pub use buffer::{finalize, init};
pub use coordinates::{Coordinates, CoordinatesUpdate, MaskValue};
pub use descriptor::{Descriptor, Phase};
pub use elementwise::{
    dot, ewise_apply_monoid, ewise_apply_op, ewise_apply_vector_monoid, ewise_apply_vector_op,
    foldl_matrix, foldl_matrix_semiring, foldl_vector, foldr_matrix, outer, select, zip,
};
pub use error::{Error, Result};
pub use ingest::{build_matrix_unique, build_matrix_unique_par, build_vector_unique, from_triplets};
pub use matrix::SparseMatrix;
pub use mxm::{mxm, mxm_masked, mxm_with};
pub use mxv::{mxv, mxv_masked, mxv_with, vxm, vxm_masked};
pub use utils::{from_sprs_csr, to_sprs_csr};
pub use vector::{set_masked, SparseVector};

/// Version information for the magma library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn version_is_set() {
        assert!(!super::VERSION.is_empty());
    }
}
