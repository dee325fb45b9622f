//! Behaviour modifiers for primitives
//!
//! A [`Descriptor`] is a bitmask selecting behavioural modifiers applied
//! to a primitive call: transposition of inputs, mask interpretation,
//! identity injection, and storage directives. A [`Phase`] selects the
//! run-mode of a primitive: capacity growth, execution, or best-effort.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A bitmask of behavioural modifiers.
///
/// Descriptors combine with `|`:
///
/// ```
/// use magma::Descriptor;
///
/// let d = Descriptor::STRUCTURAL | Descriptor::INVERT_MASK;
/// assert!(d.contains(Descriptor::STRUCTURAL));
/// assert_eq!(d, Descriptor::STRUCTURAL_COMPLEMENT);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Descriptor(u32);

impl Descriptor {
    /// Default behaviour; no modifier active.
    pub const NO_OPERATION: Descriptor = Descriptor(0);

    /// Invert the mask: entries the mask admits become forbidden and
    /// vice versa.
    pub const INVERT_MASK: Descriptor = Descriptor(1);

    /// Transpose the matrix argument of a matrix-vector primitive.
    pub const TRANSPOSE_MATRIX: Descriptor = Descriptor(2);

    /// The caller guarantees the input contains no duplicate coordinates.
    pub const NO_DUPLICATES: Descriptor = Descriptor(4);

    /// Interpret masks structurally: presence alone admits an entry,
    /// values are ignored.
    pub const STRUCTURAL: Descriptor = Descriptor(8);

    /// Admit exactly the entries *not* structurally present in the mask.
    pub const STRUCTURAL_COMPLEMENT: Descriptor = Descriptor(8 | 1);

    /// Hint that the operands are dense; kernels may skip sparsity checks.
    pub const DENSE: Descriptor = Descriptor(16);

    /// Treat the matrix argument as `A + I` under the active semiring.
    pub const ADD_IDENTITY: Descriptor = Descriptor(32);

    /// Substitute each nonzero value of the right-hand vector by its
    /// index.
    pub const USE_INDEX: Descriptor = Descriptor(64);

    /// Forbid implicit domain casts. In this crate operand domains are
    /// tied to the algebra at the type level, so the check always holds;
    /// the flag is accepted for interface compatibility.
    pub const NO_CASTING: Descriptor = Descriptor(256);

    /// Write accumulation results equal to the additive identity instead
    /// of skipping them.
    pub const EXPLICIT_ZERO: Descriptor = Descriptor(512);

    /// The caller guarantees that overlapping input and output containers
    /// are race-free for this call.
    pub const SAFE_OVERLAP: Descriptor = Descriptor(1024);

    /// Transpose the left-hand matrix of a matrix-matrix primitive.
    pub const TRANSPOSE_LEFT: Descriptor = Descriptor(2048);

    /// Transpose the right-hand matrix of a matrix-matrix primitive.
    pub const TRANSPOSE_RIGHT: Descriptor = Descriptor(4096);

    /// Store the output in row-major (CRS) form only; the column-major
    /// storage is left empty.
    pub const FORCE_ROW_MAJOR: Descriptor = Descriptor(8192);

    /// Whether all modifiers in `other` are active in `self`.
    #[inline]
    pub fn contains(self, other: Descriptor) -> bool {
        self.0 & other.0 == other.0
    }

    /// The raw bitmask value.
    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for Descriptor {
    type Output = Descriptor;

    #[inline]
    fn bitor(self, rhs: Descriptor) -> Descriptor {
        Descriptor(self.0 | rhs.0)
    }
}

impl BitOrAssign for Descriptor {
    #[inline]
    fn bitor_assign(&mut self, rhs: Descriptor) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Descriptor::INVERT_MASK, "invert_mask"),
            (Descriptor::TRANSPOSE_MATRIX, "transpose_matrix"),
            (Descriptor::NO_DUPLICATES, "no_duplicates"),
            (Descriptor::STRUCTURAL, "structural"),
            (Descriptor::DENSE, "dense"),
            (Descriptor::ADD_IDENTITY, "add_identity"),
            (Descriptor::USE_INDEX, "use_index"),
            (Descriptor::NO_CASTING, "no_casting"),
            (Descriptor::EXPLICIT_ZERO, "explicit_zero"),
            (Descriptor::SAFE_OVERLAP, "safe_overlap"),
            (Descriptor::TRANSPOSE_LEFT, "transpose_left"),
            (Descriptor::TRANSPOSE_RIGHT, "transpose_right"),
            (Descriptor::FORCE_ROW_MAJOR, "force_row_major"),
        ];
        let mut first = true;
        write!(f, "Descriptor(")?;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        if first {
            write!(f, "no_operation")?;
        }
        write!(f, ")")
    }
}

/// The run-mode of a primitive call.
///
/// A primitive called with [`Phase::Resize`] must only enlarge the
/// output capacity so that a subsequent [`Phase::Execute`] call with
/// identical arguments is guaranteed to succeed. An execute-phase call
/// either completes the computation or fails cleanly, clearing the
/// output; it never shrinks capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Grow the output capacity for the requested computation.
    Resize,
    /// Perform the computation; fail cleanly if capacity is insufficient.
    #[default]
    Execute,
    /// Best-effort execution that may leave partial output. Experimental;
    /// kernels in this backend report it as unsupported.
    Try,
}
