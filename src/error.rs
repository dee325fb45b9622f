//! Return codes for all primitives
//!
//! Every primitive returns a code; errors are values, never panics. The
//! variants correspond one-to-one with the classic GraphBLAS return codes.

use thiserror::Error;

/// The error half of every primitive's return code.
///
/// A successful primitive returns `Ok(())`; everything else maps onto one
/// of the variants below. `Panic` is terminal: on receiving it the caller
/// must assume all containers are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// An argument is invalid given the current state of the containers,
    /// e.g. requesting a capacity larger than `nrows * ncols`.
    #[error("invalid argument for the current container state")]
    Illegal,

    /// The dimensions of the operands disagree.
    #[error("operand dimensions do not match")]
    Mismatch,

    /// An allocation failed while growing capacity. The target container
    /// retains its prior capacity and contents.
    #[error("out of memory while resizing")]
    OutOfMem,

    /// The output capacity was insufficient during an execute-phase call.
    /// The output container has been cleared; its capacity is unchanged.
    #[error("insufficient output capacity during execute")]
    Failed,

    /// The configured index type cannot represent the requested number of
    /// rows, columns, or nonzeroes.
    #[error("index type range exceeded")]
    Overflow,

    /// The requested operation is not implemented by this backend.
    #[error("unsupported operation")]
    Unsupported,

    /// An unrecoverable error; the library state is undefined and the
    /// process should exit.
    #[error("library entered an undefined state")]
    Panic,
}

/// Convenience alias used by every primitive in the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let all = [
            Error::Illegal,
            Error::Mismatch,
            Error::OutOfMem,
            Error::Failed,
            Error::Overflow,
            Error::Unsupported,
            Error::Panic,
        ];
        for (k, a) in all.iter().enumerate() {
            for b in all.iter().skip(k + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn display_is_informative() {
        assert!(format!("{}", Error::Failed).contains("capacity"));
        assert!(format!("{}", Error::Mismatch).contains("dimensions"));
    }
}
