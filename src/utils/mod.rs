//! Utility functions and helpers

pub mod formats;
pub(crate) mod shared;

pub use formats::{from_sprs_csr, to_sprs_csr};

/// The exclusive prefix sum of `counts`, one entry longer than its input.
///
/// Counting-sort phases use this to turn per-bucket (or per-row) counts
/// into starting offsets; the final entry is the total.
pub fn exclusive_scan(counts: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(counts.len() + 1);
    let mut total = 0;
    offsets.push(0);
    for &count in counts {
        total += count;
        offsets.push(total);
    }
    offsets
}
