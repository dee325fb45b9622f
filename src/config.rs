//! Backend configuration and system parameters
//!
//! The storage representation and thread team sizing are controlled by a
//! small set of build-time aliases and runtime-detected parameters: the
//! integer widths used for row, column, and nonzero indices, the cache
//! line size, and the SIMD width of the host architecture.

/// Integer type used to address rows.
pub type RowIndex = u32;

/// Integer type used to address columns.
pub type ColIndex = u32;

/// Integer type used to count nonzeroes.
pub type NonzeroIndex = u64;

/// Maximum number of rows a matrix may have.
pub const MAX_ROWS: usize = RowIndex::MAX as usize;

/// Maximum number of columns a matrix may have.
pub const MAX_COLS: usize = ColIndex::MAX as usize;

/// Maximum number of nonzeroes a container may hold.
pub const MAX_NONZEROES: usize = NonzeroIndex::MAX as usize;

/// Upper bound on the number of insertions a single thread-local
/// coordinates update may record before it should be joined.
pub const MAX_ASYNC_ASSIGNS: usize = 64;

/// Host architecture classes the library distinguishes when sizing
/// scratch and picking loop granularity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Architecture {
    /// x86_64 with AVX-512.
    X86WithAVX512,
    /// x86_64 without AVX-512 (AVX2 assumed).
    X86WithoutAVX512,
    /// aarch64 with NEON, including Apple Silicon.
    ArmNeon,
    /// Anything else; scalar paths only.
    Generic,
}

impl Architecture {
    /// The native SIMD register width in bytes.
    pub fn vector_width_bytes(&self) -> usize {
        match self {
            Architecture::X86WithAVX512 => 64,
            Architecture::X86WithoutAVX512 => 32,
            Architecture::ArmNeon => 16,
            Architecture::Generic => 8,
        }
    }
}

/// Runtime-detected parameters used to size thread teams and scratch.
#[derive(Debug, Clone)]
pub struct SystemParameters {
    /// Cache line size in bytes; also the padding unit for per-thread
    /// scratch regions.
    pub cache_line_size: usize,
    /// Default SIMD width in bytes for the detected architecture.
    pub simd_width: usize,
    /// Maximum thread team size.
    pub n_threads: usize,
}

impl Default for SystemParameters {
    fn default() -> Self {
        Self {
            cache_line_size: 64,
            simd_width: detect_architecture().vector_width_bytes(),
            n_threads: num_cpus::get(),
        }
    }
}

impl SystemParameters {
    /// Analytic thread-count model used before parallel kernel execution.
    ///
    /// The returned count is an upper bound fed into the buffer manager:
    /// each thread must have at least one cache line of output nonzeroes
    /// to work on, otherwise team start-up costs dominate.
    pub fn thread_count_for(&self, target_nnz: usize) -> usize {
        if target_nnz == 0 {
            return 1;
        }
        let per_thread = self.cache_line_size.max(1);
        let useful = target_nnz / per_thread + usize::from(target_nnz % per_thread > 0);
        useful.clamp(1, self.n_threads.max(1))
    }
}

/// Classify the host CPU.
pub fn detect_architecture() -> Architecture {
    #[cfg(target_arch = "x86_64")]
    {
        return if std::is_x86_feature_detected!("avx512f") {
            Architecture::X86WithAVX512
        } else {
            Architecture::X86WithoutAVX512
        };
    }
    #[cfg(target_arch = "aarch64")]
    {
        return Architecture::ArmNeon;
    }
    #[allow(unreachable_code)]
    Architecture::Generic
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_returns_some_architecture() {
        let arch = detect_architecture();
        assert!(arch.vector_width_bytes() >= 8);
    }

    #[test]
    fn thread_count_scales_with_work() {
        let params = SystemParameters {
            cache_line_size: 64,
            simd_width: 8,
            n_threads: 8,
        };
        assert_eq!(params.thread_count_for(0), 1);
        assert_eq!(params.thread_count_for(1), 1);
        assert_eq!(params.thread_count_for(64), 1);
        assert_eq!(params.thread_count_for(65), 2);
        // Saturates at the configured team size.
        assert_eq!(params.thread_count_for(1 << 20), 8);
    }

    #[test]
    fn index_maxima_are_consistent() {
        assert!(MAX_ROWS <= MAX_NONZEROES);
        assert!(MAX_COLS <= MAX_NONZEROES);
    }
}
