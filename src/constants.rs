// SPDX-License-Identifier: Apache-2.0

//! Common constants used across implementations
//!
//! This module centralizes lane counts, thresholds, and the parallel grain
//! size used by the scalar and SIMD paths.

// =============================================================================
// SIMD Lane Counts by Architecture
// =============================================================================

// x86/x86_64 Constants (AVX2, 256-bit registers)
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use x86_constants::*;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod x86_constants {
    pub const LANES_AVX2_F32: usize = 8; // 256/32 = 8 f32 elements
    pub const LANES_AVX2_F64: usize = 4; // 256/64 = 4 f64 elements
    pub const LANES_AVX2_BF16: usize = 8; // 8 bf16 lanes widened into one f32 vector
}

// NEON Constants (ARM64 only, 128-bit registers)
#[cfg(target_arch = "aarch64")]
pub use neon_constants::*;
#[cfg(target_arch = "aarch64")]
mod neon_constants {
    pub const LANES_NEON_F32: usize = 4; // 128/32 = 4 f32 elements
    pub const LANES_NEON_F64: usize = 2; // 128/64 = 2 f64 elements
    pub const LANES_NEON_BF16: usize = 4; // 4 bf16 lanes widened into one f32 vector
}

// =============================================================================
// Parallel Chunking
// =============================================================================

/// Minimum number of elements handed to one parallel worker.
///
/// Chunks smaller than this are not worth the scheduling overhead.
pub const ADAM_GRAIN_SIZE: usize = 512;

// =============================================================================
// SIMD Dispatch Thresholds
// =============================================================================

// When the disable-simd feature is enabled, set the threshold to usize::MAX to
// force the scalar implementation.
#[cfg(feature = "disable-simd")]
mod thresholds {
    pub const SIMD_THRESHOLD_ADAM: usize = usize::MAX;
}

#[cfg(not(feature = "disable-simd"))]
mod thresholds {
    /// Below this element count a chunk takes the scalar path outright.
    pub const SIMD_THRESHOLD_ADAM: usize = 16;
}

pub use thresholds::*;
