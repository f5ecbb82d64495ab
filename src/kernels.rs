// SPDX-License-Identifier: Apache-2.0

//! Vectorized inner loops for the fused Adam/AMSGrad step
//!
//! One chunk kernel per (architecture, dtype-variant) pair, each built on a
//! single shared lane rule per compute width, plus the scalar chunk functions
//! used below the SIMD threshold and for remainder tails. The lerp mask/blend
//! sequence matches the scalar branch selection exactly; fused multiply-add
//! in the vector lerp is an accepted deviation from the scalar tail.

// Some clippy lints are noisy for low-level SIMD code; we opt out at the module level.
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

use half::bf16;

use crate::step::{adam_update_scalar, split_pack, split_unpack, Real, StepCoefficients};

#[cfg(target_arch = "x86_64")]
use crate::constants::{LANES_AVX2_BF16, LANES_AVX2_F32, LANES_AVX2_F64};

#[cfg(target_arch = "aarch64")]
use crate::constants::{LANES_NEON_BF16, LANES_NEON_F32, LANES_NEON_F64};

// =============================================================================
// X86_64 SIMD IMPORTS
// =============================================================================

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::{
    __m128i, __m256, __m256d, __m256i, _mm256_add_epi32, _mm256_add_pd, _mm256_add_ps,
    _mm256_and_si256, _mm256_andnot_pd, _mm256_andnot_ps, _mm256_blendv_epi8, _mm256_blendv_pd,
    _mm256_blendv_ps, _mm256_castps_si256, _mm256_castsi256_ps, _mm256_castsi256_si128,
    _mm256_cmp_pd, _mm256_cmp_ps, _mm256_cvtepu16_epi32, _mm256_div_pd, _mm256_div_ps,
    _mm256_fmadd_pd, _mm256_fmadd_ps, _mm256_loadu_pd, _mm256_loadu_ps, _mm256_max_pd,
    _mm256_max_ps, _mm256_mul_pd, _mm256_mul_ps, _mm256_or_si256, _mm256_packus_epi32,
    _mm256_permute4x64_epi64, _mm256_set1_epi32, _mm256_set1_pd, _mm256_set1_ps,
    _mm256_slli_epi32, _mm256_sqrt_pd, _mm256_sqrt_ps, _mm256_srli_epi32, _mm256_storeu_pd,
    _mm256_storeu_ps, _mm256_sub_pd, _mm256_sub_ps, _mm_loadu_si128, _mm_storeu_si128,
    _CMP_LT_OQ, _CMP_UNORD_Q,
};

// =============================================================================
// ARM NEON IMPORTS
// =============================================================================

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::{
    float32x4_t, float64x2_t, uint16x4_t, uint32x4_t, uint64x2_t, vabsq_f32, vabsq_f64,
    vaddq_f32, vaddq_f64, vaddq_u32, vandq_u32, vbsl_u16, vbslq_f32, vbslq_f64, vceqq_f32,
    vcltq_f32, vcltq_f64, vdup_n_u16, vdupq_n_f32, vdupq_n_f64, vdupq_n_u32, vdivq_f32,
    vdivq_f64, vfmaq_f32, vfmaq_f64, vld1_u16, vld1q_f32, vld1q_f64, vmaxq_f32, vmaxq_f64,
    vmovl_u16, vmovn_u32, vmulq_f32, vmulq_f64, vorrq_u32, vreinterpretq_f32_u32,
    vreinterpretq_u32_f32, vshlq_n_u32, vshrn_n_u32, vshrq_n_u32, vsqrtq_f32, vsqrtq_f64,
    vst1_u16, vst1q_f32, vst1q_f64, vsubq_f32, vsubq_f64,
};

// =============================================================================
// SCALAR CHUNK FUNCTIONS
// =============================================================================

/// Scalar path for the plain f32/f64 variants; also the remainder tail of the
/// matching vector kernels.
pub fn adam_update_chunk_scalar<T: Real>(
    param: &mut [T],
    exp_avg: &mut [T],
    exp_avg_sq: &mut [T],
    mut max_exp_avg_sq: Option<&mut [T]>,
    grad: &[T],
    c: &StepCoefficients<T>,
) {
    for d in 0..param.len() {
        let max_elem = match max_exp_avg_sq {
            Some(ref mut m) => Some(&mut m[d]),
            None => None,
        };
        param[d] = adam_update_scalar(
            param[d],
            grad[d],
            &mut exp_avg[d],
            &mut exp_avg_sq[d],
            max_elem,
            c,
        );
    }
}

/// Scalar path for the precision-split (bf16 grad, bf16 param) variant.
///
/// Every parameter read unpacks the split pair and every write repacks it;
/// the arithmetic itself runs at f32.
pub fn adam_update_chunk_bf16_scalar(
    param: &mut [bf16],
    trail: &mut [bf16],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    mut max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[bf16],
    c: &StepCoefficients<f32>,
) {
    for d in 0..param.len() {
        let param_val = split_unpack(param[d], trail[d]);
        let max_elem = match max_exp_avg_sq {
            Some(ref mut m) => Some(&mut m[d]),
            None => None,
        };
        let param_new = adam_update_scalar(
            param_val,
            grad[d].to_f32(),
            &mut exp_avg[d],
            &mut exp_avg_sq[d],
            max_elem,
            c,
        );
        let (top, lo) = split_pack(param_new);
        param[d] = top;
        trail[d] = lo;
    }
}

/// Scalar path for the (bf16 grad, f32 param) variant.
///
/// The f32 parameter is the master copy; the bf16 mirror is refreshed from it
/// after each update, with round-to-nearest-even narrowing.
pub fn adam_update_chunk_bf16_grad_scalar(
    param: &mut [f32],
    mirror: &mut [bf16],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    mut max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[bf16],
    c: &StepCoefficients<f32>,
) {
    for d in 0..param.len() {
        let max_elem = match max_exp_avg_sq {
            Some(ref mut m) => Some(&mut m[d]),
            None => None,
        };
        param[d] = adam_update_scalar(
            param[d],
            grad[d].to_f32(),
            &mut exp_avg[d],
            &mut exp_avg_sq[d],
            max_elem,
            c,
        );
        mirror[d] = bf16::from_f32(param[d]);
    }
}

// =============================================================================
// AVX2 LANE RULE (f32 compute)
// =============================================================================

#[cfg(target_arch = "x86_64")]
#[derive(Clone, Copy)]
struct AdamConstsF32Avx2 {
    weight_decay_nonzero: bool,
    weight_decay: __m256,
    beta2: __m256,
    exp_avg_sq_coeff: __m256,
    lerp_mask: __m256,
    lerp_coeff: __m256,
    bias_correction2_sqrt: __m256,
    eps: __m256,
    step_size: __m256,
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn adam_consts_f32_avx2(c: &StepCoefficients<f32>) -> AdamConstsF32Avx2 {
    // the lerp weight is uniform across lanes, so the mask and blended
    // coefficient are computed once per chunk
    let lerp_weight = _mm256_set1_ps(c.exp_avg_coeff);
    let abs_weight = _mm256_andnot_ps(_mm256_set1_ps(-0.0f32), lerp_weight);
    let lerp_mask = _mm256_cmp_ps(abs_weight, _mm256_set1_ps(0.5), _CMP_LT_OQ);
    let lerp_coeff = _mm256_blendv_ps(
        _mm256_sub_ps(lerp_weight, _mm256_set1_ps(1.0)),
        lerp_weight,
        lerp_mask,
    );
    AdamConstsF32Avx2 {
        weight_decay_nonzero: c.weight_decay != 0.0,
        weight_decay: _mm256_set1_ps(c.weight_decay),
        beta2: _mm256_set1_ps(c.beta2),
        exp_avg_sq_coeff: _mm256_set1_ps(c.exp_avg_sq_coeff),
        lerp_mask,
        lerp_coeff,
        bias_correction2_sqrt: _mm256_set1_ps(c.bias_correction2_sqrt),
        eps: _mm256_set1_ps(c.eps),
        step_size: _mm256_set1_ps(c.step_size),
    }
}

/// Apply the update rule to eight f32 lanes; returns the new parameter vector.
/// `exp_avg`/`exp_avg_sq`/`max_exp_avg_sq` point at the lane base offset.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn adam_update_lanes_f32_avx2(
    param_vec: __m256,
    grad_vec: __m256,
    exp_avg: *mut f32,
    exp_avg_sq: *mut f32,
    max_exp_avg_sq: Option<*mut f32>,
    k: &AdamConstsF32Avx2,
) -> __m256 {
    let mut grad_vec = grad_vec;
    if k.weight_decay_nonzero {
        // only accumulate weight decay when weight_decay != 0 to avoid NaN
        // propagation from param to grad
        grad_vec = _mm256_add_ps(grad_vec, _mm256_mul_ps(param_vec, k.weight_decay));
    }

    // exp_avg.lerp(grad, 1 - beta1)
    let exp_avg_vec = _mm256_loadu_ps(exp_avg);
    let base = _mm256_blendv_ps(grad_vec, exp_avg_vec, k.lerp_mask);
    let exp_avg_new = _mm256_fmadd_ps(k.lerp_coeff, _mm256_sub_ps(grad_vec, exp_avg_vec), base);
    _mm256_storeu_ps(exp_avg, exp_avg_new);

    let exp_avg_sq_new = _mm256_add_ps(
        _mm256_mul_ps(_mm256_loadu_ps(exp_avg_sq), k.beta2),
        _mm256_mul_ps(k.exp_avg_sq_coeff, _mm256_mul_ps(grad_vec, grad_vec)),
    );
    _mm256_storeu_ps(exp_avg_sq, exp_avg_sq_new);

    let denom_base = match max_exp_avg_sq {
        Some(max) => {
            let max_vec = _mm256_max_ps(_mm256_loadu_ps(max), exp_avg_sq_new);
            _mm256_storeu_ps(max, max_vec);
            max_vec
        }
        None => exp_avg_sq_new,
    };
    let denom = _mm256_add_ps(
        _mm256_div_ps(_mm256_sqrt_ps(denom_base), k.bias_correction2_sqrt),
        k.eps,
    );
    _mm256_sub_ps(
        param_vec,
        _mm256_div_ps(_mm256_mul_ps(k.step_size, exp_avg_new), denom),
    )
}

// =============================================================================
// AVX2 LANE RULE (f64 compute)
// =============================================================================

#[cfg(target_arch = "x86_64")]
#[derive(Clone, Copy)]
struct AdamConstsF64Avx2 {
    weight_decay_nonzero: bool,
    weight_decay: __m256d,
    beta2: __m256d,
    exp_avg_sq_coeff: __m256d,
    lerp_mask: __m256d,
    lerp_coeff: __m256d,
    bias_correction2_sqrt: __m256d,
    eps: __m256d,
    step_size: __m256d,
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn adam_consts_f64_avx2(c: &StepCoefficients<f64>) -> AdamConstsF64Avx2 {
    let lerp_weight = _mm256_set1_pd(c.exp_avg_coeff);
    let abs_weight = _mm256_andnot_pd(_mm256_set1_pd(-0.0f64), lerp_weight);
    let lerp_mask = _mm256_cmp_pd(abs_weight, _mm256_set1_pd(0.5), _CMP_LT_OQ);
    let lerp_coeff = _mm256_blendv_pd(
        _mm256_sub_pd(lerp_weight, _mm256_set1_pd(1.0)),
        lerp_weight,
        lerp_mask,
    );
    AdamConstsF64Avx2 {
        weight_decay_nonzero: c.weight_decay != 0.0,
        weight_decay: _mm256_set1_pd(c.weight_decay),
        beta2: _mm256_set1_pd(c.beta2),
        exp_avg_sq_coeff: _mm256_set1_pd(c.exp_avg_sq_coeff),
        lerp_mask,
        lerp_coeff,
        bias_correction2_sqrt: _mm256_set1_pd(c.bias_correction2_sqrt),
        eps: _mm256_set1_pd(c.eps),
        step_size: _mm256_set1_pd(c.step_size),
    }
}

#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn adam_update_lanes_f64_avx2(
    param_vec: __m256d,
    grad_vec: __m256d,
    exp_avg: *mut f64,
    exp_avg_sq: *mut f64,
    max_exp_avg_sq: Option<*mut f64>,
    k: &AdamConstsF64Avx2,
) -> __m256d {
    let mut grad_vec = grad_vec;
    if k.weight_decay_nonzero {
        grad_vec = _mm256_add_pd(grad_vec, _mm256_mul_pd(param_vec, k.weight_decay));
    }

    let exp_avg_vec = _mm256_loadu_pd(exp_avg);
    let base = _mm256_blendv_pd(grad_vec, exp_avg_vec, k.lerp_mask);
    let exp_avg_new = _mm256_fmadd_pd(k.lerp_coeff, _mm256_sub_pd(grad_vec, exp_avg_vec), base);
    _mm256_storeu_pd(exp_avg, exp_avg_new);

    let exp_avg_sq_new = _mm256_add_pd(
        _mm256_mul_pd(_mm256_loadu_pd(exp_avg_sq), k.beta2),
        _mm256_mul_pd(k.exp_avg_sq_coeff, _mm256_mul_pd(grad_vec, grad_vec)),
    );
    _mm256_storeu_pd(exp_avg_sq, exp_avg_sq_new);

    let denom_base = match max_exp_avg_sq {
        Some(max) => {
            let max_vec = _mm256_max_pd(_mm256_loadu_pd(max), exp_avg_sq_new);
            _mm256_storeu_pd(max, max_vec);
            max_vec
        }
        None => exp_avg_sq_new,
    };
    let denom = _mm256_add_pd(
        _mm256_div_pd(_mm256_sqrt_pd(denom_base), k.bias_correction2_sqrt),
        k.eps,
    );
    _mm256_sub_pd(
        param_vec,
        _mm256_div_pd(_mm256_mul_pd(k.step_size, exp_avg_new), denom),
    )
}

// =============================================================================
// AVX2 BF16 LANE HELPERS
// =============================================================================

// Pack the low u16 of each of eight u32 lanes into one 128-bit vector.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn pack_u32_to_u16_avx2(v: __m256i) -> __m128i {
    let packed = _mm256_packus_epi32(v, v);
    let packed = _mm256_permute4x64_epi64(packed, 0b0000_1000);
    _mm256_castsi256_si128(packed)
}

// Widen eight bf16 lanes into eight f32 lanes (bf16 is the top half of f32).
#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn bf16_widen_avx2(v: __m128i) -> __m256 {
    _mm256_castsi256_ps(_mm256_slli_epi32(_mm256_cvtepu16_epi32(v), 16))
}

// Reconstruct eight f32 lanes from split top/trailing 16-bit halves.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn split_combine_avx2(top: __m128i, trail: __m128i) -> __m256 {
    let hi = _mm256_slli_epi32(_mm256_cvtepu16_epi32(top), 16);
    let lo = _mm256_cvtepu16_epi32(trail);
    _mm256_castsi256_ps(_mm256_or_si256(hi, lo))
}

// Narrow eight f32 lanes to bf16 with round-to-nearest-even; NaN lanes
// collapse to a quiet NaN as the scalar conversion does.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
unsafe fn bf16_narrow_rne_avx2(v: __m256) -> __m128i {
    let bits = _mm256_castps_si256(v);
    let lsb = _mm256_and_si256(_mm256_srli_epi32(bits, 16), _mm256_set1_epi32(1));
    let bias = _mm256_add_epi32(_mm256_set1_epi32(0x7FFF), lsb);
    let rounded = _mm256_srli_epi32(_mm256_add_epi32(bits, bias), 16);
    let nan_mask = _mm256_castps_si256(_mm256_cmp_ps(v, v, _CMP_UNORD_Q));
    let narrowed = _mm256_blendv_epi8(rounded, _mm256_set1_epi32(0x7FC0), nan_mask);
    pack_u32_to_u16_avx2(narrowed)
}

// =============================================================================
// AVX2 CHUNK KERNELS
// =============================================================================

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
pub unsafe fn adam_update_chunk_f32_avx2(
    param: &mut [f32],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    mut max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[f32],
    c: &StepCoefficients<f32>,
) {
    const LANES: usize = LANES_AVX2_F32;
    let len = param.len();
    let simd_len = len & !(LANES - 1);
    let k = adam_consts_f32_avx2(c);

    let mut d = 0;
    while d < simd_len {
        let param_vec = _mm256_loadu_ps(param.as_ptr().add(d));
        let grad_vec = _mm256_loadu_ps(grad.as_ptr().add(d));
        let max_ptr = match max_exp_avg_sq {
            Some(ref mut m) => Some(m.as_mut_ptr().add(d)),
            None => None,
        };
        let param_new = adam_update_lanes_f32_avx2(
            param_vec,
            grad_vec,
            exp_avg.as_mut_ptr().add(d),
            exp_avg_sq.as_mut_ptr().add(d),
            max_ptr,
            &k,
        );
        _mm256_storeu_ps(param.as_mut_ptr().add(d), param_new);
        d += LANES;
    }

    // trailing elements share the scalar rule
    let tail_max = match max_exp_avg_sq {
        Some(m) => Some(&mut m[simd_len..]),
        None => None,
    };
    adam_update_chunk_scalar(
        &mut param[simd_len..],
        &mut exp_avg[simd_len..],
        &mut exp_avg_sq[simd_len..],
        tail_max,
        &grad[simd_len..],
        c,
    );
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
pub unsafe fn adam_update_chunk_f64_avx2(
    param: &mut [f64],
    exp_avg: &mut [f64],
    exp_avg_sq: &mut [f64],
    mut max_exp_avg_sq: Option<&mut [f64]>,
    grad: &[f64],
    c: &StepCoefficients<f64>,
) {
    const LANES: usize = LANES_AVX2_F64;
    let len = param.len();
    let simd_len = len & !(LANES - 1);
    let k = adam_consts_f64_avx2(c);

    let mut d = 0;
    while d < simd_len {
        let param_vec = _mm256_loadu_pd(param.as_ptr().add(d));
        let grad_vec = _mm256_loadu_pd(grad.as_ptr().add(d));
        let max_ptr = match max_exp_avg_sq {
            Some(ref mut m) => Some(m.as_mut_ptr().add(d)),
            None => None,
        };
        let param_new = adam_update_lanes_f64_avx2(
            param_vec,
            grad_vec,
            exp_avg.as_mut_ptr().add(d),
            exp_avg_sq.as_mut_ptr().add(d),
            max_ptr,
            &k,
        );
        _mm256_storeu_pd(param.as_mut_ptr().add(d), param_new);
        d += LANES;
    }

    let tail_max = match max_exp_avg_sq {
        Some(m) => Some(&mut m[simd_len..]),
        None => None,
    };
    adam_update_chunk_scalar(
        &mut param[simd_len..],
        &mut exp_avg[simd_len..],
        &mut exp_avg_sq[simd_len..],
        tail_max,
        &grad[simd_len..],
        c,
    );
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
pub unsafe fn adam_update_chunk_bf16_avx2(
    param: &mut [bf16],
    trail: &mut [bf16],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    mut max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[bf16],
    c: &StepCoefficients<f32>,
) {
    const LANES: usize = LANES_AVX2_BF16;
    let len = param.len();
    let simd_len = len & !(LANES - 1);
    let k = adam_consts_f32_avx2(c);

    // bf16 is a transparent wrapper over u16; the kernels move raw bits
    let param_bits = param.as_mut_ptr() as *mut u16;
    let trail_bits = trail.as_mut_ptr() as *mut u16;
    let grad_bits = grad.as_ptr() as *const u16;

    let mut d = 0;
    while d < simd_len {
        let grad_vec = bf16_widen_avx2(_mm_loadu_si128(grad_bits.add(d) as *const __m128i));
        let top = _mm_loadu_si128(param_bits.add(d) as *const __m128i);
        let lo = _mm_loadu_si128(trail_bits.add(d) as *const __m128i);
        let param_vec = split_combine_avx2(top, lo);
        let max_ptr = match max_exp_avg_sq {
            Some(ref mut m) => Some(m.as_mut_ptr().add(d)),
            None => None,
        };
        let param_new = adam_update_lanes_f32_avx2(
            param_vec,
            grad_vec,
            exp_avg.as_mut_ptr().add(d),
            exp_avg_sq.as_mut_ptr().add(d),
            max_ptr,
            &k,
        );
        let new_bits = _mm256_castps_si256(param_new);
        _mm_storeu_si128(
            param_bits.add(d) as *mut __m128i,
            pack_u32_to_u16_avx2(_mm256_srli_epi32(new_bits, 16)),
        );
        _mm_storeu_si128(
            trail_bits.add(d) as *mut __m128i,
            pack_u32_to_u16_avx2(_mm256_and_si256(new_bits, _mm256_set1_epi32(0xFFFF))),
        );
        d += LANES;
    }

    let tail_max = match max_exp_avg_sq {
        Some(m) => Some(&mut m[simd_len..]),
        None => None,
    };
    adam_update_chunk_bf16_scalar(
        &mut param[simd_len..],
        &mut trail[simd_len..],
        &mut exp_avg[simd_len..],
        &mut exp_avg_sq[simd_len..],
        tail_max,
        &grad[simd_len..],
        c,
    );
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
pub unsafe fn adam_update_chunk_bf16_grad_avx2(
    param: &mut [f32],
    mirror: &mut [bf16],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    mut max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[bf16],
    c: &StepCoefficients<f32>,
) {
    const LANES: usize = LANES_AVX2_BF16;
    let len = param.len();
    let simd_len = len & !(LANES - 1);
    let k = adam_consts_f32_avx2(c);

    let mirror_bits = mirror.as_mut_ptr() as *mut u16;
    let grad_bits = grad.as_ptr() as *const u16;

    let mut d = 0;
    while d < simd_len {
        let grad_vec = bf16_widen_avx2(_mm_loadu_si128(grad_bits.add(d) as *const __m128i));
        let param_vec = _mm256_loadu_ps(param.as_ptr().add(d));
        let max_ptr = match max_exp_avg_sq {
            Some(ref mut m) => Some(m.as_mut_ptr().add(d)),
            None => None,
        };
        let param_new = adam_update_lanes_f32_avx2(
            param_vec,
            grad_vec,
            exp_avg.as_mut_ptr().add(d),
            exp_avg_sq.as_mut_ptr().add(d),
            max_ptr,
            &k,
        );
        _mm256_storeu_ps(param.as_mut_ptr().add(d), param_new);
        // sync the bf16 mirror from the f32 master copy
        _mm_storeu_si128(
            mirror_bits.add(d) as *mut __m128i,
            bf16_narrow_rne_avx2(param_new),
        );
        d += LANES;
    }

    let tail_max = match max_exp_avg_sq {
        Some(m) => Some(&mut m[simd_len..]),
        None => None,
    };
    adam_update_chunk_bf16_grad_scalar(
        &mut param[simd_len..],
        &mut mirror[simd_len..],
        &mut exp_avg[simd_len..],
        &mut exp_avg_sq[simd_len..],
        tail_max,
        &grad[simd_len..],
        c,
    );
}

// =============================================================================
// NEON LANE RULE (f32 compute)
// =============================================================================

#[cfg(target_arch = "aarch64")]
#[derive(Clone, Copy)]
struct AdamConstsF32Neon {
    weight_decay_nonzero: bool,
    weight_decay: float32x4_t,
    beta2: float32x4_t,
    exp_avg_sq_coeff: float32x4_t,
    lerp_mask: uint32x4_t,
    lerp_coeff: float32x4_t,
    bias_correction2_sqrt: float32x4_t,
    eps: float32x4_t,
    step_size: float32x4_t,
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn adam_consts_f32_neon(c: &StepCoefficients<f32>) -> AdamConstsF32Neon {
    let lerp_weight = vdupq_n_f32(c.exp_avg_coeff);
    let lerp_mask = vcltq_f32(vabsq_f32(lerp_weight), vdupq_n_f32(0.5));
    let lerp_coeff = vbslq_f32(
        lerp_mask,
        lerp_weight,
        vsubq_f32(lerp_weight, vdupq_n_f32(1.0)),
    );
    AdamConstsF32Neon {
        weight_decay_nonzero: c.weight_decay != 0.0,
        weight_decay: vdupq_n_f32(c.weight_decay),
        beta2: vdupq_n_f32(c.beta2),
        exp_avg_sq_coeff: vdupq_n_f32(c.exp_avg_sq_coeff),
        lerp_mask,
        lerp_coeff,
        bias_correction2_sqrt: vdupq_n_f32(c.bias_correction2_sqrt),
        eps: vdupq_n_f32(c.eps),
        step_size: vdupq_n_f32(c.step_size),
    }
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn adam_update_lanes_f32_neon(
    param_vec: float32x4_t,
    grad_vec: float32x4_t,
    exp_avg: *mut f32,
    exp_avg_sq: *mut f32,
    max_exp_avg_sq: Option<*mut f32>,
    k: &AdamConstsF32Neon,
) -> float32x4_t {
    let mut grad_vec = grad_vec;
    if k.weight_decay_nonzero {
        // only accumulate weight decay when weight_decay != 0 to avoid NaN
        // propagation from param to grad
        grad_vec = vaddq_f32(grad_vec, vmulq_f32(param_vec, k.weight_decay));
    }

    // exp_avg.lerp(grad, 1 - beta1)
    let exp_avg_vec = vld1q_f32(exp_avg);
    let base = vbslq_f32(k.lerp_mask, exp_avg_vec, grad_vec);
    let exp_avg_new = vfmaq_f32(base, k.lerp_coeff, vsubq_f32(grad_vec, exp_avg_vec));
    vst1q_f32(exp_avg, exp_avg_new);

    let exp_avg_sq_new = vaddq_f32(
        vmulq_f32(vld1q_f32(exp_avg_sq), k.beta2),
        vmulq_f32(k.exp_avg_sq_coeff, vmulq_f32(grad_vec, grad_vec)),
    );
    vst1q_f32(exp_avg_sq, exp_avg_sq_new);

    let denom_base = match max_exp_avg_sq {
        Some(max) => {
            let max_vec = vmaxq_f32(vld1q_f32(max), exp_avg_sq_new);
            vst1q_f32(max, max_vec);
            max_vec
        }
        None => exp_avg_sq_new,
    };
    let denom = vaddq_f32(
        vdivq_f32(vsqrtq_f32(denom_base), k.bias_correction2_sqrt),
        k.eps,
    );
    vsubq_f32(param_vec, vdivq_f32(vmulq_f32(k.step_size, exp_avg_new), denom))
}

// =============================================================================
// NEON LANE RULE (f64 compute)
// =============================================================================

#[cfg(target_arch = "aarch64")]
#[derive(Clone, Copy)]
struct AdamConstsF64Neon {
    weight_decay_nonzero: bool,
    weight_decay: float64x2_t,
    beta2: float64x2_t,
    exp_avg_sq_coeff: float64x2_t,
    lerp_mask: uint64x2_t,
    lerp_coeff: float64x2_t,
    bias_correction2_sqrt: float64x2_t,
    eps: float64x2_t,
    step_size: float64x2_t,
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn adam_consts_f64_neon(c: &StepCoefficients<f64>) -> AdamConstsF64Neon {
    let lerp_weight = vdupq_n_f64(c.exp_avg_coeff);
    let lerp_mask = vcltq_f64(vabsq_f64(lerp_weight), vdupq_n_f64(0.5));
    let lerp_coeff = vbslq_f64(
        lerp_mask,
        lerp_weight,
        vsubq_f64(lerp_weight, vdupq_n_f64(1.0)),
    );
    AdamConstsF64Neon {
        weight_decay_nonzero: c.weight_decay != 0.0,
        weight_decay: vdupq_n_f64(c.weight_decay),
        beta2: vdupq_n_f64(c.beta2),
        exp_avg_sq_coeff: vdupq_n_f64(c.exp_avg_sq_coeff),
        lerp_mask,
        lerp_coeff,
        bias_correction2_sqrt: vdupq_n_f64(c.bias_correction2_sqrt),
        eps: vdupq_n_f64(c.eps),
        step_size: vdupq_n_f64(c.step_size),
    }
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn adam_update_lanes_f64_neon(
    param_vec: float64x2_t,
    grad_vec: float64x2_t,
    exp_avg: *mut f64,
    exp_avg_sq: *mut f64,
    max_exp_avg_sq: Option<*mut f64>,
    k: &AdamConstsF64Neon,
) -> float64x2_t {
    let mut grad_vec = grad_vec;
    if k.weight_decay_nonzero {
        grad_vec = vaddq_f64(grad_vec, vmulq_f64(param_vec, k.weight_decay));
    }

    let exp_avg_vec = vld1q_f64(exp_avg);
    let base = vbslq_f64(k.lerp_mask, exp_avg_vec, grad_vec);
    let exp_avg_new = vfmaq_f64(base, k.lerp_coeff, vsubq_f64(grad_vec, exp_avg_vec));
    vst1q_f64(exp_avg, exp_avg_new);

    let exp_avg_sq_new = vaddq_f64(
        vmulq_f64(vld1q_f64(exp_avg_sq), k.beta2),
        vmulq_f64(k.exp_avg_sq_coeff, vmulq_f64(grad_vec, grad_vec)),
    );
    vst1q_f64(exp_avg_sq, exp_avg_sq_new);

    let denom_base = match max_exp_avg_sq {
        Some(max) => {
            let max_vec = vmaxq_f64(vld1q_f64(max), exp_avg_sq_new);
            vst1q_f64(max, max_vec);
            max_vec
        }
        None => exp_avg_sq_new,
    };
    let denom = vaddq_f64(
        vdivq_f64(vsqrtq_f64(denom_base), k.bias_correction2_sqrt),
        k.eps,
    );
    vsubq_f64(param_vec, vdivq_f64(vmulq_f64(k.step_size, exp_avg_new), denom))
}

// =============================================================================
// NEON BF16 LANE HELPERS
// =============================================================================

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn bf16_widen_neon(v: uint16x4_t) -> float32x4_t {
    vreinterpretq_f32_u32(vshlq_n_u32(vmovl_u16(v), 16))
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn split_combine_neon(top: uint16x4_t, trail: uint16x4_t) -> float32x4_t {
    vreinterpretq_f32_u32(vorrq_u32(vshlq_n_u32(vmovl_u16(top), 16), vmovl_u16(trail)))
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn split_top_neon(v: float32x4_t) -> uint16x4_t {
    vshrn_n_u32(vreinterpretq_u32_f32(v), 16)
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn split_trail_neon(v: float32x4_t) -> uint16x4_t {
    vmovn_u32(vreinterpretq_u32_f32(v))
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn bf16_narrow_rne_neon(v: float32x4_t) -> uint16x4_t {
    let bits = vreinterpretq_u32_f32(v);
    let lsb = vandq_u32(vshrq_n_u32(bits, 16), vdupq_n_u32(1));
    let rounded = vaddq_u32(vaddq_u32(bits, vdupq_n_u32(0x7FFF)), lsb);
    let narrowed = vshrn_n_u32(rounded, 16);
    // ordered lanes keep the rounded value; NaN lanes collapse to a quiet NaN
    let ordered = vmovn_u32(vceqq_f32(v, v));
    vbsl_u16(ordered, narrowed, vdup_n_u16(0x7FC0))
}

// =============================================================================
// NEON CHUNK KERNELS
// =============================================================================

#[cfg(target_arch = "aarch64")]
pub unsafe fn adam_update_chunk_f32_neon(
    param: &mut [f32],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    mut max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[f32],
    c: &StepCoefficients<f32>,
) {
    const LANES: usize = LANES_NEON_F32;
    let len = param.len();
    let simd_len = len & !(LANES - 1);
    let k = adam_consts_f32_neon(c);

    let mut d = 0;
    while d < simd_len {
        let param_vec = vld1q_f32(param.as_ptr().add(d));
        let grad_vec = vld1q_f32(grad.as_ptr().add(d));
        let max_ptr = match max_exp_avg_sq {
            Some(ref mut m) => Some(m.as_mut_ptr().add(d)),
            None => None,
        };
        let param_new = adam_update_lanes_f32_neon(
            param_vec,
            grad_vec,
            exp_avg.as_mut_ptr().add(d),
            exp_avg_sq.as_mut_ptr().add(d),
            max_ptr,
            &k,
        );
        vst1q_f32(param.as_mut_ptr().add(d), param_new);
        d += LANES;
    }

    let tail_max = match max_exp_avg_sq {
        Some(m) => Some(&mut m[simd_len..]),
        None => None,
    };
    adam_update_chunk_scalar(
        &mut param[simd_len..],
        &mut exp_avg[simd_len..],
        &mut exp_avg_sq[simd_len..],
        tail_max,
        &grad[simd_len..],
        c,
    );
}

#[cfg(target_arch = "aarch64")]
pub unsafe fn adam_update_chunk_f64_neon(
    param: &mut [f64],
    exp_avg: &mut [f64],
    exp_avg_sq: &mut [f64],
    mut max_exp_avg_sq: Option<&mut [f64]>,
    grad: &[f64],
    c: &StepCoefficients<f64>,
) {
    const LANES: usize = LANES_NEON_F64;
    let len = param.len();
    let simd_len = len & !(LANES - 1);
    let k = adam_consts_f64_neon(c);

    let mut d = 0;
    while d < simd_len {
        let param_vec = vld1q_f64(param.as_ptr().add(d));
        let grad_vec = vld1q_f64(grad.as_ptr().add(d));
        let max_ptr = match max_exp_avg_sq {
            Some(ref mut m) => Some(m.as_mut_ptr().add(d)),
            None => None,
        };
        let param_new = adam_update_lanes_f64_neon(
            param_vec,
            grad_vec,
            exp_avg.as_mut_ptr().add(d),
            exp_avg_sq.as_mut_ptr().add(d),
            max_ptr,
            &k,
        );
        vst1q_f64(param.as_mut_ptr().add(d), param_new);
        d += LANES;
    }

    let tail_max = match max_exp_avg_sq {
        Some(m) => Some(&mut m[simd_len..]),
        None => None,
    };
    adam_update_chunk_scalar(
        &mut param[simd_len..],
        &mut exp_avg[simd_len..],
        &mut exp_avg_sq[simd_len..],
        tail_max,
        &grad[simd_len..],
        c,
    );
}

#[cfg(target_arch = "aarch64")]
pub unsafe fn adam_update_chunk_bf16_neon(
    param: &mut [bf16],
    trail: &mut [bf16],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    mut max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[bf16],
    c: &StepCoefficients<f32>,
) {
    const LANES: usize = LANES_NEON_BF16;
    let len = param.len();
    let simd_len = len & !(LANES - 1);
    let k = adam_consts_f32_neon(c);

    let param_bits = param.as_mut_ptr() as *mut u16;
    let trail_bits = trail.as_mut_ptr() as *mut u16;
    let grad_bits = grad.as_ptr() as *const u16;

    let mut d = 0;
    while d < simd_len {
        let grad_vec = bf16_widen_neon(vld1_u16(grad_bits.add(d)));
        let param_vec = split_combine_neon(vld1_u16(param_bits.add(d)), vld1_u16(trail_bits.add(d)));
        let max_ptr = match max_exp_avg_sq {
            Some(ref mut m) => Some(m.as_mut_ptr().add(d)),
            None => None,
        };
        let param_new = adam_update_lanes_f32_neon(
            param_vec,
            grad_vec,
            exp_avg.as_mut_ptr().add(d),
            exp_avg_sq.as_mut_ptr().add(d),
            max_ptr,
            &k,
        );
        vst1_u16(param_bits.add(d), split_top_neon(param_new));
        vst1_u16(trail_bits.add(d), split_trail_neon(param_new));
        d += LANES;
    }

    let tail_max = match max_exp_avg_sq {
        Some(m) => Some(&mut m[simd_len..]),
        None => None,
    };
    adam_update_chunk_bf16_scalar(
        &mut param[simd_len..],
        &mut trail[simd_len..],
        &mut exp_avg[simd_len..],
        &mut exp_avg_sq[simd_len..],
        tail_max,
        &grad[simd_len..],
        c,
    );
}

#[cfg(target_arch = "aarch64")]
pub unsafe fn adam_update_chunk_bf16_grad_neon(
    param: &mut [f32],
    mirror: &mut [bf16],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    mut max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[bf16],
    c: &StepCoefficients<f32>,
) {
    const LANES: usize = LANES_NEON_BF16;
    let len = param.len();
    let simd_len = len & !(LANES - 1);
    let k = adam_consts_f32_neon(c);

    let mirror_bits = mirror.as_mut_ptr() as *mut u16;
    let grad_bits = grad.as_ptr() as *const u16;

    let mut d = 0;
    while d < simd_len {
        let grad_vec = bf16_widen_neon(vld1_u16(grad_bits.add(d)));
        let param_vec = vld1q_f32(param.as_ptr().add(d));
        let max_ptr = match max_exp_avg_sq {
            Some(ref mut m) => Some(m.as_mut_ptr().add(d)),
            None => None,
        };
        let param_new = adam_update_lanes_f32_neon(
            param_vec,
            grad_vec,
            exp_avg.as_mut_ptr().add(d),
            exp_avg_sq.as_mut_ptr().add(d),
            max_ptr,
            &k,
        );
        vst1q_f32(param.as_mut_ptr().add(d), param_new);
        // sync the bf16 mirror from the f32 master copy
        vst1_u16(mirror_bits.add(d), bf16_narrow_rne_neon(param_new));
        d += LANES;
    }

    let tail_max = match max_exp_avg_sq {
        Some(m) => Some(&mut m[simd_len..]),
        None => None,
    };
    adam_update_chunk_bf16_grad_scalar(
        &mut param[simd_len..],
        &mut mirror[simd_len..],
        &mut exp_avg[simd_len..],
        &mut exp_avg_sq[simd_len..],
        tail_max,
        &grad[simd_len..],
        c,
    );
}
