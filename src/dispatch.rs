// SPDX-License-Identifier: Apache-2.0

//! # Fused Adam dispatch layer
//!
//! This module contains the dispatch layer of the crate: it validates the
//! buffers handed in for one optimizer step, resolves the (grad, param) dtype
//! combination to a concrete kernel variant, and chooses between the scalar
//! implementation and hardware-accelerated backends based on target
//! capabilities and input sizes. Chunks of `ADAM_GRAIN_SIZE` elements are
//! distributed over the rayon thread pool; each chunk then runs the tiered
//! scalar/SIMD dispatch independently.

use log::trace;
use rayon::prelude::*;

use half::bf16;

use super::constants::*;

#[cfg(target_arch = "aarch64")]
use std::arch::is_aarch64_feature_detected;

use crate::kernels;
use crate::step::StepCoefficients;
use crate::types::{
    AdamHyperParams, Dtype, FusedAdamError, Result, Strided, TensorMut, TensorRef, WorkRef,
    WorkSlice,
};

// =============================================================================
//  HARDWARE DETECTION & SIMD CAPABILITIES
// =============================================================================

/// Hardware capability detection used by the dispatch layer
pub struct HardwareCapabilities {
    pub has_avx2: bool,
    pub has_neon: bool,
}

impl HardwareCapabilities {
    /// Detect SIMD capabilities at runtime.
    ///
    /// The AVX2 kernels use fused multiply-add, so AVX2 only counts as
    /// available when FMA is present as well.
    #[inline]
    pub fn detect() -> Self {
        HardwareCapabilities {
            has_avx2: Self::detect_avx2(),
            has_neon: Self::detect_neon(),
        }
    }

    fn detect_avx2() -> bool {
        #[allow(unused_mut)]
        let mut detected_avx2 = false;

        #[cfg(target_arch = "x86_64")]
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            detected_avx2 = true;
        }

        detected_avx2
    }

    fn detect_neon() -> bool {
        #[allow(unused_mut)]
        let mut detected_neon = false;

        #[cfg(target_arch = "aarch64")]
        if is_aarch64_feature_detected!("neon") {
            detected_neon = true;
        }

        detected_neon
    }
}

/// Get hardware capabilities for the current platform
#[inline]
pub fn get_hw_capabilities() -> HardwareCapabilities {
    HardwareCapabilities::detect()
}

// =============================================================================
//  PER-CHUNK TIERED DISPATCH
// =============================================================================

#[inline]
fn adam_step_chunk_f32(
    param: &mut [f32],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[f32],
    c: &StepCoefficients<f32>,
) {
    if param.len() >= SIMD_THRESHOLD_ADAM {
        #[cfg(target_arch = "x86_64")]
        if get_hw_capabilities().has_avx2 {
            unsafe {
                kernels::adam_update_chunk_f32_avx2(
                    param,
                    exp_avg,
                    exp_avg_sq,
                    max_exp_avg_sq,
                    grad,
                    c,
                )
            };
            return;
        }
        #[cfg(target_arch = "aarch64")]
        if get_hw_capabilities().has_neon {
            unsafe {
                kernels::adam_update_chunk_f32_neon(
                    param,
                    exp_avg,
                    exp_avg_sq,
                    max_exp_avg_sq,
                    grad,
                    c,
                )
            };
            return;
        }
    }
    kernels::adam_update_chunk_scalar(param, exp_avg, exp_avg_sq, max_exp_avg_sq, grad, c);
}

#[inline]
fn adam_step_chunk_f64(
    param: &mut [f64],
    exp_avg: &mut [f64],
    exp_avg_sq: &mut [f64],
    max_exp_avg_sq: Option<&mut [f64]>,
    grad: &[f64],
    c: &StepCoefficients<f64>,
) {
    if param.len() >= SIMD_THRESHOLD_ADAM {
        #[cfg(target_arch = "x86_64")]
        if get_hw_capabilities().has_avx2 {
            unsafe {
                kernels::adam_update_chunk_f64_avx2(
                    param,
                    exp_avg,
                    exp_avg_sq,
                    max_exp_avg_sq,
                    grad,
                    c,
                )
            };
            return;
        }
        #[cfg(target_arch = "aarch64")]
        if get_hw_capabilities().has_neon {
            unsafe {
                kernels::adam_update_chunk_f64_neon(
                    param,
                    exp_avg,
                    exp_avg_sq,
                    max_exp_avg_sq,
                    grad,
                    c,
                )
            };
            return;
        }
    }
    kernels::adam_update_chunk_scalar(param, exp_avg, exp_avg_sq, max_exp_avg_sq, grad, c);
}

#[inline]
fn adam_step_chunk_bf16(
    param: &mut [bf16],
    trail: &mut [bf16],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[bf16],
    c: &StepCoefficients<f32>,
) {
    if param.len() >= SIMD_THRESHOLD_ADAM {
        #[cfg(target_arch = "x86_64")]
        if get_hw_capabilities().has_avx2 {
            unsafe {
                kernels::adam_update_chunk_bf16_avx2(
                    param,
                    trail,
                    exp_avg,
                    exp_avg_sq,
                    max_exp_avg_sq,
                    grad,
                    c,
                )
            };
            return;
        }
        #[cfg(target_arch = "aarch64")]
        if get_hw_capabilities().has_neon {
            unsafe {
                kernels::adam_update_chunk_bf16_neon(
                    param,
                    trail,
                    exp_avg,
                    exp_avg_sq,
                    max_exp_avg_sq,
                    grad,
                    c,
                )
            };
            return;
        }
    }
    kernels::adam_update_chunk_bf16_scalar(param, trail, exp_avg, exp_avg_sq, max_exp_avg_sq, grad, c);
}

#[inline]
fn adam_step_chunk_bf16_grad(
    param: &mut [f32],
    mirror: &mut [bf16],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[bf16],
    c: &StepCoefficients<f32>,
) {
    if param.len() >= SIMD_THRESHOLD_ADAM {
        #[cfg(target_arch = "x86_64")]
        if get_hw_capabilities().has_avx2 {
            unsafe {
                kernels::adam_update_chunk_bf16_grad_avx2(
                    param,
                    mirror,
                    exp_avg,
                    exp_avg_sq,
                    max_exp_avg_sq,
                    grad,
                    c,
                )
            };
            return;
        }
        #[cfg(target_arch = "aarch64")]
        if get_hw_capabilities().has_neon {
            unsafe {
                kernels::adam_update_chunk_bf16_grad_neon(
                    param,
                    mirror,
                    exp_avg,
                    exp_avg_sq,
                    max_exp_avg_sq,
                    grad,
                    c,
                )
            };
            return;
        }
    }
    kernels::adam_update_chunk_bf16_grad_scalar(
        param,
        mirror,
        exp_avg,
        exp_avg_sq,
        max_exp_avg_sq,
        grad,
        c,
    );
}

// =============================================================================
//  PARALLEL VARIANT DRIVERS
// =============================================================================

fn adam_fused_step_f32(
    param: &mut [f32],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[f32],
    c: &StepCoefficients<f32>,
) {
    match max_exp_avg_sq {
        Some(max) => {
            param
                .par_chunks_mut(ADAM_GRAIN_SIZE)
                .zip(exp_avg.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(exp_avg_sq.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(max.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(grad.par_chunks(ADAM_GRAIN_SIZE))
                .for_each(|((((p, m1), m2), mx), g)| {
                    adam_step_chunk_f32(p, m1, m2, Some(mx), g, c);
                });
        }
        None => {
            param
                .par_chunks_mut(ADAM_GRAIN_SIZE)
                .zip(exp_avg.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(exp_avg_sq.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(grad.par_chunks(ADAM_GRAIN_SIZE))
                .for_each(|(((p, m1), m2), g)| {
                    adam_step_chunk_f32(p, m1, m2, None, g, c);
                });
        }
    }
}

fn adam_fused_step_f64(
    param: &mut [f64],
    exp_avg: &mut [f64],
    exp_avg_sq: &mut [f64],
    max_exp_avg_sq: Option<&mut [f64]>,
    grad: &[f64],
    c: &StepCoefficients<f64>,
) {
    match max_exp_avg_sq {
        Some(max) => {
            param
                .par_chunks_mut(ADAM_GRAIN_SIZE)
                .zip(exp_avg.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(exp_avg_sq.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(max.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(grad.par_chunks(ADAM_GRAIN_SIZE))
                .for_each(|((((p, m1), m2), mx), g)| {
                    adam_step_chunk_f64(p, m1, m2, Some(mx), g, c);
                });
        }
        None => {
            param
                .par_chunks_mut(ADAM_GRAIN_SIZE)
                .zip(exp_avg.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(exp_avg_sq.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(grad.par_chunks(ADAM_GRAIN_SIZE))
                .for_each(|(((p, m1), m2), g)| {
                    adam_step_chunk_f64(p, m1, m2, None, g, c);
                });
        }
    }
}

fn adam_fused_step_bf16(
    param: &mut [bf16],
    trail: &mut [bf16],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[bf16],
    c: &StepCoefficients<f32>,
) {
    match max_exp_avg_sq {
        Some(max) => {
            param
                .par_chunks_mut(ADAM_GRAIN_SIZE)
                .zip(trail.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(exp_avg.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(exp_avg_sq.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(max.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(grad.par_chunks(ADAM_GRAIN_SIZE))
                .for_each(|(((((p, t), m1), m2), mx), g)| {
                    adam_step_chunk_bf16(p, t, m1, m2, Some(mx), g, c);
                });
        }
        None => {
            param
                .par_chunks_mut(ADAM_GRAIN_SIZE)
                .zip(trail.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(exp_avg.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(exp_avg_sq.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(grad.par_chunks(ADAM_GRAIN_SIZE))
                .for_each(|((((p, t), m1), m2), g)| {
                    adam_step_chunk_bf16(p, t, m1, m2, None, g, c);
                });
        }
    }
}

fn adam_fused_step_bf16_grad(
    param: &mut [f32],
    mirror: &mut [bf16],
    exp_avg: &mut [f32],
    exp_avg_sq: &mut [f32],
    max_exp_avg_sq: Option<&mut [f32]>,
    grad: &[bf16],
    c: &StepCoefficients<f32>,
) {
    match max_exp_avg_sq {
        Some(max) => {
            param
                .par_chunks_mut(ADAM_GRAIN_SIZE)
                .zip(mirror.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(exp_avg.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(exp_avg_sq.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(max.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(grad.par_chunks(ADAM_GRAIN_SIZE))
                .for_each(|(((((p, t), m1), m2), mx), g)| {
                    adam_step_chunk_bf16_grad(p, t, m1, m2, Some(mx), g, c);
                });
        }
        None => {
            param
                .par_chunks_mut(ADAM_GRAIN_SIZE)
                .zip(mirror.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(exp_avg.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(exp_avg_sq.par_chunks_mut(ADAM_GRAIN_SIZE))
                .zip(grad.par_chunks(ADAM_GRAIN_SIZE))
                .for_each(|((((p, t), m1), m2), g)| {
                    adam_step_chunk_bf16_grad(p, t, m1, m2, None, g, c);
                });
        }
    }
}

// =============================================================================
//  BUFFER VALIDATION HELPERS
// =============================================================================

fn expect_f32<'a>(t: TensorMut<'a>, buffer: &'static str) -> Result<Strided<'a, f32>> {
    match t {
        TensorMut::F32(s) => Ok(s),
        other => Err(FusedAdamError::InvalidStateDtype {
            buffer,
            expected: Dtype::F32,
            actual: other.dtype(),
        }),
    }
}

fn expect_f64<'a>(t: TensorMut<'a>, buffer: &'static str) -> Result<Strided<'a, f64>> {
    match t {
        TensorMut::F64(s) => Ok(s),
        other => Err(FusedAdamError::InvalidStateDtype {
            buffer,
            expected: Dtype::F64,
            actual: other.dtype(),
        }),
    }
}

fn expect_bf16<'a>(t: TensorMut<'a>, buffer: &'static str) -> Result<Strided<'a, bf16>> {
    match t {
        TensorMut::Bf16(s) => Ok(s),
        other => Err(FusedAdamError::InvalidStateDtype {
            buffer,
            expected: Dtype::Bf16,
            actual: other.dtype(),
        }),
    }
}

fn check_len(buffer: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(FusedAdamError::Invalid(format!(
            "buffer length mismatch in adam_fused_step: param={expected}, {buffer}={actual}"
        )));
    }
    Ok(())
}

// =============================================================================
//  PUBLIC ENTRY POINT
// =============================================================================

/// Perform one fused Adam (or AMSGrad) update step over a flat parameter view.
///
/// The (grad, param) dtype pair selects the kernel variant:
///
/// - `(f32, f32)` and `(f64, f64)`: state buffers match the parameter dtype.
/// - `(bf16, bf16)`: precision-split parameters. `param` carries the top
///   16 bits of each logical f32 value and `param_trail` the trailing 16 bits;
///   state buffers are f32.
/// - `(bf16, f32)`: f32 master parameters with a bf16 mirror in `param_trail`,
///   refreshed after the update with round-to-nearest-even; state buffers
///   are f32.
///
/// Non-contiguous views are gathered into contiguous working buffers before
/// the kernels run and scattered back afterwards.
///
/// # Arguments
/// * `param` - Parameter buffer, updated in place
/// * `exp_avg` - First-moment state, updated in place
/// * `exp_avg_sq` - Second-moment state, updated in place
/// * `max_exp_avg_sq` - AMSGrad running maximum, required when `amsgrad` is set
/// * `grad` - Gradient buffer, read-only
/// * `param_trail` - Trailing-bits buffer (bf16 split) or bf16 mirror (bf16 grad)
/// * `amsgrad` - Use the AMSGrad denominator instead of `exp_avg_sq`
/// * `hp` - Scalar hyperparameters for this step
///
/// # Errors
/// * `FusedAdamError::UnsupportedDtype` for a (grad, param) pair with no kernel
/// * `FusedAdamError::InvalidStateDtype` when a state buffer has the wrong dtype
/// * `FusedAdamError::Invalid` for length mismatches, a missing AMSGrad or
///   trailing buffer, or a step count below 1
///
/// # Examples
/// ```rust
/// use fused_adam::types::{AdamHyperParams, TensorMut, TensorRef};
///
/// let mut param = vec![1.0f32, 2.0, 3.0];
/// let mut exp_avg = vec![0.0f32; 3];
/// let mut exp_avg_sq = vec![0.0f32; 3];
/// let grad = vec![0.5f32, 0.5, 0.5];
/// let hp = AdamHyperParams::default();
/// fused_adam::adam_fused_step(
///     TensorMut::from_f32(&mut param),
///     TensorMut::from_f32(&mut exp_avg),
///     TensorMut::from_f32(&mut exp_avg_sq),
///     None,
///     TensorRef::from_f32(&grad),
///     None,
///     false,
///     &hp,
/// )?;
/// assert!(param[0] < 1.0);
/// # Ok::<(), fused_adam::types::FusedAdamError>(())
/// ```
#[allow(clippy::too_many_arguments)]
pub fn adam_fused_step(
    param: TensorMut<'_>,
    exp_avg: TensorMut<'_>,
    exp_avg_sq: TensorMut<'_>,
    max_exp_avg_sq: Option<TensorMut<'_>>,
    grad: TensorRef<'_>,
    param_trail: Option<TensorMut<'_>>,
    amsgrad: bool,
    hp: &AdamHyperParams,
) -> Result<()> {
    let param_len = param.len();
    trace!(
        "ADAM_FUSED_STEP DISPATCH: param.len()={}, grad_dtype={}, param_dtype={}, amsgrad={}, step={}",
        param_len,
        grad.dtype(),
        param.dtype(),
        amsgrad,
        hp.step
    );

    if !hp.step.is_finite() || hp.step < 1.0 {
        return Err(FusedAdamError::Invalid(format!(
            "step count must be at least 1 in adam_fused_step, got {}",
            hp.step
        )));
    }

    check_len("grad", grad.len(), param_len)?;
    check_len("exp_avg", exp_avg.len(), param_len)?;
    check_len("exp_avg_sq", exp_avg_sq.len(), param_len)?;
    if let Some(max) = &max_exp_avg_sq {
        check_len("max_exp_avg_sq", max.len(), param_len)?;
    }
    if let Some(trail) = &param_trail {
        check_len("param_trail", trail.len(), param_len)?;
    }
    if amsgrad && max_exp_avg_sq.is_none() {
        return Err(FusedAdamError::Invalid(
            "amsgrad updates require a max_exp_avg_sq buffer".to_string(),
        ));
    }

    match (grad, param) {
        (TensorRef::F32(grad_view), TensorMut::F32(param_view)) => {
            let exp_avg_view = expect_f32(exp_avg, "exp_avg")?;
            let exp_avg_sq_view = expect_f32(exp_avg_sq, "exp_avg_sq")?;
            let max_view = match max_exp_avg_sq {
                Some(t) => Some(expect_f32(t, "max_exp_avg_sq")?),
                None => None,
            };
            let c = StepCoefficients::<f32>::from_hyper(hp);

            let mut param_w = WorkSlice::from_view(param_view);
            let mut exp_avg_w = WorkSlice::from_view(exp_avg_view);
            let mut exp_avg_sq_w = WorkSlice::from_view(exp_avg_sq_view);
            let mut max_w = if amsgrad {
                max_view.map(WorkSlice::from_view)
            } else {
                None
            };
            let grad_w = WorkRef::from_view(grad_view);

            adam_fused_step_f32(
                param_w.slice_mut(),
                exp_avg_w.slice_mut(),
                exp_avg_sq_w.slice_mut(),
                max_w.as_mut().map(|w| w.slice_mut()),
                grad_w.slice(),
                &c,
            );

            param_w.write_back();
            exp_avg_w.write_back();
            exp_avg_sq_w.write_back();
            if let Some(w) = max_w {
                w.write_back();
            }
            Ok(())
        }
        (TensorRef::F64(grad_view), TensorMut::F64(param_view)) => {
            let exp_avg_view = expect_f64(exp_avg, "exp_avg")?;
            let exp_avg_sq_view = expect_f64(exp_avg_sq, "exp_avg_sq")?;
            let max_view = match max_exp_avg_sq {
                Some(t) => Some(expect_f64(t, "max_exp_avg_sq")?),
                None => None,
            };
            let c = StepCoefficients::<f64>::from_hyper(hp);

            let mut param_w = WorkSlice::from_view(param_view);
            let mut exp_avg_w = WorkSlice::from_view(exp_avg_view);
            let mut exp_avg_sq_w = WorkSlice::from_view(exp_avg_sq_view);
            let mut max_w = if amsgrad {
                max_view.map(WorkSlice::from_view)
            } else {
                None
            };
            let grad_w = WorkRef::from_view(grad_view);

            adam_fused_step_f64(
                param_w.slice_mut(),
                exp_avg_w.slice_mut(),
                exp_avg_sq_w.slice_mut(),
                max_w.as_mut().map(|w| w.slice_mut()),
                grad_w.slice(),
                &c,
            );

            param_w.write_back();
            exp_avg_w.write_back();
            exp_avg_sq_w.write_back();
            if let Some(w) = max_w {
                w.write_back();
            }
            Ok(())
        }
        (TensorRef::Bf16(grad_view), TensorMut::Bf16(param_view)) => {
            let trail_view = match param_trail {
                Some(t) => expect_bf16(t, "param_trail")?,
                None => {
                    return Err(FusedAdamError::Invalid(
                        "precision-split bf16 updates require a param_trail buffer".to_string(),
                    ))
                }
            };
            let exp_avg_view = expect_f32(exp_avg, "exp_avg")?;
            let exp_avg_sq_view = expect_f32(exp_avg_sq, "exp_avg_sq")?;
            let max_view = match max_exp_avg_sq {
                Some(t) => Some(expect_f32(t, "max_exp_avg_sq")?),
                None => None,
            };
            let c = StepCoefficients::<f32>::from_hyper(hp);

            let mut param_w = WorkSlice::from_view(param_view);
            let mut trail_w = WorkSlice::from_view(trail_view);
            let mut exp_avg_w = WorkSlice::from_view(exp_avg_view);
            let mut exp_avg_sq_w = WorkSlice::from_view(exp_avg_sq_view);
            let mut max_w = if amsgrad {
                max_view.map(WorkSlice::from_view)
            } else {
                None
            };
            let grad_w = WorkRef::from_view(grad_view);

            adam_fused_step_bf16(
                param_w.slice_mut(),
                trail_w.slice_mut(),
                exp_avg_w.slice_mut(),
                exp_avg_sq_w.slice_mut(),
                max_w.as_mut().map(|w| w.slice_mut()),
                grad_w.slice(),
                &c,
            );

            param_w.write_back();
            trail_w.write_back();
            exp_avg_w.write_back();
            exp_avg_sq_w.write_back();
            if let Some(w) = max_w {
                w.write_back();
            }
            Ok(())
        }
        (TensorRef::Bf16(grad_view), TensorMut::F32(param_view)) => {
            let mirror_view = match param_trail {
                Some(t) => expect_bf16(t, "param_trail")?,
                None => {
                    return Err(FusedAdamError::Invalid(
                        "bf16-gradient updates of f32 parameters require a bf16 mirror in param_trail"
                            .to_string(),
                    ))
                }
            };
            let exp_avg_view = expect_f32(exp_avg, "exp_avg")?;
            let exp_avg_sq_view = expect_f32(exp_avg_sq, "exp_avg_sq")?;
            let max_view = match max_exp_avg_sq {
                Some(t) => Some(expect_f32(t, "max_exp_avg_sq")?),
                None => None,
            };
            let c = StepCoefficients::<f32>::from_hyper(hp);

            let mut param_w = WorkSlice::from_view(param_view);
            let mut mirror_w = WorkSlice::from_view(mirror_view);
            let mut exp_avg_w = WorkSlice::from_view(exp_avg_view);
            let mut exp_avg_sq_w = WorkSlice::from_view(exp_avg_sq_view);
            let mut max_w = if amsgrad {
                max_view.map(WorkSlice::from_view)
            } else {
                None
            };
            let grad_w = WorkRef::from_view(grad_view);

            adam_fused_step_bf16_grad(
                param_w.slice_mut(),
                mirror_w.slice_mut(),
                exp_avg_w.slice_mut(),
                exp_avg_sq_w.slice_mut(),
                max_w.as_mut().map(|w| w.slice_mut()),
                grad_w.slice(),
                &c,
            );

            param_w.write_back();
            mirror_w.write_back();
            exp_avg_w.write_back();
            exp_avg_sq_w.write_back();
            if let Some(w) = max_w {
                w.write_back();
            }
            Ok(())
        }
        (grad, param) => Err(FusedAdamError::UnsupportedDtype {
            grad: grad.dtype(),
            param: param.dtype(),
        }),
    }
}
