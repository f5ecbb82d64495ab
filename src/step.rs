// SPDX-License-Identifier: Apache-2.0

//! The per-element Adam/AMSGrad update rule and its shared scalar coefficients.
//!
//! The rule is written once, generic over the compute float type, and is used
//! verbatim by the scalar chunk fallback and by the remainder tails of every
//! SIMD kernel, so results never depend on where a chunk boundary falls.

use crate::types::AdamHyperParams;
use half::bf16;
use num_traits::Float;

/// Compute float types the update rule is instantiated for.
pub trait Real: Float + Send + Sync {
    fn from_f64(x: f64) -> Self;
}

impl Real for f32 {
    #[inline(always)]
    fn from_f64(x: f64) -> f32 {
        x as f32
    }
}

impl Real for f64 {
    #[inline(always)]
    fn from_f64(x: f64) -> f64 {
        x
    }
}

/// Per-step scalar coefficients shared across all elements.
///
/// Derived once per call, in double precision, then narrowed to the compute
/// type of the selected kernel variant. The learning rate reaches the kernels
/// only through `step_size`.
#[derive(Debug, Clone, Copy)]
pub struct StepCoefficients<T> {
    pub beta2: T,
    pub weight_decay: T,
    pub eps: T,
    /// `learning_rate / (1 - beta1^step)`
    pub step_size: T,
    /// `sqrt(1 - beta2^step)`
    pub bias_correction2_sqrt: T,
    /// `1 - beta1`, the lerp weight of the first-moment update
    pub exp_avg_coeff: T,
    /// `1 - beta2`
    pub exp_avg_sq_coeff: T,
}

impl<T: Real> StepCoefficients<T> {
    pub fn from_hyper(hp: &AdamHyperParams) -> Self {
        // all shared scalars are computed at double precision before narrowing
        let bias_correction1 = 1.0 - hp.beta1.powf(hp.step);
        let step_size = hp.learning_rate / bias_correction1;
        let bias_correction2 = 1.0 - hp.beta2.powf(hp.step);
        let bias_correction2_sqrt = bias_correction2.sqrt();
        let exp_avg_coeff = 1.0 - hp.beta1;
        let exp_avg_sq_coeff = 1.0 - hp.beta2;
        Self {
            beta2: T::from_f64(hp.beta2),
            weight_decay: T::from_f64(hp.weight_decay),
            eps: T::from_f64(hp.eps),
            step_size: T::from_f64(step_size),
            bias_correction2_sqrt: T::from_f64(bias_correction2_sqrt),
            exp_avg_coeff: T::from_f64(exp_avg_coeff),
            exp_avg_sq_coeff: T::from_f64(exp_avg_sq_coeff),
        }
    }
}

/// Apply the fused update to a single element and return the new parameter.
///
/// The first moment uses the lerp formulation with a weight-magnitude branch:
/// the two arms are equivalent reformulations chosen for accuracy near the
/// endpoints, and the selection condition (`|1 - beta1| < 0.5`) must match the
/// vectorized mask exactly.
#[inline(always)]
pub fn adam_update_scalar<T: Real>(
    param: T,
    grad: T,
    exp_avg: &mut T,
    exp_avg_sq: &mut T,
    max_exp_avg_sq: Option<&mut T>,
    c: &StepCoefficients<T>,
) -> T {
    let mut grad_val = grad;
    if c.weight_decay != T::zero() {
        // only accumulate weight decay when weight_decay != 0 to avoid NaN
        // propagation from param to grad
        grad_val = grad_val + param * c.weight_decay;
    }

    // exp_avg.lerp(grad, 1 - beta1), branch-exact
    let is_lerp_weight_small = c.exp_avg_coeff.abs() < T::from_f64(0.5);
    if is_lerp_weight_small {
        *exp_avg = *exp_avg + c.exp_avg_coeff * (grad_val - *exp_avg);
    } else {
        *exp_avg = grad_val - (grad_val - *exp_avg) * (T::one() - c.exp_avg_coeff);
    }

    *exp_avg_sq = *exp_avg_sq * c.beta2 + c.exp_avg_sq_coeff * grad_val * grad_val;

    let denom = match max_exp_avg_sq {
        Some(max) => {
            *max = max.max(*exp_avg_sq);
            max.sqrt() / c.bias_correction2_sqrt + c.eps
        }
        None => exp_avg_sq.sqrt() / c.bias_correction2_sqrt + c.eps,
    };

    param - c.step_size * *exp_avg / denom
}

// =============================================================================
// PRECISION-SPLIT REPRESENTATION
// =============================================================================

/// Reconstruct an f32 from its precision-split halves.
///
/// The split representation stores the top 16 bits of an f32 as a bf16 value
/// and the bottom 16 mantissa bits in a second bf16-typed buffer. The round
/// trip through [`split_pack`] is exact for every f32 bit pattern.
#[inline(always)]
pub fn split_unpack(top: bf16, trail: bf16) -> f32 {
    f32::from_bits(((top.to_bits() as u32) << 16) | trail.to_bits() as u32)
}

/// Split an f32 into its bf16 top half and trailing mantissa bits.
#[inline(always)]
pub fn split_pack(value: f32) -> (bf16, bf16) {
    let bits = value.to_bits();
    (
        bf16::from_bits((bits >> 16) as u16),
        bf16::from_bits(bits as u16),
    )
}
