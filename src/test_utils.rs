// SPDX-License-Identifier: Apache-2.0

/// Test-only helpers.
///
/// Keep this module lightweight and dependency-free so `cargo test` works out of the box.
pub fn config_test_logger() {
    // Intentionally a no-op.
    // Some tests call this to enable logging in downstream repos; the crate doesn't
    // require a logger for correctness.
}

/// Reference Adam/AMSGrad update at f64 precision, one element at a time.
///
/// Used by the kernel and dispatch tests to cross-check the fused paths.
#[allow(clippy::too_many_arguments)]
pub fn reference_adam_update(
    param: &mut f64,
    grad: f64,
    exp_avg: &mut f64,
    exp_avg_sq: &mut f64,
    max_exp_avg_sq: Option<&mut f64>,
    step: f64,
    beta1: f64,
    beta2: f64,
    learning_rate: f64,
    weight_decay: f64,
    eps: f64,
) {
    let mut grad = grad;
    if weight_decay != 0.0 {
        grad += *param * weight_decay;
    }
    *exp_avg += (1.0 - beta1) * (grad - *exp_avg);
    *exp_avg_sq = *exp_avg_sq * beta2 + (1.0 - beta2) * grad * grad;
    let denom_base = match max_exp_avg_sq {
        Some(max) => {
            *max = max.max(*exp_avg_sq);
            *max
        }
        None => *exp_avg_sq,
    };
    let bias_correction2_sqrt = (1.0 - beta2.powf(step)).sqrt();
    let step_size = learning_rate / (1.0 - beta1.powf(step));
    let denom = denom_base.sqrt() / bias_correction2_sqrt + eps;
    *param -= step_size * *exp_avg / denom;
}
