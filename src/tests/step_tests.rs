// SPDX-License-Identifier: Apache-2.0

#[cfg(test)]
mod tests {
    #[allow(unused_imports)]
    use crate::test_utils::config_test_logger;
    use crate::test_utils::reference_adam_update;
    use crate::types::AdamHyperParams;
    use crate::{adam_update_scalar, StepCoefficients};

    fn hp(step: f64, beta1: f64, beta2: f64, lr: f64, wd: f64, eps: f64) -> AdamHyperParams {
        AdamHyperParams {
            step,
            beta1,
            beta2,
            learning_rate: lr,
            weight_decay: wd,
            eps,
        }
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        let diff = (actual - expected).abs();
        let scale = expected.abs().max(1.0);
        assert!(
            diff <= tol * scale,
            "value mismatch: expected={}, got={}, diff={}",
            expected,
            actual,
            diff
        );
    }

    // =============================================================================
    //   COEFFICIENT PRECOMPUTATION
    // =============================================================================

    #[test]
    fn test_step_coefficients_first_step() {
        let c = StepCoefficients::<f64>::from_hyper(&hp(1.0, 0.9, 0.999, 1e-3, 0.0, 1e-8));
        // bias corrections at step 1: 1 - beta^1
        assert_close(c.step_size, 1e-3 / (1.0 - 0.9), 1e-12);
        assert_close(c.bias_correction2_sqrt, (1.0 - 0.999f64).sqrt(), 1e-12);
        assert_close(c.exp_avg_coeff, 0.1, 1e-12);
        assert_close(c.exp_avg_sq_coeff, 1e-3, 1e-12);
    }

    #[test]
    fn test_step_coefficients_later_step() {
        let c = StepCoefficients::<f64>::from_hyper(&hp(1000.0, 0.9, 0.999, 1e-2, 0.0, 1e-8));
        assert_close(c.step_size, 1e-2 / (1.0 - 0.9f64.powf(1000.0)), 1e-12);
        assert_close(
            c.bias_correction2_sqrt,
            (1.0 - 0.999f64.powf(1000.0)).sqrt(),
            1e-12,
        );
    }

    #[test]
    fn test_step_coefficients_narrow_to_f32() {
        // shared scalars are computed at f64 and then narrowed once
        let h = hp(7.0, 0.9, 0.999, 1e-3, 0.01, 1e-8);
        let c64 = StepCoefficients::<f64>::from_hyper(&h);
        let c32 = StepCoefficients::<f32>::from_hyper(&h);
        assert_eq!(c32.step_size, c64.step_size as f32);
        assert_eq!(c32.bias_correction2_sqrt, c64.bias_correction2_sqrt as f32);
        assert_eq!(c32.weight_decay, c64.weight_decay as f32);
    }

    // =============================================================================
    //   SCALAR UPDATE RULE
    // =============================================================================

    #[test]
    fn test_scalar_update_matches_reference_f64() {
        config_test_logger();
        let h = hp(3.0, 0.9, 0.999, 1e-3, 0.01, 1e-8);
        let c = StepCoefficients::<f64>::from_hyper(&h);

        let mut param = 0.75f64;
        let mut exp_avg = 0.1f64;
        let mut exp_avg_sq = 0.02f64;

        let mut ref_param = param;
        let mut ref_exp_avg = exp_avg;
        let mut ref_exp_avg_sq = exp_avg_sq;

        param = adam_update_scalar(param, -0.3, &mut exp_avg, &mut exp_avg_sq, None, &c);
        reference_adam_update(
            &mut ref_param,
            -0.3,
            &mut ref_exp_avg,
            &mut ref_exp_avg_sq,
            None,
            3.0,
            0.9,
            0.999,
            1e-3,
            0.01,
            1e-8,
        );

        assert_close(param, ref_param, 1e-12);
        assert_close(exp_avg, ref_exp_avg, 1e-12);
        assert_close(exp_avg_sq, ref_exp_avg_sq, 1e-12);
    }

    #[test]
    fn test_scalar_update_first_step_zero_state() {
        let h = hp(1.0, 0.9, 0.999, 1e-3, 0.0, 1e-8);
        let c = StepCoefficients::<f64>::from_hyper(&h);

        let mut exp_avg = 0.0f64;
        let mut exp_avg_sq = 0.0f64;
        let param = adam_update_scalar(1.0, 0.5, &mut exp_avg, &mut exp_avg_sq, None, &c);

        assert_close(exp_avg, 0.05, 1e-12);
        assert_close(exp_avg_sq, 0.00025, 1e-12);
        // denom = sqrt(0.00025)/sqrt(0.001) + eps = 0.5 + 1e-8,
        // step_size = 1e-3/0.1 = 0.01, so param moves by ~0.001
        assert_close(param, 1.0 - 0.01 * 0.05 / (0.5 + 1e-8), 1e-12);
    }

    #[test]
    fn test_scalar_update_lerp_branches_agree() {
        // small and large lerp weights take different branches, including the
        // pair straddling the |w| < 0.5 boundary; all must match the reference
        for beta1 in [0.9f64, 0.2, 0.501, 0.499] {
            let h = hp(2.0, beta1, 0.999, 1e-3, 0.0, 1e-8);
            let c = StepCoefficients::<f64>::from_hyper(&h);

            let mut exp_avg = 0.4f64;
            let mut exp_avg_sq = 0.1f64;
            let mut ref_exp_avg = exp_avg;
            let mut ref_exp_avg_sq = exp_avg_sq;
            let mut ref_param = 1.0f64;

            let param = adam_update_scalar(1.0, -0.7, &mut exp_avg, &mut exp_avg_sq, None, &c);
            reference_adam_update(
                &mut ref_param,
                -0.7,
                &mut ref_exp_avg,
                &mut ref_exp_avg_sq,
                None,
                2.0,
                beta1,
                0.999,
                1e-3,
                0.0,
                1e-8,
            );

            assert_close(exp_avg, ref_exp_avg, 1e-12);
            assert_close(param, ref_param, 1e-12);
        }
    }

    #[test]
    fn test_scalar_update_zero_weight_decay_isolates_nan_param() {
        // a NaN parameter with weight_decay == 0 must not poison the moments
        let h = hp(1.0, 0.9, 0.999, 1e-3, 0.0, 1e-8);
        let c = StepCoefficients::<f32>::from_hyper(&h);

        let mut exp_avg = 0.0f32;
        let mut exp_avg_sq = 0.0f32;
        let param = adam_update_scalar(f32::NAN, 0.5, &mut exp_avg, &mut exp_avg_sq, None, &c);

        assert!(param.is_nan());
        assert!(exp_avg.is_finite());
        assert!(exp_avg_sq.is_finite());
    }

    #[test]
    fn test_scalar_update_weight_decay_accumulates_into_grad() {
        let h = hp(1.0, 0.9, 0.999, 1e-3, 0.1, 1e-8);
        let c = StepCoefficients::<f64>::from_hyper(&h);

        let mut exp_avg = 0.0f64;
        let mut exp_avg_sq = 0.0f64;
        let _ = adam_update_scalar(2.0, 0.5, &mut exp_avg, &mut exp_avg_sq, None, &c);

        // effective gradient is 0.5 + 2.0 * 0.1 = 0.7
        assert_close(exp_avg, 0.1 * 0.7, 1e-12);
        assert_close(exp_avg_sq, 1e-3 * 0.7 * 0.7, 1e-12);
    }

    #[test]
    fn test_scalar_update_amsgrad_max_is_monotone() {
        let h = hp(1.0, 0.9, 0.999, 1e-3, 0.0, 1e-8);
        let c = StepCoefficients::<f64>::from_hyper(&h);

        let mut exp_avg = 0.0f64;
        let mut exp_avg_sq = 0.0f64;
        let mut max_exp_avg_sq = 0.0f64;
        let mut param = 1.0f64;
        let mut prev_max = 0.0f64;

        // a large gradient followed by tiny ones; the max must never decrease
        for grad in [4.0f64, 0.01, 0.01, 0.01] {
            param = adam_update_scalar(
                param,
                grad,
                &mut exp_avg,
                &mut exp_avg_sq,
                Some(&mut max_exp_avg_sq),
                &c,
            );
            assert!(
                max_exp_avg_sq >= prev_max,
                "amsgrad max decreased: prev={}, now={}",
                prev_max,
                max_exp_avg_sq
            );
            assert!(max_exp_avg_sq >= exp_avg_sq);
            prev_max = max_exp_avg_sq;
        }
    }

    #[test]
    fn test_scalar_update_amsgrad_denominator_uses_max() {
        let h = hp(1.0, 0.9, 0.999, 1e-2, 0.0, 1e-8);
        let c = StepCoefficients::<f64>::from_hyper(&h);

        // identical inputs, but the amsgrad run carries an inflated max;
        // the inflated denominator must shrink the update
        let mut exp_avg_a = 0.0f64;
        let mut exp_avg_sq_a = 0.0f64;
        let plain = adam_update_scalar(1.0, 0.5, &mut exp_avg_a, &mut exp_avg_sq_a, None, &c);

        let mut exp_avg_b = 0.0f64;
        let mut exp_avg_sq_b = 0.0f64;
        let mut max = 10.0f64;
        let clamped =
            adam_update_scalar(1.0, 0.5, &mut exp_avg_b, &mut exp_avg_sq_b, Some(&mut max), &c);

        assert!((1.0 - clamped).abs() < (1.0 - plain).abs());
    }

    #[test]
    fn test_scalar_update_multi_step_trajectory_f32() {
        // run several consecutive steps and track against the f64 reference
        let mut param = 1.5f32;
        let mut exp_avg = 0.0f32;
        let mut exp_avg_sq = 0.0f32;

        let mut ref_param = 1.5f64;
        let mut ref_exp_avg = 0.0f64;
        let mut ref_exp_avg_sq = 0.0f64;

        let grads = [0.3f32, -0.2, 0.05, 0.4, -0.1];
        for (i, &g) in grads.iter().enumerate() {
            let step = (i + 1) as f64;
            let h = hp(step, 0.9, 0.999, 1e-2, 0.01, 1e-8);
            let c = StepCoefficients::<f32>::from_hyper(&h);
            param = adam_update_scalar(param, g, &mut exp_avg, &mut exp_avg_sq, None, &c);
            reference_adam_update(
                &mut ref_param,
                g as f64,
                &mut ref_exp_avg,
                &mut ref_exp_avg_sq,
                None,
                step,
                0.9,
                0.999,
                1e-2,
                0.01,
                1e-8,
            );
        }

        assert_close(param as f64, ref_param, 1e-5);
        assert_close(exp_avg as f64, ref_exp_avg, 1e-5);
        assert_close(exp_avg_sq as f64, ref_exp_avg_sq, 1e-5);
    }
}
