// SPDX-License-Identifier: Apache-2.0

//! Fused Adam library
//!
//! A fused, mixed-precision implementation of the Adam and AMSGrad update
//! step: one pass over the parameter, gradient, and optimizer-state buffers
//! performs weight decay, both moment updates, the AMSGrad maximum, and the
//! bias-corrected parameter update. Kernels have scalar fallbacks and
//! AVX2/NEON backends, and large buffers are chunked over a rayon pool.
//!
//! Supported (grad, param) dtype pairs:
//! - **f32 / f32** and **f64 / f64** with same-dtype state
//! - **bf16 / bf16** with precision-split parameters (top + trailing bits)
//! - **bf16 / f32** with a bf16 mirror kept in sync with the f32 master copy
//!
//! ## Usage
//!
//! ```rust
//! use fused_adam::types::{AdamHyperParams, TensorMut, TensorRef};
//!
//! let mut param = vec![1.0f32; 64];
//! let mut exp_avg = vec![0.0f32; 64];
//! let mut exp_avg_sq = vec![0.0f32; 64];
//! let grad = vec![0.01f32; 64];
//!
//! let hp = AdamHyperParams {
//!     step: 1.0,
//!     learning_rate: 1e-3,
//!     ..AdamHyperParams::default()
//! };
//! fused_adam::adam_fused_step(
//!     TensorMut::from_f32(&mut param),
//!     TensorMut::from_f32(&mut exp_avg),
//!     TensorMut::from_f32(&mut exp_avg_sq),
//!     None,
//!     TensorRef::from_f32(&grad),
//!     None,
//!     false,
//!     &hp,
//! )?;
//!
//! // Check available SIMD capabilities
//! let caps = fused_adam::get_hw_capabilities();
//! println!("Has AVX2: {}", caps.has_avx2);
//! # Ok::<(), fused_adam::types::FusedAdamError>(())
//! ```

pub mod constants;
pub mod dispatch;
pub mod kernels;
pub mod step;
pub mod types;

pub use types::*;

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
#[path = "tests/step_tests.rs"]
mod step_tests;

#[cfg(test)]
#[path = "tests/split_tests.rs"]
mod split_tests;

#[cfg(test)]
#[path = "tests/kernels_tests.rs"]
mod kernels_tests;

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod dispatch_tests;

pub use dispatch::*;
pub use step::{adam_update_scalar, split_pack, split_unpack, StepCoefficients};
