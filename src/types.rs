// SPDX-License-Identifier: Apache-2.0

// types.rs for fused-adam
use half::bf16;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Element type tag for the buffers handed to the fused step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dtype {
    F32,
    F64,
    Bf16,
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::F32 => write!(f, "float32"),
            Dtype::F64 => write!(f, "float64"),
            Dtype::Bf16 => write!(f, "bfloat16"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FusedAdamError {
    #[error("unsupported dtype combination: grad={grad}, param={param}")]
    UnsupportedDtype { grad: Dtype, param: Dtype },
    #[error("invalid state dtype: expect {buffer} to be {expected}, got {actual}")]
    InvalidStateDtype {
        buffer: &'static str,
        expected: Dtype,
        actual: Dtype,
    },
    #[error("invalid argument: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, FusedAdamError>;

/// Scalar hyperparameters for one optimizer step.
///
/// All values are kept at double precision; the shared per-step coefficients
/// are derived from them in f64 before being narrowed to the compute type of
/// the selected kernel variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdamHyperParams {
    /// Step count, starting at 1 for the first update.
    pub step: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub eps: f64,
}

impl Default for AdamHyperParams {
    fn default() -> Self {
        Self {
            step: 1.0,
            beta1: 0.9,
            beta2: 0.999,
            learning_rate: 1e-3,
            weight_decay: 0.0,
            eps: 1e-8,
        }
    }
}

// =============================================================================
// STRIDED TENSOR VIEWS
// =============================================================================

/// A mutable view over caller-owned storage with an element stride.
///
/// Stride 1 is the contiguous case and the only layout the kernels operate on
/// directly. For stride > 1 the dispatcher gathers the view into a contiguous
/// working copy before the parallel region and scatters the results back
/// afterwards, so output values never depend on the layout.
#[derive(Debug)]
pub struct Strided<'a, T> {
    pub(crate) data: &'a mut [T],
    pub(crate) stride: usize,
}

impl<'a, T: Copy> Strided<'a, T> {
    /// Contiguous view over `data`.
    pub fn new(data: &'a mut [T]) -> Self {
        Self { data, stride: 1 }
    }

    /// View selecting every `stride`-th element of `data`.
    pub fn with_stride(data: &'a mut [T], stride: usize) -> Result<Self> {
        if stride == 0 {
            return Err(FusedAdamError::Invalid(
                "stride must be non-zero".to_string(),
            ));
        }
        Ok(Self { data, stride })
    }

    /// Logical element count of the view.
    pub fn len(&self) -> usize {
        if self.stride == 1 {
            self.data.len()
        } else {
            self.data.len().div_ceil(self.stride)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_contiguous(&self) -> bool {
        self.stride == 1
    }
}

/// Read-only counterpart of [`Strided`].
#[derive(Debug, Clone, Copy)]
pub struct StridedRef<'a, T> {
    pub(crate) data: &'a [T],
    pub(crate) stride: usize,
}

impl<'a, T: Copy> StridedRef<'a, T> {
    pub fn new(data: &'a [T]) -> Self {
        Self { data, stride: 1 }
    }

    pub fn with_stride(data: &'a [T], stride: usize) -> Result<Self> {
        if stride == 0 {
            return Err(FusedAdamError::Invalid(
                "stride must be non-zero".to_string(),
            ));
        }
        Ok(Self { data, stride })
    }

    pub fn len(&self) -> usize {
        if self.stride == 1 {
            self.data.len()
        } else {
            self.data.len().div_ceil(self.stride)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_contiguous(&self) -> bool {
        self.stride == 1
    }
}

/// A dtype-tagged mutable buffer view.
#[derive(Debug)]
pub enum TensorMut<'a> {
    F32(Strided<'a, f32>),
    F64(Strided<'a, f64>),
    Bf16(Strided<'a, bf16>),
}

impl<'a> TensorMut<'a> {
    pub fn from_f32(data: &'a mut [f32]) -> Self {
        TensorMut::F32(Strided::new(data))
    }

    pub fn from_f64(data: &'a mut [f64]) -> Self {
        TensorMut::F64(Strided::new(data))
    }

    pub fn from_bf16(data: &'a mut [bf16]) -> Self {
        TensorMut::Bf16(Strided::new(data))
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            TensorMut::F32(_) => Dtype::F32,
            TensorMut::F64(_) => Dtype::F64,
            TensorMut::Bf16(_) => Dtype::Bf16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorMut::F32(s) => s.len(),
            TensorMut::F64(s) => s.len(),
            TensorMut::Bf16(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dtype-tagged read-only buffer view.
#[derive(Debug, Clone, Copy)]
pub enum TensorRef<'a> {
    F32(StridedRef<'a, f32>),
    F64(StridedRef<'a, f64>),
    Bf16(StridedRef<'a, bf16>),
}

impl<'a> TensorRef<'a> {
    pub fn from_f32(data: &'a [f32]) -> Self {
        TensorRef::F32(StridedRef::new(data))
    }

    pub fn from_f64(data: &'a [f64]) -> Self {
        TensorRef::F64(StridedRef::new(data))
    }

    pub fn from_bf16(data: &'a [bf16]) -> Self {
        TensorRef::Bf16(StridedRef::new(data))
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            TensorRef::F32(_) => Dtype::F32,
            TensorRef::F64(_) => Dtype::F64,
            TensorRef::Bf16(_) => Dtype::Bf16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorRef::F32(s) => s.len(),
            TensorRef::F64(s) => s.len(),
            TensorRef::Bf16(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// CONTIGUOUS WORKING COPIES
// =============================================================================

/// Contiguous working storage for one mutable buffer.
///
/// A contiguous view is borrowed directly; a strided view is gathered into an
/// owned copy up front. `write_back` scatters an owned copy into the original
/// storage and is a no-op for the borrowed case. Gathering happens before the
/// parallel region so no allocation occurs inside it.
pub(crate) enum WorkSlice<'a, T: Copy> {
    Direct(&'a mut [T]),
    Copied {
        work: Vec<T>,
        dest: &'a mut [T],
        stride: usize,
    },
}

impl<'a, T: Copy> WorkSlice<'a, T> {
    pub(crate) fn from_view(view: Strided<'a, T>) -> Self {
        if view.stride == 1 {
            WorkSlice::Direct(view.data)
        } else {
            let work: Vec<T> = view.data.iter().step_by(view.stride).copied().collect();
            WorkSlice::Copied {
                work,
                dest: view.data,
                stride: view.stride,
            }
        }
    }

    pub(crate) fn slice_mut(&mut self) -> &mut [T] {
        match self {
            WorkSlice::Direct(s) => s,
            WorkSlice::Copied { work, .. } => work,
        }
    }

    pub(crate) fn write_back(self) {
        if let WorkSlice::Copied { work, dest, stride } = self {
            for (i, v) in work.iter().enumerate() {
                dest[i * stride] = *v;
            }
        }
    }
}

/// Contiguous working storage for one read-only buffer.
pub(crate) enum WorkRef<'a, T: Copy> {
    Direct(&'a [T]),
    Copied(Vec<T>),
}

impl<'a, T: Copy> WorkRef<'a, T> {
    pub(crate) fn from_view(view: StridedRef<'a, T>) -> Self {
        if view.stride == 1 {
            WorkRef::Direct(view.data)
        } else {
            WorkRef::Copied(view.data.iter().step_by(view.stride).copied().collect())
        }
    }

    pub(crate) fn slice(&self) -> &[T] {
        match self {
            WorkRef::Direct(s) => s,
            WorkRef::Copied(v) => v,
        }
    }
}
