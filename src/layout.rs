//! Shape and element-type checks shared by the layer front ends.

use briny::prelude::*;

use crate::error::{LayerError, Result};
use crate::ops::dispatch::Kernels;
use crate::tensors::{Element, Tensor};

/// Rejects tensors whose shape does not describe their data.
pub(crate) fn check_tensor<T>(op: &'static str, t: &Tensor<T>) -> Result<()> {
    t.validate().map_err(|_| LayerError::MalformedTensor {
        op,
        shape: t.shape.clone(),
        len: t.data.len(),
    })
}

/// Rejects a pair of buffers that disagree in shape.
pub(crate) fn check_same_shape<T>(
    op: &'static str,
    expected: &Tensor<T>,
    found: &Tensor<T>,
) -> Result<()> {
    if expected.shape != found.shape {
        return Err(LayerError::ShapeMismatch {
            op,
            expected: expected.shape.clone(),
            found: found.shape.clone(),
        });
    }
    Ok(())
}

/// Looks up the kernel set for `T`.
pub(crate) fn kernels_for<T: Element>(op: &'static str) -> Result<&'static dyn Kernels<T>> {
    T::kernels().ok_or(LayerError::NotImplemented {
        op,
        dtype: T::DTYPE,
    })
}
