//! Contract errors reported by layer calls.
//!
//! Every variant is a programming error on the caller's side. Nothing here is
//! retried; the caller decides whether to abort.

use thiserror::Error;

use crate::tensors::DType;

/// Errors returned by activation and loss layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    /// Two buffers taking part in one call disagree in shape.
    #[error("{op}: dimension mismatch, expected shape {expected:?} but got {found:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A tensor's shape does not describe the length of its data.
    #[error("{op}: shape {shape:?} does not describe {len} elements")]
    MalformedTensor {
        op: &'static str,
        shape: Vec<usize>,
        len: usize,
    },

    /// Backward was called without the buffer its formula reads.
    #[error("{op}: missing required input `{input}`")]
    MissingInput {
        op: &'static str,
        input: &'static str,
    },

    /// No kernel exists for this element type.
    #[error("{op}: not implemented for type {dtype}")]
    NotImplemented { op: &'static str, dtype: DType },

    /// A loss layer was asked for its loss or gradient before any forward call.
    #[error("{op}: loss layer has no stored output, call forward first")]
    Uninitialized { op: &'static str },
}

pub type Result<T> = core::result::Result<T, LayerError>;
