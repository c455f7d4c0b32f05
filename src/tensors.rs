//! Core buffer types shared by every layer.
//!
//! # Buffers
//!
//! A [`Tensor`] is a caller-owned shape plus flat row-major data. Layers never
//! allocate or resize tensors; they read and write through the references
//! handed to each call.
//!
//! ## Column view
//!
//! Column-wise layers (softmax family, cross-entropy losses) view a tensor as
//! `batch` contiguous columns of `features` elements. [`dims2`] performs that
//! decomposition:
//!
//! - rank 0 → `(1, 1)`
//! - rank 1 → `(n, 1)`
//! - otherwise the outermost dimension is the batch and every inner dimension
//!   folds into the (contiguous) feature dimension.
//!
//! ## Element types
//!
//! - [`Element`]: anything a tensor may store (`f16`, `f32`, `f64`).
//! - [`Float`]: element types with arithmetic kernels (`f32`, `f64`).
//!
//! `f16` is a storage-only type here: layer calls on `f16` tensors fail with
//! [`LayerError::NotImplemented`](crate::error::LayerError::NotImplemented).

use briny::prelude::*;
use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Sub};
use half::f16;

use crate::ops::dispatch::{Dispatch, Kernels};

/// Represents an N-dimensional tensor with a shape and flat row-major data.
///
/// - `shape` defines the structure, e.g. `[4, 10]` for 4 samples of 10 features.
/// - `data` holds the flattened content in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T> Tensor<T> {
    /// Creates a new tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self { shape, data }
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `(features, batch)` decomposition of this tensor's shape.
    pub fn dims2(&self) -> (usize, usize) {
        dims2(&self.shape)
    }
}

impl<T: Element> Tensor<T> {
    /// Creates a zero-filled tensor of the given shape.
    pub fn zeros(shape: impl Into<Vec<usize>>) -> Self {
        let shape = shape.into();
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![T::default(); len],
        }
    }
}

impl<T> Validate for Tensor<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.shape.iter().product::<usize>() != self.data.len() {
            return Err(ValidationError);
        }
        Ok(())
    }
}

/// Splits a shape into `(features, batch)`.
///
/// # Example
/// ```
/// use briny_layers::tensors::dims2;
/// assert_eq!(dims2(&[]), (1, 1));
/// assert_eq!(dims2(&[3]), (3, 1));
/// assert_eq!(dims2(&[2, 4, 5]), (20, 2));
/// ```
pub fn dims2(shape: &[usize]) -> (usize, usize) {
    match shape {
        [] => (1, 1),
        [n] => (*n, 1),
        [batch, inner @ ..] => (inner.iter().product(), *batch),
    }
}

/// Runtime tag of a tensor element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    F32,
    F64,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::F16 => "f16",
            Self::F32 => "f32",
            Self::F64 => "f64",
        })
    }
}

/// A type tensors may store.
///
/// [`Element::kernels`] is the element-type key of kernel dispatch: it
/// returns `None` for storage-only types.
pub trait Element: Copy + Default + fmt::Debug + Send + Sync + 'static {
    /// Runtime tag of this type.
    const DTYPE: DType;

    /// The kernel set able to operate on this type, if any.
    fn kernels() -> Option<&'static dyn Kernels<Self>> {
        None
    }
}

impl Element for f16 {
    const DTYPE: DType = DType::F16;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    fn kernels() -> Option<&'static dyn Kernels<Self>> {
        Some(&Dispatch)
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;

    fn kernels() -> Option<&'static dyn Kernels<Self>> {
        Some(&Dispatch)
    }
}

/// Floating-point element types with CPU kernels.
pub trait Float:
    Element
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + core::iter::Sum
{
    const ZERO: Self;
    const ONE: Self;
    const NEG_INFINITY: Self;

    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn tanh(self) -> Self;
    fn powf(self, p: Self) -> Self;
    fn max(self, other: Self) -> Self;
    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;

    /// The data as `f32`, when this is the type GPU kernels work in.
    fn as_f32(data: &[Self]) -> Option<&[f32]>;

    /// Mutable counterpart of [`Float::as_f32`].
    fn as_f32_mut(data: &mut [Self]) -> Option<&mut [f32]>;
}

impl Float for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const NEG_INFINITY: Self = f32::NEG_INFINITY;

    #[inline]
    fn exp(self) -> Self {
        f32::exp(self)
    }
    #[inline]
    fn ln(self) -> Self {
        f32::ln(self)
    }
    #[inline]
    fn tanh(self) -> Self {
        f32::tanh(self)
    }
    #[inline]
    fn powf(self, p: Self) -> Self {
        f32::powf(self, p)
    }
    #[inline]
    fn max(self, other: Self) -> Self {
        f32::max(self, other)
    }
    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn as_f32(data: &[Self]) -> Option<&[f32]> {
        Some(data)
    }

    fn as_f32_mut(data: &mut [Self]) -> Option<&mut [f32]> {
        Some(data)
    }
}

impl Float for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const NEG_INFINITY: Self = f64::NEG_INFINITY;

    #[inline]
    fn exp(self) -> Self {
        f64::exp(self)
    }
    #[inline]
    fn ln(self) -> Self {
        f64::ln(self)
    }
    #[inline]
    fn tanh(self) -> Self {
        f64::tanh(self)
    }
    #[inline]
    fn powf(self, p: Self) -> Self {
        f64::powf(self, p)
    }
    #[inline]
    fn max(self, other: Self) -> Self {
        f64::max(self, other)
    }
    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    fn as_f32(_: &[Self]) -> Option<&[f32]> {
        None
    }

    fn as_f32_mut(_: &mut [Self]) -> Option<&mut [f32]> {
        None
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in shape.
///
/// # Example
/// ```
/// use briny_layers::tensor;
/// let t = tensor!([[1.0, -2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// assert_eq!(t.data, vec![1.0, -2.0, 3.0, 4.0]);
/// ```
#[macro_export]
macro_rules! tensor {
    ([ $( [ $($row:tt)* ] ),+ $(,)? ]) => {{
        let children = vec![ $( $crate::tensor!([ $($row)* ]) ),+ ];
        let first_shape = &children[0].shape;
        assert!(children.iter().all(|c| c.shape == *first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::new(shape, data)
    }};

    ([ $( $x:expr ),+ $(,)? ]) => {{
        let data = vec![ $( $x ),+ ];
        $crate::tensors::Tensor::new(vec![data.len()], data)
    }};

    ($x:expr) => {
        $crate::tensors::Tensor::new(Vec::<usize>::new(), vec![$x])
    };
}
