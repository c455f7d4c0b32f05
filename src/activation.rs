//! Activation layers.
//!
//! An [`Activation`] is a variant tag plus, for [`Activation::PowerAffine`],
//! its scalar parameters. It owns no buffers: every call reads and writes the
//! caller's tensors.
//!
//! | Layer | forward | backward | reads |
//! |---|---|---|---|
//! | Sigmoid | `1/(1+exp(-x))` | `dy·y·(1-y)` | `y` |
//! | Tanh | `tanh(x)` | `dy·(1+y)·(1-y)` | `y` |
//! | ReLU | `max(x, 0)` | `dy` where `y ≠ 0`, else `0` | `y` |
//! | Softmax | column-wise `exp(x-max)/Σexp(x-max)` | `y·(dy - Σ y·dy)` | `y` |
//! | LogSoftmax | column-wise `x - max - log Σexp(x-max)` | `dy` | nothing |
//! | PowerAffine | `a·xᵖ + b` | `dy·a·p·xᵖ⁻¹` | `x` |
//!
//! LogSoftmax passes the gradient through untouched: the log-softmax
//! cross-entropy loss downstream already emits the gradient with respect to
//! the logits.
//!
//! # Aliasing
//!
//! `forward_in_place` overwrites `x` with `y`, `backward_in_place` overwrites
//! `dy` with `dx`. Both produce exactly what the two-buffer forms produce.
//!
//! # Example
//! ```
//! use briny_layers::activation::{Activation, BackwardInputs};
//! use briny_layers::tensors::Tensor;
//!
//! let x = Tensor::new(vec![1], vec![0.0f64]);
//! let mut y = Tensor::zeros(vec![1]);
//! Activation::Sigmoid.forward(&x, &mut y)?;
//! assert_eq!(y.data, vec![0.5]);
//!
//! let mut grad = Tensor::new(vec![1], vec![1.0]);
//! Activation::Sigmoid.backward_in_place(BackwardInputs::from_y(&y), &mut grad)?;
//! assert_eq!(grad.data, vec![0.25]);
//! # Ok::<(), briny_layers::error::LayerError>(())
//! ```

use crate::error::{LayerError, Result};
use crate::layout::{check_same_shape, check_tensor, kernels_for};
use crate::tensors::{Element, Tensor};

/// Parameters of the power-affine layer `y = a·xᵖ + b`.
///
/// Missing options default to the identity map `(a, p, b) = (1, 1, 0)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct PowerAffine {
    /// Scale.
    pub a: f64,
    /// Exponent.
    pub p: f64,
    /// Bias.
    pub b: f64,
}

impl Default for PowerAffine {
    fn default() -> Self {
        Self {
            a: 1.0,
            p: 1.0,
            b: 0.0,
        }
    }
}

/// Elementwise or column-wise nonlinearity.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "kind", rename_all = "snake_case")
)]
pub enum Activation {
    Sigmoid,
    Tanh,
    Relu,
    Softmax,
    LogSoftmax,
    PowerAffine(PowerAffine),
}

/// Static description of one activation kind.
#[derive(Debug, PartialEq, Eq)]
pub struct KernelInfo {
    pub name: &'static str,
    pub forward_op: &'static str,
    pub backward_op: &'static str,
    /// Backward reads the pre-activation input.
    pub needs_x: bool,
    /// Backward reads the post-activation output.
    pub needs_y: bool,
    /// Forward normalizes each column instead of mapping elements independently.
    pub column_wise: bool,
}

static KERNELS: [KernelInfo; 6] = [
    KernelInfo {
        name: "sigmoid",
        forward_op: "sigmoid.forward",
        backward_op: "sigmoid.backward",
        needs_x: false,
        needs_y: true,
        column_wise: false,
    },
    KernelInfo {
        name: "tanh",
        forward_op: "tanh.forward",
        backward_op: "tanh.backward",
        needs_x: false,
        needs_y: true,
        column_wise: false,
    },
    KernelInfo {
        name: "relu",
        forward_op: "relu.forward",
        backward_op: "relu.backward",
        needs_x: false,
        needs_y: true,
        column_wise: false,
    },
    KernelInfo {
        name: "softmax",
        forward_op: "softmax.forward",
        backward_op: "softmax.backward",
        needs_x: false,
        needs_y: true,
        column_wise: true,
    },
    KernelInfo {
        name: "log_softmax",
        forward_op: "log_softmax.forward",
        backward_op: "log_softmax.backward",
        needs_x: false,
        needs_y: false,
        column_wise: true,
    },
    KernelInfo {
        name: "power_affine",
        forward_op: "power_affine.forward",
        backward_op: "power_affine.backward",
        needs_x: true,
        needs_y: false,
        column_wise: false,
    },
];

/// Buffers kept alive from the forward pass for backward.
///
/// Only the buffer named by [`Activation::needs_x`] / [`Activation::needs_y`]
/// has to be present.
#[derive(Debug)]
pub struct BackwardInputs<'a, T> {
    pub x: Option<&'a Tensor<T>>,
    pub y: Option<&'a Tensor<T>>,
}

impl<'a, T> BackwardInputs<'a, T> {
    pub fn new(x: Option<&'a Tensor<T>>, y: Option<&'a Tensor<T>>) -> Self {
        Self { x, y }
    }

    pub fn from_x(x: &'a Tensor<T>) -> Self {
        Self { x: Some(x), y: None }
    }

    pub fn from_y(y: &'a Tensor<T>) -> Self {
        Self { x: None, y: Some(y) }
    }

    pub fn none() -> Self {
        Self { x: None, y: None }
    }
}

impl<T> Clone for BackwardInputs<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BackwardInputs<'_, T> {}

impl Activation {
    /// Power-affine layer from named options.
    pub fn power_affine(options: PowerAffine) -> Self {
        Self::PowerAffine(options)
    }

    const fn index(&self) -> usize {
        match self {
            Self::Sigmoid => 0,
            Self::Tanh => 1,
            Self::Relu => 2,
            Self::Softmax => 3,
            Self::LogSoftmax => 4,
            Self::PowerAffine(_) => 5,
        }
    }

    /// Static metadata for this kind.
    pub fn info(&self) -> &'static KernelInfo {
        &KERNELS[self.index()]
    }

    pub fn name(&self) -> &'static str {
        self.info().name
    }

    /// Every activation takes exactly one input.
    pub const fn input_count(&self) -> usize {
        1
    }

    /// Activations preserve shape.
    pub fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        input.to_vec()
    }

    /// The output may be written over the input buffer.
    pub const fn overwrites_input(&self) -> bool {
        true
    }

    pub fn needs_x(&self) -> bool {
        self.info().needs_x
    }

    pub fn needs_y(&self) -> bool {
        self.info().needs_y
    }

    /// Computes `y = f(x)`.
    ///
    /// # Errors
    /// - [`LayerError::ShapeMismatch`] if `x` and `y` differ in shape.
    /// - [`LayerError::NotImplemented`] for storage-only element types.
    pub fn forward<T: Element>(&self, x: &Tensor<T>, y: &mut Tensor<T>) -> Result<()> {
        let op = self.info().forward_op;
        check_tensor(op, x)?;
        check_tensor(op, y)?;
        check_same_shape(op, x, y)?;
        let kernels = kernels_for::<T>(op)?;

        y.data.copy_from_slice(&x.data);
        if y.is_empty() {
            return Ok(());
        }
        let (features, _) = y.dims2();
        kernels.activation_forward(self, &mut y.data, features);
        Ok(())
    }

    /// Computes `f(x)` over `x` itself.
    pub fn forward_in_place<T: Element>(&self, x: &mut Tensor<T>) -> Result<()> {
        let op = self.info().forward_op;
        check_tensor(op, x)?;
        let kernels = kernels_for::<T>(op)?;

        if x.is_empty() {
            return Ok(());
        }
        let (features, _) = x.dims2();
        kernels.activation_forward(self, &mut x.data, features);
        Ok(())
    }

    /// Computes `dx` from `dy` and the saved forward buffer.
    ///
    /// # Errors
    /// - [`LayerError::MissingInput`] if the buffer this kind reads is absent.
    /// - [`LayerError::ShapeMismatch`] if any two buffers differ in shape.
    /// - [`LayerError::NotImplemented`] for storage-only element types.
    pub fn backward<T: Element>(
        &self,
        inputs: BackwardInputs<'_, T>,
        dy: &Tensor<T>,
        dx: &mut Tensor<T>,
    ) -> Result<()> {
        let op = self.info().backward_op;
        check_tensor(op, dy)?;
        check_tensor(op, dx)?;
        check_same_shape(op, dy, dx)?;
        let source = self.source(op, inputs, dy)?;
        let kernels = kernels_for::<T>(op)?;

        dx.data.copy_from_slice(&dy.data);
        if dx.is_empty() {
            return Ok(());
        }
        let (features, _) = dx.dims2();
        kernels.activation_backward(self, &mut dx.data, source, features);
        Ok(())
    }

    /// Computes `dx` over the `dy` buffer.
    pub fn backward_in_place<T: Element>(
        &self,
        inputs: BackwardInputs<'_, T>,
        grad: &mut Tensor<T>,
    ) -> Result<()> {
        let op = self.info().backward_op;
        check_tensor(op, grad)?;
        let source = self.source(op, inputs, grad)?;
        let kernels = kernels_for::<T>(op)?;

        if grad.is_empty() {
            return Ok(());
        }
        let (features, _) = grad.dims2();
        kernels.activation_backward(self, &mut grad.data, source, features);
        Ok(())
    }

    /// Picks the saved buffer backward reads; empty for LogSoftmax.
    fn source<'a, T>(
        &self,
        op: &'static str,
        inputs: BackwardInputs<'a, T>,
        grad: &Tensor<T>,
    ) -> Result<&'a [T]> {
        let info = self.info();
        let required = if info.needs_x {
            Some(("x", inputs.x))
        } else if info.needs_y {
            Some(("y", inputs.y))
        } else {
            None
        };

        match required {
            None => Ok(&[]),
            Some((input, None)) => Err(LayerError::MissingInput { op, input }),
            Some((_, Some(saved))) => {
                check_tensor(op, saved)?;
                check_same_shape(op, grad, saved)?;
                Ok(&saved.data)
            }
        }
    }
}
