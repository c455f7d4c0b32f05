//! Loss layers.
//!
//! A [`LossLayer`] remembers the output `y` of its last [`forward`] call by
//! reference. [`backward`] then treats its argument `z` as the target and
//! overwrites it with the gradient, while [`loss`] only reads `z`.
//!
//! | Loss | `y` is | loss | gradient written into `z` |
//! |---|---|---|---|
//! | Quadratic | raw output | `0.5·Σ(y-z)²/N` | `(y-z)/N` |
//! | SoftmaxCrossEntropy | probabilities | `-Σ z·log y/N` | `((y-z)/y)/N` |
//! | LogSoftmaxCrossEntropy | log-probabilities | `-Σ z·y/N` | `(exp y - z)/N` |
//! | UnnormalizedCrossEntropy | logits | `Σ (log Σexp y - Σ z·y)/N` | `(softmax y - z)/N` |
//!
//! `N` is the batch count of `y` (see [`dims2`](crate::tensors::dims2)).
//!
//! The two softmax-family gradients are meant to be pushed through the
//! backward of the matching activation. For targets whose columns sum to one
//! the result is then `(softmax(x) - z)/N` with respect to the logits `x`.
//!
//! [`forward`]: LossLayer::forward
//! [`backward`]: LossLayer::backward
//! [`loss`]: LossLayer::loss

use crate::error::{LayerError, Result};
use crate::layout::{check_same_shape, check_tensor, kernels_for};
use crate::tensors::{Element, Tensor};

/// Which loss a [`LossLayer`] computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum LossKind {
    Quadratic,
    SoftmaxCrossEntropy,
    LogSoftmaxCrossEntropy,
    UnnormalizedCrossEntropy,
}

impl LossKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Quadratic => "quadratic_loss",
            Self::SoftmaxCrossEntropy => "softmax_ce_loss",
            Self::LogSoftmaxCrossEntropy => "log_softmax_ce_loss",
            Self::UnnormalizedCrossEntropy => "xent_loss",
        }
    }

    const fn forward_op(self) -> &'static str {
        match self {
            Self::Quadratic => "quadratic_loss.forward",
            Self::SoftmaxCrossEntropy => "softmax_ce_loss.forward",
            Self::LogSoftmaxCrossEntropy => "log_softmax_ce_loss.forward",
            Self::UnnormalizedCrossEntropy => "xent_loss.forward",
        }
    }

    const fn backward_op(self) -> &'static str {
        match self {
            Self::Quadratic => "quadratic_loss.backward",
            Self::SoftmaxCrossEntropy => "softmax_ce_loss.backward",
            Self::LogSoftmaxCrossEntropy => "log_softmax_ce_loss.backward",
            Self::UnnormalizedCrossEntropy => "xent_loss.backward",
        }
    }

    const fn loss_op(self) -> &'static str {
        match self {
            Self::Quadratic => "quadratic_loss.loss",
            Self::SoftmaxCrossEntropy => "softmax_ce_loss.loss",
            Self::LogSoftmaxCrossEntropy => "log_softmax_ce_loss.loss",
            Self::UnnormalizedCrossEntropy => "xent_loss.loss",
        }
    }
}

/// Options for [`LossLayer::backward`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct BackwardOptions {
    /// When false, backward leaves `z` alone and returns `None`.
    pub return_gradient: bool,
}

impl Default for BackwardOptions {
    fn default() -> Self {
        Self {
            return_gradient: true,
        }
    }
}

/// A loss function plus a borrow of the last forward output.
///
/// The borrow keeps `y` alive and frozen until the layer is dropped,
/// [`reset`](Self::reset), or handed a new output.
#[derive(Debug, Clone)]
pub struct LossLayer<'y, T> {
    kind: LossKind,
    output: Option<&'y Tensor<T>>,
}

impl<'y, T: Element> LossLayer<'y, T> {
    pub fn new(kind: LossKind) -> Self {
        Self { kind, output: None }
    }

    pub fn quadratic() -> Self {
        Self::new(LossKind::Quadratic)
    }

    pub fn softmax_cross_entropy() -> Self {
        Self::new(LossKind::SoftmaxCrossEntropy)
    }

    pub fn log_softmax_cross_entropy() -> Self {
        Self::new(LossKind::LogSoftmaxCrossEntropy)
    }

    pub fn unnormalized_cross_entropy() -> Self {
        Self::new(LossKind::UnnormalizedCrossEntropy)
    }

    pub fn kind(&self) -> LossKind {
        self.kind
    }

    /// The output stored by the last forward call.
    pub fn output(&self) -> Option<&'y Tensor<T>> {
        self.output
    }

    /// Forgets the stored output.
    pub fn reset(&mut self) {
        self.output = None;
    }

    /// Stores `y` for the following backward and loss calls and returns it.
    ///
    /// # Errors
    /// [`LayerError::MalformedTensor`] if `y`'s shape does not describe its data.
    pub fn forward(&mut self, y: &'y Tensor<T>) -> Result<&'y Tensor<T>> {
        check_tensor(self.kind.forward_op(), y)?;
        self.output = Some(y);
        Ok(y)
    }

    /// Overwrites the target `z` with the gradient of the loss.
    ///
    /// Returns `Ok(None)` without touching anything when
    /// `options.return_gradient` is false.
    ///
    /// # Errors
    /// - [`LayerError::Uninitialized`] before the first forward call.
    /// - [`LayerError::ShapeMismatch`] if `z` and the stored output differ in shape.
    /// - [`LayerError::NotImplemented`] for storage-only element types.
    pub fn backward<'z>(
        &self,
        z: &'z mut Tensor<T>,
        options: BackwardOptions,
    ) -> Result<Option<&'z mut Tensor<T>>> {
        if !options.return_gradient {
            return Ok(None);
        }

        let op = self.kind.backward_op();
        let y = self.stored(op, z)?;
        let kernels = kernels_for::<T>(op)?;

        if !z.is_empty() {
            let (features, _) = y.dims2();
            kernels.loss_gradient(self.kind, &y.data, &mut z.data, features);
        }
        Ok(Some(z))
    }

    /// Per-batch mean loss of the stored output against the target `z`.
    ///
    /// An empty batch has loss `0`.
    ///
    /// # Errors
    /// Same as [`backward`](Self::backward).
    pub fn loss(&self, z: &Tensor<T>) -> Result<f64> {
        let op = self.kind.loss_op();
        let y = self.stored(op, z)?;
        let kernels = kernels_for::<T>(op)?;

        if z.is_empty() {
            return Ok(0.0);
        }
        let (features, _) = y.dims2();
        Ok(kernels.loss(self.kind, &y.data, &z.data, features))
    }

    fn stored(&self, op: &'static str, z: &Tensor<T>) -> Result<&'y Tensor<T>> {
        let y = self.output.ok_or(LayerError::Uninitialized { op })?;
        check_tensor(op, z)?;
        check_same_shape(op, y, z)?;
        Ok(y)
    }
}
