//! Parallel CPU reference kernels
//!
//! # CPU Backend
//!
//! This module provides the reference implementation of every layer kernel.
//! Accelerated backends are checked against it, and dispatch falls back to it
//! whenever an accelerated kernel is missing or fails.
//!
//! ## Features
//!
//! - Parallel execution using [`rayon`](https://docs.rs/rayon)
//! - Generic over [`Float`] (`f32`, `f64`)
//! - Every kernel works in place: activations overwrite `x` / `dy`, loss
//!   gradients overwrite the target `z`
//!
//! ## Implemented Kernels
//!
//! - `sigmoid`, `tanh`, `relu`, `power_affine`: element-wise forward and backward
//! - `softmax`, `log_softmax`: column-wise forward, max-stabilized; softmax backward
//! - `loss`: quadratic, softmax / log-softmax / unnormalized cross-entropy values
//!   and gradients
//!
//! ## Design Goals
//!
//! - Deterministic results up to the summation order chosen by `rayon`
//! - Modular: CPU functions are separate from backend dispatching

mod loss;
pub use self::loss::{
    log_softmax_ce_loss, log_softmax_ce_loss_gradient, quadratic_loss, quadratic_loss_gradient,
    softmax_ce_loss, softmax_ce_loss_gradient, unnormalized_ce_loss,
    unnormalized_ce_loss_gradient,
};

mod power_affine;
pub use self::power_affine::{power_affine_backward, power_affine_forward};

mod relu;
pub use self::relu::{relu_backward, relu_forward};

mod sigmoid;
pub use self::sigmoid::{sigmoid_backward, sigmoid_forward};

mod softmax;
pub use self::softmax::{log_softmax_forward, softmax_backward, softmax_forward};

mod tanh;
pub use self::tanh::{tanh_backward, tanh_forward};

use crate::activation::Activation;
use crate::loss::LossKind;
use crate::tensors::Float;

/// Runs the forward kernel of `act` over `data`.
pub fn activation_forward<T: Float>(act: &Activation, data: &mut [T], features: usize) {
    match act {
        Activation::Sigmoid => sigmoid_forward(data),
        Activation::Tanh => tanh_forward(data),
        Activation::Relu => relu_forward(data),
        Activation::Softmax => softmax_forward(data, features),
        Activation::LogSoftmax => log_softmax_forward(data, features),
        Activation::PowerAffine(params) => power_affine_forward(params, data),
    }
}

/// Runs the backward kernel of `act` over `grad`.
pub fn activation_backward<T: Float>(
    act: &Activation,
    grad: &mut [T],
    source: &[T],
    features: usize,
) {
    match act {
        Activation::Sigmoid => sigmoid_backward(grad, source),
        Activation::Tanh => tanh_backward(grad, source),
        Activation::Relu => relu_backward(grad, source),
        Activation::Softmax => softmax_backward(grad, source, features),
        // gradient passes through unchanged
        Activation::LogSoftmax => {}
        Activation::PowerAffine(params) => power_affine_backward(params, grad, source),
    }
}

/// Per-batch mean loss.
pub fn loss<T: Float>(kind: LossKind, y: &[T], z: &[T], features: usize) -> f64 {
    match kind {
        LossKind::Quadratic => quadratic_loss(y, z, features),
        LossKind::SoftmaxCrossEntropy => softmax_ce_loss(y, z, features),
        LossKind::LogSoftmaxCrossEntropy => log_softmax_ce_loss(y, z, features),
        LossKind::UnnormalizedCrossEntropy => unnormalized_ce_loss(y, z, features),
    }
}

/// Overwrites the target `z` with the loss gradient.
pub fn loss_gradient<T: Float>(kind: LossKind, y: &[T], z: &mut [T], features: usize) {
    match kind {
        LossKind::Quadratic => quadratic_loss_gradient(y, z, features),
        LossKind::SoftmaxCrossEntropy => softmax_ce_loss_gradient(y, z, features),
        LossKind::LogSoftmaxCrossEntropy => log_softmax_ce_loss_gradient(y, z, features),
        LossKind::UnnormalizedCrossEntropy => unnormalized_ce_loss_gradient(y, z, features),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::PowerAffine;
    use crate::approx::assert_slice_close;

    #[test]
    fn sigmoid_forward_and_backward_at_zero() {
        let mut y = [0.0f64];
        sigmoid_forward(&mut y);
        assert_eq!(y, [0.5]);

        let mut grad = [1.0];
        sigmoid_backward(&mut grad, &y);
        assert_eq!(grad, [0.25]);
    }

    #[test]
    fn relu_forward_and_backward() {
        let mut data = [-1.0f64, 0.0, 1.0, 2.0];
        relu_forward(&mut data);
        assert_eq!(data, [0.0, 0.0, 1.0, 2.0]);

        // upstream gradient all ones
        let mut grad = [1.0; 4];
        relu_backward(&mut grad, &data);
        assert_eq!(grad, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn tanh_backward_uses_factored_derivative() {
        let mut y = [-0.5f64, 0.0, 0.25];
        tanh_forward(&mut y);

        let mut grad = [2.0; 3];
        tanh_backward(&mut grad, &y);
        for (g, y) in grad.iter().zip(y) {
            assert!((g - 2.0 * (1.0 - y * y)).abs() < 1e-15);
        }
    }

    #[test]
    fn softmax_single_column() {
        let mut data = [1.0f64, 2.0, 3.0];
        softmax_forward(&mut data, 3);
        assert_slice_close(&data, &[0.090_030_573, 0.244_728_471, 0.665_240_956], 1e-8);
        assert!((data.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn softmax_normalizes_each_column_independently() {
        let mut data = [1.0f64, 2.0, 3.0, 1000.0, 1000.0, 1000.0];
        softmax_forward(&mut data, 3);
        assert_slice_close(&data[..3], &[0.090_030_573, 0.244_728_471, 0.665_240_956], 1e-8);
        // large logits stay finite thanks to the max shift
        assert_slice_close(&data[3..], &[1.0 / 3.0; 3], 1e-12);
    }

    #[test]
    fn log_softmax_is_log_of_softmax() {
        let x = [0.3f64, -1.2, 2.5, 0.0, 4.0, -3.0];
        let mut soft = x;
        let mut logp = x;
        softmax_forward(&mut soft, 2);
        log_softmax_forward(&mut logp, 2);

        let log_soft: Vec<f64> = soft.iter().map(|v| v.ln()).collect();
        assert_slice_close(&logp, &log_soft, 1e-12);
    }

    #[test]
    fn softmax_backward_has_no_extra_scaling() {
        let mut y = [1.0f64, 2.0];
        softmax_forward(&mut y, 2);

        let mut grad = [1.0, 0.0];
        softmax_backward(&mut grad, &y, 2);
        let dot = y[0];
        assert_slice_close(&grad, &[y[0] * (1.0 - dot), y[1] * (0.0 - dot)], 1e-15);
        // a softmax Jacobian-vector product sums to zero
        assert!(grad.iter().sum::<f64>().abs() < 1e-15);
    }

    #[test]
    fn power_affine_forward_and_backward() {
        let params = PowerAffine {
            a: 2.0,
            p: 3.0,
            b: 1.0,
        };
        let x = [1.0f64, 2.0, -1.0];
        let mut y = x;
        power_affine_forward(&params, &mut y);
        assert_eq!(y, [3.0, 17.0, -1.0]);

        let mut grad = [1.0, 0.5, 1.0];
        power_affine_backward(&params, &mut grad, &x);
        assert_eq!(grad, [6.0, 12.0, 6.0]);
    }

    #[test]
    fn quadratic_loss_on_exact_prediction_is_zero() {
        let y = [1.0f64, 2.0];
        let mut z = [1.0, 2.0];
        assert_eq!(quadratic_loss(&y, &z, 2), 0.0);
        quadratic_loss_gradient(&y, &mut z, 2);
        assert_eq!(z, [0.0, 0.0]);
    }

    #[test]
    fn quadratic_loss_divides_by_batch_count() {
        // two columns of two features
        let y = [1.0f64, 2.0, 3.0, 4.0];
        let mut z = [0.0; 4];
        assert_eq!(quadratic_loss(&y, &z, 2), 0.5 * 30.0 / 2.0);
        quadratic_loss_gradient(&y, &mut z, 2);
        assert_eq!(z, [0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn softmax_ce_loss_of_uniform_prediction() {
        let y = [0.5f64, 0.5];
        let mut z = [1.0, 0.0];
        assert!((softmax_ce_loss(&y, &z, 2) - core::f64::consts::LN_2).abs() < 1e-15);

        softmax_ce_loss_gradient(&y, &mut z, 2);
        assert_eq!(z, [-1.0, 1.0]);
    }

    #[test]
    fn softmax_ce_loss_ignores_zero_targets_on_zero_probabilities() {
        let y = [1.0f64, 0.0];
        let z = [1.0, 0.0];
        assert_eq!(softmax_ce_loss(&y, &z, 2), 0.0);
    }

    #[test]
    fn log_softmax_ce_loss_gradient() {
        let y = [0.5f64.ln(), 0.5f64.ln()];
        let mut z = [0.0, 1.0];
        assert!((log_softmax_ce_loss(&y, &z, 2) - core::f64::consts::LN_2).abs() < 1e-15);

        super::log_softmax_ce_loss_gradient(&y, &mut z, 2);
        assert_slice_close(&z, &[0.5, -0.5], 1e-15);
    }

    #[test]
    fn unnormalized_ce_agrees_with_softmax_ce() {
        let logits = [0.2f64, -1.0, 3.0, 1.5, 1.5, -0.5];
        let z = [0.0, 0.0, 1.0, 0.25, 0.75, 0.0];
        let mut probs = logits;
        softmax_forward(&mut probs, 3);

        let xent = unnormalized_ce_loss(&logits, &z, 3);
        let soft = softmax_ce_loss(&probs, &z, 3);
        assert!((xent - soft).abs() < 1e-12);

        let mut grad = z;
        unnormalized_ce_loss_gradient(&logits, &mut grad, 3);
        let expected: Vec<f64> = probs
            .iter()
            .zip(z)
            .map(|(p, z)| (p - z) / 2.0)
            .collect();
        assert_slice_close(&grad, &expected, 1e-12);
    }

    #[test]
    fn unnormalized_ce_is_stable_for_large_logits() {
        let logits = [1000.0f64, 1000.0];
        let z = [1.0, 0.0];
        let loss = unnormalized_ce_loss(&logits, &z, 2);
        assert!((loss - core::f64::consts::LN_2).abs() < 1e-9);
    }

    #[test]
    fn kernels_run_on_f32() {
        let mut data = [1.0f32, 2.0, 3.0];
        softmax_forward(&mut data, 3);
        assert!((data.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }
}
