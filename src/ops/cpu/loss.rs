//! Loss values and gradients.
//!
//! `y` is the model output stored by the loss layer, `z` the target. Every
//! value is a per-batch mean and every gradient carries the matching `1/N`,
//! where `N` is the number of columns.

use rayon::prelude::*;

use super::softmax::{column_max, shifted_exp_sum};
use crate::tensors::Float;

#[inline]
fn batch<T>(y: &[T], features: usize) -> f64 {
    (y.len() / features) as f64
}

/// `0.5 · Σ (y - z)² / N`
pub fn quadratic_loss<T: Float>(y: &[T], z: &[T], features: usize) -> f64 {
    let sum: f64 = y
        .par_iter()
        .zip(z.par_iter())
        .map(|(&y, &z)| {
            let d = (y - z).to_f64();
            d * d
        })
        .sum();
    0.5 * sum / batch(y, features)
}

/// `z ← (y - z) / N`
pub fn quadratic_loss_gradient<T: Float>(y: &[T], z: &mut [T], features: usize) {
    let inv_n = T::from_f64(1.0 / batch(y, features));
    z.par_iter_mut().zip(y.par_iter()).for_each(|(z, &y)| {
        *z = (y - *z) * inv_n;
    });
}

/// `-Σ z · log(y) / N` for probabilities `y`.
///
/// Terms with `z = 0` contribute nothing, even where `y = 0`.
pub fn softmax_ce_loss<T: Float>(y: &[T], z: &[T], features: usize) -> f64 {
    let sum: f64 = y
        .par_iter()
        .zip(z.par_iter())
        .map(|(&y, &z)| {
            if z == T::ZERO {
                0.0
            } else {
                -(z * y.ln()).to_f64()
            }
        })
        .sum();
    sum / batch(y, features)
}

/// `z ← ((y - z) / y) / N`
///
/// Pushed through the softmax backward this is `(y - z) / N` with respect to
/// the logits, for targets whose columns sum to one.
pub fn softmax_ce_loss_gradient<T: Float>(y: &[T], z: &mut [T], features: usize) {
    let inv_n = T::from_f64(1.0 / batch(y, features));
    z.par_iter_mut().zip(y.par_iter()).for_each(|(z, &y)| {
        *z = ((y - *z) / y) * inv_n;
    });
}

/// `-Σ z · y / N` for log-probabilities `y`.
pub fn log_softmax_ce_loss<T: Float>(y: &[T], z: &[T], features: usize) -> f64 {
    let sum: f64 = y
        .par_iter()
        .zip(z.par_iter())
        .map(|(&y, &z)| -(z * y).to_f64())
        .sum();
    sum / batch(y, features)
}

/// `z ← (exp(y) - z) / N`, already the gradient with respect to the logits.
pub fn log_softmax_ce_loss_gradient<T: Float>(y: &[T], z: &mut [T], features: usize) {
    let inv_n = T::from_f64(1.0 / batch(y, features));
    z.par_iter_mut().zip(y.par_iter()).for_each(|(z, &y)| {
        *z = (y.exp() - *z) * inv_n;
    });
}

/// `Σ_columns (log Σ exp(y) - Σ z · y) / N` for raw logits `y`.
///
/// The log-sum-exp is taken as `max + log Σ exp(y - max)`.
pub fn unnormalized_ce_loss<T: Float>(y: &[T], z: &[T], features: usize) -> f64 {
    let sum: f64 = y
        .par_chunks(features)
        .zip(z.par_chunks(features))
        .map(|(y, z)| {
            let max = column_max(y);
            let lse = max + shifted_exp_sum(y, max).ln();
            let zy: T = y.iter().zip(z).map(|(&y, &z)| z * y).sum();
            (lse - zy).to_f64()
        })
        .sum();
    sum / batch(y, features)
}

/// `z ← (softmax(y) - z) / N`, with the softmax shifted by the column max.
pub fn unnormalized_ce_loss_gradient<T: Float>(y: &[T], z: &mut [T], features: usize) {
    let inv_n = T::from_f64(1.0 / batch(y, features));
    z.par_chunks_mut(features)
        .zip(y.par_chunks(features))
        .for_each(|(z, y)| {
            let max = column_max(y);
            let sum = shifted_exp_sum(y, max);
            for (z, &y) in z.iter_mut().zip(y) {
                *z = ((y - max).exp() / sum - *z) * inv_n;
            }
        });
}
