use rayon::prelude::*;

use crate::tensors::Float;

/// Largest value of a column, the shift used before every exponentiation.
#[inline]
pub(super) fn column_max<T: Float>(col: &[T]) -> T {
    col.iter().copied().fold(T::NEG_INFINITY, T::max)
}

/// `Σ exp(v - max)` over a column.
#[inline]
pub(super) fn shifted_exp_sum<T: Float>(col: &[T], max: T) -> T {
    col.iter().map(|&v| (v - max).exp()).sum()
}

/// Softmax of every column, overwriting `x`.
///
/// Each column of `features` elements becomes `exp(x - max) / Σ exp(x - max)`.
pub fn softmax_forward<T: Float>(data: &mut [T], features: usize) {
    data.par_chunks_mut(features).for_each(|col| {
        let max = column_max(col);
        let mut sum = T::ZERO;
        for v in col.iter_mut() {
            *v = (*v - max).exp();
            sum = sum + *v;
        }
        for v in col.iter_mut() {
            *v = *v / sum;
        }
    });
}

/// Log-softmax of every column, overwriting `x`.
///
/// Each column becomes `(x - max) - log Σ exp(x - max)`.
pub fn log_softmax_forward<T: Float>(data: &mut [T], features: usize) {
    data.par_chunks_mut(features).for_each(|col| {
        let max = column_max(col);
        let lse = shifted_exp_sum(col, max).ln();
        for v in col.iter_mut() {
            *v = (*v - max) - lse;
        }
    });
}

/// Softmax Jacobian-vector product `dx = y · (dy - Σ y·dy)` per column,
/// overwriting `dy`.
pub fn softmax_backward<T: Float>(grad: &mut [T], y: &[T], features: usize) {
    grad.par_chunks_mut(features)
        .zip(y.par_chunks(features))
        .for_each(|(dy, y)| {
            let dot: T = y.iter().zip(dy.iter()).map(|(&yi, &dyi)| yi * dyi).sum();
            for (g, &yi) in dy.iter_mut().zip(y) {
                *g = yi * (*g - dot);
            }
        });
}
