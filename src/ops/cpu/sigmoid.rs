use rayon::prelude::*;

use crate::tensors::Float;

/// Logistic sigmoid `y = 1 / (1 + exp(-x))`, overwriting `x`.
pub fn sigmoid_forward<T: Float>(data: &mut [T]) {
    data.par_iter_mut().for_each(|v| {
        *v = T::ONE / (T::ONE + (-*v).exp());
    });
}

/// `dx = dy · y · (1 - y)`, overwriting `dy`.
pub fn sigmoid_backward<T: Float>(grad: &mut [T], y: &[T]) {
    grad.par_iter_mut().zip(y.par_iter()).for_each(|(g, &y)| {
        *g = *g * y * (T::ONE - y);
    });
}
