use rayon::prelude::*;

use crate::tensors::Float;

/// Applies `y = tanh(x)` element-wise, overwriting `x`.
pub fn tanh_forward<T: Float>(data: &mut [T]) {
    data.par_iter_mut().for_each(|v| *v = v.tanh());
}

/// `dx = dy · (1 + y) · (1 - y)`, overwriting `dy`.
///
/// The factored form keeps precision when `|y|` is close to one.
pub fn tanh_backward<T: Float>(grad: &mut [T], y: &[T]) {
    grad.par_iter_mut().zip(y.par_iter()).for_each(|(g, &y)| {
        *g = *g * (T::ONE + y) * (T::ONE - y);
    });
}
