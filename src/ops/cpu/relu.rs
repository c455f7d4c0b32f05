use rayon::prelude::*;

use crate::tensors::Float;

/// Applies `y = max(x, 0)` element-wise, overwriting `x`.
pub fn relu_forward<T: Float>(data: &mut [T]) {
    data.par_iter_mut().for_each(|v| {
        *v = if *v > T::ZERO { *v } else { T::ZERO };
    });
}

/// Propagates `dy` wherever the output `y` is nonzero.
pub fn relu_backward<T: Float>(grad: &mut [T], y: &[T]) {
    grad.par_iter_mut().zip(y.par_iter()).for_each(|(g, &y)| {
        if y == T::ZERO {
            *g = T::ZERO;
        }
    });
}
