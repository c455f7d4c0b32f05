use rayon::prelude::*;

use crate::activation::PowerAffine;
use crate::tensors::Float;

/// `y = a·xᵖ + b`, overwriting `x`.
pub fn power_affine_forward<T: Float>(params: &PowerAffine, data: &mut [T]) {
    let (a, p, b) = (T::from_f64(params.a), T::from_f64(params.p), T::from_f64(params.b));
    data.par_iter_mut().for_each(|v| {
        *v = a * v.powf(p) + b;
    });
}

/// `dx = dy · a·p·xᵖ⁻¹`, overwriting `dy`. Reads the pre-activation input `x`.
pub fn power_affine_backward<T: Float>(params: &PowerAffine, grad: &mut [T], x: &[T]) {
    let ap = T::from_f64(params.a * params.p);
    let p1 = T::from_f64(params.p - 1.0);
    grad.par_iter_mut().zip(x.par_iter()).for_each(|(g, &x)| {
        *g = *g * ap * x.powf(p1);
    });
}
