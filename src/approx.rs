//! Approximate equality of floating point values.
//!
//! Kernels on different backends may disagree in the last bits (summation
//! order, `f32` device math). This module grades the difference between two
//! values or slices and provides per-type tolerances for comparing them.

use crate::tensors::Float;

/// The max epsilon accepted on `f32`s.
pub const F32_MAX_ERROR: f32 = 1e-3;

/// The expected epsilon on `f32`s.
pub const F32_AVG_ERROR: f32 = 1e-5;

/// The best expected epsilon on `f32`s.
pub const F32_MIN_ERROR: f32 = 1e-6;

/// The max epsilon accepted on `f64`s.
pub const F64_MAX_ERROR: f64 = 1e-3;

/// The expected epsilon on `f64`s.
pub const F64_AVG_ERROR: f64 = 1e-6;

/// The best expected epsilon on `f64`s.
pub const F64_MIN_ERROR: f64 = 1e-13;

/// How close two values are.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApproxEquality {
    /// Very strong epsilon.
    Precise = 0,

    /// Good epsilon.
    Partial = 1,

    /// Acceptable epsilon.
    Relative = 2,

    /// No relative equality.
    Scarce = 3,
}

/// Per-type epsilon thresholds.
pub trait Tolerance: Float {
    const MIN_ERROR: Self;
    const AVG_ERROR: Self;
    const MAX_ERROR: Self;
}

impl Tolerance for f32 {
    const MIN_ERROR: Self = F32_MIN_ERROR;
    const AVG_ERROR: Self = F32_AVG_ERROR;
    const MAX_ERROR: Self = F32_MAX_ERROR;
}

impl Tolerance for f64 {
    const MIN_ERROR: Self = F64_MIN_ERROR;
    const AVG_ERROR: Self = F64_AVG_ERROR;
    const MAX_ERROR: Self = F64_MAX_ERROR;
}

/// Grades the absolute difference of two values.
pub fn grade<T: Tolerance>(a: T, b: T) -> ApproxEquality {
    let d = a - b;
    let dif = if d < T::ZERO { -d } else { d };

    if dif < T::MIN_ERROR {
        ApproxEquality::Precise
    } else if dif < T::AVG_ERROR {
        ApproxEquality::Partial
    } else if dif < T::MAX_ERROR {
        ApproxEquality::Relative
    } else {
        // NaN lands here too
        ApproxEquality::Scarce
    }
}

/// Grades two slices by their worst element pair.
///
/// Slices of different lengths are [`ApproxEquality::Scarce`].
pub fn grade_slices<T: Tolerance>(a: &[T], b: &[T]) -> ApproxEquality {
    if a.len() != b.len() {
        return ApproxEquality::Scarce;
    }
    a.iter()
        .zip(b)
        .map(|(&a, &b)| grade(a, b))
        .max()
        .unwrap_or(ApproxEquality::Precise)
}

/// Whether two values are within the type's best expected epsilon.
pub fn approx_eq<T: Tolerance>(a: T, b: T) -> bool {
    grade(a, b) == ApproxEquality::Precise
}

/// Whether every element pair differs by less than `tol`.
pub fn slices_close<T: Float>(actual: &[T], expected: &[T], tol: f64) -> bool {
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(&a, &e)| (a.to_f64() - e.to_f64()).abs() < tol)
}

/// Asserts that every element pair differs by less than `tol`.
///
/// # Panics
/// On a length mismatch or on the first pair out of tolerance.
#[track_caller]
pub fn assert_slice_close<T: Float>(actual: &[T], expected: &[T], tol: f64) {
    assert_eq!(actual.len(), expected.len(), "slice lengths differ");
    for (i, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        let (a, e) = (a.to_f64(), e.to_f64());
        assert!(
            (a - e).abs() < tol,
            "element {i}: {a} differs from {e} by more than {tol}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grades_by_epsilon() {
        assert_eq!(grade(1.0f64, 1.0), ApproxEquality::Precise);
        assert_eq!(grade(1.0f64, 1.0 + 1e-8), ApproxEquality::Partial);
        assert_eq!(grade(1.0f32, 1.0 + 1e-4), ApproxEquality::Relative);
        assert_eq!(grade(1.0f32, 2.0), ApproxEquality::Scarce);
        assert_eq!(grade(f64::NAN, 0.0), ApproxEquality::Scarce);
    }

    #[test]
    fn slices_take_the_worst_grade() {
        let a = [1.0f64, 2.0, 3.0];
        let b = [1.0, 2.0 + 1e-4, 3.0];
        assert_eq!(grade_slices(&a, &b), ApproxEquality::Relative);
        assert_eq!(grade_slices(&a, &a[..2]), ApproxEquality::Scarce);
        assert!(slices_close(&a, &b, 1e-3));
        assert!(!slices_close(&a, &b, 1e-5));
    }
}
