//! Kernel Dispatch
//!
//! This module selects the correct backend (CPU, WGPU, CUDA) at runtime for
//! every layer kernel, based on the element type and the global `Backend`.
//!
//! Each function attempts backend-specific implementations in priority order:
//! 1. `Cuda` (if enabled)
//! 2. `Wgpu` (if enabled)
//! 3. Falls back to `Cpu`
//!
//! GPU kernels only exist for `f32`; `f64` always runs on the CPU.
//!
//! # Design Highlights
//! - **Pluggable**: Backends are optional and modular
//! - **Minimal overhead**: Function returns immediately upon match
//! - **Fallback logic**: Safe and deterministic fallback to CPU

use crate::activation::Activation;
use crate::backend::{get_backend, Backend};
use crate::loss::LossKind;
use crate::tensors::Float;

/// A set of kernels for one element type.
///
/// Buffers handed to a kernel are non-empty, agree in length, and hold
/// `len / features` columns of `features` elements. Shape checks happen
/// before a kernel is reached.
pub trait Kernels<T>: Sync {
    /// Overwrites `data` (holding `x`) with `f(x)`.
    fn activation_forward(&self, act: &Activation, data: &mut [T], features: usize);

    /// Overwrites `grad` (holding `dy`) with `dx`.
    ///
    /// `source` is the saved `x` or `y` the activation reads, or empty when it
    /// reads neither.
    fn activation_backward(&self, act: &Activation, grad: &mut [T], source: &[T], features: usize);

    /// Per-batch mean loss of output `y` against target `z`.
    fn loss(&self, kind: LossKind, y: &[T], z: &[T], features: usize) -> f64;

    /// Overwrites the target `z` with the gradient of the loss.
    fn loss_gradient(&self, kind: LossKind, y: &[T], z: &mut [T], features: usize);
}

/// The kernel set of every [`Float`] type.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatch;

impl<T: Float> Kernels<T> for Dispatch {
    fn activation_forward(&self, act: &Activation, data: &mut [T], features: usize) {
        let backend = get_backend();
        log::trace!("{} forward: {} on {backend}", act.name(), T::DTYPE);

        match backend {
            Backend::Cuda => {
                #[cfg(feature = "cuda")]
                {
                    if let Some(buf) = T::as_f32_mut(data) {
                        if super::cuda::cuda_activation_forward(act, buf, features).is_some() {
                            return;
                        }
                    }
                }
            }
            Backend::Wgpu => {
                #[cfg(feature = "wgpu")]
                {
                    if let Some(buf) = T::as_f32_mut(data) {
                        if super::wgpu::wgpu_activation_forward(act, buf, features).is_some() {
                            return;
                        }
                    }
                }
            }
            Backend::Cpu => {}
        }

        if backend.is_accelerated() {
            log::debug!("{} forward: running {} on the cpu", act.name(), T::DTYPE);
        }
        super::cpu::activation_forward(act, data, features);
    }

    fn activation_backward(&self, act: &Activation, grad: &mut [T], source: &[T], features: usize) {
        let backend = get_backend();
        log::trace!("{} backward: {} on {backend}", act.name(), T::DTYPE);

        match backend {
            Backend::Cuda => {
                #[cfg(feature = "cuda")]
                {
                    if let (Some(src), Some(buf)) = (T::as_f32(source), T::as_f32_mut(grad)) {
                        if super::cuda::cuda_activation_backward(act, buf, src, features).is_some() {
                            return;
                        }
                    }
                }
            }
            Backend::Wgpu => {
                #[cfg(feature = "wgpu")]
                {
                    if let (Some(src), Some(buf)) = (T::as_f32(source), T::as_f32_mut(grad)) {
                        if super::wgpu::wgpu_activation_backward(act, buf, src, features).is_some() {
                            return;
                        }
                    }
                }
            }
            Backend::Cpu => {}
        }

        if backend.is_accelerated() {
            log::debug!("{} backward: running {} on the cpu", act.name(), T::DTYPE);
        }
        super::cpu::activation_backward(act, grad, source, features);
    }

    fn loss(&self, kind: LossKind, y: &[T], z: &[T], features: usize) -> f64 {
        // reductions stay on the host on every backend
        super::cpu::loss(kind, y, z, features)
    }

    fn loss_gradient(&self, kind: LossKind, y: &[T], z: &mut [T], features: usize) {
        let backend = get_backend();
        log::trace!("{} backward: {} on {backend}", kind.name(), T::DTYPE);

        match backend {
            Backend::Cuda => {
                #[cfg(feature = "cuda")]
                {
                    if let (Some(out), Some(target)) = (T::as_f32(y), T::as_f32_mut(z)) {
                        if super::cuda::cuda_loss_gradient(kind, out, target, features).is_some() {
                            return;
                        }
                    }
                }
            }
            Backend::Wgpu => {
                #[cfg(feature = "wgpu")]
                {
                    if let (Some(out), Some(target)) = (T::as_f32(y), T::as_f32_mut(z)) {
                        if super::wgpu::wgpu_loss_gradient(kind, out, target, features).is_some() {
                            return;
                        }
                    }
                }
            }
            Backend::Cpu => {}
        }

        if backend.is_accelerated() {
            log::debug!("{} backward: running {} on the cpu", kind.name(), T::DTYPE);
        }
        super::cpu::loss_gradient(kind, y, z, features);
    }
}
