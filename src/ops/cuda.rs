//! CUDA entry points.
//!
//! There are no native CUDA kernels yet; every call is routed through the
//! WGPU kernels, which reach NVIDIA devices through Vulkan.

use crate::activation::Activation;
use crate::loss::LossKind;

pub fn cuda_activation_forward(act: &Activation, data: &mut [f32], features: usize) -> Option<()> {
    // TODO: native kernels using the `cust` crate
    super::wgpu::wgpu_activation_forward(act, data, features)
}

pub fn cuda_activation_backward(
    act: &Activation,
    grad: &mut [f32],
    source: &[f32],
    features: usize,
) -> Option<()> {
    super::wgpu::wgpu_activation_backward(act, grad, source, features)
}

pub fn cuda_loss_gradient(kind: LossKind, y: &[f32], z: &mut [f32], features: usize) -> Option<()> {
    super::wgpu::wgpu_loss_gradient(kind, y, z, features)
}
