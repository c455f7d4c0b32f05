//! # Kernel Dispatch Layer
//!
//! This module holds the numeric kernels behind every layer and routes each
//! call to a compute backend.
//!
//! ## Submodules
//!
//! - [`cpu`]: Multi-threaded CPU reference kernels (always available, `f32` and `f64`)
//! - [`wgpu`] *(opt-in)*: GPU compute shader pipelines using `wgpu` (`f32` only)
//! - [`cuda`] *(planned)*: CUDA backend for NVIDIA, currently routed through `wgpu`
//! - [`dispatch`]: Selection of a kernel set by element type and active backend
//!
//! ## Backend Selection
//!
//! Layers look up the kernel set of their element type through
//! [`Element::kernels`](crate::tensors::Element::kernels). The kernel set then
//! asks the global [`Backend`](crate::backend::Backend) where to run:
//!
//! 1. `Cuda` (if enabled)
//! 2. `Wgpu` (if enabled)
//! 3. Falls back to `Cpu`
//!
//! Accelerated kernels must match the CPU reference within floating-point
//! tolerance. When one is missing or fails, the CPU kernel runs on the
//! untouched input.
//!
//! ## Extending the Backend
//!
//! To add a new kernel:
//!
//! 1. Implement it in the CPU reference (`cpu::my_op`) and optionally on the GPU
//! 2. Route it in the `dispatch` module
//! 3. Keep shape checks in the layer front ends, not in the kernels
//!
//! ## Feature Flags
//!
//! - `wgpu`: Enables `wgpu` (WebGPU) backend
//! - `cuda`: Enables placeholder CUDA module (dispatches to WGPU)

pub mod dispatch;
pub mod cpu;
#[cfg(feature = "cuda")]
pub mod cuda;
#[cfg(any(feature = "wgpu", feature = "cuda"))]
pub mod wgpu;
